//! clerk web gateway.
//!
//! Authenticates browser users against an OIDC identity provider, keeps
//! their token state in a server-side session and scopes every REST and
//! GraphQL data operation to the tenants their claims allow.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod graphql;
pub mod handler;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
