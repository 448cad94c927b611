//! Core identifiers and utilities for the DLZA clerk gateway.
//!
//! Shared by the authentication, authorization and server crates: the
//! session and tenant identifiers, plus the `Result` alias that storage
//! and startup code use to carry a [`rootcause::Report`].

pub mod id;

pub use id::{ParseIdError, SessionId, TenantId};

/// Result carrying a [`rootcause::Report`] over the context `C`.
///
/// Domain crates define their own error enums and report them through
/// this alias where an error crosses a storage or startup boundary.
pub type Result<T, C = ()> = std::result::Result<T, rootcause::Report<C>>;
