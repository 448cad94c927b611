//! Tenant-scope authorization for the DLZA clerk gateway.
//!
//! The [`AuthorizationGate`] turns a user's claim into an
//! [`AuthorizationContext`] and enforces it before any data operation:
//! - reads are scoped by the tenants the user may see (admins are unrestricted)
//! - single-tenant lookups must name a tenant in scope
//! - mutations must be backed by the tenant's capability flags
//!
//! Row filtering is left to the downstream handler, which receives the scope
//! in every [`ListRequest`].

mod error;
mod gate;
mod types;

pub use error::AuthzError;
pub use gate::{AuthorizationGate, AuthzConfig, TENANT_PERMISSION_MARKERS};
pub use types::{
    AuthorizationContext, ListOptions, ListRequest, MAX_PAGE_SIZE, MutationPolicy, SortDirection,
};
