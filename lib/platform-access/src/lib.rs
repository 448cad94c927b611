//! Session, token lifecycle and claim handling for the DLZA clerk gateway.
//!
//! This crate provides:
//! - OIDC client configuration (`OidcConfig`) and the `IdentityProvider` seam
//! - Server-side sessions (`Session`) and their persistence (`SessionStore`)
//! - The token lifecycle: login, authentication, refresh and logout
//!   (`TokenLifecycle`)
//! - Claim extraction from access tokens (`ClaimExtractor`, `UserClaim`)
//!
//! # Example
//!
//! ```
//! use clerk_platform_access::{ClaimExtractor, OidcConfig};
//!
//! let config = OidcConfig::new(
//!     "https://auth.example.com/realms/dlza".to_string(),
//!     "clerk".to_string(),
//!     "secret".to_string(),
//!     "https://clerk.example.com/auth/callback".to_string(),
//! );
//!
//! // header.payload.signature, payload = {"sub":"alice","groups":["dlza-admin"]}
//! let token = "e30.eyJzdWIiOiJhbGljZSIsImdyb3VwcyI6WyJkbHphLWFkbWluIl19.c2ln";
//! let claim = ClaimExtractor::from_config(&config).extract(token).unwrap();
//!
//! assert_eq!(claim.subject(), "alice");
//! assert!(claim.in_group("dlza-admin"));
//! ```

pub mod auth;
pub mod claims;
pub mod error;
pub mod lifecycle;
pub mod oidc;
pub mod provider;
pub mod retry;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types at crate root
pub use auth::{AuthenticatedUser, CallbackData, LoginOutcome};
pub use claims::{Capability, ClaimExtractor, TenantPermission, UserClaim};
pub use error::{AuthError, ErrorCode, ProviderError, SessionStoreError};
pub use lifecycle::{DEFAULT_TOKEN_LIFETIME_SECONDS, TokenLifecycle};
pub use oidc::OidcConfig;
pub use provider::{AuthorizationRequest, IdentityProvider, TokenSet};
pub use retry::RetryPolicy;
pub use session::{Session, SessionRecord, TokenState, sanitize_redirect_path};
pub use store::{MemorySessionStore, SessionStore, StoreResult};
