//! Typed user identity decoded from an access token.
//!
//! # Trust boundary
//!
//! [`ClaimExtractor`] decodes the access token payload **without** verifying
//! its signature. It must only be fed tokens that this process received
//! directly from the provider's token endpoint over TLS (code exchange or
//! refresh) and then kept server-side in the session. Tokens supplied by a
//! client (e.g. an `Authorization` header) must never reach it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clerk_core::TenantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::AuthError;
use crate::oidc::OidcConfig;

/// A single CRUD capability on a tenant's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Create,
    Read,
    Update,
    Delete,
}

impl Capability {
    /// All capabilities, in CRUD order.
    pub const ALL: [Capability; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];

    /// Returns the capability name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a user may do within one tenant's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPermission {
    #[serde(rename = "id")]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
}

impl TenantPermission {
    /// Creates a permission entry with every capability granted.
    #[must_use]
    pub fn full(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            create: true,
            read: true,
            update: true,
            delete: true,
        }
    }

    /// Creates a permission entry with no capability granted.
    #[must_use]
    pub fn none(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            create: false,
            read: false,
            update: false,
            delete: false,
        }
    }

    /// Returns true if the given capability is granted.
    #[must_use]
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Create => self.create,
            Capability::Read => self.read,
            Capability::Update => self.update,
            Capability::Delete => self.delete,
        }
    }

    /// Returns true if all four capabilities are granted.
    #[must_use]
    pub fn allows_all(&self) -> bool {
        Capability::ALL.iter().all(|c| self.allows(*c))
    }
}

/// A `tenant_list` entry as the provider may emit it.
#[derive(Deserialize)]
#[serde(untagged)]
enum TenantEntry {
    Permission(TenantPermission),
    Id(String),
}

/// Identity and tenant permissions of the session's user.
///
/// Only produced by [`ClaimExtractor::extract`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaim {
    subject: String,
    username: String,
    email: Option<String>,
    groups: BTreeSet<String>,
    tenant_list: Vec<TenantPermission>,
}

impl UserClaim {
    /// Returns the provider subject (`sub`).
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the preferred username, falling back to the subject.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the email address, if the token carried one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the user's group memberships.
    #[must_use]
    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    /// Returns true if the user is a member of `group`.
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Returns the tenant permissions in token order.
    #[must_use]
    pub fn tenant_list(&self) -> &[TenantPermission] {
        &self.tenant_list
    }

    /// Returns the permission entry for a tenant, if present.
    #[must_use]
    pub fn tenant(&self, tenant_id: &TenantId) -> Option<&TenantPermission> {
        self.tenant_list.iter().find(|t| &t.tenant_id == tenant_id)
    }
}

/// Decodes access token payloads into [`UserClaim`]s.
#[derive(Debug, Clone)]
pub struct ClaimExtractor {
    groups_claim: String,
    tenant_claim: String,
}

impl ClaimExtractor {
    /// Creates an extractor reading the given claim names.
    #[must_use]
    pub fn new(groups_claim: impl Into<String>, tenant_claim: impl Into<String>) -> Self {
        Self {
            groups_claim: groups_claim.into(),
            tenant_claim: tenant_claim.into(),
        }
    }

    /// Creates an extractor using the claim names from the OIDC configuration.
    #[must_use]
    pub fn from_config(config: &OidcConfig) -> Self {
        Self::new(config.groups_claim(), config.tenant_claim())
    }

    /// Decodes `access_token` into a [`UserClaim`].
    ///
    /// No network call is made and the signature is not checked; see the
    /// module documentation for the trust boundary.
    pub fn extract(&self, access_token: &str) -> Result<UserClaim, AuthError> {
        let payload = decode_payload(access_token)?;

        let subject = payload
            .get("sub")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::unauthenticated("access token has no subject"))?
            .to_string();

        let username = payload
            .get("preferred_username")
            .and_then(Value::as_str)
            .map_or_else(|| subject.clone(), str::to_string);

        let email = payload
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string);

        let groups = payload
            .get(&self.groups_claim)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let tenant_list = payload
            .get(&self.tenant_claim)
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(parse_tenant_entry).collect())
            .unwrap_or_default();

        Ok(UserClaim {
            subject,
            username,
            email,
            groups,
            tenant_list,
        })
    }
}

fn parse_tenant_entry(value: &Value) -> Option<TenantPermission> {
    match serde_json::from_value::<TenantEntry>(value.clone()) {
        Ok(TenantEntry::Permission(permission)) => Some(permission),
        Ok(TenantEntry::Id(id)) => Some(TenantPermission {
            read: true,
            ..TenantPermission::none(id)
        }),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed tenant_list entry");
            None
        }
    }
}

/// Decodes the (unverified) JSON payload of a compact JWT.
fn decode_payload(token: &str) -> Result<Value, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::unauthenticated("access token is not a JWT"));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| AuthError::unauthenticated(format!("access token payload: {e}")))?;

    let payload: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::unauthenticated(format!("access token payload: {e}")))?;

    if payload.is_object() {
        Ok(payload)
    } else {
        Err(AuthError::unauthenticated("access token payload is not an object"))
    }
}
