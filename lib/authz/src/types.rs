//! Authorization types: the resolved scope and the scoped list contract.

use clerk_core::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthzError;

/// Largest page a list request may ask for.
pub const MAX_PAGE_SIZE: i64 = 1000;

const DEFAULT_TAKE: i64 = 10;
const DEFAULT_SORT_KEY: &str = "id";

/// The tenant scope of one request.
///
/// Only produced by [`AuthorizationGate::resolve`](crate::AuthorizationGate::resolve).
/// An empty `allowed_tenants` means unrestricted and occurs only for admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationContext {
    allowed_tenants: Vec<TenantId>,
    is_admin: bool,
}

impl AuthorizationContext {
    pub(crate) fn admin() -> Self {
        Self {
            allowed_tenants: Vec::new(),
            is_admin: true,
        }
    }

    pub(crate) fn tenants(allowed_tenants: Vec<TenantId>) -> Self {
        Self {
            allowed_tenants,
            is_admin: false,
        }
    }

    /// Returns the tenants in scope. Empty for admins.
    #[must_use]
    pub fn allowed_tenants(&self) -> &[TenantId] {
        &self.allowed_tenants
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Returns true if data of `tenant_id` is in scope.
    #[must_use]
    pub fn covers(&self, tenant_id: &TenantId) -> bool {
        self.is_admin || self.allowed_tenants.contains(tenant_id)
    }
}

/// How mutations are checked against a tenant's capability flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPolicy {
    /// Every mutation requires all four flags.
    #[default]
    AllCapabilities,
    /// A mutation requires only the flag of the attempted operation.
    OperationSpecific,
}

/// Sort order of a list request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Ascending,
    #[serde(rename = "DESC", alias = "desc")]
    Descending,
}

impl SortDirection {
    /// Returns the ordering clause the handler service expects.
    #[must_use]
    pub fn as_order_clause(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC NULLS LAST",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_order_clause())
    }
}

/// Pagination options as supplied by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub sort_key: Option<String>,
    pub sort_direction: Option<SortDirection>,
    pub search: Option<String>,
}

/// A list request to the handler service, carrying the caller's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    /// Tenants whose rows may be returned. Empty means unrestricted.
    pub allowed_tenants: Vec<TenantId>,
    pub skip: u64,
    pub take: u64,
    /// snake_case column name.
    pub sort_key: String,
    pub sort_direction: SortDirection,
    /// Lower-cased search term; empty for no search.
    pub search_field: String,
}

impl ListRequest {
    /// Builds a request scoped to `ctx` from client options.
    pub fn scoped(ctx: &AuthorizationContext, options: &ListOptions) -> Result<Self, AuthzError> {
        let skip = options.skip.unwrap_or(0);
        let take = options.take.unwrap_or(DEFAULT_TAKE);

        if skip < 0 || take < 0 {
            return Err(AuthzError::invalid_input("skip and take must not be negative"));
        }
        if take > MAX_PAGE_SIZE {
            return Err(AuthzError::invalid_input(format!(
                "could not retrieve more than {MAX_PAGE_SIZE} items"
            )));
        }

        let sort_key = match options.sort_key.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_SORT_KEY.to_string(),
            Some(key) => to_snake_case(key)?,
        };

        Ok(Self {
            allowed_tenants: ctx.allowed_tenants().to_vec(),
            skip: skip.unsigned_abs(),
            take: take.unsigned_abs(),
            sort_key,
            sort_direction: options.sort_direction.unwrap_or_default(),
            search_field: options
                .search
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_default(),
        })
    }
}

/// Converts a camelCase column name to snake_case.
///
/// Only ASCII letters, digits and underscores are accepted since the result
/// ends up in an ORDER BY clause downstream.
fn to_snake_case(key: &str) -> Result<String, AuthzError> {
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AuthzError::invalid_input(format!("invalid sort key '{key}'")));
    }

    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> AuthorizationContext {
        AuthorizationContext::tenants(vec![TenantId::new("t1")])
    }

    #[test]
    fn list_defaults() {
        let request = ListRequest::scoped(&scope(), &ListOptions::default()).expect("request");

        assert_eq!(request.allowed_tenants, vec![TenantId::new("t1")]);
        assert_eq!(request.skip, 0);
        assert_eq!(request.take, 10);
        assert_eq!(request.sort_key, "id");
        assert_eq!(request.sort_direction.as_order_clause(), "ASC");
        assert_eq!(request.search_field, "");
    }

    #[test]
    fn list_options_are_normalised() {
        let options = ListOptions {
            skip: Some(20),
            take: Some(1000),
            sort_key: Some("storageLocationId".to_string()),
            sort_direction: Some(SortDirection::Descending),
            search: Some("  Archive ".to_string()),
        };

        let request = ListRequest::scoped(&scope(), &options).expect("request");

        assert_eq!(request.skip, 20);
        assert_eq!(request.take, 1000);
        assert_eq!(request.sort_key, "storage_location_id");
        assert_eq!(request.sort_direction.as_order_clause(), "DESC NULLS LAST");
        assert_eq!(request.search_field, "archive");
    }

    #[test]
    fn admin_scope_is_unrestricted() {
        let request =
            ListRequest::scoped(&AuthorizationContext::admin(), &ListOptions::default())
                .expect("request");
        assert!(request.allowed_tenants.is_empty());
    }

    #[test]
    fn oversized_pages_are_rejected() {
        let options = ListOptions {
            take: Some(1001),
            ..ListOptions::default()
        };

        let err = ListRequest::scoped(&scope(), &options).unwrap_err();

        assert_eq!(err.code().as_str(), "BAD_REQUEST");
        assert!(err.to_string().contains("could not retrieve more than 1000 items"));
    }

    #[test]
    fn negative_paging_is_rejected() {
        for (skip, take) in [(Some(-1), None), (None, Some(-5))] {
            let options = ListOptions {
                skip,
                take,
                ..ListOptions::default()
            };
            assert!(matches!(
                ListRequest::scoped(&scope(), &options),
                Err(AuthzError::InvalidInput { .. })
            ));
        }
    }

    #[test]
    fn sort_keys_must_be_identifiers() {
        let options = ListOptions {
            sort_key: Some("id; DROP TABLE tenant".to_string()),
            ..ListOptions::default()
        };
        assert!(ListRequest::scoped(&scope(), &options).is_err());
    }

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("id").expect("ok"), "id");
        assert_eq!(to_snake_case("createdAt").expect("ok"), "created_at");
        assert_eq!(to_snake_case("already_snake").expect("ok"), "already_snake");
        assert_eq!(to_snake_case("quality2Level").expect("ok"), "quality2_level");
    }

    #[test]
    fn list_options_deserialize_from_camel_case() {
        let options: ListOptions = serde_json::from_str(
            r#"{"skip": 5, "take": 50, "sortKey": "name", "sortDirection": "DESC", "search": "x"}"#,
        )
        .expect("deserialize");

        assert_eq!(options.take, Some(50));
        assert_eq!(options.sort_key.as_deref(), Some("name"));
        assert_eq!(options.sort_direction, Some(SortDirection::Descending));
    }

    #[test]
    fn mutation_policy_names() {
        let policy: MutationPolicy =
            serde_json::from_str("\"operation_specific\"").expect("deserialize");
        assert_eq!(policy, MutationPolicy::OperationSpecific);
        assert_eq!(MutationPolicy::default(), MutationPolicy::AllCapabilities);
    }
}
