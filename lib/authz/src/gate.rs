//! The authorization gate.

use clerk_core::TenantId;
use clerk_platform_access::{Capability, UserClaim};
use serde::Deserialize;
use tracing::instrument;

use crate::error::AuthzError;
use crate::types::{AuthorizationContext, MutationPolicy};

/// UI markers for what a user may manage within a tenant.
pub const TENANT_PERMISSION_MARKERS: [&str; 3] =
    ["collection", "storageLocation", "storagePartition"];

/// Gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthzConfig {
    /// Group whose members see every tenant. Default: "dlza-admin"
    #[serde(default = "default_admin_group")]
    pub admin_group: String,
    /// Default: all_capabilities
    #[serde(default)]
    pub mutation_policy: MutationPolicy,
}

fn default_admin_group() -> String {
    "dlza-admin".to_string()
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            admin_group: default_admin_group(),
            mutation_policy: MutationPolicy::default(),
        }
    }
}

/// Computes and enforces tenant scope.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate {
    config: AuthzConfig,
}

impl AuthorizationGate {
    #[must_use]
    pub fn new(config: AuthzConfig) -> Self {
        Self { config }
    }

    /// Returns true if the claim's groups include the admin group.
    #[must_use]
    pub fn is_admin(&self, claim: &UserClaim) -> bool {
        claim.in_group(&self.config.admin_group)
    }

    /// Resolves the tenant scope of a user.
    ///
    /// Admins get an unrestricted scope; everyone else is scoped to the
    /// tenants of their `tenant_list`. A user with neither is denied.
    #[instrument(skip_all, fields(subject = claim.subject()))]
    pub fn resolve(&self, claim: &UserClaim) -> Result<AuthorizationContext, AuthzError> {
        if self.is_admin(claim) {
            return Ok(AuthorizationContext::admin());
        }

        let mut tenants: Vec<TenantId> = Vec::with_capacity(claim.tenant_list().len());
        for permission in claim.tenant_list() {
            if !tenants.contains(&permission.tenant_id) {
                tenants.push(permission.tenant_id.clone());
            }
        }

        if tenants.is_empty() {
            tracing::info!("user has no tenant scope");
            return Err(AuthzError::forbidden("not allowed to retrieve data"));
        }
        Ok(AuthorizationContext::tenants(tenants))
    }

    /// Checks that a single tenant is within the resolved scope.
    pub fn authorize_tenant(
        &self,
        ctx: &AuthorizationContext,
        tenant_id: &TenantId,
    ) -> Result<(), AuthzError> {
        if ctx.covers(tenant_id) {
            Ok(())
        } else {
            tracing::info!(tenant_id = %tenant_id, "tenant outside of scope");
            Err(AuthzError::forbidden(format!(
                "not allowed to access tenant '{tenant_id}'"
            )))
        }
    }

    /// Checks that the user may perform `operation` on data of `tenant_id`.
    ///
    /// Decided by the tenant's entry in the claim alone; admin membership
    /// grants no capabilities.
    #[instrument(skip_all, fields(subject = claim.subject(), tenant_id = %tenant_id, operation = %operation))]
    pub fn authorize_mutation(
        &self,
        claim: &UserClaim,
        tenant_id: &TenantId,
        operation: Capability,
    ) -> Result<(), AuthzError> {
        if self.permits(claim, tenant_id, operation) {
            Ok(())
        } else {
            tracing::info!("mutation denied");
            Err(AuthzError::forbidden(format!(
                "not allowed to {operation} data of tenant '{tenant_id}'"
            )))
        }
    }

    /// Returns the management markers the user holds for a tenant.
    #[must_use]
    pub fn tenant_permissions(&self, claim: &UserClaim, tenant_id: &TenantId) -> Vec<&'static str> {
        let manage = [Capability::Create, Capability::Update, Capability::Delete]
            .into_iter()
            .all(|op| self.permits(claim, tenant_id, op));

        if manage {
            TENANT_PERMISSION_MARKERS.to_vec()
        } else {
            Vec::new()
        }
    }

    fn permits(&self, claim: &UserClaim, tenant_id: &TenantId, operation: Capability) -> bool {
        let Some(permission) = claim.tenant(tenant_id) else {
            return false;
        };
        match self.config.mutation_policy {
            MutationPolicy::AllCapabilities => permission.allows_all(),
            MutationPolicy::OperationSpecific => permission.allows(operation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clerk_platform_access::ClaimExtractor;
    use clerk_platform_access::testing::access_token;
    use serde_json::{Value, json};

    fn claim(groups: &[&str], tenants: Value) -> UserClaim {
        ClaimExtractor::new("groups", "tenant_list")
            .extract(&access_token("u1", groups, tenants))
            .expect("claim")
    }

    fn gate(policy: MutationPolicy) -> AuthorizationGate {
        AuthorizationGate::new(AuthzConfig {
            mutation_policy: policy,
            ..AuthzConfig::default()
        })
    }

    fn t(id: &str) -> TenantId {
        TenantId::new(id)
    }

    #[test]
    fn admins_are_unrestricted() {
        let claim = claim(&["dlza-admin"], json!([{"id": "t1", "read": true}]));

        let ctx = AuthorizationGate::default().resolve(&claim).expect("resolve");

        assert!(ctx.is_admin());
        assert!(ctx.allowed_tenants().is_empty());
        assert!(ctx.covers(&t("anything")));
    }

    #[test]
    fn users_are_scoped_to_their_tenants() {
        let claim = claim(
            &["dlza-users"],
            json!([{"id": "t1", "read": true}, {"id": "t2"}, {"id": "t1"}]),
        );

        let ctx = AuthorizationGate::default().resolve(&claim).expect("resolve");

        assert!(!ctx.is_admin());
        assert_eq!(ctx.allowed_tenants(), &[t("t1"), t("t2")]);
    }

    #[test]
    fn users_without_scope_are_forbidden() {
        let claim = claim(&["dlza-users"], json!([]));

        let err = AuthorizationGate::default().resolve(&claim).unwrap_err();

        assert_eq!(err, AuthzError::forbidden("not allowed to retrieve data"));
        assert_eq!(err.code().http_status(), 403);
    }

    #[test]
    fn admin_group_is_configurable() {
        let claim = claim(&["archive-admins"], json!([]));
        let gate = AuthorizationGate::new(AuthzConfig {
            admin_group: "archive-admins".to_string(),
            ..AuthzConfig::default()
        });

        assert!(gate.resolve(&claim).expect("resolve").is_admin());
        assert!(AuthorizationGate::default().resolve(&claim).is_err());
    }

    #[test]
    fn foreign_tenant_lookup_is_forbidden() {
        let gate = AuthorizationGate::default();
        let ctx = gate
            .resolve(&claim(&[], json!([{"id": "t1", "read": true}])))
            .expect("resolve");

        assert!(gate.authorize_tenant(&ctx, &t("t1")).is_ok());
        let err = gate.authorize_tenant(&ctx, &t("t2")).unwrap_err();
        assert_eq!(err.code().as_str(), "FORBIDDEN");
    }

    #[test]
    fn all_capabilities_policy_requires_every_flag() {
        let gate = gate(MutationPolicy::AllCapabilities);
        let partial = claim(
            &[],
            json!([{"id": "t1", "create": true, "read": true, "update": true, "delete": false}]),
        );
        let full = claim(
            &[],
            json!([{"id": "t1", "create": true, "read": true, "update": true, "delete": true}]),
        );

        assert!(gate.authorize_mutation(&partial, &t("t1"), Capability::Create).is_err());
        assert!(gate.authorize_mutation(&full, &t("t1"), Capability::Create).is_ok());
        assert!(gate.authorize_mutation(&full, &t("t2"), Capability::Create).is_err());
    }

    #[test]
    fn operation_specific_policy_checks_one_flag() {
        let gate = gate(MutationPolicy::OperationSpecific);
        let creator = claim(&[], json!([{"id": "t1", "create": true}]));

        assert!(gate.authorize_mutation(&creator, &t("t1"), Capability::Create).is_ok());
        assert!(gate.authorize_mutation(&creator, &t("t1"), Capability::Delete).is_err());
    }

    #[test]
    fn admin_membership_grants_no_mutations() {
        let admin = claim(&["dlza-admin"], json!([]));
        let err = AuthorizationGate::default()
            .authorize_mutation(&admin, &t("t1"), Capability::Delete)
            .unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden { .. }));
    }

    #[test]
    fn tenant_permission_markers() {
        let gate = AuthorizationGate::default();
        let full = claim(
            &[],
            json!([
                {"id": "t1", "create": true, "read": true, "update": true, "delete": true},
                {"id": "t2", "read": true}
            ]),
        );

        assert_eq!(
            gate.tenant_permissions(&full, &t("t1")),
            vec!["collection", "storageLocation", "storagePartition"]
        );
        assert!(gate.tenant_permissions(&full, &t("t2")).is_empty());
        assert!(gate.tenant_permissions(&full, &t("t3")).is_empty());
    }

    #[test]
    fn config_defaults() {
        let config: AuthzConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config, AuthzConfig::default());
        assert_eq!(config.admin_group, "dlza-admin");
    }
}
