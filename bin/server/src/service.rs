//! Scoped data access shared by the REST and GraphQL surfaces.
//!
//! Every operation takes the [`AuthorizationContext`] resolved for the
//! request. List reads hand the scope to the handler service, which filters
//! rows; single-entity reads and mutations are checked here first.

use clerk_authz::{AuthorizationContext, AuthzError, ListOptions, ListRequest};
use clerk_core::TenantId;
use clerk_platform_access::{Capability, UserClaim};
use serde::Serialize;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::handler::{Collection, HandlerError, NewCollection, Page, Tenant};

/// A tenant together with the management markers the caller holds for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantView {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub permissions: Vec<&'static str>,
}

impl AppState {
    pub async fn list_tenants(
        &self,
        claim: &UserClaim,
        scope: &AuthorizationContext,
        options: &ListOptions,
    ) -> Result<Page<TenantView>, ApiError> {
        let request = ListRequest::scoped(scope, options)?;
        let page = self.handler.tenants(&request).await?;

        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|tenant| self.tenant_view(claim, tenant))
                .collect(),
            total_items: page.total_items,
        })
    }

    /// Fetches one tenant; fails `Forbidden` outside the caller's scope.
    pub async fn tenant(
        &self,
        claim: &UserClaim,
        scope: &AuthorizationContext,
        tenant_id: &TenantId,
    ) -> Result<TenantView, ApiError> {
        self.gate.authorize_tenant(scope, tenant_id)?;
        let tenant = self.handler.tenant(tenant_id).await?;
        Ok(self.tenant_view(claim, tenant))
    }

    pub async fn list_collections(
        &self,
        scope: &AuthorizationContext,
        tenant_id: Option<&TenantId>,
        options: &ListOptions,
    ) -> Result<Page<Collection>, ApiError> {
        if let Some(tenant_id) = tenant_id {
            self.gate.authorize_tenant(scope, tenant_id)?;
        }
        let request = ListRequest::scoped(scope, options)?;
        Ok(self.handler.collections(tenant_id, &request).await?)
    }

    pub async fn create_collection(
        &self,
        claim: &UserClaim,
        input: NewCollection,
    ) -> Result<Collection, ApiError> {
        self.gate
            .authorize_mutation(claim, &input.tenant_id, Capability::Create)?;
        let collection = self.handler.create_collection(input).await?;

        tracing::info!(
            collection_id = %collection.id,
            tenant_id = %collection.tenant_id,
            subject = claim.subject(),
            "created collection"
        );
        Ok(collection)
    }

    /// Deletes a collection after checking the owning tenant's capabilities.
    ///
    /// Unknown ids fail exactly like collections of tenants the caller may
    /// not modify, so the response reveals nothing about other tenants.
    pub async fn delete_collection(&self, claim: &UserClaim, id: &str) -> Result<(), ApiError> {
        let denied = || {
            ApiError::from(AuthzError::Forbidden {
                reason: format!("not allowed to delete collection '{id}'"),
            })
        };

        let collection = match self.handler.collection(id).await {
            Ok(collection) => collection,
            Err(HandlerError::NotFound { .. }) => return Err(denied()),
            Err(e) => return Err(e.into()),
        };
        if self
            .gate
            .authorize_mutation(claim, &collection.tenant_id, Capability::Delete)
            .is_err()
        {
            return Err(denied());
        }
        self.handler.delete_collection(id).await?;

        tracing::info!(
            collection_id = id,
            tenant_id = %collection.tenant_id,
            subject = claim.subject(),
            "deleted collection"
        );
        Ok(())
    }

    fn tenant_view(&self, claim: &UserClaim, tenant: Tenant) -> TenantView {
        let permissions = self.gate.tenant_permissions(claim, &tenant.id);
        TenantView {
            tenant,
            permissions,
        }
    }
}
