//! Contract with the downstream handler service.
//!
//! The handler service owns tenants and collections. Every list call carries
//! the caller's [`ListRequest`], whose `allowed_tenants` the handler must
//! apply as a row filter. [`InMemoryHandler`] implements the contract for
//! single-node deployments and tests.

use async_trait::async_trait;
use clerk_authz::{ListRequest, SortDirection};
use clerk_core::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;

/// A tenant as stored by the handler service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub alias: String,
    pub email: String,
}

/// A collection belonging to one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub tenant_id: TenantId,
    pub name: String,
    pub alias: String,
    #[serde(default)]
    pub description: String,
}

/// Input for creating a collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollection {
    pub tenant_id: TenantId,
    pub name: String,
    pub alias: String,
    #[serde(default)]
    pub description: String,
}

/// One page of a list result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matching rows before pagination.
    pub total_items: u64,
}

/// Handler service errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The entity does not exist.
    NotFound { entity: &'static str, id: String },
    /// The request was rejected by the handler.
    InvalidInput { details: String },
    /// The handler could not be reached.
    Unavailable { details: String },
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} '{id}' not found"),
            Self::InvalidInput { details } => write!(f, "invalid request: {details}"),
            Self::Unavailable { details } => write!(f, "handler service unavailable: {details}"),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Data access operations offered by the handler service.
#[async_trait]
pub trait HandlerService: Send + Sync {
    async fn tenants(&self, request: &ListRequest) -> Result<Page<Tenant>, HandlerError>;

    async fn tenant(&self, id: &TenantId) -> Result<Tenant, HandlerError>;

    /// Lists collections, optionally of a single tenant.
    async fn collections(
        &self,
        tenant_id: Option<&TenantId>,
        request: &ListRequest,
    ) -> Result<Page<Collection>, HandlerError>;

    async fn collection(&self, id: &str) -> Result<Collection, HandlerError>;

    async fn create_collection(&self, input: NewCollection) -> Result<Collection, HandlerError>;

    async fn delete_collection(&self, id: &str) -> Result<(), HandlerError>;
}

/// Handler service backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryHandler {
    tenants: RwLock<Vec<Tenant>>,
    collections: RwLock<Vec<Collection>>,
}

impl InMemoryHandler {
    #[must_use]
    pub fn new(tenants: Vec<Tenant>, collections: Vec<Collection>) -> Self {
        Self {
            tenants: RwLock::new(tenants),
            collections: RwLock::new(collections),
        }
    }
}

fn in_scope(request: &ListRequest, tenant_id: &TenantId) -> bool {
    request.allowed_tenants.is_empty() || request.allowed_tenants.contains(tenant_id)
}

fn matches_search(request: &ListRequest, fields: [&str; 2]) -> bool {
    request.search_field.is_empty()
        || fields
            .iter()
            .any(|f| f.to_lowercase().contains(&request.search_field))
}

/// Sorts and paginates `rows`. `key` maps a sort key to a comparable field.
fn paginate<T>(
    mut rows: Vec<T>,
    request: &ListRequest,
    key: impl Fn(&T, &str) -> Option<String>,
) -> Result<Page<T>, HandlerError> {
    if let Some(first) = rows.first() {
        if key(first, &request.sort_key).is_none() {
            return Err(HandlerError::InvalidInput {
                details: format!("unknown sort key '{}'", request.sort_key),
            });
        }
    }

    rows.sort_by(|a, b| {
        let ordering = key(a, &request.sort_key).cmp(&key(b, &request.sort_key));
        match request.sort_direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });

    let total_items = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(usize::try_from(request.skip).unwrap_or(usize::MAX))
        .take(usize::try_from(request.take).unwrap_or(usize::MAX))
        .collect();

    Ok(Page { items, total_items })
}

#[async_trait]
impl HandlerService for InMemoryHandler {
    async fn tenants(&self, request: &ListRequest) -> Result<Page<Tenant>, HandlerError> {
        let rows: Vec<Tenant> = self
            .tenants
            .read()
            .await
            .iter()
            .filter(|t| in_scope(request, &t.id))
            .filter(|t| matches_search(request, [&t.name, &t.alias]))
            .cloned()
            .collect();

        paginate(rows, request, |t, key| match key {
            "id" => Some(t.id.to_string()),
            "name" => Some(t.name.clone()),
            "alias" => Some(t.alias.clone()),
            "email" => Some(t.email.clone()),
            _ => None,
        })
    }

    async fn tenant(&self, id: &TenantId) -> Result<Tenant, HandlerError> {
        self.tenants
            .read()
            .await
            .iter()
            .find(|t| &t.id == id)
            .cloned()
            .ok_or_else(|| HandlerError::NotFound {
                entity: "tenant",
                id: id.to_string(),
            })
    }

    async fn collections(
        &self,
        tenant_id: Option<&TenantId>,
        request: &ListRequest,
    ) -> Result<Page<Collection>, HandlerError> {
        let rows: Vec<Collection> = self
            .collections
            .read()
            .await
            .iter()
            .filter(|c| tenant_id.is_none_or(|t| &c.tenant_id == t))
            .filter(|c| in_scope(request, &c.tenant_id))
            .filter(|c| matches_search(request, [&c.name, &c.alias]))
            .cloned()
            .collect();

        paginate(rows, request, |c, key| match key {
            "id" => Some(c.id.clone()),
            "tenant_id" => Some(c.tenant_id.to_string()),
            "name" => Some(c.name.clone()),
            "alias" => Some(c.alias.clone()),
            _ => None,
        })
    }

    async fn collection(&self, id: &str) -> Result<Collection, HandlerError> {
        self.collections
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| HandlerError::NotFound {
                entity: "collection",
                id: id.to_string(),
            })
    }

    async fn create_collection(&self, input: NewCollection) -> Result<Collection, HandlerError> {
        if input.alias.trim().is_empty() {
            return Err(HandlerError::InvalidInput {
                details: "collection alias must not be empty".to_string(),
            });
        }
        self.tenant(&input.tenant_id).await?;

        let mut collections = self.collections.write().await;
        if collections
            .iter()
            .any(|c| c.tenant_id == input.tenant_id && c.alias == input.alias)
        {
            return Err(HandlerError::InvalidInput {
                details: format!("collection alias '{}' already exists", input.alias),
            });
        }

        let collection = Collection {
            id: ulid::Ulid::new().to_string(),
            tenant_id: input.tenant_id,
            name: input.name,
            alias: input.alias,
            description: input.description,
        };
        collections.push(collection.clone());
        Ok(collection)
    }

    async fn delete_collection(&self, id: &str) -> Result<(), HandlerError> {
        let mut collections = self.collections.write().await;
        let before = collections.len();
        collections.retain(|c| c.id != id);
        if collections.len() == before {
            return Err(HandlerError::NotFound {
                entity: "collection",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
