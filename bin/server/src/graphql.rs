//! GraphQL surface.
//!
//! Authorization is enforced once, by the [`ScopeGuard`] schema extension:
//! before any top-level field resolves, the guard authenticates the session
//! and (for data fields) resolves the tenant scope. The results are cached
//! in the request's [`RequestAuth`], so resolvers only read them.

use async_graphql::extensions::{
    Extension, ExtensionContext, ExtensionFactory, NextResolve, ResolveInfo,
};
use async_graphql::{
    Context, EmptySubscription, Enum, InputObject, Object, Schema, ServerError, ServerResult,
    SimpleObject, Value,
};
use axum::http::{HeaderMap, header::SET_COOKIE};
use axum::{Extension as AxumExtension, Json, extract::State};
use axum_extra::extract::CookieJar;
use clerk_authz::{AuthorizationContext, ListOptions, SortDirection};
use clerk_core::{SessionId, TenantId};
use clerk_platform_access::{AuthError, AuthenticatedUser, UserClaim};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::handler::{self, NewCollection, Page};
use crate::service::TenantView;

pub type ClerkSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Builds the schema over the shared application state.
pub fn schema(state: Arc<AppState>) -> ClerkSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(state)
        .extension(ScopeGuard)
        .finish()
}

/// `POST /graphql`
///
/// Headers set by resolvers (the session cookie on login and logout) are
/// forwarded to the HTTP response.
pub async fn graphql_handler(
    State(state): State<Arc<AppState>>,
    AxumExtension(schema): AxumExtension<ClerkSchema>,
    jar: CookieJar,
    Json(request): Json<async_graphql::Request>,
) -> (HeaderMap, Json<async_graphql::Response>) {
    let auth = RequestAuth::new(state.session_id(&jar));
    let mut response = schema.execute(request.data(auth)).await;
    let headers = std::mem::take(&mut response.http_headers);
    (headers, Json(response))
}

/// Per-request authentication state, filled in by [`ScopeGuard`].
pub struct RequestAuth {
    session_id: Option<SessionId>,
    user: OnceCell<Result<AuthenticatedUser, ApiError>>,
    scope: OnceCell<Result<AuthorizationContext, ApiError>>,
}

impl RequestAuth {
    pub fn new(session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            user: OnceCell::new(),
            scope: OnceCell::new(),
        }
    }

    /// Authenticates the session at most once per request.
    async fn verify(&self, state: &AppState) -> Result<&AuthenticatedUser, ApiError> {
        self.user
            .get_or_init(|| self.authenticate(state))
            .await
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Resolves the tenant scope at most once per request.
    async fn resolve_scope(&self, state: &AppState) -> Result<&AuthorizationContext, ApiError> {
        let user = self.verify(state).await?;
        self.scope
            .get_or_init(|| async { state.gate.resolve(user.claim()).map_err(ApiError::from) })
            .await
            .as_ref()
            .map_err(Clone::clone)
    }

    async fn authenticate(&self, state: &AppState) -> Result<AuthenticatedUser, ApiError> {
        let Some(session_id) = self.session_id else {
            return Err(AuthError::unauthenticated("no session").into());
        };
        Ok(state.lifecycle.authenticate(&session_id).await?)
    }

    fn user(&self) -> Result<&AuthenticatedUser, ApiError> {
        match self.user.get() {
            Some(result) => result.as_ref().map_err(Clone::clone),
            None => Err(AuthError::unauthenticated("request was not authenticated").into()),
        }
    }

    fn scope(&self) -> Result<&AuthorizationContext, ApiError> {
        match self.scope.get() {
            Some(result) => result.as_ref().map_err(Clone::clone),
            None => Err(AuthError::unauthenticated("request was not authorized").into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Public,
    Authenticated,
    Scoped,
}

fn access(parent_type: &str, field: &str) -> Access {
    match (parent_type, field) {
        ("Mutation", "login" | "logout") => Access::Public,
        ("Query", "me") => Access::Authenticated,
        _ => Access::Scoped,
    }
}

fn server_error(e: ApiError) -> ServerError {
    let error = e.into_graphql();
    let mut server_error = ServerError::new(error.message, None);
    server_error.extensions = error.extensions;
    server_error
}

/// Schema extension authorizing every top-level field.
pub struct ScopeGuard;

impl ExtensionFactory for ScopeGuard {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(ScopeGuardExtension)
    }
}

struct ScopeGuardExtension;

#[async_trait::async_trait]
impl Extension for ScopeGuardExtension {
    async fn resolve(
        &self,
        ctx: &ExtensionContext<'_>,
        info: ResolveInfo<'_>,
        next: NextResolve<'_>,
    ) -> ServerResult<Option<Value>> {
        let top_level = info.path_node.parent.is_none();
        if !top_level || info.is_for_introspection || info.name.starts_with("__") {
            return next.run(ctx, info).await;
        }

        let required = access(info.parent_type, info.name);
        if required != Access::Public {
            let (Some(state), Some(auth)) = (
                ctx.data_opt::<Arc<AppState>>(),
                ctx.data_opt::<RequestAuth>(),
            ) else {
                return Err(ServerError::new("missing request context", None));
            };

            match required {
                Access::Scoped => {
                    auth.resolve_scope(state).await.map_err(server_error)?;
                }
                Access::Authenticated => {
                    auth.verify(state).await.map_err(server_error)?;
                }
                Access::Public => {}
            }
        }

        next.run(ctx, info).await
    }
}

fn parts<'a>(ctx: &Context<'a>) -> async_graphql::Result<(&'a Arc<AppState>, &'a RequestAuth)> {
    Ok((ctx.data::<Arc<AppState>>()?, ctx.data::<RequestAuth>()?))
}

#[derive(SimpleObject)]
pub struct TenantAccess {
    id: String,
    create: bool,
    read: bool,
    update: bool,
    delete: bool,
}

/// The signed-in user.
#[derive(SimpleObject)]
pub struct User {
    subject: String,
    username: String,
    email: Option<String>,
    groups: Vec<String>,
    is_admin: bool,
    tenants: Vec<TenantAccess>,
}

impl User {
    fn new(claim: &UserClaim, is_admin: bool) -> Self {
        Self {
            subject: claim.subject().to_string(),
            username: claim.username().to_string(),
            email: claim.email().map(str::to_string),
            groups: claim.groups().iter().cloned().collect(),
            is_admin,
            tenants: claim
                .tenant_list()
                .iter()
                .map(|p| TenantAccess {
                    id: p.tenant_id.to_string(),
                    create: p.create,
                    read: p.read,
                    update: p.update,
                    delete: p.delete,
                })
                .collect(),
        }
    }
}

#[derive(SimpleObject)]
pub struct Tenant {
    id: String,
    name: String,
    alias: String,
    email: String,
    /// Management markers the caller holds for this tenant.
    permissions: Vec<String>,
}

impl From<TenantView> for Tenant {
    fn from(view: TenantView) -> Self {
        Self {
            id: view.tenant.id.to_string(),
            name: view.tenant.name,
            alias: view.tenant.alias,
            email: view.tenant.email,
            permissions: view.permissions.into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(SimpleObject)]
pub struct Collection {
    id: String,
    tenant_id: String,
    name: String,
    alias: String,
    description: String,
}

impl From<handler::Collection> for Collection {
    fn from(c: handler::Collection) -> Self {
        Self {
            id: c.id,
            tenant_id: c.tenant_id.to_string(),
            name: c.name,
            alias: c.alias,
            description: c.description,
        }
    }
}

#[derive(SimpleObject)]
pub struct TenantPage {
    items: Vec<Tenant>,
    total_items: u64,
}

#[derive(SimpleObject)]
pub struct CollectionPage {
    items: Vec<Collection>,
    total_items: u64,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(InputObject, Default)]
pub struct ListInput {
    skip: Option<i64>,
    take: Option<i64>,
    sort_key: Option<String>,
    sort_direction: Option<SortOrder>,
    search: Option<String>,
}

impl From<ListInput> for ListOptions {
    fn from(input: ListInput) -> Self {
        Self {
            skip: input.skip,
            take: input.take,
            sort_key: input.sort_key,
            sort_direction: input.sort_direction.map(|order| match order {
                SortOrder::Asc => SortDirection::Ascending,
                SortOrder::Desc => SortDirection::Descending,
            }),
            search: input.search,
        }
    }
}

#[derive(InputObject)]
pub struct CollectionInput {
    tenant_id: String,
    name: String,
    alias: String,
    description: Option<String>,
}

pub struct QueryRoot;

#[Object(name = "Query")]
impl QueryRoot {
    /// The signed-in user and their tenant permissions.
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<User> {
        let (state, auth) = parts(ctx)?;
        let user = auth.user().map_err(ApiError::into_graphql)?;
        Ok(User::new(user.claim(), state.gate.is_admin(user.claim())))
    }

    async fn tenants(
        &self,
        ctx: &Context<'_>,
        options: Option<ListInput>,
    ) -> async_graphql::Result<TenantPage> {
        let (state, auth) = parts(ctx)?;
        let options = ListOptions::from(options.unwrap_or_default());

        let page = scoped(auth, |user, scope| async move {
            state.list_tenants(user.claim(), scope, &options).await
        })
        .await?;

        Ok(TenantPage {
            items: page.items.into_iter().map(Tenant::from).collect(),
            total_items: page.total_items,
        })
    }

    async fn tenant(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<Tenant> {
        let (state, auth) = parts(ctx)?;
        let tenant_id = TenantId::new(id);

        let view = scoped(auth, |user, scope| async move {
            state.tenant(user.claim(), scope, &tenant_id).await
        })
        .await?;

        Ok(view.into())
    }

    async fn collections(
        &self,
        ctx: &Context<'_>,
        tenant_id: Option<String>,
        options: Option<ListInput>,
    ) -> async_graphql::Result<CollectionPage> {
        let (state, auth) = parts(ctx)?;
        let tenant_id = tenant_id.map(TenantId::new);
        let options = ListOptions::from(options.unwrap_or_default());

        let page: Page<handler::Collection> = scoped(auth, |_, scope| async move {
            state
                .list_collections(scope, tenant_id.as_ref(), &options)
                .await
        })
        .await?;

        Ok(CollectionPage {
            items: page.items.into_iter().map(Collection::from).collect(),
            total_items: page.total_items,
        })
    }
}

pub struct MutationRoot;

#[Object(name = "Mutation")]
impl MutationRoot {
    /// Completes a login started through `/auth/login`. The session moves
    /// to a new id, sent back as a replacement cookie.
    async fn login(
        &self,
        ctx: &Context<'_>,
        code: String,
        state: String,
    ) -> async_graphql::Result<User> {
        let (app, auth) = parts(ctx)?;
        let Some(session_id) = auth.session_id else {
            return Err(ApiError::from(AuthError::NonceOrStateMismatch { parameter: "state" })
                .into_graphql());
        };

        let outcome = app
            .lifecycle
            .complete_login(&session_id, &code, &state)
            .await
            .map_err(|e| ApiError::from(e).into_graphql())?;
        ctx.append_http_header(
            SET_COOKIE,
            app.session_cookie(outcome.session_id).to_string(),
        );

        let is_admin = app.gate.is_admin(&outcome.claim);
        Ok(User::new(&outcome.claim, is_admin))
    }

    /// Clears the session. Succeeds when there is none.
    async fn logout(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let (app, auth) = parts(ctx)?;
        if let Some(session_id) = auth.session_id {
            app.lifecycle
                .logout(&session_id)
                .await
                .map_err(|e| ApiError::from(e).into_graphql())?;
        }
        ctx.append_http_header(SET_COOKIE, app.removal_cookie().to_string());
        Ok(true)
    }

    async fn create_collection(
        &self,
        ctx: &Context<'_>,
        input: CollectionInput,
    ) -> async_graphql::Result<Collection> {
        let (state, auth) = parts(ctx)?;
        let input = NewCollection {
            tenant_id: TenantId::new(input.tenant_id),
            name: input.name,
            alias: input.alias,
            description: input.description.unwrap_or_default(),
        };

        let collection = scoped(auth, |user, _| async move {
            state.create_collection(user.claim(), input).await
        })
        .await?;

        Ok(collection.into())
    }

    async fn delete_collection(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<bool> {
        let (state, auth) = parts(ctx)?;

        scoped(auth, |user, _| async move {
            state.delete_collection(user.claim(), &id).await
        })
        .await?;

        Ok(true)
    }
}

/// Runs `f` with the user and scope established by [`ScopeGuard`].
async fn scoped<'a, T, F, Fut>(auth: &'a RequestAuth, f: F) -> async_graphql::Result<T>
where
    F: FnOnce(&'a AuthenticatedUser, &'a AuthorizationContext) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let user = auth.user().map_err(ApiError::into_graphql)?;
    let scope = auth.scope().map_err(ApiError::into_graphql)?;
    f(user, scope).await.map_err(ApiError::into_graphql)
}
