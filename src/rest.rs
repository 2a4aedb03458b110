//! REST API layer for the directory using Axum.
//!
//! Route map follows the original API surface: public reads (listing,
//! slug lookups, the search pipeline) and JWT-protected mutations, with
//! admin-only gates on the taxonomy entities (cities, neighborhoods,
//! categories, subcategories). Responses share one JSON envelope:
//! `{ success, message?, count?, data?, pagination? }`.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{create_jwt, hash_password, validate_jwt, verify_password};
use crate::config::Config;
use crate::error::{ApiError, StoreError};
use crate::models::{
    Address, AuthPayload, Business, BusinessView, Category, City, Favorite, Neighborhood, Role,
    SocialLinks, Status, SubCategory, User,
};
use crate::search::{self, Pagination, SearchOutcome, SearchParams};
use crate::slug::slugify;
use crate::storage::Store;
use crate::upload;

/// Shared app state for REST handlers (Arc-wrapped for concurrency).
pub struct AppState {
    store: Store,
    config: Config,
}

/// Generic REST response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            count: None,
            data: Some(data),
            pagination: None,
        }
    }

    pub fn list(data: T, count: usize) -> Self {
        Self {
            count: Some(count),
            ..Self::data(data)
        }
    }

    pub fn with_message(data: T, message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::data(data)
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            count: None,
            data: None,
            pagination: None,
        }
    }
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::Unauthorized("Acesso não autorizado - Token não fornecido".to_string())
        })?;

    let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized("Acesso não autorizado - Token não fornecido".to_string())
    })?;

    let claims = validate_jwt(token, &state.config.jwt_secret).map_err(|_| {
        ApiError::Unauthorized("Acesso não autorizado - Token inválido".to_string())
    })?;

    if state.store.user(&claims.sub)?.is_none() {
        return Err(ApiError::Unauthorized(
            "O usuário deste token não existe mais".to_string(),
        ));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn require_admin(claims: &AuthPayload) -> Result<(), ApiError> {
    if matches!(claims.role, Role::Admin) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Usuário sem permissão de administrador".to_string(),
        ))
    }
}

fn ensure_owner_or_admin(
    claims: &AuthPayload,
    owner: &str,
    message: &str,
) -> Result<(), ApiError> {
    if claims.sub == owner || matches!(claims.role, Role::Admin) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(message.to_string()))
    }
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation(message.to_string()))
}

/// Parse the `active` list filter: defaults to active-only, `active=false`
/// lists deactivated records (admin managers use it).
fn status_filter(active: Option<&str>) -> Option<Status> {
    match active.map(str::trim) {
        Some("false") => Some(Status::Inactive),
        _ => Some(Status::Active),
    }
}

fn populate_all(store: &Store, businesses: &[Business]) -> Result<Vec<BusinessView>, StoreError> {
    let mut views = Vec::with_capacity(businesses.len());
    for business in businesses {
        views.push(store.populate(business)?);
    }
    Ok(views)
}

/// Create the Axum router with the full directory surface.
pub fn create_router(store: Store, config: Config) -> Router {
    let state = Arc::new(AppState { store, config });

    let public = Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/cities", get(list_cities_handler))
        .route("/cities/popular", get(popular_cities_handler))
        .route("/cities/slug/:slug", get(get_city_by_slug_handler))
        .route("/cities/:id", get(get_city_handler))
        .route("/cities/:id/neighborhoods", get(neighborhoods_of_city_handler))
        .route("/neighborhoods", get(list_neighborhoods_handler))
        .route("/neighborhoods/by-city/:slug", get(neighborhoods_by_city_slug_handler))
        .route("/categories", get(list_categories_handler))
        .route("/subcategories", get(list_sub_categories_handler))
        .route(
            "/subcategories/by-category/:slug",
            get(sub_categories_by_category_handler),
        )
        .route("/businesses", get(list_businesses_handler))
        .route("/businesses/latest", get(latest_businesses_handler))
        .route("/businesses/search", get(search_businesses_handler))
        .route("/businesses/slug/:slug", get(get_business_by_slug_handler))
        .route("/businesses/owner/:owner_id", get(businesses_by_owner_handler))
        .route("/businesses/:id", get(get_business_handler));

    let protected = Router::new()
        .route(
            "/auth/me",
            get(me_handler).put(update_me_handler).delete(delete_me_handler),
        )
        .route("/auth/users", get(list_users_handler))
        .route("/auth/:id", delete(admin_delete_user_handler))
        .route(
            "/favorites",
            get(list_favorites_handler).post(add_favorite_handler),
        )
        .route("/favorites/:id", delete(remove_favorite_handler))
        .route("/cities", post(create_city_handler))
        .route("/cities/:id", put(update_city_handler).delete(delete_city_handler))
        .route("/neighborhoods", post(create_neighborhood_handler))
        .route(
            "/neighborhoods/:id",
            put(update_neighborhood_handler).delete(delete_neighborhood_handler),
        )
        .route("/categories", post(create_category_handler))
        .route(
            "/categories/:id",
            put(update_category_handler).delete(delete_category_handler),
        )
        .route("/subcategories", post(create_sub_category_handler))
        .route(
            "/subcategories/:id",
            put(update_sub_category_handler).delete(delete_sub_category_handler),
        )
        .route("/businesses", post(create_business_handler))
        .route(
            "/businesses/:id",
            put(update_business_handler).delete(delete_business_handler),
        )
        .route("/businesses/:id/photos", put(upload_business_photos_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    public.merge(protected).with_state(state)
}

async fn health_handler() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message(
        "API de Negócios Locais está funcionando",
    ))
}

// --- Auth ---

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
}

/// Authenticated user without the password hash.
#[derive(Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
        }
    }
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let name = required(&payload.name, "Por favor, forneça nome, email e senha")?;
    let email = required(&payload.email, "Por favor, forneça nome, email e senha")?;
    let password = required(&payload.password, "Por favor, forneça nome, email e senha")?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_lowercase(),
        password_hash: hash_password(password).map_err(|e| ApiError::Internal(e.to_string()))?,
        phone: None,
        role: Role::User,
        created_at: Utc::now(),
    };
    state.store.insert_user(&user)?;

    let token = create_jwt(&user, &state.config.jwt_secret, state.config.jwt_ttl_secs)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(TokenResponse { success: true, token })))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = required(&payload.email, "Credenciais inválidas")?;
    let password = required(&payload.password, "Credenciais inválidas")?;

    let user = state
        .store
        .user_by_email(email)?
        .ok_or_else(|| ApiError::Unauthorized("Credenciais inválidas".to_string()))?;

    if !verify_password(password, &user.password_hash).unwrap_or(false) {
        return Err(ApiError::Unauthorized("Credenciais inválidas".to_string()));
    }

    let token = create_jwt(&user, &state.config.jwt_secret, state.config.jwt_ttl_secs)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(TokenResponse { success: true, token }))
}

async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    let user = state
        .store
        .user(&claims.sub)?
        .ok_or_else(|| ApiError::NotFound("Usuário não encontrado".to_string()))?;
    Ok(Json(ApiResponse::data(UserView::from(&user))))
}

#[derive(Deserialize)]
pub struct UpdateMePayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<UpdateMePayload>,
) -> Result<Json<ApiResponse<UserView>>, ApiError> {
    let mut user = state
        .store
        .user(&claims.sub)?
        .ok_or_else(|| ApiError::NotFound("Usuário não encontrado".to_string()))?;

    if let Some(email) = payload.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        if let Some(existing) = state.store.user_by_email(email)? {
            if existing.id != user.id {
                return Err(ApiError::Validation(
                    "Este email já está em uso por outro usuário".to_string(),
                ));
            }
        }
        user.email = email.to_lowercase();
    }
    if let Some(name) = payload.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        user.name = name.to_string();
    }
    if payload.phone.is_some() {
        user.phone = payload.phone.clone();
    }

    state.store.update_user(&user)?;
    Ok(Json(ApiResponse::data(UserView::from(&user))))
}

async fn delete_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.store.delete_user(&claims.sub)?;
    Ok(Json(ApiResponse::message("Conta removida")))
}

async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
) -> Result<Json<ApiResponse<Vec<UserView>>>, ApiError> {
    require_admin(&claims)?;

    let users: Vec<UserView> = state.store.users()?.iter().map(UserView::from).collect();
    let count = users.len();
    Ok(Json(ApiResponse::list(users, count)))
}

async fn admin_delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    require_admin(&claims)?;

    if state.store.user(&id)?.is_none() {
        return Err(ApiError::NotFound("Usuário não encontrado".to_string()));
    }
    state.store.delete_user(&id)?;
    Ok(Json(ApiResponse::message("Usuário removido")))
}

// --- Favorites ---

#[derive(Deserialize)]
pub struct FavoritePayload {
    #[serde(rename = "businessId")]
    pub business_id: Option<String>,
}

/// Favorite with its business joined in for the bookmarks page.
#[derive(Serialize)]
pub struct FavoriteView {
    pub id: String,
    pub business: BusinessView,
    pub created_at: chrono::DateTime<Utc>,
}

async fn list_favorites_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
) -> Result<Json<ApiResponse<Vec<FavoriteView>>>, ApiError> {
    let mut views = Vec::new();
    for favorite in state.store.favorites_by_user(&claims.sub)? {
        // Bookmarks of businesses that no longer exist are dropped
        if let Some(business) = state.store.business(&favorite.business)? {
            views.push(FavoriteView {
                id: favorite.id,
                business: state.store.populate(&business)?,
                created_at: favorite.created_at,
            });
        }
    }
    let count = views.len();
    Ok(Json(ApiResponse::list(views, count)))
}

async fn add_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<FavoritePayload>,
) -> Result<(StatusCode, Json<ApiResponse<Favorite>>), ApiError> {
    let business_id = required(&payload.business_id, "Informe o estabelecimento")?;

    if state
        .store
        .business(business_id)?
        .filter(|b| b.status.is_active())
        .is_none()
    {
        return Err(ApiError::NotFound(
            "Estabelecimento não encontrado".to_string(),
        ));
    }

    if state.store.favorite(&claims.sub, business_id)?.is_some() {
        return Err(ApiError::Validation(
            "Estabelecimento já está nos favoritos".to_string(),
        ));
    }

    let favorite = Favorite {
        id: Uuid::new_v4().to_string(),
        user: claims.sub.clone(),
        business: business_id.to_string(),
        created_at: Utc::now(),
    };
    state.store.add_favorite(&favorite)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::data(favorite))))
}

/// Removal is keyed by the business id, scoped to the caller.
async fn remove_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if !state.store.remove_favorite(&claims.sub, &id)? {
        return Err(ApiError::NotFound("Favorito não encontrado".to_string()));
    }
    Ok(Json(ApiResponse::message("Removido dos favoritos")))
}

// --- Cities ---

async fn list_cities_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<City>>>, ApiError> {
    let cities = state.store.cities()?;
    let count = cities.len();
    Ok(Json(ApiResponse::list(cities, count)))
}

async fn popular_cities_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<crate::models::PopularCity>>>, ApiError> {
    let cities = state.store.popular_cities(8)?;
    Ok(Json(ApiResponse::data(cities)))
}

async fn get_city_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<City>>, ApiError> {
    let city = state
        .store
        .city(&id)?
        .filter(|c| c.status.is_active())
        .ok_or_else(|| ApiError::NotFound("Cidade não encontrada".to_string()))?;
    Ok(Json(ApiResponse::data(city)))
}

async fn get_city_by_slug_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<City>>, ApiError> {
    let city = state
        .store
        .city_by_slug(&slug)?
        .ok_or_else(|| ApiError::NotFound("Cidade não encontrada".to_string()))?;
    Ok(Json(ApiResponse::data(city)))
}

async fn create_city_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<City>>), ApiError> {
    require_admin(&claims)?;

    let form = upload::collect(&mut multipart, &state.config.upload_dir, "cities").await?;
    let cleanup = |form: &upload::UploadForm| {
        let paths = form.files.clone();
        let dir = state.config.upload_dir.clone();
        async move {
            for path in paths {
                upload::delete_upload(&dir, &path).await;
            }
        }
    };

    let Some(name) = form.fields.get("name").map(|n| n.trim()).filter(|n| !n.is_empty()) else {
        cleanup(&form).await;
        return Err(ApiError::Validation("O campo 'name' é obrigatório".to_string()));
    };

    let city = City {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        slug: slugify(name),
        image: form.files.first().cloned(),
        status: Status::Active,
        created_at: Utc::now(),
    };

    if let Err(err) = state.store.insert_city(&city) {
        cleanup(&form).await;
        return Err(err.into());
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::data(city))))
}

async fn update_city_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<City>>, ApiError> {
    require_admin(&claims)?;

    let mut city = state
        .store
        .city(&id)?
        .ok_or_else(|| ApiError::NotFound("Cidade não encontrada".to_string()))?;

    let form = upload::collect(&mut multipart, &state.config.upload_dir, "cities").await?;

    if let Some(name) = form.fields.get("name").map(|n| n.trim()).filter(|n| !n.is_empty()) {
        city.name = name.to_string();
        city.slug = slugify(name);
    }
    // The old image is only removed after the store write succeeds; a failed
    // rename (duplicate slug) discards the new upload instead
    let mut replaced_image = None;
    if let Some(image) = form.files.first() {
        replaced_image = city.image.replace(image.clone());
    }

    if let Err(err) = state.store.update_city(&city) {
        for path in &form.files {
            upload::delete_upload(&state.config.upload_dir, path).await;
        }
        return Err(err.into());
    }
    if let Some(old) = replaced_image {
        upload::delete_upload(&state.config.upload_dir, &old).await;
    }

    Ok(Json(ApiResponse::data(city)))
}

async fn delete_city_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<City>>, ApiError> {
    require_admin(&claims)?;

    let city = state
        .store
        .deactivate_city(&id)?
        .ok_or_else(|| ApiError::NotFound("Cidade não encontrada".to_string()))?;
    Ok(Json(ApiResponse::with_message(city, "Cidade desativada")))
}

async fn neighborhoods_of_city_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Neighborhood>>>, ApiError> {
    let neighborhoods = state.store.neighborhoods(Some(&id), Some(Status::Active))?;
    if neighborhoods.is_empty() {
        return Err(ApiError::NotFound(
            "Nenhum bairro encontrado para esta cidade".to_string(),
        ));
    }
    let count = neighborhoods.len();
    Ok(Json(ApiResponse::list(neighborhoods, count)))
}

// --- Neighborhoods ---

#[derive(Deserialize)]
pub struct NeighborhoodListQuery {
    pub city: Option<String>,
    pub active: Option<String>,
}

async fn list_neighborhoods_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NeighborhoodListQuery>,
) -> Result<Json<ApiResponse<Vec<Neighborhood>>>, ApiError> {
    let neighborhoods = state
        .store
        .neighborhoods(query.city.as_deref(), status_filter(query.active.as_deref()))?;
    let count = neighborhoods.len();
    Ok(Json(ApiResponse::list(neighborhoods, count)))
}

async fn neighborhoods_by_city_slug_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<Vec<Neighborhood>>>, ApiError> {
    let city = state
        .store
        .city_by_slug(&slug)?
        .ok_or_else(|| ApiError::NotFound("Cidade não encontrada".to_string()))?;
    let neighborhoods = state.store.neighborhoods(Some(&city.id), Some(Status::Active))?;
    let count = neighborhoods.len();
    Ok(Json(ApiResponse::list(neighborhoods, count)))
}

#[derive(Deserialize)]
pub struct NeighborhoodPayload {
    pub name: Option<String>,
    pub city: Option<String>,
}

async fn create_neighborhood_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<NeighborhoodPayload>,
) -> Result<(StatusCode, Json<ApiResponse<Neighborhood>>), ApiError> {
    require_admin(&claims)?;

    let message = "Por favor, forneça o nome do bairro e a cidade";
    let name = required(&payload.name, message)?;
    let city_id = required(&payload.city, message)?;

    if state.store.city(city_id)?.filter(|c| c.status.is_active()).is_none() {
        return Err(ApiError::Validation("Cidade inválida".to_string()));
    }

    if let Some(existing) = state.store.find_neighborhood_by_name(name, city_id)? {
        if existing.status.is_active() {
            return Err(ApiError::Validation(
                "Bairro já existe nesta cidade".to_string(),
            ));
        }
        // Reactivate the soft-deleted record instead of duplicating it
        let mut reactivated = existing;
        reactivated.status = Status::Active;
        state.store.put_neighborhood(&reactivated)?;
        return Ok((
            StatusCode::OK,
            Json(ApiResponse::with_message(
                reactivated,
                "Bairro reativado com sucesso",
            )),
        ));
    }

    let neighborhood = Neighborhood {
        id: Uuid::new_v4().to_string(),
        name: name.to_lowercase(),
        slug: slugify(name),
        city: city_id.to_string(),
        status: Status::Active,
        created_at: Utc::now(),
    };
    state.store.put_neighborhood(&neighborhood)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            neighborhood,
            "Bairro criado com sucesso",
        )),
    ))
}

async fn update_neighborhood_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
    Json(payload): Json<NeighborhoodPayload>,
) -> Result<Json<ApiResponse<Neighborhood>>, ApiError> {
    require_admin(&claims)?;

    let mut neighborhood = state
        .store
        .neighborhood(&id)?
        .ok_or_else(|| ApiError::NotFound("Bairro não encontrado".to_string()))?;

    if let Some(city_id) = payload.city.as_deref().filter(|c| *c != neighborhood.city) {
        if state.store.city(city_id)?.filter(|c| c.status.is_active()).is_none() {
            return Err(ApiError::Validation("Cidade inválida".to_string()));
        }
        neighborhood.city = city_id.to_string();
    }

    if let Some(name) = payload.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        if let Some(existing) = state
            .store
            .find_neighborhood_by_name(name, &neighborhood.city)?
        {
            if existing.id != neighborhood.id {
                return Err(ApiError::Validation(
                    "Bairro já existe nesta cidade".to_string(),
                ));
            }
        }
        neighborhood.name = name.to_lowercase();
        neighborhood.slug = slugify(name);
    }

    state.store.put_neighborhood(&neighborhood)?;
    Ok(Json(ApiResponse::data(neighborhood)))
}

async fn delete_neighborhood_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Neighborhood>>, ApiError> {
    require_admin(&claims)?;

    let neighborhood = state
        .store
        .deactivate_neighborhood(&id)?
        .ok_or_else(|| ApiError::NotFound("Bairro não encontrado".to_string()))?;
    Ok(Json(ApiResponse::with_message(neighborhood, "Bairro desativado")))
}

// --- Categories ---

async fn list_categories_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Category>>>, ApiError> {
    let categories = state.store.categories()?;
    let count = categories.len();
    Ok(Json(ApiResponse::list(categories, count)))
}

#[derive(Deserialize)]
pub struct CategoryPayload {
    pub name: Option<String>,
    pub icon: Option<String>,
}

async fn create_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<CategoryPayload>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), ApiError> {
    require_admin(&claims)?;

    let name = required(&payload.name, "O nome da categoria é obrigatório")?;

    if let Some(existing) = state.store.find_category_by_name(name)? {
        if existing.status.is_active() {
            return Err(ApiError::Validation("Categoria já existe".to_string()));
        }
        let mut reactivated = existing;
        reactivated.status = Status::Active;
        if payload.icon.is_some() {
            reactivated.icon = payload.icon.clone();
        }
        state.store.put_category(&reactivated)?;
        return Ok((
            StatusCode::OK,
            Json(ApiResponse::with_message(
                reactivated,
                "Categoria reativada com sucesso",
            )),
        ));
    }

    let category = Category {
        id: Uuid::new_v4().to_string(),
        name: name.to_lowercase(),
        slug: slugify(name),
        icon: payload.icon.clone(),
        status: Status::Active,
        created_at: Utc::now(),
    };
    state.store.put_category(&category)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::data(category))))
}

async fn update_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
    Json(payload): Json<CategoryPayload>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    require_admin(&claims)?;

    let mut category = state
        .store
        .category(&id)?
        .ok_or_else(|| ApiError::NotFound("Categoria não encontrada".to_string()))?;

    // Only the name can be edited here
    let name = required(&payload.name, "O nome da categoria é obrigatório")?;
    if let Some(existing) = state.store.find_category_by_name(name)? {
        if existing.id != category.id && existing.status.is_active() {
            return Err(ApiError::Validation("Categoria já existe".to_string()));
        }
    }
    category.name = name.to_lowercase();
    category.slug = slugify(name);

    state.store.put_category(&category)?;
    Ok(Json(ApiResponse::data(category)))
}

async fn delete_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    require_admin(&claims)?;

    let category = state
        .store
        .category(&id)?
        .ok_or_else(|| ApiError::NotFound("Categoria não encontrada".to_string()))?;

    if state.store.count_active_sub_categories(&category.id)? > 0 {
        return Err(ApiError::Validation(
            "Não é possível excluir: existem subcategorias vinculadas".to_string(),
        ));
    }

    let category = state
        .store
        .deactivate_category(&id)?
        .ok_or_else(|| ApiError::NotFound("Categoria não encontrada".to_string()))?;
    Ok(Json(ApiResponse::with_message(category, "Categoria desativada")))
}

// --- SubCategories ---

#[derive(Deserialize)]
pub struct SubCategoryListQuery {
    pub category: Option<String>,
    pub active: Option<String>,
}

async fn list_sub_categories_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubCategoryListQuery>,
) -> Result<Json<ApiResponse<Vec<SubCategory>>>, ApiError> {
    let subs = state
        .store
        .sub_categories(query.category.as_deref(), status_filter(query.active.as_deref()))?;
    let count = subs.len();
    Ok(Json(ApiResponse::list(subs, count)))
}

async fn sub_categories_by_category_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<Vec<SubCategory>>>, ApiError> {
    let category = state
        .store
        .category_by_slug(&slug)?
        .ok_or_else(|| ApiError::NotFound("Categoria não encontrada".to_string()))?;
    let subs = state
        .store
        .sub_categories(Some(&category.id), Some(Status::Active))?;
    let count = subs.len();
    Ok(Json(ApiResponse::list(subs, count)))
}

async fn create_sub_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<SubCategory>>), ApiError> {
    require_admin(&claims)?;

    let form = upload::collect(&mut multipart, &state.config.upload_dir, "subcategories").await?;
    let discard_files = |form: &upload::UploadForm| {
        let paths = form.files.clone();
        let dir = state.config.upload_dir.clone();
        async move {
            for path in paths {
                upload::delete_upload(&dir, &path).await;
            }
        }
    };

    let name = form.fields.get("name").map(|n| n.trim()).filter(|n| !n.is_empty());
    let category_id = form.fields.get("category").map(|c| c.trim()).filter(|c| !c.is_empty());
    let (Some(name), Some(category_id)) = (name, category_id) else {
        discard_files(&form).await;
        return Err(ApiError::Validation(
            "Por favor, forneça o nome da subcategoria e a categoria".to_string(),
        ));
    };

    if state
        .store
        .category(category_id)?
        .filter(|c| c.status.is_active())
        .is_none()
    {
        discard_files(&form).await;
        return Err(ApiError::Validation("Categoria inválida".to_string()));
    }

    if let Some(existing) = state.store.find_sub_category_by_name(name, category_id)? {
        if existing.status.is_active() {
            discard_files(&form).await;
            return Err(ApiError::Validation(
                "Subcategoria já existe nesta categoria".to_string(),
            ));
        }
        let mut reactivated = existing;
        reactivated.status = Status::Active;
        if let Some(icon) = form.files.first() {
            if let Some(old) = reactivated.icon.take() {
                upload::delete_upload(&state.config.upload_dir, &old).await;
            }
            reactivated.icon = Some(icon.clone());
        }
        state.store.put_sub_category(&reactivated)?;
        return Ok((
            StatusCode::OK,
            Json(ApiResponse::with_message(
                reactivated,
                "Subcategoria reativada com sucesso",
            )),
        ));
    }

    let sub = SubCategory {
        id: Uuid::new_v4().to_string(),
        name: name.to_lowercase(),
        slug: slugify(name),
        category: category_id.to_string(),
        icon: form.files.first().cloned(),
        status: Status::Active,
        created_at: Utc::now(),
    };
    state.store.put_sub_category(&sub)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(sub, "Subcategoria criada com sucesso")),
    ))
}

async fn update_sub_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<SubCategory>>, ApiError> {
    require_admin(&claims)?;

    let mut sub = state
        .store
        .sub_category(&id)?
        .ok_or_else(|| ApiError::NotFound("Subcategoria não encontrada".to_string()))?;

    let form = upload::collect(&mut multipart, &state.config.upload_dir, "subcategories").await?;

    if let Some(category_id) = form.fields.get("category").map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if state
            .store
            .category(category_id)?
            .filter(|c| c.status.is_active())
            .is_none()
        {
            return Err(ApiError::Validation("Categoria inválida".to_string()));
        }
        sub.category = category_id.to_string();
    }
    if let Some(name) = form.fields.get("name").map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if let Some(existing) = state.store.find_sub_category_by_name(name, &sub.category)? {
            if existing.id != sub.id && existing.status.is_active() {
                return Err(ApiError::Validation(
                    "Subcategoria já existe nesta categoria".to_string(),
                ));
            }
        }
        sub.name = name.to_lowercase();
        sub.slug = slugify(name);
    }
    let mut replaced_icon = None;
    if let Some(icon) = form.files.first() {
        replaced_icon = sub.icon.replace(icon.clone());
    }

    if let Err(err) = state.store.put_sub_category(&sub) {
        for path in &form.files {
            upload::delete_upload(&state.config.upload_dir, path).await;
        }
        return Err(err.into());
    }
    if let Some(old) = replaced_icon {
        upload::delete_upload(&state.config.upload_dir, &old).await;
    }

    Ok(Json(ApiResponse::data(sub)))
}

async fn delete_sub_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SubCategory>>, ApiError> {
    require_admin(&claims)?;

    let sub = state
        .store
        .deactivate_sub_category(&id)?
        .ok_or_else(|| ApiError::NotFound("Subcategoria não encontrada".to_string()))?;
    Ok(Json(ApiResponse::with_message(sub, "Subcategoria desativada")))
}

// --- Businesses ---

#[derive(Deserialize)]
pub struct BusinessListQuery {
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

async fn list_businesses_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BusinessListQuery>,
) -> Result<Json<ApiResponse<Vec<BusinessView>>>, ApiError> {
    // Id-based filters; slug-based filtering lives in /businesses/search
    let businesses: Vec<Business> = state
        .store
        .businesses()?
        .into_iter()
        .filter(|b| {
            query.city.as_deref().map_or(true, |c| b.address.city == c)
                && query
                    .neighborhood
                    .as_deref()
                    .map_or(true, |n| b.address.neighborhood == n)
                && query
                    .category
                    .as_deref()
                    .map_or(true, |c| b.categories.iter().any(|id| id == c))
                && query
                    .subcategory
                    .as_deref()
                    .map_or(true, |s| b.sub_categories.iter().any(|id| id == s))
        })
        .collect();

    let views = populate_all(&state.store, &businesses)?;
    let count = views.len();
    Ok(Json(ApiResponse::list(views, count)))
}

#[derive(Deserialize)]
pub struct LatestQuery {
    pub limit: Option<String>,
}

async fn latest_businesses_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<ApiResponse<Vec<BusinessView>>>, ApiError> {
    let limit = query
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(4);

    let businesses = state.store.latest_businesses(limit)?;
    let views = populate_all(&state.store, &businesses)?;
    Ok(Json(ApiResponse::data(views)))
}

async fn search_businesses_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ApiResponse<Vec<BusinessView>>>, ApiError> {
    match search::run_search(&state.store, &params)? {
        SearchOutcome::Page(page) => Ok(Json(ApiResponse {
            success: true,
            message: None,
            count: None,
            data: Some(page.results),
            pagination: Some(page.pagination),
        })),
        // Unresolvable scoping slug: 200 + empty data so the frontend's
        // "no results" path also covers "wrong filter"
        SearchOutcome::Miss(message) => Ok(Json(ApiResponse {
            success: true,
            message: Some(message.to_string()),
            count: None,
            data: Some(vec![]),
            pagination: None,
        })),
    }
}

async fn get_business_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BusinessView>>, ApiError> {
    let business = state
        .store
        .business(&id)?
        .filter(|b| b.status.is_active())
        .ok_or_else(|| ApiError::NotFound("Estabelecimento não encontrado".to_string()))?;
    Ok(Json(ApiResponse::data(state.store.populate(&business)?)))
}

async fn get_business_by_slug_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<BusinessView>>, ApiError> {
    let business = state
        .store
        .business_by_slug(&slug)?
        .ok_or_else(|| ApiError::NotFound("Estabelecimento não encontrado".to_string()))?;
    Ok(Json(ApiResponse::data(state.store.populate(&business)?)))
}

async fn businesses_by_owner_handler(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<BusinessView>>>, ApiError> {
    let businesses = state.store.businesses_by_owner(&owner_id)?;
    let views = populate_all(&state.store, &businesses)?;
    let count = views.len();
    Ok(Json(ApiResponse::list(views, count)))
}

#[derive(Deserialize)]
pub struct AddressPayload {
    pub street: Option<String>,
    pub number: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateBusinessPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub social: SocialLinks,
    pub address: Option<AddressPayload>,
    pub lat: Option<String>,
    pub long: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, alias = "subCategories")]
    pub sub_categories: Vec<String>,
}

/// Reference validation shared by business create/update: the city and
/// neighborhood must exist, be active and belong together; category and
/// subcategory arrays must be non-empty and resolve.
fn validate_business_refs(
    store: &Store,
    city: &str,
    neighborhood: &str,
    categories: &[String],
    sub_categories: &[String],
) -> Result<(), ApiError> {
    if store.city(city)?.filter(|c| c.status.is_active()).is_none() {
        return Err(ApiError::Validation("Selecione uma cidade".to_string()));
    }
    let Some(neighborhood) = store
        .neighborhood(neighborhood)?
        .filter(|n| n.status.is_active())
    else {
        return Err(ApiError::Validation("Selecione um bairro".to_string()));
    };
    if neighborhood.city != city {
        return Err(ApiError::Validation(
            "Bairro não pertence à cidade selecionada".to_string(),
        ));
    }

    if categories.is_empty() {
        return Err(ApiError::Validation(
            "Selecione pelo menos uma categoria".to_string(),
        ));
    }
    for id in categories {
        if store.category(id)?.filter(|c| c.status.is_active()).is_none() {
            return Err(ApiError::Validation("Categoria inválida".to_string()));
        }
    }

    if sub_categories.is_empty() {
        return Err(ApiError::Validation(
            "Selecione pelo menos uma subcategoria".to_string(),
        ));
    }
    for id in sub_categories {
        if store
            .sub_category(id)?
            .filter(|s| s.status.is_active())
            .is_none()
        {
            return Err(ApiError::Validation("Subcategoria inválida".to_string()));
        }
    }

    Ok(())
}

async fn create_business_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Json(payload): Json<CreateBusinessPayload>,
) -> Result<(StatusCode, Json<ApiResponse<Business>>), ApiError> {
    let name = required(&payload.name, "O nome do estabelecimento é obrigatório")?;
    let description = required(&payload.description, "A descrição é obrigatória")?;
    let phone = required(&payload.phone, "O telefone é obrigatório")?;

    let address = payload
        .address
        .as_ref()
        .ok_or_else(|| ApiError::Validation("Selecione uma cidade".to_string()))?;
    let city = required(&address.city, "Selecione uma cidade")?;
    let neighborhood = required(&address.neighborhood, "Selecione um bairro")?;

    validate_business_refs(
        &state.store,
        city,
        neighborhood,
        &payload.categories,
        &payload.sub_categories,
    )?;

    let business = Business {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        slug: slugify(name),
        description: description.to_string(),
        phone: phone.to_string(),
        whatsapp: payload.whatsapp.clone(),
        photos: vec![],
        social: payload.social.clone(),
        address: Address {
            street: address.street.clone(),
            number: address.number.clone(),
            city: city.to_string(),
            neighborhood: neighborhood.to_string(),
        },
        lat: payload.lat.clone(),
        long: payload.long.clone(),
        categories: payload.categories.clone(),
        sub_categories: payload.sub_categories.clone(),
        owner: claims.sub.clone(),
        status: Status::Active,
        created_at: Utc::now(),
    };
    state.store.insert_business(&business)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::data(business))))
}

#[derive(Deserialize)]
pub struct UpdateBusinessPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub social: Option<SocialLinks>,
    pub address: Option<AddressPayload>,
    pub lat: Option<String>,
    pub long: Option<String>,
    pub categories: Option<Vec<String>>,
    #[serde(alias = "subCategories")]
    pub sub_categories: Option<Vec<String>>,
}

async fn update_business_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBusinessPayload>,
) -> Result<Json<ApiResponse<Business>>, ApiError> {
    let mut business = state
        .store
        .business(&id)?
        .ok_or_else(|| ApiError::NotFound("Estabelecimento não encontrado".to_string()))?;

    ensure_owner_or_admin(
        &claims,
        &business.owner,
        "Não autorizado a atualizar este estabelecimento",
    )?;

    if let Some(name) = payload.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        business.name = name.to_string();
        business.slug = slugify(name);
    }
    if let Some(description) = payload.description.clone() {
        business.description = description;
    }
    if let Some(phone) = payload.phone.clone() {
        business.phone = phone;
    }
    if payload.whatsapp.is_some() {
        business.whatsapp = payload.whatsapp.clone();
    }
    if let Some(social) = payload.social.clone() {
        business.social = social;
    }
    if let Some(address) = &payload.address {
        if let Some(city) = address.city.clone() {
            business.address.city = city;
        }
        if let Some(neighborhood) = address.neighborhood.clone() {
            business.address.neighborhood = neighborhood;
        }
        if address.street.is_some() {
            business.address.street = address.street.clone();
        }
        if address.number.is_some() {
            business.address.number = address.number.clone();
        }
    }
    if payload.lat.is_some() {
        business.lat = payload.lat.clone();
    }
    if payload.long.is_some() {
        business.long = payload.long.clone();
    }
    if let Some(categories) = payload.categories.clone() {
        business.categories = categories;
    }
    if let Some(sub_categories) = payload.sub_categories.clone() {
        business.sub_categories = sub_categories;
    }

    validate_business_refs(
        &state.store,
        &business.address.city,
        &business.address.neighborhood,
        &business.categories,
        &business.sub_categories,
    )?;

    state.store.update_business(&business)?;
    Ok(Json(ApiResponse::data(business)))
}

async fn delete_business_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Business>>, ApiError> {
    let business = state
        .store
        .business(&id)?
        .ok_or_else(|| ApiError::NotFound("Estabelecimento não encontrado".to_string()))?;

    ensure_owner_or_admin(
        &claims,
        &business.owner,
        "Não autorizado a remover este estabelecimento",
    )?;

    let business = state
        .store
        .deactivate_business(&id)?
        .ok_or_else(|| ApiError::NotFound("Estabelecimento não encontrado".to_string()))?;
    Ok(Json(ApiResponse::with_message(
        business,
        "Estabelecimento desativado",
    )))
}

async fn upload_business_photos_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AuthPayload>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let form = upload::collect(&mut multipart, &state.config.upload_dir, "businesses").await?;

    let discard_files = || async {
        for path in &form.files {
            upload::delete_upload(&state.config.upload_dir, path).await;
        }
    };

    if form.files.is_empty() {
        return Err(ApiError::Validation(
            "Por favor, envie pelo menos uma foto".to_string(),
        ));
    }

    let Some(mut business) = state.store.business(&id)? else {
        // Remove the already-written files when the business does not exist
        discard_files().await;
        return Err(ApiError::NotFound(
            "Estabelecimento não encontrado".to_string(),
        ));
    };

    if let Err(err) = ensure_owner_or_admin(
        &claims,
        &business.owner,
        "Não autorizado a atualizar este estabelecimento",
    ) {
        discard_files().await;
        return Err(err);
    }

    business.photos.extend(form.files.iter().cloned());
    state.store.update_business(&business)?;

    Ok(Json(ApiResponse::data(business.photos)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{json, Value};
    use std::fs;
    use tower::ServiceExt; // For .oneshot() testing

    fn test_config(name: &str) -> Config {
        Config {
            port: 0,
            data_dir: String::new(),
            upload_dir: std::env::temp_dir().join(format!("{name}_uploads")),
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_secs: 3600,
        }
    }

    fn temp_store(name: &str) -> Store {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        Store::open(&dir).expect("open store")
    }

    fn seed_user(store: &Store, role: Role) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: "Teste".to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            password_hash: String::new(),
            phone: None,
            role,
            created_at: Utc::now(),
        };
        store.insert_user(&user).expect("user");
        user
    }

    fn bearer(user: &User, config: &Config) -> String {
        let token = create_jwt(user, &config.jwt_secret, config.jwt_ttl_secs).expect("token");
        format!("Bearer {token}")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("GET")
            .body(Body::empty())
            .expect("request")
    }

    fn post_json(uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn test_health() {
        let store = temp_store("guia_test_rest_health");
        let app = create_router(store, test_config("guia_test_rest_health"));

        let response = app.oneshot(get("/health")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
    }

    #[tokio::test]
    async fn test_register_login_me_flow() {
        let store = temp_store("guia_test_rest_auth");
        let app = create_router(store, test_config("guia_test_rest_auth"));

        let response = app
            .clone()
            .oneshot(post_json(
                "/auth/register",
                None,
                json!({ "name": "Maria", "email": "maria@example.com", "password": "segredo123" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let token = body["token"].as_str().expect("token").to_string();

        // /auth/me without a token is rejected
        let response = app.clone().oneshot(get("/auth/me")).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // With the issued token it resolves the user
        let request = Request::builder()
            .uri("/auth/me")
            .method("GET")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["email"], json!("maria@example.com"));

        // Wrong password
        let response = app
            .oneshot(post_json(
                "/auth/login",
                None,
                json!({ "email": "maria@example.com", "password": "errada" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_category_create_requires_admin() {
        let store = temp_store("guia_test_rest_admin");
        let config = test_config("guia_test_rest_admin");
        let user = seed_user(&store, Role::User);
        let admin = seed_user(&store, Role::Admin);
        let user_auth = bearer(&user, &config);
        let admin_auth = bearer(&admin, &config);
        let app = create_router(store, config);

        let response = app
            .clone()
            .oneshot(post_json(
                "/categories",
                Some(&user_auth),
                json!({ "name": "Restaurante" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(post_json(
                "/categories",
                Some(&admin_auth),
                json!({ "name": "Restaurante" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["slug"], json!("restaurante"));

        // Case-insensitive duplicate among active records
        let response = app
            .oneshot(post_json(
                "/categories",
                Some(&admin_auth),
                json!({ "name": "RESTAURANTE" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_envelope_and_city_miss() {
        let store = temp_store("guia_test_rest_search");
        let config = test_config("guia_test_rest_search");

        let city = City {
            id: "city-1".to_string(),
            name: "São Paulo".to_string(),
            slug: "sao-paulo".to_string(),
            image: None,
            status: Status::Active,
            created_at: Utc::now(),
        };
        store.insert_city(&city).expect("city");
        for i in 0..3 {
            let business = Business {
                id: format!("b-{i}"),
                name: format!("Loja {i}"),
                slug: format!("loja-{i}"),
                description: "desc".to_string(),
                phone: "(11) 90000-0000".to_string(),
                whatsapp: None,
                photos: vec![],
                social: SocialLinks::default(),
                address: Address {
                    street: None,
                    number: None,
                    city: city.id.clone(),
                    neighborhood: "n".to_string(),
                },
                lat: None,
                long: None,
                categories: vec![],
                sub_categories: vec![],
                owner: "owner".to_string(),
                status: Status::Active,
                created_at: Utc::now() + chrono::Duration::seconds(i),
            };
            store.insert_business(&business).expect("business");
        }

        let app = create_router(store, config);

        let response = app
            .clone()
            .oneshot(get("/businesses/search?city=sao-paulo&perPage=2&page=2"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"].as_array().expect("data").len(), 1);
        assert_eq!(body["pagination"]["total"], json!(3));
        assert_eq!(body["pagination"]["totalPages"], json!(2));
        assert_eq!(body["pagination"]["perPage"], json!(2));

        // Unknown city slug: 200 with empty data and a message, never a 500
        let response = app
            .oneshot(get("/businesses/search?city=sorocaba"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["message"], json!("Cidade não encontrada"));
    }

    #[tokio::test]
    async fn test_unknown_city_is_404() {
        let store = temp_store("guia_test_rest_404");
        let app = create_router(store, test_config("guia_test_rest_404"));

        let response = app
            .oneshot(get("/cities/nao-existe"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Cidade não encontrada"));
    }

    #[tokio::test]
    async fn test_business_create_validates_refs_and_sets_owner() {
        let store = temp_store("guia_test_rest_biz");
        let config = test_config("guia_test_rest_biz");
        let owner = seed_user(&store, Role::User);
        let auth = bearer(&owner, &config);

        let city = City {
            id: "city-1".to_string(),
            name: "Taubaté".to_string(),
            slug: "taubate".to_string(),
            image: None,
            status: Status::Active,
            created_at: Utc::now(),
        };
        store.insert_city(&city).expect("city");
        store
            .put_neighborhood(&Neighborhood {
                id: "n-1".to_string(),
                name: "centro".to_string(),
                slug: "centro".to_string(),
                city: "city-1".to_string(),
                status: Status::Active,
                created_at: Utc::now(),
            })
            .expect("neighborhood");
        store
            .put_category(&Category {
                id: "cat-1".to_string(),
                name: "restaurante".to_string(),
                slug: "restaurante".to_string(),
                icon: None,
                status: Status::Active,
                created_at: Utc::now(),
            })
            .expect("category");
        store
            .put_sub_category(&SubCategory {
                id: "sub-1".to_string(),
                name: "pizzaria".to_string(),
                slug: "pizzaria".to_string(),
                category: "cat-1".to_string(),
                icon: None,
                status: Status::Active,
                created_at: Utc::now(),
            })
            .expect("subcategory");

        let app = create_router(store, config);

        // Missing categories → field-level 400
        let response = app
            .clone()
            .oneshot(post_json(
                "/businesses",
                Some(&auth),
                json!({
                    "name": "Pizzaria do Zé",
                    "description": "Pizza boa",
                    "phone": "(12) 98888-0000",
                    "address": { "city": "city-1", "neighborhood": "n-1" },
                    "categories": [],
                    "subCategories": ["sub-1"]
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/businesses",
                Some(&auth),
                json!({
                    "name": "Pizzaria do Zé",
                    "description": "Pizza boa",
                    "phone": "(12) 98888-0000",
                    "address": { "city": "city-1", "neighborhood": "n-1" },
                    "categories": ["cat-1"],
                    "subCategories": ["sub-1"]
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["slug"], json!("pizzaria-do-ze"));
        assert_eq!(body["data"]["owner"], json!(owner.id));
    }

    fn request(method: &str, uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri).method(method);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::empty()).expect("request")
    }

    fn seed_business_record(store: &Store, id: &str, name: &str, slug: &str) -> Business {
        let business = Business {
            id: id.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: "desc".to_string(),
            phone: "(12) 90000-0000".to_string(),
            whatsapp: None,
            photos: vec![],
            social: SocialLinks::default(),
            address: Address {
                street: None,
                number: None,
                city: "c".to_string(),
                neighborhood: "n".to_string(),
            },
            lat: None,
            long: None,
            categories: vec![],
            sub_categories: vec![],
            owner: "owner".to_string(),
            status: Status::Active,
            created_at: Utc::now(),
        };
        store.insert_business(&business).expect("business");
        business
    }

    #[tokio::test]
    async fn test_favorites_add_list_remove() {
        let store = temp_store("guia_test_rest_favorites");
        let config = test_config("guia_test_rest_favorites");
        let user = seed_user(&store, Role::User);
        let auth = bearer(&user, &config);
        let business = seed_business_record(&store, "b-1", "Padaria Central", "padaria-central");
        let app = create_router(store, config);

        let response = app
            .clone()
            .oneshot(post_json(
                "/favorites",
                Some(&auth),
                json!({ "businessId": business.id }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);

        // Same pair again is rejected
        let response = app
            .clone()
            .oneshot(post_json(
                "/favorites",
                Some(&auth),
                json!({ "businessId": business.id }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Unknown business cannot be bookmarked
        let response = app
            .clone()
            .oneshot(post_json(
                "/favorites",
                Some(&auth),
                json!({ "businessId": "nao-existe" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(request("GET", "/favorites", Some(&auth)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["data"][0]["business"]["id"], json!(business.id));

        // Removal is keyed by the business id
        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/favorites/{}", business.id),
                Some(&auth),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/favorites/{}", business.id),
                Some(&auth),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request("GET", "/favorites", Some(&auth)))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["count"], json!(0));
    }

    #[tokio::test]
    async fn test_admin_user_listing_and_removal() {
        let store = temp_store("guia_test_rest_users");
        let config = test_config("guia_test_rest_users");
        let user = seed_user(&store, Role::User);
        let admin = seed_user(&store, Role::Admin);
        let user_auth = bearer(&user, &config);
        let admin_auth = bearer(&admin, &config);
        let app = create_router(store, config);

        let response = app
            .clone()
            .oneshot(request("GET", "/auth/users", Some(&user_auth)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(request("GET", "/auth/users", Some(&admin_auth)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], json!(2));
        // Password hashes never leave the store
        assert!(body["data"][0].get("password_hash").is_none());

        let response = app
            .clone()
            .oneshot(request("DELETE", "/auth/nao-existe", Some(&admin_auth)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/auth/{}", user.id),
                Some(&admin_auth),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        // The removed user's token stops working at the middleware
        let response = app
            .oneshot(request("GET", "/auth/me", Some(&user_auth)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_city_update_discards_upload_when_rename_collides() {
        let store = temp_store("guia_test_rest_city_upload");
        let config = test_config("guia_test_rest_city_upload");
        let _ = fs::remove_dir_all(&config.upload_dir);
        let admin = seed_user(&store, Role::Admin);
        let admin_auth = bearer(&admin, &config);

        let taubate = City {
            id: "city-taubate".to_string(),
            name: "Taubaté".to_string(),
            slug: "taubate".to_string(),
            image: Some("/uploads/cities/antiga.png".to_string()),
            status: Status::Active,
            created_at: Utc::now(),
        };
        store.insert_city(&taubate).expect("city");
        store
            .insert_city(&City {
                id: "city-sorocaba".to_string(),
                name: "Sorocaba".to_string(),
                slug: "sorocaba".to_string(),
                image: None,
                status: Status::Active,
                created_at: Utc::now(),
            })
            .expect("city");

        let upload_dir = config.upload_dir.clone();
        let store_view = store.clone();
        let app = create_router(store, config);

        let boundary = "guia-test-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"name\"\r\n\r\n\
             Sorocaba\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"nova.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             png-bytes\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .uri("/cities/city-taubate")
            .method("PUT")
            .header("authorization", &admin_auth)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request");

        // Renaming onto an existing slug fails the store write
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // The freshly written upload is discarded again
        let leftover = fs::read_dir(upload_dir.join("cities"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftover, 0);

        // And the record still points at its original image
        let city = store_view
            .city("city-taubate")
            .expect("get")
            .expect("exists");
        assert_eq!(city.slug, "taubate");
        assert_eq!(city.image.as_deref(), Some("/uploads/cities/antiga.png"));
    }
}
