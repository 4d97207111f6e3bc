//! Rotas de perfis de profissionais

use crate::error::ApiError;
use crate::extract::AuthContext;
use crate::policy;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use common_auth::session::Identity;
use common_db::models::{Profile, Role};
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles", get(list))
        .route("/profiles/:id", get(fetch).patch(update))
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, message = "nome não pode ficar vazio"))]
    pub full_name: Option<String>,
    /// Alteração de papel exige super_admin
    pub role: Option<Role>,
    /// Ativação/desativação exige super_admin
    pub is_active: Option<bool>,
}

async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<Profile>>, ApiError> {
    Ok(Json(list_profiles(&state.db, &auth.identity).await?))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(get_profile(&state.db, &auth.identity, id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(update_profile(&state.db, &auth.identity, id, req).await?))
}

pub(crate) async fn list_profiles(
    db: &SqlitePool,
    identity: &Identity,
) -> Result<Vec<Profile>, ApiError> {
    let profiles = if identity.is_super_admin() {
        sqlx::query_as::<_, Profile>("SELECT * FROM profiles ORDER BY full_name")
            .fetch_all(db)
            .await?
    } else {
        // Usuário comum só enxerga o próprio perfil
        sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ?")
            .bind(identity.profile_id.to_string())
            .fetch_all(db)
            .await?
    };

    Ok(profiles)
}

pub(crate) async fn get_profile(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
) -> Result<Profile, ApiError> {
    policy::ensure_owner(identity, id)?;

    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(profile)
}

pub(crate) async fn update_profile(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
    req: UpdateProfileRequest,
) -> Result<Profile, ApiError> {
    req.validate()?;

    let current = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound)?;

    policy::ensure_owner(identity, current.id)?;

    // Papel e ativação são atribuições administrativas
    if req.role.is_some() || req.is_active.is_some() {
        policy::ensure_super_admin(identity)?;
    }

    let full_name = req.full_name.unwrap_or(current.full_name);
    let role = req.role.unwrap_or(current.role);
    let is_active = req.is_active.unwrap_or(current.is_active);

    sqlx::query(
        "UPDATE profiles SET full_name = ?, role = ?, is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(&full_name)
    .bind(role.to_string())
    .bind(is_active)
    .bind(id.to_string())
    .execute(db)
    .await?;

    get_profile(db, identity, id).await
}
