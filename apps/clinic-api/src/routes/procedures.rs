//! Rotas do catálogo de procedimentos
//!
//! O catálogo é mantido apenas pelo super_admin; procedimentos saem de
//! circulação por desativação, nunca por exclusão.

use crate::error::ApiError;
use crate::extract::AuthContext;
use crate::policy;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common_auth::session::Identity;
use common_db::models::{money_text, Procedure};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/procedures", get(list).post(create))
        .route("/procedures/:id", get(fetch).patch(update))
}

#[derive(Debug, serde::Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct CreateProcedureRequest {
    #[validate(length(min = 1, message = "nome é obrigatório"))]
    pub name: String,
    #[validate(range(min = 1, message = "duração precisa ser positiva"))]
    pub duration_minutes: i32,
    pub default_price: Decimal,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct UpdateProcedureRequest {
    #[validate(length(min = 1, message = "nome não pode ficar vazio"))]
    pub name: Option<String>,
    #[validate(range(min = 1, message = "duração precisa ser positiva"))]
    pub duration_minutes: Option<i32>,
    pub default_price: Option<Decimal>,
    pub is_active: Option<bool>,
}

async fn list(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Procedure>>, ApiError> {
    Ok(Json(list_procedures(&state.db, query.include_inactive).await?))
}

async fn fetch(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Procedure>, ApiError> {
    Ok(Json(get_procedure(&state.db, id).await?))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateProcedureRequest>,
) -> Result<(StatusCode, Json<Procedure>), ApiError> {
    let procedure = create_procedure(&state.db, &auth.identity, req).await?;
    Ok((StatusCode::CREATED, Json(procedure)))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProcedureRequest>,
) -> Result<Json<Procedure>, ApiError> {
    Ok(Json(update_procedure(&state.db, &auth.identity, id, req).await?))
}

pub(crate) async fn list_procedures(
    db: &SqlitePool,
    include_inactive: bool,
) -> Result<Vec<Procedure>, ApiError> {
    let procedures = if include_inactive {
        sqlx::query_as::<_, Procedure>("SELECT * FROM procedures ORDER BY name")
            .fetch_all(db)
            .await?
    } else {
        sqlx::query_as::<_, Procedure>("SELECT * FROM procedures WHERE is_active = 1 ORDER BY name")
            .fetch_all(db)
            .await?
    };

    Ok(procedures)
}

pub(crate) async fn get_procedure(db: &SqlitePool, id: Uuid) -> Result<Procedure, ApiError> {
    sqlx::query_as::<_, Procedure>("SELECT * FROM procedures WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound)
}

pub(crate) async fn create_procedure(
    db: &SqlitePool,
    identity: &Identity,
    req: CreateProcedureRequest,
) -> Result<Procedure, ApiError> {
    policy::ensure_super_admin(identity)?;
    req.validate()?;

    if req.default_price < Decimal::ZERO {
        return Err(ApiError::Validation("preço não pode ser negativo".to_string()));
    }

    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO procedures (id, name, duration_minutes, default_price) VALUES (?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&req.name)
    .bind(req.duration_minutes)
    .bind(money_text(&req.default_price))
    .execute(db)
    .await?;

    get_procedure(db, id).await
}

pub(crate) async fn update_procedure(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
    req: UpdateProcedureRequest,
) -> Result<Procedure, ApiError> {
    policy::ensure_super_admin(identity)?;
    req.validate()?;

    if matches!(req.default_price, Some(price) if price < Decimal::ZERO) {
        return Err(ApiError::Validation("preço não pode ser negativo".to_string()));
    }

    let current = get_procedure(db, id).await?;

    let name = req.name.unwrap_or(current.name);
    let duration_minutes = req.duration_minutes.unwrap_or(current.duration_minutes);
    let default_price = req.default_price.unwrap_or(current.default_price);
    let is_active = req.is_active.unwrap_or(current.is_active);

    sqlx::query(
        "UPDATE procedures SET name = ?, duration_minutes = ?, default_price = ?, is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(&name)
    .bind(duration_minutes)
    .bind(money_text(&default_price))
    .bind(is_active)
    .bind(id.to_string())
    .execute(db)
    .await?;

    get_procedure(db, id).await
}
