//! Rotas de autenticação

use crate::error::ApiError;
use crate::extract::bearer_token;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use common_auth::session::{Identity, Session};
use serde::Deserialize;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "e-mail inválido"))]
    pub email: String,
    #[validate(length(min = 8, message = "senha precisa de ao menos 8 caracteres"))]
    pub password: String,
    #[validate(length(min = 1, message = "nome é obrigatório"))]
    pub full_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "e-mail inválido"))]
    pub email: String,
    #[validate(length(min = 1, message = "senha é obrigatória"))]
    pub password: String,
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Identity>), ApiError> {
    req.validate()?;

    let identity = state
        .auth
        .sign_up(&req.email, &req.password, &req.full_name)
        .await?;

    Ok((StatusCode::CREATED, Json(identity)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Session>, ApiError> {
    req.validate()?;

    let session = state.auth.sign_in(&req.email, &req.password).await?;
    Ok(Json(session))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    state.auth.sign_out(token).await?;
    Ok(StatusCode::NO_CONTENT)
}
