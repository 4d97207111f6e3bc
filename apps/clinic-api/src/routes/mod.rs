//! Rotas HTTP do serviço

use crate::state::AppState;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

pub mod appointments;
pub mod auth;
pub mod cash_register;
pub mod dashboard;
pub mod patients;
pub mod procedures;
pub mod profiles;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(profiles::router())
        .merge(procedures::router())
        .merge(patients::router())
        .merge(appointments::router())
        .merge(cash_register::router())
        .merge(dashboard::router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
