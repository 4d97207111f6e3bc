//! Estado compartilhado da aplicação

use common_auth::AuthService;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Estado injetado em todos os handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub auth: Arc<AuthService>,
}
