//! Extração da identidade autenticada a partir da requisição

use crate::error::ApiError;
use crate::state::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use common_auth::session::Identity;

/// Identidade da sessão, validada pelo provedor de autenticação
///
/// Handlers que recebem este extrator só executam com sessão válida;
/// a identidade é repassada explicitamente à camada de políticas.
pub struct AuthContext {
    pub identity: Identity,
}

/// Extrai o token Bearer do cabeçalho Authorization
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Cabeçalho Authorization ausente".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Esquema de autorização inválido".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let identity = state.auth.verify(token).await?;
        Ok(Self { identity })
    }
}
