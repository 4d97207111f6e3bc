//! Tipos de sessão e identidade

use chrono::{DateTime, Utc};
use common_db::models::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identidade autenticada, repassada explicitamente a cada requisição
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Perfil dono da sessão
    pub profile_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

/// Sessão emitida após login bem-sucedido
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Token opaco para o cliente (JWT assinado)
    pub token: String,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
}

/// Eventos publicados quando o estado de sessão muda
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { profile_id: Uuid },
    SignedOut { profile_id: Uuid },
}

/// Claims gravadas no token de sessão
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    /// Perfil dono da sessão
    pub sub: String,
    /// Identificador da sessão, usado para revogação no logout
    pub jti: String,
    pub role: String,
    pub iat: usize,
    pub exp: usize,
}
