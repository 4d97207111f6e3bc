//! Erros da API e seu mapeamento para respostas HTTP

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_auth::error::AuthError;
use common_db::error::DbError;
use common_db::models::AppointmentStatus;
use serde_json::json;
use thiserror::Error;

/// Erros devolvidos pelos handlers da API
#[derive(Error, Debug)]
pub enum ApiError {
    /// O profissional já tem agendamento não cancelado neste horário
    #[error("Horário já ocupado para este profissional")]
    SlotConflict,

    /// Já existe fechamento de caixa para o profissional nesta data
    #[error("Já existe um fechamento de caixa para esta data")]
    DuplicateClosing,

    /// Fechamento finalizado não admite mais mutações
    #[error("Fechamento de caixa já finalizado")]
    ClosingFinalized,

    #[error("Transição de status inválida: {0} → {1}")]
    InvalidTransition(AppointmentStatus, AppointmentStatus),

    #[error("Registro não encontrado")]
    NotFound,

    #[error("Acesso negado")]
    Forbidden,

    #[error("Não autenticado: {0}")]
    Unauthorized(String),

    #[error("Dados inválidos: {0}")]
    Validation(String),

    #[error("Violação de restrição: {0}")]
    Constraint(String),

    #[error("Erro interno: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SlotConflict | ApiError::DuplicateClosing => StatusCode::CONFLICT,
            ApiError::ClosingFinalized | ApiError::InvalidTransition(_, _) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) | ApiError::Constraint(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::SlotConflict => "SLOT_CONFLICT",
            ApiError::DuplicateClosing => "DUPLICATE_CLOSING",
            ApiError::ClosingFinalized => "CLOSING_FINALIZED",
            ApiError::InvalidTransition(_, _) => "INVALID_TRANSITION",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Constraint(_) => "CONSTRAINT",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Erro interno na requisição: {}", self);
        }
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(_) => ApiError::NotFound,
            DbError::UniqueViolation(message) => {
                // O SQLite nomeia o índice parcial ou as colunas violadas;
                // ambos identificam a regra de domínio correspondente
                if message.contains("uq_appointments_slot")
                    || message.contains("appointments.professional_id")
                {
                    ApiError::SlotConflict
                } else if message.contains("cash_register_closings.professional_id") {
                    ApiError::DuplicateClosing
                } else {
                    ApiError::Constraint(message)
                }
            }
            DbError::ConstraintViolation(message) => ApiError::Constraint(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Database(db) => db.into(),
            AuthError::EmailAlreadyRegistered => ApiError::Validation(err.to_string()),
            AuthError::InactiveProfile => ApiError::Forbidden,
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::SessionExpired
            | AuthError::SessionRevoked => ApiError::Unauthorized(err.to_string()),
            AuthError::PasswordHash(message) => ApiError::Internal(message),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}
