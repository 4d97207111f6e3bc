//! Definições de erro para a biblioteca common-auth

use common_db::error::DbError;
use thiserror::Error;

/// Erros de autenticação e de ciclo de vida de sessão
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("E-mail já cadastrado")]
    EmailAlreadyRegistered,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Perfil desativado")]
    InactiveProfile,

    #[error("Token de sessão inválido")]
    InvalidToken,

    #[error("Sessão expirada")]
    SessionExpired,

    #[error("Sessão encerrada")]
    SessionRevoked,

    #[error("Falha ao processar senha: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Database(#[from] DbError),
}
