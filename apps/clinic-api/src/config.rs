//! Configuração do serviço a partir de variáveis de ambiente

use anyhow::{Context, Result};
use common_auth::AuthConfig;
use common_db::DbConfig;
use std::net::SocketAddr;

/// Configuração completa do serviço
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Endereço de escuta do servidor HTTP
    pub bind_addr: SocketAddr,
    /// Limite de requisições simultâneas atendidas
    pub max_concurrent_requests: usize,
    pub db: DbConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Carrega a configuração do ambiente
    ///
    /// CLINIC_JWT_SECRET é obrigatória; as demais variáveis têm padrão.
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("CLINIC_BIND_ADDR", "127.0.0.1:8080")
            .parse()
            .context("CLINIC_BIND_ADDR inválido")?;

        let max_concurrent_requests = env_or("CLINIC_MAX_CONCURRENT_REQUESTS", "64")
            .parse()
            .context("CLINIC_MAX_CONCURRENT_REQUESTS inválido")?;

        let db = DbConfig {
            db_path: env_or("CLINIC_DB_PATH", "data/clinic.db"),
            max_connections: env_or("CLINIC_DB_MAX_CONNECTIONS", "5")
                .parse()
                .context("CLINIC_DB_MAX_CONNECTIONS inválido")?,
        };

        let auth = AuthConfig {
            jwt_secret: std::env::var("CLINIC_JWT_SECRET")
                .context("CLINIC_JWT_SECRET não definida")?,
            token_ttl_minutes: env_or("CLINIC_SESSION_TTL_MINUTES", "480")
                .parse()
                .context("CLINIC_SESSION_TTL_MINUTES inválido")?,
        };

        Ok(Self {
            bind_addr,
            max_concurrent_requests,
            db,
            auth,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
