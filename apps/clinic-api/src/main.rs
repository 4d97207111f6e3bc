//! Clinic API - Serviço HTTP de gestão da clínica
//!
//! Expõe a agenda, o cadastro de pacientes, o catálogo de procedimentos
//! e o fechamento de caixa sobre o banco compartilhado, com autorização
//! por papel e por posse de registro em todas as rotas.

use anyhow::{Context, Result};
use common_auth::AuthService;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod extract;
mod policy;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use config::AppConfig;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("Falha ao carregar configuração")?;

    let pool = common_db::init_db_pool(&config.db)
        .await
        .context("Falha ao inicializar banco de dados")?;

    let auth = Arc::new(AuthService::new(pool.clone(), config.auth.clone()));

    let state = AppState { db: pool, auth };

    let app = routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests));

    info!("Servidor ouvindo em {}", config.bind_addr);

    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await
        .context("Servidor HTTP encerrou com erro")?;

    Ok(())
}
