//! Infraestrutura compartilhada pelos testes dos handlers
//!
//! Os testes rodam contra um banco SQLite real em diretório temporário,
//! com as mesmas migrações da aplicação.

use common_auth::session::Identity;
use common_db::models::Role;
use common_db::{init_db_pool, DbConfig};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::str::FromStr;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

/// Cria um banco limpo; o diretório precisa sobreviver ao teste
pub(crate) async fn test_pool() -> (SqlitePool, TempDir) {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("test_api.db");

    let config = DbConfig {
        db_path: db_path.to_str().unwrap().to_string(),
        max_connections: 2,
    };

    let pool = init_db_pool(&config).await.unwrap();
    (pool, temp_dir)
}

/// Insere credencial e perfil de um profissional e devolve sua identidade
pub(crate) async fn insert_professional(pool: &SqlitePool, role: Role) -> Identity {
    let profile_id = Uuid::new_v4();
    let email = format!("{}@clinica.med.br", profile_id.simple());

    sqlx::query("INSERT INTO auth_users (id, email, password_hash) VALUES (?, ?, 'hash-de-teste')")
        .bind(profile_id.to_string())
        .bind(&email)
        .execute(pool)
        .await
        .unwrap();

    sqlx::query("INSERT INTO profiles (id, email, full_name, role) VALUES (?, ?, 'Profissional de Teste', ?)")
        .bind(profile_id.to_string())
        .bind(&email)
        .bind(role.to_string())
        .execute(pool)
        .await
        .unwrap();

    Identity { profile_id, role }
}

pub(crate) async fn insert_patient(pool: &SqlitePool, professional_id: Uuid) -> Uuid {
    let patient_id = Uuid::new_v4();

    sqlx::query("INSERT INTO patients (id, full_name, phone, professional_id) VALUES (?, 'Paciente de Teste', '11 99999-0000', ?)")
        .bind(patient_id.to_string())
        .bind(professional_id.to_string())
        .execute(pool)
        .await
        .unwrap();

    patient_id
}

pub(crate) async fn insert_procedure(pool: &SqlitePool) -> Uuid {
    let procedure_id = Uuid::new_v4();

    sqlx::query("INSERT INTO procedures (id, name, duration_minutes, default_price) VALUES (?, 'Consulta de Teste', 30, '150.00')")
        .bind(procedure_id.to_string())
        .execute(pool)
        .await
        .unwrap();

    procedure_id
}

pub(crate) fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}
