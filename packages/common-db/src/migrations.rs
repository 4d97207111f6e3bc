//! Sistema de migrações para banco de dados
//!
//! Este módulo gerencia as migrações do banco de dados SQLite

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_initial_schema.sql
    r#"
    -- Tabela de credenciais de autenticação
    CREATE TABLE IF NOT EXISTS auth_users (
        id TEXT PRIMARY KEY NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Tabela de perfis de profissionais
    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY NOT NULL,
        email TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('super_admin', 'user')),
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (id) REFERENCES auth_users (id) ON DELETE CASCADE
    );

    -- Catálogo de procedimentos
    CREATE TABLE IF NOT EXISTS procedures (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
        -- valores monetários como texto decimal com 2 casas, nunca REAL
        default_price TEXT NOT NULL DEFAULT '0.00',
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Tabela de pacientes
    CREATE TABLE IF NOT EXISTS patients (
        id TEXT PRIMARY KEY NOT NULL,
        full_name TEXT NOT NULL,
        phone TEXT NOT NULL,
        email TEXT,
        notes TEXT,
        professional_id TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (professional_id) REFERENCES profiles (id) ON DELETE CASCADE
    );

    -- Tabela de agendamentos
    CREATE TABLE IF NOT EXISTS appointments (
        id TEXT PRIMARY KEY NOT NULL,
        patient_id TEXT NOT NULL,
        procedure_id TEXT NOT NULL,
        professional_id TEXT NOT NULL,
        appointment_date DATE NOT NULL,
        appointment_time TIME NOT NULL,
        status TEXT NOT NULL DEFAULT 'scheduled' CHECK (status IN ('scheduled', 'confirmed', 'completed', 'cancelled')),
        cancellation_reason TEXT,
        created_by TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (patient_id) REFERENCES patients (id) ON DELETE CASCADE,
        FOREIGN KEY (procedure_id) REFERENCES procedures (id),
        FOREIGN KEY (professional_id) REFERENCES profiles (id) ON DELETE CASCADE,
        FOREIGN KEY (created_by) REFERENCES profiles (id)
    );

    -- Um profissional não pode ter dois agendamentos não cancelados no
    -- mesmo horário; linhas canceladas ficam fora do índice para que o
    -- horário possa ser reaproveitado
    CREATE UNIQUE INDEX IF NOT EXISTS uq_appointments_slot
        ON appointments (professional_id, appointment_date, appointment_time)
        WHERE status != 'cancelled';

    -- Fechamentos de caixa
    CREATE TABLE IF NOT EXISTS cash_register_closings (
        id TEXT PRIMARY KEY NOT NULL,
        professional_id TEXT NOT NULL,
        closing_date DATE NOT NULL,
        total_amount TEXT NOT NULL DEFAULT '0.00',
        notes TEXT,
        is_finalized BOOLEAN NOT NULL DEFAULT 0,
        finalized_at TIMESTAMP,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (professional_id) REFERENCES profiles (id) ON DELETE CASCADE,
        UNIQUE (professional_id, closing_date)
    );

    -- Lançamentos de caixa
    CREATE TABLE IF NOT EXISTS cash_register_transactions (
        id TEXT PRIMARY KEY NOT NULL,
        closing_id TEXT NOT NULL,
        appointment_id TEXT,
        amount TEXT NOT NULL,
        payment_method TEXT NOT NULL CHECK (payment_method IN ('cash', 'credit_card', 'debit_card', 'pix', 'transfer')),
        notes TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (closing_id) REFERENCES cash_register_closings (id) ON DELETE CASCADE,
        FOREIGN KEY (appointment_id) REFERENCES appointments (id) ON DELETE SET NULL
    );

    -- Índices para otimização
    CREATE INDEX IF NOT EXISTS idx_patients_professional_id ON patients (professional_id);
    CREATE INDEX IF NOT EXISTS idx_appointments_professional_date ON appointments (professional_id, appointment_date);
    CREATE INDEX IF NOT EXISTS idx_appointments_patient_id ON appointments (patient_id);
    CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments (status);
    CREATE INDEX IF NOT EXISTS idx_closings_professional_id ON cash_register_closings (professional_id);
    CREATE INDEX IF NOT EXISTS idx_transactions_closing_id ON cash_register_transactions (closing_id);
    "#,
];

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    // Obter a versão atual do banco de dados
    let mut version: i64 = 0;
    match sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
    {
        Ok(v) => version = v,
        Err(e) => {
            error!("Erro ao obter versão do banco: {}", e);
            // Continuar mesmo assim, pois pode ser a primeira execução
        }
    }

    info!("Versão atual do banco: {}", version);

    // Aplicar cada migração pendente sequencialmente
    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        // Pular migrações já aplicadas
        if migration_version <= version {
            info!("Migração {} já aplicada", migration_version);
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        // Executar em uma transação para garantir atomicidade
        let mut transaction = pool.begin().await
            .context(format!("Falha ao iniciar transação para migração {}", migration_version))?;

        // Executar os comandos SQL
        sqlx::query(migration_sql)
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao executar migração {}", migration_version))?;

        // Atualizar versão do banco
        sqlx::query(&format!("PRAGMA user_version = {}", migration_version))
            .execute(&mut *transaction)
            .await
            .context(format!("Falha ao atualizar versão para {}", migration_version))?;

        // Commit da transação
        transaction.commit().await
            .context(format!("Falha ao confirmar transação para migração {}", migration_version))?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}
