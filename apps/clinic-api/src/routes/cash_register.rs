//! Rotas de fechamento de caixa
//!
//! Um fechamento por profissional e por dia; aberto, acumula lançamentos
//! e o total é sempre recalculado como a soma decimal exata de todos os
//! lançamentos correntes, na mesma transação da mutação. Finalizado, o
//! registro congela: nenhum lançamento entra ou sai.

use crate::error::ApiError;
use crate::extract::AuthContext;
use crate::policy;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use common_auth::session::Identity;
use common_db::models::{
    money_text, sum_amounts, CashRegisterClosing, CashRegisterTransaction, PaymentMethod,
};
use rust_decimal::Decimal;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cash-register/closings", get(list).post(open))
        .route("/cash-register/closings/:id", get(fetch))
        .route("/cash-register/closings/:id/transactions", post(add))
        .route("/cash-register/closings/:id/transactions/:tx_id", delete(remove))
        .route("/cash-register/closings/:id/finalize", post(finalize))
}

#[derive(Debug, serde::Deserialize)]
pub struct OpenClosingRequest {
    pub closing_date: NaiveDate,
    /// Somente o super_admin abre caixa para outro profissional
    pub professional_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct AddTransactionRequest {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub appointment_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ListQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub professional_id: Option<Uuid>,
}

/// Fechamento acompanhado dos lançamentos correntes
#[derive(Debug, serde::Serialize)]
pub struct ClosingDetail {
    #[serde(flatten)]
    pub closing: CashRegisterClosing,
    pub transactions: Vec<CashRegisterTransaction>,
}

async fn open(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<OpenClosingRequest>,
) -> Result<(StatusCode, Json<CashRegisterClosing>), ApiError> {
    let closing = open_closing(&state.db, &auth.identity, req).await?;
    Ok((StatusCode::CREATED, Json(closing)))
}

async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CashRegisterClosing>>, ApiError> {
    Ok(Json(list_closings(&state.db, &auth.identity, query).await?))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ClosingDetail>, ApiError> {
    Ok(Json(get_closing_detail(&state.db, &auth.identity, id).await?))
}

async fn add(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<AddTransactionRequest>,
) -> Result<(StatusCode, Json<CashRegisterTransaction>), ApiError> {
    let transaction = add_transaction(&state.db, &auth.identity, id, req).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

async fn remove(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, tx_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    delete_transaction(&state.db, &auth.identity, id, tx_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn finalize(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<CashRegisterClosing>, ApiError> {
    Ok(Json(finalize_closing(&state.db, &auth.identity, id).await?))
}

pub(crate) async fn open_closing(
    db: &SqlitePool,
    identity: &Identity,
    req: OpenClosingRequest,
) -> Result<CashRegisterClosing, ApiError> {
    let professional_id = policy::resolve_owner(identity, req.professional_id)?;
    let id = Uuid::new_v4();

    // A restrição UNIQUE (professional_id, closing_date) decide entre
    // requisições concorrentes; a violação vira DuplicateClosing
    sqlx::query(
        "INSERT INTO cash_register_closings (id, professional_id, closing_date, notes) VALUES (?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(professional_id.to_string())
    .bind(req.closing_date)
    .bind(&req.notes)
    .execute(db)
    .await?;

    get_closing(db, identity, id).await
}

pub(crate) async fn get_closing(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
) -> Result<CashRegisterClosing, ApiError> {
    let closing =
        sqlx::query_as::<_, CashRegisterClosing>("SELECT * FROM cash_register_closings WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(db)
            .await?
            .ok_or(ApiError::NotFound)?;

    policy::ensure_owner(identity, closing.professional_id)?;
    Ok(closing)
}

pub(crate) async fn get_closing_detail(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
) -> Result<ClosingDetail, ApiError> {
    let closing = get_closing(db, identity, id).await?;

    let transactions = sqlx::query_as::<_, CashRegisterTransaction>(
        "SELECT * FROM cash_register_transactions WHERE closing_id = ? ORDER BY created_at, id",
    )
    .bind(id.to_string())
    .fetch_all(db)
    .await?;

    Ok(ClosingDetail { closing, transactions })
}

pub(crate) async fn list_closings(
    db: &SqlitePool,
    identity: &Identity,
    query: ListQuery,
) -> Result<Vec<CashRegisterClosing>, ApiError> {
    let scope = policy::resolve_scope(identity, query.professional_id)?;
    let from = query.from.unwrap_or_else(|| NaiveDate::from_ymd_opt(1, 1, 1).unwrap());
    let to = query.to.unwrap_or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());

    let closings = match scope {
        Some(professional_id) => {
            sqlx::query_as::<_, CashRegisterClosing>(
                "SELECT * FROM cash_register_closings
                 WHERE professional_id = ? AND closing_date BETWEEN ? AND ?
                 ORDER BY closing_date DESC",
            )
            .bind(professional_id.to_string())
            .bind(from)
            .bind(to)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, CashRegisterClosing>(
                "SELECT * FROM cash_register_closings
                 WHERE closing_date BETWEEN ? AND ?
                 ORDER BY closing_date DESC",
            )
            .bind(from)
            .bind(to)
            .fetch_all(db)
            .await?
        }
    };

    Ok(closings)
}

pub(crate) async fn add_transaction(
    db: &SqlitePool,
    identity: &Identity,
    closing_id: Uuid,
    req: AddTransactionRequest,
) -> Result<CashRegisterTransaction, ApiError> {
    if req.amount < Decimal::ZERO {
        return Err(ApiError::Validation("valor não pode ser negativo".to_string()));
    }

    let mut transaction = db.begin().await?;

    let closing = guard_open_closing(&mut transaction, identity, closing_id).await?;

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO cash_register_transactions
         (id, closing_id, appointment_id, amount, payment_method, notes)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(closing.id.to_string())
    .bind(req.appointment_id.map(|a| a.to_string()))
    .bind(money_text(&req.amount))
    .bind(req.payment_method.to_string())
    .bind(&req.notes)
    .execute(&mut *transaction)
    .await?;

    recompute_total(&mut transaction, closing.id).await?;

    let inserted = sqlx::query_as::<_, CashRegisterTransaction>(
        "SELECT * FROM cash_register_transactions WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_one(&mut *transaction)
    .await?;

    transaction.commit().await?;
    Ok(inserted)
}

pub(crate) async fn delete_transaction(
    db: &SqlitePool,
    identity: &Identity,
    closing_id: Uuid,
    transaction_id: Uuid,
) -> Result<(), ApiError> {
    let mut transaction = db.begin().await?;

    let closing = guard_open_closing(&mut transaction, identity, closing_id).await?;

    let result = sqlx::query(
        "DELETE FROM cash_register_transactions WHERE id = ? AND closing_id = ?",
    )
    .bind(transaction_id.to_string())
    .bind(closing.id.to_string())
    .execute(&mut *transaction)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    recompute_total(&mut transaction, closing.id).await?;

    transaction.commit().await?;
    Ok(())
}

pub(crate) async fn finalize_closing(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
) -> Result<CashRegisterClosing, ApiError> {
    // Posse verificada antes da mutação
    get_closing(db, identity, id).await?;

    // Compare-and-set: só finaliza quem ainda está aberto
    let result = sqlx::query(
        "UPDATE cash_register_closings
         SET is_finalized = 1, finalized_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND is_finalized = 0",
    )
    .bind(id.to_string())
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::ClosingFinalized);
    }

    info!("Fechamento de caixa {} finalizado", id);

    get_closing(db, identity, id).await
}

/// Busca o fechamento dentro da transação e recusa mutações se já
/// estiver finalizado
async fn guard_open_closing(
    transaction: &mut Transaction<'_, Sqlite>,
    identity: &Identity,
    closing_id: Uuid,
) -> Result<CashRegisterClosing, ApiError> {
    let closing = sqlx::query_as::<_, CashRegisterClosing>(
        "SELECT * FROM cash_register_closings WHERE id = ?",
    )
    .bind(closing_id.to_string())
    .fetch_optional(&mut **transaction)
    .await?
    .ok_or(ApiError::NotFound)?;

    policy::ensure_owner(identity, closing.professional_id)?;

    if closing.is_finalized {
        return Err(ApiError::ClosingFinalized);
    }

    Ok(closing)
}

/// Regrava o total como a soma decimal exata de todos os lançamentos
/// correntes do fechamento
///
/// A releitura integral dentro da mesma transação é a fonte autoritativa;
/// não há incremento parcial que possa derivar do valor real.
async fn recompute_total(
    transaction: &mut Transaction<'_, Sqlite>,
    closing_id: Uuid,
) -> Result<Decimal, ApiError> {
    let raw_amounts: Vec<String> = sqlx::query_scalar(
        "SELECT amount FROM cash_register_transactions WHERE closing_id = ?",
    )
    .bind(closing_id.to_string())
    .fetch_all(&mut **transaction)
    .await?;

    let mut amounts = Vec::with_capacity(raw_amounts.len());
    for raw in &raw_amounts {
        let amount = Decimal::from_str(raw)
            .map_err(|e| ApiError::Internal(format!("valor monetário corrompido: {}", e)))?;
        amounts.push(amount);
    }

    let total = sum_amounts(amounts.iter());

    sqlx::query(
        "UPDATE cash_register_closings SET total_amount = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(money_text(&total))
    .bind(closing_id.to_string())
    .execute(&mut **transaction)
    .await?;

    Ok(total)
}
