//! Painel resumido do dia
//!
//! Agregados de leitura por profissional; o super_admin pode pedir a
//! visão de qualquer profissional ou a global.

use crate::error::ApiError;
use crate::extract::AuthContext;
use crate::policy;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use common_auth::session::Identity;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/summary", get(summary))
}

#[derive(Debug, serde::Deserialize)]
pub struct SummaryQuery {
    /// Data de referência; padrão é o dia corrente
    pub date: Option<NaiveDate>,
    pub professional_id: Option<Uuid>,
}

#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AppointmentCounts {
    pub scheduled: i64,
    pub confirmed: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct ClosingSnapshot {
    pub total_amount: Decimal,
    pub is_finalized: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct DashboardSummary {
    pub date: NaiveDate,
    pub appointments: AppointmentCounts,
    pub patients: i64,
    /// Caixa do dia; presente apenas em visão de um único profissional
    pub closing: Option<ClosingSnapshot>,
}

async fn summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<DashboardSummary>, ApiError> {
    Ok(Json(build_summary(&state.db, &auth.identity, query).await?))
}

pub(crate) async fn build_summary(
    db: &SqlitePool,
    identity: &Identity,
    query: SummaryQuery,
) -> Result<DashboardSummary, ApiError> {
    let scope = policy::resolve_scope(identity, query.professional_id)?;
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());

    let status_rows: Vec<(String, i64)> = match scope {
        Some(professional_id) => {
            sqlx::query_as(
                "SELECT status, COUNT(*) FROM appointments
                 WHERE professional_id = ? AND appointment_date = ?
                 GROUP BY status",
            )
            .bind(professional_id.to_string())
            .bind(date)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT status, COUNT(*) FROM appointments
                 WHERE appointment_date = ?
                 GROUP BY status",
            )
            .bind(date)
            .fetch_all(db)
            .await?
        }
    };

    let mut appointments = AppointmentCounts::default();
    for (status, count) in status_rows {
        match status.as_str() {
            "scheduled" => appointments.scheduled = count,
            "confirmed" => appointments.confirmed = count,
            "completed" => appointments.completed = count,
            "cancelled" => appointments.cancelled = count,
            _ => {}
        }
    }

    let patients: i64 = match scope {
        Some(professional_id) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM patients WHERE professional_id = ?")
                .bind(professional_id.to_string())
                .fetch_one(db)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM patients")
                .fetch_one(db)
                .await?
        }
    };

    let closing = match scope {
        Some(professional_id) => {
            let row: Option<(String, bool)> = sqlx::query_as(
                "SELECT total_amount, is_finalized FROM cash_register_closings
                 WHERE professional_id = ? AND closing_date = ?",
            )
            .bind(professional_id.to_string())
            .bind(date)
            .fetch_optional(db)
            .await?;

            match row {
                Some((raw_total, is_finalized)) => Some(ClosingSnapshot {
                    total_amount: Decimal::from_str(&raw_total).map_err(|e| {
                        ApiError::Internal(format!("valor monetário corrompido: {}", e))
                    })?,
                    is_finalized,
                }),
                None => None,
            }
        }
        None => None,
    };

    Ok(DashboardSummary {
        date,
        appointments,
        patients,
        closing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::appointments::{create_appointment, transition_status, CreateAppointmentRequest};
    use crate::routes::cash_register::{add_transaction, open_closing, AddTransactionRequest, OpenClosingRequest};
    use crate::test_support::{dec, insert_patient, insert_procedure, insert_professional, test_pool};
    use common_db::models::{AppointmentStatus, PaymentMethod, Role};

    #[tokio::test]
    async fn test_summary_counts_day() {
        let (pool, _dir) = test_pool().await;
        let professional = insert_professional(&pool, Role::User).await;
        let patient_id = insert_patient(&pool, professional.profile_id).await;
        let procedure_id = insert_procedure(&pool).await;
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();

        for (hour, cancel) in [(9, false), (10, false), (11, true)] {
            let appointment = create_appointment(
                &pool,
                &professional,
                CreateAppointmentRequest {
                    patient_id,
                    procedure_id,
                    professional_id: None,
                    appointment_date: date,
                    appointment_time: chrono::NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                },
            )
            .await
            .unwrap();

            if cancel {
                transition_status(
                    &pool,
                    &professional,
                    appointment.id,
                    AppointmentStatus::Cancelled,
                    None,
                )
                .await
                .unwrap();
            }
        }

        let closing = open_closing(
            &pool,
            &professional,
            OpenClosingRequest {
                closing_date: date,
                professional_id: None,
                notes: None,
            },
        )
        .await
        .unwrap();
        add_transaction(
            &pool,
            &professional,
            closing.id,
            AddTransactionRequest {
                amount: dec("320.00"),
                payment_method: PaymentMethod::Pix,
                appointment_id: None,
                notes: None,
            },
        )
        .await
        .unwrap();

        let summary = build_summary(
            &pool,
            &professional,
            SummaryQuery {
                date: Some(date),
                professional_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.appointments.scheduled, 2);
        assert_eq!(summary.appointments.cancelled, 1);
        assert_eq!(summary.patients, 1);

        let closing = summary.closing.unwrap();
        assert_eq!(closing.total_amount, dec("320.00"));
        assert!(!closing.is_finalized);
    }

    #[tokio::test]
    async fn test_global_view_is_admin_only() {
        let (pool, _dir) = test_pool().await;
        let admin = insert_professional(&pool, Role::SuperAdmin).await;
        let user = insert_professional(&pool, Role::User).await;
        insert_patient(&pool, admin.profile_id).await;
        insert_patient(&pool, user.profile_id).await;

        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();

        // A visão do usuário fica restrita aos próprios dados
        let own = build_summary(
            &pool,
            &user,
            SummaryQuery { date: Some(date), professional_id: None },
        )
        .await
        .unwrap();
        assert_eq!(own.patients, 1);

        // O super_admin sem filtro enxerga o agregado global
        let global = build_summary(
            &pool,
            &admin,
            SummaryQuery { date: Some(date), professional_id: None },
        )
        .await
        .unwrap();
        assert_eq!(global.patients, 2);
        assert!(global.closing.is_none());
    }
}
