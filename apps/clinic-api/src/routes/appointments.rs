//! Rotas de agendamento
//!
//! A regra central da agenda: um profissional não pode ter dois
//! agendamentos não cancelados no mesmo dia e horário. O handler faz a
//! pré-verificação para responder cedo, mas a garantia contra corrida é
//! o índice único parcial no banco; a violação é convertida no mesmo
//! erro de conflito.

use crate::error::ApiError;
use crate::extract::AuthContext;
use crate::policy;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveTime};
use common_auth::session::Identity;
use common_db::models::{Appointment, AppointmentStatus};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list).post(create))
        .route("/appointments/day", get(list_day))
        .route("/appointments/:id", get(fetch))
        .route("/appointments/:id/confirm", post(confirm))
        .route("/appointments/:id/complete", post(complete))
        .route("/appointments/:id/cancel", post(cancel))
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub procedure_id: Uuid,
    /// Somente o super_admin agenda para outro profissional
    pub professional_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
}

#[derive(Debug, serde::Deserialize)]
pub struct RangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub professional_id: Option<Uuid>,
}

#[derive(Debug, serde::Deserialize)]
pub struct DayQuery {
    pub date: NaiveDate,
    pub professional_id: Option<Uuid>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let appointment = create_appointment(&state.db, &auth.identity, req).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let scope = policy::resolve_scope(&auth.identity, query.professional_id)?;
    Ok(Json(list_range(&state.db, scope, query.from, query.to).await?))
}

async fn list_day(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let scope = policy::resolve_scope(&auth.identity, query.professional_id)?;
    Ok(Json(list_range(&state.db, scope, query.date, query.date).await?))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    Ok(Json(get_appointment(&state.db, &auth.identity, id).await?))
}

async fn confirm(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment =
        transition_status(&state.db, &auth.identity, id, AppointmentStatus::Confirmed, None).await?;
    Ok(Json(appointment))
}

async fn complete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment =
        transition_status(&state.db, &auth.identity, id, AppointmentStatus::Completed, None).await?;
    Ok(Json(appointment))
}

async fn cancel(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment = transition_status(
        &state.db,
        &auth.identity,
        id,
        AppointmentStatus::Cancelled,
        req.reason,
    )
    .await?;
    Ok(Json(appointment))
}

/// Verifica se já existe agendamento não cancelado no horário
pub(crate) async fn slot_taken(
    db: &SqlitePool,
    professional_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<bool, ApiError> {
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments
         WHERE professional_id = ? AND appointment_date = ? AND appointment_time = ?
           AND status != 'cancelled'",
    )
    .bind(professional_id.to_string())
    .bind(date)
    .bind(time)
    .fetch_one(db)
    .await?;

    Ok(existing > 0)
}

pub(crate) async fn create_appointment(
    db: &SqlitePool,
    identity: &Identity,
    req: CreateAppointmentRequest,
) -> Result<Appointment, ApiError> {
    let professional_id = policy::resolve_owner(identity, req.professional_id)?;

    // O paciente precisa pertencer ao profissional do agendamento
    let patient_owner: Option<String> =
        sqlx::query_scalar("SELECT professional_id FROM patients WHERE id = ?")
            .bind(req.patient_id.to_string())
            .fetch_optional(db)
            .await?;
    match patient_owner {
        None => return Err(ApiError::Validation("paciente não encontrado".to_string())),
        Some(owner) if owner != professional_id.to_string() => {
            return Err(ApiError::Validation(
                "paciente não pertence ao profissional do agendamento".to_string(),
            ))
        }
        Some(_) => {}
    }

    // Procedimentos desativados não recebem novos agendamentos
    let procedure_active: Option<bool> =
        sqlx::query_scalar("SELECT is_active FROM procedures WHERE id = ?")
            .bind(req.procedure_id.to_string())
            .fetch_optional(db)
            .await?;
    if !procedure_active.unwrap_or(false) {
        return Err(ApiError::Validation("procedimento inexistente ou desativado".to_string()));
    }

    // Pré-verificação do horário; a palavra final é do índice único
    if slot_taken(db, professional_id, req.appointment_date, req.appointment_time).await? {
        return Err(ApiError::SlotConflict);
    }

    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO appointments
         (id, patient_id, procedure_id, professional_id, appointment_date, appointment_time, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(req.patient_id.to_string())
    .bind(req.procedure_id.to_string())
    .bind(professional_id.to_string())
    .bind(req.appointment_date)
    .bind(req.appointment_time)
    .bind(identity.profile_id.to_string())
    .execute(db)
    .await?;

    info!(
        "Agendamento {} criado: profissional {} em {} {}",
        id, professional_id, req.appointment_date, req.appointment_time
    );

    get_appointment(db, identity, id).await
}

pub(crate) async fn get_appointment(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
) -> Result<Appointment, ApiError> {
    let appointment = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound)?;

    policy::ensure_owner(identity, appointment.professional_id)?;
    Ok(appointment)
}

pub(crate) async fn list_range(
    db: &SqlitePool,
    scope: Option<Uuid>,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Appointment>, ApiError> {
    let appointments = match scope {
        Some(professional_id) => {
            sqlx::query_as::<_, Appointment>(
                "SELECT * FROM appointments
                 WHERE professional_id = ? AND appointment_date BETWEEN ? AND ?
                 ORDER BY appointment_date, appointment_time",
            )
            .bind(professional_id.to_string())
            .bind(from)
            .bind(to)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Appointment>(
                "SELECT * FROM appointments
                 WHERE appointment_date BETWEEN ? AND ?
                 ORDER BY appointment_date, appointment_time",
            )
            .bind(from)
            .bind(to)
            .fetch_all(db)
            .await?
        }
    };

    Ok(appointments)
}

/// Avança o status de um agendamento
///
/// A atualização é condicionada ao status anterior; se outra requisição
/// mudou o registro primeiro, nenhuma linha é afetada e a transição é
/// reavaliada contra o estado atual.
pub(crate) async fn transition_status(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
    next: AppointmentStatus,
    reason: Option<String>,
) -> Result<Appointment, ApiError> {
    let current = get_appointment(db, identity, id).await?;

    if !current.status.can_transition_to(next) {
        return Err(ApiError::InvalidTransition(current.status, next));
    }

    let result = sqlx::query(
        "UPDATE appointments
         SET status = ?, cancellation_reason = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND status = ?",
    )
    .bind(next.to_string())
    .bind(&reason)
    .bind(id.to_string())
    .bind(current.status.to_string())
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        let now = get_appointment(db, identity, id).await?;
        return Err(ApiError::InvalidTransition(now.status, next));
    }

    get_appointment(db, identity, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_patient, insert_procedure, insert_professional, test_pool};
    use common_db::error::DbError;
    use common_db::models::Role;

    struct Fixture {
        pool: SqlitePool,
        _dir: tempfile::TempDir,
        professional: Identity,
        patient_id: Uuid,
        procedure_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let (pool, _dir) = test_pool().await;
        let professional = insert_professional(&pool, Role::User).await;
        let patient_id = insert_patient(&pool, professional.profile_id).await;
        let procedure_id = insert_procedure(&pool).await;

        Fixture {
            pool,
            _dir,
            professional,
            patient_id,
            procedure_id,
        }
    }

    fn slot_req(f: &Fixture, time: &str) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: f.patient_id,
            procedure_id: f.procedure_id,
            professional_id: None,
            appointment_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            appointment_time: time.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_same_slot_conflicts() {
        let f = fixture().await;

        create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00"))
            .await
            .unwrap();

        // Mesmo profissional, mesmo horário: conflito
        let result =
            create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00")).await;
        assert!(matches!(result, Err(ApiError::SlotConflict)));

        // Outro horário do mesmo dia continua livre
        create_appointment(&f.pool, &f.professional, slot_req(&f, "10:00:00"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_conflict_is_scoped_per_professional() {
        let f = fixture().await;
        let other = insert_professional(&f.pool, Role::User).await;
        let other_patient = insert_patient(&f.pool, other.profile_id).await;

        create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00"))
            .await
            .unwrap();

        // Outro profissional pode atender no mesmo dia e horário
        let req = CreateAppointmentRequest {
            patient_id: other_patient,
            procedure_id: f.procedure_id,
            professional_id: None,
            appointment_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            appointment_time: "09:00:00".parse().unwrap(),
        };
        create_appointment(&f.pool, &other, req).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_rebooked() {
        let f = fixture().await;

        let first = create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00"))
            .await
            .unwrap();

        transition_status(
            &f.pool,
            &f.professional,
            first.id,
            AppointmentStatus::Cancelled,
            Some("paciente desmarcou".to_string()),
        )
        .await
        .unwrap();

        // Horário liberado: o índice parcial ignora linhas canceladas
        let rebooked = create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00"))
            .await
            .unwrap();
        assert_eq!(rebooked.status, AppointmentStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_unique_index_is_the_race_backstop() {
        let f = fixture().await;

        create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00"))
            .await
            .unwrap();

        // Inserção direta, simulando uma requisição concorrente que
        // passou pela pré-verificação antes do primeiro INSERT
        let result = sqlx::query(
            "INSERT INTO appointments
             (id, patient_id, procedure_id, professional_id, appointment_date, appointment_time, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(f.patient_id.to_string())
        .bind(f.procedure_id.to_string())
        .bind(f.professional.profile_id.to_string())
        .bind(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
        .bind("09:00:00".parse::<NaiveTime>().unwrap())
        .bind(f.professional.profile_id.to_string())
        .execute(&f.pool)
        .await;

        let err = ApiError::from(DbError::from(result.unwrap_err()));
        assert!(matches!(err, ApiError::SlotConflict));
    }

    #[tokio::test]
    async fn test_status_moves_only_forward() {
        let f = fixture().await;

        let appointment = create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00"))
            .await
            .unwrap();

        // scheduled não pula direto para completed
        let result = transition_status(
            &f.pool,
            &f.professional,
            appointment.id,
            AppointmentStatus::Completed,
            None,
        )
        .await;
        assert!(matches!(result, Err(ApiError::InvalidTransition(_, _))));

        let confirmed = transition_status(
            &f.pool,
            &f.professional,
            appointment.id,
            AppointmentStatus::Confirmed,
            None,
        )
        .await
        .unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        let completed = transition_status(
            &f.pool,
            &f.professional,
            appointment.id,
            AppointmentStatus::Completed,
            None,
        )
        .await
        .unwrap();
        assert_eq!(completed.status, AppointmentStatus::Completed);

        // Estado terminal não sai do lugar
        let result = transition_status(
            &f.pool,
            &f.professional,
            appointment.id,
            AppointmentStatus::Cancelled,
            None,
        )
        .await;
        assert!(matches!(result, Err(ApiError::InvalidTransition(_, _))));
    }

    #[tokio::test]
    async fn test_cancellation_records_reason() {
        let f = fixture().await;

        let appointment = create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00"))
            .await
            .unwrap();

        let cancelled = transition_status(
            &f.pool,
            &f.professional,
            appointment.id,
            AppointmentStatus::Cancelled,
            Some("paciente viajou".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("paciente viajou"));
    }

    #[tokio::test]
    async fn test_patient_must_belong_to_professional() {
        let f = fixture().await;
        let other = insert_professional(&f.pool, Role::User).await;
        let other_patient = insert_patient(&f.pool, other.profile_id).await;

        let req = CreateAppointmentRequest {
            patient_id: other_patient,
            procedure_id: f.procedure_id,
            professional_id: None,
            appointment_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            appointment_time: "09:00:00".parse().unwrap(),
        };
        let result = create_appointment(&f.pool, &f.professional, req).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_listing_is_scoped() {
        let f = fixture().await;
        let other = insert_professional(&f.pool, Role::User).await;
        let other_patient = insert_patient(&f.pool, other.profile_id).await;

        create_appointment(&f.pool, &f.professional, slot_req(&f, "09:00:00"))
            .await
            .unwrap();
        let req = CreateAppointmentRequest {
            patient_id: other_patient,
            procedure_id: f.procedure_id,
            professional_id: None,
            appointment_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            appointment_time: "09:00:00".parse().unwrap(),
        };
        create_appointment(&f.pool, &other, req).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();

        let scoped = list_range(&f.pool, Some(f.professional.profile_id), date, date)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);

        let global = list_range(&f.pool, None, date, date).await.unwrap();
        assert_eq!(global.len(), 2);
    }
}
