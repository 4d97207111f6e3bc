//! Rotas de cadastro de pacientes
//!
//! Cada paciente pertence a exatamente um profissional; o super_admin
//! enxerga e cadastra em nome de qualquer um.

use crate::error::ApiError;
use crate::extract::AuthContext;
use crate::policy;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common_auth::session::Identity;
use common_db::models::Patient;
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", get(list).post(create))
        .route("/patients/:id", get(fetch).patch(update))
}

#[derive(Debug, serde::Deserialize)]
pub struct ListQuery {
    /// Filtro por profissional; visão global é exclusiva do super_admin
    pub professional_id: Option<Uuid>,
    /// Busca por trecho do nome
    pub search: Option<String>,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct CreatePatientRequest {
    #[validate(length(min = 1, message = "nome é obrigatório"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "telefone é obrigatório"))]
    pub phone: String,
    #[validate(email(message = "e-mail inválido"))]
    pub email: Option<String>,
    pub notes: Option<String>,
    /// Somente o super_admin cadastra para outro profissional
    pub professional_id: Option<Uuid>,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct UpdatePatientRequest {
    #[validate(length(min = 1, message = "nome não pode ficar vazio"))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, message = "telefone não pode ficar vazio"))]
    pub phone: Option<String>,
    #[validate(email(message = "e-mail inválido"))]
    pub email: Option<String>,
    pub notes: Option<String>,
}

async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    Ok(Json(list_patients(&state.db, &auth.identity, query).await?))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let patient = create_patient(&state.db, &auth.identity, req).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Patient>, ApiError> {
    Ok(Json(get_patient(&state.db, &auth.identity, id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<Patient>, ApiError> {
    Ok(Json(update_patient(&state.db, &auth.identity, id, req).await?))
}

pub(crate) async fn list_patients(
    db: &SqlitePool,
    identity: &Identity,
    query: ListQuery,
) -> Result<Vec<Patient>, ApiError> {
    let scope = policy::resolve_scope(identity, query.professional_id)?;
    let search = query
        .search
        .map(|term| format!("%{}%", term))
        .unwrap_or_else(|| "%".to_string());

    let patients = match scope {
        Some(professional_id) => {
            sqlx::query_as::<_, Patient>(
                "SELECT * FROM patients WHERE professional_id = ? AND full_name LIKE ? ORDER BY full_name",
            )
            .bind(professional_id.to_string())
            .bind(&search)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Patient>(
                "SELECT * FROM patients WHERE full_name LIKE ? ORDER BY full_name",
            )
            .bind(&search)
            .fetch_all(db)
            .await?
        }
    };

    Ok(patients)
}

pub(crate) async fn get_patient(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
) -> Result<Patient, ApiError> {
    let patient = sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound)?;

    policy::ensure_owner(identity, patient.professional_id)?;
    Ok(patient)
}

pub(crate) async fn create_patient(
    db: &SqlitePool,
    identity: &Identity,
    req: CreatePatientRequest,
) -> Result<Patient, ApiError> {
    req.validate()?;
    let professional_id = policy::resolve_owner(identity, req.professional_id)?;

    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO patients (id, full_name, phone, email, notes, professional_id) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&req.full_name)
    .bind(&req.phone)
    .bind(&req.email)
    .bind(&req.notes)
    .bind(professional_id.to_string())
    .execute(db)
    .await?;

    get_patient(db, identity, id).await
}

pub(crate) async fn update_patient(
    db: &SqlitePool,
    identity: &Identity,
    id: Uuid,
    req: UpdatePatientRequest,
) -> Result<Patient, ApiError> {
    req.validate()?;

    let current = get_patient(db, identity, id).await?;

    let full_name = req.full_name.unwrap_or(current.full_name);
    let phone = req.phone.unwrap_or(current.phone);
    let email = req.email.or(current.email);
    let notes = req.notes.or(current.notes);

    sqlx::query(
        "UPDATE patients SET full_name = ?, phone = ?, email = ?, notes = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(&full_name)
    .bind(&phone)
    .bind(&email)
    .bind(&notes)
    .bind(id.to_string())
    .execute(db)
    .await?;

    get_patient(db, identity, id).await
}
