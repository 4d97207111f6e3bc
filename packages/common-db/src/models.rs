//! Modelos de dados compartilhados entre aplicações
//!
//! Este módulo define as estruturas de dados principais usadas pelo ecossistema da clínica

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::str::FromStr;
use uuid::Uuid;

/// Papéis de acesso de um perfil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Acesso total, inclusive a dados de outros profissionais
    SuperAdmin,
    /// Profissional comum, restrito aos próprios dados
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::SuperAdmin => write!(f, "super_admin"),
            Role::User => write!(f, "user"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "super_admin" => Ok(Role::SuperAdmin),
            "user" => Ok(Role::User),
            other => Err(format!("Valor de papel inválido: {}", other)),
        }
    }
}

/// Status possíveis de um agendamento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Agendamento inicial, pendente de confirmação
    Scheduled,
    /// Confirmado pelo paciente
    Confirmed,
    /// Consulta concluída
    Completed,
    /// Cancelado
    Cancelled,
}

impl AppointmentStatus {
    /// Estados terminais não admitem nenhuma transição posterior
    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// O ciclo de vida só avança: scheduled → confirmed → completed,
    /// com cancelamento possível a partir de qualquer estado não terminal
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        match (self, next) {
            (AppointmentStatus::Scheduled, AppointmentStatus::Confirmed) => true,
            (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled) => true,
            (AppointmentStatus::Confirmed, AppointmentStatus::Completed) => true,
            (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("Valor de status inválido: {}", other)),
        }
    }
}

/// Formas de pagamento aceitas no caixa
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    Pix,
    Transfer,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::CreditCard => write!(f, "credit_card"),
            PaymentMethod::DebitCard => write!(f, "debit_card"),
            PaymentMethod::Pix => write!(f, "pix"),
            PaymentMethod::Transfer => write!(f, "transfer"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cash" => Ok(PaymentMethod::Cash),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "pix" => Ok(PaymentMethod::Pix),
            "transfer" => Ok(PaymentMethod::Transfer),
            other => Err(format!("Forma de pagamento inválida: {}", other)),
        }
    }
}

/// Perfil de um profissional autenticado
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Identificador único, compartilhado com o registro de credenciais
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    /// O primeiro perfil criado no sistema recebe super_admin
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Profile {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            role: enum_col(row, "role")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Procedimento do catálogo da clínica
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Uuid,
    pub name: String,
    /// Duração prevista em minutos, sempre positiva
    pub duration_minutes: i32,
    /// Preço sugerido, decimal exato com 2 casas
    pub default_price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Procedure {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            name: row.try_get("name")?,
            duration_minutes: row.try_get("duration_minutes")?,
            default_price: decimal_col(row, "default_price")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Paciente vinculado a um profissional
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub notes: Option<String>,
    /// Profissional dono do cadastro
    pub professional_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Patient {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            full_name: row.try_get("full_name")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            notes: row.try_get("notes")?,
            professional_id: uuid_col(row, "professional_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Representa uma consulta/agendamento
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub procedure_id: Uuid,
    pub professional_id: Uuid,
    /// Data do atendimento
    pub appointment_date: NaiveDate,
    /// Horário do atendimento; junto com a data e o profissional forma o
    /// horário único de agenda
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    /// Motivo informado no cancelamento
    pub cancellation_reason: Option<String>,
    /// Perfil que criou o agendamento
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Appointment {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            patient_id: uuid_col(row, "patient_id")?,
            procedure_id: uuid_col(row, "procedure_id")?,
            professional_id: uuid_col(row, "professional_id")?,
            appointment_date: row.try_get("appointment_date")?,
            appointment_time: row.try_get("appointment_time")?,
            status: enum_col(row, "status")?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            created_by: uuid_col(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fechamento de caixa diário de um profissional
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashRegisterClosing {
    pub id: Uuid,
    pub professional_id: Uuid,
    /// Data de referência; no máximo um fechamento por profissional e dia
    pub closing_date: NaiveDate,
    /// Soma exata dos lançamentos atuais, recalculada a cada mutação
    pub total_amount: Decimal,
    pub notes: Option<String>,
    /// Depois de finalizado o fechamento é imutável
    pub is_finalized: bool,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for CashRegisterClosing {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            professional_id: uuid_col(row, "professional_id")?,
            closing_date: row.try_get("closing_date")?,
            total_amount: decimal_col(row, "total_amount")?,
            notes: row.try_get("notes")?,
            is_finalized: row.try_get("is_finalized")?,
            finalized_at: row.try_get("finalized_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Lançamento individual dentro de um fechamento de caixa
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashRegisterTransaction {
    pub id: Uuid,
    pub closing_id: Uuid,
    /// Agendamento que originou o recebimento, quando houver
    pub appointment_id: Option<Uuid>,
    /// Valor recebido, nunca negativo
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for CashRegisterTransaction {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            closing_id: uuid_col(row, "closing_id")?,
            appointment_id: opt_uuid_col(row, "appointment_id")?,
            amount: decimal_col(row, "amount")?,
            payment_method: enum_col(row, "payment_method")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Soma exata de uma lista de valores monetários, normalizada em 2 casas
pub fn sum_amounts<'a, I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = &'a Decimal>,
{
    amounts
        .into_iter()
        .fold(Decimal::ZERO, |acc, amount| acc + *amount)
        .round_dp(2)
}

/// Representação canônica com 2 casas usada nas colunas monetárias
pub fn money_text(amount: &Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

// Identificadores são gravados como TEXT; a leitura reconstrói o Uuid
fn uuid_col(row: &SqliteRow, column: &str) -> sqlx::Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn opt_uuid_col(row: &SqliteRow, column: &str) -> sqlx::Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(column)?;
    match raw {
        Some(value) => Uuid::parse_str(&value)
            .map(Some)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: column.to_string(),
                source: Box::new(e),
            }),
        None => Ok(None),
    }
}

// Colunas monetárias guardam o texto decimal canônico
fn decimal_col(row: &SqliteRow, column: &str) -> sqlx::Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn enum_col<T>(row: &SqliteRow, column: &str) -> sqlx::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|message: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_forward_only() {
        use AppointmentStatus::*;

        // Transições válidas
        assert!(Scheduled.can_transition_to(Confirmed));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));

        // O ciclo nunca anda para trás nem pula etapas
        assert!(!Scheduled.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Scheduled));

        // Estados terminais não saem do lugar
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Scheduled, Confirmed, Completed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_round_trip() {
        use AppointmentStatus::*;

        for status in [Scheduled, Confirmed, Completed, Cancelled] {
            let parsed: AppointmentStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }

        assert!("no_show".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn test_payment_method_round_trip() {
        use PaymentMethod::*;

        for method in [Cash, CreditCard, DebitCard, Pix, Transfer] {
            let parsed: PaymentMethod = method.to_string().parse().unwrap();
            assert_eq!(parsed, method);
        }

        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_money_text_canonical() {
        assert_eq!(money_text(&Decimal::from_str("10.5").unwrap()), "10.50");
        assert_eq!(money_text(&Decimal::ZERO), "0.00");
        assert_eq!(money_text(&Decimal::from_str("0.005").unwrap()), "0.00");
    }

    #[test]
    fn test_sum_amounts_exact() {
        // Somar 0.10 cem vezes precisa dar exatamente 10.00, sem deriva
        // de ponto flutuante
        let cents: Vec<Decimal> = (0..100).map(|_| Decimal::from_str("0.10").unwrap()).collect();
        assert_eq!(sum_amounts(cents.iter()), Decimal::from_str("10.00").unwrap());

        assert_eq!(sum_amounts(std::iter::empty()), Decimal::ZERO);
    }
}
