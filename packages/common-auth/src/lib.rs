//! Common Auth - Biblioteca compartilhada de autenticação da clínica
//!
//! Esta biblioteca fornece:
//! - Cadastro e verificação de credenciais (hash Argon2id)
//! - Emissão e revogação de sessões via token assinado
//! - Notificações de mudança de sessão para assinantes
//!
//! O estado de sessão vive dentro do serviço e é passado explicitamente
//! às aplicações; não há estado global de autenticação.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use common_db::error::DbError;
use common_db::models::{Profile, Role};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tokio::sync::{broadcast, RwLock};
use tracing::info;
use uuid::Uuid;

pub mod error;
pub mod session;

use error::AuthError;
use session::{Claims, Identity, Session, SessionEvent};

/// Configuração do serviço de autenticação
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Segredo usado para assinar os tokens de sessão
    pub jwt_secret: String,
    /// Validade da sessão em minutos
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "".to_string(), // Vazio por segurança, deve ser definido explicitamente
            token_ttl_minutes: 8 * 60,
        }
    }
}

/// Provedor de autenticação e sessões
///
/// Sessões são registradas no login e descartadas no logout; um token
/// cujo identificador não está mais registrado é recusado mesmo que a
/// assinatura ainda seja válida.
pub struct AuthService {
    pool: SqlitePool,
    config: AuthConfig,
    active_sessions: RwLock<HashSet<Uuid>>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthService {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            pool,
            config,
            active_sessions: RwLock::new(HashSet::new()),
            events,
        }
    }

    /// Cadastra uma nova identidade e o perfil correspondente
    ///
    /// O primeiro perfil criado no sistema recebe o papel super_admin;
    /// a contagem é feita na mesma transação da inserção para que a
    /// regra não dispare duas vezes sob cadastros concorrentes.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<Identity, AuthError> {
        let email = email.trim().to_lowercase();
        let password_hash = hash_password(password)?;
        let profile_id = Uuid::new_v4();

        let mut transaction = self.pool.begin().await.map_err(DbError::from)?;

        sqlx::query("INSERT INTO auth_users (id, email, password_hash) VALUES (?, ?, ?)")
            .bind(profile_id.to_string())
            .bind(&email)
            .bind(&password_hash)
            .execute(&mut *transaction)
            .await
            .map_err(DbError::from)
            .map_err(map_unique_email)?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&mut *transaction)
            .await
            .map_err(DbError::from)?;

        let role = if existing == 0 { Role::SuperAdmin } else { Role::User };

        sqlx::query("INSERT INTO profiles (id, email, full_name, role) VALUES (?, ?, ?, ?)")
            .bind(profile_id.to_string())
            .bind(&email)
            .bind(full_name)
            .bind(role.to_string())
            .execute(&mut *transaction)
            .await
            .map_err(DbError::from)
            .map_err(map_unique_email)?;

        transaction.commit().await.map_err(DbError::from)?;

        info!("Perfil criado: {} ({})", profile_id, role);
        Ok(Identity { profile_id, role })
    }

    /// Autentica por e-mail e senha e emite uma nova sessão
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim().to_lowercase();

        let credentials: Option<(String, String)> =
            sqlx::query_as("SELECT id, password_hash FROM auth_users WHERE email = ?")
                .bind(&email)
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::from)?;

        let Some((user_id, password_hash)) = credentials else {
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, &password_hash)?;

        let profile: Profile = sqlx::query_as("SELECT * FROM profiles WHERE id = ?")
            .bind(&user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;

        if !profile.is_active {
            return Err(AuthError::InactiveProfile);
        }

        let identity = Identity {
            profile_id: profile.id,
            role: profile.role,
        };

        let session_id = Uuid::new_v4();
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::minutes(self.config.token_ttl_minutes);

        let claims = Claims {
            sub: identity.profile_id.to_string(),
            jti: session_id.to_string(),
            role: identity.role.to_string(),
            iat: issued_at.timestamp() as usize,
            exp: expires_at.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        self.active_sessions.write().await.insert(session_id);

        // Sem assinantes o envio falha; não é um erro de autenticação
        let _ = self.events.send(SessionEvent::SignedIn {
            profile_id: identity.profile_id,
        });

        info!("Sessão iniciada para o perfil {}", identity.profile_id);
        Ok(Session {
            token,
            identity,
            expires_at,
        })
    }

    /// Encerra a sessão do token informado
    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.decode_claims(token)?;
        let session_id = parse_claim_uuid(&claims.jti)?;
        let profile_id = parse_claim_uuid(&claims.sub)?;

        self.active_sessions.write().await.remove(&session_id);

        let _ = self.events.send(SessionEvent::SignedOut { profile_id });

        info!("Sessão encerrada para o perfil {}", profile_id);
        Ok(())
    }

    /// Valida um token e devolve a identidade da sessão
    pub async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.decode_claims(token)?;
        let session_id = parse_claim_uuid(&claims.jti)?;

        if !self.active_sessions.read().await.contains(&session_id) {
            return Err(AuthError::SessionRevoked);
        }

        let profile_id = parse_claim_uuid(&claims.sub)?;
        let role: Role = claims.role.parse().map_err(|_| AuthError::InvalidToken)?;

        Ok(Identity { profile_id, role })
    }

    /// Assina as notificações de mudança de sessão
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::SessionExpired,
            _ => AuthError::InvalidToken,
        })?;

        Ok(data.claims)
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

fn parse_claim_uuid(raw: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(raw).map_err(|_| AuthError::InvalidToken)
}

fn map_unique_email(err: DbError) -> AuthError {
    if err.unique_violation_on("email") {
        AuthError::EmailAlreadyRegistered
    } else {
        AuthError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_db::{init_db_pool, DbConfig};
    use tempfile::{tempdir, TempDir};

    async fn test_service(ttl_minutes: i64) -> (AuthService, TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test_auth.db");

        let config = DbConfig {
            db_path: db_path.to_str().unwrap().to_string(),
            max_connections: 2,
        };

        let pool = init_db_pool(&config).await.unwrap();

        let service = AuthService::new(
            pool,
            AuthConfig {
                jwt_secret: "segredo-de-teste".to_string(),
                token_ttl_minutes: ttl_minutes,
            },
        );

        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_first_profile_is_super_admin() {
        let (service, _dir) = test_service(60).await;

        // O primeiro cadastro do sistema vira super_admin
        let first = service
            .sign_up("dra.ana@clinica.med.br", "senha-forte-123", "Dra. Ana")
            .await
            .unwrap();
        assert_eq!(first.role, Role::SuperAdmin);

        // Os seguintes são usuários comuns
        let second = service
            .sign_up("dr.bruno@clinica.med.br", "senha-forte-456", "Dr. Bruno")
            .await
            .unwrap();
        assert_eq!(second.role, Role::User);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (service, _dir) = test_service(60).await;

        service
            .sign_up("dra.ana@clinica.med.br", "senha-forte-123", "Dra. Ana")
            .await
            .unwrap();

        let result = service
            .sign_up("dra.ana@clinica.med.br", "outra-senha-999", "Impostora")
            .await;

        assert!(matches!(result, Err(AuthError::EmailAlreadyRegistered)));
    }

    #[tokio::test]
    async fn test_sign_in_and_verify() {
        let (service, _dir) = test_service(60).await;

        let identity = service
            .sign_up("dra.ana@clinica.med.br", "senha-forte-123", "Dra. Ana")
            .await
            .unwrap();

        let session = service
            .sign_in("dra.ana@clinica.med.br", "senha-forte-123")
            .await
            .unwrap();

        let verified = service.verify(&session.token).await.unwrap();
        assert_eq!(verified.profile_id, identity.profile_id);
        assert_eq!(verified.role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let (service, _dir) = test_service(60).await;

        service
            .sign_up("dra.ana@clinica.med.br", "senha-forte-123", "Dra. Ana")
            .await
            .unwrap();

        let result = service.sign_in("dra.ana@clinica.med.br", "senha-errada").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        let result = service.sign_in("ninguem@clinica.med.br", "senha-forte-123").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_sign_out_revokes_session() {
        let (service, _dir) = test_service(60).await;

        service
            .sign_up("dra.ana@clinica.med.br", "senha-forte-123", "Dra. Ana")
            .await
            .unwrap();

        let session = service
            .sign_in("dra.ana@clinica.med.br", "senha-forte-123")
            .await
            .unwrap();

        service.sign_out(&session.token).await.unwrap();

        // Token assinado continua válido, mas a sessão não existe mais
        let result = service.verify(&session.token).await;
        assert!(matches!(result, Err(AuthError::SessionRevoked)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        // TTL negativo produz um token já vencido
        let (service, _dir) = test_service(-5).await;

        service
            .sign_up("dra.ana@clinica.med.br", "senha-forte-123", "Dra. Ana")
            .await
            .unwrap();

        let session = service
            .sign_in("dra.ana@clinica.med.br", "senha-forte-123")
            .await
            .unwrap();

        let result = service.verify(&session.token).await;
        assert!(matches!(result, Err(AuthError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_session_events_broadcast() {
        let (service, _dir) = test_service(60).await;
        let mut events = service.subscribe();

        let identity = service
            .sign_up("dra.ana@clinica.med.br", "senha-forte-123", "Dra. Ana")
            .await
            .unwrap();

        let session = service
            .sign_in("dra.ana@clinica.med.br", "senha-forte-123")
            .await
            .unwrap();
        service.sign_out(&session.token).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedIn { profile_id: identity.profile_id }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedOut { profile_id: identity.profile_id }
        );
    }
}
