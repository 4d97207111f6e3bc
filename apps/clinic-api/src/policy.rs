//! Camada de políticas de acesso
//!
//! Toda decisão de autorização por papel ou por posse de registro passa
//! por este módulo; os handlers não repetem condicionais de papel e as
//! consultas recebem daqui o escopo de profissional já resolvido.

use crate::error::ApiError;
use common_auth::session::Identity;
use uuid::Uuid;

/// Verifica se a identidade pode acessar um registro do dono informado
pub fn can_access(identity: &Identity, owner_id: Uuid) -> bool {
    identity.is_super_admin() || identity.profile_id == owner_id
}

/// Rejeita com Forbidden quando o registro pertence a outro profissional
pub fn ensure_owner(identity: &Identity, owner_id: Uuid) -> Result<(), ApiError> {
    if can_access(identity, owner_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Operações administrativas: catálogo de procedimentos e gestão de perfis
pub fn ensure_super_admin(identity: &Identity) -> Result<(), ApiError> {
    if identity.is_super_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Resolve o profissional dono de um novo registro
///
/// Um usuário comum só cria registros para si mesmo; o super_admin pode
/// criar em nome de qualquer profissional, e sem indicação explícita o
/// registro fica com ele próprio.
pub fn resolve_owner(identity: &Identity, requested: Option<Uuid>) -> Result<Uuid, ApiError> {
    match requested {
        Some(professional_id) => {
            if can_access(identity, professional_id) {
                Ok(professional_id)
            } else {
                Err(ApiError::Forbidden)
            }
        }
        None => Ok(identity.profile_id),
    }
}

/// Resolve o escopo de profissional para listagens
///
/// `None` significa visão global e só está disponível ao super_admin.
pub fn resolve_scope(
    identity: &Identity,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, ApiError> {
    if identity.is_super_admin() {
        return Ok(requested);
    }
    match requested {
        Some(professional_id) if professional_id != identity.profile_id => {
            Err(ApiError::Forbidden)
        }
        _ => Ok(Some(identity.profile_id)),
    }
}
