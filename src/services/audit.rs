use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use tracing::warn;
use uuid::Uuid;

use crate::{auth::AuthenticatedUser, db::DbPool, entities::audit_log};

/// Identity attached to an audit record.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
}

impl From<&AuthenticatedUser> for Actor {
    fn from(user: &AuthenticatedUser) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

/// Recorded action kinds. Stored as plain strings so old rows survive enum
/// renames.
#[derive(Debug, Clone, Copy, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    OrderCreated,
    OrderStatusUpdated,
    PaymentProofUploaded,
    PaymentVerified,
    PaymentRejected,
    ProductCreated,
    ProductUpdated,
    ProductArchived,
    CategoryCreated,
    UserRegistered,
    UserRoleUpdated,
}

/// Fire-and-forget audit writer. A failed write is logged and swallowed; it
/// never propagates into the caller's result.
#[derive(Clone)]
pub struct AuditLogService {
    db: Arc<DbPool>,
}

impl AuditLogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn record(
        &self,
        action: AuditAction,
        entity_type: &str,
        entity_id: Uuid,
        details: serde_json::Value,
        actor: Option<&Actor>,
    ) {
        let entry = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            action: Set(action.to_string()),
            entity_type: Set(entity_type.to_string()),
            entity_id: Set(entity_id),
            details: Set(details),
            user_id: Set(actor.map(|a| a.id)),
            user_email: Set(actor.map(|a| a.email.clone())),
            created_at: Set(Utc::now()),
        };

        if let Err(e) = entry.insert(&*self.db).await {
            warn!(
                action = %action,
                entity_type,
                %entity_id,
                error = %e,
                "audit log write failed; continuing"
            );
        }
    }
}
