use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AuthService, TokenResponse},
    db::DbPool,
    entities::{
        user::{self, UserRole},
        User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::audit::{Actor, AuditAction, AuditLogService},
};

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            role: model.role,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserListPage {
    pub users: Vec<UserResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

/// Account registration, login, and the admin user listing.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
    auth: Arc<AuthService>,
    event_sender: Arc<EventSender>,
    audit: Arc<AuditLogService>,
}

impl UserService {
    pub fn new(
        db: Arc<DbPool>,
        auth: Arc<AuthService>,
        event_sender: Arc<EventSender>,
        audit: Arc<AuditLogService>,
    ) -> Self {
        Self {
            db,
            auth,
            event_sender,
            audit,
        }
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse, ServiceError> {
        request.validate()?;

        let existing = User::find()
            .filter(user::Column::Email.eq(request.email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(
                "email is already registered".to_string(),
            ));
        }

        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();

        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.clone()),
            email: Set(request.email.clone()),
            phone: Set(request.phone.clone()),
            password_hash: Set(password_hash),
            role: Set(UserRole::Customer),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(user_id = %model.id, "user registered");
        self.audit
            .record(
                AuditAction::UserRegistered,
                "user",
                model.id,
                json!({ "email": model.email }),
                None,
            )
            .await;
        self.event_sender
            .send_or_log(Event::UserRegistered(model.id))
            .await;

        Ok(model.into())
    }

    /// Login failures are deliberately indistinguishable between unknown
    /// email and wrong password.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ServiceError> {
        let user = User::find()
            .filter(user::Column::Email.eq(request.email.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("invalid email or password".to_string()))?;

        if !verify_password(&request.password, &user.password_hash) {
            return Err(ServiceError::Unauthorized(
                "invalid email or password".to_string(),
            ));
        }

        let token = self.auth.generate_token(&user)?;

        Ok(LoginResponse {
            token,
            user: user.into(),
        })
    }

    pub async fn get(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;
        Ok(user.into())
    }

    pub async fn list_users(&self, page: u64, per_page: u64) -> Result<UserListPage, ServiceError> {
        let paginator = User::find()
            .order_by_desc(user::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(UserListPage {
            users: users.into_iter().map(UserResponse::from).collect(),
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, new_role = %request.role))]
    pub async fn update_role(
        &self,
        user_id: Uuid,
        request: UpdateRoleRequest,
        actor: &Actor,
    ) -> Result<UserResponse, ServiceError> {
        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        let mut active: user::ActiveModel = user.into();
        active.role = Set(request.role);
        active.updated_at = Set(Utc::now());
        let model = active.update(&*self.db).await?;

        self.audit
            .record(
                AuditAction::UserRoleUpdated,
                "user",
                user_id,
                json!({ "role": model.role }),
                Some(actor),
            )
            .await;
        self.event_sender
            .send_or_log(Event::UserRoleChanged {
                user_id,
                new_role: model.role.to_string(),
            })
            .await;

        Ok(model.into())
    }
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::InternalError(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(verify_password("hunter2hunter2", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn garbage_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
