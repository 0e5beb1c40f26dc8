use std::sync::Arc;

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        order::OrderStatus,
        payment::{self, PaymentStatus},
        Order, Payment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        audit::{Actor, AuditAction, AuditLogService},
        orders::{apply_status_change, OrderStatusChange},
    },
    storage::{proof_object_name, BlobStorage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VerificationDecision {
    Verify,
    Reject,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VerifyPaymentRequest {
    pub decision: VerificationDecision,
    /// Free text stored when the decision is `reject`
    pub rejection_reason: Option<String>,
    /// Pickup date scheduled when the decision is `verify`
    pub pickup_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaymentDecisionResponse {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub order_version: i32,
}

/// Raw uploaded file, as received from the multipart handler.
#[derive(Debug, Clone)]
pub struct ProofUpload {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProofUploadResponse {
    pub order_id: Uuid,
    pub proof_image_url: String,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub order_version: i32,
}

/// Couples payment decisions and proof uploads to the owning order's status.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    audit: Arc<AuditLogService>,
    storage: Arc<dyn BlobStorage>,
    proof_bucket: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        audit: Arc<AuditLogService>,
        storage: Arc<dyn BlobStorage>,
        proof_bucket: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            audit,
            storage,
            proof_bucket,
        }
    }

    /// Record an admin's verify/reject decision and move the order
    /// accordingly, in one transaction.
    ///
    /// Verifying an already-verified payment is an error, not a no-op. The
    /// order row participates in the shared version counter here too, so a
    /// decision racing an admin status edit loses cleanly instead of
    /// overwriting it.
    #[instrument(skip(self, request), fields(order_id = %order_id, decision = ?request.decision))]
    pub async fn verify_payment(
        &self,
        order_id: Uuid,
        request: VerifyPaymentRequest,
        actor: &Actor,
    ) -> Result<PaymentDecisionResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let payment = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment for order {} not found", order_id))
            })?;

        let now = Utc::now();

        let (payment_status, change) = match request.decision {
            VerificationDecision::Verify => {
                if payment.status == PaymentStatus::Verified {
                    return Err(ServiceError::AlreadyVerified(order_id));
                }
                let mut active: payment::ActiveModel = payment.into();
                active.status = Set(PaymentStatus::Verified);
                active.verified_by = Set(Some(actor.id));
                active.verified_at = Set(Some(now));
                active.rejection_reason = Set(None);
                active.updated_at = Set(now);
                active.update(&txn).await?;

                let mut change = OrderStatusChange::to(OrderStatus::ReadyForPickup);
                change.pickup_date = request.pickup_date;
                (PaymentStatus::Verified, change)
            }
            VerificationDecision::Reject => {
                let mut active: payment::ActiveModel = payment.into();
                active.status = Set(PaymentStatus::Rejected);
                active.rejection_reason = Set(request.rejection_reason.clone());
                active.verified_by = Set(Some(actor.id));
                active.verified_at = Set(Some(now));
                active.updated_at = Set(now);
                active.update(&txn).await?;

                // Rejection re-opens the order so the customer can re-upload.
                (
                    PaymentStatus::Rejected,
                    OrderStatusChange::to(OrderStatus::AwaitingPayment),
                )
            }
        };

        let updated_order = apply_status_change(&txn, &order, change).await?;
        txn.commit().await?;

        info!(
            %order_id,
            payment_status = %payment_status,
            order_status = %updated_order.status,
            "payment decision recorded"
        );

        let (action, event) = match request.decision {
            VerificationDecision::Verify => {
                (AuditAction::PaymentVerified, Event::PaymentVerified(order_id))
            }
            VerificationDecision::Reject => {
                (AuditAction::PaymentRejected, Event::PaymentRejected(order_id))
            }
        };

        self.audit
            .record(
                action,
                "payment",
                order_id,
                json!({
                    "decision": request.decision,
                    "rejection_reason": request.rejection_reason,
                    "pickup_date": request.pickup_date,
                }),
                Some(actor),
            )
            .await;
        self.event_sender.send_or_log(event).await;

        Ok(PaymentDecisionResponse {
            order_id,
            payment_status,
            order_status: updated_order.status,
            order_version: updated_order.version,
        })
    }

    /// Store a proof-of-payment image and flip the order into the admin
    /// review queue.
    ///
    /// The blob write happens first and is not transactional with the
    /// database writes: a storage failure leaves the database untouched,
    /// while a database failure after a successful store leaves an orphaned
    /// object behind. The object name is timestamp-qualified so re-uploads
    /// never collide.
    #[instrument(skip(self, upload), fields(order_id = %order_id, size = upload.bytes.len()))]
    pub async fn upload_proof(
        &self,
        order_id: Uuid,
        requester: Uuid,
        upload: ProofUpload,
    ) -> Result<ProofUploadResponse, ServiceError> {
        if upload.bytes.is_empty() {
            return Err(ServiceError::ValidationError(
                "payment proof file is required".to_string(),
            ));
        }

        // Resolve the order before touching storage so a bogus id cannot
        // strand an object in the bucket.
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if let Some(owner) = order.user_id {
            if owner != requester {
                return Err(ServiceError::Forbidden(
                    "order belongs to another account".to_string(),
                ));
            }
        }

        let payment = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment for order {} not found", order_id))
            })?;

        let now = Utc::now();
        let object_name = proof_object_name(order_id, now, &upload.content_type);
        let proof_url = self
            .storage
            .put_object(
                &self.proof_bucket,
                &object_name,
                upload.bytes,
                &upload.content_type,
            )
            .await?;

        let txn = self.db.begin().await?;

        let mut active: payment::ActiveModel = payment.into();
        active.proof_image_url = Set(proof_url.clone());
        active.status = Set(PaymentStatus::Pending);
        active.verified_by = Set(None);
        active.verified_at = Set(None);
        active.rejection_reason = Set(None);
        active.updated_at = Set(now);
        active.update(&txn).await?;

        // Re-read inside the transaction; the pre-storage read was only an
        // existence check.
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let updated_order =
            apply_status_change(&txn, &order, OrderStatusChange::to(OrderStatus::Pending)).await?;

        txn.commit().await?;

        info!(%order_id, proof_url = %proof_url, "payment proof uploaded");

        self.audit
            .record(
                AuditAction::PaymentProofUploaded,
                "payment",
                order_id,
                json!({ "proof_image_url": proof_url }),
                None,
            )
            .await;
        self.event_sender
            .send_or_log(Event::PaymentProofUploaded(order_id))
            .await;

        Ok(ProofUploadResponse {
            order_id,
            proof_image_url: proof_url,
            payment_status: PaymentStatus::Pending,
            order_status: updated_order.status,
            order_version: updated_order.version,
        })
    }
}
