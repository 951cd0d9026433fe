//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between clients and the API server, and
//! their conversions from the core domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use waste_rewards_core::{
    CollectedWaste, LedgerEntry, Notification, RewardOffer, Task, User, VerificationJudgment,
    VerificationOutcome,
};

/// Upper bound for any `limit` query parameter.
pub const MAX_PAGE_SIZE: usize = 100;

//=========================================================================================
// Requests
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RenameUserRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub location: String,
    pub waste_type: String,
    pub amount: String,
    pub photo_ref: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateRewardRequest {
    pub name: String,
    pub cost: i32,
    pub description: Option<String>,
    #[serde(default)]
    pub collection_info: String,
}

#[derive(Deserialize, IntoParams)]
pub struct LimitQuery {
    /// Maximum number of items to return.
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).min(MAX_PAGE_SIZE)
    }
}

//=========================================================================================
// Responses
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct JudgmentResponse {
    pub waste_type_match: bool,
    pub quantity_match: bool,
    pub confidence: f64,
}

impl From<VerificationJudgment> for JudgmentResponse {
    fn from(judgment: VerificationJudgment) -> Self {
        Self {
            waste_type_match: judgment.waste_type_match,
            quantity_match: judgment.quantity_match,
            confidence: judgment.confidence,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: i32,
    pub reporter_id: i32,
    pub location: String,
    pub waste_type: String,
    pub amount: String,
    pub photo_ref: Option<String>,
    pub verification: Option<JudgmentResponse>,
    /// One of `pending`, `in_progress`, `completed`, `verified`.
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub collector_id: Option<i32>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            reporter_id: task.reporter_id,
            location: task.location,
            waste_type: task.waste_type,
            amount: task.amount,
            photo_ref: task.photo_ref,
            verification: task.verification.map(Into::into),
            status: task.status.as_str().to_string(),
            created_at: task.created_at,
            collector_id: task.collector_id,
        }
    }
}

/// Sent after a verification ran. `accepted: false` means the photo was judged
/// and rejected; a verification that could not run is an error response instead.
#[derive(Serialize, ToSchema)]
pub struct VerificationResponse {
    pub accepted: bool,
    pub reward: Option<i32>,
    pub judgment: JudgmentResponse,
}

impl From<VerificationOutcome> for VerificationResponse {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            accepted: outcome.accepted,
            reward: outcome.reward,
            judgment: outcome.judgment.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CollectionResponse {
    pub id: i32,
    pub task_id: i32,
    pub collector_id: i32,
    pub collected_at: DateTime<Utc>,
    pub status: String,
}

impl From<CollectedWaste> for CollectionResponse {
    fn from(collection: CollectedWaste) -> Self {
        Self {
            id: collection.id,
            task_id: collection.task_id,
            collector_id: collection.collector_id,
            collected_at: collection.collected_at,
            status: collection.status,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BalanceResponse {
    pub user_id: i32,
    pub balance: i64,
}

#[derive(Serialize, ToSchema)]
pub struct LedgerEntryResponse {
    pub id: i32,
    /// One of `earned_report`, `earned_collect`, `redeemed`.
    pub kind: String,
    pub amount: i32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind.as_str().to_string(),
            amount: entry.amount,
            description: entry.description,
            created_at: entry.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RewardResponse {
    /// `0` marks the caller's points summary, which cannot be redeemed.
    pub id: i32,
    pub name: String,
    pub cost: i64,
    pub description: Option<String>,
    pub collection_info: String,
}

impl From<RewardOffer> for RewardResponse {
    fn from(offer: RewardOffer) -> Self {
        Self {
            id: offer.id,
            name: offer.name,
            cost: offer.cost,
            description: offer.description,
            collection_info: offer.collection_info,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: i32,
    pub message: String,
    #[serde(rename = "type")]
    pub category: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            message: notification.message,
            category: notification.category,
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_rewards_core::TaskStatus;

    #[test]
    fn limits_default_and_cap() {
        assert_eq!(LimitQuery { limit: None }.resolve(10), 10);
        assert_eq!(LimitQuery { limit: Some(3) }.resolve(10), 3);
        assert_eq!(LimitQuery { limit: Some(5_000) }.resolve(10), MAX_PAGE_SIZE);
    }

    #[test]
    fn task_status_is_serialized_in_storage_form() {
        let task = Task {
            id: 1,
            reporter_id: 2,
            location: "Dock 4".to_string(),
            waste_type: "glass".to_string(),
            amount: "2 bags".to_string(),
            photo_ref: None,
            verification: None,
            status: TaskStatus::InProgress,
            created_at: Utc::now(),
            collector_id: Some(3),
        };
        let json = serde_json::to_value(TaskResponse::from(task)).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["collector_id"], 3);
    }

    #[test]
    fn notification_category_is_exposed_as_type() {
        let json = serde_json::to_value(NotificationResponse::from(Notification {
            id: 1,
            user_id: 2,
            message: "hi".to_string(),
            category: "Reward".to_string(),
            is_read: false,
            created_at: Utc::now(),
        }))
        .unwrap();
        assert_eq!(json["type"], "Reward");
    }
}
