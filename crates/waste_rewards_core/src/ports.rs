//! crates/waste_rewards_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or the
//! verification oracle.

use async_trait::async_trait;

use crate::domain::{
    CollectedWaste, LedgerEntry, NewLedgerEntry, NewNotification, NewRewardOffer, NewTask,
    Notification, RewardOffer, Task, TaskStatus, User, VerificationJudgment,
};
use crate::ledger::BalanceWindow;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: i32,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("Collector {collector_id} is not assigned to task {task_id}")]
    Forbidden { task_id: i32, collector_id: i32 },
    #[error("Verification oracle reply could not be used: {0}")]
    OracleParse(String),
    #[error("Ledger amounts must be positive, got {0}")]
    InvalidAmount(i32),
    #[error("Balance of {balance} points does not cover a cost of {cost}")]
    InsufficientBalance { balance: i64, cost: i64 },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Compound Writes
//=========================================================================================

/// Everything an accepted verification writes. Stores apply it as one unit and
/// re-check the task under lock before writing.
#[derive(Debug, Clone)]
pub struct VerificationSettlement {
    pub task_id: i32,
    pub collector_id: i32,
    pub judgment: VerificationJudgment,
    pub reward: NewLedgerEntry,
    pub notification: NewNotification,
}

/// A request to spend points on a catalog offer.
#[derive(Debug, Clone, Copy)]
pub struct Redemption {
    pub user_id: i32,
    pub offer_id: i32,
    pub window: BalanceWindow,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, email: &str, name: &str) -> PortResult<User>;

    async fn get_user(&self, user_id: i32) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<User>;

    async fn rename_user(&self, user_id: i32, name: &str) -> PortResult<User>;

    // --- Task Registry ---
    /// Inserts the task together with the reporter's reward entry and notification.
    async fn create_task(
        &self,
        task: NewTask,
        reward: NewLedgerEntry,
        notification: NewNotification,
    ) -> PortResult<Task>;

    async fn get_task(&self, task_id: i32) -> PortResult<Task>;

    /// Oldest first.
    async fn list_tasks(&self, limit: usize) -> PortResult<Vec<Task>>;

    /// Newest first.
    async fn list_recent_tasks(&self, limit: usize) -> PortResult<Vec<Task>>;

    /// Compare-and-swap from `pending` to `in_progress`.
    async fn claim_task(&self, task_id: i32, collector_id: i32) -> PortResult<Task>;

    async fn settle_verification(&self, settlement: VerificationSettlement) -> PortResult<Task>;

    async fn list_collections(&self, collector_id: i32) -> PortResult<Vec<CollectedWaste>>;

    // --- Ledger ---
    async fn append_ledger_entry(&self, entry: NewLedgerEntry) -> PortResult<LedgerEntry>;

    /// Newest first. `None` returns the whole history.
    async fn list_ledger_entries(
        &self,
        user_id: i32,
        limit: Option<usize>,
    ) -> PortResult<Vec<LedgerEntry>>;

    // --- Reward Catalog ---
    async fn create_reward_offer(&self, offer: NewRewardOffer) -> PortResult<RewardOffer>;

    async fn list_available_offers(&self) -> PortResult<Vec<RewardOffer>>;

    /// Checks the balance and appends the `redeemed` entry and notification in one unit.
    async fn redeem_offer(&self, redemption: Redemption) -> PortResult<LedgerEntry>;

    // --- Notifications ---
    async fn create_notification(&self, notification: NewNotification)
        -> PortResult<Notification>;

    /// Marks one of `user_id`'s notifications read. Another user's notification
    /// is reported as `NotFound`.
    async fn mark_notification_read(&self, user_id: i32, notification_id: i32) -> PortResult<()>;

    async fn list_unread_notifications(&self, user_id: i32) -> PortResult<Vec<Notification>>;
}

#[async_trait]
pub trait VerificationOracle: Send + Sync {
    /// Judges whether the photo shows the declared waste type and amount.
    async fn judge(
        &self,
        photo: &[u8],
        mime_type: &str,
        expected_waste_type: &str,
        expected_amount: &str,
    ) -> PortResult<VerificationJudgment>;
}
