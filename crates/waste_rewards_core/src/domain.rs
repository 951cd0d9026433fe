//! crates/waste_rewards_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::ports::{PortError, PortResult};

/// Category tag used for every reward-related notification.
pub const REWARD_NOTIFICATION: &str = "Reward";

/// A registered user. Only the display name may change after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Tasks
//=========================================================================================

/// Lifecycle of a collection task. Variants are declared in their forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Verified,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Verified => "verified",
        }
    }

    /// Whether a collector is attached in this state.
    pub fn requires_collector(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    /// Transitions only ever move forward.
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        next > *self
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "verified" => Ok(TaskStatus::Verified),
            other => Err(PortError::Unexpected(format!("unknown task status '{}'", other))),
        }
    }
}

/// The structured answer of the verification oracle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationJudgment {
    pub waste_type_match: bool,
    pub quantity_match: bool,
    pub confidence: f64,
}

impl VerificationJudgment {
    /// Builds a judgment, rejecting confidences outside `[0, 1]`.
    pub fn new(waste_type_match: bool, quantity_match: bool, confidence: f64) -> PortResult<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(PortError::OracleParse(format!(
                "confidence {} is outside [0, 1]",
                confidence
            )));
        }
        Ok(Self {
            waste_type_match,
            quantity_match,
            confidence,
        })
    }
}

/// One reported waste occurrence ("report") that needs collecting.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i32,
    pub reporter_id: i32,
    pub location: String,
    pub waste_type: String,
    pub amount: String,
    pub photo_ref: Option<String>,
    pub verification: Option<VerificationJudgment>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub collector_id: Option<i32>,
}

impl Task {
    /// A task can only be claimed while nobody holds it.
    pub fn ensure_claimable(&self) -> PortResult<()> {
        if !self.status.can_advance_to(TaskStatus::InProgress) {
            return Err(PortError::InvalidTransition {
                task_id: self.id,
                from: self.status,
                to: TaskStatus::InProgress,
            });
        }
        Ok(())
    }

    /// Checks that `collector_id` may move this task to `verified`.
    ///
    /// A task nobody has claimed yet is a state problem rather than an identity
    /// problem, so `pending` reports `InvalidTransition` before the collector is
    /// compared.
    pub fn ensure_verifiable_by(&self, collector_id: i32) -> PortResult<()> {
        let invalid = || PortError::InvalidTransition {
            task_id: self.id,
            from: self.status,
            to: TaskStatus::Verified,
        };
        if !self.status.requires_collector() {
            return Err(invalid());
        }
        if self.collector_id != Some(collector_id) {
            return Err(PortError::Forbidden {
                task_id: self.id,
                collector_id,
            });
        }
        // Verification is the in_progress -> verified edge only.
        if self.status != TaskStatus::InProgress {
            return Err(invalid());
        }
        Ok(())
    }
}

/// Input for reporting a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub reporter_id: i32,
    pub location: String,
    pub waste_type: String,
    pub amount: String,
    pub photo_ref: Option<String>,
}

/// Row written once per accepted verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedWaste {
    pub id: i32,
    pub task_id: i32,
    pub collector_id: i32,
    pub collected_at: DateTime<Utc>,
    pub status: String,
}

//=========================================================================================
// Ledger
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerKind {
    EarnedReport,
    EarnedCollect,
    Redeemed,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::EarnedReport => "earned_report",
            LedgerKind::EarnedCollect => "earned_collect",
            LedgerKind::Redeemed => "redeemed",
        }
    }

    /// Every kind whose name starts with "earn" adds to the balance.
    pub fn is_earning(&self) -> bool {
        self.as_str().starts_with("earn")
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerKind {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned_report" => Ok(LedgerKind::EarnedReport),
            "earned_collect" => Ok(LedgerKind::EarnedCollect),
            "redeemed" => Ok(LedgerKind::Redeemed),
            other => Err(PortError::Unexpected(format!("unknown ledger kind '{}'", other))),
        }
    }
}

/// An immutable point event. `amount` is always positive; the kind gives the sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: i32,
    pub user_id: i32,
    pub kind: LedgerKind,
    pub amount: i32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// The entry's effect on a balance.
    pub fn signed_amount(&self) -> i64 {
        if self.kind.is_earning() {
            i64::from(self.amount)
        } else {
            -i64::from(self.amount)
        }
    }
}

/// A validated, not yet persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    user_id: i32,
    kind: LedgerKind,
    amount: i32,
    description: String,
}

impl NewLedgerEntry {
    pub fn new(
        user_id: i32,
        kind: LedgerKind,
        amount: i32,
        description: impl Into<String>,
    ) -> PortResult<Self> {
        if amount <= 0 {
            return Err(PortError::InvalidAmount(amount));
        }
        Ok(Self {
            user_id,
            kind,
            amount,
            description: description.into(),
        })
    }

    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    pub fn kind(&self) -> LedgerKind {
        self.kind
    }

    pub fn amount(&self) -> i32 {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

//=========================================================================================
// Catalog
//=========================================================================================

/// A redeemable catalog item. Never owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardOffer {
    pub id: i32,
    pub name: String,
    pub cost: i64,
    pub description: Option<String>,
    pub collection_info: String,
    pub is_available: bool,
}

impl RewardOffer {
    /// Id reserved for the synthetic "your points" entry; no stored offer uses it.
    pub const POINTS_SUMMARY_ID: i32 = 0;

    /// The display-only entry that carries the caller's balance in `cost`.
    pub fn points_summary(balance: i64) -> Self {
        Self {
            id: Self::POINTS_SUMMARY_ID,
            name: "Your points".to_string(),
            cost: balance,
            description: Some("Redeem your earned points".to_string()),
            collection_info: "Points earned from reporting and collecting waste".to_string(),
            is_available: true,
        }
    }

    pub fn is_points_summary(&self) -> bool {
        self.id == Self::POINTS_SUMMARY_ID
    }
}

#[derive(Debug, Clone)]
pub struct NewRewardOffer {
    pub name: String,
    pub cost: i32,
    pub description: Option<String>,
    pub collection_info: String,
}

//=========================================================================================
// Notifications
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub message: String,
    pub category: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: i32,
    pub message: String,
    pub category: String,
}

impl NewNotification {
    pub fn reward(user_id: i32, message: impl Into<String>) -> Self {
        Self {
            user_id,
            message: message.into(),
            category: REWARD_NOTIFICATION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: TaskStatus, collector_id: Option<i32>) -> Task {
        Task {
            id: 7,
            reporter_id: 1,
            location: "Riverside park".to_string(),
            waste_type: "plastic".to_string(),
            amount: "5kg".to_string(),
            photo_ref: None,
            verification: None,
            status,
            created_at: Utc::now(),
            collector_id,
        }
    }

    #[test]
    fn statuses_only_advance() {
        assert!(TaskStatus::Pending.can_advance_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_advance_to(TaskStatus::Verified));
        assert!(!TaskStatus::Verified.can_advance_to(TaskStatus::Pending));
        assert!(!TaskStatus::InProgress.can_advance_to(TaskStatus::InProgress));
    }

    #[test]
    fn status_names_round_trip_through_storage_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Verified,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("rejected".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn only_pending_tasks_are_claimable() {
        assert!(task(TaskStatus::Pending, None).ensure_claimable().is_ok());
        let err = task(TaskStatus::InProgress, Some(3))
            .ensure_claimable()
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidTransition { .. }));
    }

    #[test]
    fn verification_requires_the_assigned_collector() {
        let claimed = task(TaskStatus::InProgress, Some(3));
        assert!(claimed.ensure_verifiable_by(3).is_ok());
        assert!(matches!(
            claimed.ensure_verifiable_by(4),
            Err(PortError::Forbidden { collector_id: 4, .. })
        ));
    }

    #[test]
    fn verification_of_unclaimed_or_finished_task_is_a_transition_error() {
        assert!(matches!(
            task(TaskStatus::Pending, None).ensure_verifiable_by(3),
            Err(PortError::InvalidTransition { .. })
        ));
        assert!(matches!(
            task(TaskStatus::Verified, Some(3)).ensure_verifiable_by(3),
            Err(PortError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn completed_tasks_cannot_be_claimed_or_verified() {
        let completed = task(TaskStatus::Completed, Some(3));
        assert!(matches!(
            completed.ensure_claimable(),
            Err(PortError::InvalidTransition { to: TaskStatus::InProgress, .. })
        ));
        assert!(matches!(
            completed.ensure_verifiable_by(3),
            Err(PortError::InvalidTransition { from: TaskStatus::Completed, .. })
        ));
    }

    #[test]
    fn only_claimed_statuses_carry_a_collector() {
        assert!(!TaskStatus::Pending.requires_collector());
        assert!(TaskStatus::InProgress.requires_collector());
        assert!(TaskStatus::Verified.requires_collector());
    }

    #[test]
    fn ledger_amounts_must_be_positive() {
        assert!(matches!(
            NewLedgerEntry::new(1, LedgerKind::Redeemed, 0, "nothing"),
            Err(PortError::InvalidAmount(0))
        ));
        assert!(NewLedgerEntry::new(1, LedgerKind::EarnedReport, -5, "negative").is_err());
        assert!(NewLedgerEntry::new(1, LedgerKind::EarnedReport, 10, "ok").is_ok());
    }

    #[test]
    fn judgment_confidence_is_bounded() {
        assert!(VerificationJudgment::new(true, true, 1.0).is_ok());
        assert!(matches!(
            VerificationJudgment::new(true, true, 1.5),
            Err(PortError::OracleParse(_))
        ));
        assert!(VerificationJudgment::new(true, true, f64::NAN).is_err());
    }
}
