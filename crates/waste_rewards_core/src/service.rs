//! crates/waste_rewards_core/src/service.rs
//!
//! `RewardsService` is the entry point the web layer calls. It validates input,
//! applies the ledger and gate policies, and hands compound writes to the store
//! as single units. Every store and oracle call is bounded by a timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{
    CollectedWaste, LedgerEntry, NewNotification, NewRewardOffer, NewTask, Notification,
    RewardOffer, Task, User, VerificationJudgment,
};
use crate::ledger::{self, BalanceWindow};
use crate::ports::{DatabaseService, PortError, PortResult, Redemption, VerificationOracle};
use crate::verification::{self, GateDecision, VerificationOutcome};

/// Tunables for `RewardsService`.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub balance_window: BalanceWindow,
    pub store_timeout: Duration,
    pub oracle_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            balance_window: BalanceWindow::default(),
            store_timeout: Duration::from_secs(5),
            oracle_timeout: Duration::from_secs(30),
        }
    }
}

pub struct RewardsService {
    store: Arc<dyn DatabaseService>,
    oracle: Arc<dyn VerificationOracle>,
    settings: ServiceSettings,
}

impl RewardsService {
    pub fn new(
        store: Arc<dyn DatabaseService>,
        oracle: Arc<dyn VerificationOracle>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Runs a store call, turning an elapsed timeout into `StoreUnavailable`.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> PortResult<T>
    where
        F: Future<Output = PortResult<T>>,
    {
        match tokio::time::timeout(self.settings.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = op, "Store call timed out");
                Err(PortError::StoreUnavailable(format!(
                    "{} timed out after {:?}",
                    op, self.settings.store_timeout
                )))
            }
        }
    }

    // --- Users ---

    pub async fn create_user(&self, email: &str, name: &str) -> PortResult<User> {
        let email = email.trim();
        let name = name.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(PortError::Validation(format!("'{}' is not an email address", email)));
        }
        if name.is_empty() {
            return Err(PortError::Validation("name must not be empty".to_string()));
        }
        let user = self
            .bounded("create_user", self.store.create_user(email, name))
            .await?;
        info!(user_id = user.id, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i32) -> PortResult<User> {
        self.bounded("get_user", self.store.get_user(user_id)).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        self.bounded("get_user_by_email", self.store.get_user_by_email(email.trim()))
            .await
    }

    pub async fn rename_user(&self, user_id: i32, name: &str) -> PortResult<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PortError::Validation("name must not be empty".to_string()));
        }
        self.bounded("rename_user", self.store.rename_user(user_id, name))
            .await
    }

    // --- Tasks ---

    /// Records a new task and credits the reporter, all in one store write.
    pub async fn create_task(&self, task: NewTask) -> PortResult<Task> {
        for (field, value) in [
            ("location", &task.location),
            ("waste_type", &task.waste_type),
            ("amount", &task.amount),
        ] {
            if value.trim().is_empty() {
                return Err(PortError::Validation(format!("{} must not be empty", field)));
            }
        }
        let (reward, notification) = ledger::report_reward_records(task.reporter_id)?;
        let task = self
            .bounded(
                "create_task",
                self.store.create_task(task, reward, notification),
            )
            .await?;
        info!(task_id = task.id, reporter_id = task.reporter_id, "Task reported");
        Ok(task)
    }

    pub async fn get_task(&self, task_id: i32) -> PortResult<Task> {
        self.bounded("get_task", self.store.get_task(task_id)).await
    }

    pub async fn list_tasks(&self, limit: usize) -> PortResult<Vec<Task>> {
        self.bounded("list_tasks", self.store.list_tasks(limit)).await
    }

    pub async fn list_recent_tasks(&self, limit: usize) -> PortResult<Vec<Task>> {
        self.bounded("list_recent_tasks", self.store.list_recent_tasks(limit))
            .await
    }

    pub async fn claim_task(&self, task_id: i32, collector_id: i32) -> PortResult<Task> {
        let task = self
            .bounded("claim_task", self.store.claim_task(task_id, collector_id))
            .await?;
        info!(task_id, collector_id, "Task claimed");
        Ok(task)
    }

    /// Asks the oracle about `photo` and settles the task with its judgment.
    ///
    /// Ownership and status are checked before the oracle is consulted, and
    /// again by the store when an accepted judgment is written.
    pub async fn submit_verification(
        &self,
        task_id: i32,
        collector_id: i32,
        photo: &[u8],
        mime_type: &str,
    ) -> PortResult<VerificationOutcome> {
        let task = self.get_task(task_id).await?;
        task.ensure_verifiable_by(collector_id)?;

        let judged = tokio::time::timeout(
            self.settings.oracle_timeout,
            self.oracle
                .judge(photo, mime_type, &task.waste_type, &task.amount),
        )
        .await;
        let judgment = match judged {
            Ok(Ok(judgment)) => judgment,
            Ok(Err(e)) => {
                warn!(task_id, error = %e, "Verification oracle failed");
                return Err(match e {
                    PortError::OracleParse(_) => e,
                    other => PortError::OracleParse(other.to_string()),
                });
            }
            Err(_) => {
                warn!(task_id, "Verification oracle timed out");
                return Err(PortError::OracleParse(format!(
                    "oracle gave no answer within {:?}",
                    self.settings.oracle_timeout
                )));
            }
        };

        self.settle_verification(task_id, collector_id, judgment)
            .await
    }

    /// Applies an already obtained judgment to the task.
    pub async fn settle_verification(
        &self,
        task_id: i32,
        collector_id: i32,
        judgment: VerificationJudgment,
    ) -> PortResult<VerificationOutcome> {
        let judgment = VerificationJudgment::new(
            judgment.waste_type_match,
            judgment.quantity_match,
            judgment.confidence,
        )?;
        let task = self.get_task(task_id).await?;
        task.ensure_verifiable_by(collector_id)?;

        if verification::decide(&judgment) == GateDecision::Reject {
            warn!(
                task_id,
                collector_id,
                confidence = judgment.confidence,
                "Verification rejected"
            );
            return Ok(VerificationOutcome {
                accepted: false,
                reward: None,
                judgment,
            });
        }

        let reward = verification::mint_reward(&mut rand::thread_rng());
        let settlement = verification::settlement(task_id, collector_id, judgment, reward)?;
        self.bounded(
            "settle_verification",
            self.store.settle_verification(settlement),
        )
        .await?;
        info!(task_id, collector_id, reward, "Collection verified");

        Ok(VerificationOutcome {
            accepted: true,
            reward: Some(reward),
            judgment,
        })
    }

    pub async fn list_collections(&self, collector_id: i32) -> PortResult<Vec<CollectedWaste>> {
        self.bounded("list_collections", self.store.list_collections(collector_id))
            .await
    }

    // --- Ledger ---

    pub async fn list_transactions(&self, user_id: i32, limit: usize) -> PortResult<Vec<LedgerEntry>> {
        self.bounded(
            "list_transactions",
            self.store.list_ledger_entries(user_id, Some(limit)),
        )
        .await
    }

    /// Spendable points, derived from the configured window of the ledger.
    pub async fn get_balance(&self, user_id: i32) -> PortResult<i64> {
        let entries = self
            .bounded(
                "get_balance",
                self.store
                    .list_ledger_entries(user_id, self.settings.balance_window.limit()),
            )
            .await?;
        Ok(ledger::balance_of(&entries))
    }

    // --- Reward Catalog ---

    /// Available offers, preceded by the caller's points summary.
    pub async fn list_available_rewards(&self, user_id: i32) -> PortResult<Vec<RewardOffer>> {
        let balance = self.get_balance(user_id).await?;
        let offers = self
            .bounded("list_available_rewards", self.store.list_available_offers())
            .await?;

        let mut rewards = Vec::with_capacity(offers.len() + 1);
        rewards.push(RewardOffer::points_summary(balance));
        rewards.extend(offers.into_iter().filter(|offer| offer.is_available));
        Ok(rewards)
    }

    pub async fn create_reward_offer(&self, offer: NewRewardOffer) -> PortResult<RewardOffer> {
        if offer.name.trim().is_empty() {
            return Err(PortError::Validation("name must not be empty".to_string()));
        }
        if offer.cost <= 0 {
            return Err(PortError::InvalidAmount(offer.cost));
        }
        let offer = self
            .bounded("create_reward_offer", self.store.create_reward_offer(offer))
            .await?;
        info!(reward_id = offer.id, cost = offer.cost, "Reward offer created");
        Ok(offer)
    }

    pub async fn redeem_reward(&self, user_id: i32, offer_id: i32) -> PortResult<LedgerEntry> {
        if offer_id == RewardOffer::POINTS_SUMMARY_ID {
            return Err(PortError::NotFound(format!("Reward {} not found", offer_id)));
        }
        let entry = self
            .bounded(
                "redeem_reward",
                self.store.redeem_offer(Redemption {
                    user_id,
                    offer_id,
                    window: self.settings.balance_window,
                }),
            )
            .await?;
        info!(user_id, reward_id = offer_id, cost = entry.amount, "Reward redeemed");
        Ok(entry)
    }

    // --- Notifications ---

    pub async fn list_unread_notifications(&self, user_id: i32) -> PortResult<Vec<Notification>> {
        self.bounded(
            "list_unread_notifications",
            self.store.list_unread_notifications(user_id),
        )
        .await
    }

    /// Sends `user_id` a notification outside the reward flows.
    pub async fn create_notification(
        &self,
        user_id: i32,
        message: &str,
        category: &str,
    ) -> PortResult<Notification> {
        let message = message.trim();
        let category = category.trim();
        if message.is_empty() {
            return Err(PortError::Validation("message must not be empty".to_string()));
        }
        if category.is_empty() {
            return Err(PortError::Validation("category must not be empty".to_string()));
        }
        let notification = self
            .bounded(
                "create_notification",
                self.store.create_notification(NewNotification {
                    user_id,
                    message: message.to_string(),
                    category: category.to_string(),
                }),
            )
            .await?;
        info!(user_id, notification_id = notification.id, "Notification created");
        Ok(notification)
    }

    /// Idempotent. Only the owner may mark a notification read.
    pub async fn mark_notification_read(
        &self,
        user_id: i32,
        notification_id: i32,
    ) -> PortResult<()> {
        self.bounded(
            "mark_notification_read",
            self.store.mark_notification_read(user_id, notification_id),
        )
        .await
    }
}
