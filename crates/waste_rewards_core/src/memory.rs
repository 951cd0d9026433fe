//! crates/waste_rewards_core/src/memory.rs
//!
//! An in-process `DatabaseService`. Every operation holds a single lock for its
//! whole duration, which gives compound writes the same all-or-nothing and
//! serialized behaviour the Postgres adapter gets from transactions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{
    CollectedWaste, LedgerEntry, NewLedgerEntry, NewNotification, NewRewardOffer, NewTask,
    Notification, RewardOffer, Task, TaskStatus, User,
};
use crate::ledger;
use crate::ports::{DatabaseService, PortError, PortResult, Redemption, VerificationSettlement};

#[derive(Default)]
struct MemoryState {
    next_id: i32,
    users: BTreeMap<i32, User>,
    tasks: BTreeMap<i32, Task>,
    ledger: Vec<LedgerEntry>,
    offers: BTreeMap<i32, RewardOffer>,
    notifications: BTreeMap<i32, Notification>,
    collections: Vec<CollectedWaste>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn require_user(&self, user_id: i32) -> PortResult<&User> {
        self.users
            .get(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    fn require_task(&self, task_id: i32) -> PortResult<&Task> {
        self.tasks
            .get(&task_id)
            .ok_or_else(|| PortError::NotFound(format!("Task {} not found", task_id)))
    }

    fn push_entry(&mut self, entry: NewLedgerEntry) -> PortResult<LedgerEntry> {
        self.require_user(entry.user_id())?;
        let stored = LedgerEntry {
            id: self.allocate_id(),
            user_id: entry.user_id(),
            kind: entry.kind(),
            amount: entry.amount(),
            description: entry.description().to_string(),
            created_at: Utc::now(),
        };
        self.ledger.push(stored.clone());
        Ok(stored)
    }

    fn push_notification(&mut self, notification: NewNotification) -> PortResult<Notification> {
        self.require_user(notification.user_id)?;
        let stored = Notification {
            id: self.allocate_id(),
            user_id: notification.user_id,
            message: notification.message,
            category: notification.category,
            is_read: false,
            created_at: Utc::now(),
        };
        self.notifications.insert(stored.id, stored.clone());
        Ok(stored)
    }

    /// Newest first; ids break timestamp ties.
    fn entries_for(&self, user_id: i32, limit: Option<usize>) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }
}

/// A `DatabaseService` backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ledger entry for `user_id`, oldest first. Test helper.
    pub async fn ledger_for(&self, user_id: i32) -> Vec<LedgerEntry> {
        let state = self.state.lock().await;
        state
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Every notification for `user_id`, read or not. Test helper.
    pub async fn notifications_for(&self, user_id: i32) -> Vec<Notification> {
        let state = self.state.lock().await;
        state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DatabaseService for MemoryStore {
    async fn create_user(&self, email: &str, name: &str) -> PortResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == email) {
            return Err(PortError::Conflict(format!("Email {} is already registered", email)));
        }
        let user = User {
            id: state.allocate_id(),
            email: email.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: i32) -> PortResult<User> {
        let state = self.state.lock().await;
        state.require_user(user_id).cloned()
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User with email {} not found", email)))
    }

    async fn rename_user(&self, user_id: i32, name: &str) -> PortResult<User> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        user.name = name.to_string();
        Ok(user.clone())
    }

    async fn create_task(
        &self,
        task: NewTask,
        reward: NewLedgerEntry,
        notification: NewNotification,
    ) -> PortResult<Task> {
        let mut state = self.state.lock().await;
        // Validate every referenced user before the first write.
        state.require_user(task.reporter_id)?;
        state.require_user(reward.user_id())?;
        state.require_user(notification.user_id)?;

        let stored = Task {
            id: state.allocate_id(),
            reporter_id: task.reporter_id,
            location: task.location,
            waste_type: task.waste_type,
            amount: task.amount,
            photo_ref: task.photo_ref,
            verification: None,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            collector_id: None,
        };
        state.tasks.insert(stored.id, stored.clone());
        state.push_entry(reward)?;
        state.push_notification(notification)?;
        debug!(task_id = stored.id, "Stored task in memory");
        Ok(stored)
    }

    async fn get_task(&self, task_id: i32) -> PortResult<Task> {
        let state = self.state.lock().await;
        state.require_task(task_id).cloned()
    }

    async fn list_tasks(&self, limit: usize) -> PortResult<Vec<Task>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn list_recent_tasks(&self, limit: usize) -> PortResult<Vec<Task>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn claim_task(&self, task_id: i32, collector_id: i32) -> PortResult<Task> {
        let mut state = self.state.lock().await;
        state.require_user(collector_id)?;
        state.require_task(task_id)?.ensure_claimable()?;

        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| PortError::NotFound(format!("Task {} not found", task_id)))?;
        task.status = TaskStatus::InProgress;
        task.collector_id = Some(collector_id);
        Ok(task.clone())
    }

    async fn settle_verification(&self, settlement: VerificationSettlement) -> PortResult<Task> {
        let mut state = self.state.lock().await;
        state
            .require_task(settlement.task_id)?
            .ensure_verifiable_by(settlement.collector_id)?;
        state.require_user(settlement.reward.user_id())?;
        state.require_user(settlement.notification.user_id)?;

        let collection = CollectedWaste {
            id: state.allocate_id(),
            task_id: settlement.task_id,
            collector_id: settlement.collector_id,
            collected_at: Utc::now(),
            status: TaskStatus::Verified.as_str().to_string(),
        };
        state.push_entry(settlement.reward)?;
        state.push_notification(settlement.notification)?;
        state.collections.push(collection);

        let task = state.tasks.get_mut(&settlement.task_id).ok_or_else(|| {
            PortError::NotFound(format!("Task {} not found", settlement.task_id))
        })?;
        task.status = TaskStatus::Verified;
        task.verification = Some(settlement.judgment);
        Ok(task.clone())
    }

    async fn list_collections(&self, collector_id: i32) -> PortResult<Vec<CollectedWaste>> {
        let state = self.state.lock().await;
        Ok(state
            .collections
            .iter()
            .filter(|c| c.collector_id == collector_id)
            .cloned()
            .collect())
    }

    async fn append_ledger_entry(&self, entry: NewLedgerEntry) -> PortResult<LedgerEntry> {
        let mut state = self.state.lock().await;
        state.push_entry(entry)
    }

    async fn list_ledger_entries(
        &self,
        user_id: i32,
        limit: Option<usize>,
    ) -> PortResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state.entries_for(user_id, limit))
    }

    async fn create_reward_offer(&self, offer: NewRewardOffer) -> PortResult<RewardOffer> {
        let mut state = self.state.lock().await;
        let stored = RewardOffer {
            id: state.allocate_id(),
            name: offer.name,
            cost: i64::from(offer.cost),
            description: offer.description,
            collection_info: offer.collection_info,
            is_available: true,
        };
        state.offers.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_available_offers(&self) -> PortResult<Vec<RewardOffer>> {
        let state = self.state.lock().await;
        Ok(state
            .offers
            .values()
            .filter(|o| o.is_available)
            .cloned()
            .collect())
    }

    async fn redeem_offer(&self, redemption: Redemption) -> PortResult<LedgerEntry> {
        let mut state = self.state.lock().await;
        state.require_user(redemption.user_id)?;
        let offer = state
            .offers
            .get(&redemption.offer_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Reward {} not found", redemption.offer_id)))?;

        let entries = state.entries_for(redemption.user_id, redemption.window.limit());
        ledger::ensure_redeemable(&offer, ledger::balance_of(&entries))?;

        let (entry, notification) = ledger::redemption_records(redemption.user_id, &offer)?;
        let stored = state.push_entry(entry)?;
        state.push_notification(notification)?;
        Ok(stored)
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> PortResult<Notification> {
        let mut state = self.state.lock().await;
        state.push_notification(notification)
    }

    async fn mark_notification_read(&self, user_id: i32, notification_id: i32) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let notification = state
            .notifications
            .get_mut(&notification_id)
            .filter(|n| n.user_id == user_id)
            .ok_or_else(|| {
                PortError::NotFound(format!("Notification {} not found", notification_id))
            })?;
        notification.is_read = true;
        Ok(())
    }

    async fn list_unread_notifications(&self, user_id: i32) -> PortResult<Vec<Notification>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .cloned()
            .collect())
    }
}
