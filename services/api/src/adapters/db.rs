//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Compound writes (task creation, verification settlement, redemption) run in a
//! single transaction. Status changes are conditional on the current status, and
//! the settlement path locks the task row, so concurrent requests cannot both
//! succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use tracing::debug;
use waste_rewards_core::domain::{
    CollectedWaste, LedgerEntry, LedgerKind, NewLedgerEntry, NewNotification, NewRewardOffer,
    NewTask, Notification, RewardOffer, Task, TaskStatus, User, VerificationJudgment,
};
use waste_rewards_core::ledger;
use waste_rewards_core::ports::{
    DatabaseService, PortError, PortResult, Redemption, VerificationSettlement,
};

macro_rules! task_columns {
    () => {
        "id, user_id, location, waste_type, amount, image_url, verification_result, status, created_at, collector_id"
    };
}

macro_rules! ledger_columns {
    () => {
        "id, user_id, type AS kind, amount, description, date AS created_at"
    };
}

macro_rules! notification_columns {
    () => {
        "id, user_id, message, type AS category, is_read, created_at"
    };
}

macro_rules! offer_columns {
    () => {
        "id, name, points AS cost, description, collection_info, is_available"
    };
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Converts a row count into a `LIMIT` bind. Counts past `i64::MAX` saturate,
/// which is the same as no limit.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Translates driver errors into port errors.
fn map_sqlx(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::StoreUnavailable(e.to_string())
        }
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // unique_violation
            Some("23505") => PortError::Conflict(db.message().to_string()),
            // foreign_key_violation
            Some("23503") => PortError::NotFound(format!("Referenced row missing: {}", db.message())),
            _ => PortError::Unexpected(e.to_string()),
        },
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: i32,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

/// The JSON shape stored in `reports.verification_result`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JudgmentRecord {
    waste_type_match: bool,
    quantity_match: bool,
    confidence: f64,
}
impl From<&VerificationJudgment> for JudgmentRecord {
    fn from(judgment: &VerificationJudgment) -> Self {
        Self {
            waste_type_match: judgment.waste_type_match,
            quantity_match: judgment.quantity_match,
            confidence: judgment.confidence,
        }
    }
}

#[derive(FromRow)]
struct TaskRecord {
    id: i32,
    user_id: i32,
    location: String,
    waste_type: String,
    amount: String,
    image_url: Option<String>,
    verification_result: Option<Json<JudgmentRecord>>,
    status: String,
    created_at: DateTime<Utc>,
    collector_id: Option<i32>,
}
impl TaskRecord {
    fn to_domain(self) -> PortResult<Task> {
        Ok(Task {
            id: self.id,
            reporter_id: self.user_id,
            location: self.location,
            waste_type: self.waste_type,
            amount: self.amount,
            photo_ref: self.image_url,
            verification: self.verification_result.map(|Json(j)| VerificationJudgment {
                waste_type_match: j.waste_type_match,
                quantity_match: j.quantity_match,
                confidence: j.confidence,
            }),
            status: self.status.parse::<TaskStatus>()?,
            created_at: self.created_at,
            collector_id: self.collector_id,
        })
    }
}

#[derive(FromRow)]
struct LedgerRecord {
    id: i32,
    user_id: i32,
    kind: String,
    amount: i32,
    description: String,
    created_at: DateTime<Utc>,
}
impl LedgerRecord {
    fn to_domain(self) -> PortResult<LedgerEntry> {
        Ok(LedgerEntry {
            id: self.id,
            user_id: self.user_id,
            kind: self.kind.parse::<LedgerKind>()?,
            amount: self.amount,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct OfferRecord {
    id: i32,
    name: String,
    cost: i32,
    description: Option<String>,
    collection_info: String,
    is_available: bool,
}
impl OfferRecord {
    fn to_domain(self) -> RewardOffer {
        RewardOffer {
            id: self.id,
            name: self.name,
            cost: i64::from(self.cost),
            description: self.description,
            collection_info: self.collection_info,
            is_available: self.is_available,
        }
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    id: i32,
    user_id: i32,
    message: String,
    category: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}
impl NotificationRecord {
    fn to_domain(self) -> Notification {
        Notification {
            id: self.id,
            user_id: self.user_id,
            message: self.message,
            category: self.category,
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CollectionRecord {
    id: i32,
    task_id: i32,
    collector_id: i32,
    collected_at: DateTime<Utc>,
    status: String,
}
impl CollectionRecord {
    fn to_domain(self) -> CollectedWaste {
        CollectedWaste {
            id: self.id,
            task_id: self.task_id,
            collector_id: self.collector_id,
            collected_at: self.collected_at,
            status: self.status,
        }
    }
}

//=========================================================================================
// Statement Helpers (usable inside a transaction)
//=========================================================================================

async fn insert_entry(conn: &mut PgConnection, entry: &NewLedgerEntry) -> PortResult<LedgerEntry> {
    sqlx::query_as::<_, LedgerRecord>(concat!(
        "INSERT INTO transactions (user_id, type, amount, description) VALUES ($1, $2, $3, $4) RETURNING ",
        ledger_columns!()
    ))
    .bind(entry.user_id())
    .bind(entry.kind().as_str())
    .bind(entry.amount())
    .bind(entry.description())
    .fetch_one(conn)
    .await
    .map_err(map_sqlx)?
    .to_domain()
}

async fn insert_notification(
    conn: &mut PgConnection,
    notification: &NewNotification,
) -> PortResult<Notification> {
    let record = sqlx::query_as::<_, NotificationRecord>(concat!(
        "INSERT INTO notifications (user_id, message, type) VALUES ($1, $2, $3) RETURNING ",
        notification_columns!()
    ))
    .bind(notification.user_id)
    .bind(&notification.message)
    .bind(&notification.category)
    .fetch_one(conn)
    .await
    .map_err(map_sqlx)?;
    Ok(record.to_domain())
}

async fn select_entries(
    conn: &mut PgConnection,
    user_id: i32,
    limit: Option<usize>,
) -> PortResult<Vec<LedgerEntry>> {
    // LIMIT NULL is no limit.
    let records = sqlx::query_as::<_, LedgerRecord>(concat!(
        "SELECT ",
        ledger_columns!(),
        " FROM transactions WHERE user_id = $1 ORDER BY date DESC, id DESC LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit.map(sql_limit))
    .fetch_all(conn)
    .await
    .map_err(map_sqlx)?;
    records.into_iter().map(LedgerRecord::to_domain).collect()
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, email: &str, name: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (email, name) VALUES ($1, $2) RETURNING id, email, name, created_at",
        )
        .bind(email)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: i32) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, name, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, name, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| PortError::NotFound(format!("User with email {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn rename_user(&self, user_id: i32, name: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "UPDATE users SET name = $2 WHERE id = $1 RETURNING id, email, name, created_at",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn create_task(
        &self,
        task: NewTask,
        reward: NewLedgerEntry,
        notification: NewNotification,
    ) -> PortResult<Task> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let record = sqlx::query_as::<_, TaskRecord>(concat!(
            "INSERT INTO reports (user_id, location, waste_type, amount, image_url, status) \
             VALUES ($1, $2, $3, $4, $5, 'pending') RETURNING ",
            task_columns!()
        ))
        .bind(task.reporter_id)
        .bind(&task.location)
        .bind(&task.waste_type)
        .bind(&task.amount)
        .bind(&task.photo_ref)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        insert_entry(&mut tx, &reward).await?;
        insert_notification(&mut tx, &notification).await?;

        tx.commit().await.map_err(map_sqlx)?;
        debug!(task_id = record.id, "Inserted report with reward");
        record.to_domain()
    }

    async fn get_task(&self, task_id: i32) -> PortResult<Task> {
        sqlx::query_as::<_, TaskRecord>(concat!(
            "SELECT ",
            task_columns!(),
            " FROM reports WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| PortError::NotFound(format!("Task {} not found", task_id)))?
        .to_domain()
    }

    async fn list_tasks(&self, limit: usize) -> PortResult<Vec<Task>> {
        let records = sqlx::query_as::<_, TaskRecord>(concat!(
            "SELECT ",
            task_columns!(),
            " FROM reports ORDER BY created_at ASC, id ASC LIMIT $1"
        ))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        records.into_iter().map(TaskRecord::to_domain).collect()
    }

    async fn list_recent_tasks(&self, limit: usize) -> PortResult<Vec<Task>> {
        let records = sqlx::query_as::<_, TaskRecord>(concat!(
            "SELECT ",
            task_columns!(),
            " FROM reports ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        records.into_iter().map(TaskRecord::to_domain).collect()
    }

    async fn claim_task(&self, task_id: i32, collector_id: i32) -> PortResult<Task> {
        let claimed = sqlx::query_as::<_, TaskRecord>(concat!(
            "UPDATE reports SET status = 'in_progress', collector_id = $2 \
             WHERE id = $1 AND status = 'pending' RETURNING ",
            task_columns!()
        ))
        .bind(task_id)
        .bind(collector_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match claimed {
            Some(record) => record.to_domain(),
            // Lost the race or never pending: report why.
            None => {
                let current = self.get_task(task_id).await?;
                current.ensure_claimable()?;
                Err(PortError::Unexpected(format!(
                    "Task {} is pending but could not be claimed",
                    task_id
                )))
            }
        }
    }

    async fn settle_verification(&self, settlement: VerificationSettlement) -> PortResult<Task> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let current = sqlx::query_as::<_, TaskRecord>(concat!(
            "SELECT ",
            task_columns!(),
            " FROM reports WHERE id = $1 FOR UPDATE"
        ))
        .bind(settlement.task_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| PortError::NotFound(format!("Task {} not found", settlement.task_id)))?
        .to_domain()?;
        current.ensure_verifiable_by(settlement.collector_id)?;

        let record = sqlx::query_as::<_, TaskRecord>(concat!(
            "UPDATE reports SET status = 'verified', verification_result = $2 \
             WHERE id = $1 AND status = 'in_progress' RETURNING ",
            task_columns!()
        ))
        .bind(settlement.task_id)
        .bind(Json(JudgmentRecord::from(&settlement.judgment)))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        insert_entry(&mut tx, &settlement.reward).await?;
        insert_notification(&mut tx, &settlement.notification).await?;
        sqlx::query(
            "INSERT INTO collected_waste (report_id, collector_id, status) VALUES ($1, $2, 'verified')",
        )
        .bind(settlement.task_id)
        .bind(settlement.collector_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        debug!(task_id = settlement.task_id, "Settled verification");
        record.to_domain()
    }

    async fn list_collections(&self, collector_id: i32) -> PortResult<Vec<CollectedWaste>> {
        let records = sqlx::query_as::<_, CollectionRecord>(
            "SELECT id, report_id AS task_id, collector_id, collection_date AS collected_at, status \
             FROM collected_waste WHERE collector_id = $1 ORDER BY collection_date ASC, id ASC",
        )
        .bind(collector_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn append_ledger_entry(&self, entry: NewLedgerEntry) -> PortResult<LedgerEntry> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        insert_entry(&mut conn, &entry).await
    }

    async fn list_ledger_entries(
        &self,
        user_id: i32,
        limit: Option<usize>,
    ) -> PortResult<Vec<LedgerEntry>> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        select_entries(&mut conn, user_id, limit).await
    }

    async fn create_reward_offer(&self, offer: NewRewardOffer) -> PortResult<RewardOffer> {
        let record = sqlx::query_as::<_, OfferRecord>(concat!(
            "INSERT INTO rewards (name, points, description, collection_info) VALUES ($1, $2, $3, $4) RETURNING ",
            offer_columns!()
        ))
        .bind(&offer.name)
        .bind(offer.cost)
        .bind(&offer.description)
        .bind(&offer.collection_info)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(record.to_domain())
    }

    async fn list_available_offers(&self) -> PortResult<Vec<RewardOffer>> {
        let records = sqlx::query_as::<_, OfferRecord>(concat!(
            "SELECT ",
            offer_columns!(),
            " FROM rewards WHERE is_available = TRUE ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn redeem_offer(&self, redemption: Redemption) -> PortResult<LedgerEntry> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Serializes redemptions per user so two cannot spend the same points.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(redemption.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", redemption.user_id)))?;

        let offer = sqlx::query_as::<_, OfferRecord>(concat!(
            "SELECT ",
            offer_columns!(),
            " FROM rewards WHERE id = $1"
        ))
        .bind(redemption.offer_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| PortError::NotFound(format!("Reward {} not found", redemption.offer_id)))?
        .to_domain();

        let entries = select_entries(&mut tx, redemption.user_id, redemption.window.limit()).await?;
        ledger::ensure_redeemable(&offer, ledger::balance_of(&entries))?;

        let (entry, notification) = ledger::redemption_records(redemption.user_id, &offer)?;
        let stored = insert_entry(&mut tx, &entry).await?;
        insert_notification(&mut tx, &notification).await?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(stored)
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> PortResult<Notification> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        insert_notification(&mut conn, &notification).await
    }

    async fn mark_notification_read(&self, user_id: i32, notification_id: i32) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(notification_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Notification {} not found",
                notification_id
            )));
        }
        Ok(())
    }

    async fn list_unread_notifications(&self, user_id: i32) -> PortResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(concat!(
            "SELECT ",
            notification_columns!(),
            " FROM notifications WHERE user_id = $1 AND is_read = FALSE ORDER BY created_at ASC, id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_saturate_instead_of_wrapping() {
        assert_eq!(sql_limit(10), 10);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
        assert!(sql_limit(usize::MAX) > 0);
    }
}
