//! Postgres-backed checks for the conditional writes in `DbAdapter`.
//!
//! Each test gets a fresh database from `sqlx::test` with the service
//! migrations applied. They need a reachable server in `DATABASE_URL`, so they
//! are ignored by default; run them with `cargo test -p api -- --ignored`.

use api_lib::adapters::DbAdapter;
use sqlx::PgPool;
use waste_rewards_core::ledger;
use waste_rewards_core::ports::{DatabaseService, PortError, Redemption};
use waste_rewards_core::verification;
use waste_rewards_core::{BalanceWindow, NewRewardOffer, NewTask, Task, VerificationJudgment};

async fn user(db: &DbAdapter, email: &str) -> i32 {
    db.create_user(email, "Test User").await.unwrap().id
}

async fn reported_task(db: &DbAdapter, reporter_id: i32) -> Task {
    let (reward, notification) = ledger::report_reward_records(reporter_id).unwrap();
    db.create_task(
        NewTask {
            reporter_id,
            location: "Canal street".to_string(),
            waste_type: "plastic".to_string(),
            amount: "5kg".to_string(),
            photo_ref: None,
        },
        reward,
        notification,
    )
    .await
    .unwrap()
}

async fn count(pool: &PgPool, sql: &str, id: i32) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres server in DATABASE_URL"]
async fn concurrent_claims_leave_one_collector(pool: PgPool) {
    let db = DbAdapter::new(pool.clone());
    let reporter = user(&db, "reporter@example.com").await;
    let first = user(&db, "first@example.com").await;
    let second = user(&db, "second@example.com").await;
    let task = reported_task(&db, reporter).await;

    let (a, b) = tokio::join!(db.claim_task(task.id, first), db.claim_task(task.id, second));

    let (winner, loser) = match (a, b) {
        (Ok(t), Err(e)) | (Err(e), Ok(t)) => (t, e),
        other => panic!("expected exactly one successful claim, got {:?}", other),
    };
    assert!(matches!(loser, PortError::InvalidTransition { .. }));
    let stored = db.get_task(task.id).await.unwrap();
    assert_eq!(stored.collector_id, winner.collector_id);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres server in DATABASE_URL"]
async fn claiming_a_claimed_task_reports_the_current_status(pool: PgPool) {
    let db = DbAdapter::new(pool);
    let reporter = user(&db, "reporter@example.com").await;
    let collector = user(&db, "collector@example.com").await;
    let task = reported_task(&db, reporter).await;
    db.claim_task(task.id, collector).await.unwrap();

    let err = db.claim_task(task.id, collector).await.unwrap_err();
    assert!(matches!(err, PortError::InvalidTransition { .. }));

    let missing = db.claim_task(task.id + 1000, collector).await.unwrap_err();
    assert!(matches!(missing, PortError::NotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres server in DATABASE_URL"]
async fn concurrent_settlements_write_one_reward(pool: PgPool) {
    let db = DbAdapter::new(pool.clone());
    let reporter = user(&db, "reporter@example.com").await;
    let collector = user(&db, "collector@example.com").await;
    let task = reported_task(&db, reporter).await;
    db.claim_task(task.id, collector).await.unwrap();

    let judgment = VerificationJudgment::new(true, true, 0.9).unwrap();
    let first = verification::settlement(task.id, collector, judgment, 25).unwrap();
    let second = verification::settlement(task.id, collector, judgment, 40).unwrap();

    let (a, b) = tokio::join!(db.settle_verification(first), db.settle_verification(second));

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let failure = a.err().or(b.err()).unwrap();
    assert!(matches!(failure, PortError::InvalidTransition { .. }));
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM transactions WHERE user_id = $1", collector).await,
        1
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM collected_waste WHERE report_id = $1", task.id).await,
        1
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM notifications WHERE user_id = $1", collector).await,
        1
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres server in DATABASE_URL"]
async fn redeeming_past_the_balance_writes_nothing(pool: PgPool) {
    let db = DbAdapter::new(pool.clone());
    let reporter = user(&db, "reporter@example.com").await;
    reported_task(&db, reporter).await;
    let offer = db
        .create_reward_offer(NewRewardOffer {
            name: "Tote bag".to_string(),
            cost: 50,
            description: None,
            collection_info: String::new(),
        })
        .await
        .unwrap();

    let err = db
        .redeem_offer(Redemption {
            user_id: reporter,
            offer_id: offer.id,
            window: BalanceWindow::default(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PortError::InsufficientBalance { balance: 10, cost: 50 }));
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM transactions WHERE user_id = $1", reporter).await,
        1
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM notifications WHERE user_id = $1", reporter).await,
        1
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres server in DATABASE_URL"]
async fn concurrent_redemptions_spend_the_points_once(pool: PgPool) {
    let db = DbAdapter::new(pool.clone());
    let reporter = user(&db, "reporter@example.com").await;
    reported_task(&db, reporter).await;
    let offer = db
        .create_reward_offer(NewRewardOffer {
            name: "Seed packet".to_string(),
            cost: 10,
            description: None,
            collection_info: String::new(),
        })
        .await
        .unwrap();
    let redemption = Redemption {
        user_id: reporter,
        offer_id: offer.id,
        window: BalanceWindow::Lifetime,
    };

    let (a, b) = tokio::join!(db.redeem_offer(redemption), db.redeem_offer(redemption));

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let failure = a.err().or(b.err()).unwrap();
    assert!(matches!(failure, PortError::InsufficientBalance { balance: 0, .. }));
    let entries = db.list_ledger_entries(reporter, None).await.unwrap();
    assert_eq!(ledger::balance_of(&entries), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres server in DATABASE_URL"]
async fn notifications_are_marked_read_only_by_their_owner(pool: PgPool) {
    let db = DbAdapter::new(pool);
    let reporter = user(&db, "reporter@example.com").await;
    let other = user(&db, "other@example.com").await;
    reported_task(&db, reporter).await;
    let unread = db.list_unread_notifications(reporter).await.unwrap();

    let err = db.mark_notification_read(other, unread[0].id).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));

    db.mark_notification_read(reporter, unread[0].id).await.unwrap();
    db.mark_notification_read(reporter, unread[0].id).await.unwrap();
    assert!(db.list_unread_notifications(reporter).await.unwrap().is_empty());
}
