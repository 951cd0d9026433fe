use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use waste_rewards_core::ledger::balance_of;
use waste_rewards_core::ports::DatabaseService;
use waste_rewards_core::{
    BalanceWindow, LedgerEntry, LedgerKind, MemoryStore, NewLedgerEntry, PortError, PortResult,
    RewardsService, ServiceSettings, VerificationJudgment, VerificationOracle,
};

struct NoOracle;

#[async_trait]
impl VerificationOracle for NoOracle {
    async fn judge(&self, _: &[u8], _: &str, _: &str, _: &str) -> PortResult<VerificationJudgment> {
        Err(PortError::OracleParse("not used".to_string()))
    }
}

prop_compose! {
    fn arb_kind()(index in 0usize..3) -> LedgerKind {
        [LedgerKind::EarnedReport, LedgerKind::EarnedCollect, LedgerKind::Redeemed][index]
    }
}

prop_compose! {
    fn arb_history()
        (events in prop::collection::vec((arb_kind(), 1i32..500), 0..40)) -> Vec<(LedgerKind, i32)> {
        events
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_folded_balance_is_never_negative(history in arb_history()) {
        let entries: Vec<LedgerEntry> = history
            .iter()
            .enumerate()
            .map(|(i, (kind, amount))| LedgerEntry {
                id: i as i32 + 1,
                user_id: 1,
                kind: *kind,
                amount: *amount,
                description: String::new(),
                created_at: chrono::Utc::now(),
            })
            .collect();
        prop_assert!(balance_of(&entries) >= 0);
    }

    #[test]
    fn prop_service_balance_is_never_negative(history in arb_history(), window in 0usize..15) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let service = RewardsService::new(
                store.clone(),
                Arc::new(NoOracle),
                ServiceSettings {
                    balance_window: BalanceWindow::from_size(window),
                    ..ServiceSettings::default()
                },
            );
            let user = service.create_user("p@example.com", "Prop").await.unwrap();
            for (kind, amount) in &history {
                store
                    .append_ledger_entry(NewLedgerEntry::new(user.id, *kind, *amount, "prop").unwrap())
                    .await
                    .unwrap();
            }
            let balance = service.get_balance(user.id).await.unwrap();
            let rewards = service.list_available_rewards(user.id).await.unwrap();
            assert!(balance >= 0);
            assert_eq!(rewards[0].cost, balance);
        });
    }
}
