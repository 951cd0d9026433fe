//! crates/waste_rewards_core/src/ledger.rs
//!
//! Balance derivation over the append-only ledger, and the policy for spending
//! points on catalog offers.

use crate::domain::{LedgerEntry, LedgerKind, NewLedgerEntry, NewNotification, RewardOffer};
use crate::ports::{PortError, PortResult};

/// Points granted for every reported task.
pub const REPORT_REWARD_POINTS: i32 = 10;

/// How many of the newest ledger entries feed a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceWindow {
    Recent(usize),
    Lifetime,
}

impl BalanceWindow {
    pub const DEFAULT_RECENT: usize = 10;

    /// `0` selects the lifetime sum.
    pub fn from_size(size: usize) -> Self {
        if size == 0 {
            BalanceWindow::Lifetime
        } else {
            BalanceWindow::Recent(size)
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            BalanceWindow::Recent(n) => Some(*n),
            BalanceWindow::Lifetime => None,
        }
    }
}

impl Default for BalanceWindow {
    fn default() -> Self {
        BalanceWindow::Recent(Self::DEFAULT_RECENT)
    }
}

/// Sums `entries` (already newest first and already windowed) and clamps at zero.
pub fn balance_of<'a, I>(entries: I) -> i64
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let total: i64 = entries.into_iter().map(LedgerEntry::signed_amount).sum();
    total.max(0)
}

/// Fails unless `offer` is a stored, available offer the balance covers.
pub fn ensure_redeemable(offer: &RewardOffer, balance: i64) -> PortResult<()> {
    if offer.is_points_summary() {
        return Err(PortError::NotFound(format!("Reward {} not found", offer.id)));
    }
    if !offer.is_available {
        return Err(PortError::Conflict(format!(
            "Reward '{}' is no longer available",
            offer.name
        )));
    }
    if balance < offer.cost {
        return Err(PortError::InsufficientBalance {
            balance,
            cost: offer.cost,
        });
    }
    Ok(())
}

/// The ledger entry and notification written when `user_id` redeems `offer`.
pub fn redemption_records(
    user_id: i32,
    offer: &RewardOffer,
) -> PortResult<(NewLedgerEntry, NewNotification)> {
    let cost = i32::try_from(offer.cost)
        .map_err(|_| PortError::Validation(format!("reward cost {} is out of range", offer.cost)))?;
    let entry = NewLedgerEntry::new(
        user_id,
        LedgerKind::Redeemed,
        cost,
        format!("Redeemed {}", offer.name),
    )?;
    let notification = NewNotification::reward(
        user_id,
        format!("You redeemed {} for {} points", offer.name, cost),
    );
    Ok((entry, notification))
}

/// The records written alongside every new task.
pub fn report_reward_records(reporter_id: i32) -> PortResult<(NewLedgerEntry, NewNotification)> {
    let entry = NewLedgerEntry::new(
        reporter_id,
        LedgerKind::EarnedReport,
        REPORT_REWARD_POINTS,
        "Points earned from reporting waste",
    )?;
    let notification = NewNotification::reward(
        reporter_id,
        format!(
            "You've earned {} points for reporting the waste!",
            REPORT_REWARD_POINTS
        ),
    );
    Ok((entry, notification))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(kind: LedgerKind, amount: i32) -> LedgerEntry {
        LedgerEntry {
            id: 1,
            user_id: 1,
            kind,
            amount,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    fn offer(cost: i64, is_available: bool) -> RewardOffer {
        RewardOffer {
            id: 4,
            name: "Tote bag".to_string(),
            cost,
            description: None,
            collection_info: String::new(),
            is_available,
        }
    }

    #[test]
    fn earnings_add_and_redemptions_subtract() {
        let entries = vec![
            entry(LedgerKind::EarnedReport, 10),
            entry(LedgerKind::EarnedCollect, 42),
            entry(LedgerKind::Redeemed, 30),
        ];
        assert_eq!(balance_of(&entries), 22);
    }

    #[test]
    fn negative_totals_clamp_to_zero() {
        let entries = vec![
            entry(LedgerKind::Redeemed, 50),
            entry(LedgerKind::EarnedReport, 10),
        ];
        assert_eq!(balance_of(&entries), 0);
    }

    #[test]
    fn zero_window_means_lifetime() {
        assert_eq!(BalanceWindow::from_size(0), BalanceWindow::Lifetime);
        assert_eq!(BalanceWindow::from_size(3).limit(), Some(3));
        assert_eq!(BalanceWindow::default().limit(), Some(10));
    }

    #[test]
    fn redemption_needs_enough_points() {
        assert!(ensure_redeemable(&offer(50, true), 50).is_ok());
        assert!(matches!(
            ensure_redeemable(&offer(50, true), 49),
            Err(PortError::InsufficientBalance { balance: 49, cost: 50 })
        ));
    }

    #[test]
    fn unavailable_and_synthetic_offers_cannot_be_redeemed() {
        assert!(matches!(
            ensure_redeemable(&offer(5, false), 100),
            Err(PortError::Conflict(_))
        ));
        assert!(matches!(
            ensure_redeemable(&RewardOffer::points_summary(100), 100),
            Err(PortError::NotFound(_))
        ));
    }

    #[test]
    fn report_reward_is_ten_points() {
        let (entry, notification) = report_reward_records(8).unwrap();
        assert_eq!(entry.amount(), 10);
        assert_eq!(entry.kind(), LedgerKind::EarnedReport);
        assert_eq!(notification.user_id, 8);
    }
}
