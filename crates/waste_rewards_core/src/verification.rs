//! crates/waste_rewards_core/src/verification.rs
//!
//! The verification gate: turns an oracle judgment into an accept/reject
//! decision and, on accept, into the records the store must write together.

use rand::Rng;

use crate::domain::{LedgerKind, NewLedgerEntry, NewNotification, VerificationJudgment};
use crate::ports::{PortResult, VerificationSettlement};

/// Confidence must be strictly above this for a collection to be accepted.
pub const CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Inclusive bounds of the points minted for a verified collection.
pub const MIN_COLLECTION_REWARD: i32 = 10;
pub const MAX_COLLECTION_REWARD: i32 = 59;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Reject,
}

/// Result reported back to the collector.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub accepted: bool,
    pub reward: Option<i32>,
    pub judgment: VerificationJudgment,
}

pub fn decide(judgment: &VerificationJudgment) -> GateDecision {
    if judgment.waste_type_match
        && judgment.quantity_match
        && judgment.confidence > CONFIDENCE_THRESHOLD
    {
        GateDecision::Accept
    } else {
        GateDecision::Reject
    }
}

/// Draws a collection reward uniformly from the inclusive reward range.
pub fn mint_reward<R: Rng + ?Sized>(rng: &mut R) -> i32 {
    rng.gen_range(MIN_COLLECTION_REWARD..=MAX_COLLECTION_REWARD)
}

/// Builds the compound write for an accepted judgment.
pub fn settlement(
    task_id: i32,
    collector_id: i32,
    judgment: VerificationJudgment,
    reward: i32,
) -> PortResult<VerificationSettlement> {
    let entry = NewLedgerEntry::new(
        collector_id,
        LedgerKind::EarnedCollect,
        reward,
        "Points earned from waste collection",
    )?;
    let notification = NewNotification::reward(
        collector_id,
        format!(
            "Verification successful! You earned {} points for collecting task #{}",
            reward, task_id
        ),
    );
    Ok(VerificationSettlement {
        task_id,
        collector_id,
        judgment,
        reward: entry,
        notification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn judgment(type_match: bool, quantity_match: bool, confidence: f64) -> VerificationJudgment {
        VerificationJudgment::new(type_match, quantity_match, confidence).unwrap()
    }

    #[test]
    fn accepts_only_full_matches_above_threshold() {
        assert_eq!(decide(&judgment(true, true, 0.71)), GateDecision::Accept);
        assert_eq!(decide(&judgment(true, true, 1.0)), GateDecision::Accept);
    }

    #[test]
    fn threshold_itself_is_rejected() {
        assert_eq!(decide(&judgment(true, true, 0.70)), GateDecision::Reject);
    }

    #[test]
    fn any_mismatch_rejects_regardless_of_confidence() {
        assert_eq!(decide(&judgment(false, true, 0.99)), GateDecision::Reject);
        assert_eq!(decide(&judgment(true, false, 0.99)), GateDecision::Reject);
    }

    #[test]
    fn minted_rewards_stay_in_range_and_cover_both_ends() {
        let mut rng = StdRng::seed_from_u64(17);
        let draws: Vec<i32> = (0..5_000).map(|_| mint_reward(&mut rng)).collect();
        assert!(draws
            .iter()
            .all(|r| (MIN_COLLECTION_REWARD..=MAX_COLLECTION_REWARD).contains(r)));
        assert!(draws.contains(&MIN_COLLECTION_REWARD));
        assert!(draws.contains(&MAX_COLLECTION_REWARD));
    }

    #[test]
    fn settlement_credits_the_collector() {
        let s = settlement(3, 9, judgment(true, true, 0.9), 25).unwrap();
        assert_eq!(s.reward.user_id(), 9);
        assert_eq!(s.reward.kind(), LedgerKind::EarnedCollect);
        assert_eq!(s.reward.amount(), 25);
        assert_eq!(s.notification.user_id, 9);
    }
}
