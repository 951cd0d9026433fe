pub mod domain;
pub mod ledger;
pub mod memory;
pub mod ports;
pub mod service;
pub mod verification;

pub use domain::{
    CollectedWaste, LedgerEntry, LedgerKind, NewLedgerEntry, NewNotification, NewRewardOffer,
    NewTask, Notification, RewardOffer, Task, TaskStatus, User, VerificationJudgment,
};
pub use ledger::BalanceWindow;
pub use memory::MemoryStore;
pub use ports::{
    DatabaseService, PortError, PortResult, Redemption, VerificationOracle,
    VerificationSettlement,
};
pub use service::{RewardsService, ServiceSettings};
pub use verification::VerificationOutcome;
