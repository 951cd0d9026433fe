//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use waste_rewards_core::RewardsService;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RewardsService>,
    pub config: Arc<Config>,
    /// Cancelled on shutdown; long-lived responses stop when it fires.
    pub shutdown: CancellationToken,
}
