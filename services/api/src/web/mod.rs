pub mod middleware;
pub mod notifications;
pub mod protocol;
pub mod rest;
pub mod rewards;
pub mod state;
pub mod users;

// Re-export the handlers so the binary that builds the router can reach them
// from one place.
pub use middleware::{request_id, require_caller};
pub use notifications::{list_unread_handler, mark_read_handler, notification_stream_handler};
pub use rest::{
    claim_task_handler, create_task_handler, get_task_handler, list_collections_handler,
    list_recent_tasks_handler, list_tasks_handler, verify_task_handler,
};
pub use rewards::{
    create_reward_handler, get_balance_handler, list_rewards_handler, list_transactions_handler,
    redeem_reward_handler,
};
pub use users::{create_user_handler, get_user_by_email_handler, rename_user_handler};
