pub mod db;
pub mod oracle;

pub use db::DbAdapter;
pub use oracle::OpenAiVisionOracle;
