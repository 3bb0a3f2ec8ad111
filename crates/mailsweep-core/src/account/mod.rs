//! Account model.
//!
//! An account is handed to the engine by value for one pass and never
//! written back; persistence goes through [`crate::MailStore`].

mod check_time;
mod model;

pub use check_time::normalize_check_time;
pub use model::{AccountId, MailAccount};
