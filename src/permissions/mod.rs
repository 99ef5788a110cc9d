//! Permissions - staff ranks, admin rights and the resolver that combines them.
//!
//! ```rust,ignore
//! if state.permissions.has_bits(chat_id, user_id, Rights::RESTRICT_MEMBERS).await? {
//!     // user and bot may both restrict
//! }
//! ```

mod checker;
mod rights;
mod staff;

pub use checker::PermissionResolver;
pub use rights::Rights;
pub use staff::{Rank, StaffRoster, STAFF_COLLECTION};
