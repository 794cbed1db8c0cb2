//! Type definitions for barakah storage.

mod ids;
mod otp;
mod reset;
mod transactions;
mod users;

// Re-export all types from submodules
pub use ids::*;
pub use otp::*;
pub use reset::*;
pub use transactions::*;
pub use users::*;
