//! Type definitions for tripmate storage.

mod ids;
mod invites;
mod items;
mod lists;
mod trips;

// Re-export all types from submodules
pub use ids::*;
pub use invites::*;
pub use items::*;
pub use lists::*;
pub use trips::*;
