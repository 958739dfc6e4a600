//! Call session coordination
//!
//! The coordinator is split across focused modules:
//!
//! - **`manager`** - the `CallSessionCoordinator` struct, subscriptions and accessors
//! - **`calls`** - lifecycle operations (start, answer, decline, end) and inbound plumbing
//! - **`controls`** - mute, camera, speaker and screen-share toggles
//! - **`config`** - tunable policies (ring timeout, grace period)

pub mod calls;
pub mod config;
pub mod controls;
pub mod manager;

#[cfg(test)]
pub mod tests;

pub use config::CoordinatorConfig;
pub use manager::CallSessionCoordinator;
