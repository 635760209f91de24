//! VOD proxying core
//!
//! Request flow: the web layer resolves content and a profile, the
//! [`registry::SessionRegistry`] opens or adopts the session under the
//! profile cap, and the [`engine::StreamEngine`] performs the upstream
//! fetch and relays bytes. The [`sweeper::CleanupSweeper`] reclaims
//! whatever the per-session grace timers miss.

pub mod engine;
pub mod limiter;
pub mod probe;
pub mod range;
pub mod registry;
pub mod sweeper;
pub mod timeshift;

pub use engine::StreamEngine;
pub use limiter::ProfileLimiter;
pub use registry::SessionRegistry;
pub use sweeper::CleanupSweeper;
