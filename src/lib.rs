//! Vlog72 Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod lifecycle;
pub mod server;
pub mod sqlite_persistence;
pub mod store;
pub mod user;
pub mod vlog;

// Re-export commonly used types for convenience
pub use lifecycle::LifecycleError;
pub use server::{run_server, RequestsLoggingLevel};
pub use store::{FullStore, SqliteStore, UserStore, VlogStore};
pub use user::UserManager;
pub use vlog::VlogManager;
