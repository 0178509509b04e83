//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When test data changes (accounts, passwords, timeouts), update only
//! this file.

// ============================================================================
// Test Accounts
// ============================================================================

/// Email for the primary test account
pub const ALICE_EMAIL: &str = "alice@example.com";

/// Handle derived from `ALICE_EMAIL` at registration
pub const ALICE_HANDLE: &str = "alice";

/// Display name for the primary test account
pub const ALICE_NAME: &str = "Alice Vlogger";

/// Email for the secondary test account
pub const BOB_EMAIL: &str = "bob@example.com";

/// Handle derived from `BOB_EMAIL` at registration
pub const BOB_HANDLE: &str = "bob";

/// Display name for the secondary test account
pub const BOB_NAME: &str = "Bob Watcher";

/// Email for the third test account
pub const CARLA_EMAIL: &str = "carla@example.com";

/// Handle derived from `CARLA_EMAIL` at registration
pub const CARLA_HANDLE: &str = "carla";

/// Display name for the third test account
pub const CARLA_NAME: &str = "Carla Comments";

/// Password shared by all seeded test accounts
pub const TEST_PASS: &str = "password123";

// ============================================================================
// Time Windows
// ============================================================================

/// The 72h visibility window in seconds
pub const WINDOW_SECS: i64 = 72 * 3600;

/// One hour in seconds, for shifting vlogs around the expiry boundary
pub const HOUR_SECS: i64 = 3600;

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;
