//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, ALICE_EMAIL, ALICE_NAME};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_post_vlog() {
//!     let server = TestServer::spawn().await;
//!     let alice = TestClient::signed_up(server.base_url.clone(), ALICE_EMAIL, ALICE_NAME).await;
//!
//!     let id = alice.post_simple_vlog("My day", "yt-abc123").await;
//!     let response = alice.get_vlog(id).await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use server::TestServer;
