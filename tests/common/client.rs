//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all vlog72-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    /// Creates a new unauthenticated client
    ///
    /// Use this for testing authentication flows.
    /// For most tests, use `signed_up()` instead.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true) // Automatically handle session cookies
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client with a freshly registered and logged-in account
    ///
    /// This is the most common way to create a test client.
    ///
    /// # Panics
    ///
    /// Panics if registration or login fails (indicates test
    /// infrastructure problem).
    pub async fn signed_up(base_url: String, email: &str, display_name: &str) -> Self {
        let client = Self::new(base_url);

        let response = client.register(email, TEST_PASS, display_name).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Test account registration failed: {:?}",
            response.text().await
        );

        let response = client.login(email, TEST_PASS).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Test account login failed: {:?}",
            response.text().await
        );

        client
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /v1/auth/register
    pub async fn register(&self, email: &str, password: &str, display_name: &str) -> Response {
        self.client
            .post(format!("{}/v1/auth/register", self.base_url))
            .json(&json!({
                "email": email,
                "password": password,
                "display_name": display_name,
            }))
            .send()
            .await
            .expect("Register request failed")
    }

    /// POST /v1/auth/login
    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/v1/auth/login", self.base_url))
            .json(&json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// GET /v1/auth/logout
    pub async fn logout(&self) -> Response {
        self.client
            .get(format!("{}/v1/auth/logout", self.base_url))
            .send()
            .await
            .expect("Logout request failed")
    }

    /// GET /v1/auth/me
    pub async fn me(&self) -> Response {
        self.client
            .get(format!("{}/v1/auth/me", self.base_url))
            .send()
            .await
            .expect("Me request failed")
    }

    // ========================================================================
    // User Endpoints
    // ========================================================================

    /// GET /v1/users/discover?q={query}
    pub async fn discover_all(&self) -> Response {
        self.client
            .get(format!("{}/v1/users/discover", self.base_url))
            .send()
            .await
            .expect("Discover request failed")
    }

    pub async fn discover(&self, query: &str) -> Response {
        self.client
            .get(format!("{}/v1/users/discover", self.base_url))
            .query(&[("q", query)])
            .send()
            .await
            .expect("Discover request failed")
    }

    /// GET /v1/users/{handle}
    pub async fn get_profile(&self, handle: &str) -> Response {
        self.client
            .get(format!("{}/v1/users/{}", self.base_url, handle))
            .send()
            .await
            .expect("Get profile request failed")
    }

    /// POST /v1/users/{handle}/follow
    pub async fn follow(&self, handle: &str) -> Response {
        self.client
            .post(format!("{}/v1/users/{}/follow", self.base_url, handle))
            .send()
            .await
            .expect("Follow request failed")
    }

    /// DELETE /v1/users/{handle}/follow
    pub async fn unfollow(&self, handle: &str) -> Response {
        self.client
            .delete(format!("{}/v1/users/{}/follow", self.base_url, handle))
            .send()
            .await
            .expect("Unfollow request failed")
    }

    /// GET /v1/users/{handle}/vlogs/active
    pub async fn active_vlogs(&self, handle: &str) -> Response {
        self.client
            .get(format!(
                "{}/v1/users/{}/vlogs/active",
                self.base_url, handle
            ))
            .send()
            .await
            .expect("Active vlogs request failed")
    }

    /// GET /v1/users/{handle}/vlogs/expired
    pub async fn expired_vlogs(&self, handle: &str) -> Response {
        self.client
            .get(format!(
                "{}/v1/users/{}/vlogs/expired",
                self.base_url, handle
            ))
            .send()
            .await
            .expect("Expired vlogs request failed")
    }

    // ========================================================================
    // Vlog Endpoints
    // ========================================================================

    /// POST /v1/vlogs with an arbitrary JSON body
    pub async fn post_vlog(&self, body: &serde_json::Value) -> Response {
        self.client
            .post(format!("{}/v1/vlogs", self.base_url))
            .json(body)
            .send()
            .await
            .expect("Post vlog request failed")
    }

    /// POST /v1/vlogs with a minimal valid payload, returning the new id
    ///
    /// # Panics
    ///
    /// Panics if the upload is rejected.
    pub async fn post_simple_vlog(&self, title: &str, external_id: &str) -> u64 {
        self.post_tagged_vlog(title, external_id, &[]).await
    }

    /// POST /v1/vlogs with tags, returning the new id
    pub async fn post_tagged_vlog(&self, title: &str, external_id: &str, tags: &[&str]) -> u64 {
        let response = self
            .post_vlog(&json!({
                "title": title,
                "external_id": external_id,
                "thumbnail_url": format!("https://cdn.example.com/{}.jpg", external_id),
                "duration": "00:01:30",
                "tags": tags,
            }))
            .await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Vlog upload failed: {:?}",
            response.text().await
        );
        let body: serde_json::Value = response.json().await.expect("Vlog response was not JSON");
        body["id"].as_u64().expect("Vlog response had no id")
    }

    /// GET /v1/vlogs/feed with an optional tag filter
    pub async fn feed(&self, tag: Option<&str>) -> Response {
        let mut request = self.client.get(format!("{}/v1/vlogs/feed", self.base_url));
        if let Some(tag) = tag {
            request = request.query(&[("tag", tag)]);
        }
        request.send().await.expect("Feed request failed")
    }

    /// GET /v1/vlogs/{id}
    pub async fn get_vlog(&self, id: u64) -> Response {
        self.client
            .get(format!("{}/v1/vlogs/{}", self.base_url, id))
            .send()
            .await
            .expect("Get vlog request failed")
    }

    /// POST /v1/vlogs/{id}/like
    pub async fn like(&self, id: u64) -> Response {
        self.client
            .post(format!("{}/v1/vlogs/{}/like", self.base_url, id))
            .send()
            .await
            .expect("Like request failed")
    }

    /// DELETE /v1/vlogs/{id}/like
    pub async fn unlike(&self, id: u64) -> Response {
        self.client
            .delete(format!("{}/v1/vlogs/{}/like", self.base_url, id))
            .send()
            .await
            .expect("Unlike request failed")
    }

    /// GET /v1/vlogs/{id}/comments
    pub async fn get_comments(&self, id: u64) -> Response {
        self.client
            .get(format!("{}/v1/vlogs/{}/comments", self.base_url, id))
            .send()
            .await
            .expect("Get comments request failed")
    }

    /// POST /v1/vlogs/{id}/comments
    pub async fn post_comment(&self, id: u64, content: &str) -> Response {
        self.client
            .post(format!("{}/v1/vlogs/{}/comments", self.base_url, id))
            .json(&json!({ "content": content }))
            .send()
            .await
            .expect("Post comment request failed")
    }

    /// POST /v1/vlogs/{id}/republish
    pub async fn republish(&self, id: u64) -> Response {
        self.client
            .post(format!("{}/v1/vlogs/{}/republish", self.base_url, id))
            .send()
            .await
            .expect("Republish request failed")
    }
}
