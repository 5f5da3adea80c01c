//! HTTP client for end-to-end tests
//!
//! This module wraps reqwest and provides methods for all server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use super::fixtures::sample_wav;
use reqwest::multipart::{Form, Part};
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
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client logged in as `handle`
    ///
    /// # Panics
    ///
    /// Panics if authentication fails (indicates test infrastructure problem).
    pub async fn authenticated_as(base_url: String, handle: &str, password: &str) -> Self {
        let client = Self::new(base_url);

        let response = client.login(handle, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Authentication of {} failed: {:?}",
            handle,
            response.text().await
        );

        client
    }

    /// Creates a client pre-authenticated as the regular test user
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_USER, TEST_PASS).await
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /v1/auth/register
    pub async fn register(&self, handle: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/v1/auth/register", self.base_url))
            .json(&json!({ "user_handle": handle, "password": password }))
            .send()
            .await
            .expect("Register request failed")
    }

    /// POST /v1/auth/login
    pub async fn login(&self, handle: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/v1/auth/login", self.base_url))
            .json(&json!({ "user_handle": handle, "password": password }))
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

    // ========================================================================
    // Status Endpoints
    // ========================================================================

    /// GET /
    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    /// GET /v1/health
    pub async fn health(&self) -> Response {
        self.client
            .get(format!("{}/v1/health", self.base_url))
            .send()
            .await
            .expect("Health request failed")
    }

    // ========================================================================
    // User Endpoints
    // ========================================================================

    /// GET /v1/user/me
    pub async fn get_me(&self) -> Response {
        self.client
            .get(format!("{}/v1/user/me", self.base_url))
            .send()
            .await
            .expect("Get me request failed")
    }

    /// POST /v1/user/subscription
    pub async fn set_subscription(&self, active: bool) -> Response {
        self.client
            .post(format!("{}/v1/user/subscription", self.base_url))
            .json(&json!({ "active": active }))
            .send()
            .await
            .expect("Subscription request failed")
    }

    // ========================================================================
    // Enhancement Endpoint
    // ========================================================================

    /// POST /v1/enhance with the sample WAV and optional raw settings text
    pub async fn enhance(&self, settings: Option<&str>) -> Response {
        self.enhance_bytes(sample_wav(), TEST_AUDIO_FILENAME, settings)
            .await
    }

    /// POST /v1/enhance with arbitrary audio bytes
    pub async fn enhance_bytes(
        &self,
        audio: Vec<u8>,
        filename: &str,
        settings: Option<&str>,
    ) -> Response {
        let mut form = Form::new().part(
            "audio",
            Part::bytes(audio)
                .file_name(filename.to_string())
                .mime_str("audio/wav")
                .expect("Invalid mime type"),
        );
        if let Some(settings) = settings {
            form = form.text("settings", settings.to_string());
        }
        self.enhance_form(form).await
    }

    /// POST /v1/enhance with a custom multipart form
    pub async fn enhance_form(&self, form: Form) -> Response {
        self.client
            .post(format!("{}/v1/enhance", self.base_url))
            .multipart(form)
            .send()
            .await
            .expect("Enhance request failed")
    }
}
