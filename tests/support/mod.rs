//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use url::Url;
use vk_client::api::{ApiClient, ApiEndpoint, HttpTransport, RateLimiter, RetryPolicy};
use vk_client::auth::Credential;
use wiremock::{MockServer, Respond, ResponseTemplate};

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_VERSION: &str = "5.131";

/// Method endpoint rooted at the mock server.
pub fn endpoint(server: &MockServer) -> ApiEndpoint {
    let base = Url::parse(&format!("{}/method", server.uri())).unwrap();
    ApiEndpoint::new(base, TEST_VERSION).unwrap()
}

/// Authenticated client without rate limiting or retry backoff.
pub fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        endpoint(server),
        Arc::new(RateLimiter::unlimited()),
        Arc::new(HttpTransport::new()),
    )
    .with_credential(Credential::new(TEST_TOKEN, None, 1))
    .with_retry_policy(RetryPolicy::default().without_backoff())
}

pub fn success(payload: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "response": payload }))
}

pub fn remote_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "error": { "error_code": code, "error_msg": message }
    }))
}

pub fn throttled() -> ResponseTemplate {
    remote_error(6, "Too many requests per second")
}

pub fn captcha(sid: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "error": {
            "error_code": 14,
            "error_msg": "Captcha needed",
            "captcha_sid": sid,
            "captcha_img": format!("https://api.vk.com/captcha.php?sid={sid}"),
        }
    }))
}

/// Replies throttled to the first `throttled` requests, then `payload`.
pub struct ThrottleThenSucceed {
    pub request_count: Arc<AtomicUsize>,
    pub throttled: usize,
    pub payload: Value,
}

impl Respond for ThrottleThenSucceed {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.throttled {
            throttled()
        } else {
            success(self.payload.clone())
        }
    }
}
