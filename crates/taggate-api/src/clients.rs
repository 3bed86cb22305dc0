//! reqwest-backed implementations of the engine's remote collaborators.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use taggate_core::captcha::CaptchaVerifier;
use taggate_core::organizations::ProfileDirectory;
use taggate_core::subscription::PaymentGateway;
use taggate_types::models::PaymentCard;

const HCAPTCHA_VERIFY_URL: &str = "https://hcaptcha.com/siteverify";
const INSTAGRAM_PROFILE_URL: &str = "https://www.instagram.com/api/v1/users/web_profile_info/";

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("taggate/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub struct HCaptchaClient {
    http: reqwest::Client,
    secret: String,
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

impl HCaptchaClient {
    pub fn new(http: reqwest::Client, secret: String) -> Self {
        Self { http, secret }
    }
}

#[async_trait]
impl CaptchaVerifier for HCaptchaClient {
    async fn verify(&self, response: &str) -> Result<bool> {
        if self.secret.is_empty() {
            bail!("captcha secret is not configured");
        }
        let verdict: SiteVerifyResponse = self
            .http
            .post(HCAPTCHA_VERIFY_URL)
            .form(&[("secret", self.secret.as_str()), ("response", response)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("malformed siteverify response")?;
        if !verdict.success {
            debug!(errors = ?verdict.error_codes, "captcha rejected");
        }
        Ok(verdict.success)
    }
}

/// Posts charges as JSON to a payment service. Any non-2xx is a decline.
pub struct PaymentGatewayClient {
    http: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct ChargeRequest<'a> {
    amount_cents: u64,
    currency: &'static str,
    card: &'a PaymentCard,
}

impl PaymentGatewayClient {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl PaymentGateway for PaymentGatewayClient {
    async fn charge(&self, card: &PaymentCard, amount_cents: u64) -> Result<()> {
        if self.url.is_empty() {
            bail!("payment gateway is not configured");
        }
        let response = self
            .http
            .post(&self.url)
            .json(&ChargeRequest {
                amount_cents,
                currency: "usd",
                card,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("charge rejected with {}: {}", status, body);
        }
        Ok(())
    }
}

pub struct InstagramClient {
    http: reqwest::Client,
}

impl InstagramClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProfileDirectory for InstagramClient {
    async fn biography(&self, handle: &str) -> Result<Option<String>> {
        let response = self
            .http
            .get(INSTAGRAM_PROFILE_URL)
            .query(&[("username", handle)])
            .header("x-ig-app-id", "936619743392459")
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let profile: serde_json::Value = response.error_for_status()?.json().await?;
        Ok(profile
            .pointer("/data/user/biography")
            .and_then(|bio| bio.as_str())
            .map(str::to_string))
    }
}
