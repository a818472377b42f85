use crate::core::config::CaptchaConfig;
use crate::errors::{DriverError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

const NOT_READY: &str = "CAPCHA_NOT_READY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub site_key: String,
    pub page_url: String,
}

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Returns the response token to place in the page.
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String>;
}

/// Script placing a solved token where the reCAPTCHA widget reads it.
pub fn injection_script(token: &str) -> String {
    format!(
        "document.getElementById(\"g-recaptcha-response\").innerHTML=\"{}\";",
        token.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// Client for the 2captcha `in.php` / `res.php` API.
pub struct TwoCaptchaClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    initial_wait: Duration,
    poll_interval: Duration,
    timeout: Duration,
}

impl TwoCaptchaClient {
    pub fn from_config(config: &CaptchaConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(DriverError::ConfigurationError(
                "captcha api key is not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            initial_wait: Duration::from_millis(config.initial_wait_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    async fn submit(&self, challenge: &CaptchaChallenge) -> Result<String> {
        let body = self
            .http
            .get(format!("{}/in.php", self.api_base))
            .query(&[
                ("key", self.api_key.as_str()),
                ("method", "userrecaptcha"),
                ("googlekey", challenge.site_key.as_str()),
                ("pageurl", challenge.page_url.as_str()),
                ("json", "0"),
                ("invisible", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_ok(&body)
    }

    async fn poll(&self, request_id: &str) -> Result<Option<String>> {
        let body = self
            .http
            .get(format!("{}/res.php", self.api_base))
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", request_id),
                ("json", "0"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        if body.trim() == NOT_READY {
            return Ok(None);
        }
        parse_ok(&body).map(Some)
    }
}

fn parse_ok(body: &str) -> Result<String> {
    match body.trim().split_once('|') {
        Some(("OK", value)) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(DriverError::Captcha(body.trim().to_string())),
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaClient {
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String> {
        let request_id = self.submit(challenge).await?;
        info!(%request_id, "captcha submitted");

        let start = tokio::time::Instant::now();
        tokio::time::sleep(self.initial_wait).await;
        loop {
            if let Some(token) = self.poll(&request_id).await? {
                info!(%request_id, "captcha solved");
                return Ok(token);
            }
            if start.elapsed() >= self.timeout {
                return Err(DriverError::Captcha(format!(
                    "request {} unsolved after {}s",
                    request_id,
                    self.timeout.as_secs()
                )));
            }
            debug!(%request_id, "captcha not ready");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
