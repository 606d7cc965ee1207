use common::interface::HumanVerifier;
use errors::{Result, VerifyError};
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

const VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// reCAPTCHA verification oracle. Without a configured secret the oracle
/// accepts every token (local development), with a startup warning.
pub struct RecaptchaVerifier {
    http: reqwest::Client,
    secret: Option<String>,
}

impl RecaptchaVerifier {
    pub fn new(secret: Option<String>) -> Result<Self> {
        if secret.is_none() {
            warn!("No reCAPTCHA secret configured; accepting all verification tokens");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VerifyError::RequestFailed(e.into()))?;
        Ok(Self { http, secret })
    }
}

#[async_trait::async_trait]
impl HumanVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<bool> {
        let Some(secret) = &self.secret else {
            return Ok(true);
        };

        let response = self
            .http
            .post(VERIFY_URL)
            .form(&[("secret", secret.as_str()), ("response", token)])
            .send()
            .await
            .map_err(|e| VerifyError::RequestFailed(e.into()))?;

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| VerifyError::RequestFailed(e.into()))?;

        if !body.success {
            debug!("reCAPTCHA rejected token: {:?}", body.error_codes);
        }
        Ok(body.success)
    }
}
