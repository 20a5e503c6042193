//! Check-in submission to the remote backend.
//!
//! One JSON POST per user action: `{"user_label": "<label>"}` in,
//! `{"success": bool, "message": "..."}` out. No retries.

use crate::kiosk::Kiosk;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const NO_LABEL_WARNING: &str = "Cannot check-in. Please wait for face recognition.";
pub const NETWORK_ERROR: &str = "Network Error connecting to check-in service.";

#[derive(Error, Debug)]
pub enum CheckinError {
    #[error("invalid check-in URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("cannot build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("check-in service unreachable: {0}")]
    Unreachable(reqwest::Error),
    #[error("malformed check-in response: {0}")]
    MalformedResponse(reqwest::Error),
}

#[derive(Debug, Serialize)]
struct CheckinRequest<'a> {
    user_label: &'a str,
}

/// Backend verdict.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckinResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// What the user is shown after pressing check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinReply {
    pub success: bool,
    pub message: String,
}

impl CheckinReply {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

pub struct CheckinClient {
    http: reqwest::Client,
    url: reqwest::Url,
}

impl CheckinClient {
    pub fn new(url: &str, timeout: Option<Duration>) -> Result<Self, CheckinError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| CheckinError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CheckinError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(CheckinError::Client)?;

        Ok(Self { http, url: parsed })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// POST the label and decode the backend's verdict.
    pub async fn submit(&self, user_label: &str) -> Result<CheckinResponse, CheckinError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(&CheckinRequest { user_label })
            .send()
            .await
            .map_err(CheckinError::Unreachable)?;

        let status = response.status();
        let body = response
            .json::<CheckinResponse>()
            .await
            .map_err(CheckinError::MalformedResponse)?;
        tracing::debug!(%status, success = body.success, "check-in response");
        Ok(body)
    }
}

/// Run the check-in action against the label currently attached to the kiosk.
///
/// The label is snapshotted once; detection keeps running while the request
/// is in flight.
pub async fn check_in(kiosk: &Kiosk, client: &CheckinClient) -> CheckinReply {
    let Some(label) = kiosk.checkin_label() else {
        tracing::warn!("check-in requested with no recognized user");
        return CheckinReply::failed(NO_LABEL_WARNING);
    };

    kiosk.set_status(format!("Checking in {label}..."));
    tracing::info!(label = %label, url = client.url(), "submitting check-in");

    match client.submit(&label).await {
        Ok(CheckinResponse { success: true, .. }) => {
            kiosk.set_status(format!("Check-in successful for {label}."));
            CheckinReply {
                success: true,
                message: format!("Check-in successful! Welcome, {label}."),
            }
        }
        Ok(CheckinResponse { message, .. }) => {
            tracing::warn!(label = %label, message = %message, "check-in rejected");
            kiosk.set_status("Check-in failed.");
            CheckinReply::failed(format!("Check-in failed: {message}"))
        }
        Err(e) => {
            tracing::error!(label = %label, error = %e, "check-in request failed");
            kiosk.set_status("Connection error. Check logs for details.");
            CheckinReply::failed(NETWORK_ERROR)
        }
    }
}
