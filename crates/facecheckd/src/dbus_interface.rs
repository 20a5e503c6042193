use crate::checkin::{self, CheckinClient};
use crate::kiosk::Kiosk;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.facecheck.Kiosk1";
pub const OBJECT_PATH: &str = "/org/facecheck/Kiosk1";

/// D-Bus interface for the facecheck kiosk.
///
/// Bus name: org.facecheck.Kiosk1
/// Object path: /org/facecheck/Kiosk1
pub struct KioskService {
    kiosk: Arc<Kiosk>,
    checkin: Arc<CheckinClient>,
}

impl KioskService {
    pub fn new(kiosk: Arc<Kiosk>, checkin: Arc<CheckinClient>) -> Self {
        Self { kiosk, checkin }
    }
}

#[interface(name = "org.facecheck.Kiosk1")]
impl KioskService {
    /// Check in the currently recognized user. Returns a JSON `CheckinReply`.
    async fn check_in(&self) -> zbus::fdo::Result<String> {
        tracing::info!("check-in requested");
        let reply = checkin::check_in(&self.kiosk, &self.checkin).await;
        serde_json::to_string(&reply).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return kiosk status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let state = self.kiosk.snapshot();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "status": state.status,
            "checkin_enabled": state.checkin_label.is_some(),
            "recognized": state.checkin_label,
            "overlay": state.overlay,
            "camera": state.camera,
            "enrolled_labels": state.enrolled_labels.len(),
            "distance_threshold": state.distance_threshold,
        })
        .to_string())
    }

    /// Labels included in the matcher.
    async fn labels(&self) -> Vec<String> {
        self.kiosk.enrolled_labels()
    }
}
