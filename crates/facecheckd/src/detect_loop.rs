//! Live-detection loop.
//!
//! Each tick awaits its detection before the next one is scheduled, so at
//! most one detection is ever in flight. Late ticks are delayed rather than
//! bunched up.

use crate::engine::{EngineError, EngineHandle};
use crate::kiosk::{Kiosk, TickOutcome};
use facecheck_core::{FaceDescription, FaceMatcher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Something that yields the most prominent face of the current frame.
pub trait FaceSource {
    fn detect(&self) -> impl Future<Output = Result<Option<FaceDescription>, EngineError>> + Send;
}

impl FaceSource for EngineHandle {
    async fn detect(&self) -> Result<Option<FaceDescription>, EngineError> {
        EngineHandle::detect(self).await
    }
}

/// Remembers the last reported value so only changes get logged.
#[derive(Debug, Default)]
struct Transition<T> {
    last: Option<T>,
}

impl<T: PartialEq> Transition<T> {
    /// Returns true when `next` differs from the previous value.
    fn update(&mut self, next: Option<T>) -> bool {
        if self.last == next {
            return false;
        }
        self.last = next;
        true
    }
}

/// Run until the source goes away (engine thread exit) or the task is aborted.
pub async fn run<S: FaceSource>(
    kiosk: Arc<Kiosk>,
    source: S,
    matcher: Arc<FaceMatcher>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Ticks are too frequent to log each one
    let mut recognized = Transition::<String>::default();
    let mut failure = Transition::<String>::default();

    tracing::info!(period_ms = period.as_millis() as u64, "detection loop started");
    loop {
        ticker.tick().await;

        match source.detect().await {
            Ok(detection) => {
                if failure.update(None) {
                    tracing::info!("detection recovered");
                }
                let outcome = kiosk.apply_detection(&matcher, detection);
                let label = match &outcome {
                    TickOutcome::Recognized(m) => m.label.as_known().map(String::from),
                    _ => None,
                };
                if recognized.update(label) {
                    match &outcome {
                        TickOutcome::Recognized(m) => {
                            tracing::info!(label = %m.label, distance = m.distance, "user recognized")
                        }
                        _ => tracing::debug!(?outcome, "recognition lost"),
                    }
                }
            }
            Err(EngineError::ChannelClosed) => {
                tracing::error!("engine thread gone; stopping detection loop");
                break;
            }
            Err(e) => {
                if failure.update(Some(e.to_string())) {
                    tracing::warn!(error = %e, "detection failing");
                }
                kiosk.detection_failed(&e);
                recognized.update(None);
            }
        }
    }
}
