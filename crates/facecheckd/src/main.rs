use anyhow::{Context, Result};
use facecheck_core::{FacePipeline, ReferenceStore};
use facecheck_hw::CameraOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod checkin;
mod config;
mod dbus_interface;
mod detect_loop;
mod engine;
mod kiosk;

use checkin::CheckinClient;
use config::Config;
use dbus_interface::{KioskService, BUS_NAME, OBJECT_PATH};
use kiosk::Kiosk;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facecheckd starting");

    let config = Config::load().context("loading configuration")?;
    let checkin = Arc::new(
        CheckinClient::new(
            &config.checkin_url,
            config.checkin_timeout_secs.map(Duration::from_secs),
        )
        .context("configuring check-in client")?,
    );
    let kiosk = Arc::new(Kiosk::new());

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, KioskService::new(Arc::clone(&kiosk), checkin))?
        .build()
        .await
        .context("registering D-Bus interface")?;
    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "D-Bus interface registered");

    // Model bootstrap: no fallback if the assets are missing
    let pipeline = FacePipeline::load(
        &config.detector_model_path(),
        &config.recognizer_model_path(),
    )
    .context("loading face models")?;
    let engine = engine::spawn_engine(pipeline)?;

    kiosk.set_status("Models loaded. Loading face descriptors...");
    let progress_kiosk = Arc::clone(&kiosk);
    let report = engine
        .build_gallery(
            config.user_labels.clone(),
            ReferenceStore::new(&config.images_dir, config.images_per_label),
            config.distance_threshold,
            move |p| {
                if p.included() {
                    progress_kiosk
                        .set_status(format!("Loaded {} descriptors for {}...", p.loaded, p.label));
                }
            },
        )
        .await?;
    if !report.skipped_labels.is_empty() {
        tracing::warn!(labels = ?report.skipped_labels, "labels without usable reference images");
    }
    let matcher = Arc::new(report.matcher);
    kiosk.set_enrolled(&matcher);

    let options = CameraOptions {
        width: config.camera_width,
        height: config.camera_height,
    };
    let detect_task = match engine
        .open_camera(&config.camera_device, options, config.warmup_frames)
        .await
    {
        Ok(info) => {
            kiosk.camera_started(info);
            Some(tokio::spawn(detect_loop::run(
                Arc::clone(&kiosk),
                engine.clone(),
                matcher,
                Duration::from_millis(config.detect_interval_ms),
            )))
        }
        Err(e) => {
            kiosk.camera_failed(&e);
            None
        }
    };

    tracing::info!("facecheckd ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("facecheckd shutting down");

    if let Some(task) = detect_task {
        task.abort();
    }
    Ok(())
}
