use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facecheck_core::{is_plain_label, ReferenceStore};
use facecheck_hw::{Camera, CameraOptions, FrameSource};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facecheck", about = "facecheck kiosk CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check in the currently recognized user
    Checkin,
    /// Show kiosk status
    Status,
    /// Follow the status line until interrupted
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 250)]
        interval_ms: u64,
    },
    /// List labels the daemon can recognize
    Labels,
    /// Report which reference images exist for each label (no daemon needed)
    Scan {
        /// Reference image root (`<dir>/<label>/<n>.jpg`)
        #[arg(long, default_value = "images")]
        images_dir: PathBuf,
        /// Reference images per label
        #[arg(long, default_value_t = 3)]
        per_label: usize,
        /// Labels to check
        #[arg(required = true)]
        labels: Vec<String>,
    },
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// V4L2 device; lists devices when omitted
        #[arg(long)]
        device: Option<String>,
    },
}

// `#[zbus::proxy]` generates `KioskProxy` (async) and `KioskProxyBlocking`.
#[zbus::proxy(
    interface = "org.facecheck.Kiosk1",
    default_service = "org.facecheck.Kiosk1",
    default_path = "/org/facecheck/Kiosk1"
)]
trait Kiosk {
    async fn check_in(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn labels(&self) -> zbus::Result<Vec<String>>;
}

async fn proxy(system: bool) -> Result<KioskProxy<'static>> {
    tracing::debug!(system, "connecting to facecheckd");
    let conn = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    KioskProxy::new(&conn)
        .await
        .context("facecheckd is not reachable")
}

/// File names of the reference images the daemon would load for `label`.
/// `None` when the daemon skips the label outright.
fn readable_references(store: &ReferenceStore, label: &str) -> Option<Vec<String>> {
    if !is_plain_label(label) {
        return None;
    }
    let present = store
        .candidates(label)
        .into_iter()
        .filter(|p| store.load(p).is_ok())
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    Some(present)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Checkin => {
            let raw = proxy(cli.system).await?.check_in().await?;
            let reply: serde_json::Value = serde_json::from_str(&raw)?;
            let message = reply["message"].as_str().unwrap_or_default();
            if reply["success"].as_bool().unwrap_or(false) {
                println!("{message}");
            } else {
                anyhow::bail!("{message}");
            }
        }
        Commands::Status => {
            let raw = proxy(cli.system).await?.status().await?;
            let status: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Watch { interval_ms } => {
            let proxy = proxy(cli.system).await?;
            let mut last = String::new();
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
                        let line = status["status"].as_str().unwrap_or_default().to_string();
                        if line != last {
                            let marker = if status["checkin_enabled"].as_bool().unwrap_or(false) {
                                "[check-in ready]"
                            } else {
                                "[check-in disabled]"
                            };
                            println!("{marker} {line}");
                            last = line;
                        }
                    }
                }
            }
        }
        Commands::Labels => {
            let labels = proxy(cli.system).await?.labels().await?;
            if labels.is_empty() {
                println!("No users enrolled");
            }
            for label in labels {
                println!("{label}");
            }
        }
        Commands::Scan {
            images_dir,
            per_label,
            labels,
        } => {
            let store = ReferenceStore::new(images_dir, per_label);
            let mut usable_labels = 0;
            for label in &labels {
                let Some(present) = readable_references(&store, label) else {
                    println!("{label}: not a plain directory name, the daemon skips it");
                    continue;
                };
                if !present.is_empty() {
                    usable_labels += 1;
                }
                println!(
                    "{label}: {}/{per_label} readable [{}]",
                    present.len(),
                    present.join(", ")
                );
            }
            if usable_labels == 0 {
                anyhow::bail!(
                    "no readable reference images under {}",
                    store.root().display()
                );
            }
        }
        Commands::Test { device } => {
            let Some(device) = device else {
                let devices = Camera::list_devices();
                if devices.is_empty() {
                    println!("No video capture devices found");
                }
                for d in devices {
                    println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
                }
                return Ok(());
            };
            println!("Running camera diagnostics on {device}...");
            let camera = Camera::open(&device, CameraOptions::default())?;
            println!("negotiated {}x{} {}", camera.width, camera.height, camera.fourcc);
            let mut capture = camera.start_capture()?;
            capture.warm_up(4)?;
            let frame = capture.next_frame()?;
            let hint = if frame.is_dark() {
                " (dark: is the lens covered?)"
            } else {
                ""
            };
            println!(
                "frame #{}: avg brightness {:.1}{hint}",
                frame.sequence,
                frame.avg_brightness()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_reference(dir: &std::path::Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        image::GrayImage::from_pixel(4, 4, image::Luma([128]))
            .save_with_format(dir.join(name), image::ImageFormat::Jpeg)
            .unwrap();
    }

    #[test]
    fn test_scan_lists_readable_references() {
        let root = tempfile::tempdir().unwrap();
        write_reference(&root.path().join("alice"), "1.jpg");
        write_reference(&root.path().join("alice"), "3.jpg");

        let store = ReferenceStore::new(root.path(), 3);
        assert_eq!(
            readable_references(&store, "alice"),
            Some(vec!["1.jpg".to_string(), "3.jpg".to_string()])
        );
        assert_eq!(readable_references(&store, "bob"), Some(vec![]));
    }

    #[test]
    fn test_scan_skips_labels_outside_root() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("images");
        std::fs::create_dir_all(&root).unwrap();
        // Readable, but only through a path that escapes the root
        write_reference(&outer.path().join("x"), "1.jpg");

        let store = ReferenceStore::new(&root, 3);
        assert_eq!(readable_references(&store, "../x"), None);
    }
}
