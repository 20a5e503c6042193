use facecheck_core::{
    build_matcher, FaceDescription, FaceEncoder, GalleryReport, GrayView, LabelProgress,
    PipelineError, ReferenceStore,
};
use facecheck_hw::{Camera, CameraError, CameraOptions, FrameSource};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("camera is not open")]
    CameraNotOpen,
    #[error("frame {width}x{height} carries only {len} bytes")]
    BadFrame { width: u32, height: u32, len: usize },
    #[error("cannot spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Negotiated camera parameters, reported once the stream is up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraInfo {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fourcc: String,
}

type ProgressFn = Box<dyn FnMut(&LabelProgress) + Send>;

struct GalleryJob {
    labels: Vec<String>,
    store: ReferenceStore,
    threshold: f32,
    progress: ProgressFn,
    reply: oneshot::Sender<GalleryReport>,
}

impl GalleryJob {
    fn run<E: FaceEncoder>(self, encoder: &mut E) {
        let report = build_matcher(
            &self.labels,
            &self.store,
            encoder,
            self.threshold,
            self.progress,
        );
        let _ = self.reply.send(report);
    }
}

/// Messages sent to the engine thread.
enum EngineRequest {
    BuildGallery(GalleryJob),
    OpenCamera {
        device: String,
        options: CameraOptions,
        warmup_frames: usize,
        reply: oneshot::Sender<Result<CameraInfo, EngineError>>,
    },
    Detect {
        reply: oneshot::Sender<Result<Option<FaceDescription>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Build the labeled matcher from the reference store. `progress` runs on
    /// the engine thread after each label.
    pub async fn build_gallery(
        &self,
        labels: Vec<String>,
        store: ReferenceStore,
        threshold: f32,
        progress: impl FnMut(&LabelProgress) + Send + 'static,
    ) -> Result<GalleryReport, EngineError> {
        self.request(|reply| {
            EngineRequest::BuildGallery(GalleryJob {
                labels,
                store,
                threshold,
                progress: Box::new(progress),
                reply,
            })
        })
        .await
    }

    /// Open the camera, start streaming and discard warmup frames. The
    /// stream stays up for the rest of the engine's life.
    pub async fn open_camera(
        &self,
        device: &str,
        options: CameraOptions,
        warmup_frames: usize,
    ) -> Result<CameraInfo, EngineError> {
        self.request(|reply| EngineRequest::OpenCamera {
            device: device.to_string(),
            options,
            warmup_frames,
            reply,
        })
        .await?
    }

    /// Capture one frame and describe its most prominent face.
    pub async fn detect(&self) -> Result<Option<FaceDescription>, EngineError> {
        self.request(|reply| EngineRequest::Detect { reply }).await?
    }
}

/// Spawn the engine on a dedicated OS thread that owns the encoder and,
/// once opened, the camera. Requests are served one at a time.
pub fn spawn_engine<E>(mut encoder: E) -> Result<EngineHandle, EngineError>
where
    E: FaceEncoder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facecheck-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            serve(&mut rx, &mut encoder);
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Serve requests until the camera opens, then hand over to
/// [`serve_streaming`] for the rest of the thread's life.
fn serve<E: FaceEncoder>(rx: &mut mpsc::Receiver<EngineRequest>, encoder: &mut E) {
    while let Some(req) = rx.blocking_recv() {
        match req {
            EngineRequest::BuildGallery(job) => job.run(encoder),
            EngineRequest::OpenCamera {
                device,
                options,
                warmup_frames,
                reply,
            } => {
                let camera = match Camera::open(&device, options) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        continue;
                    }
                };
                let info = CameraInfo {
                    device: camera.device_path.clone(),
                    width: camera.width,
                    height: camera.height,
                    fourcc: camera.fourcc.to_string(),
                };
                tracing::info!(
                    device = %info.device,
                    width = info.width,
                    height = info.height,
                    fourcc = %info.fourcc,
                    "camera opened"
                );

                let mut capture = match camera.start_capture() {
                    Ok(capture) => capture,
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        continue;
                    }
                };
                if let Err(e) = capture.warm_up(warmup_frames) {
                    let _ = reply.send(Err(e.into()));
                    continue;
                }

                let _ = reply.send(Ok(info.clone()));
                // The stream borrows `camera`, which lives in this frame
                serve_streaming(rx, encoder, &mut capture, &info);
                return;
            }
            EngineRequest::Detect { reply } => {
                let _ = reply.send(Err(EngineError::CameraNotOpen));
            }
        }
    }
}

/// Serve requests against a running capture stream. Every `Detect` dequeues
/// the next frame from the same stream.
fn serve_streaming<E, S>(
    rx: &mut mpsc::Receiver<EngineRequest>,
    encoder: &mut E,
    frames: &mut S,
    info: &CameraInfo,
) where
    E: FaceEncoder,
    S: FrameSource,
{
    while let Some(req) = rx.blocking_recv() {
        match req {
            EngineRequest::BuildGallery(job) => job.run(encoder),
            EngineRequest::OpenCamera { reply, .. } => {
                tracing::debug!(device = %info.device, "camera already streaming");
                let _ = reply.send(Ok(info.clone()));
            }
            EngineRequest::Detect { reply } => {
                let _ = reply.send(run_detect(frames, encoder));
            }
        }
    }
}

/// Take the next frame and encode its most prominent face. Dark frames are
/// reported as "no face" without running inference.
fn run_detect<E, S>(frames: &mut S, encoder: &mut E) -> Result<Option<FaceDescription>, EngineError>
where
    E: FaceEncoder,
    S: FrameSource,
{
    let frame = frames.next_frame()?;

    if frame.is_dark() {
        tracing::trace!(seq = frame.sequence, "dark frame");
        return Ok(None);
    }

    let view = GrayView::new(&frame.data, frame.width, frame.height).ok_or(
        EngineError::BadFrame {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
        },
    )?;
    Ok(encoder.encode(view)?)
}
