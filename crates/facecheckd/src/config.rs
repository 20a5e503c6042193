use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Kiosk daemon configuration.
///
/// Resolved in three layers: built-in defaults, then an optional TOML file,
/// then `FACECHECK_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Identities to enroll; each names a directory under `images_dir`.
    pub user_labels: Vec<String>,
    /// Root of the reference image store (`<images_dir>/<label>/<n>.jpg`).
    pub images_dir: PathBuf,
    /// Reference images tried per label.
    pub images_per_label: usize,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// V4L2 device path.
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Frames discarded after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
    /// Euclidean descriptor distance below which a face is recognized.
    pub distance_threshold: f32,
    /// Period of the live-detection loop.
    pub detect_interval_ms: u64,
    /// Check-in endpoint receiving `{"user_label": ...}`.
    pub checkin_url: String,
    /// Optional request timeout; the HTTP client default applies when unset.
    pub checkin_timeout_secs: Option<u64>,
    /// Serve on the system bus instead of the session bus.
    pub system_bus: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_labels: Vec::new(),
            images_dir: PathBuf::from("images"),
            images_per_label: 3,
            model_dir: facecheck_core::default_model_dir(),
            camera_device: "/dev/video0".to_string(),
            camera_width: 640,
            camera_height: 480,
            warmup_frames: 4,
            // ≈ cosine similarity 0.40 for L2-normalized ArcFace descriptors
            distance_threshold: 1.1,
            detect_interval_ms: 100,
            checkin_url: "http://127.0.0.1:8888/checkin".to_string(),
            checkin_timeout_secs: None,
            system_bus: false,
        }
    }
}

impl Config {
    /// Load defaults, the config file and environment overrides.
    ///
    /// `FACECHECK_CONFIG` names the file explicitly (it must exist);
    /// otherwise `$XDG_CONFIG_HOME/facecheck/config.toml` is used if present.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FACECHECK_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACECHECK_*` overrides. `lookup` abstracts the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(labels) = lookup("FACECHECK_USER_LABELS") {
            self.user_labels = labels
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("FACECHECK_IMAGES_DIR") {
            self.images_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACECHECK_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACECHECK_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("FACECHECK_CHECKIN_URL") {
            self.checkin_url = v;
        }
        override_parsed(&lookup, "FACECHECK_IMAGES_PER_LABEL", &mut self.images_per_label);
        override_parsed(&lookup, "FACECHECK_CAMERA_WIDTH", &mut self.camera_width);
        override_parsed(&lookup, "FACECHECK_CAMERA_HEIGHT", &mut self.camera_height);
        override_parsed(&lookup, "FACECHECK_WARMUP_FRAMES", &mut self.warmup_frames);
        override_parsed(&lookup, "FACECHECK_DISTANCE_THRESHOLD", &mut self.distance_threshold);
        override_parsed(&lookup, "FACECHECK_DETECT_INTERVAL_MS", &mut self.detect_interval_ms);
        if let Some(v) = lookup("FACECHECK_CHECKIN_TIMEOUT_SECS") {
            match v.parse() {
                Ok(secs) => self.checkin_timeout_secs = Some(secs),
                Err(_) => tracing::warn!(key = "FACECHECK_CHECKIN_TIMEOUT_SECS", value = %v, "ignoring unparsable override"),
            }
        }
        if let Some(v) = lookup("FACECHECK_SYSTEM_BUS") {
            self.system_bus = v != "0";
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.distance_threshold.is_finite() && self.distance_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "distance_threshold must be a positive number, got {}",
                self.distance_threshold
            )));
        }
        if self.detect_interval_ms == 0 {
            return Err(ConfigError::Invalid("detect_interval_ms must be at least 1".into()));
        }
        if self.images_per_label == 0 {
            return Err(ConfigError::Invalid("images_per_label must be at least 1".into()));
        }
        if self.user_labels.is_empty() {
            tracing::warn!("no user_labels configured; recognition will not work");
        }
        Ok(())
    }

    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(facecheck_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(facecheck_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("facecheck/config.toml")
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable override"),
    }
}
