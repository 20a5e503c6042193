//! Grayscale frames and pixel-format conversion.

use thiserror::Error;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// True when the lens is covered or the scene is unlit.
    pub fn is_dark(&self) -> bool {
        is_dark_frame(&self.data, DARK_FRAME_RATIO)
    }
}

/// Share of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_RATIO: f32 = 0.95;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer too short for {format}: expected {expected} bytes, got {actual}")]
    ShortBuffer {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed; the Y bytes are the grayscale image.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    /// Recognize a V4L2 FourCC code.
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            b"Y16 " | b"Y16\0" => Some(Self::Y16),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Yuyv => "YUYV",
            Self::Grey => "GREY",
            Self::Y16 => "Y16",
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Grey => 1,
            Self::Yuyv | Self::Y16 => 2,
        }
    }

    /// Convert one raw buffer into `width * height` grayscale bytes.
    pub fn to_grayscale(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
        let pixels = width as usize * height as usize;
        let expected = pixels * self.bytes_per_pixel();
        if buf.len() < expected {
            return Err(FrameError::ShortBuffer {
                format: self.name(),
                expected,
                actual: buf.len(),
            });
        }
        let buf = &buf[..expected];

        Ok(match self {
            Self::Grey => buf.to_vec(),
            Self::Yuyv => buf.iter().step_by(2).copied().collect(),
            // Keep the high byte of each little-endian sample
            Self::Y16 => buf.chunks_exact(2).map(|px| px[1]).collect(),
        })
    }
}

/// True if more than `threshold_pct` of pixels are below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < 32).count();
    (dark as f32 / gray.len() as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_extracts_luma() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let gray = PixelFormat::Yuyv.to_grayscale(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_4x2() {
        let yuyv: Vec<u8> = (0..16).collect();
        let gray = PixelFormat::Yuyv.to_grayscale(&yuyv, 4, 2).unwrap();
        assert_eq!(gray, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        let gray = PixelFormat::Y16.to_grayscale(&[0xff, 0x12, 0x00, 0xab], 2, 1).unwrap();
        assert_eq!(gray, vec![0x12, 0xab]);
    }

    #[test]
    fn test_grey_trims_padding() {
        let gray = PixelFormat::Grey.to_grayscale(&[1, 2, 3, 4, 99, 99], 2, 2).unwrap();
        assert_eq!(gray, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_buffer() {
        let err = PixelFormat::Yuyv.to_grayscale(&[100, 128], 2, 1).unwrap_err();
        assert!(err.to_string().contains("expected 4 bytes, got 2"), "{err}");
    }

    #[test]
    fn test_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"Y16 "), Some(PixelFormat::Y16));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }

    #[test]
    fn test_dark_frame() {
        assert!(is_dark_frame(&[], DARK_FRAME_RATIO));
        assert!(is_dark_frame(&[0u8; 1000], DARK_FRAME_RATIO));
        assert!(!is_dark_frame(&[128u8; 1000], DARK_FRAME_RATIO));

        let mut mostly_dark = vec![10u8; 960];
        mostly_dark.extend(vec![128u8; 40]);
        assert!(is_dark_frame(&mostly_dark, DARK_FRAME_RATIO));

        let mut borderline = vec![10u8; 940];
        borderline.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&borderline, DARK_FRAME_RATIO));
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame {
            data: vec![0, 100, 200],
            width: 3,
            height: 1,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        assert!((frame.avg_brightness() - 100.0).abs() < 1e-4);
        assert!(!frame.is_dark());
    }
}
