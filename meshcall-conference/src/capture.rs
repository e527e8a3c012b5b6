//! Camera and screen capture seam
//!
//! Real capture hardware is out of reach here; [`SyntheticCamera`] resolves
//! constraints against a fixed native mode the way a browser would pick the
//! closest supported setting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// ideal/min/max triple for one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DimensionConstraint {
    pub ideal: u32,
    pub min: u32,
    pub max: u32,
}

impl DimensionConstraint {
    /// Closest value to `ideal` a source of size `native` can deliver
    fn resolve(&self, native: u32) -> Option<u32> {
        if native < self.min {
            return None;
        }
        Some(native.min(self.ideal).min(self.max).max(self.min))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySurface {
    Browser,
    Window,
    Monitor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoConstraints {
    pub width: Option<DimensionConstraint>,
    pub height: Option<DimensionConstraint>,
    pub aspect_ratio: Option<f64>,
    pub frame_rate: u32,
    pub facing_mode: Option<FacingMode>,
    pub display_surface: Option<DisplaySurface>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    pub noise_suppression: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureConstraints {
    pub video: VideoConstraints,
    pub audio: Option<AudioConstraints>,
}

impl CaptureConstraints {
    /// 720p to 1080p user-facing camera at 30 fps, optionally with microphone
    #[must_use]
    pub fn camera(with_audio: bool) -> Self {
        Self {
            video: VideoConstraints {
                width: Some(DimensionConstraint {
                    ideal: 1920,
                    min: 1280,
                    max: 1920,
                }),
                height: Some(DimensionConstraint {
                    ideal: 1080,
                    min: 720,
                    max: 1080,
                }),
                aspect_ratio: Some(1.777_78),
                frame_rate: 30,
                facing_mode: Some(FacingMode::User),
                display_surface: None,
            },
            audio: with_audio.then_some(AudioConstraints {
                echo_cancellation: true,
                auto_gain_control: true,
                noise_suppression: true,
            }),
        }
    }

    /// Browser tab capture at 30 fps with tab audio
    #[must_use]
    pub fn display() -> Self {
        Self {
            video: VideoConstraints {
                width: None,
                height: None,
                aspect_ratio: None,
                frame_rate: 30,
                facing_mode: None,
                display_surface: Some(DisplaySurface::Browser),
            },
            audio: Some(AudioConstraints {
                echo_cancellation: true,
                auto_gain_control: true,
                noise_suppression: false,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoTrackSettings {
    pub resolution: Resolution,
    pub frame_rate: u32,
}

/// An acquired capture stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaSource {
    pub label: String,
    pub video: VideoTrackSettings,
    pub audio: Option<AudioConstraints>,
}

impl MediaSource {
    #[must_use]
    pub const fn resolution(&self) -> Resolution {
        self.video.resolution
    }

    #[must_use]
    pub const fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Open the camera (and microphone if asked for)
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<MediaSource>;

    /// Open a screen/tab capture
    async fn acquire_display(&self, constraints: &CaptureConstraints) -> Result<MediaSource>;
}

/// Capture device with fixed native camera and display modes
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    native: Resolution,
    frame_rate: u32,
    display: Resolution,
}

impl SyntheticCamera {
    #[must_use]
    pub const fn new(native: Resolution, frame_rate: u32) -> Self {
        Self {
            native,
            frame_rate,
            display: Resolution::new(1920, 1080),
        }
    }

    #[must_use]
    pub const fn with_display(mut self, display: Resolution) -> Self {
        self.display = display;
        self
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(Resolution::new(1280, 720), 30)
    }
}

fn resolve_dimension(constraint: Option<&DimensionConstraint>, native: u32, name: &str) -> Result<u32> {
    match constraint {
        Some(c) => c.resolve(native).ok_or_else(|| {
            Error::Capture(format!(
                "overconstrained: {name} {native} below minimum {}",
                c.min
            ))
        }),
        None => Ok(native),
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCamera {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<MediaSource> {
        let video = &constraints.video;
        let width = resolve_dimension(video.width.as_ref(), self.native.width, "width")?;
        let height = resolve_dimension(video.height.as_ref(), self.native.height, "height")?;

        let source = MediaSource {
            label: "synthetic-camera".to_string(),
            video: VideoTrackSettings {
                resolution: Resolution::new(width, height),
                frame_rate: video.frame_rate.min(self.frame_rate),
            },
            audio: constraints.audio,
        };
        info!(
            resolution = %source.resolution(),
            frame_rate = source.video.frame_rate,
            audio = source.has_audio(),
            "Camera acquired"
        );
        Ok(source)
    }

    async fn acquire_display(&self, constraints: &CaptureConstraints) -> Result<MediaSource> {
        Ok(MediaSource {
            label: "synthetic-display".to_string(),
            video: VideoTrackSettings {
                resolution: self.display,
                frame_rate: constraints.video.frame_rate,
            },
            audio: constraints.audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_720p_camera_satisfies_constraints() {
        let camera = SyntheticCamera::default();
        let source = camera.acquire(&CaptureConstraints::camera(false)).await.unwrap();
        assert_eq!(source.resolution(), Resolution::new(1280, 720));
        assert_eq!(source.video.frame_rate, 30);
        assert!(!source.has_audio());
    }

    #[tokio::test]
    async fn test_4k_camera_capped_at_ideal() {
        let camera = SyntheticCamera::new(Resolution::new(3840, 2160), 60);
        let source = camera.acquire(&CaptureConstraints::camera(true)).await.unwrap();
        assert_eq!(source.resolution(), Resolution::new(1920, 1080));
        assert_eq!(source.video.frame_rate, 30);
        assert!(source.has_audio());
    }

    #[tokio::test]
    async fn test_small_camera_overconstrained() {
        let camera = SyntheticCamera::new(Resolution::new(640, 480), 30);
        let err = camera
            .acquire(&CaptureConstraints::camera(false))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
    }

    #[tokio::test]
    async fn test_display_capture() {
        let camera = SyntheticCamera::default().with_display(Resolution::new(2560, 1440));
        let source = camera
            .acquire_display(&CaptureConstraints::display())
            .await
            .unwrap();
        assert_eq!(source.resolution(), Resolution::new(2560, 1440));
        assert!(source.has_audio());
    }
}
