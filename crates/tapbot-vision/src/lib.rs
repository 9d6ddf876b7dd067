//! Screen matching: grayscale conversion, template loading and detection.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use image::{DynamicImage, GrayImage, ImageBuffer, Rgba};
use tapbot_controller::DeviceController;
use tapbot_types::{
    config::VisionConfig,
    vision::{ImageFrame, MatchResult, TemplateImage, TemplateRole},
    Result, TapbotError,
};
use tracing::{debug, error, info};

mod ncc;

pub use ncc::{best_match, MatchLocation, MatchOptions};

/// Answers "is this template on screen right now?".
#[async_trait]
pub trait TemplateDetector: Send + Sync {
    /// Never fails: any capture or matching problem counts as no match.
    async fn detect(&self, template: &TemplateImage, threshold: f32) -> bool;
}

/// Decodes an image file into a grayscale template for `role`.
pub fn load_template(path: impl AsRef<Path>, role: TemplateRole) -> Result<TemplateImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|err| {
        vision_error(format!(
            "unable to load {role} template {}: {err}",
            path.display()
        ))
    })?;
    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();
    if width == 0 || height == 0 {
        return Err(vision_error(format!(
            "{role} template {} is empty",
            path.display()
        )));
    }
    Ok(TemplateImage {
        role,
        path: path.to_path_buf(),
        width,
        height,
        luma: luma.into_raw(),
    })
}

pub fn frame_to_luma(frame: &ImageFrame) -> Result<GrayImage> {
    let Some(buffer) =
        ImageBuffer::<Rgba<u8>, _>::from_raw(frame.width, frame.height, frame.data.clone())
    else {
        return Err(vision_error(format!(
            "frame buffer of {} bytes does not hold {}x{} RGBA pixels",
            frame.data.len(),
            frame.width,
            frame.height
        )));
    };
    Ok(DynamicImage::ImageRgba8(buffer).to_luma8())
}

pub fn template_to_luma(template: &TemplateImage) -> Result<GrayImage> {
    GrayImage::from_raw(template.width, template.height, template.luma.clone()).ok_or_else(|| {
        vision_error(format!(
            "{} template buffer does not match {}x{}",
            template.role, template.width, template.height
        ))
    })
}

/// Captures the device screen and correlates it against a template.
pub struct ScreenMatcher<C> {
    controller: Arc<C>,
    options: MatchOptions,
    capture_dir: Option<PathBuf>,
}

impl<C: DeviceController> ScreenMatcher<C> {
    pub fn new(controller: Arc<C>, config: &VisionConfig) -> Self {
        Self {
            controller,
            options: MatchOptions::coarse(config.max_coarse_factor),
            capture_dir: config.capture_dir.as_ref().map(PathBuf::from),
        }
    }

    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Capture, convert and score. Errors are returned to the caller.
    pub async fn evaluate(&self, template: &TemplateImage, threshold: f32) -> Result<MatchResult> {
        let frame = self.controller.capture_frame().await?;
        if frame.is_empty() {
            return Err(vision_error("captured frame is empty"));
        }
        let screen = frame_to_luma(&frame)?;
        let needle = template_to_luma(template)?;
        let location = best_match(&screen, &needle, &self.options)?;
        let result = MatchResult::from_score(location.score, threshold);
        debug!(
            "{} template score {:.4} at ({}, {}), threshold {:.2}",
            template.role, location.score, location.x, location.y, threshold
        );
        if result.matched {
            if let Some(dir) = self.capture_dir.clone() {
                let role = template.role;
                let saved =
                    tokio::task::spawn_blocking(move || persist_capture(&dir, &frame, role)).await;
                match saved {
                    Ok(Ok(path)) => info!("Saved capture to {:?}", path),
                    Ok(Err(err)) => error!("{}", err),
                    Err(err) => error!("capture writer failed: {}", err),
                }
            }
        }
        Ok(result)
    }
}

/// Writes a matched frame as `<role>_<timestamp>.png` under `dir`.
fn persist_capture(dir: &Path, frame: &ImageFrame, role: TemplateRole) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .map_err(|err| vision_error(format!("failed to create capture dir {:?}: {err}", dir)))?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let path = dir.join(format!("{}_{}.png", role, timestamp));
    let Some(buffer) =
        ImageBuffer::<Rgba<u8>, _>::from_raw(frame.width, frame.height, frame.data.clone())
    else {
        return Err(vision_error("frame buffer does not match its dimensions"));
    };
    buffer
        .save(&path)
        .map_err(|err| vision_error(format!("failed to save frame: {err}")))?;
    Ok(path)
}

#[async_trait]
impl<C: DeviceController> TemplateDetector for ScreenMatcher<C> {
    async fn detect(&self, template: &TemplateImage, threshold: f32) -> bool {
        match self.evaluate(template, threshold).await {
            Ok(result) => result.matched,
            Err(err) => {
                error!("Error detecting {} template: {}", template.role, err);
                false
            }
        }
    }
}

pub fn vision_error(message: impl Into<String>) -> TapbotError {
    TapbotError::Vision(message.into())
}
