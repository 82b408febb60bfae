use std::sync::Arc;

use crate::error::NutriError;
use crate::models::{AnalysisOutcome, PreparedImage, UploadedImage};
use crate::services::image_prep::{check_upload_size, prepare_image};
use crate::services::VisionService;

pub const DEFAULT_PROMPT: &str = "You are a professional nutritionist. Identify each visible food item in the image. \
Estimate approximate calories per item and provide a total like:\n\
1) Item — ~calories\n2) Item — ~calories\nTotal — ~calories\n\
If uncertain, mention assumptions.";

pub const DEFAULT_TEMPERATURE: f64 = 0.3;

/// Runs one user action: validate the upload, prepare it, dispatch once.
pub struct AnalysisHandler {
    vision: Arc<dyn VisionService>,
}

impl AnalysisHandler {
    pub fn new(vision: Arc<dyn VisionService>) -> Self {
        Self { vision }
    }

    /// Format and size checks happen before any decoding.
    pub fn prepare_upload(&self, upload: &UploadedImage) -> Result<PreparedImage, NutriError> {
        if !upload.has_accepted_extension() {
            return Err(NutriError::UnsupportedFormat(
                upload.extension().unwrap_or_default(),
            ));
        }
        check_upload_size(upload)?;
        prepare_image(upload)
    }

    pub async fn analyze(
        &self,
        upload: &UploadedImage,
        prompt: &str,
        temperature: f64,
    ) -> Result<AnalysisOutcome, NutriError> {
        log::info!(
            "📸 Analyzing upload {:?} ({} bytes)",
            upload.file_name,
            upload.declared_size
        );

        let image = self.prepare_upload(upload)?;
        Ok(self.dispatch(prompt, &image, temperature).await)
    }

    /// One request for an image that has already been prepared.
    pub async fn dispatch(
        &self,
        prompt: &str,
        image: &PreparedImage,
        temperature: f64,
    ) -> AnalysisOutcome {
        let outcome = self.vision.analyze_food_image(prompt, image, temperature).await;

        match &outcome {
            AnalysisOutcome::Success(_) => log::info!("✅ Analysis complete"),
            AnalysisOutcome::Advisory(text) => log::warn!("⚠️ Analysis advisory: {}", text),
            AnalysisOutcome::Error(text) => log::error!("❌ Analysis failed: {}", text),
        }

        outcome
    }
}
