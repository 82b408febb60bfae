use crate::models::{AnalysisOutcome, PreparedImage};

/// Trait for vision backends (Groq, or a stand-in under test)
#[async_trait::async_trait]
pub trait VisionService: Send + Sync {
    /// Never fails: every remote or transport problem comes back as outcome text.
    async fn analyze_food_image(
        &self,
        prompt: &str,
        image: &PreparedImage,
        temperature: f64,
    ) -> AnalysisOutcome;
}
