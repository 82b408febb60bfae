use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File extensions accepted from the upload controls.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Raw upload as handed over by a front end. Never persisted.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub declared_size: u64,
    pub file_name: Option<String>,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, file_name: Option<String>) -> Self {
        let declared_size = bytes.len() as u64;
        Self {
            bytes,
            declared_size,
            file_name,
        }
    }

    /// Lower-cased file extension, if the upload carried a name with one.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Uploads without a file name are left for the decoder to judge.
    pub fn has_accepted_extension(&self) -> bool {
        match self.extension() {
            Some(ext) => ACCEPTED_EXTENSIONS.contains(&ext.as_str()),
            None => true,
        }
    }
}

/// Decoded, RGB8, size-bounded image. Built only by `image_prep::prepare_image`.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    image: DynamicImage,
}

impl PreparedImage {
    pub(crate) fn new(image: DynamicImage) -> Self {
        let image = match image {
            DynamicImage::ImageRgb8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }
}

/// Base64 JPEG bytes of a prepared image, ready to embed in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    base64: String,
}

impl EncodedPayload {
    pub fn new(base64: String) -> Self {
        Self { base64 }
    }

    pub fn as_base64(&self) -> &str {
        &self.base64
    }

    pub fn data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64)
    }

    #[cfg(test)]
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::{engine::general_purpose, Engine};
        general_purpose::STANDARD.decode(&self.base64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageData },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageData {
    pub url: String,
}

/// Chat-completions request body: one user message with text + image.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub stream: bool,
}

impl AnalysisRequest {
    pub fn new(
        model: &str,
        prompt: &str,
        payload: &EncodedPayload,
        max_tokens: u32,
        temperature: f64,
    ) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageData {
                            url: payload.data_uri(),
                        },
                    },
                ],
            }],
            max_tokens,
            temperature,
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: MessageContent,
}

#[derive(Debug, Deserialize)]
pub struct MessageContent {
    pub content: String,
}

/// What a dispatch produced. Every variant carries displayable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum AnalysisOutcome {
    /// The model's answer, verbatim.
    Success(String),
    /// A known recoverable condition, e.g. the endpoint rejected the payload size.
    Advisory(String),
    /// API or transport failure, already formatted for the user.
    Error(String),
}

impl AnalysisOutcome {
    pub fn text(&self) -> &str {
        match self {
            AnalysisOutcome::Success(text)
            | AnalysisOutcome::Advisory(text)
            | AnalysisOutcome::Error(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            AnalysisOutcome::Success(text)
            | AnalysisOutcome::Advisory(text)
            | AnalysisOutcome::Error(text) => text,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisOutcome::Success(_) => "success",
            AnalysisOutcome::Advisory(_) => "advisory",
            AnalysisOutcome::Error(_) => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success(_))
    }
}

impl std::fmt::Display for AnalysisOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}
