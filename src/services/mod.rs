pub mod ai_service; // VisionService trait
pub mod groq; // Groq vision client
pub mod image_prep;

pub use ai_service::VisionService;
pub use groq::GroqVisionService;
