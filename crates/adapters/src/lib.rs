//! HTTP backends for the core generation traits: OpenAI-compatible and
//! Gemini chat completions for text, Gemini inline images for covers. All
//! calls are blocking; the workflow drives one generation at a time.

pub mod error;
pub mod image;
pub mod text;

pub use error::AdapterError;
pub use image::{image_model_from_profile, GeminiImageAdapter};
pub use text::{ensure_v1_suffix, text_model_from_profile, GeminiTextAdapter, OpenAiLikeAdapter};
