use crate::generation::{GenerationError, GenerationKind, ImageModel};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::prompts::PromptRegistry;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSource {
    Generated,
    Uploaded,
}

/// Cover artwork stored as base64 so it serializes directly into the library
/// file and into HTML exports as a data URI.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoverImage {
    pub source: CoverSource,
    pub data: String,
}

impl CoverImage {
    pub fn generated(bytes: &[u8]) -> Self {
        Self {
            source: CoverSource::Generated,
            data: BASE64.encode(bytes),
        }
    }

    pub fn uploaded(bytes: &[u8]) -> Self {
        Self {
            source: CoverSource::Uploaded,
            data: BASE64.encode(bytes),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.data)
    }
}

/// Renders the cover image from the outline's cover prompt. Cover failures are
/// treated as soft by callers; this service only reports them.
pub struct CoverArtist<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
}

impl<'a> CoverArtist<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self { prompts, sink }
    }

    pub fn render<M: ImageModel + ?Sized>(
        &self,
        model: &M,
        cover_prompt: &str,
    ) -> Result<CoverImage, GenerationError> {
        const KIND: GenerationKind = GenerationKind::Cover;

        let prompt = self
            .prompts
            .format_with("render_cover", [("cover_prompt", cover_prompt)])
            .map_err(|source| GenerationError::Prompt { kind: KIND, source })?;

        self.sink
            .log(LogRecord::new(LogLevel::Info, "rendering book cover"));

        let bytes = model
            .render(&prompt)
            .map_err(|source| GenerationError::Model { kind: KIND, source })?;
        if bytes.is_empty() {
            return Err(GenerationError::EmptyResponse { kind: KIND });
        }
        Ok(CoverImage::generated(&bytes))
    }
}
