use crate::prompts::PromptError;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Opaque failure from a text or image backend. Adapters wrap their concrete
/// error types here so the core never depends on a particular HTTP stack.
#[derive(Debug)]
pub struct ModelError {
    inner: Box<dyn StdError + Send + Sync>,
}

impl ModelError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Box::new(error),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            inner: message.into().into(),
        }
    }

    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
        self.inner
    }

    pub fn as_inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl StdError for ModelError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Text generation boundary: one prompt in, one completed response out.
pub trait TextModel: Send + Sync {
    fn invoke(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Image generation boundary: one prompt in, raw image bytes out.
pub trait ImageModel: Send + Sync {
    fn render(&self, prompt: &str) -> Result<Vec<u8>, ModelError>;
}

impl<M: TextModel + ?Sized> TextModel for Box<M> {
    fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        (**self).invoke(prompt)
    }
}

impl<M: ImageModel + ?Sized> ImageModel for Box<M> {
    fn render(&self, prompt: &str) -> Result<Vec<u8>, ModelError> {
        (**self).render(prompt)
    }
}

/// Which generation operation an error belongs to; surfaces in messages so a
/// failed bulk run names the chapter that broke it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GenerationKind {
    Outline,
    Chapter { index: usize },
    Cover,
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outline => f.write_str("outline planning"),
            Self::Chapter { index } => write!(f, "chapter {} generation", index + 1),
            Self::Cover => f.write_str("cover rendering"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to render the {kind} prompt: {source}")]
    Prompt {
        kind: GenerationKind,
        #[source]
        source: PromptError,
    },
    #[error("{kind} call failed: {source}")]
    Model {
        kind: GenerationKind,
        #[source]
        source: ModelError,
    },
    #[error("{kind} returned empty content")]
    EmptyResponse { kind: GenerationKind },
    #[error("failed to parse the {kind} payload: {source}")]
    Parse {
        kind: GenerationKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} returned an unusable payload: {reason}")]
    InvalidPayload { kind: GenerationKind, reason: String },
}

/// Strips Markdown code fences the model sometimes wraps around a payload.
pub(crate) fn strip_code_fences(response: &str) -> String {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop an optional language tag after the opening fence.
    let rest = match rest.split_once('\n') {
        Some((first_line, body)) if first_line.trim().chars().all(char::is_alphanumeric) => body,
        _ => rest,
    };
    rest.trim_end_matches('`').trim().to_string()
}
