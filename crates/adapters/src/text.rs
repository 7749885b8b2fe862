use crate::error::AdapterError;
use bookforge_core::config::{InterfaceFormat, TextProfile};
use bookforge_core::generation::{ModelError, TextModel};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

fn build_client() -> Result<Client, AdapterError> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn check_profile(base_url: &str, model: &str) -> Result<(), AdapterError> {
    if base_url.trim().is_empty() {
        return Err(AdapterError::InvalidConfig(
            "base_url must not be empty".to_string(),
        ));
    }
    if model.trim().is_empty() {
        return Err(AdapterError::InvalidConfig(
            "model must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Appends `/v1` to a base URL unless the path already carries a version
/// segment, so both `https://host` and `https://host/v1` work in configs.
pub fn ensure_v1_suffix(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or("");
    if last.len() >= 2 && last.starts_with('v') && last[1..].chars().all(|c| c.is_ascii_digit()) {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn check_status(response: reqwest::blocking::Response) -> Result<String, AdapterError> {
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(AdapterError::HttpStatus {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        });
    }
    Ok(body)
}

/// Chat-completions backend: works against OpenAI and the many servers that
/// mirror its API.
pub struct OpenAiLikeAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl OpenAiLikeAdapter {
    pub fn from_profile(profile: &TextProfile) -> Result<Self, AdapterError> {
        check_profile(&profile.base_url, &profile.model)?;
        Ok(Self {
            client: build_client()?,
            base_url: ensure_v1_suffix(&profile.base_url),
            api_key: profile.api_key.clone(),
            model: profile.model.clone(),
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        })
    }

    fn complete(&self, prompt: &str) -> Result<String, AdapterError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        log::debug!("POST {url} (model {})", self.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let body = check_status(response)?;

        let parsed: ChatResponse = serde_json::from_str(&body)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AdapterError::EmptyResponse);
        }
        Ok(content)
    }
}

impl TextModel for OpenAiLikeAdapter {
    fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        self.complete(prompt).map_err(ModelError::new)
    }
}

/// Google Gemini `generateContent` backend.
pub struct GeminiTextAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiTextAdapter {
    pub fn from_profile(profile: &TextProfile) -> Result<Self, AdapterError> {
        check_profile(&profile.base_url, &profile.model)?;
        Ok(Self {
            client: build_client()?,
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            api_key: profile.api_key.clone(),
            model: profile.model.clone(),
            temperature: profile.temperature,
        })
    }

    fn complete(&self, prompt: &str) -> Result<String, AdapterError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let mut body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });
        if let Some(temperature) = self.temperature {
            body["generationConfig"] = json!({"temperature": temperature});
        }

        log::debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()?;
        let body = check_status(response)?;

        let parsed: GeminiResponse = serde_json::from_str(&body)?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AdapterError::EmptyResponse);
        }
        Ok(text)
    }
}

impl TextModel for GeminiTextAdapter {
    fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        self.complete(prompt).map_err(ModelError::new)
    }
}

/// Builds the right adapter for a profile's wire format.
pub fn text_model_from_profile(
    profile: &TextProfile,
) -> Result<Box<dyn TextModel>, AdapterError> {
    Ok(match profile.format {
        InterfaceFormat::OpenAi => Box::new(OpenAiLikeAdapter::from_profile(profile)?),
        InterfaceFormat::Gemini => Box::new(GeminiTextAdapter::from_profile(profile)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_suffix_is_added_once() {
        assert_eq!(
            ensure_v1_suffix("https://api.example.com"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            ensure_v1_suffix("https://api.example.com/v1/"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            ensure_v1_suffix("https://host/openai/v4"),
            "https://host/openai/v4"
        );
    }

    #[test]
    fn empty_model_is_rejected() {
        let profile = TextProfile {
            format: InterfaceFormat::OpenAi,
            base_url: "https://api.example.com".to_string(),
            api_key: "k".to_string(),
            model: "  ".to_string(),
            temperature: None,
            max_tokens: None,
        };
        assert!(matches!(
            OpenAiLikeAdapter::from_profile(&profile),
            Err(AdapterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn chat_response_content_is_extracted() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }

    #[test]
    fn gemini_parts_are_joined() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        assert_eq!(text, "ab");
    }
}
