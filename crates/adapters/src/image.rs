use crate::error::AdapterError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bookforge_core::config::ImageProfile;
use bookforge_core::generation::{ImageModel, ModelError};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Gemini image generation via `generateContent`; the rendered image comes
/// back inline as base64 in one of the response parts.
pub struct GeminiImageAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    candidates: Vec<ImageCandidate>,
}

#[derive(Debug, Deserialize)]
struct ImageCandidate {
    #[serde(default)]
    content: ImageContent,
}

#[derive(Debug, Default, Deserialize)]
struct ImageContent {
    #[serde(default)]
    parts: Vec<ImagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagePart {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(default)]
    data: String,
}

impl GeminiImageAdapter {
    pub fn from_profile(profile: &ImageProfile) -> Result<Self, AdapterError> {
        if profile.base_url.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        if profile.model.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "model must not be empty".to_string(),
            ));
        }
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            api_key: profile.api_key.clone(),
            model: profile.model.clone(),
        })
    }

    fn generate(&self, prompt: &str) -> Result<Vec<u8>, AdapterError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"responseModalities": ["IMAGE", "TEXT"]},
        });

        log::debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(AdapterError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ImageResponse = serde_json::from_str(&body)?;
        let encoded = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .find_map(|part| part.inline_data)
            })
            .map(|inline| inline.data)
            .ok_or(AdapterError::EmptyResponse)?;
        Ok(BASE64.decode(encoded.as_bytes())?)
    }
}

impl ImageModel for GeminiImageAdapter {
    fn render(&self, prompt: &str) -> Result<Vec<u8>, ModelError> {
        self.generate(prompt).map_err(ModelError::new)
    }
}

pub fn image_model_from_profile(
    profile: &ImageProfile,
) -> Result<Box<dyn ImageModel>, AdapterError> {
    Ok(Box::new(GeminiImageAdapter::from_profile(profile)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_data_is_found_among_text_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[
            {"text":"here is your cover"},
            {"inlineData":{"mimeType":"image/png","data":"AQID"}}
        ]}}]}"#;
        let parsed: ImageResponse = serde_json::from_str(body).unwrap();
        let inline = parsed.candidates[0]
            .content
            .parts
            .iter()
            .find_map(|part| part.inline_data.as_ref())
            .unwrap();
        assert_eq!(BASE64.decode(inline.data.as_bytes()).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn missing_image_part_is_empty_response() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"no image"}]}}]}"#;
        let parsed: ImageResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.candidates[0]
            .content
            .parts
            .iter()
            .all(|part| part.inline_data.is_none()));
    }
}
