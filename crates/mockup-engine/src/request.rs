use mockup_contracts::generation::{EncodedImage, GenerationFailure};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    Text,
    Image,
}

impl ResponseModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    response_modalities: Vec<ResponseModality>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            response_modalities: vec![ResponseModality::Text, ResponseModality::Image],
        }
    }
}

impl GenerationOptions {
    pub fn response_modalities(&self) -> &[ResponseModality] {
        &self.response_modalities
    }

    fn to_generation_config(&self) -> Value {
        json!({
            "responseModalities": self
                .response_modalities
                .iter()
                .map(ResponseModality::as_str)
                .collect::<Vec<&str>>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    image: EncodedImage,
    options: GenerationOptions,
}

impl GenerationRequest {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn payload(&self) -> Value {
        json!({
            "contents": [
                {
                    "parts": [
                        { "text": self.prompt },
                        {
                            "inlineData": {
                                "mimeType": self.image.media_type,
                                "data": self.image.data,
                            }
                        },
                    ]
                }
            ],
            "generationConfig": self.options.to_generation_config(),
        })
    }
}

pub fn build_request(
    prompt: &str,
    image: &EncodedImage,
    options: &GenerationOptions,
) -> Result<GenerationRequest, GenerationFailure> {
    if prompt.trim().is_empty() {
        return Err(GenerationFailure::validation("prompt is empty"));
    }
    if image.is_empty() {
        return Err(GenerationFailure::validation("image is empty"));
    }
    Ok(GenerationRequest {
        prompt: prompt.to_string(),
        image: image.clone(),
        options: options.clone(),
    })
}

#[cfg(test)]
mod tests {
    use mockup_contracts::generation::ErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_matches_generate_content_schema() -> anyhow::Result<()> {
        let image = EncodedImage {
            media_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
        };
        let request = build_request(
            "A cute sticker on a laptop",
            &image,
            &GenerationOptions::default(),
        )?;

        assert_eq!(
            request.payload(),
            json!({
                "contents": [
                    { "parts": [
                        { "text": "A cute sticker on a laptop" },
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } }
                    ] }
                ],
                "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
            })
        );
        Ok(())
    }

    #[test]
    fn payload_keeps_prompt_verbatim() -> anyhow::Result<()> {
        let image = EncodedImage::from_bytes("image/webp", b"webp");
        let prompt = "  \"quoted\" sticker\non a mug ";
        let request = build_request(prompt, &image, &GenerationOptions::default())?;
        let payload = request.payload();

        assert_eq!(payload["contents"][0]["parts"][0]["text"], json!(prompt));
        assert_eq!(
            payload["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            json!("image/webp")
        );
        assert_eq!(payload["contents"].as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let image = EncodedImage::from_bytes("image/png", b"png");
        let failure = build_request(" \n\t", &image, &GenerationOptions::default()).err();
        assert_eq!(failure.map(|f| f.kind), Some(ErrorKind::Validation));
    }

    #[test]
    fn empty_image_is_rejected() {
        let image = EncodedImage::from_bytes("image/png", b"");
        let failure = build_request("sticker", &image, &GenerationOptions::default()).err();
        assert_eq!(
            failure,
            Some(GenerationFailure::validation("image is empty"))
        );
    }

    #[test]
    fn default_options_request_text_and_image() {
        assert_eq!(
            GenerationOptions::default().response_modalities(),
            &[ResponseModality::Text, ResponseModality::Image]
        );
    }
}
