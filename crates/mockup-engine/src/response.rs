use mockup_contracts::generation::{
    GeneratedImage, GenerationFailure, GenerationResult, DEFAULT_IMAGE_MEDIA_TYPE,
};
use serde::Deserialize;

use crate::client::RawResponse;

const NO_IMAGE_MESSAGE: &str = "no image returned";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

// First candidate only; its first part with non-empty inline data wins.
pub fn parse_response(raw: &RawResponse) -> GenerationResult {
    let parsed: GenerateContentResponse = match serde_json::from_str(&raw.body) {
        Ok(parsed) => parsed,
        Err(err) => {
            return GenerationResult::Failure(GenerationFailure::malformed(format!(
                "Gemini returned invalid JSON payload: {err}"
            )))
        }
    };

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let blocked = parsed
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .filter(|reason| !reason.trim().is_empty());
        let message = match blocked {
            Some(reason) => format!("{NO_IMAGE_MESSAGE} (prompt blocked: {reason})"),
            None => NO_IMAGE_MESSAGE.to_string(),
        };
        return GenerationResult::Failure(GenerationFailure::malformed(message));
    };

    let finish_reason = candidate.finish_reason;
    let image = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.inline_data)
        .find(|inline| !inline.data.trim().is_empty());

    match image {
        Some(inline) => {
            let media_type = inline
                .mime_type
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_IMAGE_MEDIA_TYPE.to_string());
            GenerationResult::Success(GeneratedImage::new(media_type, inline.data))
        }
        None => {
            let message = match finish_reason.filter(|reason| reason != "STOP") {
                Some(reason) => format!("{NO_IMAGE_MESSAGE} (finish reason: {reason})"),
                None => NO_IMAGE_MESSAGE.to_string(),
            };
            GenerationResult::Failure(GenerationFailure::malformed(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use mockup_contracts::generation::ErrorKind;
    use serde_json::{json, Value};

    use super::*;

    fn raw(body: Value) -> RawResponse {
        RawResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    fn failure_message(result: GenerationResult) -> Option<(ErrorKind, String)> {
        match result {
            GenerationResult::Failure(failure) => Some((failure.kind, failure.message)),
            GenerationResult::Success(_) => None,
        }
    }

    #[test]
    fn text_then_image_returns_image() {
        let result = parse_response(&raw(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "x" },
                    { "inlineData": { "mimeType": "image/png", "data": "AAA" } }
                ] }
            }]
        })));
        assert_eq!(
            result,
            GenerationResult::Success(GeneratedImage::new("image/png", "AAA"))
        );
    }

    #[test]
    fn text_only_is_malformed() {
        let result = parse_response(&raw(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "I cannot do that" }] },
                "finishReason": "STOP"
            }]
        })));
        assert_eq!(
            failure_message(result),
            Some((ErrorKind::MalformedResponse, "no image returned".to_string()))
        );
    }

    #[test]
    fn first_of_several_images_wins() {
        let result = parse_response(&raw(json!({
            "candidates": [{
                "content": { "parts": [
                    { "inlineData": { "mimeType": "image/jpeg", "data": "FIRST" } },
                    { "text": "and another" },
                    { "inlineData": { "mimeType": "image/png", "data": "SECOND" } }
                ] }
            }]
        })));
        assert_eq!(
            result,
            GenerationResult::Success(GeneratedImage::new("image/jpeg", "FIRST"))
        );
    }

    #[test]
    fn only_first_candidate_is_scanned() {
        let result = parse_response(&raw(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "no image here" }] } },
                { "content": { "parts": [{ "inlineData": { "mimeType": "image/png", "data": "LATE" } }] } }
            ]
        })));
        assert!(!result.is_success());
    }

    #[test]
    fn snake_case_inline_data_is_accepted() {
        let result = parse_response(&raw(json!({
            "candidates": [{
                "content": { "parts": [
                    { "inline_data": { "mime_type": "image/webp", "data": "QUJD" } }
                ] }
            }]
        })));
        assert_eq!(
            result,
            GenerationResult::Success(GeneratedImage::new("image/webp", "QUJD"))
        );
    }

    #[test]
    fn empty_inline_data_is_skipped() {
        let result = parse_response(&raw(json!({
            "candidates": [{
                "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": "" } },
                    { "inlineData": { "data": "QUJD" } }
                ] }
            }]
        })));
        assert_eq!(
            result,
            GenerationResult::Success(GeneratedImage::new(DEFAULT_IMAGE_MEDIA_TYPE, "QUJD"))
        );
    }

    #[test]
    fn no_candidates_is_malformed() {
        assert_eq!(
            failure_message(parse_response(&raw(json!({})))),
            Some((ErrorKind::MalformedResponse, "no image returned".to_string()))
        );
        assert_eq!(
            failure_message(parse_response(&raw(json!({ "candidates": [] })))),
            Some((ErrorKind::MalformedResponse, "no image returned".to_string()))
        );
    }

    #[test]
    fn blocked_prompt_reports_reason() {
        let message = failure_message(parse_response(&raw(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))))
        .map(|(_, message)| message)
        .unwrap_or_default();
        assert_eq!(message, "no image returned (prompt blocked: SAFETY)");
    }

    #[test]
    fn candidate_without_content_reports_finish_reason() {
        let message = failure_message(parse_response(&raw(json!({
            "candidates": [{ "finishReason": "IMAGE_SAFETY" }]
        }))))
        .map(|(_, message)| message)
        .unwrap_or_default();
        assert_eq!(message, "no image returned (finish reason: IMAGE_SAFETY)");
    }

    #[test]
    fn invalid_json_is_malformed() {
        let result = parse_response(&RawResponse {
            status: 200,
            body: "<html>oops</html>".to_string(),
        });
        assert_eq!(
            failure_message(result).map(|(kind, _)| kind),
            Some(ErrorKind::MalformedResponse)
        );
    }

    #[test]
    fn wrongly_typed_parts_are_malformed() {
        let result = parse_response(&raw(json!({
            "candidates": [{ "content": { "parts": "not-a-list" } }]
        })));
        assert_eq!(
            failure_message(result).map(|(kind, _)| kind),
            Some(ErrorKind::MalformedResponse)
        );
    }
}
