//! services/api/src/adapters/oracle.rs
//!
//! This module contains the adapter for the photo-verification oracle.
//! It implements the `VerificationOracle` port from the `core` crate by asking a
//! vision-capable chat model to compare a collection photo with the reported task.

const SYSTEM_INSTRUCTIONS: &str = "You are an expert in waste management and recycling. \
You judge whether a photo of collected waste matches what was originally reported. \
Answer with a single JSON object and nothing else.";

const USER_INPUT_TEMPLATE: &str = r#"Analyze this image and provide:
1. Confirm if the waste type matches: {waste_type}
2. Estimate if the quantity matches: {amount}
3. Your confidence level in this assessment

Respond in JSON format like this:
{
  "wasteTypeMatch": true/false,
  "quantityMatch": true/false,
  "confidence": confidence level as a number between 0 and 1
}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;
use waste_rewards_core::{
    domain::VerificationJudgment,
    ports::{PortError, PortResult, VerificationOracle},
};

//=========================================================================================
// Reply Parsing
//=========================================================================================

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?").expect("code fence regex is valid"));

/// The JSON object the model is asked to produce.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JudgmentReply {
    waste_type_match: bool,
    quantity_match: bool,
    confidence: f64,
}

/// Parses the model's reply, tolerating markdown code fences around the JSON.
pub fn parse_judgment(reply: &str) -> PortResult<VerificationJudgment> {
    let sanitized = CODE_FENCE.replace_all(reply, "");
    let parsed: JudgmentReply = serde_json::from_str(sanitized.trim())
        .map_err(|e| PortError::OracleParse(format!("{}: {}", e, reply.trim())))?;
    VerificationJudgment::new(parsed.waste_type_match, parsed.quantity_match, parsed.confidence)
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `VerificationOracle` using an OpenAI-compatible vision model.
#[derive(Clone)]
pub struct OpenAiVisionOracle {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiVisionOracle {
    /// Creates a new `OpenAiVisionOracle`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `VerificationOracle` Trait Implementation
//=========================================================================================

#[async_trait]
impl VerificationOracle for OpenAiVisionOracle {
    async fn judge(
        &self,
        photo: &[u8],
        mime_type: &str,
        expected_waste_type: &str,
        expected_amount: &str,
    ) -> PortResult<VerificationJudgment> {
        let prompt = USER_INPUT_TEMPLATE
            .replace("{waste_type}", expected_waste_type)
            .replace("{amount}", expected_amount);
        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(photo));

        let text_part: ChatCompletionRequestUserMessageContentPart =
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into();
        let image_part: ChatCompletionRequestUserMessageContentPart =
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(data_url)
                        .detail(ImageDetail::Low)
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?,
                )
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into();

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(vec![text_part, image_part])
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(200u32)
            .temperature(0.0)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Transport failures count as an unusable judgment.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::OracleParse(e.to_string()))?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::OracleParse("Oracle response contained no text content.".to_string())
            })?;
        debug!(reply = %reply, "Oracle replied");

        parse_judgment(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let judgment =
            parse_judgment(r#"{"wasteTypeMatch": true, "quantityMatch": false, "confidence": 0.82}"#)
                .unwrap();
        assert!(judgment.waste_type_match);
        assert!(!judgment.quantity_match);
        assert_eq!(judgment.confidence, 0.82);
    }

    #[test]
    fn strips_markdown_fences() {
        let reply = "```json\n{\"wasteTypeMatch\": true, \"quantityMatch\": true, \"confidence\": 0.9}\n```";
        assert_eq!(parse_judgment(reply).unwrap().confidence, 0.9);
    }

    #[test]
    fn bare_fences_and_repeated_replies_parse() {
        let reply = "```\n{\"wasteTypeMatch\": false, \"quantityMatch\": true, \"confidence\": 0.4}\n```";
        for _ in 0..3 {
            let judgment = parse_judgment(reply).unwrap();
            assert!(!judgment.waste_type_match);
            assert_eq!(judgment.confidence, 0.4);
        }
    }

    #[test]
    fn prose_is_a_parse_error() {
        let err = parse_judgment("The photo shows plastic bottles.").unwrap_err();
        assert!(matches!(err, PortError::OracleParse(_)));
    }

    #[test]
    fn missing_fields_are_a_parse_error() {
        let err = parse_judgment(r#"{"wasteTypeMatch": true, "confidence": 0.9}"#).unwrap_err();
        assert!(matches!(err, PortError::OracleParse(_)));
    }

    #[test]
    fn percentages_are_rejected() {
        let err = parse_judgment(r#"{"wasteTypeMatch": true, "quantityMatch": true, "confidence": 85}"#)
            .unwrap_err();
        assert!(matches!(err, PortError::OracleParse(_)));
    }
}
