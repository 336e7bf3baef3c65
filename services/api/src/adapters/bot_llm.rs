//! services/api/src/adapters/bot_llm.rs
//!
//! This module contains the adapter for the assistant's reply-generating LLM.
//! It implements the `ReplyGeneration` port from the core crate; when it
//! fails, the core responder falls back to its rule-based templates, so
//! errors here never reach the farmer.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use consultation_core::{
    domain::Consultation,
    ports::{EngineError, EngineResult, ReplyGeneration},
};

const SYSTEM_INSTRUCTIONS: &str = "You are an expert agricultural assistant specializing in \
plant health diagnosis and organic farming practices. Provide detailed, actionable advice: \
confirm the diagnosis, recommend treatment (organic preferred), give prevention tips, and \
mention regional considerations. Keep the tone friendly and supportive.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ReplyGeneration` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiReplyAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiReplyAdapter {
    /// Creates a new `OpenAiReplyAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn build_prompt(consultation: &Consultation, incoming: &str) -> String {
        format!(
            "Diagnosis: {diagnosis}\nPlant: {plant}\nSymptoms: {symptoms}\n\
             Region: {region}\nSeason: {season}\n\nFarmer's question: {incoming}",
            diagnosis = consultation.diagnosis_label(),
            plant = consultation.plant_name,
            symptoms = consultation.symptoms,
            region = consultation.region,
            season = consultation.season,
        )
    }
}

//=========================================================================================
// `ReplyGeneration` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReplyGeneration for OpenAiReplyAdapter {
    /// Generates a reply to the farmer's question from the consultation context.
    async fn generate_reply(
        &self,
        consultation: &Consultation,
        incoming: &str,
    ) -> EngineResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| EngineError::Unavailable(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(Self::build_prompt(consultation, incoming))
                .build()
                .map_err(|e| EngineError::Unavailable(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(500u32)
            .n(1)
            .build()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| EngineError::Unavailable(e.to_string()))?;

        // Extract the text content from the first choice in the response.
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content)
            } else {
                Err(EngineError::Unavailable(
                    "Reply LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(EngineError::Unavailable(
                "Reply LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}
