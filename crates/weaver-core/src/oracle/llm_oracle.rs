//! Oracle backed by the OpenRouter chat completion client

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::llm::{FinishReason, LlmClient, Message};

use super::{Oracle, OracleRequest, parse_object_reply};

/// Oracle that sends each request as one chat completion
#[derive(Debug, Clone)]
pub struct LlmOracle {
    client: Arc<LlmClient>,
}

impl LlmOracle {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }

    fn build_messages(request: &OracleRequest) -> Vec<Message> {
        let schema = serde_json::to_string_pretty(&request.schema)
            .unwrap_or_else(|_| request.schema.to_string());

        vec![
            Message::system(request.system.clone()),
            Message::user(format!(
                "{}\n\nRespond with a single JSON object matching this JSON schema, and nothing else:\n{}",
                request.prompt, schema
            )),
        ]
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<Value> {
        let messages = Self::build_messages(request);

        let response = self.client.complete_with_fallback(messages, true).await?;

        debug!(
            call = %request.name,
            subject = %request.subject,
            model = %response.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Oracle replied"
        );

        if response.finish_reason == FinishReason::Length {
            warn!(call = %request.name, subject = %request.subject, "Oracle reply truncated");
            return Err(Error::OracleFailure(
                request.name.clone(),
                "reply truncated at max_tokens".to_string(),
            ));
        }

        parse_object_reply(&request.name, &response.content)
    }
}
