//! Oracle: the external reasoning service
//!
//! Every profiler and assessor call goes through the [`Oracle`] trait with the
//! same shape: a system instruction, a user prompt built from structured data,
//! and a required output schema. The oracle returns loosely typed JSON; callers
//! own the validation boundary that turns it into domain types.
//!
//! Oracles are untrusted. Transport errors, timeouts and malformed output are
//! all reported as errors for which [`Error::is_oracle_failure`] holds, and the
//! caller drops the unit of work.

mod llm_oracle;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

pub use llm_oracle::LlmOracle;

/// One structured-output call
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Call shape, e.g. `profile_extraction`
    pub name: String,
    /// What the call is about (repository id, candidate pair)
    pub subject: String,
    pub system: String,
    pub prompt: String,
    /// JSON schema the reply must follow
    pub schema: Value,
}

impl OracleRequest {
    pub fn new(
        name: impl Into<String>,
        subject: impl Into<String>,
        system: impl Into<String>,
        prompt: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            system: system.into(),
            prompt: prompt.into(),
            schema,
        }
    }
}

/// External reasoning service with a structured-output contract
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Invoke the oracle and return its JSON object reply
    async fn invoke(&self, request: &OracleRequest) -> Result<Value>;
}

/// Invoke an oracle under a caller-enforced timeout
///
/// A timeout is reported as [`Error::OracleTimeout`], which callers treat the
/// same as any other oracle failure.
pub async fn invoke_with_timeout(
    oracle: &dyn Oracle,
    request: &OracleRequest,
    timeout: Duration,
) -> Result<Value> {
    match tokio::time::timeout(timeout, oracle.invoke(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                call = %request.name,
                subject = %request.subject,
                timeout_secs = timeout.as_secs(),
                "Oracle call timed out"
            );
            Err(Error::OracleTimeout(request.name.clone(), timeout.as_secs()))
        }
    }
}

/// Extract a JSON object from a reply that might contain markdown or prose
pub fn extract_json_from_response(response: &str) -> String {
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(start) = response.find("```") {
        let potential_start = start + 3;
        if let Some(newline) = response[potential_start..].find('\n') {
            let json_start = potential_start + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim().to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    response.trim().to_string()
}

/// Parse an oracle reply into a JSON object, failing closed on anything else
pub fn parse_object_reply(call: &str, response: &str) -> Result<Value> {
    let json_str = extract_json_from_response(response);
    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| Error::OracleFailure(call.to_string(), format!("invalid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(Error::OracleFailure(
            call.to_string(),
            "reply is not a JSON object".to_string(),
        ));
    }
    Ok(value)
}
