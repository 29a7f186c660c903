//! External oracle delegation
//!
//! Sends the prompt to the configured oracle endpoint and normalizes the
//! reply into the internal step vocabulary. The reply is expected to be an
//! ordered JSON array of single-key objects, each key naming an agent and
//! the value being that agent's utterance.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::GeneratorError;
use shared_types::{AgentRole, AgentStep};

#[derive(Debug, Clone)]
pub struct OracleGenerator {
    client: Client,
    endpoint: String,
    /// Fixed task identifier sent with every query
    task_id: String,
}

impl OracleGenerator {
    pub fn new(
        endpoint: String,
        task_id: String,
        timeout: Duration,
    ) -> Result<Self, GeneratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            task_id,
        })
    }

    pub async fn generate(&self, prompt: &str) -> Result<Vec<AgentStep>, GeneratorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "taskId": self.task_id,
                "query": prompt,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeneratorError::UpstreamStatus(status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GeneratorError::UpstreamFormat(e.to_string()))?;
        steps_from_reply(&body)
    }
}

fn steps_from_reply(body: &Value) -> Result<Vec<AgentStep>, GeneratorError> {
    let items = body.as_array().ok_or_else(|| {
        GeneratorError::UpstreamFormat("expected a JSON array of agent utterances".to_string())
    })?;

    let mut steps = Vec::with_capacity(items.len());
    for item in items {
        let entry = item
            .as_object()
            .filter(|object| object.len() == 1)
            .and_then(|object| object.iter().next())
            .ok_or_else(|| {
                GeneratorError::UpstreamFormat(format!(
                    "expected a single-key agent object, got {item}"
                ))
            })?;
        let (agent_name, utterance) = entry;
        let text = utterance.as_str().ok_or_else(|| {
            GeneratorError::UpstreamFormat(format!(
                "expected a string utterance for agent '{agent_name}'"
            ))
        })?;
        steps.push(AgentStep::new(
            normalize_agent(agent_name),
            text,
            classify_message(text),
        ));
    }
    Ok(steps)
}

/// Map external agent-name spellings onto the internal vocabulary.
/// Unknown names fall back to the supervisor.
fn normalize_agent(name: &str) -> AgentRole {
    let lower = name.to_lowercase();
    if lower.contains("venmo") || lower.contains("payment") {
        AgentRole::Venmo
    } else if lower.contains("phone") || lower.contains("call") {
        AgentRole::Phone
    } else if lower.contains("user") || lower.contains("customer") {
        AgentRole::User
    } else {
        AgentRole::Supervisor
    }
}

/// Classify an utterance into a rendering hint by substring inspection
fn classify_message(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("transaction successful")
        || lower.contains("transaction id")
        || lower.contains("successfully sent")
    {
        "success"
    } else if lower.contains("let's go to") || lower.contains("delegating") {
        "delegation"
    } else if lower.contains("send") || lower.contains("retrieve") || lower.contains("identify") {
        "action"
    } else if lower.contains("contact") || lower.contains("amount") || lower.contains('$') {
        "processing"
    } else if lower.contains("i've") || lower.contains("we've") || lower.contains("has been completed")
    {
        "completion"
    } else {
        "processing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_agent_spellings() {
        assert_eq!(normalize_agent("Venmo Agent"), AgentRole::Venmo);
        assert_eq!(normalize_agent("payment-bot"), AgentRole::Venmo);
        assert_eq!(normalize_agent("PhoneAgent"), AgentRole::Phone);
        assert_eq!(normalize_agent("call_handler"), AgentRole::Phone);
        assert_eq!(normalize_agent("User"), AgentRole::User);
        assert_eq!(normalize_agent("customer"), AgentRole::User);
        assert_eq!(normalize_agent("Supervisor"), AgentRole::Supervisor);
        assert_eq!(normalize_agent("orchestrator"), AgentRole::Supervisor);
    }

    #[test]
    fn test_classify_message_markers() {
        assert_eq!(
            classify_message("Transaction ID 81A2 confirmed, transfer complete"),
            "success"
        );
        assert_eq!(classify_message("Let's go to the Venmo agent"), "delegation");
        assert_eq!(classify_message("Delegating this to phone"), "delegation");
        assert_eq!(classify_message("Retrieve the contact list"), "action");
        assert_eq!(classify_message("The amount looks right"), "processing");
        assert_eq!(classify_message("I've wrapped everything up"), "completion");
        assert_eq!(classify_message("Working on it"), "processing");
    }

    #[test]
    fn test_steps_from_reply_ordered() {
        let body = json!([
            {"Supervisor": "Delegating to the payment team"},
            {"Venmo Agent": "Transaction ID 7F confirmed"},
            {"Phone Agent": "I've relayed the message"}
        ]);
        let steps = steps_from_reply(&body).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].agent, AgentRole::Supervisor);
        assert_eq!(steps[0].message_type, "delegation");
        assert_eq!(steps[1].agent, AgentRole::Venmo);
        assert_eq!(steps[1].message_type, "success");
        assert_eq!(steps[2].agent, AgentRole::Phone);
        assert_eq!(steps[2].message_type, "completion");
    }

    #[test]
    fn test_steps_from_reply_rejects_bad_shapes() {
        assert!(matches!(
            steps_from_reply(&json!({"not": "an array"})),
            Err(GeneratorError::UpstreamFormat(_))
        ));
        assert!(matches!(
            steps_from_reply(&json!([{"a": "x", "b": "y"}])),
            Err(GeneratorError::UpstreamFormat(_))
        ));
        assert!(matches!(
            steps_from_reply(&json!([{"Supervisor": 42}])),
            Err(GeneratorError::UpstreamFormat(_))
        ));
    }
}
