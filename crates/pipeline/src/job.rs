//! Job payloads delivered by the queue collaborator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage a job belongs to. Each stage reads the previous stage's
/// output from the document store and writes its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Uploaded,
    Parse,
    Chunk,
    Embed,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobStage::Uploaded => "uploaded",
            JobStage::Parse => "parse",
            JobStage::Chunk => "chunk",
            JobStage::Embed => "embed",
        };
        f.write_str(label)
    }
}

/// One queued job. Producers serialize this as the message body
/// (camelCase keys, stage under `type`).
///
/// `attempt` is producer-set and informational; the worker's retry decision
/// uses the queue's delivery count, which survives redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_id: String,
    pub knowledge_base_id: String,
    pub agent_id: String,
    pub user_id: String,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(rename = "type")]
    pub stage: JobStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}

impl JobPayload {
    pub fn new(
        stage: JobStage,
        knowledge_base_id: impl Into<String>,
        agent_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            knowledge_base_id: knowledge_base_id.into(),
            agent_id: agent_id.into(),
            user_id: user_id.into(),
            attempt: 0,
            max_attempts: default_max_attempts(),
            stage,
            filename: None,
            content_type: None,
        }
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
