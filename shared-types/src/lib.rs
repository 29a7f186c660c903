//! Shared types between the engine and its clients
//!
//! Everything here crosses a serialization boundary: HTTP request/response
//! bodies, rows read back from the store, and WebSocket broadcast events.
//! Wire field names are camelCase to match the public protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier for a live observer connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Task lifecycle
// ============================================================================

/// Lifecycle state of a task. Transitions are monotonic: a task never
/// returns to an earlier state, and terminal states have no exits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One user-submitted prompt and its lifecycle record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned id, unique and immutable
    pub id: i64,
    pub prompt: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, when the task reaches a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Conversation
// ============================================================================

/// Named role in the simulated/delegated conversation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentRole {
    Supervisor,
    Phone,
    Venmo,
    User,
}

/// One persisted conversation step, attributed to one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: i64,
    /// Non-owning reference to the task this step belongs to
    pub task_id: i64,
    pub agent: AgentRole,
    pub message: String,
    /// Free-form rendering hint ("analysis", "success", ...), no engine logic
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One generated conversation step, before the store assigns id/timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStep {
    pub agent: AgentRole,
    pub message: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AgentStep {
    pub fn new(agent: AgentRole, message: impl Into<String>, message_type: &str) -> Self {
        Self {
            agent,
            message: message.into(),
            message_type: message_type.to_string(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ============================================================================
// Progress projection
// ============================================================================

/// Derived activity state of one agent, recomputed on every progress query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Active,
    Complete,
}

/// Per-agent activity map for the three named worker roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusMap {
    pub supervisor: AgentState,
    pub phone: AgentState,
    pub venmo: AgentState,
}

impl AgentStatusMap {
    pub fn all(state: AgentState) -> Self {
        Self {
            supervisor: state,
            phone: state,
            venmo: state,
        }
    }

    /// All idle except the named role. `user` activates nobody: the map only
    /// tracks the three worker agents.
    pub fn with_active(role: AgentRole) -> Self {
        let mut map = Self::all(AgentState::Idle);
        match role {
            AgentRole::Supervisor => map.supervisor = AgentState::Active,
            AgentRole::Phone => map.phone = AgentState::Active,
            AgentRole::Venmo => map.venmo = AgentState::Active,
            AgentRole::User => {}
        }
        map
    }
}

impl Default for AgentStatusMap {
    fn default() -> Self {
        Self::all(AgentState::Idle)
    }
}

/// Point-in-time completion snapshot; computed, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub task_id: i64,
    /// 0..=100; estimated below 100 until the terminal transition
    pub progress: u8,
    pub status: TaskStatus,
    pub agent_status: AgentStatusMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_message: Option<AgentMessage>,
}

// ============================================================================
// Realtime channel
// ============================================================================

/// Terminal failure payload broadcast exactly once per failed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskErrorPayload {
    pub task_id: i64,
    pub error: String,
}

/// Events pushed to every connected observer, system-wide
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    /// Handshake, sent once per new connection
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "clientId")]
        client_id: String,
    },

    /// Sent after each step is persisted
    #[serde(rename = "taskProgress")]
    TaskProgress { data: TaskProgress },

    /// Sent once, progress pinned to 100, terminal
    #[serde(rename = "taskCompleted")]
    TaskCompleted { data: TaskProgress },

    /// Sent once on failure, terminal
    #[serde(rename = "taskError")]
    TaskError { data: TaskErrorPayload },
}

// ============================================================================
// HTTP requests
// ============================================================================

/// Body of the task submission endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub prompt: String,
}
