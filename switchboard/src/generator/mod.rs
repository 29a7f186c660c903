//! Conversation generation strategies
//!
//! Two interchangeable producers of an ordered step sequence for a prompt:
//! local scripted synthesis, or delegation to an external oracle. The
//! variant is selected once at configuration time; the processor is
//! strategy-agnostic.

pub mod oracle;
pub mod scripted;

pub use oracle::OracleGenerator;
pub use scripted::ScriptedGenerator;

use shared_types::AgentStep;

#[derive(Debug)]
pub enum ConversationGenerator {
    Scripted(ScriptedGenerator),
    Oracle(OracleGenerator),
}

impl ConversationGenerator {
    pub async fn generate(&self, prompt: &str) -> Result<Vec<AgentStep>, GeneratorError> {
        match self {
            Self::Scripted(generator) => Ok(generator.generate(prompt)),
            Self::Oracle(generator) => generator.generate(prompt).await,
        }
    }

    /// Progress contributed by each emitted step, in percent. Scripted flows
    /// average ~17 steps; oracle flows are shorter and unbounded in count.
    pub fn step_weight(&self) -> u64 {
        match self {
            Self::Scripted(_) => 6,
            Self::Oracle(_) => 10,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// The oracle was unreachable or its reply did not have the expected shape.
/// Either way the run aborts before any step is emitted.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Oracle request failed: {0}")]
    UpstreamRequest(#[from] reqwest::Error),

    #[error("Oracle returned error status: {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("Oracle reply not understood: {0}")]
    UpstreamFormat(String),
}
