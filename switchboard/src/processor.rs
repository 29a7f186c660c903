//! Task processor - orchestrates one task's run
//!
//! Drives the state machine pending → processing → completed/failed,
//! paces step emission, persists each step, and publishes a progress
//! snapshot after every write. The active-task guard and all policy live
//! on the instance, so independent processors can coexist in tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use ractor::ActorRef;
use rand::Rng;

use shared_types::{
    AgentState, AgentStatusMap, TaskErrorPayload, TaskProgress, TaskStatus, WsEvent,
};

use crate::actors::task_store::{self, TaskStoreError, TaskStoreMsg};
use crate::generator::{ConversationGenerator, GeneratorError};
use crate::hub::BroadcastHub;

/// Delay before each emitted step: a fixed base plus a random extra drawn
/// from `[0, jitter]`. The pause emulates real multi-agent latency and is
/// part of the observable behavior; tests zero both fields.
#[derive(Debug, Clone, Copy)]
pub struct PacingConfig {
    pub base: Duration,
    pub jitter: Duration,
}

impl PacingConfig {
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            jitter: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Task {0} is already being processed")]
    AlreadyProcessing(i64),

    #[error("Task store error: {0}")]
    Store(#[from] TaskStoreError),

    #[error("Task store unavailable: {0}")]
    StoreRpc(String),

    #[error("Conversation generation failed: {0}")]
    Generator(#[from] GeneratorError),
}

#[derive(Clone)]
pub struct TaskProcessor {
    inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
    store: ActorRef<TaskStoreMsg>,
    hub: BroadcastHub,
    generator: ConversationGenerator,
    pacing: PacingConfig,
    /// Task ids with a run in flight (re-entrancy guard)
    active: Mutex<HashSet<i64>>,
}

impl TaskProcessor {
    pub fn new(
        store: ActorRef<TaskStoreMsg>,
        hub: BroadcastHub,
        generator: ConversationGenerator,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                store,
                hub,
                generator,
                pacing,
                active: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Start a detached run; the caller returns immediately.
    pub fn spawn_run(&self, task_id: i64, prompt: String) {
        let processor = self.clone();
        tokio::spawn(async move {
            if let Err(e) = processor.process_task(task_id, &prompt).await {
                tracing::warn!(task_id, error = %e, "task run ended with error");
            }
        });
    }

    /// Run one task to a terminal state. Fails fast with `AlreadyProcessing`
    /// if a run for this id is in flight, without touching task state.
    pub async fn process_task(&self, task_id: i64, prompt: &str) -> Result<(), ProcessorError> {
        {
            let mut active = self.lock_active();
            if !active.insert(task_id) {
                return Err(ProcessorError::AlreadyProcessing(task_id));
            }
        }

        let result = self.run(task_id, prompt).await;
        self.lock_active().remove(&task_id);
        result
    }

    async fn run(&self, task_id: i64, prompt: &str) -> Result<(), ProcessorError> {
        self.update_status(task_id, TaskStatus::Processing, None)
            .await?;
        tracing::info!(task_id, "task run started");

        match self.drive(task_id, prompt).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail_task(task_id, &e).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, task_id: i64, prompt: &str) -> Result<(), ProcessorError> {
        let steps = self.inner.generator.generate(prompt).await?;
        tracing::info!(task_id, steps = steps.len(), "conversation generated");

        for step in steps {
            self.pace().await;
            task_store::create_message(
                &self.inner.store,
                task_id,
                step.agent,
                step.message,
                step.message_type,
                step.metadata,
            )
            .await
            .map_err(|e| ProcessorError::StoreRpc(e.to_string()))??;

            let snapshot = self.task_progress(task_id).await?;
            self.inner
                .hub
                .broadcast(&WsEvent::TaskProgress { data: snapshot })
                .await;
        }

        self.update_status(task_id, TaskStatus::Completed, Some(Utc::now()))
            .await?;
        let snapshot = self.task_progress(task_id).await?;
        self.inner
            .hub
            .broadcast(&WsEvent::TaskCompleted { data: snapshot })
            .await;
        tracing::info!(task_id, "task completed");
        Ok(())
    }

    /// Terminal bookkeeping for a failed run. Best-effort: the error that
    /// brought us here is the one worth surfacing, not any follow-up store
    /// trouble.
    async fn fail_task(&self, task_id: i64, error: &ProcessorError) {
        if let Err(e) = self
            .update_status(task_id, TaskStatus::Failed, Some(Utc::now()))
            .await
        {
            tracing::error!(task_id, error = %e, "failed to record failed status");
        }
        self.inner
            .hub
            .broadcast(&WsEvent::TaskError {
                data: TaskErrorPayload {
                    task_id,
                    error: error.to_string(),
                },
            })
            .await;
        tracing::warn!(task_id, error = %error, "task failed");
    }

    /// Compute the point-in-time progress projection for a task.
    ///
    /// Completed tasks are pinned to 100 with all agents complete. Otherwise
    /// progress is an estimate bounded below 100 (the true step count is not
    /// known in advance for oracle flows), and the agent named by the most
    /// recent message is the active one.
    pub async fn task_progress(&self, task_id: i64) -> Result<TaskProgress, ProcessorError> {
        let task = task_store::get_task(&self.inner.store, task_id)
            .await
            .map_err(|e| ProcessorError::StoreRpc(e.to_string()))??;
        let messages = task_store::get_task_messages(&self.inner.store, task_id)
            .await
            .map_err(|e| ProcessorError::StoreRpc(e.to_string()))??;
        let current_message = messages.last().cloned();

        let (progress, agent_status) = if task.status == TaskStatus::Completed {
            (100, AgentStatusMap::all(AgentState::Complete))
        } else {
            let estimate = messages.len() as u64 * self.inner.generator.step_weight();
            let agent_status = current_message
                .as_ref()
                .map(|message| AgentStatusMap::with_active(message.agent))
                .unwrap_or_default();
            (estimate.min(95) as u8, agent_status)
        };

        Ok(TaskProgress {
            task_id,
            progress,
            status: task.status,
            agent_status,
            current_message,
        })
    }

    async fn update_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        completed_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<shared_types::Task, ProcessorError> {
        Ok(
            task_store::update_task_status(&self.inner.store, task_id, status, completed_at)
                .await
                .map_err(|e| ProcessorError::StoreRpc(e.to_string()))??,
        )
    }

    async fn pace(&self) {
        let PacingConfig { base, jitter } = self.inner.pacing;
        let mut delay = base;
        if !jitter.is_zero() {
            let extra = rand::rng().random_range(0..=jitter.as_millis() as u64);
            delay += Duration::from_millis(extra);
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashSet<i64>> {
        self.inner.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{OracleGenerator, ScriptedGenerator};
    use ractor::Actor;
    use shared_types::AgentRole;

    use crate::actors::task_store::{TaskStoreActor, TaskStoreArguments};

    async fn spawn_store() -> ActorRef<TaskStoreMsg> {
        let (store_ref, _handle) =
            Actor::spawn(None, TaskStoreActor, TaskStoreArguments::InMemory)
                .await
                .unwrap();
        store_ref
    }

    fn scripted_processor(
        store: ActorRef<TaskStoreMsg>,
        hub: BroadcastHub,
        pacing: PacingConfig,
    ) -> TaskProcessor {
        TaskProcessor::new(
            store,
            hub,
            ConversationGenerator::Scripted(ScriptedGenerator::with_seed(42)),
            pacing,
        )
    }

    fn decode(message: axum::extract::ws::Message) -> serde_json::Value {
        match message {
            axum::extract::ws::Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_successful_run_reaches_completed() {
        let store = spawn_store().await;
        let hub = BroadcastHub::new();
        let processor = scripted_processor(store.clone(), hub, PacingConfig::none());

        let task = task_store::create_task(&store, "Send Alex $32.50".to_string())
            .await
            .unwrap()
            .unwrap();
        processor.process_task(task.id, &task.prompt).await.unwrap();

        let task = task_store::get_task(&store, task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());

        let messages = task_store::get_task_messages(&store, task.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 9);
        assert_eq!(messages[0].agent, AgentRole::Supervisor);
        assert!(messages
            .last()
            .unwrap()
            .message
            .contains("$32.50 sent to Alex via Venmo ✅"));

        let progress = processor.task_progress(task.id).await.unwrap();
        assert_eq!(progress.progress, 100);
        assert_eq!(progress.agent_status, AgentStatusMap::all(AgentState::Complete));

        store.stop(None);
    }

    #[tokio::test]
    async fn test_progress_snapshots_are_monotonic() {
        let store = spawn_store().await;
        let hub = BroadcastHub::new();
        let (_client, mut rx) = hub.register().await;
        let processor = scripted_processor(store.clone(), hub, PacingConfig::none());

        let task = task_store::create_task(&store, "Send Alex $32.50".to_string())
            .await
            .unwrap()
            .unwrap();
        processor.process_task(task.id, &task.prompt).await.unwrap();

        let mut last_progress = 0u64;
        let mut saw_completed = false;
        // Handshake first, then 9 progress events, then the terminal event
        let handshake = decode(rx.recv().await.unwrap());
        assert_eq!(handshake["type"], "connected");
        while let Ok(message) = rx.try_recv() {
            let event = decode(message);
            match event["type"].as_str().unwrap() {
                "taskProgress" => {
                    let progress = event["data"]["progress"].as_u64().unwrap();
                    assert!(progress >= last_progress, "progress went backwards");
                    assert!(progress <= 95);
                    last_progress = progress;
                }
                "taskCompleted" => {
                    assert_eq!(event["data"]["progress"], 100);
                    saw_completed = true;
                }
                other => panic!("unexpected event type {other}"),
            }
        }
        assert!(saw_completed);

        store.stop(None);
    }

    #[tokio::test]
    async fn test_reentrant_run_is_rejected() {
        let store = spawn_store().await;
        let hub = BroadcastHub::new();
        let processor = scripted_processor(
            store.clone(),
            hub,
            PacingConfig {
                base: Duration::from_millis(100),
                jitter: Duration::ZERO,
            },
        );

        let task = task_store::create_task(&store, "Send Alex $5".to_string())
            .await
            .unwrap()
            .unwrap();

        let task_id = task.id;
        let background = {
            let processor = processor.clone();
            let prompt = task.prompt.clone();
            tokio::spawn(async move { processor.process_task(task_id, &prompt).await })
        };
        // Let the background run claim the guard, then collide with it
        tokio::time::sleep(Duration::from_millis(30)).await;
        let err = processor.process_task(task_id, &task.prompt).await.unwrap_err();
        assert!(matches!(err, ProcessorError::AlreadyProcessing(id) if id == task_id));

        background.await.unwrap().unwrap();

        // The rejected attempt wrote nothing extra
        let messages = task_store::get_task_messages(&store, task.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 9);

        store.stop(None);
    }

    #[tokio::test]
    async fn test_guard_is_released_after_completion() {
        let store = spawn_store().await;
        let hub = BroadcastHub::new();
        let processor = scripted_processor(store.clone(), hub, PacingConfig::none());

        let task = task_store::create_task(&store, "hello".to_string())
            .await
            .unwrap()
            .unwrap();
        processor.process_task(task.id, &task.prompt).await.unwrap();

        // A second run is not blocked by the guard (it restarts the flow)
        let again = processor.process_task(task.id, &task.prompt).await;
        assert!(again.is_ok());

        store.stop(None);
    }

    #[tokio::test]
    async fn test_oracle_failure_marks_failed_and_broadcasts_once() {
        let store = spawn_store().await;
        let hub = BroadcastHub::new();
        let (_client, mut rx) = hub.register().await;

        // Nothing listens on this port; the request fails before any step
        let generator = ConversationGenerator::Oracle(
            OracleGenerator::new(
                "http://127.0.0.1:1/resolve".to_string(),
                "demo".to_string(),
                Duration::from_millis(500),
            )
            .unwrap(),
        );
        let processor = TaskProcessor::new(store.clone(), hub, generator, PacingConfig::none());

        let task = task_store::create_task(&store, "Send Alex $5".to_string())
            .await
            .unwrap()
            .unwrap();
        let err = processor.process_task(task.id, &task.prompt).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Generator(_)));

        let task = task_store::get_task(&store, task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);

        let messages = task_store::get_task_messages(&store, task.id)
            .await
            .unwrap()
            .unwrap();
        assert!(messages.is_empty());

        // Exactly one taskError after the handshake
        let handshake = decode(rx.recv().await.unwrap());
        assert_eq!(handshake["type"], "connected");
        let event = decode(rx.recv().await.unwrap());
        assert_eq!(event["type"], "taskError");
        assert_eq!(event["data"]["taskId"], task.id);
        assert!(rx.try_recv().is_err());

        store.stop(None);
    }

    #[tokio::test]
    async fn test_progress_zero_for_pending_task() {
        let store = spawn_store().await;
        let hub = BroadcastHub::new();
        let processor = scripted_processor(store.clone(), hub, PacingConfig::none());

        let task = task_store::create_task(&store, "later".to_string())
            .await
            .unwrap()
            .unwrap();
        let progress = processor.task_progress(task.id).await.unwrap();
        assert_eq!(progress.progress, 0);
        assert_eq!(progress.status, TaskStatus::Pending);
        assert_eq!(progress.agent_status, AgentStatusMap::all(AgentState::Idle));
        assert!(progress.current_message.is_none());

        store.stop(None);
    }

    #[tokio::test]
    async fn test_progress_unknown_task_is_not_found() {
        let store = spawn_store().await;
        let hub = BroadcastHub::new();
        let processor = scripted_processor(store.clone(), hub, PacingConfig::none());

        let err = processor.task_progress(404).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Store(TaskStoreError::TaskNotFound(404))
        ));

        store.stop(None);
    }
}
