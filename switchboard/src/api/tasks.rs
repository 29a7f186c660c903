//! Task endpoints: submission, lookup, message history, progress

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::actors::task_store::{self, TaskStoreError};
use crate::api::ApiState;
use crate::processor::ProcessorError;
use shared_types::SubmitTaskRequest;

/// Machine-readable error codes for task endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorCode {
    InvalidRequest,
    TaskNotFound,
    AlreadyProcessing,
    StoreUnavailable,
    InternalError,
}

impl TaskErrorCode {
    fn as_str(&self) -> &'static str {
        match self {
            TaskErrorCode::InvalidRequest => "INVALID_REQUEST",
            TaskErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            TaskErrorCode::AlreadyProcessing => "ALREADY_PROCESSING",
            TaskErrorCode::StoreUnavailable => "STORE_UNAVAILABLE",
            TaskErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            TaskErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            TaskErrorCode::TaskNotFound => StatusCode::NOT_FOUND,
            TaskErrorCode::AlreadyProcessing => StatusCode::CONFLICT,
            TaskErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            TaskErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: &'static str,
    message: String,
}

fn error_response(code: TaskErrorCode, message: impl Into<String>) -> Response {
    (
        code.status_code(),
        Json(json!({
            "error": {
                "code": code.as_str(),
                "message": message.into(),
            }
        })),
    )
        .into_response()
}

fn validation_response(field_errors: Vec<FieldError>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": {
                "code": TaskErrorCode::InvalidRequest.as_str(),
                "message": "Invalid task submission",
                "fieldErrors": field_errors,
            }
        })),
    )
        .into_response()
}

fn code_for_store_error(err: &TaskStoreError) -> TaskErrorCode {
    match err {
        TaskStoreError::TaskNotFound(_) => TaskErrorCode::TaskNotFound,
        _ => TaskErrorCode::InternalError,
    }
}

fn code_for_processor_error(err: &ProcessorError) -> TaskErrorCode {
    match err {
        ProcessorError::AlreadyProcessing(_) => TaskErrorCode::AlreadyProcessing,
        ProcessorError::Store(store_err) => code_for_store_error(store_err),
        ProcessorError::StoreRpc(_) => TaskErrorCode::StoreUnavailable,
        ProcessorError::Generator(_) => TaskErrorCode::InternalError,
    }
}

/// POST /tasks - validate, create the record, and start a detached run.
/// The response is the freshly created task, still `pending`.
pub async fn submit_task(
    State(state): State<ApiState>,
    Json(request): Json<SubmitTaskRequest>,
) -> Response {
    let mut field_errors = Vec::new();
    if request.prompt.trim().is_empty() {
        field_errors.push(FieldError {
            field: "prompt",
            message: "prompt must not be empty".to_string(),
        });
    }
    if !field_errors.is_empty() {
        return validation_response(field_errors);
    }

    match task_store::create_task(state.app_state.store(), request.prompt).await {
        Ok(Ok(task)) => {
            tracing::info!(task_id = task.id, "task submitted");
            state
                .app_state
                .processor()
                .spawn_run(task.id, task.prompt.clone());
            (StatusCode::CREATED, Json(task)).into_response()
        }
        Ok(Err(e)) => error_response(code_for_store_error(&e), e.to_string()),
        Err(e) => error_response(
            TaskErrorCode::StoreUnavailable,
            format!("Task store RPC failed: {e}"),
        ),
    }
}

/// GET /tasks/:task_id
pub async fn get_task(State(state): State<ApiState>, Path(task_id): Path<i64>) -> Response {
    match task_store::get_task(state.app_state.store(), task_id).await {
        Ok(Ok(task)) => (StatusCode::OK, Json(task)).into_response(),
        Ok(Err(e)) => error_response(code_for_store_error(&e), e.to_string()),
        Err(e) => error_response(
            TaskErrorCode::StoreUnavailable,
            format!("Task store RPC failed: {e}"),
        ),
    }
}

/// GET /tasks/:task_id/messages - chronological conversation history
pub async fn get_task_messages(
    State(state): State<ApiState>,
    Path(task_id): Path<i64>,
) -> Response {
    // Look the task up first so an unknown id is a 404, not an empty list
    match task_store::get_task(state.app_state.store(), task_id).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return error_response(code_for_store_error(&e), e.to_string()),
        Err(e) => {
            return error_response(
                TaskErrorCode::StoreUnavailable,
                format!("Task store RPC failed: {e}"),
            )
        }
    }

    match task_store::get_task_messages(state.app_state.store(), task_id).await {
        Ok(Ok(messages)) => (StatusCode::OK, Json(messages)).into_response(),
        Ok(Err(e)) => error_response(code_for_store_error(&e), e.to_string()),
        Err(e) => error_response(
            TaskErrorCode::StoreUnavailable,
            format!("Task store RPC failed: {e}"),
        ),
    }
}

/// GET /tasks/:task_id/progress - current TaskProgress projection
pub async fn get_task_progress(
    State(state): State<ApiState>,
    Path(task_id): Path<i64>,
) -> Response {
    match state.app_state.processor().task_progress(task_id).await {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(e) => error_response(code_for_processor_error(&e), e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorError;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(TaskErrorCode::InvalidRequest.as_str(), "INVALID_REQUEST");
        assert_eq!(TaskErrorCode::TaskNotFound.as_str(), "TASK_NOT_FOUND");
        assert_eq!(
            TaskErrorCode::AlreadyProcessing.as_str(),
            "ALREADY_PROCESSING"
        );
    }

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(
            TaskErrorCode::InvalidRequest.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TaskErrorCode::TaskNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            TaskErrorCode::AlreadyProcessing.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            TaskErrorCode::StoreUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            TaskErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_error_mapping() {
        assert_eq!(
            code_for_store_error(&TaskStoreError::TaskNotFound(1)),
            TaskErrorCode::TaskNotFound
        );
        assert_eq!(
            code_for_store_error(&TaskStoreError::Database("locked".to_string())),
            TaskErrorCode::InternalError
        );
    }

    #[test]
    fn test_processor_error_mapping() {
        assert_eq!(
            code_for_processor_error(&ProcessorError::AlreadyProcessing(3)),
            TaskErrorCode::AlreadyProcessing
        );
        assert_eq!(
            code_for_processor_error(&ProcessorError::Store(TaskStoreError::TaskNotFound(3))),
            TaskErrorCode::TaskNotFound
        );
        assert_eq!(
            code_for_processor_error(&ProcessorError::StoreRpc("mailbox closed".to_string())),
            TaskErrorCode::StoreUnavailable
        );
        assert_eq!(
            code_for_processor_error(&ProcessorError::Generator(
                GeneratorError::UpstreamFormat("bad shape".to_string())
            )),
            TaskErrorCode::InternalError
        );
    }
}
