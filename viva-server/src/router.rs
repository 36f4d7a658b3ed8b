use viva_core::ipc::{VivaRequest, VivaResponse};

use crate::subsystems::interview::InterviewOrchestrator;

/// Dispatch an IPC request to the orchestrator.
pub async fn handle_request(
    request: VivaRequest,
    orchestrator: &InterviewOrchestrator,
) -> VivaResponse {
    match request {
        VivaRequest::Ping => VivaResponse::pong(),
        VivaRequest::Health => VivaResponse::ok(serde_json::json!({"status": "healthy"})),
        VivaRequest::StageResume {
            identity,
            resume_text,
        } => match orchestrator.stage_resume(&identity, &resume_text).await {
            Ok(()) => VivaResponse::ok(serde_json::json!({"staged": true})),
            Err(e) => VivaResponse::err(e.to_string()),
        },
        VivaRequest::Start { identity } => match orchestrator.start(&identity).await {
            Ok(outcome) => to_ok(&outcome),
            Err(e) => VivaResponse::err(e.to_string()),
        },
        VivaRequest::Next { identity, answer } => {
            match orchestrator.next(&identity, &answer).await {
                Ok(outcome) => to_ok(&outcome),
                Err(e) => VivaResponse::err(e.to_string()),
            }
        }
        VivaRequest::End { identity } => match orchestrator.end(&identity).await {
            Ok(outcome) => to_ok(&outcome),
            Err(e) => VivaResponse::err(e.to_string()),
        },
        VivaRequest::Active { identity } => match orchestrator.active(&identity).await {
            Ok(outcome) => to_ok(&outcome),
            Err(e) => VivaResponse::err(e.to_string()),
        },
        VivaRequest::Reset { identity } => match orchestrator.reset(&identity).await {
            Ok(outcome) => to_ok(&outcome),
            Err(e) => VivaResponse::err(e.to_string()),
        },
    }
}

fn to_ok<T: serde::Serialize>(value: &T) -> VivaResponse {
    match serde_json::to_value(value) {
        Ok(data) => VivaResponse::ok(data),
        Err(e) => VivaResponse::err(format!("Serialization error: {e}")),
    }
}
