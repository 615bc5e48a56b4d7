//! Command orchestration helpers from user actions to the backend command queue.

use client_core::workflow::{
    Completion, ErrorCategory, PendingRequest, RequestKind, WorkflowController, WorkflowError,
};
use crossbeam_channel::{Sender, TrySendError};

use crate::backend_bridge::commands::BackendCommand;

/// Queues `cmd` without blocking. On failure `status` explains why and
/// `false` is returned.
pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
    status: &mut String,
) -> bool {
    let cmd_name = cmd.name();

    match cmd_tx.try_send(cmd) {
        Ok(()) => {
            tracing::debug!(command = cmd_name, "queued ui->backend command");
            true
        }
        Err(TrySendError::Full(_)) => {
            *status = "Command queue is full; please retry".to_string();
            false
        }
        Err(TrySendError::Disconnected(_)) => {
            *status = "Backend worker is not running (possible startup failure)".to_string();
            false
        }
    }
}

/// Hands a controller request to the backend. If it cannot be queued the
/// request is failed immediately so the controller never waits on it.
pub fn issue_request(
    controller: &mut WorkflowController,
    cmd_tx: &Sender<BackendCommand>,
    request: PendingRequest,
) {
    let ticket = request.ticket;
    let kind = request.kind;
    let mut status = String::new();
    if dispatch_backend_command(cmd_tx, BackendCommand::Workflow(request), &mut status) {
        return;
    }

    tracing::warn!(%ticket, "failed to queue request: {status}");
    let error = WorkflowError::new(ErrorCategory::Connectivity, status);
    let completion = match kind {
        RequestKind::Predict => Completion::Prediction {
            ticket,
            result: Err(error),
        },
        RequestKind::Explain => Completion::Explanation {
            ticket,
            result: Err(error),
        },
    };
    controller.apply(completion);
}
