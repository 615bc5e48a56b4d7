//! Prediction workflow controller: image selection, prediction and explanation
//! state for a single user session.
//!
//! The controller never performs I/O. [`WorkflowController::predict`] and
//! [`WorkflowController::explain`] hand back a [`PendingRequest`] for the
//! caller to execute (see [`execute`]); the outcome is fed back through
//! [`WorkflowController::apply`]. Every request carries a [`Ticket`], and a
//! completion is applied only if the controller is still waiting on that
//! exact ticket, so a late response for a superseded selection is dropped.

use std::fmt;

use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    image::{ImageError, SelectedImage, DEFAULT_MAX_UPLOAD_BYTES},
    model::{ExplanationResult, PredictionResult},
    ImageSource, PlantService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Connectivity,
    Service,
    InvalidResponse,
}

/// Failure recorded in controller state; always carries a displayable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowError {
    category: ErrorCategory,
    message: String,
}

impl WorkflowError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Something went wrong. Please try again.".to_string()
        } else {
            message
        };
        Self { category, message }
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&ClientError> for WorkflowError {
    fn from(err: &ClientError) -> Self {
        let category = match err {
            ClientError::Image(_)
            | ClientError::Validation(_)
            | ClientError::InvalidEndpoint { .. }
            | ClientError::HttpSetup(_) => ErrorCategory::Validation,
            ClientError::Connectivity { .. } => ErrorCategory::Connectivity,
            ClientError::Service { .. } => ErrorCategory::Service,
            ClientError::InvalidResponse { .. } => ErrorCategory::InvalidResponse,
        };
        Self::new(category, err.user_message())
    }
}

impl From<ClientError> for WorkflowError {
    fn from(err: ClientError) -> Self {
        Self::from(&err)
    }
}

impl From<ImageError> for WorkflowError {
    fn from(err: ImageError) -> Self {
        Self::new(ErrorCategory::Validation, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExplanationStatus {
    NotRequested,
    Available(ExplanationResult),
    Failed(WorkflowError),
}

#[derive(Debug, Clone, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    Ready {
        image: SelectedImage,
    },
    Predicting {
        image: SelectedImage,
        ticket: Ticket,
    },
    Predicted {
        image: SelectedImage,
        prediction: PredictionResult,
        explanation: ExplanationStatus,
    },
    Explaining {
        image: SelectedImage,
        prediction: PredictionResult,
        ticket: Ticket,
    },
    Error {
        image: SelectedImage,
        error: WorkflowError,
    },
}

/// Payload-free view of [`WorkflowState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Ready,
    Predicting,
    Predicted,
    Explaining,
    Error,
}

impl WorkflowState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Ready { .. } => Phase::Ready,
            Self::Predicting { .. } => Phase::Predicting,
            Self::Predicted { .. } => Phase::Predicted,
            Self::Explaining { .. } => Phase::Explaining,
            Self::Error { .. } => Phase::Error,
        }
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        match self {
            Self::Idle => None,
            Self::Ready { image }
            | Self::Predicting { image, .. }
            | Self::Predicted { image, .. }
            | Self::Explaining { image, .. }
            | Self::Error { image, .. } => Some(image),
        }
    }

    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            Self::Predicted { prediction, .. } | Self::Explaining { prediction, .. } => {
                Some(prediction)
            }
            _ => None,
        }
    }

    pub fn in_flight(&self) -> Option<Ticket> {
        match self {
            Self::Predicting { ticket, .. } | Self::Explaining { ticket, .. } => Some(*ticket),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutcome {
    Accepted,
    /// Dropped payload was not a usable image; nothing changed.
    Ignored,
    /// Picked file was not a usable image; nothing changed but the notice.
    Rejected(WorkflowError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Predict,
    Explain,
}

/// Remote call the caller must execute on the controller's behalf.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub ticket: Ticket,
    pub kind: RequestKind,
    pub image: SelectedImage,
}

#[derive(Debug)]
pub enum Completion {
    Prediction {
        ticket: Ticket,
        result: Result<PredictionResult, WorkflowError>,
    },
    Explanation {
        ticket: Ticket,
        result: Result<ExplanationResult, WorkflowError>,
    },
}

impl Completion {
    pub fn ticket(&self) -> Ticket {
        match self {
            Self::Prediction { ticket, .. } | Self::Explanation { ticket, .. } => *ticket,
        }
    }
}

/// Runs `request` against `service`. Failures are folded into the completion.
pub async fn execute(service: &dyn PlantService, request: &PendingRequest) -> Completion {
    match request.kind {
        RequestKind::Predict => Completion::Prediction {
            ticket: request.ticket,
            result: service
                .predict(&request.image)
                .await
                .map_err(WorkflowError::from),
        },
        RequestKind::Explain => Completion::Explanation {
            ticket: request.ticket,
            result: service
                .explain(&request.image)
                .await
                .map_err(WorkflowError::from),
        },
    }
}

#[derive(Debug)]
pub struct WorkflowController {
    state: WorkflowState,
    next_ticket: u64,
    max_upload_bytes: usize,
    last_rejection: Option<WorkflowError>,
}

impl Default for WorkflowController {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowController {
    pub fn new() -> Self {
        Self::with_max_upload_bytes(DEFAULT_MAX_UPLOAD_BYTES)
    }

    pub fn with_max_upload_bytes(max_upload_bytes: usize) -> Self {
        Self {
            state: WorkflowState::Idle,
            next_ticket: 1,
            max_upload_bytes,
            last_rejection: None,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        self.state.image()
    }

    pub fn prediction(&self) -> Option<&PredictionResult> {
        self.state.prediction()
    }

    pub fn explanation(&self) -> Option<&ExplanationResult> {
        match &self.state {
            WorkflowState::Predicted {
                explanation: ExplanationStatus::Available(explanation),
                ..
            } => Some(explanation),
            _ => None,
        }
    }

    pub fn has_explanation(&self) -> bool {
        self.explanation().is_some()
    }

    /// Failure of the last predict or explain attempt, if it is still current.
    pub fn error(&self) -> Option<&WorkflowError> {
        match &self.state {
            WorkflowState::Error { error, .. }
            | WorkflowState::Predicted {
                explanation: ExplanationStatus::Failed(error),
                ..
            } => Some(error),
            _ => None,
        }
    }

    /// Why the most recent picker selection was refused.
    pub fn last_rejection(&self) -> Option<&WorkflowError> {
        self.last_rejection.as_ref()
    }

    /// Short progress line for the current phase.
    pub fn status_label(&self) -> &'static str {
        match &self.state {
            WorkflowState::Idle => "Select a leaf photo to begin",
            WorkflowState::Ready { .. } => "Ready to identify",
            WorkflowState::Predicting { .. } => "Analyzing leaf structure...",
            WorkflowState::Predicted {
                explanation: ExplanationStatus::Available(_),
                ..
            } => "Identification explained",
            WorkflowState::Predicted { prediction, .. } if !prediction.is_recognized() => {
                "Not a recognized medicinal plant"
            }
            WorkflowState::Predicted { .. } => "Identification complete",
            WorkflowState::Explaining { .. } => "Generating explanation...",
            WorkflowState::Error { .. } => "Identification failed",
        }
    }

    pub fn can_predict(&self) -> bool {
        matches!(self.phase(), Phase::Ready | Phase::Error)
    }

    pub fn can_explain(&self) -> bool {
        self.phase() == Phase::Predicted
    }

    pub fn select_image(&mut self, image: SelectedImage) -> SelectOutcome {
        if let Err(err) = image.validate(self.max_upload_bytes) {
            return match image.source() {
                ImageSource::Drop => {
                    debug!(file = image.file_name(), "ignoring dropped file: {err}");
                    SelectOutcome::Ignored
                }
                ImageSource::Picker => {
                    warn!(file = image.file_name(), "rejecting picked file: {err}");
                    let rejection = WorkflowError::from(err);
                    self.last_rejection = Some(rejection.clone());
                    SelectOutcome::Rejected(rejection)
                }
            };
        }

        if let Some(ticket) = self.state.in_flight() {
            debug!(%ticket, "new selection supersedes in-flight request");
        }
        info!(
            file = image.file_name(),
            content_type = image.content_type(),
            size_bytes = image.len(),
            "image selected"
        );
        self.last_rejection = None;
        self.state = WorkflowState::Ready { image };
        SelectOutcome::Accepted
    }

    /// Starts a prediction from `Ready`, or retries one from `Error`.
    pub fn predict(&mut self) -> Option<PendingRequest> {
        match std::mem::take(&mut self.state) {
            WorkflowState::Ready { image } | WorkflowState::Error { image, .. } => {
                let ticket = self.issue_ticket();
                debug!(%ticket, file = image.file_name(), "prediction requested");
                self.state = WorkflowState::Predicting {
                    image: image.clone(),
                    ticket,
                };
                Some(PendingRequest {
                    ticket,
                    kind: RequestKind::Predict,
                    image,
                })
            }
            other => {
                debug!(phase = ?other.phase(), "predict ignored");
                self.state = other;
                None
            }
        }
    }

    pub fn explain(&mut self) -> Option<PendingRequest> {
        match std::mem::take(&mut self.state) {
            WorkflowState::Predicted {
                image, prediction, ..
            } => {
                let ticket = self.issue_ticket();
                debug!(%ticket, file = image.file_name(), "explanation requested");
                self.state = WorkflowState::Explaining {
                    image: image.clone(),
                    prediction,
                    ticket,
                };
                Some(PendingRequest {
                    ticket,
                    kind: RequestKind::Explain,
                    image,
                })
            }
            other => {
                debug!(phase = ?other.phase(), "explain ignored");
                self.state = other;
                None
            }
        }
    }

    /// Returns whether the completion matched the awaited request.
    pub fn apply(&mut self, completion: Completion) -> bool {
        match completion {
            Completion::Prediction { ticket, result } => self.complete_prediction(ticket, result),
            Completion::Explanation { ticket, result } => {
                self.complete_explanation(ticket, result)
            }
        }
    }

    pub fn complete_prediction(
        &mut self,
        ticket: Ticket,
        result: Result<PredictionResult, WorkflowError>,
    ) -> bool {
        match std::mem::take(&mut self.state) {
            WorkflowState::Predicting {
                image,
                ticket: awaited,
            } if awaited == ticket => {
                self.state = match result {
                    Ok(prediction) => WorkflowState::Predicted {
                        image,
                        prediction,
                        explanation: ExplanationStatus::NotRequested,
                    },
                    Err(error) => {
                        warn!(%ticket, category = ?error.category(), "prediction failed: {error}");
                        WorkflowState::Error { image, error }
                    }
                };
                true
            }
            other => {
                debug!(%ticket, phase = ?other.phase(), "discarding stale prediction response");
                self.state = other;
                false
            }
        }
    }

    pub fn complete_explanation(
        &mut self,
        ticket: Ticket,
        result: Result<ExplanationResult, WorkflowError>,
    ) -> bool {
        match std::mem::take(&mut self.state) {
            WorkflowState::Explaining {
                image,
                prediction,
                ticket: awaited,
            } if awaited == ticket => {
                let explanation = match result {
                    Ok(explanation) => ExplanationStatus::Available(explanation),
                    Err(error) => {
                        warn!(%ticket, category = ?error.category(), "explanation failed: {error}");
                        ExplanationStatus::Failed(error)
                    }
                };
                self.state = WorkflowState::Predicted {
                    image,
                    prediction,
                    explanation,
                };
                true
            }
            other => {
                debug!(%ticket, phase = ?other.phase(), "discarding stale explanation response");
                self.state = other;
                false
            }
        }
    }

    /// Drops the selection and everything derived from it.
    pub fn clear(&mut self) {
        self.state = WorkflowState::Idle;
        self.last_rejection = None;
    }

    fn issue_ticket(&mut self) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
