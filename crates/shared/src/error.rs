use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    PayloadTooLarge,
    Validation,
    RateLimited,
    Internal,
    Unavailable,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            413 => Self::PayloadTooLarge,
            429 => Self::RateLimited,
            502..=504 => Self::Unavailable,
            400..=499 => Self::Validation,
            _ => Self::Internal,
        }
    }
}

/// Error body returned by the service on non-success statuses.
///
/// `detail` is a plain string for handled errors and a list of field
/// errors when request validation fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
}

impl ErrorBody {
    /// Human-readable detail, or `None` when the body carries nothing usable.
    pub fn message(&self) -> Option<String> {
        let message = match self.detail.as_ref()? {
            ErrorDetail::Message(message) => message.trim().to_string(),
            ErrorDetail::Fields(fields) => fields
                .iter()
                .map(|field| field.msg.trim())
                .filter(|msg| !msg.is_empty())
                .collect::<Vec<_>>()
                .join("; "),
            ErrorDetail::Other(_) => String::new(),
        };
        (!message.is_empty()).then_some(message)
    }
}
