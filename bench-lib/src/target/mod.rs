//! The target-service collaborator: the remote endpoint under test.
//!
//! A [`Target`] only has to send one prompt and hand back the responses.
//! Failure is signalled with a [`TargetError`] value, never with a panic,
//! so that a [`RequestWorker`](crate::worker::RequestWorker) can turn it
//! into a failed [`Outcome`](crate::outcome::Outcome).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::Metadata;

mod http;
mod mock;

pub use self::{
    http::HttpTarget,
    mock::{MockConfig, MockTarget},
};

/// Prompt sent by every worker, shared across the whole search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for PromptRequest {
    fn default() -> Self {
        Self {
            prompt: "Why do crabs walk sideways?".to_owned(),
            max_tokens: 512,
            temperature: 0.8,
        }
    }
}

pub trait Target: Send + Sync + 'static {
    /// Send one prompt and collect every response the target yields.
    fn send_prompt(
        &self,
        request: &PromptRequest,
    ) -> impl Future<Output = Result<Vec<String>, TargetError>> + Send;

    /// Identity and configuration of the target, attached to every sample.
    fn metadata(&self) -> Metadata {
        Metadata::new()
    }
}

/// The target could not serve a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The service is unavailable or refused to produce a response.
    Unavailable(String),
    /// The service answered with a non-success status code.
    Status(u16),
    /// The service answered but the payload could not be read.
    InvalidResponse(String),
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Unavailable(reason) => write!(f, "target unavailable: {reason}"),
            TargetError::Status(code) => write!(f, "target returned status {code}"),
            TargetError::InvalidResponse(reason) => {
                write!(f, "target returned invalid response: {reason}")
            }
        }
    }
}

impl std::error::Error for TargetError {}
