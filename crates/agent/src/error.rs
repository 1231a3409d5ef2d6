//! Errors surfaced by the agent loop and its middleware.

use thiserror::Error;
use wayfinder_core::error::ProviderError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Every model in the purpose's chain failed over or is cooling down.
    #[error("No model available for '{purpose}' after {attempts} attempt(s): {last_error}")]
    ModelUnavailable {
        purpose: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Conversation {0} has no pending confirmation to resume")]
    NothingToResume(String),

    #[error("Conversation {0} is waiting for confirmation; resume it before starting a new turn")]
    AwaitingConfirmation(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Core(wayfinder_core::Error),
}

impl From<wayfinder_core::Error> for AgentError {
    fn from(err: wayfinder_core::Error) -> Self {
        match err {
            wayfinder_core::Error::ModelUnavailable {
                purpose,
                attempts,
                last_error,
            } => Self::ModelUnavailable {
                purpose,
                attempts,
                last_error,
            },
            wayfinder_core::Error::Provider(e) => Self::Provider(e),
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_exhaustion_maps_to_model_unavailable() {
        let err: AgentError = wayfinder_core::Error::ModelUnavailable {
            purpose: "tool_calling".into(),
            attempts: 2,
            last_error: "rate limited".into(),
        }
        .into();
        assert!(matches!(err, AgentError::ModelUnavailable { attempts: 2, .. }));
        assert!(err.to_string().contains("tool_calling"));
    }

    #[test]
    fn provider_errors_keep_their_variant() {
        let err: AgentError =
            wayfinder_core::Error::Provider(ProviderError::AuthenticationFailed("bad key".into())).into();
        assert!(matches!(err, AgentError::Provider(ProviderError::AuthenticationFailed(_))));
    }
}
