use thiserror::Error;

/// Failure of a collaborator call. Every external service the core talks to
/// (catalog, cart, geocoding, directory, sessions, messaging, payments)
/// surfaces through this one transient shape: the turn aborts, no state is
/// persisted, and the user retries by resending their last input.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("{service} request failed: {detail}")]
    Transient { service: &'static str, detail: String },
}

impl PortError {
    pub fn transient(service: &'static str, detail: impl Into<String>) -> Self {
        Self::Transient { service, detail: detail.into() }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::Transient { service, .. } => service,
        }
    }
}

/// Error surfaced by one dispatch turn.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error(transparent)]
    Collaborator(#[from] PortError),
}
