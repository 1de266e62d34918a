//! Errores tipados del flujo de triaje.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("malformed stored issue: {0}")]
    Malformed(String),
}

/// Fallo de la llamada de clasificación, separado por causa.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classification timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("classification provider rate limited the request: {0}")]
    RateLimited(String),

    #[error("classification provider failed: {0}")]
    Upstream(String),

    #[error("classification provider returned an empty completion")]
    EmptyCompletion,
}

impl ClassificationError {
    /// Clasifica un mensaje de error del proveedor. Los 429 se distinguen
    /// del resto por el texto, ya que el proveedor no expone el código.
    pub fn from_provider_message(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
            Self::RateLimited(message)
        } else {
            Self::Upstream(message)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::Upstream(_) => "upstream",
            Self::EmptyCompletion => "empty_completion",
        }
    }
}

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("Description missing")]
    EmptyDescription,

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TriageError {
    /// Errores de validación: se rechazan antes de cualquier llamada externa.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyDescription | Self::InvalidLocation(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyDescription | Self::InvalidLocation(_) => "validation",
            Self::Classification(e) => e.kind(),
            Self::Store(_) => "store",
        }
    }
}
