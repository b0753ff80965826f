/// Error types for tokenization, provider dispatch and persistence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// The link scheme list is missing or empty
    #[error("Invalid link schemes configuration: {0}")]
    InvalidLinkSchemes(String),
    /// A tokenizer pattern could not be built
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    /// A language code is empty or contains unsupported characters
    #[error("Invalid locale: {0}")]
    InvalidLocale(String),
    /// The translation provider failed (network, vendor or quota error)
    #[error("Provider error: {0}")]
    ProviderError(String),
    /// A persistence collaborator failed
    #[error("Store error: {0}")]
    StoreError(String),
    /// Configuration is present but unusable
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Message not found: {0}")]
    MessageNotFound(String),
}

/// Result type for translation operations
pub type TranslateResult<T> = Result<T, TranslateError>;
