use thiserror::Error;

/// Errors surfaced by the widget loader.
///
/// Display strings are what host-page code sees as the rejection message of
/// `EticAI.init()`, so they stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// Caller-supplied configuration failed validation.
    #[error("Invalid configuration: {}", .0.join(", "))]
    InvalidConfig(Vec<String>),

    /// The page origin is not in `allowedOrigins`.
    #[error("Origin not allowed: {0}")]
    OriginNotAllowed(String),

    /// The bundle did not finish loading within the script timeout.
    #[error("Widget script load timeout")]
    ScriptTimeout,

    /// The `<script>` element fired `onerror`.
    #[error("Failed to load ETIC AI Widget script")]
    ScriptFailed,

    /// The bundle loaded but did not expose the widget class.
    #[error("ETIC AI Widget class not found")]
    WidgetClassMissing,

    /// The iframe fallback could not be mounted.
    #[error("Failed to create iframe widget: {0}")]
    Iframe(String),

    /// A newer `init()` or a `destroy()` superseded this load attempt.
    #[error("Widget load cancelled")]
    Cancelled,

    /// A second loader was constructed for the same page.
    #[error("ETIC AI Widget loader is already installed")]
    AlreadyInstalled,

    /// The host environment rejected an operation (DOM or JS exception).
    #[error("Host error: {0}")]
    Host(String),
}

impl LoaderError {
    /// Whether another load attempt may succeed where this one failed.
    ///
    /// Configuration errors, origin denials and cancellations fail fast.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoaderError::ScriptTimeout
                | LoaderError::ScriptFailed
                | LoaderError::WidgetClassMissing
                | LoaderError::Iframe(_)
                | LoaderError::Host(_)
        )
    }

    /// Whether a script-path failure should route to the iframe fallback.
    pub fn is_script_failure(&self) -> bool {
        matches!(self, LoaderError::ScriptTimeout | LoaderError::ScriptFailed)
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
