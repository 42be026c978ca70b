use thiserror::Error;

/// Status code carried by an application error when the session has expired
/// and the caller must authenticate again.
pub const UNAUTHORIZED: i32 = 401;
/// Status code replied when the requested action is not registered.
pub const NOT_FOUND: i32 = 404;
/// Status code replied when a handler failed without an application code.
pub const INTERNAL_ERROR: i32 = 500;

#[derive(Error, Debug)]
pub enum ApiRpcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Api error {code}: {message}")]
    Api { code: i32, message: String },

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("[{action}] timed out")]
    TimedOut {
        action: String,
        #[source]
        source: Box<ApiRpcError>,
    },

    #[error("Pool acquisition timed out after {0}ms")]
    PoolTimeout(u64),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Action not found: {0}")]
    ActionNotFound(String),
}

impl ApiRpcError {
    /// Creates an application error with the given status code.
    pub fn api(code: i32, message: impl Into<String>) -> Self {
        ApiRpcError::Api {
            code,
            message: message.into(),
        }
    }

    /// Wraps a timeout with the name of the action that timed out.
    pub fn timed_out(action: impl Into<String>, source: ApiRpcError) -> Self {
        ApiRpcError::TimedOut {
            action: action.into(),
            source: Box::new(source),
        }
    }

    /// The server processed and rejected the call.
    pub fn is_application(&self) -> bool {
        matches!(self, ApiRpcError::Api { .. })
    }

    /// Application error signalling an expired session (code 401).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiRpcError::Api { code, .. } if *code == UNAUTHORIZED)
    }

    /// Failure that means the request never reached the server logic.
    ///
    /// Only these errors trigger failover to another connection; everything
    /// else may already have had a server-side effect.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiRpcError::Connection(_) | ApiRpcError::Transport(_) | ApiRpcError::Io(_)
        )
    }

    /// The wait for a reply was cut short by a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiRpcError::Timeout(_) | ApiRpcError::TimedOut { .. })
    }

    /// Status code for replying to a remote caller with this error.
    pub fn status_code(&self) -> i32 {
        match self {
            ApiRpcError::Api { code, .. } => *code,
            ApiRpcError::ActionNotFound(_) => NOT_FOUND,
            _ => INTERNAL_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiRpcError>;
