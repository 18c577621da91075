use std::fmt;

use crate::feature::FeatureKind;

#[derive(Debug, Clone, PartialEq)]
pub enum AutomationError {
    /// Parse, top-level execution or version failure while loading a script.
    ScriptLoad(String),
    /// Malformed `register_macro`/`register_filter` call.
    Registration(String),
    /// Registry lookup outside the registered range.
    InvalidIndex { index: usize, len: usize },
    /// Lookup found a feature of the other kind.
    WrongKind { index: usize, expected: FeatureKind },
    /// Session has no live runtime (failed or unloaded).
    NotReady,
    /// Document handle used after processing completed.
    StaleHandle,
    /// Write through a read-only document handle.
    ReadOnly,
    /// A previous invocation is still running on this runtime.
    Busy,
    /// Any other runtime failure on the host side.
    Runtime(String),
}

impl fmt::Display for AutomationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScriptLoad(msg) => write!(f, "{msg}"),
            Self::Registration(msg) => write!(f, "{msg}"),
            Self::InvalidIndex { index, len } => {
                write!(f, "feature index {index} out of range (0..{len})")
            }
            Self::WrongKind { index, expected } => {
                write!(f, "feature {index} is not a {expected}")
            }
            Self::NotReady => write!(f, "script is not loaded"),
            Self::StaleHandle => write!(f, "stale document handle: processing already completed"),
            Self::ReadOnly => write!(f, "document is read-only"),
            Self::Busy => write!(f, "a previous invocation is still running"),
            Self::Runtime(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for AutomationError {}

impl From<mlua::Error> for AutomationError {
    fn from(e: mlua::Error) -> Self {
        Self::Runtime(format_lua_error(&e))
    }
}

impl From<AutomationError> for mlua::Error {
    fn from(e: AutomationError) -> Self {
        mlua::Error::RuntimeError(e.to_string())
    }
}

/// Format a Lua error for display.
pub fn format_lua_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        _ => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_error_unwraps_cause() {
        let inner = mlua::Error::RuntimeError("boom".to_string());
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack".to_string(),
            cause: std::sync::Arc::new(inner),
        };
        assert_eq!(format_lua_error(&wrapped), "boom");
    }

    #[test]
    fn test_round_trip_through_lua_error() {
        let err: mlua::Error = AutomationError::ReadOnly.into();
        assert_eq!(format_lua_error(&err), "document is read-only");
    }
}
