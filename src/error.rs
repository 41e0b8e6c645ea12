//! Unified error types for the interpreter bridge.

use std::path::PathBuf;

/// Main error type for bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The interpreter shared library could not be opened.
    #[error("failed to load interpreter library {path}: {reason}")]
    LibraryLoad { path: PathBuf, reason: String },

    /// A required C-API symbol is absent from the loaded library.
    #[error("interpreter symbol '{0}' not found")]
    MissingSymbol(String),

    /// The interpreter did not report itself initialized after init.
    #[error("interpreter initialization failed: {0}")]
    InitializeFailed(String),

    /// The runner module could not be imported.
    #[error("failed to import module '{module}': {reason}")]
    ImportFailed { module: String, reason: String },

    /// A call into the runner module failed (missing function, not
    /// callable, argument construction failed, or the call raised).
    #[error("python call '{function}' failed: {reason}")]
    PythonCall { function: String, reason: String },

    /// A synthesis call returned something other than a bytes object.
    #[error("'{function}' returned a non-bytes value")]
    InvalidSynthesisReturnType { function: String },

    /// `initialize` was called on an already-initialized bridge.
    #[error("bridge is already initialized")]
    AlreadyInitialized,

    /// An operation requires `initialize` first.
    #[error("bridge is not initialized")]
    NotInitialized,

    /// An operation requires `import_module` first.
    #[error("runner module is not loaded")]
    ModuleNotLoaded,

    /// No model could be made available for synthesis.
    #[error("no model is loaded: {0}")]
    ModelNotLoaded(String),

    /// The synthesis request violates a mode invariant.
    #[error("invalid synthesis request: {0}")]
    InvalidRequest(String),
}

/// Convenience type alias for Results with BridgeError.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Create a python-call error for the given function with a reason.
    pub fn python_call(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PythonCall {
            function: function.into(),
            reason: reason.into(),
        }
    }

    /// Create an import error with a reason.
    pub fn import(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImportFailed {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-request error with message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an initialization error with message.
    pub fn initialize(msg: impl Into<String>) -> Self {
        Self::InitializeFailed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::MissingSymbol("Py_InitializeEx".to_string());
        assert_eq!(err.to_string(), "interpreter symbol 'Py_InitializeEx' not found");

        let err = BridgeError::python_call("load_model", "call raised");
        assert_eq!(err.to_string(), "python call 'load_model' failed: call raised");

        let err = BridgeError::InvalidSynthesisReturnType {
            function: "synthesize_voice_design".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "'synthesize_voice_design' returned a non-bytes value"
        );
    }

    #[test]
    fn test_error_constructors() {
        let err = BridgeError::import("qwen_tts_runner", "No module named 'torch'");
        assert!(matches!(err, BridgeError::ImportFailed { .. }));

        let err = BridgeError::invalid_request("text must not be blank");
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
    }
}
