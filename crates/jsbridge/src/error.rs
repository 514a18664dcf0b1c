use crate::value::Value;
use boa_engine::{JsError, JsNativeError};
use thiserror::Error;

/// Errors surfaced by the bridge.
///
/// `Evaluation` carries the value the engine threw (or the reason a promise
/// was rejected with). `RuntimeLimit` is the one engine failure with no
/// script-visible value. Everything else is raised by the bridge itself.
#[derive(Error, Debug)]
pub enum Error {
    #[error("JavaScript exception: {0}")]
    Evaluation(Value),

    #[error("Evaluation error: {0}")]
    EvaluationString(String),

    #[error("Runtime limit exceeded: {0}")]
    RuntimeLimit(String),

    #[error("Missing resource: {0}")]
    MissingResource(String),

    #[error("Failed to load script {url}: {reason}")]
    ScriptLoad { url: String, reason: String },

    #[error("Cannot create ArrayBuffer: {0}")]
    CannotCreateArrayBuffer(String),

    #[error("Async evaluation must return a Promise")]
    AsyncEvalMustReturnPromise,

    #[error("Invalid async promise: `then` is not callable or returned a non-promise")]
    InvalidAsyncPromise,

    #[error("Value is not a function")]
    CallOnNonFunction,

    #[error("Property access on a non-object value")]
    PropertyAccessNonObject,

    #[error("Cannot add an element to a non-array value")]
    AddToNonArray,

    #[error("The owning context has been released")]
    ContextReleased,

    #[error("The engine is busy driving jobs for another caller")]
    ContextBusy,

    #[error("Continuation was dropped without being resumed")]
    ContinuationAbandoned,

    #[error("Invalid resource limits: {0}")]
    InvalidLimits(String),

    #[error("JSON conversion error: {0}")]
    Json(String),
}

impl Error {
    /// Converts a host failure into something JavaScript can catch.
    ///
    /// A thrown value is rethrown as-is; any other error becomes a `TypeError`
    /// carrying the error message.
    pub(crate) fn into_js_error(self) -> JsError {
        match self {
            Error::Evaluation(value) => JsError::from_opaque(value.into_raw()),
            Error::RuntimeLimit(message) => JsNativeError::runtime_limit().with_message(message).into(),
            other => JsNativeError::typ().with_message(other.to_string()).into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returns the message of `err` if the engine aborted on a runtime limit.
///
/// Such errors cannot be handed to scripts, so they must be caught before
/// `JsError::to_opaque` is called on them.
pub(crate) fn runtime_limit_message(err: &JsError) -> Option<String> {
    err.as_native()
        .filter(|native| native.is_runtime_limit())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::JsValue;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::AsyncEvalMustReturnPromise.to_string(),
            "Async evaluation must return a Promise"
        );
        assert_eq!(
            Error::ScriptLoad { url: "a.js".into(), reason: "not found".into() }.to_string(),
            "Failed to load script a.js: not found"
        );
    }

    #[test]
    fn test_host_error_becomes_type_error() {
        let err = Error::CallOnNonFunction.into_js_error();
        let native = err.as_native().expect("host errors map to native errors");
        assert!(native.to_string().contains("Value is not a function"));
    }

    #[test]
    fn test_runtime_limit_is_detected() {
        let limit: JsError = JsNativeError::runtime_limit()
            .with_message("Maximum recursion limit 4 exceeded")
            .into();
        let message = runtime_limit_message(&limit).expect("runtime limit is recognised");
        assert!(message.contains("Maximum recursion limit 4 exceeded"));

        let type_error: JsError = JsNativeError::typ().with_message("nope").into();
        assert!(runtime_limit_message(&type_error).is_none());
        assert!(runtime_limit_message(&JsError::from_opaque(JsValue::new(1))).is_none());
    }

    #[test]
    fn test_runtime_limit_round_trips_as_native() {
        let err = Error::RuntimeLimit("too deep".into()).into_js_error();
        assert!(runtime_limit_message(&err).is_some());
        assert_eq!(
            Error::RuntimeLimit("too deep".into()).to_string(),
            "Runtime limit exceeded: too deep"
        );
    }
}
