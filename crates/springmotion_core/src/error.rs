use core::any::Any;

use bevy_platform::sync::Arc;
use thiserror::Error;

use crate::handle::DamperHandle;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DamperError {
    #[error("motion {0:?} has been destroyed or no longer exists")]
    InvalidHandle(DamperHandle),
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        name: &'static str,
        reason: &'static str,
    },
    #[error("recursion of complete call was detected")]
    RecursiveComplete,
    #[error("the `{0}` callback was not provided")]
    NullCallback(&'static str),
    #[error("motion callback panicked: {message}")]
    CallbackFault { message: String },
}

impl DamperError {
    /// Builds a [`DamperError::CallbackFault`] from a caught panic
    /// payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };

        Self::CallbackFault { message }
    }
}

/// Receives every error raised by motion callbacks.
pub type ErrorHandler = Arc<dyn Fn(&DamperError) + Send + Sync>;

/// The handler installed on new dispatchers, logs the error.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &DamperError| {
        tracing::error!("Unhandled motion error: {err}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let err = DamperError::from_panic(Box::new("boom"));
        assert_eq!(
            err,
            DamperError::CallbackFault {
                message: "boom".into()
            }
        );

        let err = DamperError::from_panic(Box::new(String::from("bang")));
        assert_eq!(err.to_string(), "motion callback panicked: bang");

        let err = DamperError::from_panic(Box::new(42_u8));
        assert!(matches!(err, DamperError::CallbackFault { .. }));
    }
}
