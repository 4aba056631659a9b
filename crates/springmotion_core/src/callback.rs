use std::panic::{self, AssertUnwindSafe};

use bevy_platform::sync::Arc;

use crate::error::{DamperError, ErrorHandler};

pub type GetterFn<V> = Arc<dyn Fn() -> V + Send + Sync>;
pub type SetterFn<V> = Arc<dyn Fn(V) + Send + Sync>;
pub type ActionFn = Arc<dyn Fn() + Send + Sync>;

/// User callbacks and callback flags of a single motion.
pub struct DamperCallbacks<V> {
    /// Reads the current value of the animated property.
    pub get_value: GetterFn<V>,
    /// Receives every value the motion produces.
    pub set_value: SetterFn<V>,
    /// Reads the value the motion converges onto.
    pub get_target: GetterFn<V>,
    pub on_complete: Option<ActionFn>,
    pub on_cancel: Option<ActionFn>,
    /// Cancel the motion when one of its callbacks panics.
    pub cancel_on_error: bool,
    /// Do not re-emit the final value while the motion is
    /// [`Delayed`](crate::data::DamperStatus::Delayed).
    pub skip_values_during_delay: bool,
    /// Set while completion callbacks of this motion are running.
    pub(crate) is_callback_running: bool,
}

impl<V> DamperCallbacks<V> {
    pub fn new(
        get_value: GetterFn<V>,
        set_value: SetterFn<V>,
        get_target: GetterFn<V>,
    ) -> Self {
        Self {
            get_value,
            set_value,
            get_target,
            on_complete: None,
            on_cancel: None,
            cancel_on_error: false,
            skip_values_during_delay: true,
            is_callback_running: false,
        }
    }

    #[inline]
    pub fn is_callback_running(&self) -> bool {
        self.is_callback_running
    }
}

/// Runs `f`, turning a panic into a [`DamperError::CallbackFault`].
pub fn catch_fault<R>(f: impl FnOnce() -> R) -> Result<R, DamperError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(DamperError::from_panic)
}

/// Runs `f` and routes a fault to `handler`.
///
/// Returns the value of `f` or [`None`] if it panicked.
pub fn invoke_guarded<R>(
    handler: &ErrorHandler,
    f: impl FnOnce() -> R,
) -> Option<R> {
    match catch_fault(f) {
        Ok(value) => Some(value),
        Err(err) => {
            report(handler, &err);
            None
        }
    }
}

/// Hands `err` to `handler`, a panicking handler is only logged.
pub fn report(handler: &ErrorHandler, err: &DamperError) {
    if catch_fault(|| handler(err)).is_err() {
        tracing::error!(
            "Motion error handler panicked while handling: {err}"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn faults_reach_the_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler: ErrorHandler = {
            let seen = seen.clone();
            Arc::new(move |err: &DamperError| {
                seen.lock().unwrap().push(err.clone());
            })
        };

        assert_eq!(invoke_guarded(&handler, || 5), Some(5));
        assert_eq!(invoke_guarded(&handler, || panic!("oops")), None::<()>);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![DamperError::CallbackFault {
                message: "oops".into()
            }]
        );
    }

    #[test]
    fn panicking_handler_is_contained() {
        let handler: ErrorHandler =
            Arc::new(|_: &DamperError| panic!("handler"));

        let result = invoke_guarded(&handler, || panic!("callback"));
        assert_eq!(result, None::<()>);
    }
}
