//! Hotkey callbacks and how their failures are reported

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A callback as stored in the registry
pub(crate) type Callback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Receives failures of one hotkey's callback
pub type ErrorHandler = Arc<dyn Fn(&CallbackError) + Send + Sync>;

/// What a callback may return: nothing, or a `Result` whose error is reported
pub trait CallbackOutput {
    fn into_result(self) -> anyhow::Result<()>;
}

impl CallbackOutput for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> CallbackOutput for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// A callback failed while being dispatched
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("callback for `{combo}` failed: {source:#}")]
    Failed {
        combo: String,
        source: anyhow::Error,
    },

    #[error("callback for `{combo}` panicked: {message}")]
    Panicked { combo: String, message: String },
}

impl CallbackError {
    pub fn combo(&self) -> &str {
        match self {
            CallbackError::Failed { combo, .. } | CallbackError::Panicked { combo, .. } => combo,
        }
    }
}

pub(crate) fn from_fn<F, O>(callback: F) -> Callback
where
    F: Fn() -> O + Send + Sync + 'static,
    O: CallbackOutput,
{
    Arc::new(move || callback().into_result())
}

/// Run a callback, turning errors and panics into a [`CallbackError`]
pub(crate) fn invoke(combo: &str, callback: &Callback) -> Result<(), CallbackError> {
    match panic::catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(CallbackError::Failed {
            combo: combo.to_string(),
            source,
        }),
        Err(payload) => Err(CallbackError::Panicked {
            combo: combo.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
