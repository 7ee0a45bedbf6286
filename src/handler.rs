//! Channel handlers.
//!
//! A [`Handler`] is a shared reference to a caller-supplied callback. Cloning
//! it clones the reference, not the callback, and two handlers are "the same
//! handler" exactly when they are clones of one another. The registry relies
//! on that identity to deduplicate registrations and to find the entry to
//! remove in `off`.
//!
//! Registering a handler stores a reference to it until it is deregistered
//! or the owning [`Channels`](crate::Channels) instance is disposed. Anything
//! the callback captures lives at least that long.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked with every failure isolated during dispatch.
pub type FailureHook = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

type Callback = dyn Fn(&Value) -> Result<(), HandlerError> + Send + Sync;

/// Return values a handler callback may produce.
///
/// Implemented for `()` (infallible handlers) and for `Result<(), E>` where
/// `E` converts into a [`HandlerError`].
pub trait HandlerOutcome {
    fn into_outcome(self) -> Result<(), HandlerError>;
}

impl HandlerOutcome for () {
    fn into_outcome(self) -> Result<(), HandlerError> {
        Ok(())
    }
}

impl<E> HandlerOutcome for Result<(), E>
where
    E: Into<HandlerError>,
{
    fn into_outcome(self) -> Result<(), HandlerError> {
        self.map_err(Into::into)
    }
}

/// Process-unique handler identifier, used in logs and failure reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HandlerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

struct Inner {
    id: HandlerId,
    callback: Box<Callback>,
}

/// A shared, invocable channel handler.
///
/// # Example
///
/// ```
/// use mom_channels::Handler;
///
/// let greet = Handler::new(|payload: &serde_json::Value| {
///     println!("greeting: {payload}");
/// });
///
/// // Clones are the same handler.
/// assert!(greet.same_as(&greet.clone()));
/// assert!(!greet.same_as(&Handler::new(|_: &serde_json::Value| {})));
/// ```
#[derive(Clone)]
pub struct Handler {
    inner: Arc<Inner>,
}

impl Handler {
    /// Wrap a callback that receives the raw JSON payload.
    pub fn new<F, R>(callback: F) -> Self
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: HandlerOutcome,
    {
        // ---
        Self::from_callback(Box::new(move |payload: &Value| {
            callback(payload).into_outcome()
        }))
    }

    /// Wrap a callback that receives the payload deserialized into `T`.
    ///
    /// A payload that does not deserialize into `T` is reported as a failure
    /// of this handler; other handlers on the channel still run.
    pub fn typed<T, F, R>(callback: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(T) -> R + Send + Sync + 'static,
        R: HandlerOutcome,
    {
        // ---
        Self::from_callback(Box::new(move |payload: &Value| {
            let typed = T::deserialize(payload)?;
            callback(typed).into_outcome()
        }))
    }

    fn from_callback(callback: Box<Callback>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: HandlerId::next(),
                callback,
            }),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    /// `true` when both values refer to the same handler.
    pub fn same_as(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Invoke the callback, containing errors and panics.
    pub(crate) fn invoke(&self, payload: &Value) -> Result<(), FailureKind> {
        // ---
        match catch_unwind(AssertUnwindSafe(|| (self.inner.callback)(payload))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(FailureKind::Error(err.to_string())),
            Err(panic) => Err(FailureKind::Panic(panic_message(panic.as_ref()))),
        }
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.inner.id).finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    // ---
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// How a handler failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The handler returned an error (including payload deserialization
    /// errors for typed handlers).
    Error(String),

    /// The handler panicked.
    Panic(String),
}

/// A handler failure isolated during dispatch.
///
/// Delivered to the observability sink (tracing and the optional
/// `on_handler_failure` hook), never to `emit` or the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub channel: String,
    pub handler: HandlerId,
    pub kind: FailureKind,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Error(msg) => {
                write!(f, "{} on {:?} failed: {msg}", self.handler, self.channel)
            }
            FailureKind::Panic(msg) => {
                write!(f, "{} on {:?} panicked: {msg}", self.handler, self.channel)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn clones_share_identity() {
        // ---
        let a = Handler::new(|_: &Value| {});
        let b = a.clone();
        let c = Handler::new(|_: &Value| {});

        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, c);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn invoke_passes_the_payload() {
        // ---
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let h = Handler::new(move |payload: &Value| {
            counter.fetch_add(payload.as_u64().unwrap_or(0) as usize, Ordering::SeqCst);
        });

        h.invoke(&json!(5)).unwrap();
        h.invoke(&json!(2)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn errors_are_reported_not_propagated() {
        // ---
        let h = Handler::new(|_: &Value| -> Result<(), std::io::Error> {
            Err(std::io::Error::other("disk on fire"))
        });

        assert_eq!(
            h.invoke(&Value::Null),
            Err(FailureKind::Error("disk on fire".into()))
        );
    }

    #[test]
    fn panics_are_contained() {
        // ---
        let h = Handler::new::<_, ()>(|_: &Value| panic!("boom"));
        assert_eq!(
            h.invoke(&Value::Null),
            Err(FailureKind::Panic("boom".into()))
        );
    }

    #[test]
    fn typed_handler_deserializes_payload() {
        // ---
        #[derive(serde::Deserialize)]
        struct Greeting {
            name: String,
        }

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let h = Handler::typed(move |g: Greeting| {
            sink.lock().unwrap().push(g.name);
        });

        h.invoke(&json!({ "name": "ada" })).unwrap();
        assert!(matches!(
            h.invoke(&json!("not a greeting")),
            Err(FailureKind::Error(_))
        ));
        assert_eq!(*seen.lock().unwrap(), vec!["ada".to_string()]);
    }

    #[test]
    fn failure_display_names_handler_and_channel() {
        // ---
        let failure = HandlerFailure {
            channel: "greet".into(),
            handler: HandlerId(9),
            kind: FailureKind::Panic("boom".into()),
        };
        assert_eq!(failure.to_string(), "handler-9 on \"greet\" panicked: boom");
    }
}
