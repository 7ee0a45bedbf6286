//! Inbound dispatch.
//!
//! The dispatcher is the glue between the single transport subscription an
//! instance holds and its channel registry. It:
//! - drives a receive loop over the subscription inbox
//! - decodes each message into an [`Envelope`]
//! - invokes every handler registered for the envelope's channel
//! - isolates and reports handler failures
//!
//! It does **not** define any request/response semantics, retries, or
//! acknowledgements.
//!
//! ## Snapshot iteration
//!
//! Handlers for a channel are copied out of the registry before any of them
//! runs, and the registry lock is released for the duration of the calls.
//! A handler that registers or deregisters handlers (itself included) only
//! changes what later dispatches see, and can do so without deadlocking.
//!
//! ## Failure isolation
//!
//! A handler that returns an error or panics is reported through
//! `log_error!` and the optional failure hook. The remaining handlers of the
//! same dispatch still run and the receive loop keeps going.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::handler::{FailureHook, HandlerFailure};
use crate::protocol::Envelope;
use crate::registry::{lock_ignore_poison, SharedRegistry};
use crate::{log_debug, log_error, Message};

pub(crate) struct Dispatcher {
    node_id: Arc<str>,
    registry: SharedRegistry,
    failure_hook: Option<FailureHook>,
}

impl Dispatcher {
    pub(crate) fn new(
        node_id: Arc<str>,
        registry: SharedRegistry,
        failure_hook: Option<FailureHook>,
    ) -> Self {
        Self {
            node_id,
            registry,
            failure_hook,
        }
    }

    /// Handle one inbound message.
    ///
    /// Returns the number of handlers invoked. Messages that are not channel
    /// envelopes, or whose channel has no local handlers, invoke none.
    pub(crate) fn dispatch(&self, message: &Message) -> usize {
        // ---
        let Some(Envelope { channel, payload }) = Envelope::decode(message) else {
            log_debug!("{}: ignoring non-channel message", self.node_id);
            return 0;
        };

        let handlers = {
            let registry = lock_ignore_poison(&self.registry);
            registry.snapshot(&channel)
        };

        if handlers.is_empty() {
            log_debug!("{}: no handlers for channel {channel:?}", self.node_id);
            return 0;
        }

        for handler in &handlers {
            if let Err(kind) = handler.invoke(&payload) {
                self.report(HandlerFailure {
                    channel: channel.clone(),
                    handler: handler.id(),
                    kind,
                });
            }
        }

        handlers.len()
    }

    fn report(&self, failure: HandlerFailure) {
        // ---
        log_error!("{}: {failure}", self.node_id);

        if let Some(hook) = &self.failure_hook {
            // The hook is part of the observability sink; contain it too.
            let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(&failure)));
            if res.is_err() {
                log_error!("{}: handler failure hook panicked", self.node_id);
            }
        }
    }

    /// Spawn the receive loop.
    ///
    /// The loop ends when the inbox closes, i.e. when the transport drops the
    /// subscription, or when the task is aborted during disposal.
    pub(crate) fn spawn(self, mut inbox: mpsc::Receiver<Message>) -> JoinHandle<()> {
        // ---
        tokio::spawn(async move {
            log_debug!("{}: dispatcher started", self.node_id);

            while let Some(message) = inbox.recv().await {
                self.dispatch(&message);
            }

            log_debug!("{}: dispatcher stopped (inbox closed)", self.node_id);
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::handler::FailureKind;
    use crate::registry::ChannelRegistry;
    use crate::Handler;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn dispatcher(hook: Option<FailureHook>) -> Dispatcher {
        let registry = Arc::new(Mutex::new(ChannelRegistry::new()));
        Dispatcher::new(Arc::from("test"), registry, hook)
    }

    fn envelope(channel: &str, payload: Value) -> Message {
        Message::new(Envelope::encode(channel, payload))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Handler {
        let log = log.clone();
        Handler::new(move |payload: &Value| {
            log.lock().unwrap().push(format!("{tag}:{payload}"));
        })
    }

    #[test]
    fn invokes_handlers_in_registration_order() {
        // ---
        let d = dispatcher(None);
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut reg = d.registry.lock().unwrap();
            reg.register("greet", &recorder(&log, "first")).unwrap();
            reg.register("greet", &recorder(&log, "second")).unwrap();
            reg.register("other", &recorder(&log, "other")).unwrap();
        }

        assert_eq!(d.dispatch(&envelope("greet", json!("hi"))), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:\"hi\"".to_string(), "second:\"hi\"".to_string()]
        );
    }

    #[test]
    fn unmatched_and_foreign_messages_invoke_nothing() {
        // ---
        let d = dispatcher(None);
        let log = Arc::new(Mutex::new(Vec::new()));
        d.registry
            .lock()
            .unwrap()
            .register("greet", &recorder(&log, "h"))
            .unwrap();

        assert_eq!(d.dispatch(&envelope("unknown", json!(1))), 0);
        assert_eq!(d.dispatch(&Message::new(json!({ "kind": "resize" }))), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        // ---
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let hook: FailureHook = Arc::new(move |f: &HandlerFailure| {
            sink.lock().unwrap().push(f.clone());
        });

        let d = dispatcher(Some(hook));
        let log = Arc::new(Mutex::new(Vec::new()));
        let broken = Handler::new(|_: &Value| -> Result<(), String> { Err("nope".into()) });
        let panicky = Handler::new::<_, ()>(|_: &Value| panic!("kaboom"));
        {
            let mut reg = d.registry.lock().unwrap();
            reg.register("ch", &broken).unwrap();
            reg.register("ch", &panicky).unwrap();
            reg.register("ch", &recorder(&log, "last")).unwrap();
        }

        assert_eq!(d.dispatch(&envelope("ch", json!(null))), 3);
        assert_eq!(*log.lock().unwrap(), vec!["last:null".to_string()]);

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].handler, broken.id());
        assert_eq!(failures[0].kind, FailureKind::Error("nope".into()));
        assert_eq!(failures[1].handler, panicky.id());
        assert_eq!(failures[1].kind, FailureKind::Panic("kaboom".into()));
        assert!(failures.iter().all(|f| f.channel == "ch"));
    }

    #[test]
    fn panicking_hook_is_contained() {
        // ---
        let hook: FailureHook = Arc::new(|_: &HandlerFailure| panic!("hook down"));
        let d = dispatcher(Some(hook));
        let bad = Handler::new::<_, ()>(|_: &Value| panic!("handler down"));
        d.registry.lock().unwrap().register("ch", &bad).unwrap();

        assert_eq!(d.dispatch(&envelope("ch", json!(0))), 1);
    }

    #[test]
    fn handler_may_deregister_itself_mid_dispatch() {
        // ---
        let d = dispatcher(None);
        let registry = d.registry.clone();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slot: Arc<Mutex<Option<Handler>>> = Arc::new(Mutex::new(None));
        let me = slot.clone();
        let first = Handler::new(move |_: &Value| {
            if let Some(h) = me.lock().unwrap().as_ref() {
                lock_ignore_poison(&registry).deregister("ch", h).unwrap();
            }
        });
        *slot.lock().unwrap() = Some(first.clone());
        {
            let mut reg = d.registry.lock().unwrap();
            reg.register("ch", &first).unwrap();
            reg.register("ch", &recorder(&log, "second")).unwrap();
        }

        assert_eq!(d.dispatch(&envelope("ch", json!(1))), 2);
        assert_eq!(d.dispatch(&envelope("ch", json!(2))), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["second:1".to_string(), "second:2".to_string()]
        );
    }
}
