//! In-process publish/subscribe bus wiring detection, remediation, and
//! resolution together.
//!
//! Topics are plain strings and handlers are callbacks invoked synchronously
//! on the publishing thread. Delivery is fan-out and best-effort: no
//! persistence, no replay, no cross-process transport.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Topic carrying freshly detected symptom events into the orchestrator.
pub const TOPIC_ISSUE_DETECTED: &str = "issue.detected";
/// Topic carrying completed remediation cycles out to observers.
pub const TOPIC_ISSUE_RESOLVED: &str = "issue.resolved";

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Synchronous fan-out event bus keyed by string topics.
///
/// A publish invokes every handler subscribed to the topic at the moment the
/// publish began, in subscription order. A panicking handler is isolated: the
/// remaining handlers still run and nothing propagates to the publisher.
/// Handlers subscribed while a publish is in flight do not receive it.
#[derive(Default)]
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `topic`, appended after existing subscribers.
    pub fn subscribe<F>(&self, topic: &str, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        // Lock poisoning cannot leave the registry half-edited; recover it.
        let mut topics = self
            .topics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        topics
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Delivers `payload` to every current subscriber of `topic`.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn publish(&self, topic: &str, payload: &Value) -> usize {
        let handlers = {
            let topics = self
                .topics
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            topics.get(topic).cloned().unwrap_or_default()
        };

        if handlers.is_empty() {
            tracing::debug!(topic, "publish with no subscribers");
            return 0;
        }

        let mut delivered = 0;
        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(topic, "event handler panicked; continuing fan-out");
                }
            }
        }
        delivered
    }

    /// Number of handlers currently subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self
            .topics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        topics.get(topic).map(Vec::len).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self
            .topics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entries: Vec<(String, usize)> = topics
            .iter()
            .map(|(topic, handlers)| (topic.clone(), handlers.len()))
            .collect();
        entries.sort();
        formatter
            .debug_struct("EventBus")
            .field("topics", &entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::EventBus;

    #[test]
    fn publish_invokes_handlers_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe("issue.detected", move |_| {
                order.lock().expect("order lock").push(label);
            });
        }

        let delivered = bus.publish("issue.detected", &json!({"error_kind": "service_down"}));
        assert_eq!(delivered, 3);
        assert_eq!(
            order.lock().expect("order lock").as_slice(),
            &["first", "second", "third"]
        );
    }

    #[test]
    fn panicking_handler_does_not_block_remaining_handlers() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.subscribe("issue.detected", |_| panic!("boom"));
        {
            let reached = reached.clone();
            bus.subscribe("issue.detected", move |_| {
                reached.fetch_add(1, Ordering::SeqCst);
            });
        }

        let delivered = bus.publish("issue.detected", &json!({}));
        assert_eq!(delivered, 1);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_added_during_publish_misses_that_publish() {
        let bus = Arc::new(EventBus::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        {
            let bus_for_handler = bus.clone();
            let late_calls = late_calls.clone();
            bus.subscribe("issue.detected", move |_| {
                let late_calls = late_calls.clone();
                bus_for_handler.subscribe("issue.detected", move |_| {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        bus.publish("issue.detected", &json!({}));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        bus.publish("issue.detected", &json!({}));
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("issue.resolved", &json!({})), 0);
        assert_eq!(bus.subscriber_count("issue.resolved"), 0);
    }

    #[test]
    fn topics_are_isolated_from_each_other() {
        let bus = EventBus::new();
        let detected = Arc::new(AtomicUsize::new(0));
        let resolved = Arc::new(AtomicUsize::new(0));

        {
            let detected = detected.clone();
            bus.subscribe("issue.detected", move |_| {
                detected.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let resolved = resolved.clone();
            bus.subscribe("issue.resolved", move |_| {
                resolved.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish("issue.detected", &json!({}));
        assert_eq!(detected.load(Ordering::SeqCst), 1);
        assert_eq!(resolved.load(Ordering::SeqCst), 0);
    }
}
