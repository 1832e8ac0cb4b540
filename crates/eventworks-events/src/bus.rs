//! Event bus for decoupled lifecycle/scheduler notifications, grounded in
//! the teacher's `EventBus`/`EventBusBuilder` pair.

use crate::event::{DomainEvent, EventType};
use crate::subscriber::Subscriber;
use dashmap::DashMap;
use eventworks_core::error::Result;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct EventBus {
    subscribers: DashMap<EventType, Vec<Arc<Subscriber>>>,
    broadcast_tx: broadcast::Sender<Arc<DomainEvent>>,
    config: EventBusConfig,
}

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub broadcast_capacity: usize,
    pub continue_on_error: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 1024,
            continue_on_error: true,
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity);
        Self {
            subscribers: DashMap::new(),
            broadcast_tx,
            config,
        }
    }

    pub fn subscribe(&self, subscriber: Subscriber) -> &Self {
        let subscriber = Arc::new(subscriber);

        for event_type in &subscriber.config.event_types {
            self.subscribers
                .entry(event_type.clone())
                .or_insert_with(Vec::new)
                .push(subscriber.clone());
        }

        for mut entry in self.subscribers.iter_mut() {
            entry
                .value_mut()
                .sort_by(|a, b| b.config.priority.cmp(&a.config.priority));
        }

        self
    }

    pub fn unsubscribe(&self, name: &str) {
        for mut entry in self.subscribers.iter_mut() {
            entry.value_mut().retain(|s| s.name != name);
        }
    }

    pub async fn publish(&self, event: DomainEvent) -> Result<()> {
        let event = Arc::new(event);

        tracing::debug!(
            event_type = %event.event_type,
            event_id = %event.id,
            "publishing internal event"
        );

        let event_type = EventType::new(event.event_type.clone());
        let subscribers = self
            .subscribers
            .get(&event_type)
            .map(|s| s.clone())
            .unwrap_or_default();

        let mut errors = Vec::new();
        for subscriber in subscribers.iter().filter(|s| !s.config.async_handler) {
            if let Err(e) = subscriber.handle(event.clone()).await {
                tracing::error!(
                    subscriber = %subscriber.name,
                    event_type = %event.event_type,
                    error = %e,
                    "sync event handler failed"
                );
                if !self.config.continue_on_error {
                    return Err(e);
                }
                errors.push(e);
            }
        }

        let async_subscribers: Vec<_> = subscribers
            .iter()
            .filter(|s| s.config.async_handler)
            .cloned()
            .collect();

        if !async_subscribers.is_empty() {
            let event_clone = event.clone();
            tokio::spawn(async move {
                for subscriber in async_subscribers {
                    if let Err(e) = subscriber.handle(event_clone.clone()).await {
                        tracing::error!(
                            subscriber = %subscriber.name,
                            error = %e,
                            "async event handler failed"
                        );
                    }
                }
            });
        }

        let _ = self.broadcast_tx.send(event);

        if !errors.is_empty() {
            tracing::warn!(error_count = errors.len(), "some event handlers failed");
        }
        Ok(())
    }

    pub fn subscribe_broadcast(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.broadcast_tx.subscribe()
    }

    pub fn subscriber_count(&self, event_type: &EventType) -> usize {
        self.subscribers.get(event_type).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn publish_invokes_matching_subscribers() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        bus.subscribe(Subscriber::for_event("plugin.runtime_error", move |_| {
            let c = counter_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        let event = DomainEvent::new("plugin.runtime_error", serde_json::json!({}));
        bus.publish(event).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        bus.subscribe(Subscriber::new(
            "audit_sink",
            crate::subscriber::SubscriberConfig::new(vec![EventType::new("scheduler.tick")]),
            move |_| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        bus.publish(DomainEvent::new("scheduler.tick", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        bus.unsubscribe("audit_sink");

        bus.publish(DomainEvent::new("scheduler.tick", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broadcast_receiver_observes_every_event() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe_broadcast();

        let event = DomainEvent::new("plugin.loaded", serde_json::json!({"plugin_config_id": 7}));
        bus.publish(event).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type, "plugin.loaded");
    }
}
