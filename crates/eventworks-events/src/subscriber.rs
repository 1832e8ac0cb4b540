//! Subscriber registration, grounded in the teacher's `Subscriber`/
//! `SubscriberConfig` pair.

use crate::event::{DomainEvent, EventType};
use eventworks_core::error::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type HandlerFn =
    Arc<dyn Fn(Arc<DomainEvent>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub event_types: Vec<EventType>,
    pub async_handler: bool,
    pub priority: i32,
}

impl SubscriberConfig {
    pub fn new(event_types: Vec<EventType>) -> Self {
        Self {
            event_types,
            async_handler: false,
            priority: 0,
        }
    }

    pub fn async_handler(mut self) -> Self {
        self.async_handler = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

pub struct Subscriber {
    pub config: SubscriberConfig,
    pub handler: HandlerFn,
    pub name: String,
}

impl Subscriber {
    pub fn new<F, Fut>(name: impl Into<String>, config: SubscriberConfig, handler: F) -> Self
    where
        F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            config,
            handler: Arc::new(move |event| Box::pin(handler(event))),
        }
    }

    pub fn for_event<F, Fut>(event_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let event_type: String = event_type.into();
        Self::new(
            event_type.clone(),
            SubscriberConfig::new(vec![EventType::new(event_type)]),
            handler,
        )
    }

    pub async fn handle(&self, event: Arc<DomainEvent>) -> Result<()> {
        (self.handler)(event).await
    }
}
