//! Route table.
//!
//! Routes are keyed by `"<METHOD> <path>"`, the same key API Gateway puts in
//! `routeKey`. The table is assembled with a [`RouteTableBuilder`] and frozen
//! by [`RouteTableBuilder::build`]; nothing mutates it afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::SlackResult;
use crate::event::InboundEvent;

/// Handles the requests sent to one route.
#[async_trait]
pub trait Handler<O>: Send + Sync {
    /// Handle `event`.
    async fn call(&self, event: InboundEvent) -> SlackResult<O>;
}

#[async_trait]
impl<F, Fut, O> Handler<O> for F
where
    F: Fn(InboundEvent) -> Fut + Send + Sync,
    Fut: Future<Output = SlackResult<O>> + Send + 'static,
    O: Send + 'static,
{
    async fn call(&self, event: InboundEvent) -> SlackResult<O> {
        (self)(event).await
    }
}

/// A registered handler.
pub struct Route<O> {
    handler: Arc<dyn Handler<O>>,
    verify: bool,
}

impl<O> Clone for Route<O> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            verify: self.verify,
        }
    }
}

impl<O> Route<O> {
    /// The handler.
    pub fn handler(&self) -> &Arc<dyn Handler<O>> {
        &self.handler
    }

    /// Whether requests must be signed.
    pub fn requires_verification(&self) -> bool {
        self.verify
    }
}

/// Collects routes before the table is frozen.
pub struct RouteTableBuilder<O> {
    routes: HashMap<String, Route<O>>,
}

impl<O> Default for RouteTableBuilder<O> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<O: 'static> RouteTableBuilder<O> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for signed requests.
    ///
    /// The handler is handed back, so it can still be called directly.
    pub fn route<H>(&mut self, key: impl Into<String>, handler: H) -> Arc<H>
    where
        H: Handler<O> + 'static,
    {
        self.insert(key.into(), handler, true)
    }

    /// Register a handler for requests Slack does not sign, such as the
    /// browser redirects of the OAuth flow.
    pub fn route_unverified<H>(&mut self, key: impl Into<String>, handler: H) -> Arc<H>
    where
        H: Handler<O> + 'static,
    {
        self.insert(key.into(), handler, false)
    }

    fn insert<H>(&mut self, key: String, handler: H, verify: bool) -> Arc<H>
    where
        H: Handler<O> + 'static,
    {
        let handler = Arc::new(handler);
        let route = Route {
            handler: Arc::clone(&handler) as Arc<dyn Handler<O>>,
            verify,
        };
        if self.routes.insert(key.clone(), route).is_some() {
            warn!(route = %key, "Replacing previously registered route");
        }
        handler
    }

    /// Freeze the table.
    pub fn build(self) -> RouteTable<O> {
        RouteTable {
            routes: self.routes,
        }
    }
}

/// Immutable route table.
pub struct RouteTable<O> {
    routes: HashMap<String, Route<O>>,
}

impl<O> RouteTable<O> {
    /// Look up a route by key.
    pub fn get(&self, key: &str) -> Option<&Route<O>> {
        self.routes.get(key)
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.routes.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo(event: InboundEvent) -> SlackResult<InboundEvent> {
        Ok(event)
    }

    #[tokio::test]
    async fn test_route_returns_handler_unchanged() {
        let mut builder = RouteTableBuilder::new();
        let handler = builder.route("GET /resource", echo);

        let event = InboundEvent::builder("anything").build();
        let direct = handler.call(event.clone()).await.unwrap();
        assert_eq!(direct, event);

        let table = builder.build();
        let routed = table
            .get("GET /resource")
            .unwrap()
            .handler()
            .call(event.clone())
            .await
            .unwrap();
        assert_eq!(routed, direct);
    }

    #[test]
    fn test_verification_flags() {
        let mut builder = RouteTableBuilder::<InboundEvent>::new();
        builder.route("POST /events", echo);
        builder.route_unverified("GET /install", echo);
        let table = builder.build();

        assert!(table.get("POST /events").unwrap().requires_verification());
        assert!(!table.get("GET /install").unwrap().requires_verification());
        assert!(table.get("GET /missing").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_route_last_wins() {
        async fn one(_event: InboundEvent) -> SlackResult<u32> {
            Ok(1)
        }
        async fn two(_event: InboundEvent) -> SlackResult<u32> {
            Ok(2)
        }

        let mut builder = RouteTableBuilder::new();
        builder.route("GET /x", one);
        builder.route("GET /x", two);
        let table = builder.build();

        assert_eq!(table.len(), 1);
        let out = table
            .get("GET /x")
            .unwrap()
            .handler()
            .call(InboundEvent::default())
            .await
            .unwrap();
        assert_eq!(out, 2);
    }

    #[test]
    fn test_keys_sorted() {
        let mut builder = RouteTableBuilder::<InboundEvent>::new();
        builder.route("POST /events", echo);
        builder.route_unverified("GET /install", echo);
        let table = builder.build();
        assert_eq!(table.keys(), vec!["GET /install", "POST /events"]);
        assert!(table.contains("POST /events"));
        assert!(!table.is_empty());
    }
}
