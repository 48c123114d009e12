//! Event handler registration.
//!
//! A handler receives the context, the current state and the event. Returning
//! `Ok(Some(state))` replaces the state; `Ok(None)` keeps whatever the
//! handler left in `&mut S`.

use std::collections::HashMap;

use streamlog_core::Event;

use super::context::ProjectionContext;
use super::ProjectionError;

pub type HandlerResult<S> = Result<Option<S>, ProjectionError>;

pub(crate) type BoxedHandler<S> =
    Box<dyn FnMut(&mut ProjectionContext<'_>, &mut S, &Event) -> HandlerResult<S> + Send>;

/// Handlers keyed by event type name.
pub struct EventHandlers<S> {
    handlers: HashMap<String, BoxedHandler<S>>,
}

impl<S> EventHandlers<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for one event name (replacing any previous one).
    pub fn on<F>(mut self, event_name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&mut ProjectionContext<'_>, &mut S, &Event) -> HandlerResult<S> + Send + 'static,
    {
        self.handlers.insert(event_name.into(), Box::new(handler));
        self
    }

    pub fn handles(&self, event_name: &str) -> bool {
        self.handlers.contains_key(event_name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<S> Default for EventHandlers<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// The configured dispatch mode of a projection.
pub(crate) enum Handler<S> {
    CatchAll(BoxedHandler<S>),
    ByType(EventHandlers<S>),
}

impl<S> Handler<S> {
    /// The handler for an event, or `None` when the event is not handled.
    pub(crate) fn handler_for(&mut self, event_name: &str) -> Option<&mut BoxedHandler<S>> {
        match self {
            Handler::CatchAll(handler) => Some(handler),
            Handler::ByType(handlers) => handlers.handlers.get_mut(event_name),
        }
    }
}

impl<S> core::fmt::Debug for EventHandlers<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("EventHandlers").field("events", &names).finish()
    }
}

impl<S> core::fmt::Debug for Handler<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Handler::CatchAll(_) => f.write_str("CatchAll"),
            Handler::ByType(handlers) => f.debug_tuple("ByType").field(handlers).finish(),
        }
    }
}
