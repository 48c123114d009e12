//! The run loop shared by every projection variant.
//!
//! A [`ProjectionCore`] owns what all variants have in common: state, stream
//! positions, selector, handlers and status. Variant-specific behavior is
//! plugged in as a [`ProjectionSink`] for the duration of a call.
//!
//! ## Run loop
//!
//! Every pass re-resolves the selector, merges the result into the stored
//! position and then reads each tracked stream after its last consumed
//! sequence number. Handlers run with no storage lock held.
//!
//! Control requested from a handler (reset, delete) is applied after the
//! handler returns. Stop requests are honored between events.

use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::{debug, error, info};

use streamlog_core::StreamName;
use streamlog_events::{MetadataMatcher, Position, ProjectionStatus, ReadModel, StopToken};

use super::context::{ControlRequest, ProjectionContext};
use super::emitter::Emitter;
use super::handle::ProjectionHandle;
use super::handler::Handler;
use super::merged::MergedStreamIterator;
use super::selector::Selector;
use super::ProjectionError;
use crate::config::ProjectionOptions;
use crate::event_store::{EventStore, EventStoreError, StoredEvent};

/// Contract for projection state.
///
/// Without an `init` callback, projections start from `S::default()`. The
/// state is exported as JSON to the projection manager.
pub trait ProjectionState: Default + Serialize + Send + 'static {}

impl<T> ProjectionState for T where T: Default + Serialize + Send + 'static {}

/// Variant-specific capabilities handed to handlers during a pass.
#[derive(Default)]
pub(crate) struct SinkParts<'a> {
    pub(crate) emitter: Option<&'a mut Emitter>,
    pub(crate) read_model: Option<&'a dyn ReadModel>,
    pub(crate) persist_block_size: Option<usize>,
}

/// Variant hooks around the shared run loop.
pub(crate) trait ProjectionSink {
    /// Runs before the first pass, and again after a reset.
    fn prepare(&mut self) -> Result<(), ProjectionError> {
        Ok(())
    }

    fn parts(&mut self) -> SinkParts<'_> {
        SinkParts::default()
    }

    /// Runs at the end of every pass.
    fn flush(&mut self) -> Result<(), ProjectionError> {
        Ok(())
    }

    fn reset(&mut self) -> Result<(), ProjectionError> {
        Ok(())
    }

    fn delete(&mut self, _include_emitted: bool) -> Result<(), ProjectionError> {
        Ok(())
    }
}

/// Sink of a query: no side effects besides state.
pub(crate) struct NoSink;

impl ProjectionSink for NoSink {}

#[derive(Debug, Default)]
struct PassReport {
    events: usize,
    handled: usize,
    control: Option<ControlRequest>,
}

pub(crate) struct ProjectionCore<S> {
    name: String,
    store: Arc<dyn EventStore>,
    options: ProjectionOptions,
    init: Option<Box<dyn FnMut() -> S + Send>>,
    selector: Option<Selector>,
    handler: Option<Handler<S>>,
    merged_reads: bool,
    state: S,
    position: Position,
    status: ProjectionStatus,
    stop: StopToken,
    handle: Arc<ProjectionHandle>,
}

impl<S: ProjectionState> ProjectionCore<S> {
    pub(crate) fn new(
        name: impl Into<String>,
        store: Arc<dyn EventStore>,
        options: ProjectionOptions,
    ) -> Result<Self, ProjectionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProjectionError::InvalidArgument(
                "projection name must not be empty".to_string(),
            ));
        }
        options.validate()?;

        let core = Self {
            handle: Arc::new(ProjectionHandle::new(name.clone())),
            name,
            store,
            options,
            init: None,
            selector: None,
            handler: None,
            merged_reads: false,
            state: S::default(),
            position: Position::new(),
            status: ProjectionStatus::Idle,
            stop: StopToken::new(),
        };
        core.publish();
        Ok(core)
    }

    /// Interleave `from_streams` selections by sequence number.
    pub(crate) fn enable_merged_reads(&mut self) {
        self.merged_reads = true;
    }

    pub(crate) fn set_init(
        &mut self,
        mut init: Box<dyn FnMut() -> S + Send>,
    ) -> Result<(), ProjectionError> {
        if self.init.is_some() {
            return Err(ProjectionError::misconfigured("Projection already initialized"));
        }
        self.state = init();
        self.init = Some(init);
        self.publish();
        Ok(())
    }

    pub(crate) fn set_selector(&mut self, selector: Selector) -> Result<(), ProjectionError> {
        if self.selector.is_some() {
            return Err(ProjectionError::misconfigured("From was already called"));
        }
        self.selector = Some(selector);
        Ok(())
    }

    pub(crate) fn set_handler(&mut self, handler: Handler<S>) -> Result<(), ProjectionError> {
        if self.handler.is_some() {
            return Err(ProjectionError::misconfigured("When was already called"));
        }
        self.handler = Some(handler);
        Ok(())
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> &S {
        &self.state
    }

    pub(crate) fn positions(&self) -> &Position {
        &self.position
    }

    pub(crate) fn status(&self) -> ProjectionStatus {
        self.status
    }

    pub(crate) fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub(crate) fn handle(&self) -> Arc<ProjectionHandle> {
        self.handle.clone()
    }

    pub(crate) fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub(crate) fn options(&self) -> &ProjectionOptions {
        &self.options
    }

    pub(crate) fn stop(&mut self) {
        self.stop.request_stop();
        info!(projection = %self.name, "projection stop requested");
    }

    pub(crate) fn run(
        &mut self,
        keep_running: bool,
        sink: &mut dyn ProjectionSink,
    ) -> Result<(), ProjectionError> {
        if self.selector.is_none() || self.handler.is_none() {
            return Err(ProjectionError::misconfigured("No handlers configured"));
        }

        self.stop.clear();
        self.set_status(ProjectionStatus::Running);
        info!(projection = %self.name, keep_running, "projection run started");

        let result = self.run_loop(keep_running, sink);

        self.set_status(ProjectionStatus::Idle);
        self.publish();
        match &result {
            Ok(()) => info!(projection = %self.name, "projection run finished"),
            Err(err) => error!(projection = %self.name, error = %err, "projection run failed"),
        }
        result
    }

    fn run_loop(
        &mut self,
        keep_running: bool,
        sink: &mut dyn ProjectionSink,
    ) -> Result<(), ProjectionError> {
        sink.prepare()?;

        loop {
            let report = self.run_pass(sink)?;
            sink.flush()?;

            match report.control {
                Some(ControlRequest::Reset) => {
                    self.reset(sink)?;
                    sink.prepare()?;
                }
                Some(ControlRequest::Delete { include_emitted }) => {
                    return self.delete(sink, include_emitted);
                }
                None => {}
            }

            if self.stop.is_stop_requested() {
                self.set_status(ProjectionStatus::Stopping);
                info!(projection = %self.name, "projection stopped");
                return Ok(());
            }
            if !keep_running {
                return Ok(());
            }
            if report.events == 0 {
                thread::sleep(self.options.sleep);
            }
        }
    }

    fn run_pass(&mut self, sink: &mut dyn ProjectionSink) -> Result<PassReport, ProjectionError> {
        let Self {
            name,
            store,
            selector,
            handler,
            merged_reads,
            state,
            position,
            stop,
            handle,
            ..
        } = self;
        let (Some(selector), Some(handler)) = (selector.as_ref(), handler.as_mut()) else {
            return Err(ProjectionError::misconfigured("No handlers configured"));
        };

        position.merge(selector.resolve(&**store));
        let streams: Vec<(StreamName, u64)> = position
            .iter()
            .map(|(stream, seq)| (stream.clone(), seq))
            .collect();
        let matcher = selector.matcher();

        let mut parts = sink.parts();
        let mut report = PassReport::default();
        let mut pass = Pass {
            handler,
            state,
            position,
            stop,
            parts: &mut parts,
            report: &mut report,
        };

        if *merged_reads && selector.is_merged() {
            let mut batches = Vec::with_capacity(streams.len());
            for (stream, after) in streams {
                if let Some(events) = load_after(&**store, name, &stream, after, matcher)? {
                    batches.push((stream, events));
                }
            }
            for (stream, stored) in MergedStreamIterator::new(batches) {
                if !pass.dispatch(&stream, stored)? {
                    break;
                }
            }
            handle.publish(&*pass.position, &*pass.state);
        } else {
            for (stream, after) in streams {
                let Some(events) = load_after(&**store, name, &stream, after, matcher)? else {
                    continue;
                };
                let mut halted = false;
                for stored in events {
                    if !pass.dispatch(&stream, stored)? {
                        halted = true;
                        break;
                    }
                }
                handle.publish(&*pass.position, &*pass.state);
                if halted {
                    break;
                }
            }
        }

        Ok(report)
    }

    fn initial_state(&mut self) -> S {
        match self.init.as_mut() {
            Some(init) => init(),
            None => S::default(),
        }
    }

    pub(crate) fn reset(&mut self, sink: &mut dyn ProjectionSink) -> Result<(), ProjectionError> {
        let previous = self.status;
        self.set_status(ProjectionStatus::Resetting);

        self.position.clear();
        self.state = self.initial_state();
        let result = sink.reset();

        self.set_status(previous);
        self.publish();
        info!(projection = %self.name, "projection reset");
        result
    }

    pub(crate) fn delete(
        &mut self,
        sink: &mut dyn ProjectionSink,
        include_emitted: bool,
    ) -> Result<(), ProjectionError> {
        let previous = self.status;
        self.set_status(if include_emitted {
            ProjectionStatus::DeletingInclEmittedEvents
        } else {
            ProjectionStatus::Deleting
        });

        self.position.clear();
        let result = sink.delete(include_emitted);

        self.set_status(previous);
        self.publish();
        info!(projection = %self.name, include_emitted, "projection deleted");
        result
    }

    fn set_status(&mut self, status: ProjectionStatus) {
        self.status = status;
        self.handle.publish_status(status);
    }

    fn publish(&self) {
        self.handle.publish(&self.position, &self.state);
    }
}

/// Borrowed engine state for the duration of one pass.
struct Pass<'p, 's, S> {
    handler: &'p mut Handler<S>,
    state: &'p mut S,
    position: &'p mut Position,
    stop: &'p StopToken,
    parts: &'p mut SinkParts<'s>,
    report: &'p mut PassReport,
}

impl<S> Pass<'_, '_, S> {
    /// Consume one event. Returns `false` when the pass must end.
    fn dispatch(&mut self, stream: &StreamName, stored: StoredEvent) -> Result<bool, ProjectionError> {
        self.position.advance(stream, stored.sequence_number)?;
        self.report.events += 1;

        if let Some(handle_event) = self.handler.handler_for(stored.event.name()) {
            let mut control = None;
            let outcome = {
                let mut ctx = ProjectionContext::new(
                    stream,
                    self.stop,
                    &mut control,
                    self.parts.emitter.as_deref_mut(),
                    self.parts.read_model,
                );
                handle_event(&mut ctx, self.state, &stored.event)?
            };
            self.report.handled += 1;

            if let Some(request) = control {
                self.report.control = Some(request);
                return Ok(false);
            }
            if let Some(state) = outcome {
                *self.state = state;
            }
            if let (Some(read_model), Some(block)) = (self.parts.read_model, self.parts.persist_block_size) {
                if self.report.handled % block == 0 {
                    read_model.persist()?;
                }
            }
        }

        Ok(!self.stop.is_stop_requested())
    }
}

fn load_after(
    store: &dyn EventStore,
    projection: &str,
    stream: &StreamName,
    after: u64,
    matcher: Option<&MetadataMatcher>,
) -> Result<Option<Vec<StoredEvent>>, ProjectionError> {
    match store.load(stream, after + 1, None, matcher) {
        Ok(events) => Ok(Some(events)),
        Err(EventStoreError::StreamNotFound(_)) => {
            debug!(projection, stream = %stream, "tracked stream not found, skipped");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Configuration and accessors shared by every projection variant.
///
/// Expects a `core: ProjectionCore<S>` field on the target type.
macro_rules! impl_projection_configuration {
    ($variant:ident) => {
        impl<S: $crate::projections::ProjectionState> $variant<S> {
            /// Seed the state. The callback runs now and again on every reset.
            pub fn init<F>(&mut self, init: F) -> Result<&mut Self, $crate::projections::ProjectionError>
            where
                F: FnMut() -> S + Send + 'static,
            {
                self.core.set_init(Box::new(init))?;
                Ok(self)
            }

            /// Read one stream, optionally filtered by a metadata matcher.
            pub fn from_stream(
                &mut self,
                stream: &str,
                matcher: Option<::streamlog_events::MetadataMatcher>,
            ) -> Result<&mut Self, $crate::projections::ProjectionError> {
                let name = ::streamlog_core::StreamName::new(stream)?;
                self.core
                    .set_selector($crate::projections::selector::Selector::Stream { name, matcher })?;
                Ok(self)
            }

            pub fn from_streams<I, N>(&mut self, streams: I) -> Result<&mut Self, $crate::projections::ProjectionError>
            where
                I: IntoIterator<Item = N>,
                N: AsRef<str>,
            {
                let names = streams
                    .into_iter()
                    .map(|s| ::streamlog_core::StreamName::new(s.as_ref()))
                    .collect::<Result<Vec<_>, _>>()?;
                if names.is_empty() {
                    return Err($crate::projections::ProjectionError::InvalidArgument(
                        "no streams given".to_string(),
                    ));
                }
                self.core
                    .set_selector($crate::projections::selector::Selector::Streams(names))?;
                Ok(self)
            }

            pub fn from_category(&mut self, category: &str) -> Result<&mut Self, $crate::projections::ProjectionError> {
                self.from_categories([category])
            }

            pub fn from_categories<I, N>(&mut self, categories: I) -> Result<&mut Self, $crate::projections::ProjectionError>
            where
                I: IntoIterator<Item = N>,
                N: AsRef<str>,
            {
                let categories: Vec<String> = categories
                    .into_iter()
                    .map(|c| c.as_ref().to_string())
                    .collect();
                if categories.is_empty() || categories.iter().any(|c| c.is_empty()) {
                    return Err($crate::projections::ProjectionError::InvalidArgument(
                        "category names must not be empty".to_string(),
                    ));
                }
                self.core
                    .set_selector($crate::projections::selector::Selector::Categories(categories))?;
                Ok(self)
            }

            /// Read every stream except internal ones (names starting with `$`).
            pub fn from_all(&mut self) -> Result<&mut Self, $crate::projections::ProjectionError> {
                self.core
                    .set_selector($crate::projections::selector::Selector::All)?;
                Ok(self)
            }

            /// Dispatch by event name; other events only advance the position.
            pub fn when(
                &mut self,
                handlers: $crate::projections::EventHandlers<S>,
            ) -> Result<&mut Self, $crate::projections::ProjectionError> {
                self.core
                    .set_handler($crate::projections::handler::Handler::ByType(handlers))?;
                Ok(self)
            }

            /// Handle every event with one handler.
            pub fn when_any<F>(&mut self, handler: F) -> Result<&mut Self, $crate::projections::ProjectionError>
            where
                F: FnMut(
                        &mut $crate::projections::ProjectionContext<'_>,
                        &mut S,
                        &::streamlog_core::Event,
                    ) -> $crate::projections::HandlerResult<S>
                    + Send
                    + 'static,
            {
                self.core
                    .set_handler($crate::projections::handler::Handler::CatchAll(Box::new(handler)))?;
                Ok(self)
            }

            pub fn name(&self) -> &str {
                self.core.name()
            }

            pub fn state(&self) -> &S {
                self.core.state()
            }

            pub fn positions(&self) -> &::streamlog_events::Position {
                self.core.positions()
            }

            pub fn status(&self) -> ::streamlog_events::ProjectionStatus {
                self.core.status()
            }

            /// A token that stops this projection from anywhere (e.g. another thread).
            pub fn stop_token(&self) -> ::streamlog_events::StopToken {
                self.core.stop_token()
            }

            /// Snapshot view shared with the projection manager.
            pub fn handle(&self) -> ::std::sync::Arc<$crate::projections::ProjectionHandle> {
                self.core.handle()
            }

            /// Halt the current run after the event being processed.
            pub fn stop(&mut self) {
                self.core.stop();
            }
        }
    };
}

pub(crate) use impl_projection_configuration;
