//! Per-connection dispatch engine.
//!
//! Four pipelines share one [`Engine`]:
//!
//! - ingest reads frames, decodes them and queues requests or errors;
//! - the dispatch loop starts one handler task per request;
//! - the response writer serialises replies onto the transport;
//! - the error writer turns failures into error replies.
//!
//! Only ingest triggers shutdown, when reading from the transport fails.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use tracing::{debug, info, warn};

use super::codec::{RequestDeserializer, ResponseSerializer};
use super::lifecycle::{Delivery, Failure, Lifecycle, Receivers};
use super::limits::{Admission, DispatchLimits, Permit};
use super::{
    DISPATCH_TARGET, DispatchError, Envelope, ErrorPolicy, HandlerRegistry, Message,
    MessageHandler, StartupError,
};
use crate::transport::{FrameKind, FrameTransport};

/// Payload written when an error reply cannot itself be serialised.
pub const INTERNAL_ERROR_PAYLOAD: &str = "internal error";

/// Counters reported when a connection finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Frames read from the transport.
    pub requests: usize,
    /// Replies written to the transport.
    pub responses: usize,
    /// Error replies written to the transport.
    pub errors: usize,
    /// Outcomes dropped because the connection was shutting down.
    pub discarded: usize,
}

#[derive(Default)]
struct Stats {
    requests: AtomicUsize,
    responses: AtomicUsize,
    errors: AtomicUsize,
    discarded: AtomicUsize,
}

impl Stats {
    fn snapshot(&self) -> ConnectionSummary {
        ConnectionSummary {
            requests: self.requests.load(Ordering::SeqCst),
            responses: self.responses.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
        }
    }
}

/// Collaborators fixed before the engine starts.
pub(crate) struct EngineParts<T> {
    pub(crate) transport: T,
    pub(crate) deserializer: Arc<dyn RequestDeserializer>,
    pub(crate) serializer: Arc<dyn ResponseSerializer>,
    pub(crate) registry: HandlerRegistry,
    pub(crate) policy: Arc<dyn ErrorPolicy>,
    pub(crate) limits: DispatchLimits,
}

pub(crate) struct Engine<T> {
    transport: T,
    deserializer: Arc<dyn RequestDeserializer>,
    serializer: Arc<dyn ResponseSerializer>,
    registry: HandlerRegistry,
    policy: Arc<dyn ErrorPolicy>,
    limits: DispatchLimits,
    lifecycle: Lifecycle,
    write_gate: Mutex<()>,
    stats: Stats,
}

impl<T> Engine<T>
where
    T: FrameTransport,
{
    /// Starts the pipelines and runs the dispatch loop on the calling thread
    /// until the transport goes away.
    pub(crate) fn run(parts: EngineParts<T>) -> Result<ConnectionSummary, StartupError> {
        let (lifecycle, receivers) = Lifecycle::new();
        let engine = Arc::new(Self {
            transport: parts.transport,
            deserializer: parts.deserializer,
            serializer: parts.serializer,
            registry: parts.registry,
            policy: parts.policy,
            limits: parts.limits,
            lifecycle,
            write_gate: Mutex::new(()),
            stats: Stats::default(),
        });
        let Receivers {
            requests,
            responses,
            errors,
            closing,
        } = receivers;

        let mut pipelines = Vec::with_capacity(3);
        if let Err(error) = engine.start_pipelines(&mut pipelines, responses, errors) {
            engine.shutdown();
            join_pipelines(pipelines);
            engine.lifecycle.mark_stopped();
            return Err(error);
        }

        info!(
            target: DISPATCH_TARGET,
            handlers = engine.registry.len(),
            "connection dispatch started"
        );
        engine.dispatch(&requests, &closing);
        join_pipelines(pipelines);
        engine.lifecycle.mark_stopped();
        let summary = engine.stats.snapshot();
        debug!(target: DISPATCH_TARGET, ?summary, "connection dispatch stopped");
        Ok(summary)
    }

    fn start_pipelines(
        self: &Arc<Self>,
        pipelines: &mut Vec<JoinHandle<()>>,
        responses: Receiver<Envelope>,
        errors: Receiver<Failure>,
    ) -> Result<(), StartupError> {
        pipelines.push(self.spawn_pipeline("responses", move |engine| {
            engine.write_responses(&responses);
        })?);
        pipelines.push(self.spawn_pipeline("errors", move |engine| {
            engine.write_errors(&errors);
        })?);
        pipelines.push(self.spawn_pipeline("ingest", Self::ingest)?);
        Ok(())
    }

    fn spawn_pipeline(
        self: &Arc<Self>,
        pipeline: &'static str,
        body: impl FnOnce(&Self) + Send + 'static,
    ) -> Result<JoinHandle<()>, StartupError> {
        let engine = Arc::clone(self);
        thread::Builder::new()
            .name(format!("shuttle-{pipeline}"))
            .spawn(move || body(&engine))
            .map_err(|source| StartupError::Spawn { pipeline, source })
    }

    fn ingest(&self) {
        loop {
            match self.transport.read_frame() {
                Ok(frame) => {
                    self.stats.requests.fetch_add(1, Ordering::SeqCst);
                    self.ingest_frame(frame.kind, &frame.data);
                }
                Err(error) if error.is_closed() => {
                    debug!(target: DISPATCH_TARGET, "transport closed by peer");
                    break;
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %error, "transport read failed");
                    break;
                }
            }
        }
        self.shutdown();
    }

    fn ingest_frame(&self, kind: FrameKind, data: &[u8]) {
        match self.deserializer.deserialize(data) {
            Ok(message) if message.message_type().is_empty() => {
                debug!(target: DISPATCH_TARGET, %kind, "request has no message type");
                self.emit_error(kind, DispatchError::MissingType);
            }
            Ok(message) => {
                debug!(
                    target: DISPATCH_TARGET,
                    message_type = message.message_type(),
                    %kind,
                    "request received"
                );
                let delivery = self.lifecycle.send_request(Envelope::new(kind, message));
                self.note_delivery(delivery, "request");
            }
            Err(source) => {
                debug!(target: DISPATCH_TARGET, %kind, error = %source, "request failed to decode");
                self.emit_error(kind, DispatchError::decode(source));
            }
        }
    }

    fn shutdown(&self) {
        if self.lifecycle.begin_shutdown() {
            info!(target: DISPATCH_TARGET, "connection shutting down");
        }
        if let Err(error) = self.transport.close() {
            warn!(target: DISPATCH_TARGET, %error, "failed to close transport");
        }
    }

    fn dispatch(self: &Arc<Self>, requests: &Receiver<Envelope>, closing: &Receiver<()>) {
        let admission = Admission::new(self.limits.max_in_flight);
        for envelope in requests {
            if !self.lifecycle.is_running() {
                self.note_delivery(Delivery::Discarded, "request");
                continue;
            }
            let Some(permit) = admission.acquire(closing) else {
                self.note_delivery(Delivery::Discarded, "request");
                continue;
            };
            let kind = envelope.kind;
            let message_type = envelope.message_type().to_owned();
            let engine = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name("shuttle-handler".to_owned())
                .spawn(move || engine.run_task(envelope, permit));
            if let Err(source) = spawned {
                warn!(
                    target: DISPATCH_TARGET,
                    message_type = %message_type,
                    error = %source,
                    "failed to spawn handler task"
                );
                self.emit_error(kind, DispatchError::handler(message_type, Box::new(source)));
            }
        }
    }

    /// Runs one request to completion. `permit` is held for exactly as long
    /// as the handler body runs, even when the task stops waiting for it.
    fn run_task(&self, envelope: Envelope, permit: Permit) {
        let kind = envelope.kind;
        let message_type = envelope.message_type().to_owned();
        let Some(handler) = self.registry.get(&message_type).map(Arc::clone) else {
            debug!(target: DISPATCH_TARGET, message_type = %message_type, "no handler registered");
            self.emit_error(kind, DispatchError::unknown_type(message_type));
            return;
        };
        let outcome = match self.limits.handler_deadline {
            Some(deadline) => invoke_with_deadline(handler, envelope, permit, deadline),
            None => {
                let result = invoke(&*handler, &envelope);
                drop(permit);
                result
            }
        };
        match outcome {
            Ok(reply) => {
                let delivery = self.lifecycle.send_response(Envelope::new(kind, reply));
                self.note_delivery(delivery, "response");
            }
            Err(error) => self.emit_error(kind, error),
        }
    }

    fn emit_error(&self, kind: FrameKind, error: DispatchError) {
        let delivery = self.lifecycle.send_error(kind, error);
        self.note_delivery(delivery, "error");
    }

    fn note_delivery(&self, delivery: Delivery, outcome: &'static str) {
        if delivery == Delivery::Discarded {
            self.stats.discarded.fetch_add(1, Ordering::SeqCst);
            debug!(target: DISPATCH_TARGET, outcome, "discarding outcome after shutdown");
        }
    }

    fn write_responses(&self, responses: &Receiver<Envelope>) {
        for envelope in responses {
            if !self.lifecycle.is_running() {
                self.note_delivery(Delivery::Discarded, "response");
                continue;
            }
            match self.serializer.serialize(&envelope.message) {
                Ok(bytes) => {
                    if self.write(envelope.kind, &bytes) {
                        self.stats.responses.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Err(source) => {
                    warn!(
                        target: DISPATCH_TARGET,
                        message_type = envelope.message.message_type(),
                        error = %source,
                        "failed to serialize response"
                    );
                    let error = DispatchError::encode(envelope.message.message_type, source);
                    self.emit_error(envelope.kind, error);
                }
            }
        }
    }

    fn write_errors(&self, errors: &Receiver<Failure>) {
        for Failure { kind, error } in errors {
            if !self.lifecycle.is_running() {
                self.note_delivery(Delivery::Discarded, "error");
                continue;
            }
            let bytes = self.render_error(&error);
            if self.write(kind, &bytes) {
                self.stats.errors.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn render_error(&self, error: &DispatchError) -> Vec<u8> {
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| self.policy.to_message(error)));
        let Ok(message) = rendered else {
            warn!(target: DISPATCH_TARGET, %error, "error policy panicked");
            return INTERNAL_ERROR_PAYLOAD.as_bytes().to_vec();
        };
        self.serializer.serialize(&message).unwrap_or_else(|source| {
            warn!(
                target: DISPATCH_TARGET,
                %error,
                serialize_error = %source,
                "failed to serialize error reply"
            );
            INTERNAL_ERROR_PAYLOAD.as_bytes().to_vec()
        })
    }

    fn write(&self, kind: FrameKind, bytes: &[u8]) -> bool {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        match self.transport.write_frame(kind, bytes) {
            Ok(()) => true,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %kind, %error, "failed to write frame");
                false
            }
        }
    }
}

fn invoke(handler: &dyn MessageHandler, envelope: &Envelope) -> Result<Message, DispatchError> {
    let message_type = envelope.message_type();
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(envelope))) {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(source)) => Err(DispatchError::handler(message_type, source)),
        Err(payload) => {
            warn!(
                target: DISPATCH_TARGET,
                message_type,
                panic = panic_text(&*payload),
                "handler panicked"
            );
            Err(DispatchError::handler_panicked(message_type))
        }
    }
}

fn invoke_with_deadline(
    handler: Arc<dyn MessageHandler>,
    envelope: Envelope,
    permit: Permit,
    deadline: Duration,
) -> Result<Message, DispatchError> {
    let message_type = envelope.message_type().to_owned();
    let (done, outcome) = bounded(1);
    let spawned = thread::Builder::new()
        .name("shuttle-handler-body".to_owned())
        .spawn(move || {
            let result = invoke(&*handler, &envelope);
            drop(permit);
            if done.send(result).is_err() {
                debug!(
                    target: DISPATCH_TARGET,
                    message_type = envelope.message_type(),
                    "dropping handler result that arrived after its deadline"
                );
            }
        });
    if let Err(source) = spawned {
        return Err(DispatchError::handler(message_type, Box::new(source)));
    }
    match outcome.recv_timeout(deadline) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                target: DISPATCH_TARGET,
                message_type = %message_type,
                ?deadline,
                "handler exceeded its deadline"
            );
            Err(DispatchError::handler_timeout(message_type, deadline))
        }
        Err(RecvTimeoutError::Disconnected) => Err(DispatchError::handler_panicked(message_type)),
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn join_pipelines(pipelines: Vec<JoinHandle<()>>) {
    for pipeline in pipelines {
        let name = pipeline.thread().name().unwrap_or("pipeline").to_owned();
        if pipeline.join().is_err() {
            warn!(target: DISPATCH_TARGET, pipeline = %name, "pipeline thread panicked");
        }
    }
}
