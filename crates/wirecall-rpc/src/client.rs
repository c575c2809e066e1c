use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use wirecall_frame::{
    encode_message, format_timeout, FrameConfig, FrameError, FrameReader, FrameWriter, Message,
    PREFIX_SIZE, REQUEST_TIMEOUT_KEY,
};
use wirecall_transport::{dial, Stream};

use crate::call::{deliver, Call, Completion};
use crate::codec::{Codec, JsonCodec};
use crate::context::Context;
use crate::error::{Result, RpcError};
use crate::lock;

/// Client behavior config.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Per-call timeout applied by [`Client::call`] and advertised to the
    /// server in request metadata. `None` disables it.
    pub request_timeout: Option<Duration>,
    pub frame: FrameConfig,
}

impl ClientConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

/// Completes one pending call from its response (or failure). Runs at most
/// once, on whichever thread removes it from the registry.
type Completer<C> = Box<dyn FnOnce(&C, Result<Message>) + Send>;

struct Pending<C> {
    calls: HashMap<u64, Completer<C>>,
    closed: bool,
}

/// An encoded request waiting for the writer thread.
struct Outgoing {
    seq: u64,
    frame: Bytes,
    deadline: Option<Instant>,
}

struct Shared<C> {
    codec: C,
    seq: AtomicU64,
    pending: Mutex<Pending<C>>,
    /// Taken when the connection closes, which stops the writer thread.
    outbox: Mutex<Option<Sender<Outgoing>>>,
    max_frame_size: usize,
    peer: String,
}

/// Multiplexes concurrent calls over one connection.
///
/// Any number of threads may issue calls through a shared `&Client`. Each
/// call gets a fresh sequence number and a slot in the pending registry; a
/// single background reader routes responses back by sequence number, in
/// whatever order they arrive.
///
/// Requests are written by a dedicated writer thread in the order they
/// were issued, so starting a call never waits on the network.
pub struct Client<C: Codec = JsonCodec> {
    shared: Arc<Shared<C>>,
    stream: Stream,
    threads: Mutex<Vec<JoinHandle<()>>>,
    config: ClientConfig,
}

impl Client<JsonCodec> {
    /// Dial `addr` on `network` with default configuration.
    pub fn connect(network: &str, addr: &str) -> Result<Self> {
        Self::connect_with_config(network, addr, ClientConfig::default())
    }

    /// Dial `addr` on `network` with explicit configuration.
    pub fn connect_with_config(network: &str, addr: &str, config: ClientConfig) -> Result<Self> {
        let stream = dial(network, addr)?;
        info!(network, addr, "client connected");
        Self::from_stream(stream, config)
    }

    /// Take over an already connected stream.
    pub fn from_stream(stream: Stream, config: ClientConfig) -> Result<Self> {
        Self::with_codec(stream, JsonCodec, config)
    }
}

impl<C: Codec> Client<C> {
    /// Take over a connected stream using a custom payload codec.
    pub fn with_codec(stream: Stream, codec: C, config: ClientConfig) -> Result<Self> {
        let peer = stream.peer_addr();
        // The reader idles between responses; deadlines belong to callers.
        let reader = FrameReader::with_config(stream.try_clone()?, config.frame.clone());
        let writer = FrameWriter::with_config_stream(stream.try_clone()?, config.frame.clone())?;
        let (outbox, queue) = channel();

        let shared = Arc::new(Shared {
            codec,
            seq: AtomicU64::new(0),
            pending: Mutex::new(Pending {
                calls: HashMap::new(),
                closed: false,
            }),
            outbox: Mutex::new(Some(outbox)),
            max_frame_size: config.frame.max_frame_size,
            peer,
        });

        let client = Self {
            shared,
            stream,
            threads: Mutex::new(Vec::with_capacity(2)),
            config,
        };
        client.spawn("wirecall-client-writer", {
            let shared = Arc::clone(&client.shared);
            move || write_loop(shared, writer, queue)
        })?;
        client.spawn("wirecall-client-reader", {
            let shared = Arc::clone(&client.shared);
            move || read_loop(shared, reader)
        })?;
        Ok(client)
    }

    fn spawn(&self, name: &str, body: impl FnOnce() + Send + 'static) -> Result<()> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|err| RpcError::Transport(err.to_string()))?;
        lock(&self.threads).push(handle);
        Ok(())
    }

    /// Start a call and return immediately.
    ///
    /// The request is encoded on the calling thread and queued for the
    /// writer thread. Every failure, including an ill-formed target, an
    /// argument that does not encode or a failed write, is reported
    /// through the returned [`Call`].
    pub fn go<A, R>(&self, ctx: &Context, service_method: &str, args: &A) -> Call<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = sync_channel(1);
        let seq = self.go_with(ctx, service_method, args, tx);
        Call::new(seq, service_method.to_string(), rx)
    }

    /// Start a call that reports to a caller-supplied completion channel.
    ///
    /// Returns the call's sequence number, which stands in for the [`Call`]
    /// handle: the channel may be shared by many calls, and each
    /// [`Completion`] carries the same `seq`. Delivery never blocks: if the
    /// channel is full when the call finishes, that completion is dropped
    /// with a warning.
    pub fn go_with<A, R>(
        &self,
        ctx: &Context,
        service_method: &str,
        args: &A,
        done: SyncSender<Completion<R>>,
    ) -> u64
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let complete = completer::<C, R>(seq, service_method.to_string(), done);
        self.shared.send(ctx, seq, service_method, args, complete);
        seq
    }

    /// Make a call and block until it completes or its deadline passes.
    ///
    /// With a configured request timeout the context deadline is tightened
    /// to it and the timeout is advertised to the server under
    /// `rpc_request_timeout`.
    pub fn call<A, R>(&self, ctx: &Context, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let ctx = match self.config.request_timeout {
            Some(timeout) => ctx
                .clone()
                .with_timeout(timeout)
                .with_metadata(REQUEST_TIMEOUT_KEY, format_timeout(timeout)),
            None => ctx.clone(),
        };
        if ctx.is_expired() {
            return Err(RpcError::Timeout);
        }
        self.go(&ctx, service_method, args).wait_with(&ctx)
    }

    /// Close the connection.
    ///
    /// Calls still waiting fail with [`RpcError::ConnectionClosed`]; later
    /// calls fail the same way without touching the network.
    pub fn close(&self) -> Result<()> {
        self.shared.stop_accepting();
        self.stream.shutdown()?;
        let handles: Vec<JoinHandle<()>> = lock(&self.threads).drain(..).collect();
        for handle in handles {
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            if handle.join().is_err() {
                warn!(peer = %self.shared.peer, "client I/O thread panicked");
            }
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared.pending).closed
    }

    /// Number of calls registered and not yet completed, including calls
    /// whose callers already gave up waiting.
    pub fn pending_count(&self) -> usize {
        lock(&self.shared.pending).calls.len()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Remote address, for diagnostics.
    pub fn peer_addr(&self) -> &str {
        &self.shared.peer
    }
}

impl<C: Codec> Drop for Client<C> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(peer = %self.shared.peer, error = %err, "error closing client");
        }
    }
}

impl<C: Codec> Shared<C> {
    fn send<A: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        seq: u64,
        service_method: &str,
        args: &A,
        complete: Completer<C>,
    ) {
        let frame = match self.prepare(ctx, seq, service_method, args) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(seq, method = service_method, error = %err, "call failed before send");
                complete(&self.codec, Err(err));
                return;
            }
        };

        let outgoing = Outgoing {
            seq,
            frame,
            deadline: ctx.deadline(),
        };
        let mut pending = lock(&self.pending);
        // Registered under the same lock as the closed check, so a
        // concurrent drain either sees this call or rejects it here.
        let queued = !pending.closed
            && lock(&self.outbox)
                .as_ref()
                .is_some_and(|outbox| outbox.send(outgoing).is_ok());
        if !queued {
            drop(pending);
            complete(&self.codec, Err(RpcError::ConnectionClosed));
            return;
        }
        pending.calls.insert(seq, complete);
        drop(pending);
        debug!(seq, method = service_method, "queued request");
    }

    /// Complete one call if it is still pending.
    fn complete(&self, seq: u64, outcome: Result<Message>) {
        let complete = lock(&self.pending).calls.remove(&seq);
        match complete {
            Some(complete) => complete(&self.codec, outcome),
            None => debug!(seq, "no pending call; outcome discarded"),
        }
    }

    /// Refuse new calls and let the writer thread finish.
    fn stop_accepting(&self) {
        let mut pending = lock(&self.pending);
        pending.closed = true;
        lock(&self.outbox).take();
    }

    /// Encode a request frame without touching the connection.
    fn prepare<A: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        seq: u64,
        service_method: &str,
        args: &A,
    ) -> Result<Bytes> {
        let (service, method) = split_service_method(service_method)?;
        if ctx.is_expired() {
            return Err(RpcError::Timeout);
        }
        let body = self
            .codec
            .encode(args)
            .map_err(|err| RpcError::Codec(format!("encoding arguments: {err}")))?;

        let mut msg = Message::request(seq, service, method, body);
        msg.header.serialize_type = self.codec.serialize_type();
        msg.header.metadata = ctx.metadata().clone();

        let frame = encode_message(&msg)?;
        let total = frame.len() - PREFIX_SIZE;
        if total > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: total,
                max: self.max_frame_size,
            }
            .into());
        }
        Ok(frame)
    }

    fn fail_all(&self, err: RpcError) {
        let drained: Vec<(u64, Completer<C>)> = {
            let mut pending = lock(&self.pending);
            pending.closed = true;
            lock(&self.outbox).take();
            pending.calls.drain().collect()
        };
        if !drained.is_empty() {
            debug!(peer = %self.peer, count = drained.len(), "failing outstanding calls");
        }
        for (_, complete) in drained {
            complete(&self.codec, Err(err.clone()));
        }
    }
}

/// Write queued requests in order until the queue closes or a write fails.
///
/// A failed write may leave part of a frame on the wire, so it ends the
/// connection: the failing call gets the write error and every other
/// pending call fails with [`RpcError::ConnectionClosed`].
fn write_loop<C: Codec>(
    shared: Arc<Shared<C>>,
    mut writer: FrameWriter<Stream>,
    queue: Receiver<Outgoing>,
) {
    for outgoing in queue {
        let seq = outgoing.seq;
        if outgoing
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            debug!(seq, "deadline passed while queued; request not sent");
            shared.complete(seq, Err(RpcError::Timeout));
            continue;
        }
        if let Err(err) = writer.write_encoded(&outgoing.frame) {
            warn!(peer = %shared.peer, seq, error = %err, "request write failed; closing connection");
            shared.stop_accepting();
            shared.complete(seq, Err(RpcError::from(err)));
            if let Err(err) = writer.get_ref().shutdown() {
                debug!(peer = %shared.peer, error = %err, "shutdown after write failure");
            }
            shared.fail_all(RpcError::ConnectionClosed);
            return;
        }
        debug!(seq, bytes = outgoing.frame.len(), "request written");
    }
}

fn read_loop<C: Codec>(shared: Arc<Shared<C>>, mut reader: FrameReader<Stream>) {
    let reason = loop {
        let msg = match reader.read_message() {
            Ok(msg) => msg,
            Err(err) => break err,
        };
        shared.complete(msg.seq(), Ok(msg));
    };

    match reason {
        FrameError::ConnectionClosed => debug!(peer = %shared.peer, "connection closed"),
        err => warn!(peer = %shared.peer, error = %err, "client reader stopped"),
    }
    shared.fail_all(RpcError::ConnectionClosed);
}

fn completer<C: Codec, R: DeserializeOwned + Send + 'static>(
    seq: u64,
    service_method: String,
    done: SyncSender<Completion<R>>,
) -> Completer<C> {
    Box::new(move |codec: &C, outcome: Result<Message>| {
        let result = outcome.and_then(|msg| {
            if msg.is_error() {
                return Err(RpcError::Remote(msg.header.error));
            }
            codec
                .decode::<R>(&msg.body)
                .map_err(|err| RpcError::Codec(format!("reading body: {err}")))
        });
        deliver(
            &done,
            Completion {
                seq,
                service_method,
                result,
            },
        );
    })
}

/// Split `Service.Method` on the first `.`.
pub(crate) fn split_service_method(target: &str) -> Result<(&str, &str)> {
    match target.split_once('.') {
        Some((service, method)) if !service.is_empty() && !method.is_empty() => {
            Ok((service, method))
        }
        _ => Err(RpcError::InvalidServiceMethod(target.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_on_first_separator() {
        assert_eq!(split_service_method("Echo.Ping"), Ok(("Echo", "Ping")));
        assert_eq!(split_service_method("a.b.c"), Ok(("a", "b.c")));
    }

    #[test]
    fn split_rejects_ill_formed_targets() {
        for target in ["EchoPing", ".Ping", "Echo.", ""] {
            assert_eq!(
                split_service_method(target),
                Err(RpcError::InvalidServiceMethod(target.to_string()))
            );
        }
    }

    #[test]
    fn config_builders() {
        let config = ClientConfig::default().with_request_timeout(Duration::from_secs(2));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(2)));
        assert_eq!(
            config.frame.max_frame_size,
            wirecall_frame::DEFAULT_MAX_FRAME_SIZE
        );
    }
}
