use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

use tracing::{debug, info, warn};
use wirecall_frame::{FrameConfig, FrameError, FrameReader, FrameWriter, Message, MessageType};
use wirecall_transport::{Listener, Stream};

use crate::codec::{Codec, JsonCodec};
use crate::context::RequestContext;
use crate::error::{Result, RpcError};
use crate::service::{Invoker, Service};

/// Server behavior config.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Applied to every accepted connection. A read timeout closes
    /// connections that stay idle for longer.
    pub frame: FrameConfig,
}

impl ServerConfig {
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

struct ServiceEntry<C> {
    methods: HashMap<String, Invoker<C>>,
    metadata: HashMap<String, String>,
}

type Registry<C> = RwLock<HashMap<String, ServiceEntry<C>>>;

/// Dispatches requests to registered services.
///
/// Every accepted connection gets its own thread, which decodes one
/// request at a time, runs the handler and writes the response back with
/// the request's sequence number.
pub struct Server<C: Codec = JsonCodec> {
    registry: Arc<Registry<C>>,
    codec: Arc<C>,
    config: ServerConfig,
}

impl Server<JsonCodec> {
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for Server<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> Server<C> {
    pub fn with_codec(codec: C) -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            codec: Arc::new(codec),
            config: ServerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a service with free-form metadata describing it.
    ///
    /// Fails if the name is already bound, the name cannot appear in a
    /// call target, a method was defined twice, or there are no methods.
    pub fn register(&self, service: Service<C>, metadata: HashMap<String, String>) -> Result<()> {
        let (name, methods) = service.into_methods()?;
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if registry.contains_key(&name) {
            return Err(RpcError::DuplicateService(name));
        }
        info!(service = %name, methods = methods.len(), "registered service");
        registry.insert(name, ServiceEntry { methods, metadata });
        Ok(())
    }

    /// Metadata a service was registered with.
    pub fn service_metadata(&self, name: &str) -> Option<HashMap<String, String>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| entry.metadata.clone())
    }

    /// Registered service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    /// Bind a listener without serving it yet (useful to learn the bound
    /// port before handing it to [`Server::serve_listener`]).
    pub fn listen(&self, network: &str, addr: &str) -> Result<Listener> {
        let listener = Listener::bind(network, addr)?;
        info!(network, addr = %listener.local_addr(), "server listening");
        Ok(listener)
    }

    /// Bind and serve until accepting fails.
    pub fn serve(&self, network: &str, addr: &str) -> Result<()> {
        let listener = self.listen(network, addr)?;
        self.serve_listener(listener)
    }

    /// Accept connections forever, one thread each. Returns only when
    /// accepting fails.
    pub fn serve_listener(&self, listener: Listener) -> Result<()> {
        loop {
            let stream = match listener.accept() {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "accept failed; server stopping");
                    return Err(err.into());
                }
            };
            let peer = stream.peer_addr();
            debug!(peer = %peer, "accepted connection");

            let conn = Connection {
                registry: Arc::clone(&self.registry),
                codec: Arc::clone(&self.codec),
                config: self.config.frame.clone(),
                peer,
            };
            let spawned = thread::Builder::new()
                .name("wirecall-conn".to_string())
                .spawn(move || conn.run(stream));
            if let Err(err) = spawned {
                warn!(error = %err, "failed to spawn connection thread");
            }
        }
    }
}

struct Connection<C> {
    registry: Arc<Registry<C>>,
    codec: Arc<C>,
    config: FrameConfig,
    peer: String,
}

impl<C: Codec> Connection<C> {
    fn run(self, stream: Stream) {
        match self.serve(stream) {
            Ok(()) | Err(RpcError::ConnectionClosed) => {
                debug!(peer = %self.peer, "connection closed");
            }
            Err(err) => warn!(peer = %self.peer, error = %err, "connection dropped"),
        }
    }

    fn serve(&self, stream: Stream) -> Result<()> {
        let mut reader = FrameReader::with_config_stream(stream.try_clone()?, self.config.clone())?;
        let mut writer = FrameWriter::with_config_stream(stream, self.config.clone())?;

        loop {
            let request = match reader.read_message() {
                Ok(msg) => msg,
                Err(FrameError::ConnectionClosed) => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            if request.header.message_type != MessageType::Request {
                debug!(peer = %self.peer, seq = request.seq(), "ignoring non-request frame");
                continue;
            }

            let response = self.dispatch(request);
            self.reply(&mut writer, response)?;
        }
    }

    /// Write `response`, swapping in an error reply when it does not fit in
    /// one frame. The size check fails before any byte is written, so the
    /// connection stays usable.
    fn reply<W: Write>(&self, writer: &mut FrameWriter<W>, response: Message) -> Result<()> {
        match writer.write_message(&response) {
            Err(FrameError::FrameTooLarge { size, max }) => {
                let header = &response.header;
                warn!(
                    peer = %self.peer,
                    seq = header.seq,
                    service = %header.service_name,
                    method = %header.method_name,
                    size,
                    max,
                    "reply too large; sending error instead"
                );
                let text = format!(
                    "rpc: reply of {}.{} too large ({size} bytes, max {max})",
                    header.service_name, header.method_name
                );
                writer.write_message(&Message::error_response_to(header, text))?;
                Ok(())
            }
            written => Ok(written?),
        }
    }

    /// Find a method, releasing the registry lock before it runs.
    fn lookup(&self, service: &str, method: &str) -> std::result::Result<Invoker<C>, String> {
        let registry = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = registry
            .get(service)
            .ok_or_else(|| format!("rpc: can't find service {service}"))?;
        entry
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| format!("rpc: can't find method {service}.{method}"))
    }

    fn dispatch(&self, request: Message) -> Message {
        let header = request.header;
        let ctx = RequestContext::new(
            header.seq,
            header.service_name.clone(),
            header.method_name.clone(),
            header.metadata.clone(),
            self.peer.clone(),
        );

        let outcome = self
            .lookup(&header.service_name, &header.method_name)
            .and_then(|invoke| invoke(self.codec.as_ref(), &ctx, request.body.as_ref()));

        match outcome {
            Ok(body) => {
                debug!(
                    seq = header.seq,
                    service = %header.service_name,
                    method = %header.method_name,
                    "call served"
                );
                Message::response_to(&header, body)
            }
            Err(text) => {
                debug!(
                    seq = header.seq,
                    service = %header.service_name,
                    method = %header.method_name,
                    error = %text,
                    "call failed"
                );
                Message::error_response_to(&header, text)
            }
        }
    }
}
