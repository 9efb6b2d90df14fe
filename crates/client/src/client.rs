//! Shadow server client
//!
//! One `ShadowClient` owns one channel. Any number of threads may share it:
//! each event is encoded into a private buffer and written under a single
//! lock, so events from different threads never interleave on the wire.
//!
//! # Example
//!
//! ```
//! use shadowvm_client::{ClientConfig, ShadowClient};
//!
//! let client = ShadowClient::new(Vec::new(), ClientConfig::default());
//! let id = client.register_method("demo.Points.pointEvent").unwrap();
//!
//! let mut event = client.analysis_start(id).unwrap();
//! event.send_int(3);
//! event.send_int(4);
//! event.analysis_end().unwrap();
//!
//! let bytes = client.into_inner().unwrap();
//! assert!(!bytes.is_empty());
//! ```

use std::io::{BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use bytes::BytesMut;
use parking_lot::Mutex;
use shadowvm_protocol::{
    Argument, ClassInfo, Close, DEFAULT_MAX_MESSAGE_SIZE, EventId, InvocationEncoder,
    NetReference, NewClass, ObjectFree, RegisterAnalysis, SpecialPayload, StringInfo, ThreadInfo,
};

use crate::bypass::BypassGuard;
use crate::error::{ClientError, Result};
use crate::refs::RefAllocator;
use crate::registry::EventRegistry;

/// Default channel buffer size (64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Write buffer size in bytes
    pub buffer_size: usize,
    /// Flush the channel after every completed event
    pub flush_each_event: bool,
    /// Largest class file accepted by `load_class`
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_each_event: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Inline snapshot sent together with an object argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectData<'a> {
    /// Value of a string object
    String(&'a str),
    /// Name and daemon flag of a thread object
    Thread { name: &'a str, daemon: bool },
}

struct Channel<W: Write> {
    writer: BufWriter<W>,
    registry: EventRegistry,
    closed: bool,
}

impl<W: Write> Channel<W> {
    fn write(&mut self, bytes: &[u8], flush: bool) -> Result<()> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        self.writer.write_all(bytes)?;
        if flush {
            self.writer.flush()?;
        }
        Ok(())
    }
}

/// Client side of a shadow session
pub struct ShadowClient<W: Write = TcpStream> {
    channel: Mutex<Channel<W>>,
    refs: RefAllocator,
    config: ClientConfig,
}

impl ShadowClient<TcpStream> {
    /// Connect to a shadow server
    ///
    /// Uses a blocking socket: the instrumented process may not run an
    /// async runtime of its own.
    pub fn connect<A: ToSocketAddrs>(addr: A, config: ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        if let Ok(peer) = stream.peer_addr() {
            tracing::debug!(peer = %peer, "connected to shadow server");
        }
        Ok(Self::new(stream, config))
    }
}

impl<W: Write> ShadowClient<W> {
    /// Create a client over an arbitrary writer
    pub fn new(writer: W, config: ClientConfig) -> Self {
        Self {
            channel: Mutex::new(Channel {
                writer: BufWriter::with_capacity(config.buffer_size, writer),
                registry: EventRegistry::new(),
                closed: false,
            }),
            refs: RefAllocator::new(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register an analysis method and announce it to the server
    ///
    /// `name` is `analysis.method`. Registering the same name again returns
    /// the same id without writing anything.
    pub fn register_method(&self, name: &str) -> Result<EventId> {
        let _bypass = BypassGuard::enter();

        let mut channel = self.channel.lock();
        if let Some(id) = channel.registry.get(name) {
            return Ok(id);
        }

        let id = channel.registry.peek(name)?;
        let mut buf = BytesMut::with_capacity(3 + 2 + name.len());
        RegisterAnalysis {
            event_id: id,
            method: name,
        }
        .encode(&mut buf)?;
        channel.write(&buf, false)?;
        channel.registry.insert(name)?;
        Ok(id)
    }

    /// Start an event
    ///
    /// Holds the calling thread's bypass flag until the returned invocation
    /// is finished or dropped. Fails with [`ClientError::Reentrant`] if the
    /// thread is already inside the send path.
    pub fn analysis_start(&self, event_id: EventId) -> Result<Invocation<'_, W>> {
        let guard = BypassGuard::enter().ok_or(ClientError::Reentrant)?;
        Ok(Invocation {
            client: self,
            event_id,
            encoder: InvocationEncoder::new(event_id),
            _bypass: guard,
        })
    }

    fn write_event(&self, event_id: EventId, bytes: &[u8]) -> Result<()> {
        let mut channel = self.channel.lock();
        if !channel.registry.contains_id(event_id) {
            return Err(ClientError::UnknownEventId(event_id));
        }
        channel.write(bytes, self.config.flush_each_event)
    }

    /// Announce a loaded class
    ///
    /// Sends the class file and the class object identity in one write and
    /// returns the new class reference. Instances are then created with
    /// [`new_object`](Self::new_object).
    pub fn load_class(
        &self,
        name: &str,
        loader: NetReference,
        bytecode: &[u8],
        superclass: Option<NetReference>,
    ) -> Result<NetReference> {
        let _bypass = BypassGuard::enter();

        // tag, name, loader, code length, code
        let size = 1 + 2 + name.len() + 8 + 4 + bytecode.len();
        if size > self.config.max_message_size {
            return Err(shadowvm_protocol::ProtocolError::message_too_large(
                size,
                self.config.max_message_size,
            )
            .into());
        }
        if let Some(superclass) = superclass
            && !superclass.is_class_instance()
        {
            return Err(ClientError::NotAClassReference(superclass));
        }

        let class_ref = self.refs.class()?;
        let mut buf = BytesMut::with_capacity(32 + 2 * name.len() + bytecode.len());
        NewClass {
            name,
            loader,
            code: bytecode,
        }
        .encode(&mut buf)?;
        ClassInfo {
            class_ref,
            name,
            loader,
            superclass,
        }
        .encode(&mut buf)?;

        self.channel.lock().write(&buf, false)?;
        Ok(class_ref)
    }

    /// Allocate a reference for a new instance of `class_ref`
    ///
    /// Nothing is sent: the server creates the shadow object when the
    /// reference first appears in an event.
    #[inline]
    pub fn new_object(&self, class_ref: NetReference) -> Result<NetReference> {
        self.refs.object(class_ref)
    }

    /// Send the value of a string object
    pub fn string_info(&self, net_ref: NetReference, value: &str) -> Result<()> {
        let _bypass = BypassGuard::enter();
        let mut buf = BytesMut::with_capacity(11 + value.len());
        StringInfo { net_ref, value }.encode(&mut buf)?;
        self.channel.lock().write(&buf, false)
    }

    /// Send the name and daemon flag of a thread object
    pub fn thread_info(&self, net_ref: NetReference, name: &str, daemon: bool) -> Result<()> {
        let _bypass = BypassGuard::enter();
        let mut buf = BytesMut::with_capacity(12 + name.len());
        ThreadInfo {
            net_ref,
            name,
            daemon,
        }
        .encode(&mut buf)?;
        self.channel.lock().write(&buf, false)
    }

    /// Report objects reclaimed by the client
    pub fn objects_freed(&self, refs: &[NetReference]) -> Result<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let _bypass = BypassGuard::enter();
        let mut buf = BytesMut::new();
        ObjectFree {
            refs: refs.to_vec(),
        }
        .encode(&mut buf)?;
        self.channel.lock().write(&buf, false)
    }

    /// Push buffered messages to the channel
    pub fn flush(&self) -> Result<()> {
        let _bypass = BypassGuard::enter();
        let mut channel = self.channel.lock();
        if channel.closed {
            return Err(ClientError::Closed);
        }
        channel.writer.flush()?;
        Ok(())
    }

    /// End the session
    ///
    /// Sends CLOSE and flushes. Later sends fail with
    /// [`ClientError::Closed`]; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _bypass = BypassGuard::enter();
        let mut channel = self.channel.lock();
        if channel.closed {
            return Ok(());
        }
        let mut buf = BytesMut::with_capacity(1);
        Close.encode(&mut buf);
        channel.write(&buf, true)?;
        channel.closed = true;
        tracing::debug!(events = channel.registry.len(), "shadow session closed");
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W> {
        let _bypass = BypassGuard::enter();
        let channel = self.channel.into_inner();
        channel
            .writer
            .into_inner()
            .map_err(|err| ClientError::Io(err.into_error()))
    }
}

/// One event being assembled
///
/// Argument values are buffered privately; nothing reaches the channel
/// until [`analysis_end`](Self::analysis_end). Dropping an unfinished
/// invocation discards it.
pub struct Invocation<'a, W: Write> {
    client: &'a ShadowClient<W>,
    event_id: EventId,
    encoder: InvocationEncoder,
    _bypass: BypassGuard,
}

impl<W: Write> Invocation<'_, W> {
    #[inline]
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    #[inline]
    pub fn send_boolean(&mut self, value: bool) {
        self.encoder.push(Argument::Boolean(value));
    }

    #[inline]
    pub fn send_byte(&mut self, value: i8) {
        self.encoder.push(Argument::Byte(value));
    }

    #[inline]
    pub fn send_char(&mut self, value: u16) {
        self.encoder.push(Argument::Char(value));
    }

    #[inline]
    pub fn send_short(&mut self, value: i16) {
        self.encoder.push(Argument::Short(value));
    }

    #[inline]
    pub fn send_int(&mut self, value: i32) {
        self.encoder.push(Argument::Int(value));
    }

    #[inline]
    pub fn send_long(&mut self, value: i64) {
        self.encoder.push(Argument::Long(value));
    }

    #[inline]
    pub fn send_float(&mut self, value: f32) {
        self.encoder.push(Argument::Float(value));
    }

    #[inline]
    pub fn send_double(&mut self, value: f64) {
        self.encoder.push(Argument::Double(value));
    }

    /// Send an object by reference, `None` for null
    #[inline]
    pub fn send_object(&mut self, value: Option<NetReference>) {
        let net_ref = value.unwrap_or(NetReference::NULL);
        self.encoder.push(Argument::Object(net_ref));
    }

    /// Send an object together with a snapshot of its data
    ///
    /// The server materializes the specialized shadow before the argument
    /// is resolved, so no separate info message is needed.
    pub fn send_object_plus_data(&mut self, value: NetReference, data: ObjectData<'_>) -> Result<()> {
        let net_ref = value.with_special();
        let payload = match data {
            ObjectData::String(value) => SpecialPayload::String(StringInfo { net_ref, value }),
            ObjectData::Thread { name, daemon } => SpecialPayload::Thread(ThreadInfo {
                net_ref,
                name,
                daemon,
            }),
        };
        self.encoder.push_special(&payload)?;
        self.encoder.push(Argument::Object(net_ref));
        Ok(())
    }

    /// Finish the event and write it to the channel
    pub fn analysis_end(self) -> Result<()> {
        let Self {
            client,
            event_id,
            encoder,
            _bypass,
        } = self;
        let bytes = encoder.finish()?;
        client.write_event(event_id, &bytes)
    }
}
