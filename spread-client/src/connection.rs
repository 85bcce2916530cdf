//! A session with one daemon.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, info, warn};

use crate::auth::AuthMethod;
use crate::config::ConnectOptions;
use crate::dispatcher::{self, Deferred, ListenerChange, Registry};
use crate::error::{Error, Result};
use crate::frame;
use crate::group::{Group, GroupHandle};
use crate::handshake::{self, Established};
use crate::listener::{AdvancedListener, BasicListener};
use crate::message::Message;
use crate::protocol::{Version, DISPATCH_READ_TIMEOUT};
use crate::service::ServiceType;
use crate::transport::{FrameReader, Wait};

/// Locks `mutex`, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: a disconnected connection is never reused.
    Closed,
}

struct Session {
    state: State,
    auth: AuthMethod,
    auth_registered: bool,
}

pub(crate) struct Transport {
    pub(crate) reader: Mutex<FrameReader>,
    writer: Mutex<TcpStream>,
    control: TcpStream,
}

pub(crate) struct Inner {
    session: Mutex<Session>,
    connected: AtomicBool,
    established: OnceLock<Established>,
    transport: OnceLock<Transport>,
    pub(crate) registry: Mutex<Registry>,
}

/// A connection to a daemon.
///
/// `Connection` is a cheap handle; clones share the same session, so a
/// clone can be moved into a listener that needs to send, join or
/// disconnect from inside a callback.
///
/// Messages are either pulled with [`Connection::receive`] or pushed to
/// listeners by a background dispatcher, never both at once: `receive`
/// fails while any listener is registered.
///
/// ```no_run
/// use spread_client::{ConnectOptions, Connection, Message, Reliability};
///
/// # fn main() -> spread_client::Result<()> {
/// let connection = Connection::open(&ConnectOptions::new("alice"))?;
/// let _group = connection.join("chat")?;
///
/// let mut message = Message::new();
/// message.set_reliability(Reliability::Safe);
/// message.add_group("chat");
/// message.set_data(b"hello".to_vec());
/// connection.multicast(&message)?;
///
/// let reply = connection.receive()?;
/// println!("{:?} says {:?}", reply.sender(), reply.data());
/// connection.disconnect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<Inner>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("mailbox", &self.local_mailbox())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    /// A connection that has not been connected yet. Listeners and an
    /// authentication method may be registered before [`Connection::connect`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(Session {
                    state: State::Disconnected,
                    auth: AuthMethod::default(),
                    auth_registered: false,
                }),
                connected: AtomicBool::new(false),
                established: OnceLock::new(),
                transport: OnceLock::new(),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Creates a connection and connects it.
    pub fn open(options: &ConnectOptions) -> Result<Self> {
        let connection = Self::new();
        connection.connect(options)?;
        Ok(connection)
    }

    /// Selects the authentication method used by [`Connection::connect`].
    /// Only one method may be registered, and only before connecting.
    pub fn register_authentication(&self, method: AuthMethod) -> Result<()> {
        let mut session = lock(&self.inner.session);
        match session.state {
            State::Disconnected => {}
            State::Connecting | State::Connected => return Err(Error::AlreadyConnected),
            State::Closed => return Err(Error::Closed),
        }
        if session.auth_registered {
            return Err(Error::AuthAlreadyRegistered);
        }

        debug!(method = method.name(), "authentication method registered");
        session.auth = method;
        session.auth_registered = true;
        Ok(())
    }

    /// Opens the TCP session and runs the handshake.
    ///
    /// Starts the dispatcher if listeners were added beforehand. A failed
    /// attempt leaves the connection disconnected, so it can be retried.
    pub fn connect(&self, options: &ConnectOptions) -> Result<()> {
        let mut session = lock(&self.inner.session);
        match session.state {
            State::Disconnected => {}
            State::Connecting | State::Connected => return Err(Error::AlreadyConnected),
            State::Closed => return Err(Error::Closed),
        }

        session.state = State::Connecting;
        match self.establish(options, &session.auth) {
            Ok(()) => {
                session.state = State::Connected;
                Ok(())
            }
            Err(err) => {
                session.state = State::Disconnected;
                Err(err)
            }
        }
    }

    fn establish(&self, options: &ConnectOptions, auth: &AuthMethod) -> Result<()> {
        let addrs = options.socket_addrs()?;
        let mut stream =
            TcpStream::connect(&addrs[..]).map_err(Error::io("connecting to daemon"))?;
        stream
            .set_nodelay(true)
            .map_err(Error::io("setting TCP_NODELAY"))?;

        let established = handshake::perform_handshake(&mut stream, options, auth)?;

        stream
            .set_read_timeout(Some(DISPATCH_READ_TIMEOUT))
            .map_err(Error::io("setting read timeout"))?;
        let reader = stream
            .try_clone()
            .map_err(Error::io("cloning daemon socket"))?;
        let control = stream
            .try_clone()
            .map_err(Error::io("cloning daemon socket"))?;

        info!(
            mailbox = %established.mailbox,
            version = %established.daemon_version,
            daemon = %options.host_name(),
            port = addrs[0].port(),
            "connected to daemon"
        );

        // Both cells are empty: a connection reaches this point only once.
        let _ = self.inner.established.set(established);
        let _ = self.inner.transport.set(Transport {
            reader: Mutex::new(FrameReader::new(reader)),
            writer: Mutex::new(stream),
            control,
        });
        self.inner.connected.store(true, Ordering::Release);

        let mut registry = lock(&self.inner.registry);
        if !registry.is_empty() && registry.dispatcher.is_none() {
            match dispatcher::spawn(self.clone()) {
                Ok(handle) => registry.dispatcher = Some(handle),
                Err(err) => warn!(error = %err, "listeners registered but no dispatcher running"),
            }
        }
        Ok(())
    }

    /// Ends the session.
    ///
    /// Called from a listener, the disconnect happens once the current
    /// message has been delivered to every listener. Fails with
    /// [`Error::NotConnected`] unless connected; in particular a second call
    /// fails.
    pub fn disconnect(&self) -> Result<()> {
        let mut session = lock(&self.inner.session);
        if session.state != State::Connected {
            return Err(Error::NotConnected);
        }

        {
            let mut registry = lock(&self.inner.registry);
            if registry.delivering {
                registry.deferred.push_back(Deferred::Disconnect);
                debug!("disconnect deferred until delivery completes");
                return Ok(());
            }
            session.state = State::Closed;
            self.inner.connected.store(false, Ordering::Release);
        }
        drop(session);

        let kill = self.send_kill();

        let handle = lock(&self.inner.registry).stop_dispatcher();
        if let Some(handle) = handle {
            handle.join();
        }

        if let Some(transport) = self.inner.transport.get() {
            match transport.control.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotConnected => {}
                Err(err) => warn!(error = %err, "failed to shut down daemon socket"),
            }
        }

        info!(mailbox = ?self.local_mailbox().map(GroupHandle::name), "disconnected");
        kill
    }

    fn send_kill(&self) -> Result<()> {
        let Some(mailbox) = self.local_mailbox() else {
            return Ok(());
        };
        let mut kill = Message::new();
        kill.set_service_type(ServiceType::KILL);
        kill.add_group(mailbox.clone());
        self.write(&[frame::encode(&kill, mailbox)?])
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// The private group the daemon assigned to this connection.
    pub fn local_mailbox(&self) -> Option<&GroupHandle> {
        self.inner
            .established
            .get()
            .map(|established| &established.mailbox)
    }

    /// Version reported by the daemon during the handshake.
    pub fn daemon_version(&self) -> Option<Version> {
        self.inner
            .established
            .get()
            .map(|established| established.daemon_version)
    }

    pub(crate) fn transport(&self) -> Option<&Transport> {
        self.inner.transport.get()
    }

    fn connected_transport(&self) -> Result<(&Transport, &GroupHandle)> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        match (self.transport(), self.local_mailbox()) {
            (Some(transport), Some(mailbox)) => Ok((transport, mailbox)),
            _ => Err(Error::NotConnected),
        }
    }

    /// Joins `name`, returning the handle used to leave it again.
    pub fn join(&self, name: &str) -> Result<Group> {
        let mut group = Group::new();
        group.join(self, name)?;
        Ok(group)
    }

    /// Sends `message` to its groups.
    pub fn multicast(&self, message: &Message) -> Result<()> {
        self.multicast_all(std::slice::from_ref(message))
    }

    /// Sends every message in order, without other writers interleaving.
    /// Nothing is sent if any of them cannot be encoded.
    pub fn multicast_all(&self, messages: &[Message]) -> Result<()> {
        let (_, mailbox) = self.connected_transport()?;
        let frames = messages
            .iter()
            .map(|message| frame::encode(message, mailbox))
            .collect::<Result<Vec<_>>>()?;
        self.write(&frames)
    }

    fn write(&self, frames: &[bytes::Bytes]) -> Result<()> {
        let Some(transport) = self.transport() else {
            return Err(Error::NotConnected);
        };
        let mut writer = lock(&transport.writer);
        for frame in frames {
            writer
                .write_all(frame)
                .map_err(Error::io("sending message"))?;
        }
        Ok(())
    }

    /// Blocks until the next message arrives.
    pub fn receive(&self) -> Result<Message> {
        let mut messages = self.receive_many(1)?;
        messages.pop().ok_or(Error::NotConnected)
    }

    /// Blocks until `count` messages have arrived. Another receiver cannot
    /// take messages out of the middle of the batch.
    pub fn receive_many(&self, count: usize) -> Result<Vec<Message>> {
        let (transport, mailbox) = self.connected_transport()?;
        if !lock(&self.inner.registry).is_empty() {
            return Err(Error::ReceiveWhileListening);
        }

        let mut reader = lock(&transport.reader);
        let mut messages = Vec::with_capacity(count);
        while messages.len() < count {
            if let Some(raw) = reader.read_frame(Wait::Block)? {
                messages.push(frame::decode(raw, mailbox)?);
            }
        }
        Ok(messages)
    }

    /// True when a whole message is waiting to be received.
    pub fn poll(&self) -> Result<bool> {
        let (transport, _) = self.connected_transport()?;
        lock(&transport.reader).frame_ready()
    }

    pub fn add_basic_listener(&self, listener: Arc<dyn BasicListener>) -> Result<()> {
        self.change_listeners(ListenerChange::AddBasic(listener))
    }

    pub fn add_advanced_listener(&self, listener: Arc<dyn AdvancedListener>) -> Result<()> {
        self.change_listeners(ListenerChange::AddAdvanced(listener))
    }

    /// Removes a listener previously added with the same `Arc`.
    pub fn remove_basic_listener(&self, listener: &Arc<dyn BasicListener>) -> Result<()> {
        self.change_listeners(ListenerChange::RemoveBasic(Arc::clone(listener)))
    }

    pub fn remove_advanced_listener(&self, listener: &Arc<dyn AdvancedListener>) -> Result<()> {
        self.change_listeners(ListenerChange::RemoveAdvanced(Arc::clone(listener)))
    }

    fn change_listeners(&self, change: ListenerChange) -> Result<()> {
        let mut registry = lock(&self.inner.registry);
        if registry.delivering {
            registry.deferred.push_back(Deferred::Listeners(change));
            return Ok(());
        }
        registry.apply(change);

        if !self.is_connected() {
            return Ok(());
        }
        if registry.is_empty() {
            let handle = registry.stop_dispatcher();
            drop(registry);
            if let Some(handle) = handle {
                handle.join();
            }
        } else if registry.dispatcher.is_none() {
            registry.dispatcher = Some(dispatcher::spawn(self.clone())?);
        }
        Ok(())
    }
}
