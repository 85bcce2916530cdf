//! Background delivery of incoming messages to registered listeners.
//!
//! The dispatcher is a thread that exists only while a connection is
//! connected and has at least one listener. Each round it reads one frame,
//! marks the registry as delivering, hands the decoded message to every
//! basic listener and then every advanced listener, and finally applies the
//! listener changes and disconnect requests that arrived in the meantime,
//! in the order they were made.
//!
//! Locks are taken in the order: frame reader, then registry. The registry
//! lock is never held while a listener runs.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::connection::{lock, Connection};
use crate::error::{Error, Result};
use crate::frame;
use crate::listener::{same_listener, AdvancedListener, BasicListener};
use crate::message::Message;
use crate::transport::Wait;

/// A change to the listener sets.
pub(crate) enum ListenerChange {
    AddBasic(Arc<dyn BasicListener>),
    AddAdvanced(Arc<dyn AdvancedListener>),
    RemoveBasic(Arc<dyn BasicListener>),
    RemoveAdvanced(Arc<dyn AdvancedListener>),
}

/// Work postponed until the current delivery round ends.
pub(crate) enum Deferred {
    Listeners(ListenerChange),
    Disconnect,
}

/// Listener sets plus the state shared with the dispatcher thread.
#[derive(Default)]
pub(crate) struct Registry {
    basic: Vec<Arc<dyn BasicListener>>,
    advanced: Vec<Arc<dyn AdvancedListener>>,
    pub(crate) delivering: bool,
    pub(crate) deferred: VecDeque<Deferred>,
    pub(crate) dispatcher: Option<DispatcherHandle>,
}

impl Registry {
    pub(crate) fn is_empty(&self) -> bool {
        self.basic.is_empty() && self.advanced.is_empty()
    }

    pub(crate) fn apply(&mut self, change: ListenerChange) {
        match change {
            ListenerChange::AddBasic(listener) => self.basic.push(listener),
            ListenerChange::AddAdvanced(listener) => self.advanced.push(listener),
            ListenerChange::RemoveBasic(listener) => {
                self.basic.retain(|known| !same_listener(known, &listener))
            }
            ListenerChange::RemoveAdvanced(listener) => {
                self.advanced.retain(|known| !same_listener(known, &listener))
            }
        }
    }

    /// Takes the dispatcher handle out and tells its thread to stop.
    pub(crate) fn stop_dispatcher(&mut self) -> Option<DispatcherHandle> {
        let handle = self.dispatcher.take()?;
        handle.stop.store(true, Ordering::Release);
        Some(handle)
    }
}

pub(crate) struct DispatcherHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Waits for the thread to finish. Does nothing when called from the
    /// dispatcher thread itself.
    pub(crate) fn join(self) {
        if self.thread.thread().id() == thread::current().id() {
            return;
        }
        if self.thread.join().is_err() {
            error!("dispatcher thread panicked");
        }
    }
}

/// Starts a dispatcher for `connection`.
pub(crate) fn spawn(connection: Connection) -> Result<DispatcherHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let name = match connection.local_mailbox() {
        Some(mailbox) => format!("spread-dispatcher-{mailbox}"),
        None => "spread-dispatcher".to_string(),
    };

    let thread_stop = Arc::clone(&stop);
    let thread = thread::Builder::new()
        .name(name)
        .spawn(move || run(connection, thread_stop))
        .map_err(Error::io("spawning dispatcher thread"))?;

    debug!("dispatcher started");
    Ok(DispatcherHandle { stop, thread })
}

enum Round {
    Continue,
    Exit,
}

fn run(connection: Connection, stop: Arc<AtomicBool>) {
    let (Some(transport), Some(mailbox)) = (connection.transport(), connection.local_mailbox())
    else {
        return;
    };

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }

        let (raw, basic, advanced) = {
            let mut reader = lock(&transport.reader);
            let raw = match reader.read_frame(Wait::Until(&stop)) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(Error::IllegalMessage) => {
                    warn!("dropping illegal message");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "dispatcher stopping after read failure");
                    detach(&connection, &stop);
                    break;
                }
            };

            let mut registry = lock(&connection.inner.registry);
            if stop.load(Ordering::Acquire) {
                reader.unread(raw);
                break;
            }
            registry.delivering = true;
            (raw, registry.basic.clone(), registry.advanced.clone())
        };

        match frame::decode(raw, mailbox) {
            Ok(message) => deliver(&message, &basic, &advanced),
            Err(err) => warn!(error = %err, "dropping undecodable message"),
        }

        if let Round::Exit = finish_round(&connection, &stop) {
            break;
        }
    }

    debug!("dispatcher stopped");
}

fn deliver(
    message: &Message,
    basic: &[Arc<dyn BasicListener>],
    advanced: &[Arc<dyn AdvancedListener>],
) {
    for listener in basic {
        guarded(|| listener.message_received(message));
    }
    for listener in advanced {
        if message.is_regular() {
            guarded(|| listener.regular_message_received(message));
        } else {
            guarded(|| listener.membership_message_received(message));
        }
    }
}

fn guarded(callback: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        warn!("listener panicked; continuing delivery");
    }
}

/// Ends a delivery round: applies deferred work and decides whether the
/// dispatcher keeps running.
fn finish_round(connection: &Connection, stop: &Arc<AtomicBool>) -> Round {
    let mut registry = lock(&connection.inner.registry);
    registry.delivering = false;

    while let Some(deferred) = registry.deferred.pop_front() {
        match deferred {
            Deferred::Listeners(change) => registry.apply(change),
            Deferred::Disconnect => {
                registry.deferred.clear();
                drop(registry);
                if let Err(err) = connection.disconnect() {
                    warn!(error = %err, "deferred disconnect failed");
                }
                return Round::Exit;
            }
        }
    }

    if stop.load(Ordering::Acquire) || registry.is_empty() {
        forget(&mut registry, stop);
        return Round::Exit;
    }
    Round::Continue
}

/// Forgets this dispatcher after a fatal error so a later listener change
/// can start a new one.
fn detach(connection: &Connection, stop: &Arc<AtomicBool>) {
    forget(&mut lock(&connection.inner.registry), stop);
}

/// Drops the registry's handle if it belongs to the dispatcher owning
/// `stop`, which detaches that thread.
fn forget(registry: &mut Registry, stop: &Arc<AtomicBool>) {
    let ours = registry
        .dispatcher
        .as_ref()
        .is_some_and(|handle| Arc::ptr_eq(&handle.stop, stop));
    if ours {
        registry.dispatcher.take();
    }
}
