//! Callbacks for asynchronous delivery.
//!
//! Listeners are shared as `Arc<dyn ...>` and identified by that `Arc`:
//! pass a clone of the same `Arc` to remove one again. Callbacks run on the
//! connection's dispatcher thread and may call back into the connection,
//! including adding or removing listeners and disconnecting; such changes
//! take effect once the current message has been delivered to everyone.

use std::sync::Arc;

use crate::message::Message;

/// Receives every message, regular or membership.
pub trait BasicListener: Send + Sync {
    fn message_received(&self, message: &Message);
}

impl<F> BasicListener for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn message_received(&self, message: &Message) {
        self(message)
    }
}

/// Receives regular and membership messages through separate handlers.
///
/// Only regular messages reach [`AdvancedListener::regular_message_received`];
/// everything else, reject notices included, goes to
/// [`AdvancedListener::membership_message_received`].
pub trait AdvancedListener: Send + Sync {
    fn regular_message_received(&self, message: &Message);

    fn membership_message_received(&self, message: &Message);
}

/// Identity comparison on the allocation, ignoring vtables.
pub(crate) fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
