//! Synchronous change notification.
//!
//! A [`Notifier`] fans each message out to every registered [`Listener`], in
//! registration order, before `notify` returns. Everything here is single-threaded:
//! the simulation tick owns the notifier and all listeners run on that tick.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Receiver of messages from a [`Notifier`].
pub trait Listener<M> {
    /// Handle one message. Returning `false` means the listener is no longer
    /// interested and the notifier drops it.
    fn receive(&mut self, message: &M) -> bool;
}

impl<M, F> Listener<M> for F
where
    F: FnMut(&M),
{
    fn receive(&mut self, message: &M) -> bool {
        self(message);
        true
    }
}

/// Handle returned by [`Notifier::listen`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Message broadcaster.
pub struct Notifier<M> {
    listeners: Vec<(ListenerId, Box<dyn Listener<M>>)>,
    next_id: u64,
}

impl<M> Notifier<M> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a listener. It stays registered until [`Notifier::unlisten`] is called
    /// or it reports itself dead.
    pub fn listen(&mut self, listener: impl Listener<M> + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Deliver `message` to every listener.
    pub fn notify(&mut self, message: &M) {
        self.listeners.retain_mut(|(_, listener)| listener.receive(message));
    }

    /// Number of registered listeners
    pub fn count(&self) -> usize {
        self.listeners.len()
    }
}

impl<M> Default for Notifier<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Notifier<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// A listener that records every message it receives.
///
/// Clones share the same buffer, so one clone can be registered while another is
/// kept to read the messages back.
#[derive(Debug)]
pub struct Sink<M> {
    messages: Rc<RefCell<Vec<M>>>,
}

impl<M: Clone> Sink<M> {
    pub fn new() -> Self {
        Self {
            messages: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Take all messages received so far
    pub fn drain(&self) -> Vec<M> {
        std::mem::take(&mut *self.messages.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl<M: Clone> Default for Sink<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for Sink<M> {
    fn clone(&self) -> Self {
        Self {
            messages: Rc::clone(&self.messages),
        }
    }
}

impl<M: Clone> Listener<M> for Sink<M> {
    fn receive(&mut self, message: &M) -> bool {
        self.messages.borrow_mut().push(message.clone());
        true
    }
}
