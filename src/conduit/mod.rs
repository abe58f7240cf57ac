//! Message conduits.
//!
//! ```text
//!   cell A                                   cell B
//! ┌─────────┐  put   ┌──────────────────┐  read_window / advance_read  ┌─────────┐
//! │  Inlet  │───────►│  buffer (W slots) │────────────────────────────►│ Outlet  │
//! └─────────┘        └──────────────────┘                              └─────────┘
//!              growing put side          skipping get side
//! ```
//!
//! The buffer behind a duct is chosen once, at construction, by a [`Backend`]
//! tag. Both endpoints of one duct always resolve to the same backend.

pub mod buffer;
pub mod channel;
pub mod duct;

use serde::{Deserialize, Serialize};

use crate::cursor::IndexCursor;
use crate::error::ConfigurationError;

pub use buffer::ProcBuffer;
pub use duct::{Duct, Inlet, Outlet, SavedDuct};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Shared in-process buffer.
    Proc,
    /// Channel transport between distinct execution contexts.
    Thread,
}

impl Backend {
    pub fn from_name(name: &str) -> Result<Self, ConfigurationError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "proc" => Ok(Backend::Proc),
            "thread" => Ok(Backend::Thread),
            other => Err(ConfigurationError::UnknownBackend(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Proc => "proc",
            Backend::Thread => "thread",
        }
    }
}

/// A payload stamped with the write head at the moment it was appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T> {
    pub seq: u64,
    pub payload: T,
}

/// Ordered view of the messages an outlet can currently observe.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<T> {
    messages: Vec<Message<T>>,
    end_seq: u64,
}

impl<T> Window<T> {
    pub(crate) fn new(messages: Vec<Message<T>>, end_seq: u64) -> Self {
        Self { messages, end_seq }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message<T>> {
        self.messages.iter()
    }

    pub fn payloads(&self) -> impl Iterator<Item = &T> {
        self.messages.iter().map(|m| &m.payload)
    }

    pub fn first(&self) -> Option<&Message<T>> {
        self.messages.first()
    }

    pub fn last(&self) -> Option<&Message<T>> {
        self.messages.last()
    }

    /// Write head when the window was taken; advancing here consumes everything.
    pub fn end_seq(&self) -> u64 {
        self.end_seq
    }

    pub fn cursor(&self) -> WindowCursor<'_, T> {
        WindowCursor {
            window: self,
            at: IndexCursor::new(self.messages.len()),
        }
    }

    pub fn into_messages(self) -> Vec<Message<T>> {
        self.messages
    }
}

impl<'a, T> IntoIterator for &'a Window<T> {
    type Item = &'a Message<T>;
    type IntoIter = std::slice::Iter<'a, Message<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Restartable, offsettable position inside a [`Window`].
#[derive(Debug)]
pub struct WindowCursor<'a, T> {
    window: &'a Window<T>,
    at: IndexCursor,
}

impl<T> Clone for WindowCursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WindowCursor<'_, T> {}

impl<'a, T> WindowCursor<'a, T> {
    pub fn get(&self) -> Option<&'a Message<T>> {
        self.at.index().map(|i| &self.window.messages[i])
    }

    pub fn advance(&mut self) {
        self.at.advance();
    }

    pub fn retreat(&mut self) {
        self.at.retreat();
    }

    pub fn offset(&self, k: isize) -> Self {
        Self {
            window: self.window,
            at: self.at.offset(k),
        }
    }

    pub fn rewind(&mut self) {
        self.at.rewind();
    }

    pub fn position(&self) -> isize {
        self.at.position()
    }
}

impl<'a, T> Iterator for WindowCursor<'a, T> {
    type Item = &'a Message<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.get()?;
        self.at.advance();
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.at.index().is_some() { self.at.remaining() } else { 0 };
        (n, Some(n))
    }
}
