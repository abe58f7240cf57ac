use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::channel::{self, ChannelInlet, ChannelOutlet};
use super::{Backend, Message, ProcBuffer, Window};
use crate::error::ConfigurationError;

type Shared<T> = Arc<Mutex<ProcBuffer<T>>>;

// Buffers hold plain data, so a poisoned lock is still consistent.
fn lock<T>(buf: &Shared<T>) -> MutexGuard<'_, ProcBuffer<T>> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
enum InletImpl<T> {
    Proc(Shared<T>),
    Thread(ChannelInlet<T>),
}

#[derive(Debug)]
enum OutletImpl<T> {
    Proc(Shared<T>),
    Thread(ChannelOutlet<T>),
}

/// Write endpoint. Append-only; it never observes the read side.
#[derive(Debug)]
pub struct Inlet<T> {
    imp: InletImpl<T>,
}

/// Read endpoint with the windowed, skipping get discipline.
#[derive(Debug)]
pub struct Outlet<T> {
    imp: OutletImpl<T>,
}

impl<T: Clone> Inlet<T> {
    pub fn put(&mut self, payload: T) -> u64 {
        match &mut self.imp {
            InletImpl::Proc(buf) => lock(buf).append(payload),
            InletImpl::Thread(ch) => ch.put(payload),
        }
    }

    pub fn write_head(&self) -> u64 {
        match &self.imp {
            InletImpl::Proc(buf) => lock(buf).write_head(),
            InletImpl::Thread(ch) => ch.write_head(),
        }
    }

    pub fn backend(&self) -> Backend {
        match self.imp {
            InletImpl::Proc(_) => Backend::Proc,
            InletImpl::Thread(_) => Backend::Thread,
        }
    }
}

impl<T: Clone> Outlet<T> {
    /// Same contents on every call until the read head moves.
    pub fn read_window(&mut self) -> Window<T> {
        match &mut self.imp {
            OutletImpl::Proc(buf) => lock(buf).read_window(),
            OutletImpl::Thread(ch) => ch.read_window(),
        }
    }

    pub fn advance_read(&mut self, to_seq: u64) {
        match &mut self.imp {
            OutletImpl::Proc(buf) => lock(buf).advance_read(to_seq),
            OutletImpl::Thread(ch) => ch.advance_read(to_seq),
        }
    }

    /// Read the window and mark all of it consumed.
    pub fn consume(&mut self) -> Window<T> {
        let window = self.read_window();
        self.advance_read(window.end_seq());
        window
    }

    pub fn read_head(&self) -> u64 {
        match &self.imp {
            OutletImpl::Proc(buf) => lock(buf).read_head(),
            OutletImpl::Thread(ch) => ch.read_head(),
        }
    }

    pub fn window(&self) -> usize {
        match &self.imp {
            OutletImpl::Proc(buf) => lock(buf).window(),
            OutletImpl::Thread(ch) => ch.window(),
        }
    }

    pub fn occupancy(&mut self) -> usize {
        match &mut self.imp {
            OutletImpl::Proc(buf) => lock(buf).occupancy(),
            OutletImpl::Thread(ch) => ch.occupancy(),
        }
    }

    /// Messages dropped unread by the overflow policy (OverflowSkip events).
    pub fn skipped(&mut self) -> u64 {
        match &mut self.imp {
            OutletImpl::Proc(buf) => lock(buf).skipped(),
            OutletImpl::Thread(ch) => ch.skipped(),
        }
    }

    pub fn compact(&mut self) -> usize {
        match &mut self.imp {
            OutletImpl::Proc(buf) => lock(buf).compact(),
            OutletImpl::Thread(ch) => ch.compact(),
        }
    }

    pub fn backend(&self) -> Backend {
        match self.imp {
            OutletImpl::Proc(_) => Backend::Proc,
            OutletImpl::Thread(_) => Backend::Thread,
        }
    }
}

/// Heads and window-bounded contents of one duct, as stored in a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDuct<T> {
    pub write_head: u64,
    pub read_head: u64,
    pub messages: Vec<Message<T>>,
}

/// An inlet and an outlet bound to one buffer.
#[derive(Debug)]
pub struct Duct<T> {
    inlet: Inlet<T>,
    outlet: Outlet<T>,
}

impl<T: Clone + Send + 'static> Duct<T> {
    pub fn new(backend: Backend, window: usize) -> Self {
        match backend {
            Backend::Proc => {
                let buf: Shared<T> = Arc::new(Mutex::new(ProcBuffer::new(window)));
                Self {
                    inlet: Inlet { imp: InletImpl::Proc(buf.clone()) },
                    outlet: Outlet { imp: OutletImpl::Proc(buf) },
                }
            }
            Backend::Thread => {
                let (tx, rx) = channel::pair(window);
                Self {
                    inlet: Inlet { imp: InletImpl::Thread(tx) },
                    outlet: Outlet { imp: OutletImpl::Thread(rx) },
                }
            }
        }
    }

    /// Reassemble a duct from separately held endpoints.
    pub fn from_parts(inlet: Inlet<T>, outlet: Outlet<T>) -> Result<Self, ConfigurationError> {
        let paired = match (&inlet.imp, &outlet.imp) {
            (InletImpl::Proc(a), OutletImpl::Proc(b)) => Arc::ptr_eq(a, b),
            (InletImpl::Thread(a), OutletImpl::Thread(b)) => Arc::ptr_eq(&a.link, &b.link),
            _ => {
                return Err(ConfigurationError::BackendMismatch {
                    inlet: inlet.backend(),
                    outlet: outlet.backend(),
                })
            }
        };
        if !paired {
            return Err(ConfigurationError::UnpairedEndpoints);
        }
        Ok(Self { inlet, outlet })
    }

    /// Rebuild a duct from checkpointed state.
    pub fn restore(backend: Backend, window: usize, saved: SavedDuct<T>) -> Self {
        let tail: Vec<T> = saved.messages.into_iter().map(|m| m.payload).collect();
        let local = ProcBuffer::restore(window, saved.write_head, saved.read_head, tail);
        let mut duct = Self::new(backend, window);
        match (&mut duct.inlet.imp, &mut duct.outlet.imp) {
            (InletImpl::Proc(buf), _) => *lock(buf) = local,
            (InletImpl::Thread(tx), OutletImpl::Thread(rx)) => {
                tx.resume_at(saved.write_head);
                rx.replace_local(local);
            }
            (InletImpl::Thread(_), OutletImpl::Proc(_)) => {}
        }
        duct
    }

    pub fn inlet(&mut self) -> &mut Inlet<T> {
        &mut self.inlet
    }

    pub fn outlet(&mut self) -> &mut Outlet<T> {
        &mut self.outlet
    }

    pub fn backend(&self) -> Backend {
        self.inlet.backend()
    }

    pub fn split(self) -> (Inlet<T>, Outlet<T>) {
        (self.inlet, self.outlet)
    }
}

/// Export an outlet's observable state for checkpointing.
pub fn save<T: Clone>(inlet: &Inlet<T>, outlet: &mut Outlet<T>) -> SavedDuct<T> {
    let window = outlet.read_window();
    SavedDuct {
        write_head: inlet.write_head(),
        read_head: outlet.read_head(),
        messages: window.into_messages(),
    }
}
