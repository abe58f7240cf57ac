//! Channel-transport backend.
//!
//! The inlet pushes stamped messages onto an unbounded channel; the outlet
//! drains whatever has arrived into a local [`ProcBuffer`] before every read,
//! so the get-side discipline is identical to the in-process backend.

use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::{Message, ProcBuffer, Window};

/// Identity shared by the two halves of one channel duct.
pub(crate) type LinkToken = Arc<()>;

#[derive(Debug)]
pub struct ChannelInlet<T> {
    tx: UnboundedSender<Message<T>>,
    write_head: u64,
    pub(crate) link: LinkToken,
}

#[derive(Debug)]
pub struct ChannelOutlet<T> {
    rx: UnboundedReceiver<Message<T>>,
    local: ProcBuffer<T>,
    pub(crate) link: LinkToken,
}

pub fn pair<T: Clone>(window: usize) -> (ChannelInlet<T>, ChannelOutlet<T>) {
    let (tx, rx) = unbounded_channel();
    let link: LinkToken = Arc::new(());
    (
        ChannelInlet {
            tx,
            write_head: 0,
            link: link.clone(),
        },
        ChannelOutlet {
            rx,
            local: ProcBuffer::new(window),
            link,
        },
    )
}

impl<T> ChannelInlet<T> {
    pub fn put(&mut self, payload: T) -> u64 {
        let seq = self.write_head;
        self.write_head += 1;
        // A dropped outlet turns the duct into a sink; the put side never fails.
        let _ = self.tx.send(Message { seq, payload });
        seq
    }

    pub fn write_head(&self) -> u64 {
        self.write_head
    }

    pub(crate) fn resume_at(&mut self, write_head: u64) {
        self.write_head = write_head;
    }
}

impl<T: Clone> ChannelOutlet<T> {
    /// Pull everything that has arrived so far into the local window.
    fn drain(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            let seq = self.local.append(msg.payload);
            debug_assert_eq!(seq, msg.seq, "channel delivered out of order");
        }
    }

    pub fn read_window(&mut self) -> Window<T> {
        self.drain();
        self.local.read_window()
    }

    pub fn advance_read(&mut self, to_seq: u64) {
        self.drain();
        self.local.advance_read(to_seq);
    }

    pub fn occupancy(&mut self) -> usize {
        self.drain();
        self.local.occupancy()
    }

    pub fn skipped(&mut self) -> u64 {
        self.drain();
        self.local.skipped()
    }

    pub fn compact(&mut self) -> usize {
        self.drain();
        self.local.compact()
    }

    pub fn write_head(&mut self) -> u64 {
        self.drain();
        self.local.write_head()
    }

    pub fn read_head(&self) -> u64 {
        self.local.read_head()
    }

    pub fn window(&self) -> usize {
        self.local.window()
    }

    pub(crate) fn replace_local(&mut self, local: ProcBuffer<T>) {
        self.drain();
        self.local = local;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_preserves_seq() {
        let (mut tx, mut rx) = pair::<u8>(4);
        assert_eq!(tx.put(1), 0);
        assert_eq!(tx.put(2), 1);
        let seqs: Vec<u64> = rx.read_window().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn test_channel_skips_like_proc() {
        let (mut tx, mut rx) = pair::<u8>(2);
        for i in 0..5 {
            tx.put(i);
        }
        let payloads: Vec<u8> = rx.read_window().payloads().copied().collect();
        assert_eq!(payloads, vec![3, 4]);
        assert_eq!(rx.skipped(), 3);
    }

    #[test]
    fn test_put_after_outlet_dropped_still_counts() {
        let (mut tx, rx) = pair::<u8>(2);
        drop(rx);
        assert_eq!(tx.put(9), 0);
        assert_eq!(tx.put(9), 1);
        assert_eq!(tx.write_head(), 2);
    }
}
