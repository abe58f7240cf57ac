use std::collections::VecDeque;

use super::{Message, Window};

/// Put side grows without bound; get side exposes at most `window` unread
/// messages and silently skips older unread ones.
///
/// Only the last `window` messages are retained: anything older can never
/// fall inside a window again.
#[derive(Debug, Clone)]
pub struct ProcBuffer<T> {
    window: usize,
    write_head: u64,
    read_head: u64,
    retained: VecDeque<T>,
    skipped: u64,
}

impl<T: Clone> ProcBuffer<T> {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            write_head: 0,
            read_head: 0,
            retained: VecDeque::with_capacity(window.min(64)),
            skipped: 0,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn write_head(&self) -> u64 {
        self.write_head
    }

    pub fn read_head(&self) -> u64 {
        self.read_head
    }

    /// Sequence number of the oldest retained message.
    fn base(&self) -> u64 {
        self.write_head - self.retained.len() as u64
    }

    /// First sequence number a reader can still reach.
    fn window_start(&self) -> u64 {
        self.read_head
            .max(self.write_head.saturating_sub(self.window as u64))
    }

    /// Never blocks, never rejects.
    pub fn append(&mut self, payload: T) -> u64 {
        let seq = self.write_head;
        self.write_head += 1;
        if self.window > 0 {
            self.retained.push_back(payload);
            if self.retained.len() > self.window {
                self.retained.pop_front();
            }
        }
        seq
    }

    /// The up-to-`window` most recent unread messages, oldest first.
    pub fn read_window(&self) -> Window<T> {
        let start = self.window_start();
        let base = self.base();
        let from = start.saturating_sub(base) as usize;
        let messages = self
            .retained
            .iter()
            .enumerate()
            .skip(from)
            .map(|(i, payload)| Message {
                seq: base + i as u64,
                payload: payload.clone(),
            })
            .collect();
        Window::new(messages, self.write_head)
    }

    /// Move the read head forward to `to_seq` (clamped to `write_head`).
    ///
    /// Messages that already fell out of the window stay gone; the head lands
    /// on the window start if `to_seq` is behind it.
    pub fn advance_read(&mut self, to_seq: u64) {
        let start = self.window_start();
        self.skipped += start - self.read_head;
        self.read_head = to_seq.min(self.write_head).max(start);
    }

    /// Unread messages a reader can still observe: `min(W, write_head - read_head)`.
    pub fn occupancy(&self) -> usize {
        ((self.write_head - self.read_head) as usize).min(self.window)
    }

    /// Messages dropped unread by the overflow policy so far.
    pub fn skipped(&self) -> u64 {
        self.skipped + (self.window_start() - self.read_head)
    }

    /// Release storage for messages already consumed. Returns how many were dropped.
    pub fn compact(&mut self) -> usize {
        let consumed = self.read_head.saturating_sub(self.base()) as usize;
        let n = consumed.min(self.retained.len());
        self.retained.drain(..n);
        n
    }

    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    /// Rebuild from checkpointed heads plus the window contents that were saved.
    pub(crate) fn restore(window: usize, write_head: u64, read_head: u64, tail: Vec<T>) -> Self {
        let mut retained: VecDeque<T> = tail.into();
        while retained.len() > window || retained.len() as u64 > write_head {
            retained.pop_front();
        }
        let base = write_head - retained.len() as u64;
        Self {
            window,
            write_head,
            read_head: read_head.min(write_head).max(base),
            retained,
            skipped: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(buf: &ProcBuffer<u32>) -> Vec<u64> {
        buf.read_window().iter().map(|m| m.seq).collect()
    }

    #[test]
    fn test_append_assigns_gapless_seq() {
        let mut buf = ProcBuffer::new(4);
        for expected in 0..10u64 {
            assert_eq!(buf.append(expected as u32), expected);
        }
        assert_eq!(buf.write_head(), 10);
    }

    #[test]
    fn test_window_skips_oldest_on_overflow() {
        let mut buf = ProcBuffer::new(3);
        for i in 0..7 {
            buf.append(i);
        }
        assert_eq!(seqs(&buf), vec![4, 5, 6]);
        assert_eq!(buf.skipped(), 4);
        assert_eq!(buf.occupancy(), 3);
    }

    #[test]
    fn test_backlog_equal_to_window_is_delivered_whole() {
        let mut buf = ProcBuffer::new(3);
        for i in 0..3 {
            buf.append(i);
        }
        assert_eq!(seqs(&buf), vec![0, 1, 2]);
        assert_eq!(buf.skipped(), 0);
    }

    #[test]
    fn test_read_is_idempotent() {
        let mut buf = ProcBuffer::new(2);
        buf.append(10);
        buf.append(11);
        buf.append(12);
        assert_eq!(buf.read_window(), buf.read_window());
    }

    #[test]
    fn test_advance_past_skipped_is_noop_on_data() {
        let mut buf = ProcBuffer::new(2);
        for i in 0..6 {
            buf.append(i);
        }
        buf.advance_read(1);
        assert_eq!(buf.read_head(), 4);
        assert_eq!(seqs(&buf), vec![4, 5]);
        buf.advance_read(5);
        assert_eq!(seqs(&buf), vec![5]);
        assert_eq!(buf.skipped(), 4);
    }

    #[test]
    fn test_advance_clamps_to_write_head() {
        let mut buf = ProcBuffer::new(4);
        buf.append(1);
        buf.advance_read(100);
        assert_eq!(buf.read_head(), 1);
        assert!(buf.read_window().is_empty());
    }

    #[test]
    fn test_zero_window_is_write_only_sink() {
        let mut buf = ProcBuffer::new(0);
        assert_eq!(buf.append(1), 0);
        assert_eq!(buf.append(2), 1);
        assert!(buf.read_window().is_empty());
        assert_eq!(buf.occupancy(), 0);
        assert_eq!(buf.retained_len(), 0);
    }

    #[test]
    fn test_empty_window_when_caught_up() {
        let mut buf = ProcBuffer::new(4);
        buf.append(1);
        buf.advance_read(1);
        let w = buf.read_window();
        assert!(w.is_empty());
        assert_eq!(w.end_seq(), 1);
    }

    #[test]
    fn test_compact_drops_consumed_only() {
        let mut buf = ProcBuffer::new(4);
        for i in 0..4 {
            buf.append(i);
        }
        buf.advance_read(3);
        assert_eq!(buf.compact(), 3);
        assert_eq!(buf.retained_len(), 1);
        assert_eq!(seqs(&buf), vec![3]);
    }

    #[test]
    fn test_restore_keeps_window_tail() {
        let buf = ProcBuffer::restore(2, 10, 7, vec![5u32, 6, 7, 8, 9]);
        assert_eq!(seqs(&buf), vec![8, 9]);
        assert_eq!(buf.occupancy(), 2);
    }
}
