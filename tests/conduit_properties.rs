//! Property tests for the windowed duct discipline, run against both backends.

use ductwork::conduit::{Backend, Duct};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Put(u8),
    Consume,
    /// Advance the read head by a bounded amount instead of consuming everything.
    Partial(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u8..12).prop_map(Op::Put),
        1 => Just(Op::Consume),
        1 => (0u8..6).prop_map(Op::Partial),
    ]
}

fn backend() -> impl Strategy<Value = Backend> {
    prop_oneof![Just(Backend::Proc), Just(Backend::Thread)]
}

/// Plain model of the heads: what the outlet must report after each op.
#[derive(Debug, Default)]
struct Model {
    write_head: u64,
    read_head: u64,
    skipped: u64,
}

impl Model {
    fn window_start(&self, w: usize) -> u64 {
        self.read_head.max(self.write_head.saturating_sub(w as u64))
    }

    fn advance(&mut self, w: usize, to: u64) {
        let start = self.window_start(w);
        self.skipped += start - self.read_head;
        self.read_head = to.min(self.write_head).max(start);
    }
}

proptest! {
    #[test]
    fn window_is_gapless_bounded_and_idempotent(
        backend in backend(),
        w in 0usize..8,
        ops in prop::collection::vec(op(), 1..60),
    ) {
        let mut duct: Duct<u64> = Duct::new(backend, w);
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Put(n) => {
                    for _ in 0..n {
                        let seq = duct.inlet().put(model.write_head * 10);
                        prop_assert_eq!(seq, model.write_head);
                        model.write_head += 1;
                    }
                }
                Op::Consume => {
                    duct.outlet().consume();
                    model.advance(w, u64::MAX);
                }
                Op::Partial(k) => {
                    let to = duct.outlet().read_head() + k as u64;
                    duct.outlet().advance_read(to);
                    model.advance(w, to);
                }
            }

            let first = duct.outlet().read_window();
            let second = duct.outlet().read_window();
            prop_assert_eq!(&first, &second);

            let backlog = model.write_head - model.read_head.min(model.write_head);
            let expected = (backlog as usize).min(w);
            prop_assert!(first.len() <= w);
            prop_assert_eq!(first.len(), expected);
            prop_assert_eq!(duct.outlet().occupancy(), expected);

            let seqs: Vec<u64> = first.iter().map(|m| m.seq).collect();
            for pair in seqs.windows(2) {
                prop_assert_eq!(pair[1], pair[0] + 1);
            }
            if let Some(last) = seqs.last() {
                prop_assert_eq!(*last, model.write_head - 1);
            }
            for m in first.iter() {
                prop_assert_eq!(m.payload, m.seq * 10);
            }

            prop_assert_eq!(duct.outlet().read_head(), model.read_head);
            let pending = model.window_start(w) - model.read_head;
            prop_assert_eq!(duct.outlet().skipped(), model.skipped + pending);
        }
    }

    #[test]
    fn consume_then_read_is_empty(backend in backend(), w in 1usize..8, n in 0u64..40) {
        let mut duct: Duct<u64> = Duct::new(backend, w);
        for i in 0..n {
            duct.inlet().put(i);
        }
        let taken = duct.outlet().consume();
        prop_assert_eq!(taken.len() as u64, n.min(w as u64));
        prop_assert!(duct.outlet().read_window().is_empty());
        prop_assert_eq!(duct.outlet().skipped(), n.saturating_sub(w as u64));
    }
}

#[test]
fn test_backlog_equal_to_window_is_delivered_whole() {
    for backend in [Backend::Proc, Backend::Thread] {
        let mut duct: Duct<u32> = Duct::new(backend, 4);
        for i in 0..4 {
            duct.inlet().put(i);
        }
        let window = duct.outlet().consume();
        assert_eq!(window.payloads().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(duct.outlet().skipped(), 0);
    }
}

#[test]
fn test_zero_window_is_a_sink() {
    for backend in [Backend::Proc, Backend::Thread] {
        let mut duct: Duct<u32> = Duct::new(backend, 0);
        for i in 0..5 {
            assert_eq!(duct.inlet().put(i), i as u64);
        }
        assert!(duct.outlet().read_window().is_empty());
        assert_eq!(duct.outlet().occupancy(), 0);
        assert_eq!(duct.outlet().skipped(), 5);
    }
}

#[test]
fn test_overflow_skips_oldest() {
    let mut duct: Duct<u32> = Duct::new(Backend::Proc, 3);
    for i in 0..10 {
        duct.inlet().put(i);
    }
    let window = duct.outlet().consume();
    assert_eq!(window.first().unwrap().seq, 7);
    assert_eq!(window.payloads().copied().collect::<Vec<_>>(), vec![7, 8, 9]);
    assert_eq!(duct.outlet().skipped(), 7);
    assert_eq!(duct.outlet().read_head(), 10);
}
