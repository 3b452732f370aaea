//! The mutable batch under construction
//!
//! `RequestBuffer` is where operations accumulate between flushes. It
//! owns no locking and performs no I/O; the client facade serializes
//! access through a single mutex and forwards whatever gets sealed to
//! the dispatcher.
//!
//! The buffer decides *when* a seal is due, the facade decides what
//! happens to the sealed batch. An append never overflows: callers ask
//! `must_seal_before` first and seal if told to, so every batch leaves
//! here within the caps. The one exception is an operation whose own
//! size exceeds the volume cap, which `is_oversized` flags so the
//! facade can seal it into a batch by itself instead of wedging the
//! buffer forever.

use crate::batch::{Batch, FlushTrigger};
use crate::operation::Operation;

/// Caps that force a seal
#[derive(Debug, Clone, Copy)]
pub struct BufferLimits {
    pub max_actions: usize,
    pub max_volume: usize,
}

/// Accumulates operations between flushes.
#[derive(Debug)]
pub struct RequestBuffer {
    limits: BufferLimits,
    current: Batch,
}

impl RequestBuffer {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            limits,
            current: Batch::new(),
        }
    }

    /// Whether appending `op` would break a cap, and which trigger the
    /// pre-append seal should carry. `None` means `op` fits as-is.
    pub fn must_seal_before(&self, op: &Operation) -> Option<FlushTrigger> {
        if self.current.is_empty() || !self.would_overflow(op.estimated_size()) {
            return None;
        }
        if self.current.len() + 1 > self.limits.max_actions {
            Some(FlushTrigger::Count)
        } else {
            Some(FlushTrigger::Volume)
        }
    }

    /// Whether `op` is too large to ever share a batch. Such an
    /// operation still ships, alone, in a batch that exceeds the
    /// volume cap.
    pub fn is_oversized(&self, op: &Operation) -> bool {
        op.estimated_size() > self.limits.max_volume
    }

    /// Append `op` to the batch under construction. Callers consult
    /// `must_seal_before` first; appending when it demanded a seal
    /// breaks the cap invariant.
    pub fn append(&mut self, op: Operation) {
        self.current.push(op);
    }

    /// Seal and return the current batch if it holds anything.
    /// Sealing an empty buffer produces nothing.
    pub fn seal(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::replace(&mut self.current, Batch::new()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn pending_operations(&self) -> usize {
        self.current.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.current.bytes()
    }

    fn would_overflow(&self, incoming: usize) -> bool {
        self.current.len() + 1 > self.limits.max_actions
            || self.current.bytes() + incoming > self.limits.max_volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limits(max_actions: usize, max_volume: usize) -> BufferLimits {
        BufferLimits {
            max_actions,
            max_volume,
        }
    }

    fn op(payload_len: usize) -> Operation {
        Operation::index("k", vec![0u8; payload_len])
    }

    /// Drive the buffer the way the facade does: seal when told to,
    /// oversized operations sealed alone right after their append.
    fn feed(buffer: &mut RequestBuffer, op: Operation) -> Vec<(Batch, FlushTrigger)> {
        let mut sealed = Vec::new();
        if let Some(trigger) = buffer.must_seal_before(&op) {
            sealed.push((buffer.seal().unwrap(), trigger));
        }
        let oversized = buffer.is_oversized(&op);
        buffer.append(op);
        if oversized {
            sealed.push((buffer.seal().unwrap(), FlushTrigger::Volume));
        }
        sealed
    }

    #[test]
    fn test_count_cap_seals_before_append() {
        let mut buffer = RequestBuffer::new(limits(3, usize::MAX));

        for _ in 0..3 {
            assert!(buffer.must_seal_before(&op(10)).is_none());
            buffer.append(op(10));
        }
        assert_eq!(buffer.pending_operations(), 3);

        let sealed = feed(&mut buffer, op(10));
        assert_eq!(sealed.len(), 1);
        let (batch, trigger) = &sealed[0];
        assert_eq!(batch.len(), 3);
        assert_eq!(*trigger, FlushTrigger::Count);
        // The op that crossed the cap starts the next batch.
        assert_eq!(buffer.pending_operations(), 1);
    }

    #[test]
    fn test_volume_cap_seals_before_append() {
        let size = op(100).estimated_size();
        let mut buffer = RequestBuffer::new(limits(100, size * 2));

        assert!(feed(&mut buffer, op(100)).is_empty());
        assert!(feed(&mut buffer, op(100)).is_empty());

        let sealed = feed(&mut buffer, op(100));
        assert_eq!(sealed.len(), 1);
        let (batch, trigger) = &sealed[0];
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.bytes(), size * 2);
        assert_eq!(*trigger, FlushTrigger::Volume);
        assert_eq!(buffer.pending_operations(), 1);
    }

    #[test]
    fn test_oversized_op_into_empty_buffer_seals_singleton() {
        let mut buffer = RequestBuffer::new(limits(100, 200));
        let oversized = op(500);
        assert!(buffer.must_seal_before(&oversized).is_none());
        assert!(buffer.is_oversized(&oversized));

        let sealed = feed(&mut buffer, oversized);
        assert_eq!(sealed.len(), 1);
        let (batch, trigger) = &sealed[0];
        assert_eq!(batch.len(), 1);
        assert!(batch.bytes() > 200);
        assert_eq!(*trigger, FlushTrigger::Volume);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_op_into_nonempty_buffer_seals_twice() {
        let mut buffer = RequestBuffer::new(limits(100, 500));
        feed(&mut buffer, op(10));
        let oversized = op(1000);
        assert_eq!(
            buffer.must_seal_before(&oversized),
            Some(FlushTrigger::Volume)
        );

        let sealed = feed(&mut buffer, oversized);
        assert_eq!(sealed.len(), 2);
        assert_eq!(sealed[0].0.len(), 1);
        assert_eq!(sealed[1].0.len(), 1);
        assert!(sealed[1].0.bytes() > 500);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_seal_of_empty_buffer_is_noop() {
        let mut buffer = RequestBuffer::new(limits(10, 1000));
        assert!(buffer.seal().is_none());

        buffer.append(op(1));
        let batch = buffer.seal().expect("one op buffered");
        assert_eq!(batch.len(), 1);
        assert!(buffer.seal().is_none());
    }

    #[test]
    fn test_count_trigger_wins_when_both_caps_cross() {
        let size = op(50).estimated_size();
        // The third op crosses both the count and the volume cap.
        let mut buffer = RequestBuffer::new(limits(2, size * 2));
        feed(&mut buffer, op(50));
        feed(&mut buffer, op(50));

        assert_eq!(buffer.must_seal_before(&op(50)), Some(FlushTrigger::Count));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Whatever the payload mix, sealed batches respect the
            /// caps except for oversized singletons, and nothing is
            /// lost or reordered.
            #[test]
            fn prop_caps_and_ordering_hold(
                payload_lens in proptest::collection::vec(0usize..400, 1..60),
                max_actions in 1usize..6,
                max_volume in 200usize..800,
            ) {
                let mut buffer = RequestBuffer::new(limits(max_actions, max_volume));
                let mut pushed = Vec::new();
                let mut dispatched = Vec::new();

                for len in payload_lens {
                    let op = op(len);
                    pushed.push(op.id());
                    for (batch, _trigger) in feed(&mut buffer, op) {
                        prop_assert!(
                            batch.len() <= max_actions,
                            "count cap broken: {} > {}", batch.len(), max_actions
                        );
                        prop_assert!(
                            batch.bytes() <= max_volume || batch.len() == 1,
                            "volume cap broken by multi-op batch"
                        );
                        dispatched.extend(batch.operation_ids());
                    }
                }

                if let Some(batch) = buffer.seal() {
                    dispatched.extend(batch.operation_ids());
                }

                prop_assert_eq!(dispatched, pushed);
            }
        }
    }
}
