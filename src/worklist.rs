//! Scheduling of pending program points.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::callstring::ProgramCtx;

/// Queue of program points whose state changed and must be (re)evaluated.
///
/// In FIFO mode, the successors of one evaluation run before anything enqueued by
/// earlier iterations, in the order the evaluator produced them. In in-order mode the
/// point with the lowest address is always taken first, which tends to finish both
/// arms of a branch and whole loops before moving past them. The heuristic knows
/// nothing about calls to higher addresses.
///
/// A point that is already pending is not queued a second time.
#[derive(Debug, Clone)]
pub struct Worklist {
    in_order: bool,
    fifo: VecDeque<ProgramCtx>,
    ordered: BTreeMap<(u64, u16, u64), ProgramCtx>,
    pending: HashSet<ProgramCtx>,
    seq: u64,
}

impl Worklist {
    pub fn new(in_order: bool) -> Self {
        Worklist {
            in_order,
            fifo: VecDeque::new(),
            ordered: BTreeMap::new(),
            pending: HashSet::new(),
            seq: 0,
        }
    }

    pub fn fifo() -> Self {
        Worklist::new(false)
    }

    pub fn in_order() -> Self {
        Worklist::new(true)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, ctx: &ProgramCtx) -> bool {
        self.pending.contains(ctx)
    }

    fn prepend(&mut self, ctx: ProgramCtx) {
        if !self.pending.insert(ctx.clone()) {
            return;
        }
        if self.in_order {
            let key = (ctx.address.base(), ctx.address.offset(), self.seq);
            self.seq += 1;
            self.ordered.insert(key, ctx);
        } else {
            self.fifo.push_front(ctx);
        }
    }

    /// Enqueues one point.
    pub fn enqueue(&mut self, ctx: ProgramCtx) {
        self.prepend(ctx);
    }

    /// Enqueues the successors of one evaluation so that they are dequeued in the
    /// given order.
    pub fn enqueue_all<I>(&mut self, successors: I)
    where
        I: IntoIterator<Item = ProgramCtx>,
        I::IntoIter: DoubleEndedIterator,
    {
        for ctx in successors.into_iter().rev() {
            self.prepend(ctx);
        }
    }

    pub fn dequeue(&mut self) -> Option<ProgramCtx> {
        let ctx = if self.in_order {
            self.ordered.pop_first()?.1
        } else {
            self.fifo.pop_front()?
        };
        self.pending.remove(&ctx);
        Some(ctx)
    }
}

impl Default for Worklist {
    fn default() -> Self {
        Worklist::in_order()
    }
}
