use std::collections::{BTreeMap, HashMap};

/// Engine time in milliseconds since the session was created.
pub type Millis = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Which lineage a timer belongs to. The session routes fired timers back to
/// their owner by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    RoundTick,
    SpawnDelay,
    TargetExpiry,
    BonusAppear(usize),
    BonusExpiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub deadline: Millis,
    pub kind: TimerKind,
}

/// Deadline-ordered queue of one-shot timers on a virtual clock.
///
/// Nothing fires on its own: the owner pulls due timers with [`pop_due`],
/// which keeps every callback run-to-completion and the ordering
/// deterministic. Equal deadlines fire in the order they were scheduled.
///
/// [`pop_due`]: TimerQueue::pop_due
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: BTreeMap<(Millis, u64), TimerKind>,
    deadlines: HashMap<u64, Millis>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Millis, kind: TimerKind) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline, seq), kind);
        self.deadlines.insert(seq, deadline);
        TimerId(seq)
    }

    /// Returns `false` when the timer already fired or was never scheduled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id.0) {
            Some(deadline) => self.entries.remove(&(deadline, id.0)).is_some(),
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.entries.first_key_value().map(|(&(deadline, _), _)| deadline)
    }

    pub fn pop_due(&mut self, now: Millis) -> Option<FiredTimer> {
        let (&(deadline, seq), _) = self.entries.first_key_value()?;
        if deadline > now {
            return None;
        }

        let kind = self.entries.remove(&(deadline, seq))?;
        self.deadlines.remove(&seq);

        Some(FiredTimer {
            id: TimerId(seq),
            deadline,
            kind,
        })
    }
}
