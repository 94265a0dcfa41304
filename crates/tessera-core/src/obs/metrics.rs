use serde::Serialize;
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for index and planner activity.
///

#[derive(Clone, Debug, Default, Serialize)]
pub(crate) struct EventState {
    pub(crate) ops: EventOps,
    pub(crate) indexes: BTreeMap<String, IndexCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Index maintenance
    pub index_puts: u64,
    pub index_removes: u64,
    pub index_clears: u64,
    pub unique_violations: u64,

    // Transactions
    pub tx_begins: u64,
    pub tx_commits: u64,
    pub tx_rollbacks: u64,
    pub tx_conflicts: u64,
    pub tx_folded_changes: u64,

    // Planner kinds
    pub plan_index: u64,
    pub plan_chain: u64,
    pub plan_union: u64,
    pub plan_full_scan: u64,
    pub plan_reverted: u64,
    pub plan_cache_hits: u64,
    pub plan_cache_misses: u64,
    pub between_converted: u64,

    // Index usage
    pub index_used: u64,
    pub composite_index_used: u64,

    // Rows touched
    pub rows_scanned: u64,
}

///
/// IndexCounters
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct IndexCounters {
    pub puts: u64,
    pub removes: u64,
    pub clears: u64,
    pub used: u64,
    pub reverted: u64,
    pub unique_violations: u64,
}

///
/// EventReport
/// Point-in-time copy of the counters on the current thread.
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    pub indexes: Vec<(String, IndexCounters)>,
}

impl EventReport {
    /// Counters for one index, if it saw any activity.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexCounters> {
        self.indexes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, c)| c)
    }
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Borrow the counters of one index, creating them on first use.
pub(crate) fn with_index_mut(m: &mut EventState, index: &str, f: impl FnOnce(&mut IndexCounters)) {
    f(m.indexes.entry(index.to_ascii_lowercase()).or_default());
}

/// Snapshot the current thread's counters.
pub(crate) fn report() -> EventReport {
    EVENT_STATE.with(|m| {
        let m = m.borrow();
        EventReport {
            ops: m.ops.clone(),
            indexes: m
                .indexes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    })
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Saturating increment shared by every counter.
pub(crate) const fn bump(counter: &mut u64, by: u64) {
    *counter = counter.saturating_add(by);
}
