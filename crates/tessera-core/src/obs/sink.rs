//! Metrics sink boundary.
//!
//! Core DB logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
use crate::obs::metrics::{self, bump, with_index_mut};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// PlanKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanKind {
    Index,
    Chain,
    Union,
    FullScan,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    IndexDelta {
        index: &'a str,
        puts: u64,
        removes: u64,
    },
    IndexClear {
        index: &'a str,
    },
    UniqueViolation {
        index: &'a str,
    },
    TxBegin,
    TxCommit {
        indexes: u64,
        changes: u64,
    },
    TxRollback,
    TxConflict,
    Plan {
        kind: PlanKind,
    },
    BetweenConverted {
        count: u64,
    },
    IndexUsed {
        index: &'a str,
        params: usize,
    },
    PlanReverted {
        index: &'a str,
    },
    PlanCache {
        hit: bool,
    },
    RowsScanned {
        rows: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default thread-local sink that writes into the counters in `obs::metrics`.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::IndexDelta {
                index,
                puts,
                removes,
            } => {
                bump(&mut m.ops.index_puts, puts);
                bump(&mut m.ops.index_removes, removes);
                with_index_mut(m, index, |c| {
                    bump(&mut c.puts, puts);
                    bump(&mut c.removes, removes);
                });
            }
            MetricsEvent::IndexClear { index } => {
                bump(&mut m.ops.index_clears, 1);
                with_index_mut(m, index, |c| bump(&mut c.clears, 1));
            }
            MetricsEvent::UniqueViolation { index } => {
                bump(&mut m.ops.unique_violations, 1);
                with_index_mut(m, index, |c| bump(&mut c.unique_violations, 1));
            }
            MetricsEvent::TxBegin => bump(&mut m.ops.tx_begins, 1),
            MetricsEvent::TxCommit { changes, .. } => {
                bump(&mut m.ops.tx_commits, 1);
                bump(&mut m.ops.tx_folded_changes, changes);
            }
            MetricsEvent::TxRollback => bump(&mut m.ops.tx_rollbacks, 1),
            MetricsEvent::TxConflict => bump(&mut m.ops.tx_conflicts, 1),
            MetricsEvent::Plan { kind } => match kind {
                PlanKind::Index => bump(&mut m.ops.plan_index, 1),
                PlanKind::Chain => bump(&mut m.ops.plan_chain, 1),
                PlanKind::Union => bump(&mut m.ops.plan_union, 1),
                PlanKind::FullScan => bump(&mut m.ops.plan_full_scan, 1),
            },
            MetricsEvent::BetweenConverted { count } => {
                bump(&mut m.ops.between_converted, count);
            }
            MetricsEvent::IndexUsed { index, params } => {
                bump(&mut m.ops.index_used, 1);
                if params > 1 {
                    bump(&mut m.ops.composite_index_used, 1);
                }
                with_index_mut(m, index, |c| bump(&mut c.used, 1));
            }
            MetricsEvent::PlanReverted { index } => {
                bump(&mut m.ops.plan_reverted, 1);
                with_index_mut(m, index, |c| bump(&mut c.reverted, 1));
            }
            MetricsEvent::PlanCache { hit } => {
                if hit {
                    bump(&mut m.ops.plan_cache_hits, 1);
                } else {
                    bump(&mut m.ops.plan_cache_misses, 1);
                }
            }
            MetricsEvent::RowsScanned { rows } => bump(&mut m.ops.rows_scanned, rows),
        });
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the metrics state of the current thread.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state of the current thread.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::Cell,
        panic::{AssertUnwindSafe, catch_unwind},
    };

    #[derive(Default)]
    struct CountingSink {
        calls: Cell<usize>,
    }

    impl MetricsSink for CountingSink {
        fn record(&self, _: MetricsEvent<'_>) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    #[test]
    fn with_metrics_sink_routes_and_restores_nested_overrides() {
        let outer = Rc::new(CountingSink::default());
        let inner = Rc::new(CountingSink::default());

        with_metrics_sink(outer.clone(), || {
            record(MetricsEvent::Plan {
                kind: PlanKind::Index,
            });

            with_metrics_sink(inner.clone(), || {
                record(MetricsEvent::Plan {
                    kind: PlanKind::Chain,
                });
            });

            // Inner override was restored to outer override.
            record(MetricsEvent::Plan {
                kind: PlanKind::FullScan,
            });
        });

        assert_eq!(outer.calls.get(), 2);
        assert_eq!(inner.calls.get(), 1);
        SINK_OVERRIDE.with(|cell| assert!(cell.borrow().is_none()));
    }

    #[test]
    fn with_metrics_sink_restores_override_on_panic() {
        let sink = Rc::new(CountingSink::default());

        let panicked = catch_unwind(AssertUnwindSafe(|| {
            with_metrics_sink(sink.clone(), || {
                record(MetricsEvent::TxBegin);
                panic!("intentional panic for guard test");
            });
        }))
        .is_err();

        assert!(panicked);
        assert_eq!(sink.calls.get(), 1);
        SINK_OVERRIDE.with(|cell| assert!(cell.borrow().is_none()));
    }

    #[test]
    fn index_events_accumulate_globally_and_per_index() {
        metrics_reset_all();

        record(MetricsEvent::IndexDelta {
            index: "Student.Name",
            puts: 3,
            removes: 1,
        });
        record(MetricsEvent::IndexUsed {
            index: "student.name",
            params: 2,
        });

        let report = metrics_report();
        assert_eq!(report.ops.index_puts, 3);
        assert_eq!(report.ops.index_removes, 1);
        assert_eq!(report.ops.composite_index_used, 1);

        let counters = report
            .index("STUDENT.NAME")
            .expect("per-index counters should be present");
        assert_eq!(counters.puts, 3);
        assert_eq!(counters.used, 1);
    }

    #[test]
    fn plan_cache_events_split_hits_and_misses() {
        metrics_reset_all();

        record(MetricsEvent::PlanCache { hit: false });
        record(MetricsEvent::PlanCache { hit: true });
        record(MetricsEvent::PlanCache { hit: true });

        let ops = metrics_report().ops;
        assert_eq!(ops.plan_cache_hits, 2);
        assert_eq!(ops.plan_cache_misses, 1);
    }
}
