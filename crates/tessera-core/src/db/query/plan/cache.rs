//! Per-database cache of logical plans keyed by query fingerprint.

use crate::{
    config::PlanCacheConfig,
    db::query::plan::{LogicalPlan, QueryFingerprint},
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

///
/// PlanCache
///
/// Bounded, first-in first-out. Cleared whenever the index registry
/// changes, so cached plans never outlive the indexes they reference.
///

#[derive(Debug)]
pub(crate) struct PlanCache {
    enabled: bool,
    capacity: usize,
    plans: BTreeMap<QueryFingerprint, Arc<LogicalPlan>>,
    order: VecDeque<QueryFingerprint>,
}

impl PlanCache {
    pub(crate) fn new(config: &PlanCacheConfig) -> Self {
        Self {
            enabled: config.enabled && config.capacity > 0,
            capacity: config.capacity,
            plans: BTreeMap::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn get(&self, fingerprint: &QueryFingerprint) -> Option<Arc<LogicalPlan>> {
        self.plans.get(fingerprint).cloned()
    }

    pub(crate) fn insert(&mut self, fingerprint: QueryFingerprint, plan: Arc<LogicalPlan>) {
        if !self.enabled {
            return;
        }
        if self.plans.insert(fingerprint, plan).is_none() {
            self.order.push_back(fingerprint);
        }
        while self.plans.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.plans.remove(&oldest);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.plans.clear();
        self.order.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.plans.len()
    }
}
