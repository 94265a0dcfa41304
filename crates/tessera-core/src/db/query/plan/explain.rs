use crate::db::query::plan::LogicalPlan;
use serde::Serialize;
use std::collections::BTreeSet;

///
/// ExplainPlan
///
/// Introspection view of a planned query. `involved_indexes` names every
/// index the chosen access plan reads, chain hops included.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ExplainPlan {
    pub class: String,
    pub predicate: String,
    pub involved_indexes: BTreeSet<String>,
    pub range_query_converted_in_between: usize,
    pub access: String,
    pub full_scan: bool,
    pub chain_hops: usize,
    pub limit: Option<usize>,
    pub candidates: usize,
    pub fingerprint: String,
}

impl ExplainPlan {
    pub(crate) fn from_plan(plan: &LogicalPlan) -> Self {
        let best = plan.best();

        Self {
            class: plan.class().to_string(),
            predicate: plan.predicate().to_string(),
            involved_indexes: best.indexes().into_iter().map(|i| i.name.clone()).collect(),
            range_query_converted_in_between: plan.between_converted(),
            access: best.to_string(),
            full_scan: best.is_full_scan(),
            chain_hops: best.chain_hops(),
            limit: plan.limit(),
            candidates: plan
                .candidates()
                .iter()
                .filter(|c| !c.is_full_scan())
                .count(),
            fingerprint: plan.fingerprint().to_string(),
        }
    }
}
