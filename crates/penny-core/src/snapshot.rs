use std::collections::BTreeMap;

use crate::counters::{MetaLists, PennyCounters};

/// A per-flow counter/meta-list bundle captured at the instant a drop was
/// injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSnapshot {
    pub highest_seq: u32,
    pub packet_id: String,
    pub counters: PennyCounters,
    pub meta: MetaLists,
}

/// A cross-flow counter/meta-list bundle captured when the aggregate
/// detector injects a drop. `lists` is keyed by the flow that contributed
/// each entry, ordered for deterministic export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSnapshot {
    pub packet_id: String,
    pub flow_id: String,
    pub duplicate_pkts_at_drop_instance: u64,
    pub counters: PennyCounters,
    pub lists: BTreeMap<String, MetaLists>,
    pub flows_contributed: u64,
}
