use std::collections::BTreeMap;

use serde::Serialize;

use crate::counters::{MetaLists, PennyCounters};
use crate::snapshot::AggregateSnapshot;

/// Flat counters-plus-meta-lists view of one flow or one flow's snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FlowCountersExport {
    pub total_pkts: u64,
    pub data_pkts: u64,
    pub pure_ack_pkts: u64,
    pub droppable_pkts: u64,
    pub in_order_pkts: u64,
    pub out_of_order_pkts: u64,
    pub dropped_pkts: u64,
    pub retransmitted_dropped_pkts: u64,
    pub not_seen_dropped_pkts: u64,
    pub duplicate_pkts: u64,
    pub pending_dropped_pkts: u64,
    pub dropped_pcks_list: Vec<String>,
    pub expired_pcks_list: Vec<String>,
    pub retransmitted_pkts_list: Vec<String>,
}

impl FlowCountersExport {
    pub fn from_parts(counters: &PennyCounters, meta: &MetaLists) -> Self {
        Self {
            total_pkts: counters.total_pkts,
            data_pkts: counters.data_pkts,
            pure_ack_pkts: counters.pure_ack_pkts,
            droppable_pkts: counters.droppable_pkts,
            in_order_pkts: counters.in_order_pkts,
            out_of_order_pkts: counters.out_of_order_pkts,
            dropped_pkts: counters.dropped_pkts,
            retransmitted_dropped_pkts: counters.retransmitted_dropped_pkts,
            not_seen_dropped_pkts: counters.not_seen_dropped_pkts,
            duplicate_pkts: counters.duplicate_pkts,
            pending_dropped_pkts: counters.pending_dropped_pkts,
            dropped_pcks_list: meta.dropped_pkts_list.iter().cloned().collect(),
            expired_pcks_list: meta.expired_pkts_list.iter().cloned().collect(),
            retransmitted_pkts_list: meta.retransmitted_pkts_list.iter().cloned().collect(),
        }
    }
}

/// Per-flow export: the flow's live state plus every snapshot captured
/// along the way.
#[derive(Debug, Clone, Serialize)]
pub struct FlowStatsExport {
    pub current: FlowCountersExport,
    pub snapshots: Vec<FlowCountersExport>,
}

/// One resolved aggregate snapshot, with meta-list entries flattened into
/// `"(<flowId>,<packetId>)"` strings.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSnapshotExport {
    pub packet_id: String,
    pub flow_id: String,
    pub counters: PennyCounters,
    pub dropped_pcks_list: Vec<String>,
    pub expired_pcks_list: Vec<String>,
    pub retransmitted_pkts_list: Vec<String>,
}

impl From<&AggregateSnapshot> for AggregateSnapshotExport {
    fn from(acs: &AggregateSnapshot) -> Self {
        let mut dropped = Vec::new();
        let mut expired = Vec::new();
        let mut retransmitted = Vec::new();
        for (flow_id, lists) in &acs.lists {
            for pid in &lists.dropped_pkts_list {
                dropped.push(format!("({flow_id},{pid})"));
            }
            for pid in &lists.expired_pkts_list {
                expired.push(format!("({flow_id},{pid})"));
            }
            for pid in &lists.retransmitted_pkts_list {
                retransmitted.push(format!("({flow_id},{pid})"));
            }
        }
        Self {
            packet_id: acs.packet_id.clone(),
            flow_id: acs.flow_id.clone(),
            counters: acs.counters,
            dropped_pcks_list: dropped,
            expired_pcks_list: expired,
            retransmitted_pkts_list: retransmitted,
        }
    }
}

/// The full result of one `AggregateDetector` run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub aggr_outcome: Option<String>,
    pub final_outcome: Option<String>,
    pub indiv_flows_closed_loop: Vec<String>,
    pub snapshots: Vec<AggregateSnapshotExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indiv_flows: Option<BTreeMap<String, FlowStatsExport>>,
}
