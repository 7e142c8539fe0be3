use std::collections::BTreeSet;

use serde::Serialize;

/// Monotonic per-flow / per-snapshot packet counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PennyCounters {
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
}

impl PennyCounters {
    /// Element-wise sum, used when folding every tracked flow's live
    /// counters into a fresh aggregate snapshot.
    pub fn merge(&mut self, other: &PennyCounters) {
        self.total_pkts += other.total_pkts;
        self.data_pkts += other.data_pkts;
        self.pure_ack_pkts += other.pure_ack_pkts;
        self.droppable_pkts += other.droppable_pkts;
        self.in_order_pkts += other.in_order_pkts;
        self.out_of_order_pkts += other.out_of_order_pkts;
        self.dropped_pkts += other.dropped_pkts;
        self.retransmitted_dropped_pkts += other.retransmitted_dropped_pkts;
        self.not_seen_dropped_pkts += other.not_seen_dropped_pkts;
        self.duplicate_pkts += other.duplicate_pkts;
        self.pending_dropped_pkts += other.pending_dropped_pkts;
    }
}

/// The three packet-identifier sets tracked per flow and per aggregate
/// snapshot. Backed by `BTreeSet` rather than a
/// hash set so export order is deterministic without a separate sort step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetaLists {
    pub dropped_pkts_list: BTreeSet<String>,
    pub expired_pkts_list: BTreeSet<String>,
    pub retransmitted_pkts_list: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_every_field() {
        let mut a = PennyCounters {
            total_pkts: 1,
            data_pkts: 1,
            dropped_pkts: 1,
            ..Default::default()
        };
        let b = PennyCounters {
            total_pkts: 2,
            duplicate_pkts: 3,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.total_pkts, 3);
        assert_eq!(a.data_pkts, 1);
        assert_eq!(a.dropped_pkts, 1);
        assert_eq!(a.duplicate_pkts, 3);
    }

    #[test]
    fn meta_list_insert_is_idempotent() {
        let mut lists = MetaLists::default();
        lists.dropped_pkts_list.insert("10-0".to_string());
        lists.dropped_pkts_list.insert("10-0".to_string());
        assert_eq!(lists.dropped_pkts_list.len(), 1);
    }
}
