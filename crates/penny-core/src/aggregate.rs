use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::actuator::DropActuator;
use crate::export::{AggregateSnapshotExport, ExportResult, FlowStatsExport};
use crate::flow::FlowDetector;
use crate::packet::ObservedPacket;
use crate::params::PennyParams;
use crate::random::RandomSource;
use crate::snapshot::AggregateSnapshot;

/// Cross-flow classification state. Owns one [`FlowDetector`] per tracked
/// flow, a queue of pending aggregate snapshots awaiting resolution, and the
/// terminal-outcome bookkeeping that drives individual-flow escalation.
pub struct AggregateDetector {
    params: PennyParams,
    flows: BTreeMap<String, FlowDetector>,
    pending: VecDeque<AggregateSnapshot>,
    evaluated: Vec<AggregateSnapshot>,
    total_closed_loop_packets: u64,
    total_spoofed_packets: u64,
    indiv_flows_closed_loop: BTreeSet<String>,
    indiv_flows_enabled: bool,
    enabled: bool,
    finished: bool,
    aggr_outcome: Option<String>,
    final_outcome: Option<String>,
}

impl AggregateDetector {
    pub fn new(params: PennyParams) -> Self {
        Self {
            params,
            flows: BTreeMap::new(),
            pending: VecDeque::new(),
            evaluated: Vec::new(),
            total_closed_loop_packets: 0,
            total_spoofed_packets: 0,
            indiv_flows_closed_loop: BTreeSet::new(),
            indiv_flows_enabled: false,
            enabled: true,
            finished: false,
            aggr_outcome: None,
            final_outcome: None,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        !self.finished
    }

    pub fn is_flow_tracked(&self, flow_id: &str) -> bool {
        self.flows.contains_key(flow_id)
    }

    pub fn get_number_of_tracked_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn track_new_flow(&mut self, flow_id: &str) {
        self.flows
            .entry(flow_id.to_string())
            .or_insert_with(|| FlowDetector::new(self.params));
    }

    /// Seeds tracking for a flow the caller already knows is spoofed,
    /// before any packet of it has arrived. Identical to
    /// [`AggregateDetector::track_new_flow`]; kept as a separate name since
    /// callers use it to express a different intent.
    pub fn preregister_spoofed_flow(&mut self, flow_id: &str) {
        self.track_new_flow(flow_id);
    }

    fn get_or_insert_flow(&mut self, flow_id: &str) -> &mut FlowDetector {
        if !self.flows.contains_key(flow_id) {
            tracing::warn!(%flow_id, "auto-tracking previously unseen flow");
        }
        self.flows
            .entry(flow_id.to_string())
            .or_insert_with(|| FlowDetector::new(self.params))
    }

    pub fn total_closed_loop_packets(&self) -> u64 {
        self.total_closed_loop_packets
    }

    pub fn total_spoofed_packets(&self) -> u64 {
        self.total_spoofed_packets
    }

    pub fn indiv_flows_enabled(&self) -> bool {
        self.indiv_flows_enabled
    }

    pub fn aggr_outcome(&self) -> Option<&str> {
        self.aggr_outcome.as_deref()
    }

    pub fn final_outcome(&self) -> Option<&str> {
        self.final_outcome.as_deref()
    }

    /// Runs one observed packet through the aggregate pipeline: dispatch to
    /// the owning flow, resolve the oldest pending snapshot if one is ready,
    /// check for individual-flow-mode escalation, and inject a drop if the
    /// flow offered a droppable candidate and there's room in the pending
    /// queue.
    pub fn process_packet(
        &mut self,
        pkt: &ObservedPacket,
        now: f64,
        rng: &mut dyn RandomSource,
        actuator: &mut dyn DropActuator,
    ) -> u8 {
        if !self.enabled || self.finished {
            return 0;
        }

        if pkt.is_real_flow {
            self.total_closed_loop_packets += 1;
        } else {
            self.total_spoofed_packets += 1;
        }

        let ret_code = self.get_or_insert_flow(&pkt.flow_id).process_packet(pkt, now);

        if !self.pending.is_empty() && !self.indiv_flows_enabled {
            self.resolve_oldest_pending();
        }

        if self.indiv_flows_enabled
            && self.indiv_flows_closed_loop.len() as u64 > self.params.min_closed_loop_flows
        {
            self.finished = true;
            self.final_outcome = Some("Closed-loop".to_string());
            tracing::info!("individual-flow majority reached closed-loop verdict");
        }

        if self.finished {
            return 0;
        }

        let eval = self
            .flows
            .get_mut(&pkt.flow_id)
            .expect("flow was tracked above")
            .evaluate_hypotheses();

        match eval {
            2 => {
                self.indiv_flows_closed_loop.insert(pkt.flow_id.clone());
            }
            0 if ret_code == 1 => {
                let room = (self.pending.len() + self.evaluated.len()) as u64
                    < self.params.max_packet_drops;
                if room || self.indiv_flows_enabled {
                    let packet_id = pkt.packet_id();
                    let dropped = self
                        .flows
                        .get_mut(&pkt.flow_id)
                        .expect("flow was tracked above")
                        .drop_packet(pkt.seq, &packet_id, now, rng);
                    if dropped {
                        actuator.drop_packet(&packet_id);
                        if !self.indiv_flows_enabled {
                            self.push_aggregate_snapshot(pkt, &packet_id);
                        }
                        return 1;
                    }
                }
            }
            _ => {}
        }

        0
    }

    fn push_aggregate_snapshot(&mut self, pkt: &ObservedPacket, packet_id: &str) {
        let duplicate_pkts_at_drop_instance = self
            .flows
            .get(&pkt.flow_id)
            .and_then(|f| f.duplicates_seen_by(packet_id))
            .unwrap_or(0);

        let mut acs = AggregateSnapshot {
            packet_id: packet_id.to_string(),
            flow_id: pkt.flow_id.clone(),
            duplicate_pkts_at_drop_instance,
            counters: crate::counters::PennyCounters::default(),
            lists: BTreeMap::new(),
            flows_contributed: 0,
        };

        for (flow_id, flow) in self.flows.iter() {
            let snap = flow.contribution_snapshot();
            acs.counters.merge(&snap.counters);
            acs.lists.insert(flow_id.clone(), snap.meta);
            acs.flows_contributed += 1;
        }

        self.pending.push_back(acs);
    }

    /// Re-checks the oldest pending aggregate snapshot for resolved drops
    /// and, once fully resolved, moves it to `evaluated` and runs the
    /// aggregate hypothesis test.
    fn resolve_oldest_pending(&mut self) {
        let oldest = match self.pending.front().cloned() {
            Some(acs) => acs,
            None => return,
        };

        self.check_expired(&oldest);
        self.check_retransmitted(&oldest);
        self.check_duplicates(&oldest);

        let resolved = self
            .pending
            .front()
            .map(|s| s.counters.pending_dropped_pkts == 0)
            .unwrap_or(false);
        if !resolved {
            return;
        }

        let acs = self.pending.pop_front().expect("checked non-empty above");
        self.evaluated.push(acs.clone());

        match self.evaluate_aggregate_hypotheses(&acs) {
            3 => {
                self.aggr_outcome = Some("Not Closed-Loop".to_string());
                self.indiv_flows_enabled = true;
                tracing::info!("aggregate test inconclusive; escalating to per-flow mode");
            }
            2 => {
                self.finished = true;
                self.aggr_outcome = Some("Closed-Loop".to_string());
                self.final_outcome = self.aggr_outcome.clone();
                tracing::info!("aggregate verdict: closed-loop");
            }
            1 => {
                self.finished = true;
                self.aggr_outcome = Some("Duplicates Exceeded".to_string());
                self.final_outcome = self.aggr_outcome.clone();
                tracing::info!("aggregate verdict: duplicates exceeded");
            }
            _ => {}
        }
    }

    fn check_expired(&mut self, acs: &AggregateSnapshot) {
        let flow_knows_expired = self
            .flows
            .get(&acs.flow_id)
            .map(|f| f.meta_lists().expired_pkts_list.contains(&acs.packet_id))
            .unwrap_or(false);
        if !flow_knows_expired {
            return;
        }
        for pending in self.pending.iter_mut() {
            let lists = pending.lists.entry(acs.flow_id.clone()).or_default();
            if lists.dropped_pkts_list.contains(&acs.packet_id)
                && !lists.expired_pkts_list.contains(&acs.packet_id)
            {
                pending.counters.not_seen_dropped_pkts += 1;
                pending.counters.pending_dropped_pkts -= 1;
                lists.expired_pkts_list.insert(acs.packet_id.clone());
            }
        }
    }

    fn check_retransmitted(&mut self, acs: &AggregateSnapshot) {
        let flow_knows_retransmitted = self
            .flows
            .get(&acs.flow_id)
            .map(|f| f.meta_lists().retransmitted_pkts_list.contains(&acs.packet_id))
            .unwrap_or(false);
        if !flow_knows_retransmitted {
            return;
        }
        for pending in self.pending.iter_mut() {
            let lists = pending.lists.entry(acs.flow_id.clone()).or_default();
            if lists.dropped_pkts_list.contains(&acs.packet_id)
                && !lists.retransmitted_pkts_list.contains(&acs.packet_id)
            {
                pending.counters.retransmitted_dropped_pkts += 1;
                pending.counters.pending_dropped_pkts -= 1;
                lists.retransmitted_pkts_list.insert(acs.packet_id.clone());
            }
        }
    }

    fn check_duplicates(&mut self, acs: &AggregateSnapshot) {
        let duplicates = match self
            .flows
            .get(&acs.flow_id)
            .and_then(|f| f.duplicates_seen_by(&acs.packet_id))
        {
            Some(d) => d,
            None => return,
        };
        if duplicates <= acs.duplicate_pkts_at_drop_instance {
            return;
        }
        for pending in self.pending.iter_mut() {
            if pending.packet_id == acs.packet_id {
                pending.duplicate_pkts_at_drop_instance += 1;
            }
            let lists = pending.lists.entry(acs.flow_id.clone()).or_default();
            if lists.dropped_pkts_list.contains(&acs.packet_id)
                && !lists.expired_pkts_list.contains(&acs.packet_id)
                && !lists.retransmitted_pkts_list.contains(&acs.packet_id)
            {
                pending.counters.duplicate_pkts += 1;
            }
        }
    }

    fn evaluate_aggregate_hypotheses(&self, acs: &AggregateSnapshot) -> u8 {
        if self.params.min_droppable_pkts > 0
            && acs.counters.droppable_pkts < self.params.min_droppable_pkts
        {
            return 0;
        }
        if self.params.min_packet_drops > 0 && acs.counters.dropped_pkts < self.params.min_packet_drops
        {
            return 0;
        }

        let denom = acs.counters.droppable_pkts as i64 - acs.counters.dropped_pkts as i64;
        if denom < 1 {
            return 0;
        }
        let denom = denom as f64;
        let numerator = if acs.counters.duplicate_pkts == 0 {
            1.0
        } else {
            acs.counters.duplicate_pkts as f64
        };
        let f_dup = numerator / denom;

        if f_dup > self.params.max_duplicates {
            return 1;
        }

        let h1 = self
            .params
            .probability_not_observe_retransmission
            .powf(acs.counters.not_seen_dropped_pkts as f64);
        let h2 = f_dup.powf(acs.counters.retransmitted_dropped_pkts as f64);
        let p_closed = h1 / (h1 + h2);

        if p_closed > 0.99 {
            2
        } else if p_closed < 0.01 {
            3
        } else {
            0
        }
    }

    /// Produces the serializable view of this run. Per-flow stats are only
    /// populated when `include_per_flow` is set, since they're the
    /// expensive, optional part of the result.
    pub fn export(&self, include_per_flow: bool) -> ExportResult {
        ExportResult {
            aggr_outcome: self.aggr_outcome.clone(),
            final_outcome: self.final_outcome.clone(),
            indiv_flows_closed_loop: self.indiv_flows_closed_loop.iter().cloned().collect(),
            snapshots: self.evaluated.iter().map(AggregateSnapshotExport::from).collect(),
            indiv_flows: if include_per_flow {
                Some(
                    self.flows
                        .iter()
                        .map(|(id, f)| (id.clone(), f.export_flow_stats()))
                        .collect::<BTreeMap<String, FlowStatsExport>>(),
                )
            } else {
                None
            },
        }
    }
}
