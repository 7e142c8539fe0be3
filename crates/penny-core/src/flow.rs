use std::collections::BTreeMap;

use crate::counters::{MetaLists, PennyCounters};
use crate::coverage::SeqCoverageIndex;
use crate::export::FlowCountersExport;
use crate::params::PennyParams;
use crate::random::RandomSource;
use crate::snapshot::FlowSnapshot;

/// Per-flow classification state. Owns one flow's coverage index, live
/// counters, meta-lists, pending-drop bookkeeping, and the ordered list of
/// snapshots captured at each drop instant.
#[derive(Debug)]
pub struct FlowDetector {
    params: PennyParams,
    highest_seq: u32,
    coverage: SeqCoverageIndex,
    counters: PennyCounters,
    meta: MetaLists,
    snapshots: Vec<FlowSnapshot>,
    valid_snapshot: Option<FlowSnapshot>,
    decision_made: bool,
    decision_type: u8,
    /// `packet_id -> time the drop was injected`.
    pending_drops_time: BTreeMap<String, f64>,
    /// `packet_id -> has a retransmission been observed yet`.
    dropped_pkts_decision: BTreeMap<String, bool>,
    seq_of_last_dropped_packet: u32,
    packet_drops_enabled: bool,
}

impl FlowDetector {
    pub fn new(params: PennyParams) -> Self {
        Self {
            params,
            highest_seq: 0,
            coverage: SeqCoverageIndex::new(),
            counters: PennyCounters::default(),
            meta: MetaLists::default(),
            snapshots: Vec::new(),
            valid_snapshot: None,
            decision_made: false,
            decision_type: 0,
            pending_drops_time: BTreeMap::new(),
            dropped_pkts_decision: BTreeMap::new(),
            seq_of_last_dropped_packet: 0,
            packet_drops_enabled: true,
        }
    }

    pub fn counters(&self) -> &PennyCounters {
        &self.counters
    }

    pub fn meta_lists(&self) -> &MetaLists {
        &self.meta
    }

    pub fn decision_made(&self) -> bool {
        self.decision_made
    }

    pub fn decision_type(&self) -> u8 {
        self.decision_type
    }

    pub fn disable_packet_drops(&mut self) {
        self.packet_drops_enabled = false;
    }

    pub fn enable_packet_drops(&mut self) {
        self.packet_drops_enabled = true;
    }

    /// Runs one observed packet through the per-flow pipeline.
    /// Returns `1` if the packet is droppable (a candidate the
    /// caller may pass to [`FlowDetector::drop_packet`]), `0` otherwise.
    pub fn process_packet(&mut self, pkt: &crate::packet::ObservedPacket, now: f64) -> u8 {
        self.counters.total_pkts += 1;

        if pkt.payload_size == 0 {
            self.counters.pure_ack_pkts += 1;
            tracing::trace!(flow_id = %pkt.flow_id, "pure ack, not droppable");
            return 0;
        }

        self.counters.data_pkts += 1;
        let packet_id = pkt.packet_id();
        let unique = self.coverage.is_unique(pkt.seq, pkt.payload_size);

        if pkt.seq < self.highest_seq && unique {
            self.counters.out_of_order_pkts += 1;
            self.coverage.add(pkt.seq, pkt.payload_size);
        } else {
            self.highest_seq = self.highest_seq.max(pkt.seq);
            self.counters.in_order_pkts += 1;
        }

        self.sweep_expired_drops(now);

        let is_droppable;
        if unique {
            self.coverage.add(pkt.seq, pkt.payload_size);
            self.counters.droppable_pkts += 1;
            is_droppable = true;
        } else if self.dropped_pkts_decision.get(&packet_id) == Some(&false) {
            *self.dropped_pkts_decision.get_mut(&packet_id).unwrap() = true;
            self.pending_drops_time.remove(&packet_id);
            self.counters.retransmitted_dropped_pkts += 1;
            self.counters.pending_dropped_pkts -= 1;
            self.meta.retransmitted_pkts_list.insert(packet_id.clone());
            tracing::debug!(flow_id = %pkt.flow_id, %packet_id, "retransmission observed");
            self.propagate_retransmitted(&packet_id);
            is_droppable = false;
        } else {
            self.counters.duplicate_pkts += 1;
            self.propagate_duplicates(pkt.seq);
            is_droppable = false;
        }

        self.refresh_valid_snapshot();
        if is_droppable {
            1
        } else {
            0
        }
    }

    /// Asks the environment's random source whether to drop `packet_id`,
    /// and if so, records the drop and captures a new snapshot. Returns
    /// whether the drop was actually injected.
    pub fn drop_packet(
        &mut self,
        seq: u32,
        packet_id: &str,
        now: f64,
        rng: &mut dyn RandomSource,
    ) -> bool {
        if !(rng.bernoulli(self.params.drop_probability) && self.drop_more_packets()) {
            return false;
        }

        self.seq_of_last_dropped_packet = seq;
        self.counters.dropped_pkts += 1;
        self.counters.pending_dropped_pkts += 1;
        self.dropped_pkts_decision.insert(packet_id.to_string(), false);
        self.pending_drops_time.insert(packet_id.to_string(), now);
        self.meta.dropped_pkts_list.insert(packet_id.to_string());
        tracing::info!(%packet_id, "drop injected");
        self.push_snapshot(packet_id);
        true
    }

    fn drop_more_packets(&self) -> bool {
        if !self.packet_drops_enabled {
            return false;
        }
        if !self.params.cap_drops_at_floor {
            return true;
        }
        if self.params.min_droppable_pkts > 0
            && self.counters.droppable_pkts >= self.params.min_droppable_pkts
        {
            return false;
        }
        if self.params.min_packet_drops > 0 && self.counters.dropped_pkts >= self.params.min_packet_drops
        {
            return false;
        }
        true
    }

    fn push_snapshot(&mut self, packet_id: &str) {
        self.snapshots.push(FlowSnapshot {
            highest_seq: self.highest_seq,
            packet_id: packet_id.to_string(),
            counters: self.counters,
            meta: self.meta.clone(),
        });
    }

    fn sweep_expired_drops(&mut self, now: f64) {
        let timeout = self.params.packet_drop_expiration_timeout;
        let mut expired = Vec::new();
        for (pid, &dropped_at) in self.pending_drops_time.iter() {
            let seq = match parse_seq_prefix(pid) {
                Some(seq) => seq,
                None => {
                    tracing::warn!(packet_id = %pid, "malformed packet identifier during expiration sweep; skipping");
                    continue;
                }
            };
            let mut elapsed = now - dropped_at;
            if seq == self.seq_of_last_dropped_packet {
                elapsed -= timeout;
            }
            if elapsed > timeout {
                expired.push(pid.clone());
            }
        }
        for pid in expired {
            self.pending_drops_time.remove(&pid);
            self.counters.pending_dropped_pkts -= 1;
            self.counters.not_seen_dropped_pkts += 1;
            self.dropped_pkts_decision.insert(pid.clone(), true);
            self.meta.expired_pkts_list.insert(pid.clone());
            tracing::debug!(packet_id = %pid, "drop expired without retransmission");
            self.propagate_expired(&pid);
        }
    }

    /// Back-propagates an expiration into every snapshot captured at or
    /// after the one for `packet_id`.
    fn propagate_expired(&mut self, packet_id: &str) {
        let mut reached = false;
        for snap in self.snapshots.iter_mut() {
            if !reached {
                if snap.packet_id == packet_id {
                    reached = true;
                } else {
                    continue;
                }
            }
            snap.counters.not_seen_dropped_pkts += 1;
            snap.counters.pending_dropped_pkts -= 1;
            snap.meta.expired_pkts_list.insert(packet_id.to_string());
        }
    }

    /// Back-propagates a retransmission into every snapshot captured at or
    /// after the one for `packet_id`.
    fn propagate_retransmitted(&mut self, packet_id: &str) {
        let mut reached = false;
        for snap in self.snapshots.iter_mut() {
            if !reached {
                if snap.packet_id == packet_id {
                    reached = true;
                } else {
                    continue;
                }
            }
            snap.counters.retransmitted_dropped_pkts += 1;
            snap.counters.pending_dropped_pkts -= 1;
            snap.meta.retransmitted_pkts_list.insert(packet_id.to_string());
        }
    }

    /// Back-propagates a duplicate observation into every snapshot whose
    /// `highest_seq` is at or beyond `seq`.
    fn propagate_duplicates(&mut self, seq: u32) {
        let mut reached = false;
        for snap in self.snapshots.iter_mut() {
            if !reached {
                if snap.highest_seq >= seq {
                    reached = true;
                } else {
                    continue;
                }
            }
            snap.counters.duplicate_pkts += 1;
        }
    }

    /// Selects the most recent snapshot with no pending drops left, the
    /// detector's best-known stable view.
    fn refresh_valid_snapshot(&mut self) {
        for snap in self.snapshots.iter() {
            if snap.counters.pending_dropped_pkts == 0 {
                self.valid_snapshot = Some(snap.clone());
            }
        }
    }

    fn current_state_snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            highest_seq: self.highest_seq,
            packet_id: String::new(),
            counters: self.counters,
            meta: self.meta.clone(),
        }
    }

    /// The stats the aggregate detector folds into a new aggregate snapshot:
    /// always the live counters/meta, regardless of whether this flow itself
    /// has a pending decision.
    pub fn contribution_snapshot(&self) -> FlowSnapshot {
        self.current_state_snapshot()
    }

    /// How many duplicates of `packet_id` this flow has observed so far, or
    /// `None` if `packet_id` was never dropped in this flow.
    pub fn duplicates_seen_by(&self, packet_id: &str) -> Option<u64> {
        self.snapshots
            .iter()
            .find(|s| s.packet_id == packet_id)
            .map(|s| s.counters.duplicate_pkts)
    }

    /// Selects the snapshot the hypothesis test evaluates against: the live
    /// state if no drop has been made yet, the most recent fully resolved
    /// snapshot if one exists, otherwise the oldest snapshot (every drop
    /// still pending).
    fn flow_state(&self) -> FlowSnapshot {
        if self.counters.dropped_pkts == 0 {
            self.current_state_snapshot()
        } else if self.counters.not_seen_dropped_pkts > 0 || self.counters.retransmitted_dropped_pkts > 0
        {
            self.valid_snapshot
                .clone()
                .unwrap_or_else(|| self.current_state_snapshot())
        } else {
            self.snapshots
                .first()
                .cloned()
                .unwrap_or_else(|| self.current_state_snapshot())
        }
    }

    /// The likelihood-ratio test deciding this flow's classification.
    /// Returns `0` (undecided), `1` (duplicates exceeded), `2` (closed-loop),
    /// or `3` (non-bidirectional).
    pub fn evaluate_hypotheses(&mut self) -> u8 {
        let state = self.flow_state();
        if state.counters.retransmitted_dropped_pkts == 0 && state.counters.not_seen_dropped_pkts == 0 {
            return 0;
        }
        if self.params.min_droppable_pkts > 0
            && state.counters.droppable_pkts < self.params.min_droppable_pkts
        {
            return 0;
        }
        if self.params.min_packet_drops > 0 && state.counters.dropped_pkts < self.params.min_packet_drops
        {
            return 0;
        }

        let denom = state.counters.droppable_pkts as i64 - state.counters.dropped_pkts as i64;
        if denom < 1 {
            return 0;
        }
        let denom = denom as f64;
        let numerator = if state.counters.duplicate_pkts == 0 {
            1.0
        } else {
            state.counters.duplicate_pkts as f64
        };
        let f_dup = numerator / denom;

        if f_dup > self.params.max_duplicates {
            self.decision_made = true;
            self.decision_type = 1;
            return 1;
        }

        let h1 = self
            .params
            .probability_not_observe_retransmission
            .powf(state.counters.not_seen_dropped_pkts as f64);
        let h2 = f_dup.powf(state.counters.retransmitted_dropped_pkts as f64);
        let p_closed = h1 / (h1 + h2);

        if p_closed > 0.99 {
            self.decision_made = true;
            self.decision_type = 2;
            if self.params.stop_indiv_flow_if_decided {
                self.disable_packet_drops();
            }
            2
        } else if p_closed < 0.01 {
            self.decision_made = true;
            self.decision_type = 3;
            if self.params.stop_indiv_flow_if_decided {
                self.disable_packet_drops();
            }
            3
        } else {
            0
        }
    }

    pub fn export_flow_stats(&self) -> crate::export::FlowStatsExport {
        crate::export::FlowStatsExport {
            current: FlowCountersExport::from_parts(&self.counters, &self.meta),
            snapshots: self
                .snapshots
                .iter()
                .map(|s| FlowCountersExport::from_parts(&s.counters, &s.meta))
                .collect(),
        }
    }
}

fn parse_seq_prefix(packet_id: &str) -> Option<u32> {
    packet_id.split('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ObservedPacket;

    struct DeterministicRng {
        always_true: bool,
    }

    impl RandomSource for DeterministicRng {
        fn bernoulli(&mut self, _p: f64) -> bool {
            self.always_true
        }
        fn uniform_int(&mut self, lo: i64, _hi: i64) -> i64 {
            lo
        }
        fn uniform_real(&mut self, lo: f64, _hi: f64) -> f64 {
            lo
        }
        fn uniform_choice(&mut self, _n: usize) -> usize {
            0
        }
    }

    fn params() -> PennyParams {
        PennyParams {
            drop_probability: 1.0,
            max_duplicates: 0.15,
            probability_not_observe_retransmission: 0.05,
            packet_drop_expiration_timeout: 2.0,
            min_packet_drops: 0,
            min_droppable_pkts: 0,
            min_closed_loop_flows: 0,
            max_packet_drops: u64::MAX,
            cap_drops_at_floor: true,
            stop_indiv_flow_if_decided: false,
        }
    }

    fn pkt(seq: u32, flow: &str) -> ObservedPacket {
        ObservedPacket {
            seq,
            ack: 0,
            payload_size: 10,
            flow_id: flow.to_string(),
            syn: false,
            is_real_flow: true,
        }
    }

    #[test]
    fn pure_ack_is_never_droppable() {
        let mut flow = FlowDetector::new(params());
        let mut ack = pkt(0, "f");
        ack.payload_size = 0;
        assert_eq!(flow.process_packet(&ack, 0.0), 0);
        assert_eq!(flow.counters().pure_ack_pkts, 1);
        assert_eq!(flow.counters().droppable_pkts, 0);
    }

    #[test]
    fn new_data_packet_is_droppable() {
        let mut flow = FlowDetector::new(params());
        assert_eq!(flow.process_packet(&pkt(0, "f"), 0.0), 1);
        assert_eq!(flow.counters().droppable_pkts, 1);
        assert_eq!(flow.counters().in_order_pkts, 1);
    }

    #[test]
    fn retransmission_resolves_pending_drop() {
        let mut flow = FlowDetector::new(params());
        let p0 = pkt(0, "f");
        flow.process_packet(&p0, 0.0);
        let mut rng = DeterministicRng { always_true: true };
        assert!(flow.drop_packet(0, &p0.packet_id(), 0.0, &mut rng));
        assert_eq!(flow.counters().pending_dropped_pkts, 1);

        // Same seq/ack resent: coverage index already has it, so it's a
        // retransmission rather than a fresh droppable packet.
        assert_eq!(flow.process_packet(&p0, 0.5), 0);
        assert_eq!(flow.counters().retransmitted_dropped_pkts, 1);
        assert_eq!(flow.counters().pending_dropped_pkts, 0);
    }

    #[test]
    fn unresolved_drop_expires_after_timeout() {
        let mut flow = FlowDetector::new(params());
        let p0 = pkt(0, "f");
        flow.process_packet(&p0, 0.0);
        let mut rng = DeterministicRng { always_true: true };
        flow.drop_packet(0, &p0.packet_id(), 0.0, &mut rng);

        let p1 = pkt(100, "f");
        flow.process_packet(&p1, 10.0); // well past the 2s timeout
        assert_eq!(flow.counters().not_seen_dropped_pkts, 1);
        assert_eq!(flow.counters().pending_dropped_pkts, 0);
    }

    #[test]
    fn duplicate_of_already_seen_range_increments_duplicate_counter() {
        let mut flow = FlowDetector::new(params());
        let p0 = pkt(0, "f");
        flow.process_packet(&p0, 0.0);
        flow.process_packet(&p0, 0.1);
        assert_eq!(flow.counters().duplicate_pkts, 1);
    }

    #[test]
    fn closed_loop_classification_after_many_retransmissions() {
        let mut flow = FlowDetector::new(params());
        let mut rng = DeterministicRng { always_true: true };
        for i in 0..20u32 {
            let p = pkt(i * 10, "f");
            flow.process_packet(&p, i as f64);
            flow.drop_packet(p.seq, &p.packet_id(), i as f64, &mut rng);
            flow.process_packet(&p, i as f64 + 0.1); // retransmitted
        }
        assert_eq!(flow.evaluate_hypotheses(), 2);
    }

    #[test]
    fn non_bidirectional_classification_when_drops_go_unanswered() {
        let mut flow = FlowDetector::new(params());
        let mut rng = DeterministicRng { always_true: true };
        for i in 0..20u32 {
            let p = pkt(i * 10, "f");
            flow.process_packet(&p, i as f64);
            flow.drop_packet(p.seq, &p.packet_id(), i as f64, &mut rng);
        }
        // push time far enough ahead that every pending drop expires
        let last = pkt(2000, "f");
        flow.process_packet(&last, 1000.0);
        assert_eq!(flow.evaluate_hypotheses(), 3);
    }

    #[test]
    fn borderline_probability_lands_just_above_the_closed_loop_cutoff() {
        // 16 droppable packets, 6 dropped, 3 retransmitted and 3 expired,
        // no duplicates: h1 = 0.5^3, h2 = (1/10)^3, p_closed = 0.125 /
        // 0.126 ≈ 0.992 — just over the 0.99 closed-loop cutoff.
        let mut p = params();
        p.probability_not_observe_retransmission = 0.5;
        let mut flow = FlowDetector::new(p);
        let mut rng = DeterministicRng { always_true: true };

        let pkts: Vec<_> = (0..16u32).map(|i| pkt(i * 10, "f")).collect();
        for pk in &pkts {
            flow.process_packet(pk, 0.0);
        }
        for pk in &pkts[0..6] {
            flow.drop_packet(pk.seq, &pk.packet_id(), 0.0, &mut rng);
        }
        // half the drops get answered...
        for pk in &pkts[0..3] {
            flow.process_packet(pk, 0.5);
        }
        // ...the other half age out unanswered.
        flow.process_packet(&pkt(1000, "f"), 5.0);

        assert_eq!(flow.evaluate_hypotheses(), 2);
    }
}
