use penny_core::export::ExportResult;
use penny_core::{AggregateDetector, NullActuator, ObservedPacket, PennyParams};

use crate::random::StdRandom;

/// Describes one synthetic flow's sending behavior: how many packets it
/// sends, and how it reacts when the detector injects a drop. Stands in for
/// a real packet-capture front end well enough to drive
/// [`penny_core::AggregateDetector`] end to end.
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub flow_id: String,
    pub packet_count: u32,
    pub payload_size: u32,
    /// Whether a dropped packet is ever retransmitted. `false` models a
    /// spoofed/open-loop source that cannot observe the drop.
    pub retransmits_drops: bool,
    /// How many times a retransmitted packet is resent. `1` is an ordinary
    /// closed-loop retransmission; higher values model an attacker that
    /// floods duplicates of packets it guesses were dropped.
    pub duplicate_factor: u32,
    /// If `true`, packets are emitted in a shuffled (but still fully
    /// covering) order rather than strictly increasing `seq`.
    pub reorder: bool,
    pub seed: u64,
}

/// Result of driving one [`ScenarioSpec`] to completion or exhaustion.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub aggr_outcome: Option<String>,
    pub final_outcome: Option<String>,
    pub packets_sent: u64,
    pub export: ExportResult,
}

/// Drives a single synthetic flow through an [`AggregateDetector`]
/// configured with `params`, interleaving retransmissions in response to
/// drops exactly as a real sender would: the detector's own `process_packet`
/// return value is the only signal the environment gets about whether a
/// packet was dropped.
pub fn run_single_flow_scenario(params: PennyParams, spec: &ScenarioSpec) -> ScenarioOutcome {
    let mut aggr = AggregateDetector::new(params);
    let mut rng = StdRandom::seed_from_u64(spec.seed);
    let mut actuator = NullActuator;

    let mut now = 0.0_f64;
    let mut seq = 0u32;
    let mut packets_sent = 0u64;
    let mut pending_retransmits: Vec<u32> = Vec::new();

    let order: Vec<u32> = if spec.reorder {
        shuffled_indices(spec.packet_count, spec.seed)
    } else {
        (0..spec.packet_count).collect()
    };

    for idx in order {
        while let Some(retx_seq) = pending_retransmits.pop() {
            let pkt = make_packet(&spec.flow_id, retx_seq, spec.payload_size, false);
            aggr.process_packet(&pkt, now, &mut rng, &mut actuator);
            packets_sent += 1;
            now += 0.01;
            if !aggr.is_running() {
                break;
            }
        }
        if !aggr.is_running() {
            break;
        }

        seq = idx * spec.payload_size;
        let pkt = make_packet(&spec.flow_id, seq, spec.payload_size, idx == 0);
        let droppable_and_dropped = aggr.process_packet(&pkt, now, &mut rng, &mut actuator) == 1;
        packets_sent += 1;
        now += 0.1;

        if droppable_and_dropped && spec.retransmits_drops {
            for _ in 0..spec.duplicate_factor.max(1) {
                pending_retransmits.push(seq);
            }
        }

        if !aggr.is_running() {
            break;
        }
    }

    ScenarioOutcome {
        aggr_outcome: aggr.aggr_outcome().map(str::to_string),
        final_outcome: aggr.final_outcome().map(str::to_string),
        packets_sent,
        export: aggr.export(true),
    }
}

fn make_packet(flow_id: &str, seq: u32, payload_size: u32, syn: bool) -> ObservedPacket {
    ObservedPacket {
        seq,
        ack: 0,
        payload_size,
        flow_id: flow_id.to_string(),
        syn,
        is_real_flow: true,
    }
}

/// A deterministic Fisher-Yates shuffle of `0..count`, seeded the same way
/// as the scenario's own RNG so out-of-order-but-legitimate runs stay
/// reproducible.
fn shuffled_indices(count: u32, seed: u64) -> Vec<u32> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut indices: Vec<u32> = (0..count).collect();
    let mut rng = StdRng::seed_from_u64(seed ^ 0xA5A5_A5A5_A5A5_A5A5);
    for i in (1..indices.len()).rev() {
        let j = rng.random_range(0..=i);
        indices.swap(i, j);
    }
    indices
}
