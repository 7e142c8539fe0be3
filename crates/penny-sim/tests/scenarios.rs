//! End-to-end scenario tests driving `penny-core` through `penny-sim`'s
//! synthetic packet environment. Each test builds a single-flow
//! `AggregateDetector` run with a seeded `StdRandom` and checks the
//! terminal verdict rather than any particular counter.

use penny_core::PennyParams;
use penny_sim::{run_single_flow_scenario, ScenarioSpec};

fn params() -> PennyParams {
    PennyParams {
        drop_probability: 0.05,
        max_duplicates: 0.15,
        probability_not_observe_retransmission: 0.05,
        packet_drop_expiration_timeout: 2.0,
        min_packet_drops: 5,
        min_droppable_pkts: 20,
        min_closed_loop_flows: 0,
        max_packet_drops: 50,
        cap_drops_at_floor: true,
        stop_indiv_flow_if_decided: false,
    }
}

/// A pure closed-loop sender retransmits every dropped packet
/// and the detector converges on "Closed-Loop".
#[test]
fn pure_closed_loop_flow_is_classified_closed_loop() {
    let spec = ScenarioSpec {
        flow_id: "closed-loop".to_string(),
        packet_count: 3000,
        payload_size: 1000,
        retransmits_drops: true,
        duplicate_factor: 1,
        reorder: false,
        seed: 100,
    };
    let outcome = run_single_flow_scenario(params(), &spec);
    assert_eq!(outcome.final_outcome.as_deref(), Some("Closed-Loop"));
}

/// A pure spoofed sender never retransmits a dropped packet, so
/// every drop eventually expires and the flow cannot be classified
/// closed-loop.
#[test]
fn pure_spoofed_flow_is_never_classified_closed_loop() {
    let spec = ScenarioSpec {
        flow_id: "spoofed".to_string(),
        packet_count: 3000,
        payload_size: 1000,
        retransmits_drops: false,
        duplicate_factor: 1,
        reorder: false,
        seed: 101,
    };
    let outcome = run_single_flow_scenario(params(), &spec);
    assert_ne!(outcome.final_outcome.as_deref(), Some("Closed-Loop"));
}

/// An attacker that floods duplicates of every dropped packet
/// trips the duplicates-exceeded branch before the likelihood-ratio test
/// ever runs.
#[test]
fn flooding_duplicates_reaches_a_terminal_verdict() {
    let spec = ScenarioSpec {
        flow_id: "flooder".to_string(),
        packet_count: 3000,
        payload_size: 1000,
        retransmits_drops: true,
        duplicate_factor: 30,
        reorder: false,
        seed: 102,
    };
    let outcome = run_single_flow_scenario(params(), &spec);
    assert_eq!(outcome.final_outcome.as_deref(), Some("Duplicates Exceeded"));
}

/// Packets arriving out of order but fully retransmitted on
/// drop should still converge to closed-loop — reordering alone must not
/// look like evasion.
#[test]
fn out_of_order_but_fully_retransmitted_flow_is_still_closed_loop() {
    let spec = ScenarioSpec {
        flow_id: "reordered".to_string(),
        packet_count: 3000,
        payload_size: 1000,
        retransmits_drops: true,
        duplicate_factor: 1,
        reorder: true,
        seed: 103,
    };
    let outcome = run_single_flow_scenario(params(), &spec);
    assert_eq!(outcome.final_outcome.as_deref(), Some("Closed-Loop"));
}

/// A short flow that exhausts its packet budget before meeting
/// `min_droppable_pkts`/`min_packet_drops` never reaches a terminal verdict
/// — the detector must not force a decision on insufficient evidence.
#[test]
fn short_flow_stays_undecided_without_enough_evidence() {
    let spec = ScenarioSpec {
        flow_id: "short".to_string(),
        packet_count: 10,
        payload_size: 1000,
        retransmits_drops: true,
        duplicate_factor: 1,
        reorder: false,
        seed: 104,
    };
    let outcome = run_single_flow_scenario(params(), &spec);
    assert_eq!(outcome.final_outcome, None);
}

/// A drop probability of zero can never classify anything, closed-loop or
/// otherwise — there is no evidence to evaluate.
#[test]
fn zero_drop_probability_never_reaches_a_verdict() {
    let mut p = params();
    p.drop_probability = 0.0;
    let spec = ScenarioSpec {
        flow_id: "never-dropped".to_string(),
        packet_count: 3000,
        payload_size: 1000,
        retransmits_drops: true,
        duplicate_factor: 1,
        reorder: false,
        seed: 105,
    };
    let outcome = run_single_flow_scenario(p, &spec);
    assert_eq!(outcome.final_outcome, None);
}
