//! Closed-loop vs. spoofed transport-flow detection core.
//!
//! `penny-core` classifies an observed flow as closed-loop (a real
//! participant that retransmits what it never received) or spoofed/
//! open-loop (an attacker replaying a stream it cannot actually observe) by
//! deliberately dropping a small fraction of its data packets and watching
//! whether the drops induce retransmissions. The core itself never touches
//! a network, a clock, or an RNG directly — every external dependency comes
//! in through an explicit parameter or one of the traits in [`random`] and
//! [`actuator`], so it stays pure and single-threaded.
//!
//! - [`coverage`] — the sequence-space coverage index used to tell a new
//!   payload from a retransmission.
//! - [`flow`] — per-flow classification state.
//! - [`aggregate`] — cross-flow classification state and individual-flow
//!   escalation.
//! - [`params`] — validated configuration.
//! - [`export`] — serializable result types.

pub mod actuator;
pub mod aggregate;
pub mod counters;
pub mod coverage;
pub mod error;
pub mod export;
pub mod flow;
pub mod packet;
pub mod params;
pub mod random;
pub mod snapshot;

pub use actuator::{DropActuator, NullActuator};
pub use aggregate::AggregateDetector;
pub use error::PennyError;
pub use flow::FlowDetector;
pub use packet::ObservedPacket;
pub use params::{PennyParams, PennyParamsInput};
pub use random::RandomSource;

/// Installs a default, env-filtered `tracing` subscriber if one hasn't been
/// set up already. Safe to call more than once or alongside a caller's own
/// subscriber — it is a no-op in both cases.
pub fn init() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_target(true)
            .with_thread_names(true)
            .compact()
            .finish();
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            tracing::info!("penny-core tracing subscriber installed");
        }
    });
}
