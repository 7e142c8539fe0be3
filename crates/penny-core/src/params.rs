use serde::Deserialize;

use crate::error::PennyError;

/// Validated detector configuration. Immutable once built; a
/// `FlowDetector`/`AggregateDetector` is configured exactly once, at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PennyParams {
    pub drop_probability: f64,
    pub max_duplicates: f64,
    pub probability_not_observe_retransmission: f64,
    pub packet_drop_expiration_timeout: f64,
    pub min_packet_drops: u64,
    pub min_droppable_pkts: u64,
    pub min_closed_loop_flows: u64,
    pub max_packet_drops: u64,
    /// When `true` (the default), drop injection stops once
    /// `min_droppable_pkts`/`min_packet_drops` is reached. When `false`,
    /// those floors are ignored and sampling continues for as long as the
    /// flow is enabled.
    pub cap_drops_at_floor: bool,
    /// When `true`, a flow that reaches a terminal per-flow decision has
    /// further drop injection disabled.
    pub stop_indiv_flow_if_decided: bool,
}

/// Deserializable mirror of [`PennyParams`]: every field optional so a
/// config file only has to name what it overrides, resolved with
/// [`PennyParamsInput::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PennyParamsInput {
    pub drop_probability: Option<f64>,
    pub max_duplicates: Option<f64>,
    pub probability_not_observe_retransmission: Option<f64>,
    pub packet_drop_expiration_timeout: Option<f64>,
    pub min_packet_drops: Option<u64>,
    pub min_droppable_pkts: Option<u64>,
    pub min_closed_loop_flows: Option<u64>,
    pub max_packet_drops: Option<u64>,
    pub cap_drops_at_floor: Option<bool>,
    pub stop_indiv_flow_if_decided: Option<bool>,
}

impl PennyParamsInput {
    /// Validates and fills in defaults, producing a [`PennyParams`] the
    /// detector can be built from. Fails closed: a missing or out-of-range
    /// probability is a `PennyError::Configuration`, never a silent clamp.
    pub fn resolve(self) -> Result<PennyParams, PennyError> {
        let drop_probability = require_unit_interval(self.drop_probability, "drop_probability")?;
        let max_duplicates = require_non_negative(self.max_duplicates, "max_duplicates")?;
        let probability_not_observe_retransmission = require_unit_interval(
            self.probability_not_observe_retransmission,
            "probability_not_observe_retransmission",
        )?;
        let packet_drop_expiration_timeout = require_non_negative(
            self.packet_drop_expiration_timeout,
            "packet_drop_expiration_timeout",
        )?;

        Ok(PennyParams {
            drop_probability,
            max_duplicates,
            probability_not_observe_retransmission,
            packet_drop_expiration_timeout,
            min_packet_drops: self.min_packet_drops.unwrap_or(0),
            min_droppable_pkts: self.min_droppable_pkts.unwrap_or(0),
            min_closed_loop_flows: self.min_closed_loop_flows.unwrap_or(0),
            max_packet_drops: self.max_packet_drops.unwrap_or(u64::MAX),
            cap_drops_at_floor: self.cap_drops_at_floor.unwrap_or(true),
            stop_indiv_flow_if_decided: self.stop_indiv_flow_if_decided.unwrap_or(false),
        })
    }
}

fn require_unit_interval(value: Option<f64>, field: &str) -> Result<f64, PennyError> {
    let v = value.ok_or_else(|| missing(field))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(PennyError::Configuration(format!(
            "`{field}` must be in [0, 1], got {v}"
        )));
    }
    Ok(v)
}

fn require_non_negative(value: Option<f64>, field: &str) -> Result<f64, PennyError> {
    let v = value.ok_or_else(|| missing(field))?;
    if v < 0.0 {
        return Err(PennyError::Configuration(format!(
            "`{field}` must be >= 0, got {v}"
        )));
    }
    Ok(v)
}

fn missing(field: &str) -> PennyError {
    PennyError::Configuration(format!("missing required field `{field}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> PennyParamsInput {
        PennyParamsInput {
            drop_probability: Some(0.05),
            max_duplicates: Some(0.15),
            probability_not_observe_retransmission: Some(0.05),
            packet_drop_expiration_timeout: Some(2.0),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_with_sensible_defaults() {
        let params = valid_input().resolve().unwrap();
        assert_eq!(params.min_packet_drops, 0);
        assert!(params.cap_drops_at_floor);
        assert!(!params.stop_indiv_flow_if_decided);
        assert_eq!(params.max_packet_drops, u64::MAX);
    }

    #[test]
    fn missing_drop_probability_is_configuration_error() {
        let mut input = valid_input();
        input.drop_probability = None;
        assert!(matches!(
            input.resolve(),
            Err(PennyError::Configuration(_))
        ));
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let mut input = valid_input();
        input.drop_probability = Some(1.5);
        assert!(matches!(
            input.resolve(),
            Err(PennyError::Configuration(_))
        ));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let mut input = valid_input();
        input.packet_drop_expiration_timeout = Some(-1.0);
        assert!(matches!(
            input.resolve(),
            Err(PennyError::Configuration(_))
        ));
    }
}
