/// A single observed transport-layer packet, as handed to the detector by
/// whatever packet-capture front end the environment provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPacket {
    pub seq: u32,
    pub ack: u32,
    pub payload_size: u32,
    pub flow_id: String,
    pub syn: bool,
    /// True for packets belonging to a real (closed-loop) ns-3-style flow;
    /// false for a spoofed/injected one. Only used for the aggregate
    /// detector's informational `total_closed_loop_packets`/
    /// `total_spoofed_packets` tallies, never for the classification itself.
    pub is_real_flow: bool,
}

impl ObservedPacket {
    /// The packet identifier used to key meta-lists and pending-drop
    /// bookkeeping: `"<seq>-<ack>"`. Stable for as long as `seq`/`ack` are,
    /// which is the only uniqueness the detector relies on.
    pub fn packet_id(&self) -> String {
        format!("{}-{}", self.seq, self.ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_id_is_seq_dash_ack() {
        let pkt = ObservedPacket {
            seq: 42,
            ack: 7,
            payload_size: 100,
            flow_id: "flow-a".to_string(),
            syn: false,
            is_real_flow: true,
        };
        assert_eq!(pkt.packet_id(), "42-7");
    }
}
