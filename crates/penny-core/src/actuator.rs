/// External effector that carries out a drop decision.
/// `penny-core` calls this once `FlowDetector::drop_packet` decides to act;
/// it has no visibility into whether the drop actually reached the wire.
pub trait DropActuator {
    fn drop_packet(&mut self, packet_id: &str);
}

/// An actuator that does nothing, for tests and dry runs that only care
/// about the detector's own bookkeeping.
#[derive(Debug, Default)]
pub struct NullActuator;

impl DropActuator for NullActuator {
    fn drop_packet(&mut self, _packet_id: &str) {}
}
