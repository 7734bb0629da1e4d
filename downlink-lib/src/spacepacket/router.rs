use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use super::{Apid, Packet};

/// A consumer of routed packets.
pub trait PacketSink {
    fn handle(&mut self, packet: &Packet);
}

impl<F> PacketSink for F
where
    F: FnMut(&Packet),
{
    fn handle(&mut self, packet: &Packet) {
        self(packet);
    }
}

/// Dispatches packets to the sinks registered for their APID.
///
/// Packets for APIDs without a registered sink are counted and dropped. An APID may have
/// more than one sink, in which case sinks receive packets in registration order.
///
/// # Example
/// ```
/// use downlink::spacepacket::{Packet, PrimaryHeader, Router};
///
/// let mut seen = 0;
/// let mut counter = |_: &Packet| seen += 1;
/// let mut router = Router::default();
/// router.register(34, &mut counter);
///
/// let mut data = PrimaryHeader::standalone(34, 0, 1).encode().to_vec();
/// data.push(0);
/// router.route(&Packet::decode(&data).unwrap());
/// assert_eq!(router.routed(34), 1);
/// drop(router);
/// assert_eq!(seen, 1);
/// ```
#[derive(Default)]
pub struct Router<'a> {
    routes: HashMap<Apid, Vec<&'a mut dyn PacketSink>>,
    routed: BTreeMap<Apid, u64>,
    unrouted: u64,
}

impl<'a> Router<'a> {
    pub fn register(&mut self, apid: Apid, sink: &'a mut dyn PacketSink) {
        self.routes.entry(apid).or_default().push(sink);
    }

    /// Deliver `packet` to all sinks registered for its APID. Returns false if there were
    /// none.
    pub fn route(&mut self, packet: &Packet) -> bool {
        let apid = packet.header.apid;
        match self.routes.get_mut(&apid) {
            Some(sinks) => {
                for sink in sinks.iter_mut() {
                    sink.handle(packet);
                }
                *self.routed.entry(apid).or_default() += 1;
                true
            }
            None => {
                trace!(apid, "no sink for apid, dropping");
                self.unrouted += 1;
                false
            }
        }
    }

    /// Number of packets delivered for `apid`.
    pub fn routed(&self, apid: Apid) -> u64 {
        self.routed.get(&apid).copied().unwrap_or_default()
    }

    /// Per-APID delivered packet counts.
    pub fn routed_counts(&self) -> &BTreeMap<Apid, u64> {
        &self.routed
    }

    /// Number of packets dropped because no sink was registered for their APID.
    pub fn unrouted(&self) -> u64 {
        self.unrouted
    }
}
