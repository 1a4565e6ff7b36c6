use crate::attributes::VehicleAttributes;
use crate::VehicleId;
use std::collections::BTreeMap;

/// How many of its own lengths a peer must trail the requester by
/// to count as the peer an immediate merge would cut off.
const PARTNER_CLEARANCE: f64 = 2.0;

/// The attributes gathered from peers answering a single lane change query.
#[derive(Clone, Debug, Default)]
pub struct ResponseTable {
    peers: BTreeMap<VehicleId, VehicleAttributes>,
}

impl ResponseTable {
    /// Forgets every response.
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// Records a peer's response, replacing any earlier one from the same peer.
    pub fn insert(&mut self, peer: VehicleId, attributes: VehicleAttributes) {
        self.peers.insert(peer, attributes);
    }

    /// The response from the given peer.
    pub fn get(&self, peer: VehicleId) -> Option<&VehicleAttributes> {
        self.peers.get(&peer)
    }

    /// The number of responses.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether there are no responses.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Iterates over the responses in peer order.
    pub fn iter(&self) -> impl Iterator<Item = (VehicleId, &VehicleAttributes)> {
        self.peers.iter().map(|(id, a)| (*id, a))
    }

    /// Finds the gating partner in `lane`: the closest peer that is far enough
    /// behind `me` that merging now would cut in front of it.
    pub fn partner(
        &self,
        me: &VehicleAttributes,
        lane: u32,
    ) -> Option<(VehicleId, &VehicleAttributes)> {
        let candidates = self.iter().filter(|(_, peer)| {
            peer.lane_index == lane && peer.x() + PARTNER_CLEARANCE * peer.length < me.x()
        });
        nearest(me, candidates)
    }

    /// Finds the closest peer strictly ahead of `me` in its own lane.
    pub fn leader(&self, me: &VehicleAttributes) -> Option<(VehicleId, &VehicleAttributes)> {
        let candidates = self
            .iter()
            .filter(|(_, peer)| peer.lane_index == me.lane_index && peer.x() > me.x());
        nearest(me, candidates)
    }

    /// Finds the closest peer strictly behind `me` in its own lane.
    pub fn follower(&self, me: &VehicleAttributes) -> Option<(VehicleId, &VehicleAttributes)> {
        let candidates = self
            .iter()
            .filter(|(_, peer)| peer.lane_index == me.lane_index && peer.x() < me.x());
        nearest(me, candidates)
    }
}

/// The candidate with the smallest longitudinal distance to `me`.
fn nearest<'a>(
    me: &VehicleAttributes,
    candidates: impl Iterator<Item = (VehicleId, &'a VehicleAttributes)>,
) -> Option<(VehicleId, &'a VehicleAttributes)> {
    candidates.min_by(|(_, a), (_, b)| me.distance_to(a).total_cmp(&me.distance_to(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Point2d;
    use slotmap::SlotMap;

    fn at(x: f64, lane: u32) -> VehicleAttributes {
        VehicleAttributes {
            speed: 10.0,
            position: Point2d::new(x, 0.0),
            lane_index: lane,
            length: 5.0,
            ..Default::default()
        }
    }

    fn table(peers: &[VehicleAttributes]) -> (ResponseTable, Vec<VehicleId>) {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let mut table = ResponseTable::default();
        let keys = peers
            .iter()
            .map(|peer| {
                let id = ids.insert(());
                table.insert(id, *peer);
                id
            })
            .collect();
        (table, keys)
    }

    #[test]
    fn empty_table_has_no_peers() {
        let me = at(100.0, 1);
        let table = ResponseTable::default();
        assert!(table.partner(&me, 2).is_none());
        assert!(table.leader(&me).is_none());
        assert!(table.follower(&me).is_none());
    }

    #[test]
    fn partner_is_nearest_peer_clear_behind() {
        let me = at(100.0, 1);
        // 95 + 10 is not behind 100, so the peer at 95 would not be cut off
        let (table, ids) = table(&[at(95.0, 2), at(85.0, 2), at(60.0, 2), at(120.0, 2)]);
        let (id, partner) = table.partner(&me, 2).unwrap();
        assert_eq!(id, ids[1]);
        assert_eq!(partner.x(), 85.0);
    }

    #[test]
    fn partner_must_be_in_target_lane() {
        let me = at(100.0, 1);
        let (table, _) = table(&[at(80.0, 1), at(80.0, 0)]);
        assert!(table.partner(&me, 2).is_none());
    }

    #[test]
    fn leader_and_follower_are_nearest_in_own_lane() {
        let me = at(100.0, 1);
        let (table, ids) = table(&[
            at(130.0, 1),
            at(110.0, 1),
            at(105.0, 2),
            at(90.0, 1),
            at(70.0, 1),
            at(99.0, 0),
        ]);
        assert_eq!(table.leader(&me).unwrap().0, ids[1]);
        assert_eq!(table.follower(&me).unwrap().0, ids[3]);
    }

    #[test]
    fn peers_level_with_me_are_neither_leader_nor_follower() {
        let me = at(100.0, 1);
        let (table, _) = table(&[at(100.0, 1), at(150.0, 2)]);
        assert!(table.leader(&me).is_none());
        assert!(table.follower(&me).is_none());
    }
}
