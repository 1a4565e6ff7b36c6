//! The enhanced lane change decision, which may ask the gating partner to yield.

use super::ilach::{accelerate_or_defer, assess_gap, Gap};
use super::{Decision, ResponseTable};
use crate::attributes::VehicleAttributes;

/// Within this many of its own lengths, a leader or follower leaves the vehicle
/// no room to manoeuvre in its current lane.
const HEMMED_IN_LENGTHS: f64 = 4.0;

/// Whether the vehicle is boxed in by a close leader and a close follower.
/// A missing leader or follower means there is room to manoeuvre.
pub(crate) fn is_hemmed_in(me: &VehicleAttributes, responses: &ResponseTable) -> bool {
    let limit = HEMMED_IN_LENGTHS * me.length;
    let leader = responses.leader(me).map(|(_, peer)| me.distance_to(peer));
    let follower = responses.follower(me).map(|(_, peer)| me.distance_to(peer));
    matches!((leader, follower), (Some(l), Some(f)) if l <= limit && f <= limit)
}

/// Decides whether the vehicle `me` should move into `lane`.
pub(crate) fn decide(me: &VehicleAttributes, responses: &ResponseTable, lane: u32) -> Decision {
    let Some((partner_id, partner)) = responses.partner(me, lane) else {
        return Decision::Proceed;
    };
    match assess_gap(me, partner) {
        Gap::Clear => Decision::Proceed,
        _ if is_hemmed_in(me, responses) => Decision::RequestYield {
            partner: partner_id,
        },
        gap => accelerate_or_defer(me, gap),
    }
}
