//! The baseline lane change decision.

use super::{Decision, ResponseTable, SLOW_DOWN_FACTOR, SPEED_UP};
use crate::attributes::VehicleAttributes;

/// The distance ahead of the vehicle at which it aims to arrive in the target lane, in m.
pub const LOOKAHEAD: f64 = 50.0; // m

/// The outcome of comparing the vehicle against its gating partner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Gap {
    /// The partner is fast enough that merging now is safe.
    Clear,
    /// The vehicle can accelerate into the gap in front of the partner.
    Reachable,
    /// The vehicle should wait for the partner to pass.
    Closed,
}

/// Compares the vehicle `me` against its gating `partner` in the target lane.
pub(crate) fn assess_gap(me: &VehicleAttributes, partner: &VehicleAttributes) -> Gap {
    let n_loc = me.x() + LOOKAHEAD;
    let d_switch = n_loc - me.x();
    let t_switch = d_switch / me.speed;
    let d_gap = (n_loc - partner.x()).abs();

    if d_gap / t_switch < partner.speed {
        return Gap::Clear;
    }

    let t_gap = d_gap / partner.speed;
    let t_switch_accel = (d_switch / me.acceleration).sqrt();
    if t_switch_accel < t_gap {
        Gap::Reachable
    } else {
        Gap::Closed
    }
}

/// Turns a gap that is not clear into a speed adjustment and recommendation.
pub(crate) fn accelerate_or_defer(me: &VehicleAttributes, gap: Gap) -> Decision {
    match gap {
        Gap::Clear => Decision::Proceed,
        Gap::Reachable => Decision::Accelerate {
            speed: me.speed + SPEED_UP,
        },
        // TODO: dividing by the factor raises the speed; confirm whether
        // deferring should multiply by it instead.
        Gap::Closed => Decision::Defer {
            speed: me.speed / SLOW_DOWN_FACTOR,
        },
    }
}

/// Decides whether the vehicle `me` should move into `lane`.
pub(crate) fn decide(me: &VehicleAttributes, responses: &ResponseTable, lane: u32) -> Decision {
    match responses.partner(me, lane) {
        Some((_, partner)) => accelerate_or_defer(me, assess_gap(me, partner)),
        None => Decision::Proceed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Point2d;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::SlotMap;

    fn me(acceleration: f64) -> VehicleAttributes {
        VehicleAttributes {
            speed: 10.0,
            position: Point2d::new(100.0, 0.0),
            lane_index: 1,
            length: 5.0,
            acceleration,
            ..Default::default()
        }
    }

    fn partner(speed: f64) -> VehicleAttributes {
        VehicleAttributes {
            speed,
            position: Point2d::new(80.0, 0.0),
            lane_index: 2,
            length: 5.0,
            ..Default::default()
        }
    }

    fn responses(peer: VehicleAttributes) -> ResponseTable {
        let mut ids = SlotMap::with_key();
        let mut table = ResponseTable::default();
        table.insert(ids.insert(()), peer);
        table
    }

    // d_gap = 70 m and t_switch = 5 s, so the partner must exceed 14 m/s for a clear gap

    #[test]
    fn fast_partner_leaves_a_clear_gap() {
        assert_eq!(assess_gap(&me(2.6), &partner(20.0)), Gap::Clear);
        assert_eq!(decide(&me(2.6), &responses(partner(20.0)), 2), Decision::Proceed);
    }

    #[test]
    fn slow_partner_with_acceleration_margin() {
        // t_gap = 7 s, t_switch_accel = sqrt(50 / 2.6) ~ 4.4 s
        assert_eq!(assess_gap(&me(2.6), &partner(10.0)), Gap::Reachable);
        match decide(&me(2.6), &responses(partner(10.0)), 2) {
            Decision::Accelerate { speed } => assert_approx_eq!(speed, 16.0),
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn slow_partner_without_acceleration_margin() {
        // t_gap = 7 s, t_switch_accel = sqrt(50 / 0.5) = 10 s
        assert_eq!(assess_gap(&me(0.5), &partner(10.0)), Gap::Closed);
        match decide(&me(0.5), &responses(partner(10.0)), 2) {
            Decision::Defer { speed } => assert_approx_eq!(speed, 15.0),
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn no_partner_means_no_conflict() {
        assert_eq!(decide(&me(0.5), &ResponseTable::default(), 2), Decision::Proceed);
        // Partner too close behind to be cut off
        let close = VehicleAttributes {
            position: Point2d::new(95.0, 0.0),
            ..partner(1.0)
        };
        assert_eq!(decide(&me(0.5), &responses(close), 2), Decision::Proceed);
    }

    #[test]
    fn stationary_vehicle_is_always_clear_of_moving_partner() {
        let stopped = VehicleAttributes {
            speed: 0.0,
            ..me(2.6)
        };
        assert_eq!(assess_gap(&stopped, &partner(1.0)), Gap::Clear);
    }
}
