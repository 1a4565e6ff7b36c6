use crate::error::{Error, Result};
use cgmath::Point2;
use std::fmt;
use std::str::FromStr;

/// A 2D point in world space, in m.
pub type Point2d = Point2<f64>;

/// Snapshot of a vehicle's kinematic state, as reported by the traffic provider.
///
/// The [Display] and [FromStr] implementations form the wire format exchanged
/// between vehicles: nine `Key: value` lines with floating point fields
/// rounded to two decimal places.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleAttributes {
    /// The current speed in m/s.
    pub speed: f64,
    /// The position of the vehicle in m; `x` is the longitudinal coordinate.
    pub position: Point2d,
    /// The lane the vehicle occupies, counted from zero.
    pub lane_index: u32,
    /// The vehicle length in m.
    pub length: f64,
    /// The maximum physical speed of the vehicle in m/s.
    pub max_speed: f64,
    /// The acceleration rate in m/s<sup>2</sup>.
    pub acceleration: f64,
    /// The deceleration rate in m/s<sup>2</sup>.
    pub deceleration: f64,
    /// The maximum legal speed at the vehicle's location in m/s.
    pub max_legal_speed: f64,
}

const SPEED: &str = "Speed";
const X: &str = "X";
const Y: &str = "Y";
const LANE_INDEX: &str = "Lane Index";
const LENGTH: &str = "Length";
const MAX_SPEED: &str = "Max Speed";
const ACCELERATION: &str = "Acceleration";
const DECELERATION: &str = "Deceleration";
const MAX_LEGAL_SPEED: &str = "Max Legal Speed";

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            speed: 0.0,
            position: Point2d::new(0.0, 0.0),
            lane_index: 0,
            length: 0.0,
            max_speed: 0.0,
            acceleration: 0.0,
            deceleration: 0.0,
            max_legal_speed: 0.0,
        }
    }
}

impl VehicleAttributes {
    /// The longitudinal position of the vehicle in m.
    pub fn x(&self) -> f64 {
        self.position.x
    }

    /// The absolute longitudinal distance to another vehicle in m.
    pub fn distance_to(&self, other: &VehicleAttributes) -> f64 {
        (other.position.x - self.position.x).abs()
    }
}

impl fmt::Display for VehicleAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{SPEED}: {:.2}", self.speed)?;
        writeln!(f, "{X}: {:.2}", self.position.x)?;
        writeln!(f, "{Y}: {:.2}", self.position.y)?;
        writeln!(f, "{LANE_INDEX}: {}", self.lane_index)?;
        writeln!(f, "{LENGTH}: {:.2}", self.length)?;
        writeln!(f, "{MAX_SPEED}: {:.2}", self.max_speed)?;
        writeln!(f, "{ACCELERATION}: {:.2}", self.acceleration)?;
        writeln!(f, "{DECELERATION}: {:.2}", self.deceleration)?;
        write!(f, "{MAX_LEGAL_SPEED}: {:.2}", self.max_legal_speed)
    }
}

impl FromStr for VehicleAttributes {
    type Err = Error;

    /// Parses the wire format produced by the [Display] implementation.
    /// Unknown keys are ignored; every known key must be present.
    fn from_str(s: &str) -> Result<Self> {
        let mut fields: [Option<&str>; 9] = [None; 9];
        let keys = [
            SPEED,
            X,
            Y,
            LANE_INDEX,
            LENGTH,
            MAX_SPEED,
            ACCELERATION,
            DECELERATION,
            MAX_LEGAL_SPEED,
        ];

        for line in s.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if let Some(idx) = keys.iter().position(|k| *k == key.trim()) {
                fields[idx] = Some(value.trim());
            }
        }

        let float = |idx: usize| -> Result<f64> {
            let value = fields[idx].ok_or(Error::MissingField(keys[idx]))?;
            value.parse().map_err(|_| Error::invalid(keys[idx], value))
        };
        let lane = fields[3].ok_or(Error::MissingField(LANE_INDEX))?;

        Ok(Self {
            speed: float(0)?,
            position: Point2d::new(float(1)?, float(2)?),
            lane_index: lane.parse().map_err(|_| Error::invalid(LANE_INDEX, lane))?,
            length: float(4)?,
            max_speed: float(5)?,
            acceleration: float(6)?,
            deceleration: float(7)?,
            max_legal_speed: float(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use proptest::prelude::*;

    fn sample() -> VehicleAttributes {
        VehicleAttributes {
            speed: 13.25,
            position: Point2d::new(412.5, -4.8),
            lane_index: 3,
            length: 5.0,
            max_speed: 55.56,
            acceleration: 2.6,
            deceleration: 4.5,
            max_legal_speed: 26.82,
        }
    }

    #[test]
    fn wire_format_layout() {
        let text = sample().to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "Speed: 13.25",
                "X: 412.50",
                "Y: -4.80",
                "Lane Index: 3",
                "Length: 5.00",
                "Max Speed: 55.56",
                "Acceleration: 2.60",
                "Deceleration: 4.50",
                "Max Legal Speed: 26.82",
            ]
        );
    }

    #[test]
    fn round_trip_two_decimal_values() {
        let attribs = sample();
        let parsed: VehicleAttributes = attribs.to_string().parse().unwrap();
        assert_eq!(parsed, attribs);
    }

    #[test]
    fn round_trip_is_within_formatting_precision() {
        let attribs = VehicleAttributes {
            speed: 17.0 / 3.0,
            position: Point2d::new(1234.5678, 0.001),
            acceleration: 2.0f64.sqrt(),
            ..sample()
        };
        let parsed: VehicleAttributes = attribs.to_string().parse().unwrap();
        assert_approx_eq!(parsed.speed, attribs.speed, 0.005);
        assert_approx_eq!(parsed.position.x, attribs.position.x, 0.005);
        assert_approx_eq!(parsed.position.y, attribs.position.y, 0.005);
        assert_approx_eq!(parsed.acceleration, attribs.acceleration, 0.005);
        assert_eq!(parsed.lane_index, attribs.lane_index);
    }

    fn arb_field() -> impl Strategy<Value = f64> {
        -1.0e6..1.0e6
    }

    prop_compose! {
        fn arb_attributes()(
            speed in arb_field(),
            x in arb_field(),
            y in arb_field(),
            lane_index in any::<u32>(),
            length in arb_field(),
            max_speed in arb_field(),
            acceleration in arb_field(),
            deceleration in arb_field(),
            max_legal_speed in arb_field()
        ) -> VehicleAttributes {
            VehicleAttributes {
                speed,
                position: Point2d::new(x, y),
                lane_index,
                length,
                max_speed,
                acceleration,
                deceleration,
                max_legal_speed,
            }
        }
    }

    proptest! {
        #[test]
        fn any_snapshot_survives_the_wire(attribs in arb_attributes()) {
            // Two decimal places, plus a little slack for parsing
            const TOLERANCE: f64 = 0.005 + 1e-6;
            let parsed: VehicleAttributes = attribs.to_string().parse().unwrap();
            let fields = [
                (parsed.speed, attribs.speed),
                (parsed.position.x, attribs.position.x),
                (parsed.position.y, attribs.position.y),
                (parsed.length, attribs.length),
                (parsed.max_speed, attribs.max_speed),
                (parsed.acceleration, attribs.acceleration),
                (parsed.deceleration, attribs.deceleration),
                (parsed.max_legal_speed, attribs.max_legal_speed),
            ];
            for (got, expected) in fields {
                prop_assert!((got - expected).abs() <= TOLERANCE, "{got} != {expected}");
            }
            prop_assert_eq!(parsed.lane_index, attribs.lane_index);
        }
    }

    #[test]
    fn max_speed_and_max_legal_speed_are_distinct_keys() {
        let parsed: VehicleAttributes = sample().to_string().parse().unwrap();
        assert_eq!(parsed.max_speed, 55.56);
        assert_eq!(parsed.max_legal_speed, 26.82);
    }

    #[test]
    fn missing_field_is_rejected() {
        let text = sample().to_string().replace("Length: 5.00\n", "");
        let err = text.parse::<VehicleAttributes>().unwrap_err();
        assert!(matches!(err, Error::MissingField(LENGTH)));
    }

    #[test]
    fn bad_number_is_rejected() {
        let text = sample().to_string().replace("Speed: 13.25", "Speed: fast");
        let err = text.parse::<VehicleAttributes>().unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }
}
