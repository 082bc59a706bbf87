//! Spatial device selection
//!
//! Filters a device list by pod side and orders it relative to a reference
//! point or direction. Used for both DMX device targeting and audio element
//! targeting; callers take the first N results to get the nearest (or most
//! aligned) N devices.
//!
//! Side wedges are 90° quadrants centered on each axis of the floor plane:
//!
//! ```text
//!            Front (+y)
//!          \         /
//!           \       /
//!  Right     \     /     Left
//!  (-x)       \   /      (+x)
//!              \ /
//!              / \
//!            Back (-y)
//! ```
//!
//! A position exactly on a diagonal belongs to two wedges; results never
//! contain the same device twice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::geometry::Vec2;

/// Bitmask of pod sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Side(u8);

impl Side {
    pub const NONE: Side = Side(0);
    pub const LEFT: Side = Side(1);
    pub const RIGHT: Side = Side(1 << 1);
    pub const FRONT: Side = Side(1 << 2);
    pub const BACK: Side = Side(1 << 3);
    pub const ALL: Side = Side(0b1111);

    const FLAGS: [(Side, &'static str); 4] = [
        (Side::LEFT, "Left"),
        (Side::RIGHT, "Right"),
        (Side::FRONT, "Front"),
        (Side::BACK, "Back"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Side) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Side) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Every side whose wedge contains `pos`.
    pub fn classify(pos: Vec2) -> Side {
        Self::FLAGS
            .iter()
            .filter(|(flag, _)| in_wedge(pos, *flag))
            .fold(Side::NONE, |acc, (flag, _)| acc | *flag)
    }
}

impl BitOr for Side {
    type Output = Side;
    fn bitor(self, rhs: Side) -> Side {
        Side(self.0 | rhs.0)
    }
}

impl BitOrAssign for Side {
    fn bitor_assign(&mut self, rhs: Side) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Side::ALL {
            return f.write_str("All");
        }
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<&str> = Self::FLAGS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

impl FromStr for Side {
    type Err = ConfigError;

    /// Accepts `All`, `None`, or flag names joined by `|` or `,`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut side = Side::NONE;
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            side |= match part.to_ascii_lowercase().as_str() {
                "left" => Side::LEFT,
                "right" => Side::RIGHT,
                "front" => Side::FRONT,
                "back" => Side::BACK,
                "all" => Side::ALL,
                "none" => Side::NONE,
                other => return Err(ConfigError::Invalid(format!("unknown side '{}'", other))),
            };
        }
        Ok(side)
    }
}

impl TryFrom<String> for Side {
    type Error = ConfigError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Side> for String {
    fn from(side: Side) -> String {
        side.to_string()
    }
}

/// Ordering applied after side filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderMethod {
    /// Euclidean distance to the reference point
    #[default]
    Distance,
    /// Angle between the reference direction and the position vector (0-180°)
    Angle,
}

fn in_wedge(pos: Vec2, flag: Side) -> bool {
    match flag {
        Side::LEFT => pos.x >= 0.0 && pos.x >= pos.y.abs(),
        Side::RIGHT => pos.x <= 0.0 && -pos.x >= pos.y.abs(),
        Side::FRONT => pos.y >= 0.0 && pos.y >= pos.x.abs(),
        Side::BACK => pos.y <= 0.0 && -pos.y >= pos.x.abs(),
        _ => false,
    }
}

/// True if `pos` lies in the wedge of any flag in `side`.
pub fn matches_side(pos: Vec2, side: Side) -> bool {
    Side::FLAGS
        .iter()
        .any(|(flag, _)| side.contains(*flag) && in_wedge(pos, *flag))
}

/// Devices on the requested sides, in input order, each at most once.
pub fn select<T, F>(devices: &[T], position: F, side: Side) -> Vec<&T>
where
    F: Fn(&T) -> Vec2,
{
    devices
        .iter()
        .filter(|d| matches_side(position(*d), side))
        .collect()
}

/// [`select`] followed by a stable ascending sort on `method`.
///
/// Ties keep input order.
pub fn select_and_order<T, F>(
    devices: &[T],
    position: F,
    reference: Vec2,
    method: OrderMethod,
    side: Side,
) -> Vec<&T>
where
    F: Fn(&T) -> Vec2,
{
    let mut keyed: Vec<(f32, &T)> = select(devices, &position, side)
        .into_iter()
        .map(|d| {
            let pos = position(d);
            let key = match method {
                OrderMethod::Distance => pos.distance(reference),
                OrderMethod::Angle => reference.angle_deg(pos),
            };
            (key, d)
        })
        .collect();

    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    keyed.into_iter().map(|(_, d)| d).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pos(p: &(&str, Vec2)) -> Vec2 {
        p.1
    }

    #[test]
    fn test_classify_quadrants() {
        assert_eq!(Side::classify(Vec2::new(2.0, 0.5)), Side::LEFT);
        assert_eq!(Side::classify(Vec2::new(-2.0, 0.5)), Side::RIGHT);
        assert_eq!(Side::classify(Vec2::new(0.1, 3.0)), Side::FRONT);
        assert_eq!(Side::classify(Vec2::new(0.1, -3.0)), Side::BACK);
        assert_eq!(Side::classify(Vec2::new(1.0, 1.0)), Side::LEFT | Side::FRONT);
    }

    #[test]
    fn test_select_all_has_no_duplicates_on_diagonal() {
        let devices = vec![
            ("diag", Vec2::new(1.0, 1.0)),
            ("origin", Vec2::ZERO),
            ("left", Vec2::new(3.0, 0.0)),
        ];
        let picked = select(&devices, pos, Side::ALL);
        let names: Vec<&str> = picked.iter().map(|d| d.0).collect();
        assert_eq!(names, vec!["diag", "origin", "left"]);
    }

    #[test]
    fn test_select_single_side() {
        let devices = vec![
            ("l", Vec2::new(3.0, 0.0)),
            ("r", Vec2::new(-3.0, 0.0)),
            ("f", Vec2::new(0.0, 3.0)),
        ];
        let picked = select(&devices, pos, Side::RIGHT | Side::FRONT);
        let names: Vec<&str> = picked.iter().map(|d| d.0).collect();
        assert_eq!(names, vec!["r", "f"]);
    }

    #[test]
    fn test_order_by_distance_and_angle() {
        let devices = vec![
            ("far", Vec2::new(5.0, 0.0)),
            ("near", Vec2::new(1.0, 0.0)),
            ("front", Vec2::new(0.0, 2.0)),
        ];
        let by_dist = select_and_order(&devices, pos, Vec2::ZERO, OrderMethod::Distance, Side::ALL);
        let names: Vec<&str> = by_dist.iter().map(|d| d.0).collect();
        assert_eq!(names, vec!["near", "front", "far"]);

        let by_angle = select_and_order(
            &devices,
            pos,
            Vec2::new(0.0, 1.0),
            OrderMethod::Angle,
            Side::ALL,
        );
        assert_eq!(by_angle[0].0, "front");
    }

    #[test]
    fn test_ties_keep_input_order() {
        let devices = vec![
            ("a", Vec2::new(1.0, 0.0)),
            ("b", Vec2::new(-1.0, 0.0)),
            ("c", Vec2::new(0.0, 1.0)),
        ];
        let ordered = select_and_order(&devices, pos, Vec2::ZERO, OrderMethod::Distance, Side::ALL);
        let names: Vec<&str> = ordered.iter().map(|d| d.0).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_side_parse_and_display() {
        let side: Side = "Left|Back".parse().unwrap();
        assert_eq!(side, Side::LEFT | Side::BACK);
        assert_eq!(side.to_string(), "Left|Back");
        assert_eq!("all".parse::<Side>().unwrap(), Side::ALL);
        assert!("sideways".parse::<Side>().is_err());
    }

    proptest! {
        #[test]
        fn prop_select_all_returns_every_device_once(
            points in prop::collection::vec((-10i32..10, -10i32..10), 0..40)
        ) {
            let devices: Vec<Vec2> = points
                .iter()
                .map(|(x, y)| Vec2::new(*x as f32, *y as f32))
                .collect();
            let picked = select(&devices, |p| *p, Side::ALL);
            prop_assert_eq!(picked.len(), devices.len());
            for (a, b) in picked.iter().zip(devices.iter()) {
                prop_assert!(std::ptr::eq(*a, b));
            }
        }

        #[test]
        fn prop_distance_order_is_non_decreasing(
            points in prop::collection::vec((-50.0f32..50.0, -50.0f32..50.0), 0..40),
            rx in -20.0f32..20.0,
            ry in -20.0f32..20.0,
        ) {
            let devices: Vec<Vec2> = points.iter().map(|(x, y)| Vec2::new(*x, *y)).collect();
            let reference = Vec2::new(rx, ry);
            let ordered = select_and_order(
                &devices,
                |p| *p,
                reference,
                OrderMethod::Distance,
                Side::ALL,
            );
            for pair in ordered.windows(2) {
                prop_assert!(pair[0].distance(reference) <= pair[1].distance(reference));
            }
        }
    }
}
