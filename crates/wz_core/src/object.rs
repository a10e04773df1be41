//! Object identity and read-only views.
//!
//! Droids, structures and features share one id space. Every reference
//! between objects (order targets, action targets, base pads, commanders)
//! is stored as an [`ObjectId`] and resolved through the world, so a dead
//! object can never be dereferenced by accident.

use serde::{Deserialize, Serialize};

use crate::droid::Droid;
use crate::math::{Fixed, TilePos, Vec2Fixed};
use crate::structure::{Feature, Structure};

/// Stable identifier of a simulated object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ObjectId(pub u32);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Player index.
pub type PlayerId = u8;

/// What kind of object an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A mobile unit.
    Droid,
    /// A building.
    Structure,
    /// A map feature (wreck, oil resource, artifact).
    Feature,
}

/// Borrowed view of any object.
#[derive(Debug, Clone, Copy)]
pub enum ObjectRef<'a> {
    /// A droid.
    Droid(&'a Droid),
    /// A structure.
    Structure(&'a Structure),
    /// A feature.
    Feature(&'a Feature),
}

impl<'a> ObjectRef<'a> {
    /// Object id.
    #[must_use]
    pub fn id(self) -> ObjectId {
        match self {
            Self::Droid(d) => d.id,
            Self::Structure(s) => s.id,
            Self::Feature(f) => f.id,
        }
    }

    /// Object kind.
    #[must_use]
    pub fn kind(self) -> ObjectKind {
        match self {
            Self::Droid(_) => ObjectKind::Droid,
            Self::Structure(_) => ObjectKind::Structure,
            Self::Feature(_) => ObjectKind::Feature,
        }
    }

    /// World position.
    #[must_use]
    pub fn pos(self) -> Vec2Fixed {
        match self {
            Self::Droid(d) => d.pos,
            Self::Structure(s) => s.pos,
            Self::Feature(f) => f.pos,
        }
    }

    /// Tile under the object's position.
    #[must_use]
    pub fn tile(self) -> TilePos {
        TilePos::of(self.pos())
    }

    /// Height of the object.
    #[must_use]
    pub fn z(self) -> Fixed {
        match self {
            Self::Droid(d) => d.z,
            _ => Fixed::ZERO,
        }
    }

    /// Owning player. Features belong to nobody.
    #[must_use]
    pub fn player(self) -> Option<PlayerId> {
        match self {
            Self::Droid(d) => Some(d.player),
            Self::Structure(s) => Some(s.player),
            Self::Feature(_) => None,
        }
    }

    /// Collision radius.
    #[must_use]
    pub fn radius(self) -> i32 {
        match self {
            Self::Droid(d) => d.radius(),
            Self::Structure(s) => s.radius(),
            Self::Feature(f) => f.radius,
        }
    }

    /// Tick at which the object was marked dead, if it was.
    #[must_use]
    pub fn died(self) -> Option<u64> {
        match self {
            Self::Droid(d) => d.died,
            Self::Structure(s) => s.died,
            Self::Feature(f) => f.died,
        }
    }

    /// True if the object has not been marked dead.
    #[must_use]
    pub fn is_alive(self) -> bool {
        self.died().is_none()
    }

    /// Current and maximum body points.
    #[must_use]
    pub fn body(self) -> (u32, u32) {
        match self {
            Self::Droid(d) => (d.body, d.original_body),
            Self::Structure(s) => (s.body, s.max_body),
            Self::Feature(f) => (f.body, f.body.max(1)),
        }
    }

    /// The droid behind this view, if it is one.
    #[must_use]
    pub fn as_droid(self) -> Option<&'a Droid> {
        match self {
            Self::Droid(d) => Some(d),
            _ => None,
        }
    }

    /// The structure behind this view, if it is one.
    #[must_use]
    pub fn as_structure(self) -> Option<&'a Structure> {
        match self {
            Self::Structure(s) => Some(s),
            _ => None,
        }
    }

    /// The feature behind this view, if it is one.
    #[must_use]
    pub fn as_feature(self) -> Option<&'a Feature> {
        match self {
            Self::Feature(f) => Some(f),
            _ => None,
        }
    }
}

/// Percentage of `current` over `max`, `100` when `max` is zero.
#[must_use]
pub fn percent(current: u32, max: u32) -> u32 {
    if max == 0 {
        return 100;
    }
    (u64::from(current) * 100 / u64::from(max)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(200, 200), 100);
    }

    #[test]
    fn test_object_id_ordering() {
        let mut ids = vec![ObjectId(5), ObjectId(1), ObjectId(3)];
        ids.sort();
        assert_eq!(ids, vec![ObjectId(1), ObjectId(3), ObjectId(5)]);
        assert_eq!(ObjectId(7).to_string(), "7");
    }
}
