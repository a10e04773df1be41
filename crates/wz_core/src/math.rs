//! Fixed-point math utilities for deterministic simulation.
//!
//! All kernel math uses fixed-point arithmetic and integer angles so the
//! simulation produces identical results on every platform. Floating-point
//! operations can produce different results on different CPUs.
//!
//! Angles are `u16` values where `65536` is a full turn. A direction of
//! `0` points along `+y` and angles grow towards `+x`, so the unit vector of
//! an angle `a` is `(sin a, cos a)`.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Integer angle, `65536` units per full turn.
pub type Angle = u16;

/// World units per map tile.
pub const TILE_UNITS: i32 = 128;

/// `log2(TILE_UNITS)`.
pub const TILE_SHIFT: u32 = 7;

/// Quarter turn in angle units.
pub const QUARTER_TURN: i32 = 16384;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Map tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TilePos {
    /// Tile column.
    pub x: i32,
    /// Tile row.
    pub y: i32,
}

impl TilePos {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile containing a world position.
    #[must_use]
    pub fn of(pos: Vec2Fixed) -> Self {
        Self::new(map_coord(pos.x), map_coord(pos.y))
    }

    /// World position of the tile centre.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(
            self.x * TILE_UNITS + TILE_UNITS / 2,
            self.y * TILE_UNITS + TILE_UNITS / 2,
        )
    }

    /// Offset this tile by a number of tiles.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for `Option<Vec2Fixed>` fields that are commonly absent.
pub mod option_vec_serde {
    use super::Vec2Fixed;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize an optional vector.
    pub fn serialize<S>(value: &Option<Vec2Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&(v.x.to_bits(), v.y.to_bits())),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional vector.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec2Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<(i64, i64)>::deserialize(deserializer)?;
        Ok(opt.map(|(x, y)| {
            Vec2Fixed::new(super::Fixed::from_bits(x), super::Fixed::from_bits(y))
        }))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Create a vector from integer world units.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Integer world units, rounded towards negative infinity.
    #[must_use]
    pub fn to_ints(self) -> (i32, i32) {
        (self.x.floor().to_num(), self.y.floor().to_num())
    }

    /// True if both components are zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Squared distance in whole world units, computed exactly.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> i64 {
        (self - other).length_squared()
    }

    /// Squared length in whole world units, computed exactly.
    #[must_use]
    pub fn length_squared(self) -> i64 {
        let x = i128::from(self.x.to_bits());
        let y = i128::from(self.y.to_bits());
        let sum = x * x + y * y;
        i64::try_from(sum >> 64).unwrap_or(i64::MAX)
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        let x = i128::from(self.x.to_bits());
        let y = i128::from(self.y.to_bits());
        let sum = (x * x + y * y) as u128;
        Fixed::from_bits(i64::try_from(isqrt_u128(sum)).unwrap_or(i64::MAX))
    }

    /// Distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        (self - other).length()
    }

    /// Dot product of two vectors, saturating at the `Fixed` range.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        let sum = i128::from(self.x.to_bits()) * i128::from(other.x.to_bits())
            + i128::from(self.y.to_bits()) * i128::from(other.y.to_bits());
        saturate(sum >> 32)
    }

    /// Z component of the cross product (`self.x * other.y - self.y * other.x`).
    #[must_use]
    pub fn cross(self, other: Self) -> Fixed {
        let sum = i128::from(self.x.to_bits()) * i128::from(other.y.to_bits())
            - i128::from(self.y.to_bits()) * i128::from(other.x.to_bits());
        saturate(sum >> 32)
    }

    /// Scale by a fixed-point factor.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Vector with the same direction and the requested length.
    #[must_use]
    pub fn with_length(self, length: Fixed) -> Self {
        self.normalize().scale(length)
    }

    /// Projection of `self` onto the line through `dir`.
    #[must_use]
    pub fn project_onto(self, dir: Self) -> Self {
        let unit = dir.normalize();
        unit.scale(self.dot(unit))
    }

    /// Rotate a quarter turn counter-clockwise (`(-y, x)`).
    #[must_use]
    pub fn perp_left(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Rotate a quarter turn clockwise (`(y, -x)`).
    #[must_use]
    pub fn perp_right(self) -> Self {
        Self::new(self.y, -self.x)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Direction of this vector as an angle.
    #[must_use]
    pub fn angle(self) -> Angle {
        atan2(self.x, self.y)
    }
}

fn saturate(bits: i128) -> Fixed {
    Fixed::from_bits(i64::try_from(bits).unwrap_or(if bits < 0 { i64::MIN } else { i64::MAX }))
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::SubAssign for Vec2Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

/// Tile coordinate of a world coordinate.
#[must_use]
pub fn map_coord(world: Fixed) -> i32 {
    (world.to_bits() >> (32 + TILE_SHIFT)) as i32
}

/// World coordinate of the low edge of a tile.
#[must_use]
pub fn world_coord(tile: i32) -> Fixed {
    Fixed::from_num(tile * TILE_UNITS)
}

/// Integer square root of a `u128` (floor).
#[must_use]
pub fn isqrt_u128(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let bits = 128 - n.leading_zeros();
    let mut x = 1u128 << bits.div_ceil(2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Square root of a non-negative fixed-point number.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    let scaled = (value.to_bits() as u128) << 32;
    Fixed::from_bits(i64::try_from(isqrt_u128(scaled)).unwrap_or(i64::MAX))
}

/// Convert whole degrees into an angle.
#[must_use]
pub const fn deg(degrees: i32) -> Angle {
    ((degrees as i64 * 65536 / 360) & 0xFFFF) as Angle
}

/// Convert a rate in degrees to angle units without wrapping.
#[must_use]
pub const fn deg_units(degrees: i32) -> i32 {
    degrees * 65536 / 360
}

/// Signed shortest rotation represented by an angle (`-32768..32768`).
#[must_use]
pub const fn angle_delta(angle: Angle) -> i32 {
    angle as i16 as i32
}

/// Signed shortest rotation from `from` to `to`.
#[must_use]
pub const fn angle_diff(to: Angle, from: Angle) -> i32 {
    angle_delta(to.wrapping_sub(from))
}

/// Add a signed offset to an angle, wrapping around the circle.
#[must_use]
pub const fn angle_add(angle: Angle, offset: i32) -> Angle {
    (angle as i32).wrapping_add(offset) as Angle
}

// sin(pi/2 * x) ~= x * (A - x^2 * (B - x^2 * C)) on [0, 1], with A - B + C == 1.
const SIN_A: Fixed = Fixed::from_bits(6_746_518_852);
const SIN_B: Fixed = Fixed::from_bits(2_755_631_252);
const SIN_C: Fixed = Fixed::from_bits(304_066_730);

/// Deterministic sine of an integer angle.
#[must_use]
pub fn sin(angle: Angle) -> Fixed {
    let quadrant = angle >> 14;
    let mut r = u32::from(angle & 0x3FFF);
    if quadrant & 1 == 1 {
        r = QUARTER_TURN as u32 - r;
    }
    let x = Fixed::from_bits(i64::from(r) << 18);
    let x2 = x * x;
    let value = x * (SIN_A - x2 * (SIN_B - x2 * SIN_C));
    let value = value.min(Fixed::ONE);
    if quadrant >= 2 {
        -value
    } else {
        value
    }
}

/// Deterministic cosine of an integer angle.
#[must_use]
pub fn cos(angle: Angle) -> Fixed {
    sin(angle.wrapping_add(QUARTER_TURN as u16))
}

/// Unit vector pointing along an angle.
#[must_use]
pub fn direction_vector(angle: Angle) -> Vec2Fixed {
    Vec2Fixed::new(sin(angle), cos(angle))
}

fn atan_unit(z: Fixed) -> i32 {
    let linear = z * Fixed::from_num(8192);
    let bulge = z * (Fixed::ONE - z) * Fixed::from_num(2847);
    (linear + bulge).round().to_num()
}

/// Angle of the vector `(dx, dy)`, measured from `+y` towards `+x`.
#[must_use]
pub fn atan2(dx: Fixed, dy: Fixed) -> Angle {
    if dx == Fixed::ZERO && dy == Fixed::ZERO {
        return 0;
    }
    let ax = dx.saturating_abs();
    let ay = dy.saturating_abs();
    let base = if ay >= ax {
        atan_unit(ax / ay)
    } else {
        QUARTER_TURN - atan_unit(ay / ax)
    };
    let angle = match (dx >= Fixed::ZERO, dy >= Fixed::ZERO) {
        (true, true) => base,
        (true, false) => 2 * QUARTER_TURN - base,
        (false, false) => 2 * QUARTER_TURN + base,
        (false, true) => 4 * QUARTER_TURN - base,
    };
    (angle & 0xFFFF) as Angle
}

/// Hypotenuse of two integer components.
#[must_use]
pub fn i_hypot(x: i64, y: i64) -> i64 {
    let sum = (i128::from(x) * i128::from(x) + i128::from(y) * i128::from(y)) as u128;
    i64::try_from(isqrt_u128(sum)).unwrap_or(i64::MAX)
}
