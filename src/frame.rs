//! Coordinate Frame Module
//!
//! Vectors, Euler angles and rotation matrices in the engine's convention,
//! plus the `Frame` (position + orientation) an instance is placed with.
//!
//! Rotation uses row vectors: `v' = v · M`, so applying `A` then `B` is `A · B`.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Values closer together than this are treated as equal when printing.
const PRINT_PRECISION: f64 = 1e6;

/// Format a float the way map files expect: at most six decimals, no trailing
/// zeros, and never `-0`.
pub fn format_float(value: f64) -> String {
    let rounded = (value * PRINT_PRECISION).round() / PRINT_PRECISION;
    if rounded == 0.0 || !rounded.is_finite() {
        return "0".to_string();
    }
    let mut text = format!("{:.6}", rounded);
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    text
}

/// Lenient float parse. Garbage reads as `0`, matching how the engine treats keyvalues.
pub fn parse_float(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(0.0)
}

/// Split `"(1 2 3)"`, `"[1 2 3]"`, `"1 2 3"` or `"1, 2, 3"` into three floats.
fn parse_triple(text: &str) -> [f64; 3] {
    let trimmed = text
        .trim()
        .trim_start_matches(['(', '[', '{', '<'])
        .trim_end_matches([')', ']', '}', '>']);
    let mut out = [0.0; 3];
    for (slot, part) in out.iter_mut().zip(
        trimmed
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|p| !p.is_empty()),
    ) {
        *slot = parse_float(part);
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// VECTOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn parse(text: &str) -> Self {
        let [x, y, z] = parse_triple(text);
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Rotate this vector by `matrix` (no translation).
    pub fn rotated(&self, matrix: &Matrix) -> Vec3 {
        let m = &matrix.0;
        Vec3 {
            x: self.x * m[0][0] + self.y * m[1][0] + self.z * m[2][0],
            y: self.x * m[0][1] + self.y * m[1][1] + self.z * m[2][1],
            z: self.x * m[0][2] + self.y * m[1][2] + self.z * m[2][2],
        }
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            format_float(self.x),
            format_float(self.y),
            format_float(self.z)
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANGLE
// ═══════════════════════════════════════════════════════════════════════════════

fn normalize_degrees(value: f64) -> f64 {
    let wrapped = value.rem_euclid(360.0);
    let rounded = (wrapped * PRINT_PRECISION).round() / PRINT_PRECISION;
    if rounded >= 360.0 || rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Pitch, yaw, roll in degrees, kept in `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Angle {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Angle {
    pub fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self {
            pitch: normalize_degrees(pitch),
            yaw: normalize_degrees(yaw),
            roll: normalize_degrees(roll),
        }
    }

    pub fn parse(text: &str) -> Self {
        let [pitch, yaw, roll] = parse_triple(text);
        Self::new(pitch, yaw, roll)
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.pitch = normalize_degrees(pitch);
    }

    pub fn set_yaw(&mut self, yaw: f64) {
        self.yaw = normalize_degrees(yaw);
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            format_float(self.pitch),
            format_float(self.yaw),
            format_float(self.roll)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MATRIX
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix(pub [[f64; 3]; 3]);

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    pub fn from_angle(angle: &Angle) -> Self {
        let (sin_p, cos_p) = angle.pitch.to_radians().sin_cos();
        let (sin_y, cos_y) = angle.yaw.to_radians().sin_cos();
        let (sin_r, cos_r) = angle.roll.to_radians().sin_cos();
        Matrix([
            [cos_p * cos_y, cos_p * sin_y, -sin_p],
            [
                sin_p * sin_r * cos_y - cos_r * sin_y,
                sin_p * sin_r * sin_y + cos_r * cos_y,
                sin_r * cos_p,
            ],
            [
                sin_p * cos_r * cos_y + sin_r * sin_y,
                sin_p * cos_r * sin_y - sin_r * cos_y,
                cos_r * cos_p,
            ],
        ])
    }

    /// Recover Euler angles. Gimbal-locked matrices put all yaw into `yaw` and zero `roll`.
    pub fn to_angle(&self) -> Angle {
        let m = &self.0;
        let (for_x, for_y, for_z) = (m[0][0], m[0][1], m[0][2]);
        let (left_x, left_y, left_z) = (m[1][0], m[1][1], m[1][2]);
        let up_z = m[2][2];

        let horiz_dist = (for_x * for_x + for_y * for_y).sqrt();
        let pitch = (-for_z).atan2(horiz_dist).to_degrees();
        if horiz_dist > 0.001 {
            Angle::new(
                pitch,
                for_y.atan2(for_x).to_degrees(),
                left_z.atan2(up_z).to_degrees(),
            )
        } else {
            Angle::new(pitch, (-left_x).atan2(left_y).to_degrees(), 0.0)
        }
    }

    /// `self · other`: apply `self` first, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        let (a, b) = (&self.0, &other.0);
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }
        Matrix(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAME
// ═══════════════════════════════════════════════════════════════════════════════

/// Placement of an instance: where its local origin lands and how it is rotated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frame {
    pub position: Vec3,
    pub orient: Matrix,
}

impl Frame {
    pub fn new(position: Vec3, angles: Angle) -> Self {
        Self {
            position,
            orient: Matrix::from_angle(&angles),
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Place `inner` inside `outer`'s space.
    pub fn compose(outer: &Frame, inner: &Frame) -> Frame {
        Frame {
            position: inner.position.rotated(&outer.orient) + outer.position,
            orient: inner.orient.then(&outer.orient),
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        point.rotated(&self.orient) + self.position
    }

    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        direction.rotated(&self.orient)
    }

    pub fn compose_angle(&self, angle: &Angle) -> Angle {
        Matrix::from_angle(angle).then(&self.orient).to_angle()
    }
}
