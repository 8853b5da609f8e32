//! Geometric metadata for volumes: spacing, orientation, and affine.
//!
//! Every volume travels with a [`Geometry`] describing how its voxel grid
//! maps to physical space: the voxel spacing along each spatial axis, the
//! anatomical orientation code of each axis (e.g. RAS), and a 4x4 affine
//! mapping voxel indices to world coordinates. Operations that change the
//! grid (crop, reorientation, resampling) must update the geometry
//! consistently.

use crate::core::errors::SegError;
use serde::{Deserialize, Serialize};

/// Anatomical direction of increasing index along a volume axis.
///
/// The letter names the direction an axis points towards, following the
/// usual neuroimaging convention: R/L on the first world axis, A/P on the
/// second, S/I on the third. "RAS" therefore means axis 0 points Right,
/// axis 1 Anterior, axis 2 Superior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisCode {
    /// Towards the patient's right (+ first world axis).
    Right,
    /// Towards the patient's left (- first world axis).
    Left,
    /// Towards the front (+ second world axis).
    Anterior,
    /// Towards the back (- second world axis).
    Posterior,
    /// Towards the head (+ third world axis).
    Superior,
    /// Towards the feet (- third world axis).
    Inferior,
}

impl AxisCode {
    /// Parses a single axis code letter.
    pub fn from_char(c: char) -> Result<Self, SegError> {
        match c.to_ascii_uppercase() {
            'R' => Ok(AxisCode::Right),
            'L' => Ok(AxisCode::Left),
            'A' => Ok(AxisCode::Anterior),
            'P' => Ok(AxisCode::Posterior),
            'S' => Ok(AxisCode::Superior),
            'I' => Ok(AxisCode::Inferior),
            _ => Err(SegError::config(format!(
                "unknown orientation axis code '{c}', expected one of R, L, A, P, S, I"
            ))),
        }
    }

    /// Returns the letter for this axis code.
    pub fn to_char(self) -> char {
        match self {
            AxisCode::Right => 'R',
            AxisCode::Left => 'L',
            AxisCode::Anterior => 'A',
            AxisCode::Posterior => 'P',
            AxisCode::Superior => 'S',
            AxisCode::Inferior => 'I',
        }
    }

    /// Index of the world axis this code lives on (R/L -> 0, A/P -> 1, S/I -> 2).
    pub fn world_axis(self) -> usize {
        match self {
            AxisCode::Right | AxisCode::Left => 0,
            AxisCode::Anterior | AxisCode::Posterior => 1,
            AxisCode::Superior | AxisCode::Inferior => 2,
        }
    }

    /// Whether this code points along the positive world direction.
    pub fn is_positive(self) -> bool {
        matches!(
            self,
            AxisCode::Right | AxisCode::Anterior | AxisCode::Superior
        )
    }

    /// The code pointing the opposite way on the same world axis.
    pub fn opposite(self) -> Self {
        match self {
            AxisCode::Right => AxisCode::Left,
            AxisCode::Left => AxisCode::Right,
            AxisCode::Anterior => AxisCode::Posterior,
            AxisCode::Posterior => AxisCode::Anterior,
            AxisCode::Superior => AxisCode::Inferior,
            AxisCode::Inferior => AxisCode::Superior,
        }
    }
}

/// Parses a three-letter orientation string such as "RAS" or "LPS".
///
/// The three codes must cover all three world axes exactly once.
pub fn parse_axcodes(s: &str) -> Result<[AxisCode; 3], SegError> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() != 3 {
        return Err(SegError::config(format!(
            "orientation string must have exactly 3 letters, got '{s}'"
        )));
    }
    let codes = [
        AxisCode::from_char(chars[0])?,
        AxisCode::from_char(chars[1])?,
        AxisCode::from_char(chars[2])?,
    ];
    let mut seen = [false; 3];
    for code in codes {
        let axis = code.world_axis();
        if seen[axis] {
            return Err(SegError::config(format!(
                "orientation '{s}' names world axis {axis} more than once"
            )));
        }
        seen[axis] = true;
    }
    Ok(codes)
}

/// Formats axis codes back into a three-letter string.
pub fn axcodes_to_string(codes: [AxisCode; 3]) -> String {
    codes.iter().map(|c| c.to_char()).collect()
}

/// A 4x4 affine transform mapping voxel indices to world coordinates.
///
/// Row-major `[[f64; 4]; 4]`; the last row is `[0, 0, 0, 1]`. Column `j`
/// (of the upper 3x3 plus translation) is the world-space step taken when
/// incrementing the volume's spatial axis `j` by one voxel, so its norm is
/// the spacing along that axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affine(pub [[f64; 4]; 4]);

impl Affine {
    /// The identity affine.
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Affine(m)
    }

    /// A diagonal affine scaling voxel indices by the given spacing.
    pub fn from_spacing(spacing: [f64; 3]) -> Self {
        let mut affine = Self::identity();
        for (j, s) in spacing.iter().enumerate() {
            affine.0[j][j] = *s;
        }
        affine
    }

    /// Returns the world-space direction column for spatial axis `j`.
    pub fn column(&self, j: usize) -> [f64; 3] {
        [self.0[0][j], self.0[1][j], self.0[2][j]]
    }

    /// Replaces the direction column for spatial axis `j`.
    pub fn set_column(&mut self, j: usize, col: [f64; 3]) {
        for (i, v) in col.iter().enumerate() {
            self.0[i][j] = *v;
        }
    }

    /// Returns the world-space origin (translation part).
    pub fn origin(&self) -> [f64; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }

    /// Replaces the world-space origin.
    pub fn set_origin(&mut self, origin: [f64; 3]) {
        for (i, v) in origin.iter().enumerate() {
            self.0[i][3] = *v;
        }
    }

    /// Maps a voxel index to world coordinates.
    pub fn apply(&self, idx: [f64; 3]) -> [f64; 3] {
        let mut out = self.origin();
        for (j, x) in idx.iter().enumerate() {
            let col = self.column(j);
            for (i, o) in out.iter_mut().enumerate() {
                *o += col[i] * x;
            }
        }
        out
    }
}

/// Derives axis codes from direction columns by their dominant world component.
///
/// `dirs[j]` is the (not necessarily unit) world direction of spatial axis `j`.
pub fn axcodes_from_directions(dirs: &[[f64; 3]; 3]) -> [AxisCode; 3] {
    let positive = [AxisCode::Right, AxisCode::Anterior, AxisCode::Superior];
    let mut codes = [AxisCode::Right; 3];
    for (j, dir) in dirs.iter().enumerate() {
        let mut dominant = 0;
        for i in 1..3 {
            if dir[i].abs() > dir[dominant].abs() {
                dominant = i;
            }
        }
        let code = positive[dominant];
        codes[j] = if dir[dominant] >= 0.0 {
            code
        } else {
            code.opposite()
        };
    }
    codes
}

/// Geometric metadata accompanying a volume through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Voxel spacing along each spatial axis, in world units. Always positive.
    pub spacing: [f64; 3],
    /// Anatomical orientation code of each spatial axis.
    pub axcodes: [AxisCode; 3],
    /// Voxel-index-to-world affine. Kept consistent with `spacing` and
    /// `axcodes` by every geometry-affecting transform.
    pub affine: Affine,
}

impl Geometry {
    /// Creates a new Geometry, validating the spacing.
    ///
    /// # Errors
    ///
    /// Returns a geometry error if any spacing component is not a positive
    /// finite number.
    pub fn new(spacing: [f64; 3], axcodes: [AxisCode; 3], affine: Affine) -> Result<Self, SegError> {
        for (axis, s) in spacing.iter().enumerate() {
            if !s.is_finite() || *s <= 0.0 {
                return Err(SegError::geometry(format!(
                    "spacing along axis {axis} must be positive and finite, got {s}"
                )));
            }
        }
        Ok(Self {
            spacing,
            axcodes,
            affine,
        })
    }

    /// Creates an RAS-oriented geometry with the given spacing and a
    /// diagonal affine. Convenient for synthetic volumes.
    pub fn ras(spacing: [f64; 3]) -> Result<Self, SegError> {
        Self::new(
            spacing,
            [AxisCode::Right, AxisCode::Anterior, AxisCode::Superior],
            Affine::from_spacing(spacing),
        )
    }

    /// Computes the axis permutation and flips taking this geometry's
    /// orientation to `target`.
    ///
    /// Returns `(perm, flip)` such that output axis `j` reads from input
    /// axis `perm[j]`, reversed when `flip[j]` is set. The composition is
    /// exactly invertible; see [`crate::processors::orientation`].
    pub fn reorientation_to(
        &self,
        target: [AxisCode; 3],
    ) -> Result<([usize; 3], [bool; 3]), SegError> {
        let mut perm = [0usize; 3];
        let mut flip = [false; 3];
        for (j, want) in target.iter().enumerate() {
            let found = self
                .axcodes
                .iter()
                .position(|have| have.world_axis() == want.world_axis())
                .ok_or_else(|| {
                    SegError::geometry(format!(
                        "volume orientation {} does not cover world axis {}",
                        axcodes_to_string(self.axcodes),
                        want.world_axis()
                    ))
                })?;
            perm[j] = found;
            flip[j] = self.axcodes[found] != *want;
        }
        Ok((perm, flip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_axcodes() {
        let codes = parse_axcodes("RAS").unwrap();
        assert_eq!(
            codes,
            [AxisCode::Right, AxisCode::Anterior, AxisCode::Superior]
        );
        assert_eq!(axcodes_to_string(codes), "RAS");

        assert!(parse_axcodes("RAR").is_err());
        assert!(parse_axcodes("RA").is_err());
        assert!(parse_axcodes("XYZ").is_err());
    }

    #[test]
    fn test_geometry_rejects_bad_spacing() {
        let codes = parse_axcodes("RAS").unwrap();
        assert!(Geometry::new([1.0, 0.0, 1.0], codes, Affine::identity()).is_err());
        assert!(Geometry::new([1.0, -2.0, 1.0], codes, Affine::identity()).is_err());
        assert!(Geometry::new([1.0, f64::NAN, 1.0], codes, Affine::identity()).is_err());
    }

    #[test]
    fn test_reorientation_identity() {
        let geom = Geometry::ras([1.0, 1.0, 1.0]).unwrap();
        let (perm, flip) = geom.reorientation_to(parse_axcodes("RAS").unwrap()).unwrap();
        assert_eq!(perm, [0, 1, 2]);
        assert_eq!(flip, [false, false, false]);
    }

    #[test]
    fn test_reorientation_permutes_and_flips() {
        // LPS volume to RAS: same axis order, first two flipped.
        let geom = Geometry::new(
            [1.0, 1.0, 1.0],
            parse_axcodes("LPS").unwrap(),
            Affine::identity(),
        )
        .unwrap();
        let (perm, flip) = geom.reorientation_to(parse_axcodes("RAS").unwrap()).unwrap();
        assert_eq!(perm, [0, 1, 2]);
        assert_eq!(flip, [true, true, false]);

        // SRA volume to RAS: pure permutation.
        let geom = Geometry::new(
            [1.0, 1.0, 1.0],
            parse_axcodes("SRA").unwrap(),
            Affine::identity(),
        )
        .unwrap();
        let (perm, flip) = geom.reorientation_to(parse_axcodes("RAS").unwrap()).unwrap();
        assert_eq!(perm, [1, 2, 0]);
        assert_eq!(flip, [false, false, false]);
    }

    #[test]
    fn test_affine_apply() {
        let mut affine = Affine::from_spacing([2.0, 3.0, 4.0]);
        affine.set_origin([10.0, 20.0, 30.0]);
        assert_eq!(affine.apply([1.0, 1.0, 1.0]), [12.0, 23.0, 34.0]);
    }

    #[test]
    fn test_axcodes_from_directions() {
        let codes = axcodes_from_directions(&[[0.0, 0.0, 2.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(axcodes_to_string(codes), "SLA");
    }
}
