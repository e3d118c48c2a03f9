use crate::control_point::ControlPoint;
use crate::error::{RegistrationError, Result};
use nalgebra::{Matrix3, SMatrix, SVector};
use serde::{Deserialize, Serialize};

/// Number of point correspondences a homography is solved from.
pub const CORRESPONDENCE_COUNT: usize = 4;

/// Smallest accepted ratio between the smallest and largest LU pivot.
const PIVOT_RATIO_TOLERANCE: f64 = 1e-12;

/// Sine of the angle below which three points count as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// Relative tolerance of the post-solve reprojection check.
const SELF_CHECK_TOLERANCE: f64 = 1e-9;

/// A planar projective transform given by eight coefficients `h0..h7`; the
/// ninth matrix entry is fixed to 1:
///
/// ```text
///   | h0 h1 h2 |
///   | h3 h4 h5 |
///   | h6 h7 1  |
/// ```
///
/// A point `(x, y)` maps to `(X, Y)` by:
///
/// ```text
///   k = x * h6 + y * h7 + 1
///   X = (x * h0 + y * h1 + h2) / k
///   Y = (x * h3 + y * h4 + h5) / k
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub coefficients: [f64; 8],
}

impl Default for Homography {
    fn default() -> Self {
        Homography::identity()
    }
}

impl Homography {
    /// The transform that maps every point onto itself.
    pub fn identity() -> Self {
        Homography {
            coefficients: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        }
    }

    /// The full 3×3 matrix, row-major.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        let h = &self.coefficients;
        [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], 1.0]]
    }

    fn to_nalgebra(self) -> Matrix3<f64> {
        let h = &self.coefficients;
        Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0)
    }

    /// Rescales `m` so its bottom-right entry is 1.
    ///
    /// # Returns
    /// `None` when that entry is (numerically) zero or the matrix holds
    /// non-finite values.
    fn from_nalgebra(m: &Matrix3<f64>) -> Option<Self> {
        let w = m[(2, 2)];
        if !w.is_finite() || w.abs() < f64::EPSILON {
            return None;
        }
        let h = Homography {
            coefficients: [
                m[(0, 0)] / w,
                m[(0, 1)] / w,
                m[(0, 2)] / w,
                m[(1, 0)] / w,
                m[(1, 1)] / w,
                m[(1, 2)] / w,
                m[(2, 0)] / w,
                m[(2, 1)] / w,
            ],
        };
        h.coefficients.iter().all(|c| c.is_finite()).then_some(h)
    }

    /// Maps `(x, y)` through the transform.
    ///
    /// # Returns
    /// `None` when the point lands on the line at infinity (`k == 0`).
    ///
    /// # Examples
    /// ```
    /// # use rephoto::homography::Homography;
    /// let h = Homography { coefficients: [1.0, 0.0, 10.0, 0.0, 1.0, -5.0, 0.0, 0.0] };
    /// assert_eq!(h.project(2.0, 3.0), Some((12.0, -2.0)));
    /// ```
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let h = &self.coefficients;
        let k = x * h[6] + y * h[7] + 1.0;
        if k.abs() < f64::EPSILON {
            return None;
        }
        Some(((x * h[0] + y * h[1] + h[2]) / k, (x * h[3] + y * h[4] + h[5]) / k))
    }

    /// The transform mapping back from the target plane to the source plane.
    pub fn inverse(&self) -> Option<Self> {
        let inv = self.to_nalgebra().try_inverse()?;
        Homography::from_nalgebra(&inv)
    }

    /// Returns `true` when every coefficient is within `tolerance` of identity.
    pub fn is_near_identity(&self, tolerance: f64) -> bool {
        self.coefficients
            .iter()
            .zip(Homography::identity().coefficients.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Largest distance between `H(from[i])` and `to[i]`.
    pub fn max_reprojection_error(&self, from: &[[f64; 2]], to: &[[f64; 2]]) -> f64 {
        from.iter()
            .zip(to.iter())
            .map(|(f, t)| match self.project(f[0], f[1]) {
                Some((x, y)) => ((x - t[0]).powi(2) + (y - t[1]).powi(2)).sqrt(),
                None => f64::INFINITY,
            })
            .fold(0.0, f64::max)
    }
}

/// Converts integer control points into solver input.
///
/// # Returns
/// `None` unless exactly [`CORRESPONDENCE_COUNT`] points are given.
pub fn control_points_to_quad(points: &[ControlPoint]) -> Option<[[f64; 2]; CORRESPONDENCE_COUNT]> {
    if points.len() != CORRESPONDENCE_COUNT {
        return None;
    }
    let mut quad = [[0.0; 2]; CORRESPONDENCE_COUNT];
    for (slot, p) in quad.iter_mut().zip(points) {
        *slot = [p.x as f64, p.y as f64];
    }
    Some(quad)
}

/// Returns `true` if any three of `points` lie on one line (coincident
/// points included).
pub fn has_collinear_triple(points: &[[f64; 2]]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                if are_collinear(points[i], points[j], points[k]) {
                    return true;
                }
            }
        }
    }
    false
}

fn are_collinear(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> bool {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ac = [c[0] - a[0], c[1] - a[1]];
    let len_ab = (ab[0] * ab[0] + ab[1] * ab[1]).sqrt();
    let len_ac = (ac[0] * ac[0] + ac[1] * ac[1]).sqrt();
    if len_ab == 0.0 || len_ac == 0.0 {
        return true;
    }
    let cross = ab[0] * ac[1] - ab[1] * ac[0];
    cross.abs() <= COLLINEAR_TOLERANCE * len_ab * len_ac
}

/// Similarity transform moving the centroid of `points` to the origin and
/// scaling their mean distance from it to `sqrt(2)`.
fn normalization(points: &[[f64; 2]; CORRESPONDENCE_COUNT]) -> Matrix3<f64> {
    let n = CORRESPONDENCE_COUNT as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn apply(m: &Matrix3<f64>, p: [f64; 2]) -> [f64; 2] {
    [
        m[(0, 0)] * p[0] + m[(0, 1)] * p[1] + m[(0, 2)],
        m[(1, 0)] * p[0] + m[(1, 1)] * p[1] + m[(1, 2)],
    ]
}

/// Solves for the homography mapping each `from[i]` onto `to[i]`.
///
/// Each correspondence contributes two rows of an 8×8 system `A·h = b`:
///
/// ```text
///   [x, y, 1, 0, 0, 0, -x*x', -y*x'] = x'
///   [0, 0, 0, x, y, 1, -x*y', -y*y'] = y'
/// ```
///
/// which is solved by LU decomposition. Both point sets are first moved to a
/// centred, unit-scale frame so the system stays well conditioned for pixel
/// coordinates; the result is mapped back before returning.
///
/// # Errors
/// [`RegistrationError::SingularSystem`] when three points of either set are
/// collinear or coincident, or the system cannot be inverted.
///
/// # Examples
/// ```
/// # use rephoto::homography::solve;
/// let from = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]];
/// let to = [[10.0, 20.0], [110.0, 20.0], [110.0, 120.0], [10.0, 120.0]];
/// let h = solve(&from, &to).unwrap();
/// let (x, y) = h.project(50.0, 50.0).unwrap();
/// assert!((x - 60.0).abs() < 1e-9 && (y - 70.0).abs() < 1e-9);
///
/// let line = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
/// assert!(solve(&line, &to).is_err());
/// ```
pub fn solve(
    from: &[[f64; 2]; CORRESPONDENCE_COUNT],
    to: &[[f64; 2]; CORRESPONDENCE_COUNT],
) -> Result<Homography> {
    let finite = from.iter().chain(to.iter()).all(|p| p[0].is_finite() && p[1].is_finite());
    if !finite || has_collinear_triple(from) || has_collinear_triple(to) {
        return Err(RegistrationError::SingularSystem);
    }

    let t_from = normalization(from);
    let t_to = normalization(to);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..CORRESPONDENCE_COUNT {
        let [x, y] = apply(&t_from, from[i]);
        let [xp, yp] = apply(&t_to, to[i]);

        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -x * xp;
        a[(r, 7)] = -y * xp;
        b[r] = xp;

        let r = 2 * i + 1;
        a[(r, 3)] = x;
        a[(r, 4)] = y;
        a[(r, 5)] = 1.0;
        a[(r, 6)] = -x * yp;
        a[(r, 7)] = -y * yp;
        b[r] = yp;
    }

    let lu = a.lu();
    let u = lu.u();
    let pivots: Vec<f64> = (0..8).map(|i| u[(i, i)].abs()).collect();
    let max_pivot = pivots.iter().cloned().fold(0.0, f64::max);
    let min_pivot = pivots.iter().cloned().fold(f64::INFINITY, f64::min);
    if !(max_pivot > 0.0) || min_pivot / max_pivot < PIVOT_RATIO_TOLERANCE {
        return Err(RegistrationError::SingularSystem);
    }
    let h = lu.solve(&b).ok_or(RegistrationError::SingularSystem)?;

    let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    let t_to_inv = t_to.try_inverse().ok_or(RegistrationError::SingularSystem)?;
    let denormalized = t_to_inv * normalized * t_from;
    let homography = Homography::from_nalgebra(&denormalized).ok_or(RegistrationError::SingularSystem)?;

    debug_assert!(
        {
            let scale = to
                .iter()
                .flat_map(|p| p.iter())
                .fold(1.0f64, |acc, v| acc.max(v.abs()));
            homography.max_reprojection_error(from, to) <= SELF_CHECK_TOLERANCE * scale
        },
        "homography does not reproduce its correspondences"
    );

    Ok(homography)
}

/// [`solve`] for two control point lists of exactly four points each.
pub fn solve_control_points(from: &[ControlPoint], to: &[ControlPoint]) -> Result<Homography> {
    let required = CORRESPONDENCE_COUNT;
    match (control_points_to_quad(from), control_points_to_quad(to)) {
        (Some(f), Some(t)) => solve(&f, &t),
        _ => Err(RegistrationError::InsufficientPoints {
            required,
            reference: from.len(),
            target: to.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const FROM: [[f64; 2]; 4] = [[100.0, 100.0], [700.0, 100.0], [700.0, 500.0], [100.0, 500.0]];
    const TO: [[f64; 2]; 4] = [[120.0, 110.0], [690.0, 105.0], [695.0, 510.0], [110.0, 505.0]];

    fn assert_reprojects(h: &Homography, from: &[[f64; 2]; 4], to: &[[f64; 2]; 4]) {
        for (f, t) in from.iter().zip(to.iter()) {
            let (x, y) = h.project(f[0], f[1]).unwrap();
            assert!((x - t[0]).abs() <= 1e-6 * t[0].abs().max(1.0), "x {x} vs {}", t[0]);
            assert!((y - t[1]).abs() <= 1e-6 * t[1].abs().max(1.0), "y {y} vs {}", t[1]);
        }
    }

    #[test]
    fn identical_points_give_identity() {
        let h = solve(&FROM, &FROM).unwrap();
        assert!(h.is_near_identity(1e-9), "{:?}", h);
    }

    #[test]
    fn translation_is_recovered() {
        let to = FROM.map(|p| [p[0] + 10.0, p[1] - 20.0]);
        let h = solve(&FROM, &to).unwrap();
        let c = h.coefficients;
        assert!((c[2] - 10.0).abs() < 1e-9);
        assert!((c[5] + 20.0).abs() < 1e-9);
        assert!(c[6].abs() < 1e-12 && c[7].abs() < 1e-12);
    }

    #[test]
    fn perspective_quad_reprojects() {
        let h = solve(&FROM, &TO).unwrap();
        assert_reprojects(&h, &FROM, &TO);
    }

    #[test]
    fn random_quads_reproject() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let jitter = |rng: &mut StdRng, p: [f64; 2]| {
                [p[0] + rng.gen_range(-80.0..80.0), p[1] + rng.gen_range(-80.0..80.0)]
            };
            let from = FROM.map(|p| jitter(&mut rng, p));
            let to = FROM.map(|p| jitter(&mut rng, p));
            let h = solve(&from, &to).unwrap();
            assert_reprojects(&h, &from, &to);
        }
    }

    #[test]
    fn collinear_points_are_singular() {
        let line = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        assert_eq!(solve(&line, &TO), Err(RegistrationError::SingularSystem));

        let horizontal = [[0.0, 100.0], [100.0, 100.0], [200.0, 100.0], [300.0, 100.0]];
        assert_eq!(solve(&FROM, &horizontal), Err(RegistrationError::SingularSystem));
    }

    #[test]
    fn three_collinear_points_are_singular() {
        let from = [[0.0, 0.0], [50.0, 0.0], [100.0, 0.0], [0.0, 100.0]];
        assert_eq!(solve(&from, &TO), Err(RegistrationError::SingularSystem));
    }

    #[test]
    fn coincident_points_are_singular() {
        let from = [[10.0, 10.0], [10.0, 10.0], [100.0, 0.0], [0.0, 100.0]];
        assert_eq!(solve(&from, &TO), Err(RegistrationError::SingularSystem));
    }

    #[test]
    fn non_finite_input_is_singular() {
        let mut from = FROM;
        from[2][0] = f64::NAN;
        assert_eq!(solve(&from, &TO), Err(RegistrationError::SingularSystem));
    }

    #[test]
    fn inverse_maps_back() {
        let h = solve(&FROM, &TO).unwrap();
        let inv = h.inverse().unwrap();
        assert_reprojects(&inv, &TO, &FROM);
    }

    #[test]
    fn control_point_solve_requires_four_points() {
        let three = [ControlPoint::new(0, 0), ControlPoint::new(1, 0), ControlPoint::new(0, 1)];
        let four = [
            ControlPoint::new(0, 0),
            ControlPoint::new(10, 0),
            ControlPoint::new(10, 10),
            ControlPoint::new(0, 10),
        ];
        assert_eq!(
            solve_control_points(&three, &four),
            Err(RegistrationError::InsufficientPoints {
                required: 4,
                reference: 3,
                target: 4
            })
        );
        assert!(solve_control_points(&four, &four).unwrap().is_near_identity(1e-9));
    }
}
