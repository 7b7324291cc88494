//! Plane-to-plane homography estimation via DLT with Hartley normalization.
//!
//! Provides:
//! - Direct Linear Transform (DLT) from >=4 point correspondences.
//! - Point projection and reprojection error.
//! - A conditioning check used to reject near-singular mappings.

use nalgebra::{DMatrix, Matrix3, Vector3};

/// Below this magnitude a homogeneous `w` is treated as a point at infinity.
const W_EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HomographyError {
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("numerical failure: {0}")]
    NumericalFailure(&'static str),
}

// ── Projection ───────────────────────────────────────────────────────────

/// Project a 2D point through a 3x3 homography: H * [x, y, 1]^T -> [u, v].
///
/// Returns `None` when the point maps to (or numerically near) infinity.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Option<[f64; 2]> {
    let p = h * Vector3::new(x, y, 1.0);
    if !p[2].is_finite() || p[2].abs() < W_EPS {
        return None;
    }
    let out = [p[0] / p[2], p[1] / p[2]];
    (out[0].is_finite() && out[1].is_finite()).then_some(out)
}

/// Homogeneous `w` of a projected point, used to detect sign flips across
/// the line at infinity.
pub fn projective_depth(h: &Matrix3<f64>, x: f64, y: f64) -> f64 {
    (h * Vector3::new(x, y, 1.0))[2]
}

/// Reprojection error: ||project(H, src) - dst||, infinite when unprojectable.
pub fn reprojection_error(h: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    match project(h, src[0], src[1]) {
        Some(p) => ((p[0] - dst[0]).powi(2) + (p[1] - dst[1]).powi(2)).sqrt(),
        None => f64::INFINITY,
    }
}

// ── Hartley normalization ────────────────────────────────────────────────

/// Compute a normalizing transform: translate centroid to origin, scale so
/// mean distance from origin is sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx: f64 = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy: f64 = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist: f64 = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();

    (t, normalized)
}

// ── DLT ──────────────────────────────────────────────────────────────────

/// Estimate the homography H such that `dst ≈ project(H, src)` from >=4
/// correspondences.
///
/// The solution is the eigenvector of the smallest eigenvalue of `AᵀA`
/// built from Hartley-normalized points, then denormalized and scaled so
/// that `H[2][2] = 1` when possible.
pub fn estimate_homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<Matrix3<f64>, HomographyError> {
    let n = src.len();
    if n < 4 || dst.len() < 4 {
        return Err(HomographyError::TooFewPoints {
            needed: 4,
            got: n.min(dst.len()),
        });
    }
    if src.len() != dst.len() {
        return Err(HomographyError::NumericalFailure(
            "src and dst must have the same length",
        ));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    // 2n x 9 design matrix
    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i][0], src_n[i][1]);
        let (dx, dy) = (dst_n[i][0], dst_n[i][1]);

        // Row 2i:   [  0  0  0 | -sx -sy -1 | dy*sx  dy*sy  dy ]
        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        // Row 2i+1: [ sx  sy  1 |  0  0  0 | -dx*sx -dx*sy -dx ]
        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);

    let mut min_idx = 0;
    let mut min_val = eig.eigenvalues[0].abs();
    for i in 1..9 {
        let v = eig.eigenvalues[i].abs();
        if v < min_val {
            min_val = v;
            min_idx = i;
        }
    }
    let col = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(
        col[0], col[1], col[2], //
        col[3], col[4], col[5], //
        col[6], col[7], col[8],
    );

    // H = T_dst^-1 * H_norm * T_src
    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or(HomographyError::NumericalFailure("T_dst not invertible"))?;
    let h = t_dst_inv * h_norm * t_src;

    if h.iter().any(|v| !v.is_finite()) {
        return Err(HomographyError::NumericalFailure("non-finite homography"));
    }

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Ok(h)
    } else {
        Ok(h / scale)
    }
}

/// Ratio of smallest to largest singular value of H normalized to unit
/// Frobenius norm. Near zero means the mapping collapses the plane.
pub fn conditioning(h: &Matrix3<f64>) -> f64 {
    let norm = h.norm();
    if !norm.is_finite() || norm < 1e-300 {
        return 0.0;
    }
    let sv = (h / norm).singular_values();
    let max = sv.max();
    if max <= 0.0 {
        return 0.0;
    }
    sv.min() / max
}

// ── Tests ────────────────────────────────────────────────────────────────
