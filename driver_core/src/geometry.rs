//! Per-view layout for a single panel split down the middle.

use thiserror::Error;

use crate::config::DisplayParams;
use crate::host_interfaces::*;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("invalid extents: {0} m and {1} m on either side of the lens centre")]
    Extents(f64, f64),
    #[error("invalid field of view: {0} rad")]
    Fov(f64),
}

/// Angles subtended by two segments of lengths `w_1` and `w_2` that meet at a right angle with
/// a common line of sight, given the total angle. Returns `(theta_1, theta_2, distance)`.
fn solve_triangle(w_1: f64, w_2: f64, total: f64) -> Result<(f64, f64, f64), GeometryError> {
    if !(w_1.is_finite() && w_2.is_finite()) || w_1 < 0.0 || w_2 < 0.0 || w_1 + w_2 <= 0.0 {
        return Err(GeometryError::Extents(w_1, w_2));
    }
    if !total.is_finite() || total <= 0.0 || total >= std::f64::consts::PI {
        return Err(GeometryError::Fov(total));
    }

    // tan(theta_1 + theta_2) = tan(total), with tan(theta_i) = w_i / d.
    let (sin, cos) = total.sin_cos();
    let sum = w_1 + w_2;
    let d = (sum * cos + (sum * sum * cos * cos + 4.0 * sin * sin * w_1 * w_2).sqrt()) / (2.0 * sin);

    Ok(((w_1 / d).atan(), (w_2 / d).atan(), d))
}

/// Field of view of one eye. `w_1` and `h_1` are the distances from the left and bottom edges
/// of the eye's half of the panel to the lens centre.
pub fn compute_fovs(
    w_total: f64,
    w_1: f64,
    horiz_fov_total: f64,
    h_total: f64,
    h_1: f64,
    vert_fov_total: f64,
) -> Result<XrtFov, GeometryError> {
    let (theta_1, theta_2, d) = solve_triangle(w_1, w_total - w_1, horiz_fov_total)?;

    let (phi_1, phi_2) = if vert_fov_total == 0.0 {
        // Same viewing distance as the horizontal solve.
        let h_2 = h_total - h_1;
        if !(h_1 >= 0.0 && h_2 >= 0.0) {
            return Err(GeometryError::Extents(h_1, h_2));
        }
        ((h_1 / d).atan(), (h_2 / d).atan())
    } else {
        let (phi_1, phi_2, _) = solve_triangle(h_1, h_total - h_1, vert_fov_total)?;
        (phi_1, phi_2)
    };

    Ok(XrtFov {
        angle_left: -theta_1 as f32,
        angle_right: theta_2 as f32,
        angle_up: phi_2 as f32,
        angle_down: -phi_1 as f32,
    })
}

/// Splits the panel side by side: left eye on the left half, right eye on the right half.
pub fn setup_split_side_by_side(display: &DisplayParams) -> Result<XrtHmdParts, GeometryError> {
    let w_pixels = display.width_pixels / 2;
    let h_pixels = display.height_pixels;
    let w_meters = f64::from(display.width_meters) / 2.0;
    let h_meters = f64::from(display.height_meters);
    let separation = f64::from(display.lens_separation);
    let vertical = f64::from(display.lens_vertical_position);

    // Only the right view's angle is given; vertical angles come from the viewing distance.
    let right_fov = compute_fovs(
        w_meters,
        separation / 2.0,
        f64::from(display.fov_y).to_radians(),
        h_meters,
        vertical,
        0.0,
    )?;
    // Left eye mirrors the right one.
    let left_fov = XrtFov {
        angle_left: -right_fov.angle_right,
        angle_right: -right_fov.angle_left,
        angle_up: right_fov.angle_up,
        angle_down: right_fov.angle_down,
    };

    let view = |x_pixels: u32, fov: XrtFov| XrtView {
        viewport: XrtViewport {
            x_pixels,
            y_pixels: 0,
            w_pixels,
            h_pixels,
        },
        display: XrtViewDisplay { w_pixels, h_pixels },
        rot: XrtMatrix2x2::IDENTITY,
        fov,
    };

    Ok(XrtHmdParts {
        screens: [XrtScreen {
            w_pixels: display.width_pixels,
            h_pixels: display.height_pixels,
            nominal_frame_interval_ns: display.period().as_nanos() as u64,
        }],
        views: [view(0, left_fov), view(w_pixels, right_fov)],
        blend_mode: XrtBlendMode::Opaque,
        distortion: XrtDistortion {
            models: XrtDistortionModel::NONE,
            preferred: XrtDistortionModel::NONE,
            mesh: XrtDistortionMesh::default(),
        },
    })
}
