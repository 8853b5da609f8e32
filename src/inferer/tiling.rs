//! Window grid planning for sliding-window inference.
//!
//! Given a volume shape, a fixed window size, and an overlap fraction,
//! the planner computes the ordered set of window origins covering every
//! voxel at least once. The order is the row-major cross product of the
//! per-axis origin lists and is stable for a given input, so repeated runs
//! visit windows identically.

use crate::core::errors::SegError;

/// An axis-aligned sub-block of a volume: one model invocation's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridWindow {
    /// Origin of the window in the volume's spatial grid.
    pub origin: [usize; 3],
    /// Window size; equal to the model's expected input shape.
    pub size: [usize; 3],
}

/// An ordered sequence of windows covering a volume's spatial extent.
#[derive(Debug, Clone)]
pub struct TilingPlan {
    windows: Vec<GridWindow>,
    shape: [usize; 3],
    roi_size: [usize; 3],
}

impl TilingPlan {
    /// Plans the window grid for a volume.
    ///
    /// Per axis, the stride is `roi * (1 - overlap)` rounded to an integer
    /// and clamped to at least 1 so progress is guaranteed; origins run
    /// `0, stride, 2*stride, ...` while a full window still extends past
    /// them, and a final origin is clamped so the last window ends exactly
    /// at the volume edge.
    ///
    /// The caller must pad the volume so `shape >= roi_size` on every axis
    /// beforehand; see [`crate::processors::pad`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `overlap` is outside `[0, 1)` or
    /// any roi component is zero, and an invalid input error if the volume
    /// is smaller than the window.
    pub fn new(shape: [usize; 3], roi_size: [usize; 3], overlap: f64) -> Result<Self, SegError> {
        if !overlap.is_finite() || !(0.0..1.0).contains(&overlap) {
            return Err(SegError::config(format!(
                "overlap must be in [0, 1), got {overlap}"
            )));
        }
        for axis in 0..3 {
            if roi_size[axis] == 0 {
                return Err(SegError::config(format!(
                    "roi_size along axis {axis} must be greater than 0"
                )));
            }
            if shape[axis] < roi_size[axis] {
                return Err(SegError::invalid_input(format!(
                    "volume shape {:?} is smaller than roi {:?} along axis {axis}; pad before planning",
                    shape, roi_size
                )));
            }
        }

        let origins: [Vec<usize>; 3] = [
            axis_origins(shape[0], roi_size[0], overlap),
            axis_origins(shape[1], roi_size[1], overlap),
            axis_origins(shape[2], roi_size[2], overlap),
        ];

        let mut windows =
            Vec::with_capacity(origins[0].len() * origins[1].len() * origins[2].len());
        for &z in &origins[0] {
            for &y in &origins[1] {
                for &x in &origins[2] {
                    windows.push(GridWindow {
                        origin: [z, y, x],
                        size: roi_size,
                    });
                }
            }
        }

        Ok(Self {
            windows,
            shape,
            roi_size,
        })
    }

    /// The planned windows in row-major order.
    pub fn windows(&self) -> &[GridWindow] {
        &self.windows
    }

    /// The number of planned windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the plan is empty. Never true for a valid plan.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// The volume shape this plan covers.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// The window size of every planned window.
    pub fn roi_size(&self) -> [usize; 3] {
        self.roi_size
    }
}

/// Window origins along one axis. Requires `extent >= roi`.
fn axis_origins(extent: usize, roi: usize, overlap: f64) -> Vec<usize> {
    let stride = ((roi as f64) * (1.0 - overlap)).round() as usize;
    let stride = stride.max(1);

    let mut origins = Vec::new();
    let mut origin = 0;
    while origin + roi < extent {
        origins.push(origin);
        origin += stride;
    }
    // Clamp the last origin so the final window ends exactly at the edge.
    let last = extent - roi;
    if origins.last() != Some(&last) {
        origins.push(last);
    }
    origins
}
