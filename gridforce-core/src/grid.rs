//! Geographic grid geometry, windowing and common-grid computation.
//!
//! A [`GeoGrid`] describes one axis-aligned equirectangular raster.
//! Independently produced datasets rarely agree exactly: extents differ,
//! axes may run north-to-south or south-to-north, and nominally equal
//! resolutions diverge by floating-point noise. [`common_grid`] reconciles
//! several grids into one intersected window and hands back a
//! [`GridWindow`] per input, so that iterating all windowed views with the
//! same `(lat_index, lon_index)` pair addresses the same geographic cell
//! in every input buffer.

use crate::errors::{GridForceError, GridForceResult};
use crate::raster::{resolve_axis, RasterSource, LAT_ALIASES, LON_ALIASES};
use ndarray::{ArrayView2, ArrayViewMut2, Axis, Slice};
use serde::{Deserialize, Serialize};

/// Relative tolerance for step-size agreement, both within one axis
/// ("no gaps") and between grids (resolution compatibility).
pub const STEP_TOLERANCE: f64 = 1e-2;

/// One axis of an equirectangular grid.
///
/// Bounds are normalized so that `min < max` regardless of the storage
/// order of the source axis; the sign of `stepsize` records the storage
/// order (negative for an axis stored north-to-south / descending).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    min: f64,
    max: f64,
    stepsize: f64,
    count: usize,
}

impl GridAxis {
    /// Build an axis from the sample values of an axis variable.
    ///
    /// Fails if fewer than 2 samples exist or if any consecutive delta
    /// deviates from the first delta by more than [`STEP_TOLERANCE`]
    /// relative tolerance (axes with gaps are not supported).
    pub fn from_values(values: &[f64], file: &str, variable: &str) -> GridForceResult<Self> {
        let format_error = |message: &str| GridForceError::Format {
            file: file.to_string(),
            variable: variable.to_string(),
            message: message.to_string(),
        };
        if values.len() < 2 {
            return Err(format_error("axis needs at least 2 samples"));
        }
        let stepsize = values[1] - values[0];
        if stepsize == 0.0 {
            return Err(format_error("axis step size is zero"));
        }
        for window in values.windows(2) {
            let delta = window[1] - window[0];
            if ((delta - stepsize) / stepsize).abs() > STEP_TOLERANCE {
                return Err(format_error("axis has gaps, which are not supported"));
            }
        }
        let first = values[0];
        let last = values[values.len() - 1];
        Ok(Self {
            min: first.min(last),
            max: first.max(last),
            stepsize,
            count: values.len(),
        })
    }

    /// Build an axis from explicit geometry, e.g. for a synthetic common
    /// grid. Bounds and step are taken as given.
    pub fn new(min: f64, max: f64, stepsize: f64, count: usize) -> Self {
        Self {
            min,
            max,
            stepsize,
            count,
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Signed step size; negative for a descending storage order.
    pub fn stepsize(&self) -> f64 {
        self.stepsize
    }

    pub fn abs_stepsize(&self) -> f64 {
        self.stepsize.abs()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_descending(&self) -> bool {
        self.stepsize < 0.0
    }

    /// Storage-order cell index of a coordinate, or `None` outside
    /// `[min, max + stepsize)`.
    pub fn index(&self, coordinate: f64) -> Option<usize> {
        let step = self.abs_stepsize();
        if coordinate < self.min || coordinate >= self.max + step {
            return None;
        }
        let span = self.max - self.min + step;
        let raw = if self.is_descending() {
            (self.max - coordinate) * self.count as f64 / span
        } else {
            (coordinate - self.min) * self.count as f64 / span
        };
        // snap coordinates sitting exactly on a cell boundary
        let index = (raw + 1e-9).floor() as usize;
        if index >= self.count {
            None
        } else {
            Some(index)
        }
    }

    /// Coordinate of a cell in ascending orientation; round-trips with
    /// [`index`](Self::index) on ascending axes.
    pub fn coordinate(&self, index: usize) -> f64 {
        self.min + self.abs_stepsize() * index as f64
    }

    /// Whether two axes have the same resolution within
    /// [`STEP_TOLERANCE`] relative tolerance. Symmetric.
    pub fn is_compatible(&self, other: &GridAxis) -> bool {
        let a = self.abs_stepsize();
        let b = other.abs_stepsize();
        (a - b).abs() / a.max(b) <= STEP_TOLERANCE
    }

    /// Window of this axis covering `[lo, hi]`, capped at `max_len`
    /// cells. The traversal direction is flipped for descending storage
    /// so that iteration always proceeds from `lo` towards `hi`.
    fn window(&self, lo: f64, hi: f64, max_len: usize) -> GridForceResult<AxisWindow> {
        let outside = |coordinate: f64| {
            GridForceError::Error(format!(
                "coordinate {} outside axis [{}, {}]",
                coordinate, self.min, self.max
            ))
        };
        let lo_index = self.index(lo).ok_or_else(|| outside(lo))?;
        let hi_index = self.index(hi).ok_or_else(|| outside(hi))?;
        if lo_index > hi_index {
            Ok(AxisWindow {
                begin: lo_index,
                len: (lo_index - hi_index + 1).min(max_len),
                reversed: true,
            })
        } else {
            Ok(AxisWindow {
                begin: lo_index,
                len: (hi_index - lo_index + 1).min(max_len),
                reversed: false,
            })
        }
    }
}

/// Axis-aligned equirectangular raster geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoGrid {
    pub lat: GridAxis,
    pub lon: GridAxis,
}

impl GeoGrid {
    /// Read the grid geometry from a source's axis variables, resolved
    /// under the conventional alias sets.
    pub fn from_source(source: &dyn RasterSource) -> GridForceResult<Self> {
        let lat_values = resolve_axis(source, LAT_ALIASES)?;
        let lon_values = resolve_axis(source, LON_ALIASES)?;
        Ok(Self {
            lat: GridAxis::from_values(&lat_values, source.label(), "latitude")?,
            lon: GridAxis::from_values(&lon_values, source.label(), "longitude")?,
        })
    }

    pub fn new(lat: GridAxis, lon: GridAxis) -> Self {
        Self { lat, lon }
    }

    /// Number of cells.
    pub fn size(&self) -> usize {
        self.lat.count * self.lon.count
    }

    /// `(lat_count, lon_count)`, the shape of a backing raster.
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.count, self.lon.count)
    }

    pub fn lat_index(&self, lat: f64) -> Option<usize> {
        self.lat.index(lat)
    }

    pub fn lon_index(&self, lon: f64) -> Option<usize> {
        self.lon.index(lon)
    }

    /// Whether both axes agree in resolution within tolerance.
    pub fn is_compatible(&self, other: &GeoGrid) -> bool {
        self.lat.is_compatible(&other.lat) && self.lon.is_compatible(&other.lon)
    }

    /// Window of this grid clipped to the given bounding box and capped
    /// at the given cell counts, with traversal order normalized to
    /// ascending geographic order on both axes.
    pub fn window(
        &self,
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
        max_lat_cells: usize,
        max_lon_cells: usize,
    ) -> GridForceResult<GridWindow> {
        Ok(GridWindow {
            lat: self.lat.window(lat_min, lat_max, max_lat_cells)?,
            lon: self.lon.window(lon_min, lon_max, max_lon_cells)?,
        })
    }
}

/// Window of one axis: a begin offset, a length and a traversal
/// direction relative to the storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisWindow {
    pub begin: usize,
    pub len: usize,
    pub reversed: bool,
}

impl AxisWindow {
    fn as_slice(&self) -> Slice {
        if self.reversed {
            Slice::new(
                (self.begin + 1 - self.len) as isize,
                Some(self.begin as isize + 1),
                -1,
            )
        } else {
            Slice::new(
                self.begin as isize,
                Some((self.begin + self.len) as isize),
                1,
            )
        }
    }
}

/// Rectangular sub-window of a raster, never owning the buffer.
///
/// Applying the window yields a zero-copy strided view; a negative
/// stride represents an axis traversed against its storage order. The
/// borrow checker guarantees the backing buffer outlives every view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridWindow {
    pub lat: AxisWindow,
    pub lon: AxisWindow,
}

impl GridWindow {
    /// `(lat_cells, lon_cells)` of the windowed view.
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len, self.lon.len)
    }

    /// Windowed view of a raster with this grid's full shape.
    pub fn apply<'a, T>(&self, raster: ArrayView2<'a, T>) -> ArrayView2<'a, T> {
        let mut raster = raster;
        raster.slice_axis_inplace(Axis(0), self.lat.as_slice());
        raster.slice_axis_inplace(Axis(1), self.lon.as_slice());
        raster
    }

    /// Mutable windowed view of a raster with this grid's full shape.
    pub fn apply_mut<'a, T>(&self, raster: ArrayViewMut2<'a, T>) -> ArrayViewMut2<'a, T> {
        let mut raster = raster;
        raster.slice_axis_inplace(Axis(0), self.lat.as_slice());
        raster.slice_axis_inplace(Axis(1), self.lon.as_slice());
        raster
    }
}

/// Result of [`common_grid`]: the synthetic intersected grid and one
/// window per input, all of identical shape.
#[derive(Debug, Clone)]
pub struct CommonGrid {
    pub grid: GeoGrid,
    pub windows: Vec<GridWindow>,
}

/// Intersect several grids into a common window.
///
/// The bounding box is the intersection of the inputs (max of mins, min
/// of maxes); the cell count per axis is the minimum index span among
/// the inputs, guarding against grids whose cell boundaries are offset
/// by a fraction of a cell. All inputs must be pairwise compatible.
///
/// The synthetic grid's step size is copied from the first input and is
/// representative only.
///
/// # Panics
///
/// Panics if `grids` is empty.
pub fn common_grid(grids: &[&GeoGrid]) -> GridForceResult<CommonGrid> {
    assert!(!grids.is_empty(), "common grid of no grids");
    for (i, a) in grids.iter().enumerate() {
        for b in &grids[i + 1..] {
            if !a.is_compatible(b) {
                return Err(GridForceError::IncompatibleGrids(format!(
                    "step sizes ({}, {}) and ({}, {})",
                    a.lat.abs_stepsize(),
                    a.lon.abs_stepsize(),
                    b.lat.abs_stepsize(),
                    b.lon.abs_stepsize()
                )));
            }
        }
    }

    let lat_min = grids.iter().map(|g| g.lat.min()).fold(f64::NEG_INFINITY, f64::max);
    let lat_max = grids.iter().map(|g| g.lat.max()).fold(f64::INFINITY, f64::min);
    let lon_min = grids.iter().map(|g| g.lon.min()).fold(f64::NEG_INFINITY, f64::max);
    let lon_max = grids.iter().map(|g| g.lon.max()).fold(f64::INFINITY, f64::min);
    if lat_min > lat_max || lon_min > lon_max {
        return Err(GridForceError::Error(
            "grids do not overlap geographically".to_string(),
        ));
    }

    let mut lat_cells = usize::MAX;
    let mut lon_cells = usize::MAX;
    for grid in grids {
        let span = |axis: &GridAxis, lo: f64, hi: f64| -> GridForceResult<usize> {
            let lo_index = axis.index(lo).ok_or_else(|| {
                GridForceError::Error(format!("intersection bound {} outside grid", lo))
            })?;
            let hi_index = axis.index(hi).ok_or_else(|| {
                GridForceError::Error(format!("intersection bound {} outside grid", hi))
            })?;
            Ok(lo_index.abs_diff(hi_index) + 1)
        };
        lat_cells = lat_cells.min(span(&grid.lat, lat_min, lat_max)?);
        lon_cells = lon_cells.min(span(&grid.lon, lon_min, lon_max)?);
    }

    let windows = grids
        .iter()
        .map(|grid| grid.window(lat_min, lat_max, lon_min, lon_max, lat_cells, lon_cells))
        .collect::<GridForceResult<Vec<_>>>()?;

    Ok(CommonGrid {
        grid: GeoGrid {
            lat: GridAxis::new(lat_min, lat_max, grids[0].lat.abs_stepsize(), lat_cells),
            lon: GridAxis::new(lon_min, lon_max, grids[0].lon.abs_stepsize(), lon_cells),
        },
        windows,
    })
}
