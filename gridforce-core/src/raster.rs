//! Access to gridded source data.
//!
//! Decoding of on-disk formats (NetCDF, Zarr, ...) is not part of the core;
//! the embedding application supplies an implementation of [`RasterSource`]
//! per input file. The core only relies on named axis variables, row-major
//! hyperslab reads and string attributes.
//!
//! Axis variables are resolved under conventional alias sets: a longitude
//! axis may be called `x`, `lon` or `longitude`, a latitude axis `y`, `lat`
//! or `latitude`.

use crate::errors::{GridForceError, GridForceResult};
use num::Float;
use std::collections::HashMap;

/// Accepted names for the longitude axis variable, in lookup order.
pub const LON_ALIASES: &[&str] = &["x", "lon", "longitude"];
/// Accepted names for the latitude axis variable, in lookup order.
pub const LAT_ALIASES: &[&str] = &["y", "lat", "latitude"];

/// Cell values above this threshold are treated as missing data, in
/// addition to IEEE NaN.
pub const MISSING_THRESHOLD: f64 = 1e10;

/// Whether a cell value counts as missing/invalid and must be excluded
/// from every aggregation.
pub fn is_missing<T: Float>(value: T) -> bool {
    value.is_nan() || value > T::from(MISSING_THRESHOLD).expect("threshold fits in a float type")
}

/// A single decoded input file.
///
/// `start`/`count` describe a row-major hyperslab, one entry per
/// dimension; reads past the stored extent fail with a format error
/// naming the file and variable.
pub trait RasterSource {
    /// Name used in error messages, typically the file name.
    fn label(&self) -> &str;

    /// Ordered sample values of a named axis variable, if present.
    fn axis(&self, name: &str) -> Option<Vec<f64>>;

    /// Length of a named dimension, if present.
    fn dim_len(&self, name: &str) -> Option<usize>;

    /// Read a float hyperslab of `variable`.
    fn read_f32(&self, variable: &str, start: &[usize], count: &[usize])
        -> GridForceResult<Vec<f32>>;

    /// Read an integer hyperslab of `variable`.
    fn read_i32(&self, variable: &str, start: &[usize], count: &[usize])
        -> GridForceResult<Vec<i32>>;

    /// Read a full one-dimensional string variable (e.g. region labels).
    fn read_strings(&self, variable: &str) -> GridForceResult<Vec<String>>;

    /// String attribute of a variable, if present.
    fn attribute(&self, variable: &str, key: &str) -> Option<String>;
}

/// Resolve an axis variable under a set of aliases.
///
/// Returns the values of the first alias present in the source, or
/// [`GridForceError::AxisNotFound`] naming the whole alias set.
pub fn resolve_axis(source: &dyn RasterSource, aliases: &[&str]) -> GridForceResult<Vec<f64>> {
    for alias in aliases {
        if let Some(values) = source.axis(alias) {
            return Ok(values);
        }
    }
    Err(GridForceError::AxisNotFound {
        file: source.label().to_string(),
        axis: aliases.join("|"),
    })
}

/// In-memory [`RasterSource`] backed by plain vectors.
///
/// Used by the test suite and by embedders that already hold decoded
/// arrays. Variables are stored flat in row-major order together with
/// their shape.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    label: String,
    axes: HashMap<String, Vec<f64>>,
    float_vars: HashMap<String, (Vec<usize>, Vec<f32>)>,
    int_vars: HashMap<String, (Vec<usize>, Vec<i32>)>,
    string_vars: HashMap<String, Vec<String>>,
    attributes: HashMap<(String, String), String>,
}

impl MemorySource {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Add an axis variable. Axes are also readable as 1-d dimensions.
    pub fn with_axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.insert(name.into(), values);
        self
    }

    /// Add a float variable with the given row-major shape.
    ///
    /// # Panics
    ///
    /// Panics if the value count does not match the shape.
    pub fn with_f32(mut self, name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> Self {
        assert_eq!(shape.iter().product::<usize>(), values.len());
        self.float_vars.insert(name.into(), (shape, values));
        self
    }

    /// Add an integer variable with the given row-major shape.
    ///
    /// # Panics
    ///
    /// Panics if the value count does not match the shape.
    pub fn with_i32(mut self, name: impl Into<String>, shape: Vec<usize>, values: Vec<i32>) -> Self {
        assert_eq!(shape.iter().product::<usize>(), values.len());
        self.int_vars.insert(name.into(), (shape, values));
        self
    }

    /// Add a one-dimensional string variable.
    pub fn with_strings(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.string_vars.insert(name.into(), values);
        self
    }

    /// Add a string attribute of a variable.
    pub fn with_attribute(
        mut self,
        variable: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes
            .insert((variable.into(), key.into()), value.into());
        self
    }

    fn format_error(&self, variable: &str, message: impl Into<String>) -> GridForceError {
        GridForceError::Format {
            file: self.label.clone(),
            variable: variable.to_string(),
            message: message.into(),
        }
    }
}

/// Copy a row-major hyperslab out of a flat buffer.
fn hyperslab<T: Copy>(shape: &[usize], data: &[T], start: &[usize], count: &[usize]) -> Option<Vec<T>> {
    if shape.len() != start.len() || shape.len() != count.len() {
        return None;
    }
    for d in 0..shape.len() {
        if start[d] + count[d] > shape[d] {
            return None;
        }
    }
    let total: usize = count.iter().product();
    let mut out = Vec::with_capacity(total);
    if total == 0 {
        return Some(out);
    }
    let mut index = vec![0usize; shape.len()];
    loop {
        let mut flat = 0;
        for d in 0..shape.len() {
            flat = flat * shape[d] + start[d] + index[d];
        }
        out.push(data[flat]);
        let mut d = shape.len();
        loop {
            if d == 0 {
                return Some(out);
            }
            d -= 1;
            index[d] += 1;
            if index[d] < count[d] {
                break;
            }
            index[d] = 0;
        }
    }
}

impl RasterSource for MemorySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn axis(&self, name: &str) -> Option<Vec<f64>> {
        self.axes.get(name).cloned()
    }

    fn dim_len(&self, name: &str) -> Option<usize> {
        self.axes.get(name).map(Vec::len)
    }

    fn read_f32(
        &self,
        variable: &str,
        start: &[usize],
        count: &[usize],
    ) -> GridForceResult<Vec<f32>> {
        let (shape, data) = self
            .float_vars
            .get(variable)
            .ok_or_else(|| self.format_error(variable, "variable not found"))?;
        hyperslab(shape, data, start, count)
            .ok_or_else(|| self.format_error(variable, "hyperslab outside variable extent"))
    }

    fn read_i32(
        &self,
        variable: &str,
        start: &[usize],
        count: &[usize],
    ) -> GridForceResult<Vec<i32>> {
        let (shape, data) = self
            .int_vars
            .get(variable)
            .ok_or_else(|| self.format_error(variable, "variable not found"))?;
        hyperslab(shape, data, start, count)
            .ok_or_else(|| self.format_error(variable, "hyperslab outside variable extent"))
    }

    fn read_strings(&self, variable: &str) -> GridForceResult<Vec<String>> {
        self.string_vars
            .get(variable)
            .cloned()
            .ok_or_else(|| self.format_error(variable, "variable not found"))
    }

    fn attribute(&self, variable: &str, key: &str) -> Option<String> {
        self.attributes
            .get(&(variable.to_string(), key.to_string()))
            .cloned()
    }
}
