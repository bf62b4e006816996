//! Region-raster ingestion and proxy-weighted aggregation.
//!
//! The iso-raster assigns every cell a label index into a list of raw
//! region labels; labels not present in the run's canonical region table
//! degrade to the ignored sentinel with a warning, never an error. The
//! proxy field carries the economic-exposure weight per cell and the
//! per-region proxy totals used as normalizing denominators.

use crate::errors::{GridForceError, GridForceResult};
use crate::forcing::IndexMapping;
use crate::grid::{common_grid, GeoGrid};
use crate::lockstep::traverse2;
use crate::raster::RasterSource;
use log::{debug, warn};
use ndarray::{Array2, ArrayView2};

/// Sentinel for cells or labels without an assigned region.
pub const IGNORED_REGION: i32 = -1;

/// Integer raster mapping each cell to a region label index.
#[derive(Debug, Clone)]
pub struct RegionMap {
    grid: GeoGrid,
    cells: Array2<i32>,
    /// Label index -> canonical region index, or [`IGNORED_REGION`].
    regions: Vec<i32>,
}

impl RegionMap {
    /// Load an iso-raster and its accompanying label array.
    ///
    /// `variable` holds the per-cell label indices, `index_variable` the
    /// raw label strings. Labels missing from `canonical` are logged and
    /// mapped to [`IGNORED_REGION`].
    pub fn read(
        source: &dyn RasterSource,
        variable: &str,
        index_variable: &str,
        canonical: &IndexMapping,
    ) -> GridForceResult<Self> {
        let grid = GeoGrid::from_source(source)?;
        let (lat_count, lon_count) = grid.shape();
        let flat = source.read_i32(variable, &[0, 0], &[lat_count, lon_count])?;
        let cells = Array2::from_shape_vec((lat_count, lon_count), flat).map_err(|e| {
            GridForceError::Format {
                file: source.label().to_string(),
                variable: variable.to_string(),
                message: e.to_string(),
            }
        })?;
        let labels = source.read_strings(index_variable)?;
        let regions = labels
            .iter()
            .map(|label| match canonical.index_of(label) {
                Some(region) => region as i32,
                None => {
                    warn!("iso-raster region {} ignored", label);
                    IGNORED_REGION
                }
            })
            .collect();
        Ok(Self {
            grid,
            cells,
            regions,
        })
    }

    /// Build a region map from already-decoded parts; used by tests.
    pub fn from_parts(grid: GeoGrid, cells: Array2<i32>, regions: Vec<i32>) -> Self {
        Self {
            grid,
            cells,
            regions,
        }
    }

    pub fn grid(&self) -> &GeoGrid {
        &self.grid
    }

    pub fn cells(&self) -> ArrayView2<i32> {
        self.cells.view()
    }

    /// Number of raw labels, the length of per-label accumulators.
    pub fn label_count(&self) -> usize {
        self.regions.len()
    }

    /// Canonical region index of a label index, `None` for ignored or
    /// out-of-range labels.
    pub fn canonical_region(&self, label: usize) -> Option<usize> {
        match self.regions.get(label) {
            Some(&region) if region >= 0 => Some(region as usize),
            _ => None,
        }
    }

    /// Canonical region index of a raw cell value.
    pub fn region_of(&self, cell: i32) -> Option<usize> {
        if cell < 0 {
            None
        } else {
            self.canonical_region(cell as usize)
        }
    }
}

/// Economic-exposure weighting raster with per-region totals.
#[derive(Debug, Clone)]
pub struct ProxyField {
    grid: GeoGrid,
    values: Array2<f32>,
    /// Proxy mass per label index of the associated region map.
    totals: Vec<f64>,
}

impl ProxyField {
    /// Load a proxy raster and aggregate its mass per region.
    ///
    /// The proxy grid must be compatible with the iso-raster grid. Cells
    /// with non-positive or NaN proxy are skipped; cells without an
    /// assigned region contribute to a diagnostic global total only.
    /// Regions with zero total are logged, not errors: they simply cannot
    /// receive forcing from this raster.
    pub fn read(
        source: &dyn RasterSource,
        variable: &str,
        region_map: &RegionMap,
        canonical: &IndexMapping,
    ) -> GridForceResult<Self> {
        let grid = GeoGrid::from_source(source)?;
        let (lat_count, lon_count) = grid.shape();
        let flat = source.read_f32(variable, &[0, 0], &[lat_count, lon_count])?;
        let values = Array2::from_shape_vec((lat_count, lon_count), flat).map_err(|e| {
            GridForceError::Format {
                file: source.label().to_string(),
                variable: variable.to_string(),
                message: e.to_string(),
            }
        })?;
        if !grid.is_compatible(region_map.grid()) {
            return Err(GridForceError::IncompatibleGrids(format!(
                "{}: proxy and iso-raster",
                source.label()
            )));
        }

        let mut totals = vec![0.0f64; region_map.label_count()];
        let mut assigned_sum = 0.0f64;
        let mut overall_sum = 0.0f64;
        let common = common_grid(&[region_map.grid(), &grid])?;
        traverse2(
            common.windows[0].apply(region_map.cells()),
            common.windows[1].apply(values.view()),
            |_, _, &label, &proxy| {
                if proxy <= 0.0 || proxy.is_nan() {
                    return true;
                }
                overall_sum += proxy as f64;
                if label < 0 || label as usize >= totals.len() {
                    return true;
                }
                totals[label as usize] += proxy as f64;
                assigned_sum += proxy as f64;
                true
            },
        );
        debug!("total proxy sum: {} ({} overall)", assigned_sum, overall_sum);
        for (label, &total) in totals.iter().enumerate() {
            if let Some(region) = region_map.canonical_region(label) {
                if total <= 0.0 {
                    warn!("{} has zero proxy", canonical.name(region));
                }
            }
        }

        Ok(Self {
            grid,
            values,
            totals,
        })
    }

    /// Build a proxy field from already-decoded parts; used by tests.
    pub fn from_parts(grid: GeoGrid, values: Array2<f32>, totals: Vec<f64>) -> Self {
        Self {
            grid,
            values,
            totals,
        }
    }

    pub fn grid(&self) -> &GeoGrid {
        &self.grid
    }

    pub fn values(&self) -> ArrayView2<f32> {
        self.values.view()
    }

    /// Total proxy mass of a label index.
    pub fn total(&self, label: usize) -> f64 {
        self.totals[label]
    }

    pub fn totals(&self) -> &[f64] {
        &self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::MemorySource;

    /// 4x4 raster: the 2x2 corner `(0,0)-(1,1)` is USA, the rest CHN.
    pub fn corner_cells() -> Vec<i32> {
        let mut cells = vec![1i32; 16];
        for lat in 0..2 {
            for lon in 0..2 {
                cells[lat * 4 + lon] = 0;
            }
        }
        cells
    }

    fn iso_source() -> MemorySource {
        MemorySource::new("isoraster.nc")
            .with_axis("lat", vec![0.5, 1.5, 2.5, 3.5])
            .with_axis("lon", vec![0.5, 1.5, 2.5, 3.5])
            .with_i32("iso", vec![4, 4], corner_cells())
            .with_strings("index", vec!["USA".to_string(), "CHN".to_string()])
    }

    fn proxy_source() -> MemorySource {
        MemorySource::new("population.nc")
            .with_axis("lat", vec![0.5, 1.5, 2.5, 3.5])
            .with_axis("lon", vec![0.5, 1.5, 2.5, 3.5])
            .with_f32("population", vec![4, 4], vec![1.0; 16])
    }

    fn canonical() -> IndexMapping {
        IndexMapping::new(["USA", "CHN"])
    }

    #[test]
    fn reads_isoraster() {
        let regions = canonical();
        let map = RegionMap::read(&iso_source(), "iso", "index", &regions).unwrap();
        assert_eq!(map.grid().shape(), (4, 4));
        assert_eq!(map.label_count(), 2);
        assert_eq!(map.canonical_region(0), Some(0));
        assert_eq!(map.region_of(1), Some(1));
        assert_eq!(map.region_of(-1), None);
        assert_eq!(map.cells()[[0, 0]], 0);
        assert_eq!(map.cells()[[3, 3]], 1);
    }

    #[test]
    fn unknown_labels_are_ignored_not_fatal() {
        let source = iso_source().with_strings(
            "index",
            vec!["USA".to_string(), "ATL".to_string()],
        );
        let regions = canonical();
        let map = RegionMap::read(&source, "iso", "index", &regions).unwrap();
        assert_eq!(map.canonical_region(0), Some(0));
        assert_eq!(map.canonical_region(1), None);
        assert_eq!(map.region_of(1), None);
    }

    #[test]
    fn out_of_range_labels_are_ignored() {
        let regions = canonical();
        let map = RegionMap::read(&iso_source(), "iso", "index", &regions).unwrap();
        assert_eq!(map.canonical_region(7), None);
        assert_eq!(map.region_of(7), None);
    }

    #[test]
    fn proxy_totals_per_region() {
        let regions = canonical();
        let map = RegionMap::read(&iso_source(), "iso", "index", &regions).unwrap();
        let proxy = ProxyField::read(&proxy_source(), "population", &map, &regions).unwrap();
        assert_eq!(proxy.total(0), 4.0);
        assert_eq!(proxy.total(1), 12.0);
    }

    #[test]
    fn proxy_skips_invalid_cells() {
        let mut values = vec![1.0f32; 16];
        values[0] = f32::NAN;
        values[1] = -2.0;
        values[15] = 0.0;
        let source = proxy_source().with_f32("population", vec![4, 4], values);
        let regions = canonical();
        let map = RegionMap::read(&iso_source(), "iso", "index", &regions).unwrap();
        let proxy = ProxyField::read(&source, "population", &map, &regions).unwrap();
        // two USA cells dropped, one CHN cell dropped
        assert_eq!(proxy.total(0), 2.0);
        assert_eq!(proxy.total(1), 11.0);
    }

    #[test]
    fn proxy_requires_compatible_grid() {
        let source = MemorySource::new("population.nc")
            .with_axis("lat", vec![0.5, 2.5, 4.5, 6.5])
            .with_axis("lon", vec![0.5, 2.5, 4.5, 6.5])
            .with_f32("population", vec![4, 4], vec![1.0; 16]);
        let regions = canonical();
        let map = RegionMap::read(&iso_source(), "iso", "index", &regions).unwrap();
        assert!(matches!(
            ProxyField::read(&source, "population", &map, &regions),
            Err(GridForceError::IncompatibleGrids(_))
        ));
    }
}
