//! Flood-fraction hazard with recovery decay.
//!
//! Each cell's flood fraction is combined with a decaying memory of the
//! previous step's value (`recovery.exponent * last`, zeroed below
//! `recovery.threshold`), capped at full flooding, then reduced to
//! per-region forcing through the proxy-weighted contract. The recovery
//! raster is carried across time steps and across consecutive datasets,
//! so the time loop is strictly sequential.

use crate::config::{FloodingConfig, RecoveryConfig};
use crate::Hazard;
use gridforce_core::errors::{GridForceError, GridForceResult};
use gridforce_core::forcing::{AgentForcing, ForcingSeries};
use gridforce_core::grid::GeoGrid;
use gridforce_core::raster::{is_missing, RasterSource};
use gridforce_core::reduction::{accumulate_with_state, normalize_into};
use gridforce_core::region::{ProxyField, RegionMap};
use gridforce_core::time::TimeAxis;
use log::debug;
use ndarray::{Array2, ArrayView2};

pub struct Flooding {
    variable: String,
    chunk_size: usize,
    time_shift: i64,
    recovery: Option<RecoveryConfig>,
    sectors: Vec<usize>,
    base_forcing: AgentForcing,
    region_map: RegionMap,
    proxy: ProxyField,
    last_grid: Option<GeoGrid>,
    last_values: Option<Array2<f32>>,
}

impl Flooding {
    /// Build the module from its configuration and the run's canonical
    /// forcing template. The iso-raster and proxy are read once here;
    /// the hazard files are streamed per [`generate`](Hazard::generate)
    /// call.
    pub fn new(
        config: &FloodingConfig,
        base_forcing: AgentForcing,
        isoraster: &dyn RasterSource,
        proxy: &dyn RasterSource,
    ) -> GridForceResult<Self> {
        let sectors = config
            .sectors
            .iter()
            .map(|name| {
                base_forcing.sectors().index_of(name).ok_or_else(|| {
                    GridForceError::Error(format!("Unknown sector '{}'", name))
                })
            })
            .collect::<GridForceResult<Vec<_>>>()?;
        let region_map = RegionMap::read(
            isoraster,
            &config.isoraster.variable,
            &config.isoraster.index,
            base_forcing.regions(),
        )?;
        let proxy = ProxyField::read(
            proxy,
            &config.proxy.variable,
            &region_map,
            base_forcing.regions(),
        )?;
        Ok(Self {
            variable: config.flood_fraction.variable.clone(),
            chunk_size: config.chunk_size.max(1),
            time_shift: config.time_shift,
            recovery: config.recovery,
            sectors,
            base_forcing,
            region_map,
            proxy,
            last_grid: None,
            last_values: None,
        })
    }
}

impl Hazard for Flooding {
    fn generate(
        &mut self,
        source: &dyn RasterSource,
    ) -> GridForceResult<ForcingSeries<AgentForcing>> {
        let grid = GeoGrid::from_source(source)?;
        if !self.region_map.grid().is_compatible(&grid) {
            return Err(GridForceError::IncompatibleGrids(format!(
                "{}: hazard and iso-raster",
                source.label()
            )));
        }
        if let Some(previous) = &self.last_grid {
            // the carried recovery raster must line up cell for cell
            if !previous.is_compatible(&grid) || previous.shape() != grid.shape() {
                return Err(GridForceError::IncompatibleGrids(format!(
                    "{}: hazard and carried recovery state",
                    source.label()
                )));
            }
        }
        let time_axis = TimeAxis::from_source(source, self.time_shift)?;

        let (exponent, threshold) = match self.recovery {
            Some(recovery) => (recovery.exponent, recovery.threshold),
            None => (0.0, 0.0),
        };
        let last = self
            .last_values
            .get_or_insert_with(|| Array2::zeros(grid.shape()));

        let mut series = ForcingSeries::new(self.base_forcing.clone(), time_axis.reference());
        let (lat_count, lon_count) = grid.shape();
        let slice_len = lat_count * lon_count;
        let steps = time_axis.len();
        debug!("{}: {} time steps of {}", source.label(), steps, self.variable);
        let mut chunk: Vec<f32> = Vec::new();
        let mut chunk_start = 0usize;
        let mut chunk_len = 0usize;

        for (step, &time) in time_axis.times.iter().enumerate() {
            if step >= chunk_start + chunk_len {
                chunk_start = step;
                chunk_len = self.chunk_size.min(steps - step);
                chunk = source.read_f32(
                    &self.variable,
                    &[step, 0, 0],
                    &[chunk_len, lat_count, lon_count],
                )?;
            }
            let offset = (step - chunk_start) * slice_len;
            let slice =
                ArrayView2::from_shape((lat_count, lon_count), &chunk[offset..offset + slice_len])
                    .map_err(|e| GridForceError::Format {
                        file: source.label().to_string(),
                        variable: self.variable.clone(),
                        message: e.to_string(),
                    })?;

            let region_forcing = accumulate_with_state(
                &self.region_map,
                &self.proxy,
                slice,
                &grid,
                last.view_mut(),
                &grid,
                |flood, last_value| {
                    let mut recovered = exponent * *last_value;
                    if recovered < threshold || is_missing(recovered) {
                        recovered = 0.0;
                    }
                    let value = (flood + recovered).min(1.0);
                    *last_value = value;
                    Some(value)
                },
            )?;

            let forcing = series.insert(time)?;
            normalize_into(
                forcing,
                &self.sectors,
                &self.region_map,
                &self.proxy,
                &region_forcing,
                (0.0, 1.0),
            );
        }

        self.last_grid = Some(grid);
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileVariable, IsorasterConfig};
    use gridforce_core::raster::MemorySource;
    use is_close::is_close;

    fn config(recovery: Option<RecoveryConfig>, chunk_size: usize) -> FloodingConfig {
        FloodingConfig {
            flood_fraction: FileVariable {
                file: "flood.nc".to_string(),
                variable: "fldfrc".to_string(),
            },
            proxy: FileVariable {
                file: "population.nc".to_string(),
                variable: "population".to_string(),
            },
            isoraster: IsorasterConfig {
                variable: "iso".to_string(),
                index: "index".to_string(),
            },
            recovery,
            chunk_size,
            time_shift: 0,
            sectors: vec!["AGRI".to_string(), "MANU".to_string()],
        }
    }

    fn axis_values() -> Vec<f64> {
        vec![0.5, 1.5, 2.5, 3.5]
    }

    /// 4x4 iso-raster: the 2x2 corner is USA, the rest CHN.
    fn iso_source() -> MemorySource {
        let mut cells = vec![1i32; 16];
        for lat in 0..2 {
            for lon in 0..2 {
                cells[lat * 4 + lon] = 0;
            }
        }
        MemorySource::new("isoraster.nc")
            .with_axis("lat", axis_values())
            .with_axis("lon", axis_values())
            .with_i32("iso", vec![4, 4], cells)
            .with_strings("index", vec!["USA".to_string(), "CHN".to_string()])
    }

    fn proxy_source() -> MemorySource {
        MemorySource::new("population.nc")
            .with_axis("lat", axis_values())
            .with_axis("lon", axis_values())
            .with_f32("population", vec![4, 4], vec![1.0; 16])
    }

    fn flood_source(fractions: &[f32]) -> MemorySource {
        let steps = fractions.len();
        let values: Vec<f32> = fractions
            .iter()
            .flat_map(|&fraction| std::iter::repeat(fraction).take(16))
            .collect();
        MemorySource::new("flood.nc")
            .with_axis("time", (0..steps).map(|t| t as f64).collect())
            .with_attribute("time", "units", "days since 2000-01-01")
            .with_axis("lat", axis_values())
            .with_axis("lon", axis_values())
            .with_f32("fldfrc", vec![steps, 4, 4], values)
    }

    fn template() -> AgentForcing {
        AgentForcing::from_names(["AGRI", "MANU"], ["USA", "CHN"])
    }

    #[test]
    fn half_flooded_gives_half_forcing() {
        let mut flooding =
            Flooding::new(&config(None, 10), template(), &iso_source(), &proxy_source()).unwrap();
        let series = flooding.generate(&flood_source(&[0.5, 0.5])).unwrap();
        assert_eq!(series.len(), 2);
        for (_, forcing) in series.iter() {
            for sector in ["AGRI", "MANU"] {
                for region in ["USA", "CHN"] {
                    let value = forcing.value_by_name(sector, region).unwrap();
                    assert!(is_close!(value as f64, 0.5));
                }
            }
        }
    }

    #[test]
    fn chunk_size_does_not_change_results() {
        let fractions = [0.1, 0.2, 0.3, 0.4, 0.5];
        let mut whole =
            Flooding::new(&config(None, 10), template(), &iso_source(), &proxy_source()).unwrap();
        let mut stepwise =
            Flooding::new(&config(None, 1), template(), &iso_source(), &proxy_source()).unwrap();
        let mut uneven =
            Flooding::new(&config(None, 2), template(), &iso_source(), &proxy_source()).unwrap();

        let expected = whole.generate(&flood_source(&fractions)).unwrap();
        for series in [
            stepwise.generate(&flood_source(&fractions)).unwrap(),
            uneven.generate(&flood_source(&fractions)).unwrap(),
        ] {
            assert_eq!(series.sorted_times(), expected.sorted_times());
            for time in expected.sorted_times() {
                assert_eq!(
                    series.get(time).unwrap().data(),
                    expected.get(time).unwrap().data()
                );
            }
        }
    }

    #[test]
    fn recovery_carries_flooding_forward() {
        let recovery = RecoveryConfig {
            exponent: 1.0,
            threshold: 0.0,
        };
        let mut flooding = Flooding::new(
            &config(Some(recovery), 10),
            template(),
            &iso_source(),
            &proxy_source(),
        )
        .unwrap();
        let series = flooding.generate(&flood_source(&[0.5, 0.5])).unwrap();
        let times = series.sorted_times();
        // first step: plain 0.5 flooded, 0.5 unaffected
        let first = series.get(times[0]).unwrap();
        assert!(is_close!(
            first.value_by_name("AGRI", "USA").unwrap() as f64,
            0.5
        ));
        // second step: 0.5 new + 0.5 carried = fully flooded
        let second = series.get(times[1]).unwrap();
        assert!(is_close!(
            second.value_by_name("AGRI", "USA").unwrap() as f64,
            0.0
        ));
    }

    #[test]
    fn recovery_state_survives_across_files() {
        let recovery = RecoveryConfig {
            exponent: 0.5,
            threshold: 0.0,
        };
        let mut flooding = Flooding::new(
            &config(Some(recovery), 10),
            template(),
            &iso_source(),
            &proxy_source(),
        )
        .unwrap();
        flooding.generate(&flood_source(&[0.8])).unwrap();
        // next year's file starts from last = 0.8
        let series = flooding.generate(&flood_source(&[0.0])).unwrap();
        let time = series.sorted_times()[0];
        let value = series
            .get(time)
            .unwrap()
            .value_by_name("AGRI", "CHN")
            .unwrap();
        // 0.4 carried flooding leaves 0.6 unaffected
        assert!(is_close!(value as f64, 0.6));
    }

    #[test]
    fn rejects_incompatible_hazard_grid() {
        let mut flooding =
            Flooding::new(&config(None, 10), template(), &iso_source(), &proxy_source()).unwrap();
        let coarse = MemorySource::new("flood.nc")
            .with_axis("time", vec![0.0])
            .with_attribute("time", "units", "days since 2000-01-01")
            .with_axis("lat", vec![1.0, 3.0])
            .with_axis("lon", vec![1.0, 3.0])
            .with_f32("fldfrc", vec![1, 2, 2], vec![0.5; 4]);
        assert!(matches!(
            flooding.generate(&coarse),
            Err(GridForceError::IncompatibleGrids(_))
        ));
    }

    #[test]
    fn unknown_sector_is_a_configuration_error() {
        let mut config = config(None, 10);
        config.sectors.push("SHIPPING".to_string());
        assert!(Flooding::new(&config, template(), &iso_source(), &proxy_source()).is_err());
    }
}
