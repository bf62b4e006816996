//! Heat labor-productivity hazard.
//!
//! Labor productivity drops linearly with day temperature above a
//! threshold, with a per-sector slope. Unlike flooding, the affected
//! fraction differs per sector, so the accumulation writes into the
//! forcing matrix directly and is normalized in place.

use crate::config::HeatLaborConfig;
use crate::Hazard;
use gridforce_core::errors::{GridForceError, GridForceResult};
use gridforce_core::forcing::{AgentForcing, ForcingSeries};
use gridforce_core::grid::{common_grid, GeoGrid};
use gridforce_core::lockstep::traverse3;
use gridforce_core::raster::{is_missing, RasterSource};
use gridforce_core::reduction::normalize_in_place;
use gridforce_core::region::{ProxyField, RegionMap};
use gridforce_core::time::TimeAxis;
use log::debug;
use ndarray::ArrayView2;

pub struct HeatLaborProductivity {
    variable: String,
    threshold: f32,
    chunk_size: usize,
    time_shift: i64,
    sectors: Vec<usize>,
    alphas: Vec<f32>,
    base_forcing: AgentForcing,
    region_map: RegionMap,
    proxy: ProxyField,
}

impl HeatLaborProductivity {
    pub fn new(
        config: &HeatLaborConfig,
        base_forcing: AgentForcing,
        isoraster: &dyn RasterSource,
        proxy: &dyn RasterSource,
    ) -> GridForceResult<Self> {
        let mut sectors = Vec::with_capacity(config.sectors.len());
        let mut alphas = Vec::with_capacity(config.sectors.len());
        for (name, &alpha) in &config.sectors {
            let sector = base_forcing.sectors().index_of(name).ok_or_else(|| {
                GridForceError::Error(format!("Unknown sector '{}'", name))
            })?;
            sectors.push(sector);
            alphas.push(alpha);
        }
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
            variable: config.day_temperature.variable.clone(),
            threshold: config.threshold,
            chunk_size: config.chunk_size.max(1),
            time_shift: config.time_shift,
            sectors,
            alphas,
            base_forcing,
            region_map,
            proxy,
        })
    }
}

impl Hazard for HeatLaborProductivity {
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
        let time_axis = TimeAxis::from_source(source, self.time_shift)?;

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

            let forcing = series.insert(time)?;
            let common = common_grid(&[self.region_map.grid(), self.proxy.grid(), &grid])?;
            traverse3(
                common.windows[0].apply(self.region_map.cells()),
                common.windows[1].apply(self.proxy.values()),
                common.windows[2].apply(slice),
                |_, _, &label, &proxy_value, &temperature| {
                    if is_missing(temperature)
                        || proxy_value <= 0.0
                        || proxy_value.is_nan()
                        || label < 0
                    {
                        return true;
                    }
                    if temperature > self.threshold {
                        let Some(region) = self.region_map.region_of(label) else {
                            return true;
                        };
                        for (&sector, &alpha) in self.sectors.iter().zip(self.alphas.iter()) {
                            let affected =
                                (alpha * (temperature - self.threshold)).min(1.0);
                            *forcing.value_mut(sector, region) += affected * proxy_value;
                        }
                    }
                    true
                },
            );
            normalize_in_place(
                forcing,
                &self.sectors,
                &self.region_map,
                &self.proxy,
                (0.0, 1.0),
            );
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileVariable, IsorasterConfig};
    use gridforce_core::raster::MemorySource;
    use is_close::is_close;
    use std::collections::BTreeMap;

    fn config() -> HeatLaborConfig {
        HeatLaborConfig {
            day_temperature: FileVariable {
                file: "tasmax.nc".to_string(),
                variable: "tasmax".to_string(),
            },
            threshold: 27.0,
            proxy: FileVariable {
                file: "gdp.nc".to_string(),
                variable: "gdp".to_string(),
            },
            isoraster: IsorasterConfig {
                variable: "iso".to_string(),
                index: "index".to_string(),
            },
            chunk_size: 10,
            time_shift: 0,
            sectors: BTreeMap::from([("AGRI".to_string(), 0.5), ("CONS".to_string(), 2.0)]),
        }
    }

    fn axis_values() -> Vec<f64> {
        vec![0.5, 1.5, 2.5, 3.5]
    }

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
        MemorySource::new("gdp.nc")
            .with_axis("lat", axis_values())
            .with_axis("lon", axis_values())
            .with_f32("gdp", vec![4, 4], vec![1.0; 16])
    }

    fn temperature_source(temperatures: &[f32]) -> MemorySource {
        let steps = temperatures.len();
        let values: Vec<f32> = temperatures
            .iter()
            .flat_map(|&t| std::iter::repeat(t).take(16))
            .collect();
        MemorySource::new("tasmax.nc")
            .with_axis("time", (0..steps).map(|t| t as f64).collect())
            .with_attribute("time", "units", "days since 2000-01-01")
            .with_axis("lat", axis_values())
            .with_axis("lon", axis_values())
            .with_f32("tasmax", vec![steps, 4, 4], values)
    }

    fn template() -> AgentForcing {
        AgentForcing::from_names(["AGRI", "CONS", "MANU"], ["USA", "CHN"])
    }

    #[test]
    fn productivity_drops_above_threshold() {
        let mut heat = HeatLaborProductivity::new(
            &config(),
            template(),
            &iso_source(),
            &proxy_source(),
        )
        .unwrap();
        // one degree above threshold everywhere
        let series = heat.generate(&temperature_source(&[28.0])).unwrap();
        let time = series.sorted_times()[0];
        let forcing = series.get(time).unwrap();
        for region in ["USA", "CHN"] {
            // alpha 0.5: half the labor affected
            assert!(is_close!(
                forcing.value_by_name("AGRI", region).unwrap() as f64,
                0.5
            ));
            // alpha 2.0 saturates at full impact
            assert!(is_close!(
                forcing.value_by_name("CONS", region).unwrap() as f64,
                0.0
            ));
        }
        // unselected sector is untouched
        assert_eq!(forcing.value_by_name("MANU", "USA").unwrap(), 0.0);
    }

    #[test]
    fn cool_days_leave_productivity_untouched() {
        let mut heat = HeatLaborProductivity::new(
            &config(),
            template(),
            &iso_source(),
            &proxy_source(),
        )
        .unwrap();
        let series = heat.generate(&temperature_source(&[20.0])).unwrap();
        let time = series.sorted_times()[0];
        let forcing = series.get(time).unwrap();
        for sector in ["AGRI", "CONS"] {
            for region in ["USA", "CHN"] {
                assert!(is_close!(
                    forcing.value_by_name(sector, region).unwrap() as f64,
                    1.0
                ));
            }
        }
    }

    #[test]
    fn each_step_is_normalized_independently() {
        let mut heat = HeatLaborProductivity::new(
            &config(),
            template(),
            &iso_source(),
            &proxy_source(),
        )
        .unwrap();
        let series = heat.generate(&temperature_source(&[28.0, 20.0])).unwrap();
        let times = series.sorted_times();
        let hot = series.get(times[0]).unwrap();
        let cool = series.get(times[1]).unwrap();
        assert!(is_close!(hot.value_by_name("AGRI", "USA").unwrap() as f64, 0.5));
        assert!(is_close!(cool.value_by_name("AGRI", "USA").unwrap() as f64, 1.0));
    }
}
