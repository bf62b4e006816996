//! Cell-wise reduction of one hazard time slice into per-region forcing.
//!
//! Every hazard module follows the same contract: accumulate
//! `weight(hazard) * proxy` per region over the common grid of
//! (iso-raster, proxy, hazard slice), then normalize each region's sum by
//! its total proxy mass into the fraction of exposed economic value left
//! unaffected, clamped to the hazard's valid range. That keeps all
//! hazards on a consistent scale combinable by
//! [`AgentForcing`](crate::forcing::AgentForcing).

use crate::errors::GridForceResult;
use crate::forcing::{AgentForcing, ForcingValue};
use crate::grid::{common_grid, GeoGrid};
use crate::lockstep::{traverse3, traverse4_mut};
use crate::raster::is_missing;
use crate::region::{ProxyField, RegionMap};
use ndarray::{ArrayView2, ArrayViewMut2};

/// Accumulate proxy-weighted hazard deltas per region label.
///
/// Cells are skipped when the hazard value is missing (NaN or above the
/// sentinel threshold), the proxy is non-positive or NaN, or the cell has
/// no assigned region. The weight closure turns a hazard value into the
/// affected fraction and may return `None` to skip the cell.
pub fn accumulate<W>(
    region_map: &RegionMap,
    proxy: &ProxyField,
    hazard: ArrayView2<f32>,
    hazard_grid: &GeoGrid,
    mut weight: W,
) -> GridForceResult<Vec<f64>>
where
    W: FnMut(f32) -> Option<f32>,
{
    let mut region_forcing = vec![0.0f64; region_map.label_count()];
    let common = common_grid(&[region_map.grid(), proxy.grid(), hazard_grid])?;
    traverse3(
        common.windows[0].apply(region_map.cells()),
        common.windows[1].apply(proxy.values()),
        common.windows[2].apply(hazard),
        |_, _, &label, &proxy_value, &hazard_value| {
            if is_missing(hazard_value)
                || proxy_value <= 0.0
                || proxy_value.is_nan()
                || label < 0
                || label as usize >= region_forcing.len()
            {
                return true;
            }
            if let Some(affected) = weight(hazard_value) {
                region_forcing[label as usize] += (affected * proxy_value) as f64;
            }
            true
        },
    );
    Ok(region_forcing)
}

/// Like [`accumulate`], with an additional aligned state raster carried
/// across time steps (e.g. flood recovery).
///
/// The state raster is windowed through the same common grid and handed
/// to the weight closure mutably per cell.
pub fn accumulate_with_state<W>(
    region_map: &RegionMap,
    proxy: &ProxyField,
    hazard: ArrayView2<f32>,
    hazard_grid: &GeoGrid,
    state: ArrayViewMut2<f32>,
    state_grid: &GeoGrid,
    mut weight: W,
) -> GridForceResult<Vec<f64>>
where
    W: FnMut(f32, &mut f32) -> Option<f32>,
{
    let mut region_forcing = vec![0.0f64; region_map.label_count()];
    let common = common_grid(&[region_map.grid(), proxy.grid(), hazard_grid, state_grid])?;
    traverse4_mut(
        common.windows[0].apply(region_map.cells()),
        common.windows[1].apply(proxy.values()),
        common.windows[2].apply(hazard),
        common.windows[3].apply_mut(state),
        |_, _, &label, &proxy_value, &hazard_value, state_value| {
            if is_missing(hazard_value)
                || proxy_value <= 0.0
                || proxy_value.is_nan()
                || label < 0
                || label as usize >= region_forcing.len()
            {
                return true;
            }
            if let Some(affected) = weight(hazard_value, state_value) {
                region_forcing[label as usize] += (affected * proxy_value) as f64;
            }
            true
        },
    );
    Ok(region_forcing)
}

/// Normalize accumulated sums into the forcing matrix.
///
/// For every region with positive proxy total:
/// `forcing(sector, region) = (total - accumulated) / total`, clamped to
/// `range` — the fraction of exposed value left unaffected. Zero-proxy
/// regions are skipped.
pub fn normalize_into(
    forcing: &mut AgentForcing,
    sectors: &[usize],
    region_map: &RegionMap,
    proxy: &ProxyField,
    region_forcing: &[f64],
    range: (ForcingValue, ForcingValue),
) {
    for label in 0..region_map.label_count() {
        let Some(region) = region_map.canonical_region(label) else {
            continue;
        };
        let total = proxy.total(label);
        if total <= 0.0 {
            continue;
        }
        let value = (((total - region_forcing[label]) / total) as ForcingValue)
            .clamp(range.0, range.1);
        for &sector in sectors {
            forcing.set(sector, region, value);
        }
    }
}

/// Normalize a forcing whose cells hold raw accumulated sums.
///
/// Used by hazards that accumulate per-sector directly into the matrix:
/// each selected `(sector, region)` cell is rewritten from its
/// accumulated sum to `(total - sum) / total`, clamped to `range`.
pub fn normalize_in_place(
    forcing: &mut AgentForcing,
    sectors: &[usize],
    region_map: &RegionMap,
    proxy: &ProxyField,
    range: (ForcingValue, ForcingValue),
) {
    for label in 0..region_map.label_count() {
        let Some(region) = region_map.canonical_region(label) else {
            continue;
        };
        let total = proxy.total(label);
        if total <= 0.0 {
            continue;
        }
        for &sector in sectors {
            let accumulated = forcing.value(sector, region) as f64;
            let value =
                (((total - accumulated) / total) as ForcingValue).clamp(range.0, range.1);
            forcing.set(sector, region, value);
        }
    }
}
