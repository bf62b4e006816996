//! gridforce converts gridded geophysical hazard fields (flood fraction,
//! wind speed, temperature) into economic forcing time series indexed by
//! (sector, region) for consumption by a downstream economic simulation.
//!
//! The heavy lifting lives in [`gridforce_core`]: grid geometry and
//! alignment, zero-copy windowed raster views, region/proxy ingestion and
//! the sector/region forcing matrix. [`gridforce_hazards`] builds concrete
//! hazard modules (flooding, heat labor productivity) on top of it.

pub use gridforce_core::{errors, forcing, grid, lockstep, raster, reduction, region, time};
pub use gridforce_hazards as hazards;
