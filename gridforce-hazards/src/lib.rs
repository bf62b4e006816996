//! Hazard modules turning gridded geophysical fields into
//! [`ForcingSeries`](gridforce_core::forcing::ForcingSeries) of
//! sector/region forcing matrices.
//!
//! Each module holds its collaborators — the region map, the proxy
//! aggregate and the canonical forcing template — as fields and streams
//! its hazard variable in time chunks through the core reduction engine.

pub mod config;
pub mod flooding;
pub mod heat_labor;

use gridforce_core::errors::GridForceResult;
use gridforce_core::forcing::{AgentForcing, ForcingSeries};
use gridforce_core::raster::RasterSource;

pub use flooding::Flooding;
pub use heat_labor::HeatLaborProductivity;

/// A hazard module producing one forcing series per hazard dataset.
///
/// `generate` may be called repeatedly for consecutive datasets (e.g.
/// one file per year); modules carrying state across calls (flood
/// recovery) require consecutive datasets to share grid geometry.
pub trait Hazard {
    fn generate(
        &mut self,
        forcing: &dyn RasterSource,
    ) -> GridForceResult<ForcingSeries<AgentForcing>>;
}
