//! Sector/region forcing matrices and their time-indexed series.
//!
//! One canonical [`AgentForcing`] template is built per run from the
//! sector and region name tables; every other forcing instance is cloned
//! from it, sharing the underlying name-to-index mappings. Two forcings
//! can only be combined when they share the *identical* mappings, not
//! merely equal ones, which catches configuration defects where a hazard
//! module builds its own tables.

use crate::errors::{GridForceError, GridForceResult};
use crate::time::ReferenceTime;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Scalar type of forcing values.
pub type ForcingValue = f32;

/// Ordered name table with a name-to-index lookup.
///
/// Shared via [`Arc`] between all forcing instances of a run; pointer
/// identity of the `Arc` establishes relatedness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMapping {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl IndexMapping {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Element-wise operator used when combining forcings.
///
/// `Add` treats each forcing as a retained fraction: combining clamps
/// the total loss at 100 %, `max(a + b - 1, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    Add,
    Max,
    Min,
    Mult,
}

impl FromStr for Combination {
    type Err = GridForceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Combination::Add),
            "max" => Ok(Combination::Max),
            "min" => Ok(Combination::Min),
            "mult" => Ok(Combination::Mult),
            _ => Err(GridForceError::Error(format!(
                "Unknown forcing combination '{}'",
                s
            ))),
        }
    }
}

/// A value that can be combined element-wise and stored in a
/// [`ForcingSeries`].
pub trait Forcing: Clone {
    fn include(&mut self, other: &Self, combination: Combination) -> GridForceResult<()>;
}

/// Dense sector/region matrix of forcing values at one point in time.
///
/// Stored row-major by sector. Clones share the sector/region mappings.
#[derive(Debug, Clone)]
pub struct AgentForcing {
    sectors: Arc<IndexMapping>,
    regions: Arc<IndexMapping>,
    data: Vec<ForcingValue>,
}

impl AgentForcing {
    /// Build the canonical zero-initialized template for a run.
    pub fn new(sectors: Arc<IndexMapping>, regions: Arc<IndexMapping>) -> Self {
        let data = vec![0.0; sectors.len() * regions.len()];
        Self {
            sectors,
            regions,
            data,
        }
    }

    /// Convenience constructor building fresh mappings from name lists.
    pub fn from_names<S, R>(sectors: S, regions: R) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self::new(
            Arc::new(IndexMapping::new(sectors)),
            Arc::new(IndexMapping::new(regions)),
        )
    }

    pub fn sectors(&self) -> &Arc<IndexMapping> {
        &self.sectors
    }

    pub fn regions(&self) -> &Arc<IndexMapping> {
        &self.regions
    }

    pub fn value(&self, sector: usize, region: usize) -> ForcingValue {
        self.data[sector * self.regions.len() + region]
    }

    pub fn value_mut(&mut self, sector: usize, region: usize) -> &mut ForcingValue {
        let columns = self.regions.len();
        &mut self.data[sector * columns + region]
    }

    pub fn set(&mut self, sector: usize, region: usize, value: ForcingValue) {
        *self.value_mut(sector, region) = value;
    }

    pub fn value_by_name(&self, sector: &str, region: &str) -> Option<ForcingValue> {
        let sector = self.sectors.index_of(sector)?;
        let region = self.regions.index_of(region)?;
        Some(self.value(sector, region))
    }

    /// Set every cell to the same value.
    pub fn fill(&mut self, value: ForcingValue) {
        self.data.fill(value);
    }

    /// Clamp every cell into `[lower, upper]`.
    pub fn clamp(&mut self, lower: ForcingValue, upper: ForcingValue) {
        for value in &mut self.data {
            *value = value.clamp(lower, upper);
        }
    }

    pub fn data(&self) -> &[ForcingValue] {
        &self.data
    }

    /// Whether two forcings share the identical sector/region mappings.
    pub fn is_related(&self, other: &AgentForcing) -> bool {
        Arc::ptr_eq(&self.sectors, &other.sectors) && Arc::ptr_eq(&self.regions, &other.regions)
    }
}

impl Forcing for AgentForcing {
    fn include(&mut self, other: &Self, combination: Combination) -> GridForceResult<()> {
        if !self.is_related(other) {
            return Err(GridForceError::UnrelatedForcings);
        }
        for (value, &other_value) in self.data.iter_mut().zip(other.data.iter()) {
            *value = match combination {
                Combination::Add => (*value + other_value - 1.0).max(0.0),
                Combination::Max => value.max(other_value),
                Combination::Min => value.min(other_value),
                Combination::Mult => *value * other_value,
            };
        }
        Ok(())
    }
}

/// Sparse mapping from reference-time offsets to forcing values.
///
/// Fresh entries are initialized from the series' base forcing; inserting
/// at an already-present time fails.
#[derive(Debug, Clone)]
pub struct ForcingSeries<F: Forcing> {
    data: HashMap<i64, F>,
    pub base: F,
    pub reference_time: ReferenceTime,
}

impl<F: Forcing> ForcingSeries<F> {
    pub fn new(base: F, reference_time: ReferenceTime) -> Self {
        Self {
            data: HashMap::new(),
            base,
            reference_time,
        }
    }

    /// Insert a fresh entry at an absolute unix timestamp, cloned from
    /// the base forcing.
    pub fn insert(&mut self, time: i64) -> GridForceResult<&mut F> {
        let key = self.reference_time.reference(time);
        match self.data.entry(key) {
            Entry::Occupied(_) => Err(GridForceError::TimeAlreadySet(time)),
            Entry::Vacant(entry) => Ok(entry.insert(self.base.clone())),
        }
    }

    pub fn get(&self, time: i64) -> Option<&F> {
        self.data.get(&self.reference_time.reference(time))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Absolute timestamps of all entries, ascending.
    pub fn sorted_times(&self) -> Vec<i64> {
        let mut times: Vec<i64> = self
            .data
            .keys()
            .map(|&key| self.reference_time.unreference(key))
            .collect();
        times.sort_unstable();
        times
    }

    /// Iterate entries as `(absolute time, forcing)` in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &F)> {
        self.data
            .iter()
            .map(|(&key, forcing)| (self.reference_time.unreference(key), forcing))
    }

    /// Merge another series into this one.
    ///
    /// The reference-time units must match; entries are re-keyed through
    /// absolute time, so differing epochs are fine. Missing entries are
    /// copied, present ones combined element-wise.
    pub fn include(
        &mut self,
        other: &ForcingSeries<F>,
        combination: Combination,
    ) -> GridForceResult<()> {
        if !self.reference_time.compatible_with(&other.reference_time) {
            return Err(GridForceError::IncompatibleAccuracies(
                self.reference_time.unit().seconds_per_unit(),
                other.reference_time.unit().seconds_per_unit(),
            ));
        }
        for (&other_key, other_forcing) in &other.data {
            let time = other.reference_time.unreference(other_key);
            match self.data.entry(self.reference_time.reference(time)) {
                Entry::Vacant(entry) => {
                    entry.insert(other_forcing.clone());
                }
                Entry::Occupied(mut entry) => {
                    entry.get_mut().include(other_forcing, combination)?;
                }
            }
        }
        Ok(())
    }
}
