//! Enumeration of candidate configurations.
//!
//! Inner dimensions only make sense once the outer ones are known: block
//! height legality depends on the group size and layout, and the range of
//! the extra parameter depends on the concrete block height. The strategy is
//! therefore chosen by how many dimensions, counted from the left, are free.

use crate::executor::DeviceCapabilities;
use anyhow::{bail, Result};
use gemmtune_kernels::config::{Configuration, KernelParams, ProblemShape};
use gemmtune_kernels::matmul::MatmulKernelFamily;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which parameter dimensions are fixed, and to what.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumerationStrategy {
    AllFixed(KernelParams),
    ExtraFree {
        group_size: usize,
        block_height: usize,
    },
    BlockAndExtraFree {
        group_size: usize,
    },
    AllFree,
}

impl EnumerationStrategy {
    /// Pick the strategy for a set of optionally fixed dimensions.
    ///
    /// A dimension may only be fixed when every dimension to its left is.
    pub fn from_dimensions(
        group_size: Option<usize>,
        block_height: Option<usize>,
        extra_param: Option<usize>,
    ) -> Result<Self> {
        match (group_size, block_height, extra_param) {
            (Some(g), Some(b), Some(x)) => Ok(Self::AllFixed(KernelParams::new(g, b, x))),
            (Some(group_size), Some(block_height), None) => Ok(Self::ExtraFree {
                group_size,
                block_height,
            }),
            (Some(group_size), None, None) => Ok(Self::BlockAndExtraFree { group_size }),
            (None, None, None) => Ok(Self::AllFree),
            (None, Some(_), _) => bail!("group size must be specified with block height"),
            (_, None, Some(_)) => {
                bail!("group size and block height must be specified with extra parameter")
            }
        }
    }
}

/// How much of the extra-parameter range the all-free scan sweeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    #[default]
    Exhaustive,
    /// Only extra parameter 0 for every (group size, block height).
    Representative,
}

/// Hardware-derived bounds for the all-free scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Overrides the kernel family's own group size ceiling.
    pub max_group_size: Option<usize>,
    /// The descending scan stops above this group size.
    pub group_size_floor: usize,
    /// Group size probed unconditionally after the descending scan.
    pub probe_group_size: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_group_size: None,
            group_size_floor: 8,
            probe_group_size: 8,
        }
    }
}

pub struct ConfigurationSpace<'a> {
    family: &'a dyn MatmulKernelFamily,
    shape: ProblemShape,
    limits: SearchLimits,
    mode: SearchMode,
}

impl<'a> ConfigurationSpace<'a> {
    pub fn new(family: &'a dyn MatmulKernelFamily, shape: ProblemShape) -> Self {
        Self {
            family,
            shape,
            limits: SearchLimits::default(),
            mode: SearchMode::default(),
        }
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Produce the candidate set for `strategy`, in benchmark order.
    ///
    /// Only the all-free strategy queries the device.
    pub fn enumerate(
        &self,
        strategy: EnumerationStrategy,
        device: &dyn DeviceCapabilities,
    ) -> Result<Vec<Configuration>> {
        let mut candidates = Vec::new();
        match strategy {
            EnumerationStrategy::AllFixed(params) => self.push_valid(params, &mut candidates),
            EnumerationStrategy::ExtraFree {
                group_size,
                block_height,
            } => self.sweep_extra(group_size, block_height, &mut candidates),
            EnumerationStrategy::BlockAndExtraFree { group_size } => {
                for block_height in self.block_heights() {
                    self.sweep_extra(group_size, block_height, &mut candidates);
                }
            }
            EnumerationStrategy::AllFree => self.scan_all_free(device, &mut candidates)?,
        }

        info!(
            kernel = self.family.name(),
            shape = %self.shape,
            strategy = ?strategy,
            candidates = candidates.len(),
            "enumerated configuration space"
        );
        Ok(candidates)
    }

    /// Ceiling for the descending group size scan.
    pub fn effective_max_group_size(&self, device: &dyn DeviceCapabilities) -> Result<usize> {
        let device_max = device.max_work_group_size()?;
        let possible = integer_sqrt(device_max);
        let configured = self
            .limits
            .max_group_size
            .unwrap_or_else(|| self.family.max_group_size());
        Ok(configured.min(possible))
    }

    fn scan_all_free(
        &self,
        device: &dyn DeviceCapabilities,
        candidates: &mut Vec<Configuration>,
    ) -> Result<()> {
        let max_group_size = self.effective_max_group_size(device)?;

        // Accept the largest group size that yields anything at all.
        for group_size in (self.limits.group_size_floor + 1..=max_group_size).rev() {
            let before = candidates.len();
            self.sweep_blocks(group_size, candidates);
            if candidates.len() > before {
                debug!(group_size, found = candidates.len() - before, "largest feasible group size");
                break;
            }
        }

        let before = candidates.len();
        self.sweep_blocks(self.limits.probe_group_size, candidates);
        debug!(
            group_size = self.limits.probe_group_size,
            found = candidates.len() - before,
            "probe group size"
        );
        Ok(())
    }

    fn sweep_blocks(&self, group_size: usize, candidates: &mut Vec<Configuration>) {
        for block_height in self.block_heights() {
            match self.mode {
                SearchMode::Exhaustive => self.sweep_extra(group_size, block_height, candidates),
                SearchMode::Representative => self.push_valid(
                    KernelParams::new(group_size, block_height, 0),
                    candidates,
                ),
            }
        }
    }

    fn sweep_extra(
        &self,
        group_size: usize,
        block_height: usize,
        candidates: &mut Vec<Configuration>,
    ) {
        let variations = self
            .family
            .total_variations(&self.shape, group_size, block_height);
        for extra_param in 0..variations {
            self.push_valid(
                KernelParams::new(group_size, block_height, extra_param),
                candidates,
            );
        }
    }

    fn push_valid(&self, params: KernelParams, candidates: &mut Vec<Configuration>) {
        if let Some(config) = self.family.validate(&self.shape, params) {
            candidates.push(config);
        }
    }

    fn block_heights(&self) -> std::ops::RangeInclusive<usize> {
        self.family.vector_width()..=self.family.max_block_height()
    }
}

fn integer_sqrt(value: usize) -> usize {
    let fits = |root: usize| root.checked_mul(root).is_some_and(|square| square <= value);
    let mut root = (value as f64).sqrt() as usize;
    while root > 0 && !fits(root) {
        root -= 1;
    }
    while fits(root + 1) {
        root += 1;
    }
    root
}
