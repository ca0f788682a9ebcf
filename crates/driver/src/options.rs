//! Tuning options as given on the command line, and their validation.

use gemmtune_autotune::bench::BenchOptions;
use gemmtune_autotune::space::SearchMode;
use gemmtune_autotune::tuner::TuningRequest;
use gemmtune_backend_cpu::device::DeviceSelector;
use gemmtune_kernels::config::{Layout, ProblemShape, MAX_GROUP_SIZE, VECTOR_WIDTH};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("invalid device {0}")]
    InvalidDevice(String),
    #[error("matrix dimension N must be specified")]
    MissingN,
    #[error("all matrix dimensions M, N and K must be specified")]
    PartialDimensions,
    #[error("matrix dimension {0} must be positive")]
    ZeroDimension(char),
    #[error("matrix dimension {name} must be multiple of {width}")]
    NotVectorMultiple { name: char, width: usize },
    #[error("group size must be specified with block height")]
    BlockHeightWithoutGroupSize,
    #[error("group size and block height must be specified with extra parameter")]
    ExtraParamWithoutBlocking,
    #[error("work item group size must be a number from 1 to {max} inclusive")]
    GroupSizeOutOfRange { max: usize },
    #[error("inner blocking height must be multiple of {width} when matrix A is transposed")]
    TransposedBlockHeight { width: usize },
    #[error("invalid inner blocking height")]
    BlockHeightTooSmall,
    #[error("nested optimization will find optimal blocking")]
    NestedWithFixedBlocking,
    #[error("number of trials must be at least 1")]
    ZeroTrials,
    #[error("topN must be at least 1")]
    ZeroTopN,
}

/// Every violation found in one set of options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.0))]
pub struct OptionErrors(pub Vec<OptionError>);

fn render(errors: &[OptionError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\nerror: ")
}

impl OptionErrors {
    pub fn contains(&self, error: &OptionError) -> bool {
        self.0.contains(error)
    }
}

/// Unvalidated options; `None` means the option was not given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuneArgs {
    pub device: Option<String>,
    pub kernel: String,
    pub m: Option<usize>,
    pub n: Option<usize>,
    pub k: Option<usize>,
    pub group_size: Option<usize>,
    pub block_height: Option<usize>,
    pub extra_param: Option<usize>,
    pub trials: usize,
    pub top_n: Option<usize>,
    pub nested: bool,
    pub transpose_a: bool,
    pub transpose_b: bool,
    pub transfer_to_device: bool,
    pub transfer_from_device: bool,
    pub paranoid_check: bool,
    pub vector_hint: bool,
    pub print_matrix: bool,
    pub quick_scan: bool,
    pub cache: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

impl Default for TuneArgs {
    fn default() -> Self {
        Self {
            device: None,
            kernel: "tiled".to_string(),
            m: None,
            n: None,
            k: None,
            group_size: None,
            block_height: None,
            extra_param: None,
            trials: 1,
            top_n: None,
            nested: false,
            transpose_a: false,
            transpose_b: false,
            transfer_to_device: false,
            transfer_from_device: false,
            paranoid_check: false,
            vector_hint: true,
            print_matrix: false,
            quick_scan: false,
            cache: None,
            json: None,
        }
    }
}

/// Validated options, ready for a [`crate::session::TuningSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuneOptions {
    pub device: DeviceSelector,
    pub kernel: String,
    pub request: TuningRequest,
    pub vector_hint: bool,
    pub cache: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

impl TuneArgs {
    /// Check every option and report all violations at once.
    pub fn validate(self) -> Result<TuneOptions, OptionErrors> {
        let mut errors = Vec::new();

        let device = match self.device.as_deref() {
            Some(name) => name.parse::<DeviceSelector>().ok().or_else(|| {
                errors.push(OptionError::InvalidDevice(name.to_string()));
                None
            }),
            None => {
                errors.push(OptionError::InvalidDevice("<unspecified>".to_string()));
                None
            }
        };

        let dims = match (self.m, self.n, self.k) {
            (_, None, _) => {
                errors.push(OptionError::MissingN);
                None
            }
            (None, Some(n), None) => Some((n, n, n)),
            (Some(m), Some(n), Some(k)) => Some((m, n, k)),
            _ => {
                errors.push(OptionError::PartialDimensions);
                None
            }
        };
        if let Some((m, n, k)) = dims {
            for (name, value) in [('N', n), ('M', m), ('K', k)] {
                if value == 0 {
                    errors.push(OptionError::ZeroDimension(name));
                } else if value % VECTOR_WIDTH != 0 {
                    errors.push(OptionError::NotVectorMultiple {
                        name,
                        width: VECTOR_WIDTH,
                    });
                }
            }
        }

        if self.group_size.is_none() && self.block_height.is_some() {
            errors.push(OptionError::BlockHeightWithoutGroupSize);
        }
        if self.extra_param.is_some() && (self.group_size.is_none() || self.block_height.is_none())
        {
            errors.push(OptionError::ExtraParamWithoutBlocking);
        }
        if let Some(g) = self.group_size {
            if !(1..=MAX_GROUP_SIZE).contains(&g) {
                errors.push(OptionError::GroupSizeOutOfRange {
                    max: MAX_GROUP_SIZE,
                });
            }
        }
        if let Some(b) = self.block_height {
            if self.transpose_a && b % VECTOR_WIDTH != 0 {
                errors.push(OptionError::TransposedBlockHeight {
                    width: VECTOR_WIDTH,
                });
            }
            if b < VECTOR_WIDTH {
                errors.push(OptionError::BlockHeightTooSmall);
            }
        }
        if self.nested
            && (self.group_size.is_some() || self.block_height.is_some() || self.extra_param.is_some())
        {
            errors.push(OptionError::NestedWithFixedBlocking);
        }
        if self.trials == 0 {
            errors.push(OptionError::ZeroTrials);
        }
        if self.top_n == Some(0) {
            errors.push(OptionError::ZeroTopN);
        }

        let (Some(device), Some((m, n, k)), true) = (device, dims, errors.is_empty()) else {
            return Err(OptionErrors(errors));
        };

        let shape = ProblemShape::new(m, n, k)
            .with_layout(Layout::new(self.transpose_a, self.transpose_b));
        let request = TuningRequest {
            group_size: self.group_size,
            block_height: self.block_height,
            extra_param: self.extra_param,
            nested: self.nested,
            mode: if self.quick_scan {
                SearchMode::Representative
            } else {
                SearchMode::Exhaustive
            },
            bench: BenchOptions {
                trials: self.trials,
                top_n: self.top_n,
                transfer_to_device: self.transfer_to_device,
                transfer_from_device: self.transfer_from_device,
                paranoid_check: self.paranoid_check,
                verbose: self.print_matrix,
            },
            ..TuningRequest::new(shape)
        };

        Ok(TuneOptions {
            device,
            kernel: self.kernel,
            request,
            vector_hint: self.vector_hint,
            cache: self.cache,
            json: self.json,
        })
    }
}
