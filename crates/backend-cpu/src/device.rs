//! Device selection and capabilities of the host CPU.

use anyhow::{anyhow, bail, Result};
use gemmtune_autotune::executor::DeviceCapabilities;
use std::fmt;
use std::str::FromStr;

/// Work-group ceiling reported for the host CPU.
pub const CPU_MAX_WORK_GROUP_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Accelerator,
}

impl DeviceKind {
    fn prefix(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
            DeviceKind::Accelerator => "acc",
        }
    }
}

/// `cpu`, `gpu` or `acc`, optionally followed by a device number (`gpu1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceSelector {
    pub kind: DeviceKind,
    pub index: usize,
}

impl FromStr for DeviceSelector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = [DeviceKind::Cpu, DeviceKind::Gpu, DeviceKind::Accelerator]
            .into_iter()
            .find(|kind| s.starts_with(kind.prefix()))
            .ok_or_else(|| anyhow!("invalid device {s}"))?;
        let suffix = &s[kind.prefix().len()..];
        let index = if suffix.is_empty() {
            0
        } else {
            suffix
                .parse()
                .map_err(|_| anyhow!("invalid device number in {s}"))?
        };
        Ok(Self { kind, index })
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.index)
    }
}

#[derive(Debug, Clone)]
pub struct CpuDevice {
    name: String,
    compute_units: usize,
    max_work_group_size: usize,
}

impl CpuDevice {
    pub fn new(name: impl Into<String>, compute_units: usize, max_work_group_size: usize) -> Self {
        Self {
            name: name.into(),
            compute_units: compute_units.max(1),
            max_work_group_size,
        }
    }

    /// The host, with one compute unit per rayon worker.
    pub fn host() -> Self {
        Self::new("cpu0", rayon::current_num_threads(), CPU_MAX_WORK_GROUP_SIZE)
    }

    pub fn compute_units(&self) -> usize {
        self.compute_units
    }
}

impl DeviceCapabilities for CpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_work_group_size(&self) -> Result<usize> {
        if self.max_work_group_size == 0 {
            bail!("device {} reports no usable work-group size", self.name);
        }
        Ok(self.max_work_group_size)
    }
}

/// Devices available to this process.
#[derive(Debug, Clone)]
pub struct Platform {
    devices: Vec<(DeviceKind, CpuDevice)>,
}

impl Platform {
    pub fn host() -> Self {
        Self {
            devices: vec![(DeviceKind::Cpu, CpuDevice::host())],
        }
    }

    pub fn with_devices(devices: Vec<(DeviceKind, CpuDevice)>) -> Self {
        Self { devices }
    }

    pub fn select(&self, selector: DeviceSelector) -> Result<&CpuDevice> {
        self.devices
            .iter()
            .filter(|(kind, _)| *kind == selector.kind)
            .nth(selector.index)
            .map(|(_, device)| device)
            .ok_or_else(|| {
                let available: Vec<&str> = self.devices.iter().map(|(_, d)| d.name()).collect();
                anyhow!(
                    "no device {} on this platform (available: {})",
                    selector,
                    available.join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_and_index() {
        let sel: DeviceSelector = "gpu2".parse().unwrap();
        assert_eq!(sel.kind, DeviceKind::Gpu);
        assert_eq!(sel.index, 2);
        let sel: DeviceSelector = "cpu".parse().unwrap();
        assert_eq!(sel, DeviceSelector { kind: DeviceKind::Cpu, index: 0 });
        assert_eq!("acc".parse::<DeviceSelector>().unwrap().to_string(), "acc0");
        assert!("tpu".parse::<DeviceSelector>().is_err());
        assert!("cpuX".parse::<DeviceSelector>().is_err());
    }

    #[test]
    fn host_platform_has_one_cpu() {
        let platform = Platform::host();
        let cpu = platform.select("cpu".parse().unwrap()).unwrap();
        assert!(cpu.compute_units() >= 1);
        assert_eq!(cpu.max_work_group_size().unwrap(), CPU_MAX_WORK_GROUP_SIZE);
        assert!(platform.select("gpu".parse().unwrap()).is_err());
        assert!(platform.select("cpu1".parse().unwrap()).is_err());
    }

    #[test]
    fn selects_by_kind_then_index() {
        let platform = Platform::with_devices(vec![
            (DeviceKind::Cpu, CpuDevice::new("host", 4, 1024)),
            (DeviceKind::Gpu, CpuDevice::new("first", 8, 256)),
            (DeviceKind::Gpu, CpuDevice::new("second", 16, 512)),
        ]);
        let gpu1 = platform.select("gpu1".parse().unwrap()).unwrap();
        assert_eq!(gpu1.name(), "second");
        assert_eq!(gpu1.max_work_group_size().unwrap(), 512);
        assert_eq!(platform.select("gpu".parse().unwrap()).unwrap().name(), "first");
        assert_eq!(platform.select("cpu0".parse().unwrap()).unwrap().compute_units(), 4);
        assert!(platform.select("gpu2".parse().unwrap()).is_err());
        assert!(platform.select("acc".parse().unwrap()).is_err());
    }

    #[test]
    fn zero_work_group_size_is_a_device_error() {
        let device = CpuDevice::new("broken", 1, 0);
        assert!(device.max_work_group_size().is_err());
    }
}
