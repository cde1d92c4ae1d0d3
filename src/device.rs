use std::fmt;

use clap::ValueEnum;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider,
    ExecutionProviderDispatch,
};
use serde::Serialize;

use crate::errors::{BgRemovalError, Result};

/// Compute device the model session runs on.
///
/// `Mps` is the Apple accelerator, reached through the CoreML execution provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Mps,
    Cuda,
    Cpu,
}

/// Probe order for `auto`; CPU is always last.
pub const DEVICE_PRIORITY: [Device; 3] = [Device::Mps, Device::Cuda, Device::Cpu];

impl Device {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mps => "mps",
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }

    /// Execution providers to register for this device. Accelerators fail the
    /// session build instead of silently falling back to CPU.
    pub fn execution_providers(self) -> Vec<ExecutionProviderDispatch> {
        match self {
            Self::Mps => vec![CoreMLExecutionProvider::default().build().error_on_failure()],
            Self::Cuda => vec![CUDAExecutionProvider::default().build().error_on_failure()],
            Self::Cpu => vec![CPUExecutionProvider::default().build()],
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Mps,
}

impl DevicePreference {
    const fn forced(self) -> Option<Device> {
        match self {
            Self::Auto => None,
            Self::Cpu => Some(Device::Cpu),
            Self::Cuda => Some(Device::Cuda),
            Self::Mps => Some(Device::Mps),
        }
    }
}

/// Runtime availability of a device's execution provider.
///
/// A provider that was not compiled into ONNX Runtime reports unavailable.
pub fn provider_available(device: Device) -> bool {
    let available = match device {
        Device::Mps => CoreMLExecutionProvider::default().is_available(),
        Device::Cuda => CUDAExecutionProvider::default().is_available(),
        Device::Cpu => return true,
    };
    available.unwrap_or_else(|err| {
        tracing::debug!(device = %device, error = %err, "execution provider probe failed");
        false
    })
}

/// Picks the device to run on.
///
/// `Auto` walks `DEVICE_PRIORITY` and takes the first available device. A forced
/// device must be available, otherwise startup fails.
pub fn select_device(
    preference: DevicePreference,
    is_available: impl Fn(Device) -> bool,
) -> Result<Device> {
    match preference.forced() {
        Some(Device::Cpu) => Ok(Device::Cpu),
        Some(device) if is_available(device) => Ok(device),
        Some(device) => Err(BgRemovalError::configuration(format!(
            "requested device `{device}` is not available"
        ))),
        None => Ok(DEVICE_PRIORITY
            .into_iter()
            .find(|&device| device == Device::Cpu || is_available(device))
            .unwrap_or(Device::Cpu)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_prefers_accelerator() {
        let device = select_device(DevicePreference::Auto, |_| true).unwrap();
        assert_eq!(device, Device::Mps);
    }

    #[test]
    fn test_auto_falls_back_to_gpu_then_cpu() {
        let device = select_device(DevicePreference::Auto, |d| d == Device::Cuda).unwrap();
        assert_eq!(device, Device::Cuda);

        let device = select_device(DevicePreference::Auto, |_| false).unwrap();
        assert_eq!(device, Device::Cpu);
    }

    #[test]
    fn test_forced_device() {
        assert_eq!(
            select_device(DevicePreference::Cpu, |_| true).unwrap(),
            Device::Cpu
        );
        assert_eq!(
            select_device(DevicePreference::Cuda, |d| d == Device::Cuda).unwrap(),
            Device::Cuda
        );
        assert!(select_device(DevicePreference::Mps, |_| false).is_err());
    }

    #[test]
    fn test_device_names() {
        assert_eq!(Device::Mps.to_string(), "mps");
        assert_eq!(
            serde_json::to_value(Device::Cuda).unwrap(),
            serde_json::json!("cuda")
        );
    }
}
