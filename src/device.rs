//! # Device Detection and Management
//!
//! Picks the compute device (CPU/GPU) the Whisper model is loaded onto.
//! GPU choices fall back to CPU when the backend is unavailable.

use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Cached best available device to avoid repeated detection
static BEST_DEVICE: OnceLock<Device> = OnceLock::new();

/// Device preferences for model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically select the best available device
    #[default]
    Auto,
    /// Force CPU usage
    Cpu,
    /// CUDA GPU (falls back to CPU if not available)
    Cuda,
    /// Metal GPU (falls back to CPU if not available)
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Device detection and selection utilities
pub struct DeviceManager;

impl DeviceManager {
    /// Get the device for a preference
    pub fn get_device(preference: DevicePreference) -> Device {
        match preference {
            DevicePreference::Auto => Self::get_best_device(),
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => Self::get_cuda_device().unwrap_or(Device::Cpu),
            DevicePreference::Metal => Self::get_metal_device().unwrap_or(Device::Cpu),
        }
    }

    /// Get the best available device (cached)
    pub fn get_best_device() -> Device {
        BEST_DEVICE.get_or_init(Self::detect_best_device).clone()
    }

    fn detect_best_device() -> Device {
        info!("Detecting best available compute device...");

        if let Some(cuda_device) = Self::get_cuda_device() {
            info!("Selected CUDA GPU for inference");
            return cuda_device;
        }

        if let Some(metal_device) = Self::get_metal_device() {
            info!("Selected Metal GPU for inference");
            return metal_device;
        }

        info!("Using CPU for inference (no GPU acceleration available)");
        Device::Cpu
    }

    fn get_cuda_device() -> Option<Device> {
        Device::new_cuda(0)
            .map_err(|e| debug!("CUDA not available: {}", e))
            .ok()
    }

    fn get_metal_device() -> Option<Device> {
        Device::new_metal(0)
            .map_err(|e| debug!("Metal not available: {}", e))
            .ok()
    }

    /// Short device label for logs and the health endpoint
    pub fn get_device_info(device: &Device) -> String {
        match device {
            Device::Cpu => "CPU".to_string(),
            Device::Cuda(_) => "CUDA GPU".to_string(),
            Device::Metal(_) => "Metal GPU (Apple Silicon)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("CPU".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("gpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("metal".parse::<DevicePreference>().unwrap(), DevicePreference::Metal);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_preference_is_cpu() {
        let device = DeviceManager::get_device(DevicePreference::Cpu);
        assert!(matches!(device, Device::Cpu));
        assert_eq!(DeviceManager::get_device_info(&device), "CPU");
    }
}
