// GPU utilization, VRAM and temperature from per-device property bags

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{CollectionError, CollectionResult};
use crate::models::GpuReading;

pub const DEVICE_UTILIZATION: &str = "device_utilization";
pub const RENDERER_UTILIZATION: &str = "renderer_utilization";
pub const VRAM_USED: &str = "vram_used";
pub const VRAM_TOTAL: &str = "vram_total";

const DRM_CLASS_DIR: &str = "/sys/class/drm";

/// One accelerator as seen by the device registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuDevice {
    pub name: String,
    /// Integer or floating values keyed by the constants above. `None` when the device
    /// exposes no performance statistics at all.
    pub performance_statistics: Option<Map<String, Value>>,
    pub temperature: Option<f64>,
}

pub trait GpuSource: Send {
    fn devices(&mut self) -> CollectionResult<Vec<GpuDevice>>;
}

/// Utilization is the max over every device and both utilization properties, since they may
/// describe overlapping work. VRAM used is last-wins, VRAM total is max-wins floored to 1,
/// temperature is last-wins and stays `None` when no device reports one.
pub fn compute_gpu(devices: &[GpuDevice], now: DateTime<Utc>) -> GpuReading {
    let mut utilization: f64 = 0.0;
    let mut vram_used: u64 = 0;
    let mut vram_total: u64 = 0;
    let mut temperature = None;

    for device in devices {
        if let Some(stats) = &device.performance_statistics {
            for key in [DEVICE_UTILIZATION, RENDERER_UTILIZATION] {
                if let Some(v) = stats.get(key).and_then(Value::as_f64) {
                    utilization = utilization.max(v);
                }
            }
            if let Some(v) = stats.get(VRAM_USED).and_then(non_negative) {
                vram_used = v;
            }
            if let Some(v) = stats.get(VRAM_TOTAL).and_then(non_negative) {
                vram_total = vram_total.max(v);
            }
        }
        if let Some(t) = device.temperature {
            temperature = Some(t);
        }
    }

    GpuReading {
        utilization: utilization.clamp(0.0, 100.0),
        vram_used,
        vram_total: vram_total.max(1),
        temperature,
        timestamp: now,
    }
}

fn non_negative(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    v.as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f as u64)
}

/// Enumerates DRM cards under /sys/class/drm (amdgpu and compatible drivers expose
/// `gpu_busy_percent` and `mem_info_vram_*` in the device directory).
pub struct DrmGpuSource {
    root: PathBuf,
}

impl Default for DrmGpuSource {
    fn default() -> Self {
        Self::new(DRM_CLASS_DIR)
    }
}

impl DrmGpuSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl GpuSource for DrmGpuSource {
    fn devices(&mut self) -> CollectionResult<Vec<GpuDevice>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(CollectionError::from_io(&e)),
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| is_card_name(n))
            .collect();
        names.sort();

        names
            .into_iter()
            .map(|name| {
                let device_dir = self.root.join(&name).join("device");
                read_drm_device(name, &device_dir)
            })
            .collect()
    }
}

/// `card0` but not connector entries like `card0-HDMI-A-1`.
fn is_card_name(name: &str) -> bool {
    name.strip_prefix("card")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn read_drm_device(name: String, device_dir: &Path) -> CollectionResult<GpuDevice> {
    let mut stats = Map::new();
    for (file, key) in [
        ("gpu_busy_percent", DEVICE_UTILIZATION),
        ("mem_info_vram_used", VRAM_USED),
        ("mem_info_vram_total", VRAM_TOTAL),
    ] {
        if let Some(v) = read_attribute(&device_dir.join(file))? {
            stats.insert(key.to_string(), Value::from(v));
        }
    }
    Ok(GpuDevice {
        name,
        performance_statistics: (!stats.is_empty()).then_some(stats),
        temperature: read_hwmon_temperature(device_dir),
    })
}

/// Absent attribute is `None`. A present one the driver fails to serve is a driver error.
fn read_attribute(path: &Path) -> CollectionResult<Option<u64>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s.trim().parse().ok()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(CollectionError::PermissionDenied),
        Err(e) => {
            tracing::debug!(error = %e, path = %path.display(), "gpu attribute unreadable");
            Err(CollectionError::DriverError {
                code: e.raw_os_error().unwrap_or(-1),
            })
        }
    }
}

fn read_u64(path: &Path) -> Option<u64> {
    match std::fs::read_to_string(path) {
        Ok(s) => s.trim().parse().ok(),
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                tracing::debug!(error = %e, path = %path.display(), "gpu attribute unreadable");
            }
            None
        }
    }
}

/// First hwmon `temp1_input`, millidegrees Celsius.
fn read_hwmon_temperature(device_dir: &Path) -> Option<f64> {
    let entries = std::fs::read_dir(device_dir.join("hwmon")).ok()?;
    let mut dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    dirs.sort();
    dirs.iter()
        .find_map(|d| read_u64(&d.join("temp1_input")))
        .map(|milli| milli as f64 / 1000.0)
}

pub struct GpuCollector {
    source: Box<dyn GpuSource>,
}

impl GpuCollector {
    pub fn new(source: impl GpuSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn host() -> Self {
        Self::new(DrmGpuSource::default())
    }

    pub fn sample(&mut self) -> CollectionResult<GpuReading> {
        let devices = self.source.devices()?;
        Ok(compute_gpu(&devices, Utc::now()))
    }
}
