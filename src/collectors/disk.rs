// Mounted volume capacity

use chrono::{DateTime, Utc};
use std::path::Path;
use sysinfo::Disks;

use crate::error::CollectionResult;
use crate::models::DiskReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSpace {
    pub total: u64,
    pub available: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedVolume {
    pub mount_point: String,
    /// `None` when the statistics call for this mount failed.
    pub space: Option<VolumeSpace>,
}

pub trait DiskSource: Send {
    /// `None` when the platform cannot enumerate mounts.
    fn volumes(&mut self) -> Option<Vec<MountedVolume>>;
    fn root_space(&mut self) -> Option<VolumeSpace>;
}

/// Any path component starting with a dot marks a hidden volume.
pub fn is_hidden_mount(mount_point: &str) -> bool {
    Path::new(mount_point).components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') && s != "." && s != "..")
    })
}

/// Visible, absolute, stat-able mounts. Falls back to the root volume alone when enumeration
/// yields nothing usable, and to an empty list when that fails too.
pub fn compute_disks(
    volumes: Option<Vec<MountedVolume>>,
    root_space: impl FnOnce() -> Option<VolumeSpace>,
    now: DateTime<Utc>,
) -> Vec<DiskReading> {
    let readings: Vec<DiskReading> = volumes
        .unwrap_or_default()
        .into_iter()
        .filter(|v| v.mount_point.starts_with('/') && !is_hidden_mount(&v.mount_point))
        .filter_map(|v| {
            let Some(space) = v.space else {
                tracing::debug!(mount = %v.mount_point, "volume statistics unavailable, skipping");
                return None;
            };
            Some(DiskReading::from_space(
                v.mount_point,
                space.total,
                space.available,
                now,
            ))
        })
        .collect();
    if !readings.is_empty() {
        return readings;
    }
    match root_space() {
        Some(space) => vec![DiskReading::from_space("/", space.total, space.available, now)],
        None => {
            tracing::warn!(operation = "stat_root", "root volume statistics unavailable");
            vec![]
        }
    }
}

/// Mount enumeration via sysinfo, capacity via statvfs on unix.
pub struct HostDiskSource {
    disks: Disks,
}

impl Default for HostDiskSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDiskSource {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl DiskSource for HostDiskSource {
    fn volumes(&mut self) -> Option<Vec<MountedVolume>> {
        self.disks.refresh(true);
        let volumes = self
            .disks
            .list()
            .iter()
            .map(|d| {
                let mount_point = d.mount_point().to_string_lossy().into_owned();
                #[cfg(unix)]
                let space = match super::linux::statvfs_space(&mount_point) {
                    Ok((total, available)) => Some(VolumeSpace { total, available }),
                    Err(e) => {
                        tracing::debug!(error = %e, mount = %mount_point, "statvfs failed");
                        None
                    }
                };
                #[cfg(not(unix))]
                let space = Some(VolumeSpace {
                    total: d.total_space(),
                    available: d.available_space(),
                });
                MountedVolume { mount_point, space }
            })
            .collect();
        Some(volumes)
    }

    fn root_space(&mut self) -> Option<VolumeSpace> {
        #[cfg(unix)]
        {
            super::linux::statvfs_space("/")
                .ok()
                .map(|(total, available)| VolumeSpace { total, available })
        }
        #[cfg(not(unix))]
        {
            None
        }
    }
}

pub struct DiskCollector {
    source: Box<dyn DiskSource>,
}

impl DiskCollector {
    pub fn new(source: impl DiskSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn host() -> Self {
        Self::new(HostDiskSource::new())
    }

    /// Never fails: an empty list is a valid degraded result.
    pub fn sample(&mut self) -> CollectionResult<Vec<DiskReading>> {
        let volumes = self.source.volumes();
        let source = &mut self.source;
        Ok(compute_disks(volumes, || source.root_space(), Utc::now()))
    }
}
