// Memory usage from page counts, physical size, swap and pressure level

use chrono::{DateTime, Utc};
use sysinfo::System;

use super::linux;
use crate::error::{CollectionError, CollectionResult};
use crate::models::{MemoryPressure, MemoryReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageCounts {
    pub free: u64,
    pub active: u64,
    pub inactive: u64,
    pub wired: u64,
    pub compressed: u64,
}

/// Page counts, physical memory, swap and pressure are independent reads: only the first two are
/// required. Missing swap reads as 0; a missing pressure level reads as nominal.
pub trait MemorySource: Send {
    fn page_counts(&mut self) -> CollectionResult<PageCounts>;
    fn page_size(&self) -> u64;
    fn physical_memory(&mut self) -> CollectionResult<u64>;
    fn swap_used(&mut self) -> Option<u64>;
    fn pressure_level(&mut self) -> Option<u32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMemory {
    pub pages: PageCounts,
    pub page_size: u64,
    pub total: u64,
    pub swap_used: Option<u64>,
    pub pressure_level: Option<u32>,
}

pub fn compute_memory(raw: &RawMemory, now: DateTime<Utc>) -> MemoryReading {
    let bytes = |pages: u64| pages.saturating_mul(raw.page_size);
    let p = &raw.pages;
    let used = bytes(p.active)
        .saturating_add(bytes(p.inactive))
        .saturating_add(bytes(p.wired))
        .saturating_add(bytes(p.compressed));
    MemoryReading {
        used,
        free: bytes(p.free),
        total: raw.total,
        swap: raw.swap_used.unwrap_or(0),
        pressure: raw
            .pressure_level
            .map(MemoryPressure::from_level)
            .unwrap_or_default(),
        timestamp: now,
    }
}

/// Physical memory and swap via sysinfo; page counts from /proc/vmstat on Linux and derived from
/// sysinfo's used/free figures elsewhere.
pub struct HostMemorySource {
    sys: System,
    page_size: u64,
}

impl Default for HostMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMemorySource {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            page_size: linux::page_size(),
        }
    }
}

impl MemorySource for HostMemorySource {
    fn page_counts(&mut self) -> CollectionResult<PageCounts> {
        if cfg!(target_os = "linux") {
            return linux::read_vm_pages();
        }
        self.sys.refresh_memory();
        Ok(PageCounts {
            free: self.sys.free_memory() / self.page_size,
            active: self.sys.used_memory() / self.page_size,
            ..Default::default()
        })
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn physical_memory(&mut self) -> CollectionResult<u64> {
        self.sys.refresh_memory();
        match self.sys.total_memory() {
            0 => Err(CollectionError::property_not_found("physical memory")),
            total => Ok(total),
        }
    }

    fn swap_used(&mut self) -> Option<u64> {
        self.sys.refresh_memory();
        match self.sys.total_swap() {
            0 => None,
            _ => Some(self.sys.used_swap()),
        }
    }

    fn pressure_level(&mut self) -> Option<u32> {
        linux::read_memory_pressure_level()
    }
}

pub struct MemoryCollector {
    source: Box<dyn MemorySource>,
}

impl MemoryCollector {
    pub fn new(source: impl MemorySource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn host() -> Self {
        Self::new(HostMemorySource::new())
    }

    pub fn sample(&mut self) -> CollectionResult<MemoryReading> {
        let pages = self.source.page_counts()?;
        let total = self.source.physical_memory()?;
        let raw = RawMemory {
            pages,
            page_size: self.source.page_size(),
            total,
            swap_used: self.source.swap_used(),
            pressure_level: self.source.pressure_level(),
        };
        Ok(compute_memory(&raw, Utc::now()))
    }
}

/// Host physical memory for placeholder readings; 0 when unknown.
pub fn host_physical_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.total_memory()
}
