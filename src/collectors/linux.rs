// Linux-specific helpers: /proc/stat, /proc/vmstat, /proc/meminfo, statvfs, page size.

use super::cpu::CoreTicks;
use super::memory::PageCounts;
use crate::error::{CollectionError, CollectionResult};

/// Per-core tick counters from /proc/stat (`cpuN` lines only; the aggregate `cpu` line is skipped).
pub(super) fn read_core_ticks() -> CollectionResult<Vec<CoreTicks>> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/stat")?;
        let ticks = parse_proc_stat(&content);
        if ticks.is_empty() {
            return Err(CollectionError::property_not_found("/proc/stat cpuN"));
        }
        Ok(ticks)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(CollectionError::property_not_found("cpu tick counters"))
    }
}

pub(super) fn parse_proc_stat(content: &str) -> Vec<CoreTicks> {
    let mut out = Vec::new();
    for line in content.lines() {
        let Some(rest) = line.strip_prefix("cpu") else {
            continue;
        };
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let fields: Vec<u64> = rest
            .split_whitespace()
            .skip(1)
            .take(4)
            .filter_map(|s| s.parse().ok())
            .collect();
        if fields.len() < 4 {
            continue;
        }
        // /proc/stat order: user nice system idle
        out.push(CoreTicks {
            user: fields[0],
            nice: fields[1],
            system: fields[2],
            idle: fields[3],
        });
    }
    out
}

/// Page counts from /proc/vmstat.
pub(super) fn read_vm_pages() -> CollectionResult<PageCounts> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/vmstat")?;
        parse_vmstat(&content).ok_or_else(|| CollectionError::property_not_found("nr_free_pages"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(CollectionError::property_not_found("/proc/vmstat"))
    }
}

pub(super) fn parse_vmstat(content: &str) -> Option<PageCounts> {
    let mut free = None;
    let mut pages = PageCounts::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once(' ') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u64>() else {
            continue;
        };
        match key {
            "nr_free_pages" => free = Some(value),
            "nr_active_anon" | "nr_active_file" => pages.active += value,
            "nr_inactive_anon" | "nr_inactive_file" => pages.inactive += value,
            "nr_unevictable" => pages.wired += value,
            "nr_zspages" => pages.compressed += value,
            _ => {}
        }
    }
    pages.free = free?;
    Some(pages)
}

/// Percentage of physical memory the kernel does not consider available.
pub(super) fn read_memory_pressure_level() -> Option<u32> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo_level(&content)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

pub(super) fn parse_meminfo_level(content: &str) -> Option<u32> {
    let mut total = None;
    let mut available = None;
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let kb = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        match key {
            "MemTotal" => total = kb,
            "MemAvailable" => available = kb,
            _ => {}
        }
    }
    let total = total.filter(|t| *t > 0)?;
    let available = available?.min(total);
    let unavailable = (total - available) as f64 / total as f64 * 100.0;
    Some(unavailable.round() as u32)
}

pub(super) fn page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as u64;
        }
    }
    4096
}

/// (total, available) bytes for the filesystem mounted at `path`.
#[cfg(unix)]
pub(super) fn statvfs_space(path: &str) -> std::io::Result<(u64, u64)> {
    let c_path = std::ffi::CString::new(path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    // SAFETY: statvfs is plain old data; zeroed is a valid initial value.
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and st is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    let fragment = if st.f_frsize > 0 {
        st.f_frsize as u64
    } else {
        st.f_bsize as u64
    };
    #[allow(clippy::unnecessary_cast)]
    let total = (st.f_blocks as u64).saturating_mul(fragment);
    #[allow(clippy::unnecessary_cast)]
    let available = (st.f_bavail as u64).saturating_mul(fragment);
    Ok((total, available))
}
