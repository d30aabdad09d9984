//! System Facts Probing
//!
//! Collects the host description every benchmark is sized from. Each fact
//! is a ranked [`ProbeChain`]; the first probe yielding a value wins.
//!
//! ## Sources
//!
//! - **CPU**: `/proc/cpuinfo` (model, vendor, sockets, cores, threads)
//! - **Caches**: `/sys/devices/system/cpu/cpu0/cache/index*`
//! - **Memory**: `/proc/meminfo`
//! - **Fallbacks**: `std::thread::available_parallelism`, compile-time arch
//!
//! Non-Linux hosts degrade to the fallbacks, leaving the rest absent.

use hostbench_core::{ProbeChain, SystemFacts, Vendor};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Where facts are read from
#[derive(Debug, Clone)]
pub struct ProbeSources {
    /// `/proc/cpuinfo`
    pub cpuinfo: PathBuf,
    /// `/proc/meminfo`
    pub meminfo: PathBuf,
    /// Cache directory of the first CPU
    pub cache_dir: PathBuf,
}

impl Default for ProbeSources {
    fn default() -> Self {
        Self {
            cpuinfo: PathBuf::from("/proc/cpuinfo"),
            meminfo: PathBuf::from("/proc/meminfo"),
            cache_dir: PathBuf::from("/sys/devices/system/cpu/cpu0/cache"),
        }
    }
}

/// Summary of `/proc/cpuinfo`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuInfo {
    /// First `model name`
    pub model: Option<String>,
    /// First `vendor_id`
    pub vendor: Option<String>,
    /// Number of `processor` entries
    pub processors: u32,
    /// Distinct `physical id` values
    pub sockets: u32,
    /// `cpu cores` per socket
    pub cores_per_socket: Option<u32>,
}

impl CpuInfo {
    /// Physical cores over all sockets
    pub fn cores(&self) -> Option<u32> {
        self.cores_per_socket
            .map(|per_socket| per_socket * self.sockets.max(1))
    }
}

/// Parse `/proc/cpuinfo` text
pub fn parse_cpuinfo(text: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    let mut physical_ids = BTreeSet::new();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "processor" => info.processors += 1,
            "model name" if info.model.is_none() => info.model = Some(value.to_string()),
            "vendor_id" if info.vendor.is_none() => info.vendor = Some(value.to_string()),
            "physical id" => {
                physical_ids.insert(value.to_string());
            }
            "cpu cores" if info.cores_per_socket.is_none() => {
                info.cores_per_socket = value.parse().ok();
            }
            _ => {}
        }
    }

    info.sockets = physical_ids.len() as u32;
    info
}

/// `MemTotal` from `/proc/meminfo`, in bytes
pub fn parse_meminfo(text: &str) -> Option<u64> {
    text.lines()
        .find(|l| l.starts_with("MemTotal"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Parse a sysfs cache size such as `32K`, `1024K` or `8M`
pub fn parse_cache_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let (digits, multiplier) = match text.chars().last()? {
        'K' | 'k' => (&text[..text.len() - 1], 1024),
        'M' | 'm' => (&text[..text.len() - 1], 1024 * 1024),
        'G' | 'g' => (&text[..text.len() - 1], 1024 * 1024 * 1024),
        _ => (text, 1),
    };
    digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}

/// Cache sizes of one CPU, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSizes {
    /// L1 instruction
    pub l1i: u64,
    /// L1 data
    pub l1d: u64,
    /// L2
    pub l2: u64,
    /// L3
    pub l3: u64,
}

/// Read `index*/{level,type,size}` below a sysfs cache directory
pub fn read_caches(dir: &Path) -> Option<CacheSizes> {
    let mut caches = CacheSizes::default();
    let mut found = false;

    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        let read = |name: &str| std::fs::read_to_string(path.join(name)).ok();
        let (Some(level), Some(kind), Some(size)) = (read("level"), read("type"), read("size"))
        else {
            continue;
        };
        let Some(bytes) = parse_cache_size(&size) else {
            continue;
        };
        let slot = match (level.trim(), kind.trim()) {
            ("1", "Instruction") => &mut caches.l1i,
            ("1", "Data") => &mut caches.l1d,
            ("2", _) => &mut caches.l2,
            ("3", _) => &mut caches.l3,
            _ => continue,
        };
        *slot = bytes;
        found = true;
    }

    found.then_some(caches)
}

fn available_parallelism() -> Option<u32> {
    std::thread::available_parallelism()
        .ok()
        .map(|n| n.get() as u32)
}

/// Probe the host
///
/// `cflags` is recorded as given; normalisation happens where flags are used.
pub fn probe_facts(sources: &ProbeSources, cflags: Option<&str>) -> SystemFacts {
    let cpuinfo = std::fs::read_to_string(&sources.cpuinfo)
        .ok()
        .map(|text| parse_cpuinfo(&text));
    let cpu = cpuinfo.clone().unwrap_or_default();

    let threads = ProbeChain::new("threads")
        .then_fn("cpuinfo", {
            let n = cpu.processors;
            move || (n > 0).then_some(n)
        })
        .then_fn("available_parallelism", available_parallelism)
        .resolve();

    let cores = ProbeChain::new("cores")
        .then_fn("cpuinfo", {
            let cpu = cpu.clone();
            move || cpu.cores()
        })
        .then_fn("threads", move || threads)
        .resolve();

    let sockets = ProbeChain::new("sockets")
        .then_fn("cpuinfo", {
            let n = cpu.sockets;
            move || (n > 0).then_some(n)
        })
        .then_fn("single socket", {
            let probed = cpuinfo.is_some();
            move || probed.then_some(1)
        })
        .resolve();

    let memory = ProbeChain::new("memory")
        .then_fn("meminfo", {
            let path = sources.meminfo.clone();
            move || {
                std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|text| parse_meminfo(&text))
            }
        })
        .resolve();

    let caches = ProbeChain::new("caches")
        .then_fn("sysfs", {
            let dir = sources.cache_dir.clone();
            move || read_caches(&dir)
        })
        .resolve()
        .unwrap_or_default();

    let mut facts = SystemFacts::new()
        .with_caches(caches.l1i, caches.l1d, caches.l2, caches.l3)
        .with_arch(std::env::consts::ARCH);
    if let Some(n) = threads {
        facts = facts.with_threads(n);
    }
    if let Some(n) = cores {
        facts = facts.with_cores(n);
    }
    if let Some(n) = sockets {
        facts = facts.with_sockets(n);
    }
    if let Some(bytes) = memory {
        facts = facts.with_memory(bytes);
    }
    if let Some(vendor) = &cpu.vendor {
        facts = facts.with_vendor(Vendor::from_cpu_string(vendor));
    }
    if let Some(model) = &cpu.model {
        facts = facts.with_cpu_model(model.clone());
    }
    if let Some(flags) = cflags {
        facts = facts.with_cflags(flags);
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) Gold 6130 CPU @ 2.10GHz
physical id\t: 0
cpu cores\t: 16

processor\t: 1
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) Gold 6130 CPU @ 2.10GHz
physical id\t: 1
cpu cores\t: 16

processor\t: 2
physical id\t: 0

processor\t: 3
physical id\t: 1
";

    #[test]
    fn test_parse_cpuinfo() {
        let info = parse_cpuinfo(CPUINFO);
        assert_eq!(info.processors, 4);
        assert_eq!(info.sockets, 2);
        assert_eq!(info.cores(), Some(32));
        assert_eq!(info.vendor.as_deref(), Some("GenuineIntel"));
        assert!(info.model.unwrap().contains("Gold 6130"));
    }

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:       16314368 kB\nMemFree:         1000 kB\n";
        assert_eq!(parse_meminfo(text), Some(16_314_368 * 1024));
        assert_eq!(parse_meminfo("MemFree: 1 kB"), None);
    }

    #[test]
    fn test_parse_cache_size() {
        assert_eq!(parse_cache_size("32K\n"), Some(32 * 1024));
        assert_eq!(parse_cache_size("8M"), Some(8 * 1024 * 1024));
        assert_eq!(parse_cache_size("512"), Some(512));
        assert_eq!(parse_cache_size(""), None);
        assert_eq!(parse_cache_size("lots"), None);
    }

    fn write_index(dir: &Path, index: u32, level: &str, kind: &str, size: &str) {
        let index = dir.join(format!("index{index}"));
        std::fs::create_dir_all(&index).unwrap();
        std::fs::write(index.join("level"), format!("{level}\n")).unwrap();
        std::fs::write(index.join("type"), format!("{kind}\n")).unwrap();
        std::fs::write(index.join("size"), format!("{size}\n")).unwrap();
    }

    #[test]
    fn test_probe_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        write_index(&cache_dir, 0, "1", "Data", "32K");
        write_index(&cache_dir, 1, "1", "Instruction", "32K");
        write_index(&cache_dir, 2, "2", "Unified", "1024K");
        write_index(&cache_dir, 3, "3", "Unified", "22528K");

        let sources = ProbeSources {
            cpuinfo: dir.path().join("cpuinfo"),
            meminfo: dir.path().join("meminfo"),
            cache_dir,
        };
        std::fs::write(&sources.cpuinfo, CPUINFO).unwrap();
        std::fs::write(&sources.meminfo, "MemTotal: 1024 kB\n").unwrap();

        let facts = probe_facts(&sources, Some("-O2"));
        assert_eq!(facts.threads_or_cores(), 4);
        assert_eq!(facts.cores_or_one(), 32);
        assert_eq!(facts.sockets_or_one(), 2);
        assert_eq!(facts.memory_bytes.map(|m| m.get()), Some(1024 * 1024));
        assert_eq!(facts.l1d_bytes.map(|c| c.get()), Some(32 * 1024));
        assert_eq!(facts.l3_bytes.map(|c| c.get()), Some(22528 * 1024));
        assert_eq!(facts.vendor, Some(Vendor::Intel));
        assert_eq!(facts.cflags.as_deref(), Some("-O2"));
    }

    #[test]
    fn test_probe_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let sources = ProbeSources {
            cpuinfo: dir.path().join("missing"),
            meminfo: dir.path().join("missing"),
            cache_dir: dir.path().join("missing"),
        };

        let facts = probe_facts(&sources, None);
        // available_parallelism supplies threads, cores follow threads
        assert!(facts.threads.is_some());
        assert_eq!(facts.cores, facts.threads);
        assert_eq!(facts.sockets, None);
        assert_eq!(facts.memory_bytes, None);
        assert_eq!(facts.l3_bytes, None);
        assert_eq!(facts.cflags, None);
    }
}
