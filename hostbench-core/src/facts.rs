//! System Facts
//!
//! Immutable description of the host a suite runs on. Every field is either
//! a positive measurement or explicitly absent; zero is never used as a
//! sentinel, so the `with_*` builders map a zero reading to `None`.
//!
//! How facts are obtained is not this crate's concern. Callers that need to
//! probe the host express each fact as a [`ProbeChain`]: an ordered list of
//! providers tried until one yields a value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};

/// CPU vendor, used to pick vendor-tuned BLAS builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// GenuineIntel
    Intel,
    /// AuthenticAMD
    Amd,
    /// Anything else
    Other,
}

impl Vendor {
    /// Classify a `/proc/cpuinfo` vendor or model string
    pub fn from_cpu_string(s: &str) -> Self {
        let lower = s.to_ascii_lowercase();
        if lower.contains("intel") {
            Vendor::Intel
        } else if lower.contains("amd") {
            Vendor::Amd
        } else {
            Vendor::Other
        }
    }
}

/// Host description consumed by sizing heuristics and drivers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemFacts {
    /// Physical core count
    pub cores: Option<NonZeroU32>,
    /// Hardware thread count
    pub threads: Option<NonZeroU32>,
    /// Socket count
    pub sockets: Option<NonZeroU32>,
    /// L1 instruction cache size in bytes
    pub l1i_bytes: Option<NonZeroU64>,
    /// L1 data cache size in bytes
    pub l1d_bytes: Option<NonZeroU64>,
    /// L2 cache size in bytes
    pub l2_bytes: Option<NonZeroU64>,
    /// L3 cache size in bytes
    pub l3_bytes: Option<NonZeroU64>,
    /// Total memory in bytes
    pub memory_bytes: Option<NonZeroU64>,
    /// Architecture tag such as `x86_64`
    pub arch: Option<String>,
    /// CPU model name
    pub cpu_model: Option<String>,
    /// CPU vendor
    pub vendor: Option<Vendor>,
    /// Compiler flags used for every build
    pub cflags: Option<String>,
}

impl SystemFacts {
    /// Empty facts: everything absent
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the physical core count
    pub fn with_cores(mut self, n: u32) -> Self {
        self.cores = NonZeroU32::new(n);
        self
    }

    /// Set the hardware thread count
    pub fn with_threads(mut self, n: u32) -> Self {
        self.threads = NonZeroU32::new(n);
        self
    }

    /// Set the socket count
    pub fn with_sockets(mut self, n: u32) -> Self {
        self.sockets = NonZeroU32::new(n);
        self
    }

    /// Set cache sizes in bytes (L1i, L1d, L2, L3)
    pub fn with_caches(mut self, l1i: u64, l1d: u64, l2: u64, l3: u64) -> Self {
        self.l1i_bytes = NonZeroU64::new(l1i);
        self.l1d_bytes = NonZeroU64::new(l1d);
        self.l2_bytes = NonZeroU64::new(l2);
        self.l3_bytes = NonZeroU64::new(l3);
        self
    }

    /// Set total memory in bytes
    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory_bytes = NonZeroU64::new(bytes);
        self
    }

    /// Set the architecture tag
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = non_empty(arch.into());
        self
    }

    /// Set the CPU model name; the vendor is derived from it when unset
    pub fn with_cpu_model(mut self, model: impl Into<String>) -> Self {
        self.cpu_model = non_empty(model.into());
        if self.vendor.is_none() {
            self.vendor = self.cpu_model.as_deref().map(Vendor::from_cpu_string);
        }
        self
    }

    /// Set the CPU vendor
    pub fn with_vendor(mut self, vendor: Vendor) -> Self {
        self.vendor = Some(vendor);
        self
    }

    /// Set the compiler flags
    pub fn with_cflags(mut self, cflags: impl Into<String>) -> Self {
        self.cflags = non_empty(cflags.into());
        self
    }

    /// Core count, or 1 when unknown
    pub fn cores_or_one(&self) -> u32 {
        self.cores.map_or(1, NonZeroU32::get)
    }

    /// Thread count, falling back to the core count, then 1
    pub fn threads_or_cores(&self) -> u32 {
        self.threads.or(self.cores).map_or(1, NonZeroU32::get)
    }

    /// Socket count, or 1 when unknown
    pub fn sockets_or_one(&self) -> u32 {
        self.sockets.map_or(1, NonZeroU32::get)
    }

    /// Filesystem-safe slug of the CPU model, used in run directory names
    pub fn cpu_slug(&self) -> String {
        let model = self.cpu_model.as_deref().unwrap_or("unknown");
        let mut slug = String::with_capacity(model.len());
        let mut last_dash = true;
        for c in model.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c);
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        while slug.ends_with('-') {
            slug.pop();
        }
        if slug.is_empty() {
            "unknown".to_string()
        } else {
            slug
        }
    }
}

impl fmt::Display for SystemFacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        writeln!(f, "CPU:      {}", show(&self.cpu_model))?;
        writeln!(f, "Arch:     {}", show(&self.arch))?;
        writeln!(
            f,
            "Topology: {} sockets, {} cores, {} threads",
            show(&self.sockets),
            show(&self.cores),
            show(&self.threads)
        )?;
        writeln!(
            f,
            "Caches:   L1i {} L1d {} L2 {} L3 {} bytes",
            show(&self.l1i_bytes),
            show(&self.l1d_bytes),
            show(&self.l2_bytes),
            show(&self.l3_bytes)
        )?;
        writeln!(f, "Memory:   {} bytes", show(&self.memory_bytes))?;
        write!(f, "CFLAGS:   {}", show(&self.cflags))
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ─── Probe chain ─────────────────────────────────────────────────────────────

/// One way of detecting a fact
pub trait Probe<T> {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Attempt detection; `None` passes to the next probe
    fn probe(&self) -> Option<T>;
}

/// Closure-backed probe
pub struct FnProbe<T> {
    name: String,
    f: Box<dyn Fn() -> Option<T> + Send + Sync>,
}

impl<T> FnProbe<T> {
    /// Wrap a closure as a named probe
    pub fn new(name: impl Into<String>, f: impl Fn() -> Option<T> + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl<T> Probe<T> for FnProbe<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> Option<T> {
        (self.f)()
    }
}

/// Ranked list of probes tried in order until one yields a value
pub struct ProbeChain<T> {
    fact: &'static str,
    probes: Vec<Box<dyn Probe<T> + Send + Sync>>,
}

impl<T: fmt::Debug + 'static> ProbeChain<T> {
    /// Empty chain for the named fact
    pub fn new(fact: &'static str) -> Self {
        Self {
            fact,
            probes: Vec::new(),
        }
    }

    /// Append a probe at the lowest rank
    pub fn then(mut self, probe: impl Probe<T> + Send + Sync + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// Append a closure probe at the lowest rank
    pub fn then_fn(
        self,
        name: impl Into<String>,
        f: impl Fn() -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        self.then(FnProbe::new(name, f))
    }

    /// Run the chain, returning the first defined value
    pub fn resolve(&self) -> Option<T> {
        for probe in &self.probes {
            if let Some(value) = probe.probe() {
                tracing::debug!(fact = self.fact, probe = probe.name(), ?value, "fact resolved");
                return Some(value);
            }
            tracing::trace!(fact = self.fact, probe = probe.name(), "probe yielded nothing");
        }
        tracing::debug!(fact = self.fact, "no probe resolved fact");
        None
    }

    /// Number of probes in the chain
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Whether the chain has no probes
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
