//! Sizing Heuristics
//!
//! Pure functions computing benchmark parameters from system facts. Given
//! the same integer inputs they return the same outputs everywhere: all
//! arithmetic is integer floor division except the single square root in
//! [`compute_n`]. Non-positive inputs are rejected with [`SizingError`].

use crate::error::SizingError;
use crate::facts::SystemFacts;
use std::num::NonZeroU64;

/// Fraction of memory the LINPACK matrix may occupy
pub const MEMORY_UTILISATION: f64 = 0.8;

/// Bytes per matrix element
pub const ELEMENT_BYTES: f64 = 8.0;

/// Memory below this is clamped up before sizing
pub const MIN_MEMORY_BYTES: u64 = 1024 * 1024 * 1024;

/// `scale_n` stops shrinking at or below this size
pub const LADDER_FLOOR: u64 = 1000;

/// `scale_n` keeps at most this many sizes (HPL.dat limit)
pub const LADDER_MAX: usize = 20;

/// Shrink factor between ladder rungs
pub const LADDER_FACTOR: f64 = 1.25;

/// Minimum STREAM array element count
pub const STREAM_MIN_ELEMENTS: u64 = 10_000_000;

/// STREAM arrays above this element count need `-mcmodel=medium`
pub const STREAM_MEDIUM_MODEL_ELEMENTS: u64 = 4_000_000_000;

fn positive(value: u64, name: &'static str) -> Result<u64, SizingError> {
    if value == 0 {
        Err(SizingError::NonPositive { name })
    } else {
        Ok(value)
    }
}

/// LINPACK problem size for the given memory and block size
///
/// `floor(sqrt(0.8 * memory / 8))` rounded down to a multiple of `nb`.
/// Memory below 1 GiB is treated as 1 GiB.
///
/// ```
/// # use hostbench_core::sizing::compute_n;
/// assert_eq!(compute_n(16 * 1024 * 1024 * 1024, 192).unwrap(), 41280);
/// ```
pub fn compute_n(memory_bytes: u64, nb: u64) -> Result<u64, SizingError> {
    let memory = positive(memory_bytes, "memory")?.max(MIN_MEMORY_BYTES);
    let nb = positive(nb, "block size")?;

    let n = (MEMORY_UTILISATION * memory as f64 / ELEMENT_BYTES).sqrt() as u64;
    Ok(n / nb * nb)
}

/// Descending ladder of problem sizes, returned ascending
///
/// Starting from `n` aligned to `nb`, shrink by [`LADDER_FACTOR`] and
/// re-align until the size is at or below [`LADDER_FLOOR`]. The result is
/// strictly ascending, contains only positive multiples of `nb`, and keeps
/// at most the [`LADDER_MAX`] largest sizes.
pub fn scale_n(n: u64, nb: u64) -> Result<Vec<u64>, SizingError> {
    let nb = positive(nb, "block size")?;
    let start = positive(n, "problem size")? / nb * nb;

    let mut sizes = Vec::new();
    if start > 0 {
        sizes.push(start);
    }

    let mut current = start;
    while current > LADDER_FLOOR {
        current = (current as f64 / LADDER_FACTOR) as u64;
        let aligned = current / nb * nb;
        if aligned > 0 {
            sizes.push(aligned);
        }
    }

    sizes.sort_unstable();
    sizes.dedup();
    if sizes.len() > LADDER_MAX {
        sizes.drain(..sizes.len() - LADDER_MAX);
    }
    Ok(sizes)
}

/// Process grid `(P, Q)` with `P * Q == count` and `P <= Q` closest to square
///
/// ```
/// # use hostbench_core::sizing::grid;
/// assert_eq!(grid(112).unwrap(), (8, 14));
/// assert_eq!(grid(16).unwrap(), (4, 4));
/// ```
pub fn grid(count: u64) -> Result<(u64, u64), SizingError> {
    let count = positive(count, "process count")?;

    let divisors: Vec<u64> = (1..=count).filter(|d| count % d == 0).collect();
    let len = divisors.len();
    let half = len / 2;

    if len % 2 == 0 {
        Ok((divisors[half - 1], divisors[len - half]))
    } else {
        Ok((divisors[half], divisors[half]))
    }
}

/// LINPACK block size tier for a thread count
pub fn nb_size(threads: u32) -> Result<u64, SizingError> {
    Ok(match positive(u64::from(threads), "thread count")? {
        64.. => 384,
        32.. => 256,
        _ => 192,
    })
}

/// STREAM array element count: four times aggregate cache, floored
///
/// ```
/// # use hostbench_core::sizing::stream_array_size;
/// assert_eq!(stream_array_size(8_388_608, 2).unwrap(), 10_000_000);
/// ```
pub fn stream_array_size(cache_bytes: u64, sockets: u32) -> Result<u64, SizingError> {
    let cache = positive(cache_bytes, "cache size")?;
    let sockets = positive(u64::from(sockets), "socket count")?;
    Ok((4 * cache * sockets / 8).max(STREAM_MIN_ELEMENTS))
}

/// Whether a STREAM array this large needs the medium code model
pub fn needs_medium_code_model(elements: u64) -> bool {
    elements > STREAM_MEDIUM_MODEL_ELEMENTS
}

/// Largest cache level for STREAM sizing: L3, else L2, else L1d
pub fn stream_cache(facts: &SystemFacts) -> Option<NonZeroU64> {
    facts.l3_bytes.or(facts.l2_bytes).or(facts.l1d_bytes)
}

/// Latency at the largest tested size not exceeding `target`
///
/// `samples` are `(size, latency)` pairs in ascending size order. Returns
/// `None` when every sample is larger than `target`. No interpolation.
pub fn closest_latency(samples: &[(f64, f64)], target: f64) -> Option<f64> {
    let mut last = None;
    for &(size, latency) in samples {
        if size > target {
            break;
        }
        last = Some(latency);
    }
    last
}

/// Parse `lat_mem_rd` output into `(size MB, latency ns)` pairs
///
/// Stride headers and anything not made of two numbers are skipped.
pub fn parse_latency_table(output: &str) -> Vec<(f64, f64)> {
    output
        .lines()
        .filter(|line| !line.contains("stride"))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let size = fields.next()?.parse::<f64>().ok()?;
            let latency = fields.next()?.parse::<f64>().ok()?;
            Some((size, latency))
        })
        .collect()
}

/// CPU to pin the latency benchmark to, away from CPU 0 when possible
pub fn lmbench_cpu(threads: u32) -> u32 {
    if threads >= 3 { 2 } else { 0 }
}

/// `taskset` CPU list for OpenSSL `speed -multi`, skipping CPU 0 and its sibling
///
/// `siblings` is the content of CPU 1's `thread_siblings_list`.
pub fn taskset_ids(siblings: Option<&str>, threads: u32) -> Result<String, SizingError> {
    let threads = positive(u64::from(threads), "thread count")? as u32;
    let ids: Vec<&str> = siblings
        .map(|s| s.trim().split(',').filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    if ids.len() <= 1 {
        Ok(format!("1-{}", threads.saturating_sub(1)))
    } else {
        Ok(format!(
            "{}-{},{}-{}",
            ids[0],
            (threads / 2).saturating_sub(1),
            ids[1],
            threads.saturating_sub(1)
        ))
    }
}

/// Process count for OpenSSL `speed -multi` given the taskset list
pub fn multi_count(taskset: &str, threads: u32) -> u32 {
    if taskset.contains(',') {
        threads.saturating_sub(2).max(1)
    } else {
        threads.saturating_sub(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_compute_n() {
        // sqrt(0.8 * 16 GiB / 8) = 41448.6..., floor to a multiple of 192
        assert_eq!(compute_n(16 * GIB, 192).unwrap(), 41280);
        assert_eq!(compute_n(16 * GIB, 1).unwrap(), 41448);
    }

    #[test]
    fn test_compute_n_clamps_small_memory() {
        assert_eq!(compute_n(1, 192).unwrap(), compute_n(GIB, 192).unwrap());
        assert!(compute_n(1, 192).unwrap() > 0);
    }

    #[test]
    fn test_compute_n_rejects_zero() {
        assert_eq!(
            compute_n(0, 192),
            Err(SizingError::NonPositive { name: "memory" })
        );
        assert_eq!(
            compute_n(GIB, 0),
            Err(SizingError::NonPositive { name: "block size" })
        );
    }

    #[test]
    fn test_scale_n_ladder() {
        let ladder = scale_n(41280, 192).unwrap();

        assert_eq!(ladder.last(), Some(&41280));
        assert!(ladder.len() <= LADDER_MAX);
        assert!(ladder.windows(2).all(|w| w[0] < w[1]));
        // 41280 / 1.25 = 33024, already a multiple of 192
        assert!(ladder.contains(&33024));
    }

    #[test]
    fn test_scale_n_small_start() {
        assert_eq!(scale_n(900, 192).unwrap(), vec![768]);
        assert_eq!(scale_n(100, 192).unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn test_scale_n_caps_length() {
        let ladder = scale_n(10_000_000, 8).unwrap();
        assert_eq!(ladder.len(), LADDER_MAX);
        assert_eq!(ladder.last(), Some(&10_000_000));
    }

    #[test]
    fn test_grid() {
        assert_eq!(grid(112).unwrap(), (8, 14));
        assert_eq!(grid(1).unwrap(), (1, 1));
        assert_eq!(grid(7).unwrap(), (1, 7));
        assert_eq!(grid(36).unwrap(), (6, 6));
        assert_eq!(grid(48).unwrap(), (6, 8));
        assert!(grid(0).is_err());
    }

    #[test]
    fn test_nb_size() {
        assert_eq!(nb_size(64).unwrap(), 384);
        assert_eq!(nb_size(128).unwrap(), 384);
        assert_eq!(nb_size(32).unwrap(), 256);
        assert_eq!(nb_size(31).unwrap(), 192);
        assert_eq!(nb_size(1).unwrap(), 192);
        assert!(nb_size(0).is_err());
    }

    #[test]
    fn test_stream_array_size() {
        assert_eq!(stream_array_size(8_388_608, 2).unwrap(), 10_000_000);
        // 4 * 64 MiB * 2 / 8
        assert_eq!(stream_array_size(64 * 1024 * 1024, 2).unwrap(), 67_108_864);
        assert!(stream_array_size(0, 1).is_err());
        assert!(stream_array_size(1024, 0).is_err());
    }

    #[test]
    fn test_medium_code_model() {
        assert!(!needs_medium_code_model(4_000_000_000));
        assert!(needs_medium_code_model(4_000_000_001));
    }

    #[test]
    fn test_stream_cache_preference() {
        let facts = SystemFacts::new().with_caches(32768, 32768, 1_048_576, 0);
        assert_eq!(stream_cache(&facts).map(NonZeroU64::get), Some(1_048_576));
        let facts = facts.with_caches(32768, 32768, 1_048_576, 8_388_608);
        assert_eq!(stream_cache(&facts).map(NonZeroU64::get), Some(8_388_608));
        assert_eq!(stream_cache(&SystemFacts::new()), None);
    }

    #[test]
    fn test_closest_latency() {
        let samples = [(1.0, 1.0), (2.0, 1.2), (4.0, 1.6), (8.0, 2.0)];
        assert_eq!(closest_latency(&samples, 5.0), Some(1.6));
        assert_eq!(closest_latency(&samples, 0.5), None);
        assert_eq!(closest_latency(&samples, 8.0), Some(2.0));
        assert_eq!(closest_latency(&samples, 100.0), Some(2.0));
        assert_eq!(closest_latency(&[], 1.0), None);
    }

    #[test]
    fn test_parse_latency_table() {
        let output = "\"stride=1024\n0.00049 1.164\n0.00098 1.164\n\n1.00000 9.500\nbogus line\n";
        assert_eq!(
            parse_latency_table(output),
            vec![(0.00049, 1.164), (0.00098, 1.164), (1.0, 9.5)]
        );
    }

    #[test]
    fn test_lmbench_cpu() {
        assert_eq!(lmbench_cpu(1), 0);
        assert_eq!(lmbench_cpu(2), 0);
        assert_eq!(lmbench_cpu(3), 2);
    }

    #[test]
    fn test_taskset_ids() {
        assert_eq!(taskset_ids(Some("1\n"), 8).unwrap(), "1-7");
        assert_eq!(taskset_ids(None, 4).unwrap(), "1-3");
        assert_eq!(taskset_ids(Some("1,33\n"), 64).unwrap(), "1-31,33-63");
        assert!(taskset_ids(None, 0).is_err());
    }

    #[test]
    fn test_multi_count() {
        assert_eq!(multi_count("1-31,33-63", 64), 62);
        assert_eq!(multi_count("1-7", 8), 7);
        assert_eq!(multi_count("1-0", 1), 1);
    }

    proptest! {
        #[test]
        fn compute_n_is_block_aligned(memory in 1u64..(1u64 << 42), nb in 1u64..512) {
            let n = compute_n(memory, nb).unwrap();
            prop_assert_eq!(n % nb, 0);
        }

        #[test]
        fn scale_n_is_aligned_ascending_bounded(n in 1u64..2_000_000, nb in 1u64..512) {
            let ladder = scale_n(n, nb).unwrap();
            prop_assert!(ladder.len() <= LADDER_MAX);
            prop_assert!(ladder.iter().all(|x| *x > 0 && x % nb == 0));
            prop_assert!(ladder.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn grid_factors_count(count in 1u64..5000) {
            let (p, q) = grid(count).unwrap();
            prop_assert_eq!(p * q, count);
            prop_assert!(p <= q);
            // no factorisation is closer to square
            for d in (p + 1)..=q {
                prop_assert!(count % d != 0 || d > count / d);
            }
        }
    }
}
