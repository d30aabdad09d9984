//! Environment Builder
//!
//! Produces the environment a benchmark process sees from an immutable base
//! plus an ordered list of overrides. Path-style overrides concatenate with
//! `:` and never duplicate a segment already present, so applying the same
//! overrides twice yields the same environment as applying them once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default compiler flags when none are configured
pub const DEFAULT_CFLAGS: &str = "-march=native -mtune=native";

/// Extra flags enabling the AVX-512 instruction subsets used by BLAS kernels
pub const AVX512_FLAGS: &str =
    "-mavx512f -mavx512cd -mavx512bw -mavx512dq -mavx512vl -mavx512ifma -mavx512vbmi";

/// Process environment: variable name to value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment
    pub fn inherit() -> Self {
        std::env::vars().collect()
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate over variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Return a copy with the overrides applied
    pub fn with(&self, overrides: &[Override]) -> Self {
        build(self, overrides)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// How an override combines with an existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Overwrite the value
    Replace,
    /// `existing:value`
    AppendColon,
    /// `value:existing`
    PrependColon,
}

/// One environment override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    /// Variable name
    pub key: String,
    /// Value to set or concatenate
    pub value: String,
    /// Combination mode
    pub mode: Mode,
}

impl Override {
    /// Overwrite `key`
    pub fn replace(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            mode: Mode::Replace,
        }
    }

    /// Append to a `:`-separated `key`
    pub fn append(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            mode: Mode::AppendColon,
        }
    }

    /// Prepend to a `:`-separated `key`
    pub fn prepend(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            mode: Mode::PrependColon,
        }
    }
}

/// Apply `overrides` in order on top of `base`
///
/// `base` is never mutated. A path-style override against a missing or empty
/// value behaves like [`Mode::Replace`].
///
/// # Examples
///
/// ```
/// # use hostbench_core::env::{build, Environment, Override};
/// let base: Environment = [("PATH", "/usr/bin")].into_iter().collect();
/// let overrides = [Override::append("PATH", "/opt/mpi/bin")];
///
/// let once = build(&base, &overrides);
/// assert_eq!(once.get("PATH"), Some("/usr/bin:/opt/mpi/bin"));
/// assert_eq!(build(&once, &overrides), once);
/// ```
pub fn build(base: &Environment, overrides: &[Override]) -> Environment {
    let mut vars = base.vars.clone();

    for o in overrides {
        let combined = match (o.mode, vars.get(&o.key)) {
            (Mode::Replace, _) => o.value.clone(),
            (_, None) => o.value.clone(),
            (_, Some(existing)) if existing.is_empty() => o.value.clone(),
            (Mode::AppendColon, Some(existing)) => join_path(existing, &o.value, false),
            (Mode::PrependColon, Some(existing)) => join_path(existing, &o.value, true),
        };
        vars.insert(o.key.clone(), combined);
    }

    Environment { vars }
}

/// Concatenate path segments, skipping any already present
fn join_path(existing: &str, value: &str, prepend: bool) -> String {
    let current: Vec<&str> = existing.split(':').filter(|s| !s.is_empty()).collect();
    let mut added: Vec<&str> = Vec::new();
    for segment in value.split(':').filter(|s| !s.is_empty()) {
        if !current.contains(&segment) && !added.contains(&segment) {
            added.push(segment);
        }
    }

    let segments: Vec<&str> = if prepend {
        added.into_iter().chain(current).collect()
    } else {
        current.into_iter().chain(added).collect()
    };
    segments.join(":")
}

/// Normalise compiler flags: default when blank, `-O3` when no `-O` level is given
pub fn normalize_cflags(cflags: Option<&str>) -> String {
    let base = match cflags.map(str::trim) {
        Some(flags) if !flags.is_empty() => flags.to_string(),
        _ => DEFAULT_CFLAGS.to_string(),
    };
    if base.split_whitespace().any(|f| f.starts_with("-O")) {
        base
    } else {
        format!("{base} -O3")
    }
}

/// Compiler flags with the AVX-512 subsets appended when requested
pub fn with_avx512(cflags: &str, enabled: bool) -> String {
    if enabled && !cflags.contains("-mavx512f") {
        format!("{cflags} {AVX512_FLAGS}")
    } else {
        cflags.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base() -> Environment {
        [("PATH", "/usr/bin:/bin"), ("HOME", "/root"), ("EMPTY", "")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_replace_and_append() {
        let env = build(
            &base(),
            &[
                Override::replace("CFLAGS", "-O2"),
                Override::append("PATH", "/opt/openmpi/build/bin"),
                Override::prepend("LD_LIBRARY_PATH", "/opt/openssl"),
            ],
        );

        assert_eq!(env.get("CFLAGS"), Some("-O2"));
        assert_eq!(env.get("PATH"), Some("/usr/bin:/bin:/opt/openmpi/build/bin"));
        assert_eq!(env.get("LD_LIBRARY_PATH"), Some("/opt/openssl"));
        assert_eq!(env.get("HOME"), Some("/root"));
    }

    #[test]
    fn test_prepend_order() {
        let env = build(&base(), &[Override::prepend("PATH", "/a:/b")]);
        assert_eq!(env.get("PATH"), Some("/a:/b:/usr/bin:/bin"));
    }

    #[test]
    fn test_empty_base_degrades_to_replace() {
        let env = build(&base(), &[Override::append("EMPTY", "/lib")]);
        assert_eq!(env.get("EMPTY"), Some("/lib"));
    }

    #[test]
    fn test_no_duplicate_segments() {
        let env = build(&base(), &[Override::append("PATH", "/bin")]);
        assert_eq!(env.get("PATH"), Some("/usr/bin:/bin"));
    }

    #[test]
    fn test_base_untouched() {
        let original = base();
        let _ = original.with(&[Override::replace("HOME", "/tmp")]);
        assert_eq!(original.get("HOME"), Some("/root"));
    }

    #[test]
    fn test_normalize_cflags() {
        assert_eq!(normalize_cflags(None), "-march=native -mtune=native -O3");
        assert_eq!(normalize_cflags(Some("  ")), "-march=native -mtune=native -O3");
        assert_eq!(normalize_cflags(Some("-march=skylake -O2")), "-march=skylake -O2");
    }

    #[test]
    fn test_avx512_flags() {
        let flags = with_avx512("-O3", true);
        assert!(flags.starts_with("-O3 -mavx512f"));
        assert_eq!(with_avx512(&flags, true), flags);
        assert_eq!(with_avx512("-O3", false), "-O3");
    }

    fn arb_override() -> impl Strategy<Value = Override> {
        let key = prop::sample::select(vec!["PATH", "LD_LIBRARY_PATH", "CFLAGS", "NEW"]);
        let value = prop::collection::vec("/[a-z]{1,4}", 1..3).prop_map(|v| v.join(":"));
        let mode = prop::sample::select(vec![Mode::Replace, Mode::AppendColon, Mode::PrependColon]);
        (key, value, mode).prop_map(|(key, value, mode)| Override {
            key: key.to_string(),
            value,
            mode,
        })
    }

    proptest! {
        #[test]
        fn path_overrides_are_idempotent(overrides in prop::collection::vec(arb_override(), 0..6)) {
            // Replace of the same key twice in one list is order dependent, keep one per key
            let mut seen = std::collections::HashSet::new();
            let overrides: Vec<Override> = overrides
                .into_iter()
                .filter(|o| seen.insert(o.key.clone()))
                .collect();

            let once = build(&base(), &overrides);
            let twice = build(&once, &overrides);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn no_stray_separators(overrides in prop::collection::vec(arb_override(), 0..6)) {
            let env = build(&base(), &overrides);
            for (_, value) in env.iter() {
                prop_assert!(!value.starts_with(':'));
                prop_assert!(!value.ends_with(':'));
                prop_assert!(!value.contains("::"));
            }
        }
    }
}
