//! High-Performance Linpack
//!
//! `Make.<arch>` is rendered from a vendor template (MKL on Intel, BLIS on
//! AMD, OpenBLAS otherwise) and the parameter file from `HPL.dat` with the
//! problem-size ladder, block size and process grid substituted.

use crate::prereq::MKL_DIR;
use crate::{Layout, SuiteOptions};
use hostbench_core::driver::{
    Benchmark, ConfigStep, HostContext, MeasureContext, Measurement, Package,
};
use hostbench_core::env::{Override, with_avx512};
use hostbench_core::exec::Invocation;
use hostbench_core::facts::Vendor;
use hostbench_core::measure::measure;
use hostbench_core::sizing::{compute_n, grid, nb_size, scale_n};
use hostbench_core::{DriverError, Sample, Source};
use regex::{NoExpand, Regex};
use std::path::{Path, PathBuf};

const DAT_NAME: &str = "HPL.hostbench.dat";

/// HPL benchmark, best GFLOPS over the problem-size ladder
pub struct Linpack {
    layout: Layout,
    version: String,
    arch: String,
}

impl Linpack {
    /// New benchmark from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.linpack.clone(),
            arch: opts.arch.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("hpl")
    }

    fn bin_dir(&self) -> PathBuf {
        self.dir().join("bin").join(&self.arch)
    }

    fn mpi_bin(&self) -> PathBuf {
        self.layout.openmpi_build().join("bin")
    }

    /// Template name and math library directory for the host
    fn math_library(&self, vendor: Option<Vendor>) -> (&'static str, PathBuf) {
        let blis = self.layout.src_join("blis");
        match vendor {
            Some(Vendor::Intel) if Path::new(MKL_DIR).is_dir() => ("Make.intel", PathBuf::from(MKL_DIR)),
            Some(Vendor::Amd) if blis.is_dir() => ("Make.amd", blis),
            _ => ("Make.generic", self.layout.src_join("openblas")),
        }
    }
}

fn read_template(path: &Path) -> Result<String, DriverError> {
    std::fs::read_to_string(path).map_err(|e| {
        DriverError::Configuration(format!("template {} could not be read: {e}", path.display()))
    })
}

/// Apply `(pattern, replacement)` to every line, keeping line endings
fn substitute(template: &str, rules: &[(Regex, String)]) -> String {
    template
        .split_inclusive('\n')
        .map(|line| {
            rules.iter().fold(line.to_string(), |acc, (pattern, with)| {
                pattern.replace_all(&acc, NoExpand(with)).into_owned()
            })
        })
        .collect()
}

/// Render `Make.<arch>` from a vendor template
pub(crate) fn render_makefile(
    template: &str,
    arch: &str,
    top: &Path,
    math_lib: &Path,
    mpicc: &Path,
    cflags: &str,
) -> String {
    let rules = [
        ("ARCH         = x86_64", format!("ARCH         = {arch}")),
        ("TOPdir       =", format!("TOPdir       = {}", top.display())),
        ("LAdir        =", format!("LAdir        = {}", math_lib.display())),
        (
            "CC           =",
            format!("CC           = {} {cflags} -lgomp -fopenmp", mpicc.display()),
        ),
    ];
    template
        .split_inclusive('\n')
        .map(|line| {
            rules
                .iter()
                .fold(line.to_string(), |acc, (from, to)| acc.replace(from, to))
        })
        .collect()
}

/// Render the HPL parameter file for a ladder, block size and grid
pub(crate) fn render_dat(
    template: &str,
    sizes: &[u64],
    nb: u64,
    (p, q): (u64, u64),
) -> Result<String, DriverError> {
    let ladder = sizes
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let rules = [
        (r"\d+\s+# of problems sizes \(N\)", format!("{}      # of problems sizes (N)", sizes.len())),
        (r"(\d+\s)+\s*Ns", format!("{ladder}   Ns")),
        (r"(\d+\s)+\s*NBs", format!("{nb}    NBs")),
        (r"\d+\s+# of process grids \(P x Q\)", "1  # of process grids (P x Q)".to_string()),
        (r"([0-9]+\s+)+Ps", format!("{p}  Ps")),
        (r"([0-9]+\s+)+Qs", format!("{q}  Qs")),
    ];
    let rules = rules
        .into_iter()
        .map(|(pattern, with)| {
            Regex::new(pattern)
                .map(|re| (re, with))
                .map_err(|e| DriverError::Configuration(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(substitute(template, &rules))
}

/// Best GFLOPS among result rows for the given block size and grid
pub(crate) fn parse_gflops(output: &str, nb: u64, (p, q): (u64, u64)) -> Option<f64> {
    let row = Regex::new(&format!(r"\s+{nb}\s+{p}\s+{q}\s+")).ok()?;
    output
        .lines()
        .filter(|line| row.is_match(line))
        .filter_map(|line| line.split_whitespace().nth(6)?.parse::<f64>().ok())
        .reduce(f64::max)
}

impl Package for Linpack {
    fn id(&self) -> &'static str {
        "linpack"
    }

    fn name(&self) -> &'static str {
        "High-Performance Linpack"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://www.netlib.org/benchmark/hpl/hpl-{}.tar.gz",
                self.version
            )),
            archive: self.layout.src_join(format!("hpl-{}.tar.gz", self.version)),
            extracted: Some(format!("hpl-{}", self.version)),
            target: self.dir(),
            hint: None,
        }
    }

    fn configure(&self, host: &HostContext<'_>) -> Result<Vec<ConfigStep>, DriverError> {
        let (template, math_lib) = self.math_library(host.facts.vendor);
        tracing::info!(template, math_lib = %math_lib.display(), "selected HPL makefile");

        let cflags = with_avx512(&host.cflags(), host.avx512);
        let makefile = render_makefile(
            &read_template(&self.layout.provided().join(template))?,
            &self.arch,
            &self.dir(),
            &math_lib,
            &self.mpi_bin().join("mpicc"),
            &cflags,
        );

        let memory = host
            .facts
            .memory_bytes
            .ok_or_else(|| DriverError::Configuration("memory size is unknown".into()))?;
        let nb = nb_size(host.threads())?;
        let sizes = scale_n(compute_n(memory.get(), nb)?, nb)?;
        let dat = render_dat(
            &read_template(&self.layout.provided().join("HPL.dat"))?,
            &sizes,
            nb,
            grid(u64::from(host.cores()))?,
        )?;

        Ok(vec![
            ConfigStep::File {
                path: self.dir().join(format!("Make.{}", self.arch)),
                contents: makefile,
            },
            ConfigStep::File {
                path: self.dir().join(DAT_NAME),
                contents: dat,
            },
        ])
    }

    fn binary(&self) -> PathBuf {
        self.bin_dir().join("xhpl")
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        let arch = &self.arch;
        let cores = host.cores();
        let env = host.env_with(&[
            Override::replace("CFLAGS", with_avx512(&host.cflags(), host.avx512)),
            Override::replace("OMP_NUM_THREADS", host.threads().to_string()),
        ]);
        Ok(vec![
            Invocation::new(
                format!("make -s -j {cores} all arch={arch} || make -s -j {cores} all arch={arch}"),
                self.dir(),
                env.clone(),
            ),
            Invocation::new(
                format!("make -s -j {cores} install arch={arch}"),
                self.dir(),
                env,
            ),
        ])
    }
}

impl Benchmark for Linpack {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let bin_dir = self.bin_dir();
        std::fs::copy(self.dir().join(DAT_NAME), bin_dir.join("HPL.dat"))?;

        let cores = cx.host.cores();
        let nb = nb_size(cx.host.threads())?;
        let grid = grid(u64::from(cores))?;

        let mut command = format!(
            "{} -n {cores} --allow-run-as-root",
            self.mpi_bin().join("mpirun").display()
        );
        if cx.host.threads() != cores {
            command.push_str(" --mca mpi_paffinity_alone 1");
        }
        command.push_str(" ./xhpl");
        let invocation = Invocation::new(command, &bin_dir, cx.env(&[]));

        let samples = measure(cx.repetitions, cx.quiesce, |rep| {
            let output = cx.runner.run(&invocation).ok()?;
            cx.save_raw(&format!("linpack_run{}.txt", rep + 1), &output.stdout);
            parse_gflops(&output.stdout, nb, grid).map(Sample::Scalar)
        })?;
        Ok(Measurement::scalar("GFLOPS", samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAKE_TEMPLATE: &str = "\
SHELL        = /bin/sh
ARCH         = x86_64
TOPdir       =
LAdir        =
CC           =
";

    const DAT_TEMPLATE: &str = "\
HPLinpack benchmark input file
HPL.out      output file name (if any)
6            device out (6=stdout,7=stderr,file)
4            # of problems sizes (N)
29 30 34 35  Ns
4            # of NBs
1 2 3 4      NBs
0            PMAP process mapping (0=Row-,1=Column-major)
3            # of process grids (P x Q)
2 1 4        Ps
2 4 1        Qs
16.0         threshold
";

    #[test]
    fn test_render_makefile() {
        let out = render_makefile(
            MAKE_TEMPLATE,
            "x86_64",
            Path::new("/r/src/hpl"),
            Path::new("/r/src/openblas"),
            Path::new("/r/src/openmpi/build/bin/mpicc"),
            "-O3",
        );
        assert_eq!(
            out,
            "\
SHELL        = /bin/sh
ARCH         = x86_64
TOPdir       = /r/src/hpl
LAdir        = /r/src/openblas
CC           = /r/src/openmpi/build/bin/mpicc -O3 -lgomp -fopenmp
"
        );
    }

    #[test]
    fn test_render_dat() {
        let out = render_dat(DAT_TEMPLATE, &[10752, 13440], 192, (8, 14)).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[3], "2      # of problems sizes (N)");
        assert_eq!(lines[4], "10752 13440   Ns");
        assert_eq!(lines[6], "192    NBs");
        assert_eq!(lines[8], "1  # of process grids (P x Q)");
        assert_eq!(lines[9], "8  Ps");
        assert_eq!(lines[10], "14  Qs");
        assert_eq!(lines[11], "16.0         threshold");
    }

    #[test]
    fn test_render_dat_is_stable() {
        let once = render_dat(DAT_TEMPLATE, &[1152], 192, (2, 2)).unwrap();
        let twice = render_dat(&once, &[1152], 192, (2, 2)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_gflops_takes_best_row() {
        let output = "\
T/V                N    NB     P     Q               Time                 Gflops
--------------------------------------------------------------------------------
WR11C2R4       10752   192     8    14              12.34              6.695e+01
WR11C2R4       13440   192     8    14              20.01              8.120e+01
WR11C2R4       13440   256     8    14              20.01              9.999e+01
";
        assert_eq!(parse_gflops(output, 192, (8, 14)), Some(81.2));
        assert_eq!(parse_gflops(output, 384, (8, 14)), None);
    }

    #[test]
    fn test_generic_template_without_vendor_libraries() {
        let opts = SuiteOptions::new("/nonexistent/hostbench");
        let linpack = Linpack::new(&opts);
        let (template, lib) = linpack.math_library(Some(Vendor::Amd));
        assert_eq!(template, "Make.generic");
        assert_eq!(lib, PathBuf::from("/nonexistent/hostbench/src/openblas"));
    }
}
