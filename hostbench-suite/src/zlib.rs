//! zlib compression and decompression times
//!
//! Each repetition times `minigzip -6` over the corpus and `minigzip -d`
//! over its output, both preceded by an untimed warm-up pass.

use crate::{Layout, SuiteOptions};
use hostbench_core::driver::{Benchmark, HostContext, MeasureContext, Measurement, Package};
use hostbench_core::env::Override;
use hostbench_core::exec::Invocation;
use hostbench_core::measure::measure;
use hostbench_core::{DriverError, Sample, Source};
use std::path::{Path, PathBuf};

const LEVEL: u32 = 6;

/// zlib `minigzip` timings
pub struct Zlib {
    layout: Layout,
    version: String,
}

impl Zlib {
    /// New benchmark from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.zlib.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("zlib")
    }

    fn corpus_dir(&self) -> PathBuf {
        self.layout.src_join("corpus")
    }

    /// 64-bit build when present
    fn tool(&self) -> PathBuf {
        let wide = self.dir().join("minigzip64");
        if wide.exists() { wide } else { self.binary() }
    }
}

/// Warm-up and timed command pairs for compression and decompression
pub(crate) fn commands(tool: &Path, corpus: &str) -> [(String, String); 2] {
    let tool = tool.display();
    [
        (
            format!("{tool} -1 < {corpus} > /dev/null"),
            format!("{tool} -{LEVEL} < {corpus} > {corpus}.zlib"),
        ),
        (
            format!("{tool} -d < {corpus}.zlib > /dev/null"),
            format!("{tool} -d < {corpus}.zlib > /dev/null"),
        ),
    ]
}

impl Package for Zlib {
    fn id(&self) -> &'static str {
        "zlib"
    }

    fn name(&self) -> &'static str {
        "zlib"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!("https://zlib.net/zlib-{}.tar.gz", self.version)),
            archive: self.layout.src_join(format!("zlib-{}.tar.gz", self.version)),
            extracted: Some(format!("zlib-{}", self.version)),
            target: self.dir(),
            hint: None,
        }
    }

    fn binary(&self) -> PathBuf {
        self.dir().join("minigzip")
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(vec![Invocation::new(
            format!("./configure && make -j {}", host.cores()),
            self.dir(),
            host.env_with(&[Override::replace("CFLAGS", host.cflags())]),
        )])
    }
}

impl Benchmark for Zlib {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let corpus_dir = self.corpus_dir();
        let corpus = corpus_dir.join("corpus.txt");
        if !corpus.exists() {
            return Err(DriverError::Measurement(format!(
                "corpus {} could not be found",
                corpus.display()
            )));
        }

        let env = cx.env(&[]);
        let steps = commands(&self.tool(), "corpus.txt").map(|(warmup, timed)| {
            (
                Invocation::new(warmup, &corpus_dir, env.clone()),
                Invocation::new(timed, &corpus_dir, env.clone()),
            )
        });

        let samples = measure(cx.repetitions, cx.quiesce, |rep| {
            let mut times = Vec::with_capacity(steps.len());
            for (i, (warmup, timed)) in steps.iter().enumerate() {
                if i > 0 {
                    cx.quiesce.quiesce();
                }
                cx.runner.run(warmup).ok()?;
                times.push(cx.runner.run_timed(timed).ok()??);
            }
            cx.save_raw(
                &format!("zlib_run{}.txt", rep + 1),
                &format!(
                    "Compress Time (Level {LEVEL}):  {}\nDecompress Time:          {}\n",
                    times[0], times[1]
                ),
            );
            Some(Sample::Vector(times))
        });

        let _ = std::fs::remove_file(corpus_dir.join("corpus.txt.zlib"));
        Ok(Measurement::vector("s", &["compress", "decompress"], samples?))
    }
}
