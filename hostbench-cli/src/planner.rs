//! Benchmark Planner
//!
//! Builds the execution plan from the suite registry and the exclusion list.
//! Registry order is the run order; excluded benchmarks stay in the plan so
//! the report can list them as skipped.

use hostbench_core::Benchmark;

/// One benchmark in the plan
pub struct PlannedBenchmark {
    /// The benchmark
    pub benchmark: Box<dyn Benchmark>,
    /// Excluded by the caller
    pub skip: bool,
}

/// Execution plan for benchmarks
pub struct ExecutionPlan {
    /// Benchmarks in run order
    pub benchmarks: Vec<PlannedBenchmark>,
    /// Exclusions that matched no benchmark
    pub unknown: Vec<String>,
}

impl ExecutionPlan {
    /// Ids of the benchmarks that will run
    pub fn selected_ids(&self) -> Vec<&'static str> {
        self.benchmarks
            .iter()
            .filter(|p| !p.skip)
            .map(|p| p.benchmark.id())
            .collect()
    }

    /// Number of benchmarks that will run
    pub fn selected_count(&self) -> usize {
        self.benchmarks.iter().filter(|p| !p.skip).count()
    }
}

/// Build execution plan from the registry
///
/// Exclusions match benchmark ids case-insensitively.
pub fn build_plan(
    benchmarks: impl IntoIterator<Item = Box<dyn Benchmark>>,
    exclude: &[String],
) -> ExecutionPlan {
    let exclude: Vec<String> = exclude.iter().map(|e| e.trim().to_lowercase()).collect();

    let benchmarks: Vec<PlannedBenchmark> = benchmarks
        .into_iter()
        .map(|benchmark| {
            let skip = exclude.iter().any(|e| e == benchmark.id());
            PlannedBenchmark { benchmark, skip }
        })
        .collect();

    let unknown = exclude
        .into_iter()
        .filter(|e| !benchmarks.iter().any(|p| p.benchmark.id() == e))
        .collect();

    ExecutionPlan {
        benchmarks,
        unknown,
    }
}
