//! YCSB workload A against Cassandra or MySQL
//!
//! Setup creates the `ycsb` schema and loads the records once, with the
//! database running; the schema directory and a load marker make both steps
//! resumable. Each measurement starts the database, runs the workload once
//! per repetition, and stops the database on every exit path.

use crate::prereq::{cassandra_daemon, connector_jar, maven_overrides, mysql_daemon, mysql_data};
use crate::{DaemonTiming, Layout, SuiteOptions, csv_metric};
use hostbench_core::daemon::{DaemonGuard, DaemonSpec};
use hostbench_core::driver::{
    Benchmark, ConfigStep, HostContext, MeasureContext, Measurement, Package,
};
use hostbench_core::env::Environment;
use hostbench_core::exec::Invocation;
use hostbench_core::measure::measure;
use hostbench_core::{DriverError, Sample, Source};
use std::path::PathBuf;

const POSITIONS: [(&str, &str); 3] = [
    ("throughput", "ops/sec"),
    ("read p95", "us"),
    ("update p95", "us"),
];

const CASSANDRA_SCHEMA: &str = "\
CREATE KEYSPACE ycsb WITH REPLICATION = {'class' : 'SimpleStrategy', 'replication_factor': 1};
USE ycsb;
CREATE TABLE usertable (
    y_id varchar PRIMARY KEY,
    field0 varchar, field1 varchar, field2 varchar, field3 varchar, field4 varchar,
    field5 varchar, field6 varchar, field7 varchar, field8 varchar, field9 varchar
);
";

const MYSQL_SCHEMA: &str = "\
CREATE DATABASE IF NOT EXISTS ycsb;
USE ycsb;
CREATE TABLE IF NOT EXISTS usertable (
    YCSB_KEY VARCHAR(255) PRIMARY KEY,
    FIELD0 TEXT, FIELD1 TEXT, FIELD2 TEXT, FIELD3 TEXT, FIELD4 TEXT,
    FIELD5 TEXT, FIELD6 TEXT, FIELD7 TEXT, FIELD8 TEXT, FIELD9 TEXT
);
";

const JDBC_PROPERTIES: &str = "-p db.driver=com.mysql.jdbc.Driver \
-p db.url=jdbc:mysql://localhost:3306/ycsb?useSSL=false \
-p db.user=root -p db.passwd=\"\"";

/// Database behind the workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Store {
    Cassandra,
    MySql,
}

impl Store {
    fn binding(self) -> &'static str {
        match self {
            Store::Cassandra => "cassandra-cql",
            Store::MySql => "jdbc",
        }
    }

    fn properties(self) -> &'static str {
        match self {
            Store::Cassandra => "-p hosts=\"localhost\"",
            Store::MySql => JDBC_PROPERTIES,
        }
    }

    /// Records loaded and operations run
    fn count(self) -> u64 {
        match self {
            Store::Cassandra => 10_000_000,
            Store::MySql => 1_000_000,
        }
    }
}

/// `ycsb load` or `ycsb run` command line
fn ycsb_command(store: Store, phase: &str, threads: u32) -> String {
    let count = match phase {
        "load" => "recordcount",
        _ => "operationcount",
    };
    format!(
        "./bin/ycsb {phase} {} -s -P workloads/workloada {} -threads {threads} -p {count}={}",
        store.binding(),
        store.properties(),
        store.count()
    )
}

/// Throughput, read p95 and update p95 of one run; `None` on failed operations
pub(crate) fn parse_run(output: &str) -> Option<Vec<f64>> {
    if output.contains("UPDATE-FAILED") || output.contains("READ-FAILED") {
        tracing::warn!("YCSB reported failed operations");
        return None;
    }
    Some(vec![
        csv_metric(output, "[OVERALL], Throughput(ops/sec),")?,
        csv_metric(output, "[READ], 95thPercentileLatency(us),")?,
        csv_metric(output, "[UPDATE], 95thPercentileLatency(us),")?,
    ])
}

/// YCSB client driving one database
pub struct Ycsb {
    layout: Layout,
    version: String,
    jconnect: String,
    daemons: DaemonTiming,
    store: Store,
}

impl Ycsb {
    /// YCSB over Cassandra
    pub fn nosql(opts: &SuiteOptions) -> Self {
        Self::with_store(opts, Store::Cassandra)
    }

    /// YCSB over MySQL through JDBC
    pub fn sql(opts: &SuiteOptions) -> Self {
        Self::with_store(opts, Store::MySql)
    }

    fn with_store(opts: &SuiteOptions, store: Store) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.ycsb.clone(),
            jconnect: opts.versions.jconnect.clone(),
            daemons: opts.daemons,
            store,
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("ycsb")
    }

    fn load_marker(&self) -> PathBuf {
        self.dir().join(format!(".hostbench-loaded-{}", self.store.binding()))
    }

    fn daemon(&self, env: Environment) -> DaemonSpec {
        match self.store {
            Store::Cassandra => cassandra_daemon(&self.layout, self.daemons, env),
            Store::MySql => mysql_daemon(&self.layout, self.daemons, env),
        }
    }
}

impl Package for Ycsb {
    fn id(&self) -> &'static str {
        match self.store {
            Store::Cassandra => "nosql",
            Store::MySql => "sql",
        }
    }

    fn name(&self) -> &'static str {
        match self.store {
            Store::Cassandra => "YCSB NoSQL",
            Store::MySql => "YCSB SQL",
        }
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://github.com/brianfrankcooper/YCSB/releases/download/{v}/ycsb-{v}.tar.gz",
                v = self.version
            )),
            archive: self.layout.src_join(format!("ycsb-{}.tar.gz", self.version)),
            extracted: Some(format!("ycsb-{}", self.version)),
            target: self.dir(),
            hint: None,
        }
    }

    fn configure(&self, host: &HostContext<'_>) -> Result<Vec<ConfigStep>, DriverError> {
        let env = host.env_with(&maven_overrides(&self.layout));
        let mut steps = Vec::new();

        match self.store {
            Store::Cassandra => {
                let schema = self.dir().join("hostbench/create-table.cql");
                steps.push(ConfigStep::File {
                    path: schema.clone(),
                    contents: CASSANDRA_SCHEMA.to_string(),
                });
                steps.push(ConfigStep::Command {
                    invocation: Invocation::new(
                        format!("./bin/cqlsh -f {}", schema.display()),
                        self.layout.src_join("cassandra"),
                        env.clone(),
                    ),
                    produces: self.layout.src_join("cassandra/data/data/ycsb"),
                });
            }
            Store::MySql => {
                let schema = self.dir().join("hostbench/create-table.mysql");
                let jar = connector_jar(&self.jconnect);
                let binding_lib = self.dir().join("jdbc-binding/lib");
                steps.push(ConfigStep::File {
                    path: schema.clone(),
                    contents: MYSQL_SCHEMA.to_string(),
                });
                steps.push(ConfigStep::Command {
                    invocation: Invocation::new(
                        format!(
                            "cp {} {}/",
                            self.layout.src_join("mysql-connector-java").join(&jar).display(),
                            binding_lib.display()
                        ),
                        self.dir(),
                        env.clone(),
                    ),
                    produces: binding_lib.join(&jar),
                });
                steps.push(ConfigStep::Command {
                    invocation: Invocation::new(
                        format!("./bin/mysql -uroot --skip-password < {}", schema.display()),
                        self.layout.src_join("mysql"),
                        env.clone(),
                    ),
                    produces: mysql_data(&self.layout).join("ycsb"),
                });
            }
        }

        steps.push(ConfigStep::Command {
            invocation: Invocation::new(
                format!(
                    "{} && touch {}",
                    ycsb_command(self.store, "load", host.threads()),
                    self.load_marker().display()
                ),
                self.dir(),
                env,
            ),
            produces: self.load_marker(),
        });
        Ok(steps)
    }

    fn binary(&self) -> PathBuf {
        self.dir().join("bin/ycsb")
    }

    fn build(&self, _host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(Vec::new())
    }

    fn service(&self, host: &HostContext<'_>) -> Option<DaemonSpec> {
        Some(self.daemon(host.env_with(&maven_overrides(&self.layout))))
    }
}

impl Benchmark for Ycsb {
    fn measure(&self, cx: &MeasureContext<'_>) -> Result<Measurement, DriverError> {
        let env = cx.env(&maven_overrides(&self.layout));
        let invocation = Invocation::new(
            ycsb_command(self.store, "run", cx.host.threads()),
            self.dir(),
            env.clone(),
        );

        let daemon = DaemonGuard::start(cx.runner, &self.daemon(env))?;
        let samples = measure(cx.repetitions, cx.quiesce, |rep| {
            let output = cx.runner.run(&invocation).ok()?;
            cx.save_raw(&format!("ycsb-{}_run{}.txt", self.id(), rep + 1), &output.stdout);
            parse_run(&output.stdout).map(Sample::Vector)
        });
        if !daemon.stop() {
            tracing::warn!(benchmark = self.id(), "database had to be killed");
        }

        Ok(Measurement::per_position(&POSITIONS, samples?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
[OVERALL], RunTime(ms), 81234
[OVERALL], Throughput(ops/sec), 12310.5
[READ], Operations, 499875
[READ], 95thPercentileLatency(us), 712
[UPDATE], Operations, 500125
[UPDATE], 95thPercentileLatency(us), 845
";

    #[test]
    fn test_parse_run() {
        assert_eq!(parse_run(OUTPUT), Some(vec![12310.5, 712.0, 845.0]));
    }

    #[test]
    fn test_units_follow_positions() {
        let sample = Sample::Vector(parse_run(OUTPUT).unwrap());
        let m = Measurement::per_position(&POSITIONS, vec![sample]);
        assert_eq!(m.unit.to_string(), "ops/sec, us, us");
        assert_eq!(m.unit.at(0), Some("ops/sec"));
        assert_eq!(m.unit.at(2), Some("us"));
        assert_eq!(m.labels, ["throughput", "read p95", "update p95"]);
    }

    #[test]
    fn test_failed_operations_drop_the_sample() {
        let failed = format!("{OUTPUT}[UPDATE-FAILED], Operations, 12\n");
        assert_eq!(parse_run(&failed), None);
    }

    #[test]
    fn test_missing_metric_drops_the_sample() {
        assert_eq!(parse_run("[OVERALL], Throughput(ops/sec), 1.0\n"), None);
    }

    #[test]
    fn test_commands() {
        assert_eq!(
            ycsb_command(Store::Cassandra, "load", 8),
            "./bin/ycsb load cassandra-cql -s -P workloads/workloada -p hosts=\"localhost\" -threads 8 -p recordcount=10000000"
        );
        assert_eq!(
            ycsb_command(Store::MySql, "run", 4),
            "./bin/ycsb run jdbc -s -P workloads/workloada -p db.driver=com.mysql.jdbc.Driver -p db.url=jdbc:mysql://localhost:3306/ycsb?useSSL=false -p db.user=root -p db.passwd=\"\" -threads 4 -p operationcount=1000000"
        );
    }

    #[test]
    fn test_ids() {
        let opts = SuiteOptions::new("/r");
        assert_eq!(Ycsb::nosql(&opts).id(), "nosql");
        assert_eq!(Ycsb::sql(&opts).id(), "sql");
    }
}
