//! Prerequisites built or unpacked from source
//!
//! These go through the same fetch, unpack, configure and build steps as the
//! benchmarks but are never measured. Cassandra and MySQL also provide the
//! daemon specs the YCSB benchmarks run against. MKL and BLIS are the
//! vendor math libraries HPL links against in place of OpenBLAS.

use crate::{DaemonTiming, Layout, SuiteOptions};
use hostbench_core::daemon::DaemonSpec;
use hostbench_core::driver::{ConfigStep, HostContext, Package};
use hostbench_core::env::{Environment, Override, with_avx512};
use hostbench_core::exec::Invocation;
use hostbench_core::{DriverError, Source};
use std::path::PathBuf;

/// Install prefix of the MKL installer
pub(crate) const MKL_DIR: &str = "/opt/intel/mkl";
/// Install prefix of the private glibc
pub(crate) const GLIBC_PREFIX: &str = "/usr/local/glibc";

const MKL_PAGE: &str = "https://software.intel.com/en-us/mkl";
const BLIS_PAGE: &str = "http://developer.amd.com/amd-cpu-libraries/blas-library/";

/// `major.minor` of a dotted version
fn major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

// ─── OpenMPI ────────────────────────────────────────────────────────────────

/// OpenMPI, installed into `openmpi/build`
pub struct OpenMpi {
    layout: Layout,
    version: String,
}

impl OpenMpi {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.openmpi.clone(),
        }
    }
}

impl Package for OpenMpi {
    fn id(&self) -> &'static str {
        "openmpi"
    }

    fn name(&self) -> &'static str {
        "OpenMPI"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://www.open-mpi.org/software/ompi/v{}/downloads/openmpi-{}.tar.gz",
                major_minor(&self.version),
                self.version
            )),
            archive: self.layout.src_join(format!("openmpi-{}.tar.gz", self.version)),
            extracted: Some(format!("openmpi-{}", self.version)),
            target: self.layout.src_join("openmpi"),
            hint: None,
        }
    }

    fn binary(&self) -> PathBuf {
        self.layout.openmpi_build().join("bin/mpicc")
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        let build = self.layout.openmpi_build();
        let env = host.env_with(&[Override::replace("CFLAGS", host.cflags())]);
        let cores = host.cores();
        Ok(vec![
            Invocation::new(
                format!("mkdir -p {}", build.display()),
                self.layout.src(),
                env.clone(),
            ),
            Invocation::new(
                format!("../configure --prefix={}", build.display()),
                &build,
                env.clone(),
            ),
            Invocation::new(format!("make -s -j {cores} all"), &build, env.clone()),
            Invocation::new(format!("make -s -j {cores} install"), &build, env),
        ])
    }
}

// ─── OpenBLAS ───────────────────────────────────────────────────────────────

/// OpenBLAS, the math library for generic HPL builds
pub struct OpenBlas {
    layout: Layout,
    version: String,
}

impl OpenBlas {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.openblas.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("openblas")
    }
}

impl Package for OpenBlas {
    fn id(&self) -> &'static str {
        "openblas"
    }

    fn name(&self) -> &'static str {
        "OpenBLAS"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://github.com/xianyi/OpenBLAS/archive/v{}.tar.gz",
                self.version
            )),
            archive: self.layout.src_join(format!("openblas-{}.tar.gz", self.version)),
            extracted: Some(format!("OpenBLAS-{}", self.version)),
            target: self.dir(),
            hint: None,
        }
    }

    fn binary(&self) -> PathBuf {
        self.dir().join("libopenblas.so")
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        let mpi = self.layout.openmpi_build().join("bin");
        let env = host.env_with(&[
            Override::replace("CFLAGS", with_avx512(&host.cflags(), host.avx512)),
            Override::replace("OMP_NUM_THREADS", host.threads().to_string()),
        ]);
        Ok(vec![Invocation::new(
            format!(
                "make -j {} FC={} CC={} USE_OPENMP=1 USE_THREAD=1",
                host.cores(),
                mpi.join("mpifort").display(),
                mpi.join("mpicc").display()
            ),
            self.dir(),
            env,
        )])
    }
}

// ─── MKL ─────────────────────────────────────────────────────────────────────

/// Intel MKL, installed silently into `/opt/intel/mkl`
pub struct Mkl {
    layout: Layout,
    version: String,
    url: Option<String>,
}

impl Mkl {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.mkl.clone(),
            url: opts.mkl_url.clone(),
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.src_join("mkl")
    }
}

impl Package for Mkl {
    fn id(&self) -> &'static str {
        "mkl"
    }

    fn name(&self) -> &'static str {
        "Intel MKL"
    }

    fn source(&self) -> Source {
        let archive = self.layout.src_join(format!("l_mkl_{}.tgz", self.version));
        Source::Archive {
            url: self.url.clone(),
            hint: Some(format!(
                "download MKL from {MKL_PAGE} and place it at {}",
                archive.display()
            )),
            archive,
            extracted: Some(format!("l_mkl_{}", self.version)),
            target: self.dir(),
        }
    }

    fn binary(&self) -> PathBuf {
        PathBuf::from(MKL_DIR)
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        let dir = self.dir();
        Ok(vec![Invocation::new(
            format!(
                "{}/install.sh --silent \"{}\"",
                dir.display(),
                self.layout.provided().join("silent.cfg").display()
            ),
            &dir,
            host.env.clone(),
        )])
    }
}

// ─── BLIS ───────────────────────────────────────────────────────────────────

/// AMD BLIS binary release, unpacked into `blis`
pub struct Blis {
    layout: Layout,
    version: String,
    url: Option<String>,
}

impl Blis {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.blis.clone(),
            url: opts.blis_url.clone(),
        }
    }
}

impl Package for Blis {
    fn id(&self) -> &'static str {
        "blis"
    }

    fn name(&self) -> &'static str {
        "AMD BLIS"
    }

    fn source(&self) -> Source {
        let archive = self
            .layout
            .src_join(format!("AMD-BLIS-Linux-{}.tar.gz", self.version));
        Source::Archive {
            url: self.url.clone(),
            hint: Some(format!(
                "download BLIS from {BLIS_PAGE} and place it at {}",
                archive.display()
            )),
            archive,
            extracted: Some(format!("amd-blis-{}", self.version.to_lowercase())),
            target: self.layout.src_join("blis"),
        }
    }

    fn binary(&self) -> PathBuf {
        self.layout.src_join("blis/lib")
    }

    fn build(&self, _host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(Vec::new())
    }
}

// ─── glibc ──────────────────────────────────────────────────────────────────

/// glibc built from source and installed under `/usr/local/glibc`
pub struct Glibc {
    layout: Layout,
    version: String,
}

impl Glibc {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.glibc.clone(),
        }
    }

    fn build_dir(&self) -> PathBuf {
        self.layout.src_join("glibc/build")
    }
}

/// Dynamic loader of an installed private glibc
pub(crate) fn glibc_loader(version: &str) -> PathBuf {
    PathBuf::from(format!("{GLIBC_PREFIX}/lib/ld-{version}.so"))
}

/// CFLAGS glibc accepts: no fast-math, no `-O3`, and always some optimisation
pub(crate) fn glibc_cflags(cflags: &str) -> String {
    let mut flags: Vec<&str> = cflags
        .split_whitespace()
        .filter(|flag| !matches!(*flag, "-Ofast" | "-ffast-math" | "-O3"))
        .collect();
    if !flags.iter().any(|flag| flag.starts_with("-O")) {
        flags.push("-O2");
    }
    flags.join(" ")
}

impl Package for Glibc {
    fn id(&self) -> &'static str {
        "glibc"
    }

    fn name(&self) -> &'static str {
        "glibc"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://ftp.gnu.org/gnu/glibc/glibc-{}.tar.gz",
                self.version
            )),
            archive: self.layout.src_join(format!("glibc-{}.tar.gz", self.version)),
            extracted: Some(format!("glibc-{}", self.version)),
            target: self.layout.src_join("glibc"),
            hint: None,
        }
    }

    fn binary(&self) -> PathBuf {
        glibc_loader(&self.version)
    }

    fn build(&self, host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        let build = self.build_dir();
        let env = host.env_with(&[Override::replace("CFLAGS", glibc_cflags(&host.cflags()))]);
        let cores = host.cores();
        Ok(vec![
            Invocation::new(
                format!("mkdir -p {}", build.display()),
                self.layout.src(),
                env.clone(),
            ),
            Invocation::new(
                format!("../configure --prefix={GLIBC_PREFIX}"),
                &build,
                env.clone(),
            ),
            Invocation::new(format!("make -j {cores}"), &build, env.clone()),
            Invocation::new(format!("sudo -E make -j {cores} install"), &build, env),
        ])
    }
}

// ─── Maven ──────────────────────────────────────────────────────────────────

/// Maven binary distribution, needed by the YCSB launcher
pub struct Maven {
    layout: Layout,
    version: String,
}

impl Maven {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.maven.clone(),
        }
    }
}

/// `M2_HOME` and `M2` for a Maven install
pub(crate) fn maven_overrides(layout: &Layout) -> Vec<Override> {
    let home = layout.src_join("maven");
    vec![
        Override::replace("M2_HOME", home.display().to_string()),
        Override::replace("M2", home.join("bin").display().to_string()),
    ]
}

impl Package for Maven {
    fn id(&self) -> &'static str {
        "maven"
    }

    fn name(&self) -> &'static str {
        "Maven"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://archive.apache.org/dist/maven/maven-{}/{v}/binaries/apache-maven-{v}-bin.tar.gz",
                crate::major(&self.version),
                v = self.version
            )),
            archive: self.layout.src_join(format!("apache-maven-{}-bin.tar.gz", self.version)),
            extracted: Some(format!("apache-maven-{}", self.version)),
            target: self.layout.src_join("maven"),
            hint: None,
        }
    }

    fn binary(&self) -> PathBuf {
        self.layout.src_join("maven/bin/mvn")
    }

    fn build(&self, _host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(Vec::new())
    }
}

// ─── Cassandra ──────────────────────────────────────────────────────────────

/// Cassandra binary distribution
pub struct Cassandra {
    layout: Layout,
    version: String,
}

impl Cassandra {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.cassandra.clone(),
        }
    }
}

/// Foreground-less Cassandra started as root with a PID file
pub(crate) fn cassandra_daemon(layout: &Layout, timing: DaemonTiming, env: Environment) -> DaemonSpec {
    let dir = layout.src_join("cassandra");
    DaemonSpec {
        name: "cassandra".into(),
        start: Invocation::new("./bin/cassandra -R -p /tmp/cassandra.pid", &dir, env),
        pid_file: PathBuf::from("/tmp/cassandra.pid"),
        log: dir.join("hostbench-daemon.log"),
        startup_timeout: timing.pid_timeout,
        warmup: timing.warmup,
        grace: timing.grace,
    }
}

impl Package for Cassandra {
    fn id(&self) -> &'static str {
        "cassandra"
    }

    fn name(&self) -> &'static str {
        "Cassandra"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://archive.apache.org/dist/cassandra/{v}/apache-cassandra-{v}-bin.tar.gz",
                v = self.version
            )),
            archive: self
                .layout
                .src_join(format!("apache-cassandra-{}-bin.tar.gz", self.version)),
            extracted: Some(format!("apache-cassandra-{}", self.version)),
            target: self.layout.src_join("cassandra"),
            hint: None,
        }
    }

    fn binary(&self) -> PathBuf {
        self.layout.src_join("cassandra/bin/cassandra")
    }

    fn build(&self, _host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(Vec::new())
    }
}

// ─── MySQL ──────────────────────────────────────────────────────────────────

/// MySQL binary distribution with an initialised, passwordless data directory
pub struct MySql {
    layout: Layout,
    version: String,
    glibc: String,
}

impl MySql {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.mysql.clone(),
            glibc: opts.versions.mysql_glibc.clone(),
        }
    }

    fn dist(&self) -> String {
        format!("mysql-{}-linux-glibc{}-x86_64", self.version, self.glibc)
    }
}

/// Data directory of the MySQL install
pub(crate) fn mysql_data(layout: &Layout) -> PathBuf {
    layout.src_join("mysql/mysql-files")
}

/// `mysqld_safe` as root on the install's data directory
pub(crate) fn mysql_daemon(layout: &Layout, timing: DaemonTiming, env: Environment) -> DaemonSpec {
    let dir = layout.src_join("mysql");
    let d = dir.display();
    DaemonSpec {
        name: "mysqld".into(),
        start: Invocation::new(
            format!(
                "{d}/bin/mysqld_safe --user=root --basedir={d} --datadir={} --plugin-dir={d}/lib/plugin --pid-file=/tmp/mysql.pid --log-error=ycsb.err",
                mysql_data(layout).display()
            ),
            &dir,
            env,
        ),
        pid_file: PathBuf::from("/tmp/mysql.pid"),
        log: dir.join("hostbench-daemon.log"),
        startup_timeout: timing.pid_timeout,
        warmup: timing.warmup,
        grace: timing.grace,
    }
}

impl Package for MySql {
    fn id(&self) -> &'static str {
        "mysql"
    }

    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://dev.mysql.com/get/Downloads/MySQL-{}/{}.tar.gz",
                major_minor(&self.version),
                self.dist()
            )),
            archive: self.layout.src_join(format!("{}.tar.gz", self.dist())),
            extracted: Some(self.dist()),
            target: self.layout.src_join("mysql"),
            hint: None,
        }
    }

    fn configure(&self, host: &HostContext<'_>) -> Result<Vec<ConfigStep>, DriverError> {
        let dir = self.layout.src_join("mysql");
        let data = mysql_data(&self.layout);
        let (d, f) = (dir.display(), data.display());
        Ok(vec![ConfigStep::Command {
            invocation: Invocation::new(
                format!(
                    "mkdir -p -m 0750 {f} && ./bin/mysqld --initialize-insecure --user=root --basedir={d} --datadir={f} && ./bin/mysql_ssl_rsa_setup --user=root --basedir={d} --datadir={f}"
                ),
                &dir,
                host.env.clone(),
            ),
            produces: data.join("mysql"),
        }])
    }

    fn binary(&self) -> PathBuf {
        self.layout.src_join("mysql/bin/mysqld")
    }

    fn build(&self, _host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(Vec::new())
    }
}

// ─── Connector/J ────────────────────────────────────────────────────────────

/// MySQL JDBC driver used by the YCSB `jdbc` binding
pub struct ConnectorJ {
    layout: Layout,
    version: String,
}

impl ConnectorJ {
    /// New package from suite options
    pub fn new(opts: &SuiteOptions) -> Self {
        Self {
            layout: opts.layout.clone(),
            version: opts.versions.jconnect.clone(),
        }
    }
}

/// Name of the Connector/J jar for a version
pub(crate) fn connector_jar(version: &str) -> String {
    format!("mysql-connector-java-{version}-bin.jar")
}

impl Package for ConnectorJ {
    fn id(&self) -> &'static str {
        "jconnect"
    }

    fn name(&self) -> &'static str {
        "MySQL Connector/J"
    }

    fn source(&self) -> Source {
        Source::Archive {
            url: Some(format!(
                "https://dev.mysql.com/get/Downloads/Connector-J/mysql-connector-java-{}.tar.gz",
                self.version
            )),
            archive: self
                .layout
                .src_join(format!("mysql-connector-java-{}.tar.gz", self.version)),
            extracted: Some(format!("mysql-connector-java-{}", self.version)),
            target: self.layout.src_join("mysql-connector-java"),
            hint: None,
        }
    }

    fn binary(&self) -> PathBuf {
        self.layout
            .src_join("mysql-connector-java")
            .join(connector_jar(&self.version))
    }

    fn build(&self, _host: &HostContext<'_>) -> Result<Vec<Invocation>, DriverError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbench_core::facts::SystemFacts;

    #[test]
    fn test_download_urls() {
        let opts = SuiteOptions::new("/r");
        let url = |source: Source| match source {
            Source::Archive { url, .. } => url.unwrap(),
            other => panic!("unexpected source {other:?}"),
        };
        assert_eq!(
            url(OpenMpi::new(&opts).source()),
            "https://www.open-mpi.org/software/ompi/v3.0/downloads/openmpi-3.0.0.tar.gz"
        );
        assert_eq!(
            url(MySql::new(&opts).source()),
            "https://dev.mysql.com/get/Downloads/MySQL-5.7/mysql-5.7.20-linux-glibc2.12-x86_64.tar.gz"
        );
        assert_eq!(
            url(Maven::new(&opts).source()),
            "https://archive.apache.org/dist/maven/maven-3/3.5.2/binaries/apache-maven-3.5.2-bin.tar.gz"
        );
    }

    #[test]
    fn test_openblas_uses_mpi_compilers() {
        let opts = SuiteOptions::new("/r");
        let facts = SystemFacts::new().with_cores(8).with_threads(16);
        let env = Environment::new();
        let host = HostContext {
            facts: &facts,
            env: &env,
            avx512: true,
        };

        let steps = OpenBlas::new(&opts).build(&host).unwrap();
        assert_eq!(
            steps[0].command,
            "make -j 8 FC=/r/src/openmpi/build/bin/mpifort CC=/r/src/openmpi/build/bin/mpicc USE_OPENMP=1 USE_THREAD=1"
        );
        assert_eq!(steps[0].env.get("OMP_NUM_THREADS"), Some("16"));
        assert!(steps[0].env.get("CFLAGS").unwrap().contains("-mavx512f"));
    }

    #[test]
    fn test_vendor_math_libraries() {
        let mut opts = SuiteOptions::new("/r");
        match Blis::new(&opts).source() {
            Source::Archive { url, extracted, target, hint, .. } => {
                assert!(url.is_none());
                assert_eq!(extracted.as_deref(), Some("amd-blis-0.9-11-beta"));
                assert_eq!(target, PathBuf::from("/r/src/blis"));
                assert!(hint.unwrap().contains("/r/src/AMD-BLIS-Linux-0.9-11-Beta.tar.gz"));
            }
            other => panic!("unexpected source {other:?}"),
        }

        opts.mkl_url = None;
        let mkl = Mkl::new(&opts);
        match mkl.source() {
            Source::Archive { url, archive, extracted, .. } => {
                assert!(url.is_none());
                assert_eq!(archive, PathBuf::from("/r/src/l_mkl_2018.0.128.tgz"));
                assert_eq!(extracted.as_deref(), Some("l_mkl_2018.0.128"));
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(mkl.binary(), PathBuf::from(MKL_DIR));

        let facts = SystemFacts::new();
        let env = Environment::new();
        let host = HostContext {
            facts: &facts,
            env: &env,
            avx512: false,
        };
        let steps = mkl.build(&host).unwrap();
        assert_eq!(
            steps[0].command,
            "/r/src/mkl/install.sh --silent \"/r/src/provided/silent.cfg\""
        );
    }

    #[test]
    fn test_glibc_cflags() {
        assert_eq!(glibc_cflags("-march=native -O3 -ffast-math"), "-march=native -O2");
        assert_eq!(glibc_cflags("-Ofast -pipe"), "-pipe -O2");
        assert_eq!(glibc_cflags("-O1 -g"), "-O1 -g");
        assert_eq!(glibc_cflags(""), "-O2");
    }

    #[test]
    fn test_glibc_installs_private_loader() {
        let opts = SuiteOptions::new("/r");
        let glibc = Glibc::new(&opts);
        assert_eq!(glibc.binary(), PathBuf::from("/usr/local/glibc/lib/ld-2.26.so"));
        assert_eq!(
            url_of(glibc.source()),
            "https://ftp.gnu.org/gnu/glibc/glibc-2.26.tar.gz"
        );

        let facts = SystemFacts::new().with_cores(4);
        let env = Environment::new();
        let host = HostContext {
            facts: &facts,
            env: &env,
            avx512: false,
        };
        let steps = glibc.build(&host).unwrap();
        let commands: Vec<&str> = steps.iter().map(|s| s.command.as_str()).collect();
        assert_eq!(
            commands,
            [
                "mkdir -p /r/src/glibc/build",
                "../configure --prefix=/usr/local/glibc",
                "make -j 4",
                "sudo -E make -j 4 install",
            ]
        );
        assert_eq!(steps[1].cwd, PathBuf::from("/r/src/glibc/build"));
        assert!(!steps[1].env.get("CFLAGS").unwrap().contains("-O3"));
    }

    fn url_of(source: Source) -> String {
        match source {
            Source::Archive { url, .. } => url.unwrap(),
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_mysql_daemon() {
        let spec = mysql_daemon(&Layout::new("/r"), DaemonTiming::default(), Environment::new());
        assert!(spec.start.command.starts_with("/r/src/mysql/bin/mysqld_safe --user=root"));
        assert!(spec.start.command.contains("--datadir=/r/src/mysql/mysql-files"));
        assert_eq!(spec.pid_file, PathBuf::from("/tmp/mysql.pid"));
    }
}
