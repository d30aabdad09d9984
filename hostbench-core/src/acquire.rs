//! Source Acquisition
//!
//! Benchmark sources are downloaded with a [`Fetcher`] and extracted with an
//! [`Unpacker`]. Both are narrow interfaces so drivers can be exercised with
//! fakes. Downloads land in a `.part` file renamed into place on success, so
//! an interrupted download never looks like a cached archive.

use crate::error::AcquireError;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Browser-like user agent; some mirrors reject unknown clients
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// Where a benchmark's sources come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A tarball extracted into `target`
    Archive {
        /// Download URL; `None` means the archive must be placed manually
        url: Option<String>,
        /// Local archive path
        archive: PathBuf,
        /// Top-level directory inside the archive, renamed to `target`.
        /// `None` extracts directly into `target`.
        extracted: Option<String>,
        /// Final source directory
        target: PathBuf,
        /// Shown when a manual archive is missing
        hint: Option<String>,
    },
    /// A single file downloaded to `dest`, already in its final form
    File {
        /// Download URL
        url: String,
        /// Destination path
        dest: PathBuf,
    },
    /// Nothing to acquire; sources are provided in-tree
    None,
}

impl Source {
    /// File whose presence marks the fetch step done
    pub fn fetched_artifact(&self) -> Option<&Path> {
        match self {
            Source::Archive { archive, .. } => Some(archive),
            Source::File { dest, .. } => Some(dest),
            Source::None => None,
        }
    }

    /// Directory whose presence marks the unpack step done
    pub fn unpacked_artifact(&self) -> Option<&Path> {
        match self {
            Source::Archive { target, .. } => Some(target),
            Source::File { dest, .. } => Some(dest),
            Source::None => None,
        }
    }
}

/// Downloads a URL to a local path
pub trait Fetcher: Send + Sync {
    /// Download `url` into `dest`, creating parent directories
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), AcquireError>;
}

/// Extracts an archive into a directory
pub trait Unpacker: Send + Sync {
    /// Extract `archive` into `into`, creating it if needed
    fn unpack(&self, archive: &Path, into: &Path) -> Result<(), AcquireError>;
}

/// HTTP(S) downloads with a blocking client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Client with the default user agent and a generous timeout
    pub fn new() -> Result<Self, AcquireError> {
        Self::with_timeout(Duration::from_secs(30 * 60))
    }

    /// Client with a custom whole-request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, AcquireError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AcquireError::Download {
                url: String::new(),
                message: format!("failed to initialize HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), AcquireError> {
        let download_err = |message: String| AcquireError::Download {
            url: url.to_string(),
            message,
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(url, dest = %dest.display(), "downloading");
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| download_err(e.to_string()))?;

        let partial = partial_path(dest);
        let mut file = File::create(&partial)?;
        if let Err(e) = response.copy_to(&mut file) {
            let _ = std::fs::remove_file(&partial);
            return Err(download_err(e.to_string()));
        }
        drop(file);

        std::fs::rename(&partial, dest)?;
        Ok(())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// `.tar`, `.tar.gz` and `.tgz` extraction
#[derive(Debug, Clone, Copy, Default)]
pub struct TarUnpacker;

impl Unpacker for TarUnpacker {
    fn unpack(&self, archive: &Path, into: &Path) -> Result<(), AcquireError> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let file = BufReader::new(File::open(archive)?);
        let reader: Box<dyn Read> = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Box::new(GzDecoder::new(file))
        } else if name.ends_with(".tar") {
            Box::new(file)
        } else {
            return Err(AcquireError::UnsupportedFormat(archive.to_path_buf()));
        };

        std::fs::create_dir_all(into)?;
        tracing::info!(archive = %archive.display(), into = %into.display(), "extracting");
        tar::Archive::new(reader)
            .unpack(into)
            .map_err(|e| AcquireError::Extract {
                archive: archive.to_path_buf(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn write_tar_gz(path: &Path, top: &str) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::fast());
        let mut builder = tar::Builder::new(encoder);

        let data = b"int main(void) { return 0; }\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{top}/main.c"), &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_unpack_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("demo-1.0.tar.gz");
        write_tar_gz(&archive, "demo-1.0");

        TarUnpacker.unpack(&archive, dir.path()).unwrap();
        assert!(dir.path().join("demo-1.0/main.c").exists());
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("demo.zip");
        std::fs::write(&archive, b"PK").unwrap();

        let err = TarUnpacker.unpack(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, AcquireError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.tgz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        let err = TarUnpacker.unpack(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, AcquireError::Extract { .. }));
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/src/zlib-1.2.11.tar.gz")),
            PathBuf::from("/src/zlib-1.2.11.tar.gz.part")
        );
    }

    #[test]
    fn test_source_artifacts() {
        let source = Source::Archive {
            url: None,
            archive: PathBuf::from("/src/mlc_v3.4.tgz"),
            extracted: None,
            target: PathBuf::from("/src/mlc"),
            hint: None,
        };
        assert_eq!(source.fetched_artifact(), Some(Path::new("/src/mlc_v3.4.tgz")));
        assert_eq!(source.unpacked_artifact(), Some(Path::new("/src/mlc")));
        assert_eq!(Source::None.fetched_artifact(), None);
    }
}
