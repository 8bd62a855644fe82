//! Archive extraction for the source extracts
//!
//! The input bundle is a zip archive holding four CSV files. It is unpacked
//! into a temporary directory that lives as long as the returned
//! [`ExtractedArchive`].

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while unpacking the source archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive path does not exist
    #[error("Archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    /// The archive could not be read or unpacked
    #[error("Failed to extract {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// An expected member is absent after extraction
    #[error("Missing expected file for {logical}: {path}")]
    MissingMember { logical: SourceFile, path: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ArchiveError::ArchiveNotFound(path) => format!(
                "Archive not found: {}\n\nHint: Check the --zip path.",
                path.display()
            ),
            ArchiveError::MissingMember { logical, path } => format!(
                "Missing expected file for {logical}: {}\n\n\
                Hint: The archive must contain {}.",
                path.display(),
                logical.expected_names().join(" or ")
            ),
            _ => self.to_string(),
        }
    }
}

/// Logical source files expected inside the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceFile {
    Transactions,
    Customers,
    Articles,
    Weather,
}

impl SourceFile {
    /// All source files
    pub const ALL: [SourceFile; 4] = [
        Self::Transactions,
        Self::Customers,
        Self::Articles,
        Self::Weather,
    ];

    /// Logical name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Customers => "customers",
            Self::Articles => "articles",
            Self::Weather => "weather",
        }
    }

    /// File name looked up first
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Transactions => "transactions.csv",
            Self::Customers => "customers.csv",
            Self::Articles => "articles.csv",
            Self::Weather => "open-meteo-2019.csv",
        }
    }

    /// File name tried when the primary one is absent
    pub fn fallback_name(&self) -> Option<&'static str> {
        match self {
            Self::Weather => Some("open-meteo.csv"),
            _ => None,
        }
    }

    /// Every accepted file name, primary first
    pub fn expected_names(&self) -> Vec<&'static str> {
        std::iter::once(self.file_name())
            .chain(self.fallback_name())
            .collect()
    }

    /// Resolve this file inside an extraction directory
    pub fn resolve(&self, dir: &Path) -> Result<PathBuf, ArchiveError> {
        let primary = dir.join(self.file_name());
        if primary.is_file() {
            return Ok(primary);
        }
        if let Some(fallback) = self.fallback_name() {
            let alternate = dir.join(fallback);
            if alternate.is_file() {
                debug!(logical = self.name(), file = fallback, "Using fallback file name");
                return Ok(alternate);
            }
        }
        Err(ArchiveError::MissingMember {
            logical: *self,
            path: primary,
        })
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Paths of the four extracted source files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub transactions: PathBuf,
    pub customers: PathBuf,
    pub articles: PathBuf,
    pub weather: PathBuf,
}

impl SourcePaths {
    /// Resolve all source files in a directory
    pub fn resolve(dir: &Path) -> Result<Self, ArchiveError> {
        Ok(Self {
            transactions: SourceFile::Transactions.resolve(dir)?,
            customers: SourceFile::Customers.resolve(dir)?,
            articles: SourceFile::Articles.resolve(dir)?,
            weather: SourceFile::Weather.resolve(dir)?,
        })
    }

    /// Path of a logical source file
    pub fn get(&self, file: SourceFile) -> &Path {
        match file {
            SourceFile::Transactions => &self.transactions,
            SourceFile::Customers => &self.customers,
            SourceFile::Articles => &self.articles,
            SourceFile::Weather => &self.weather,
        }
    }
}

/// An unpacked archive; the directory is removed on drop
#[derive(Debug)]
pub struct ExtractedArchive {
    dir: TempDir,
    paths: SourcePaths,
}

impl ExtractedArchive {
    /// Unpack `archive` into a fresh temporary directory
    pub fn extract(archive: &Path) -> Result<Self, ArchiveError> {
        let dir = tempfile::Builder::new().prefix("hm-dwh-").tempdir()?;
        Self::extract_into(archive, dir)
    }

    /// Unpack `archive` into the given temporary directory
    pub fn extract_into(archive: &Path, dir: TempDir) -> Result<Self, ArchiveError> {
        if !archive.is_file() {
            return Err(ArchiveError::ArchiveNotFound(archive.to_path_buf()));
        }

        info!(archive = %archive.display(), dir = %dir.path().display(), "Extracting archive");

        let file = File::open(archive)?;
        let extract_err = |source| ArchiveError::Extract {
            path: archive.to_path_buf(),
            source,
        };
        let mut zip = zip::ZipArchive::new(file).map_err(extract_err)?;
        let members = zip.len();
        zip.extract(dir.path()).map_err(extract_err)?;

        let paths = SourcePaths::resolve(dir.path())?;
        debug!(members, "Archive extracted");

        Ok(Self { dir, paths })
    }

    /// Directory holding the extracted members
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Resolved source paths
    pub fn paths(&self) -> &SourcePaths {
        &self.paths
    }

    /// Path of a logical source file
    pub fn path(&self, file: SourceFile) -> &Path {
        self.paths.get(file)
    }
}
