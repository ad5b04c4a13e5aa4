//! The engine's combined result archive.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::error::EngineError;

/// Selects an archive entry by case-insensitive substring and suffix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetPattern {
    contains: String,
    suffix: Option<String>,
}

impl AssetPattern {
    pub fn new(contains: &str) -> Self {
        Self {
            contains: contains.to_ascii_lowercase(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix.to_ascii_lowercase());
        self
    }

    /// Digital surface model.
    pub fn dem() -> Self {
        Self::new("dsm.tif")
    }

    /// Orthophoto GeoTIFF.
    pub fn orthophoto() -> Self {
        Self::new("odm_orthophoto").with_suffix(".tif")
    }

    pub fn matches(&self, entry_name: &str) -> bool {
        let name = entry_name.to_ascii_lowercase();
        name.contains(&self.contains)
            && self.suffix.as_ref().map_or(true, |s| name.ends_with(s.as_str()))
    }
}

impl fmt::Display for AssetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.suffix {
            Some(suffix) => write!(f, "'*{}*{}'", self.contains, suffix),
            None => write!(f, "'*{}*'", self.contains),
        }
    }
}

/// A downloaded result archive.
///
/// The archive lives in a temporary file that is removed when this value
/// is dropped, whatever the outcome of extraction.
#[derive(Debug)]
pub struct ResultArchive {
    file: NamedTempFile,
}

impl ResultArchive {
    pub(crate) fn new(file: NamedTempFile) -> Self {
        Self { file }
    }

    /// Location of the archive on disk.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Writes the first entry matching `pattern` to `dest`.
    ///
    /// Returns the entry's name. Extracting again overwrites `dest`.
    pub fn extract(&self, pattern: &AssetPattern, dest: &Path) -> Result<String, EngineError> {
        let mut archive = self.open()?;

        let index = (0..archive.len()).find(|&i| {
            archive
                .name_for_index(i)
                .map_or(false, |name| pattern.matches(name))
        });
        let Some(index) = index else {
            let entries: Vec<&str> = archive.file_names().collect();
            warn!(pattern = %pattern, entries = ?entries, "Result archive has no matching asset");
            return Err(EngineError::AssetNotFound {
                pattern: pattern.to_string(),
            });
        };

        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let mut out = File::create(dest).map_err(|e| EngineError::io(dest, e))?;
        let bytes = io::copy(&mut entry, &mut out).map_err(|e| EngineError::io(dest, e))?;

        info!(entry = %name, dest = %dest.display(), bytes, "Extracted engine asset");
        Ok(name)
    }

    fn open(&self) -> Result<ZipArchive<BufReader<File>>, EngineError> {
        let file = File::open(self.path()).map_err(|e| EngineError::io(self.path(), e))?;
        let archive = ZipArchive::new(BufReader::new(file))?;
        debug!(path = %self.path().display(), entries = archive.len(), "Opened result archive");
        Ok(archive)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    /// Writes a zip with the given entries to `path`.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn archive_with(dir: &TempDir, entries: &[(&str, &[u8])]) -> ResultArchive {
        let file = NamedTempFile::new_in(dir.path()).unwrap();
        write_zip(file.path(), entries);
        ResultArchive::new(file)
    }

    #[test]
    fn test_patterns() {
        assert!(AssetPattern::dem().matches("odm_dem/DSM.tif"));
        assert!(!AssetPattern::dem().matches("odm_dem/dtm.tif"));
        assert!(AssetPattern::orthophoto().matches("odm_orthophoto/odm_orthophoto.tif"));
        assert!(!AssetPattern::orthophoto().matches("odm_orthophoto/odm_orthophoto.png"));
        assert_eq!(AssetPattern::orthophoto().to_string(), "'*odm_orthophoto*.tif'");
    }

    #[test]
    fn test_extract_matching_entry() {
        let dir = TempDir::new().unwrap();
        let archive = archive_with(
            &dir,
            &[
                ("odm_report/report.pdf", &b"pdf"[..]),
                ("odm_dem/dsm.tif", &b"dem-bytes"[..]),
                ("odm_orthophoto/odm_orthophoto.tif", &b"ortho-bytes"[..]),
            ],
        );

        let dem = dir.path().join("dem.tif");
        assert_eq!(archive.extract(&AssetPattern::dem(), &dem).unwrap(), "odm_dem/dsm.tif");
        assert_eq!(std::fs::read(&dem).unwrap(), b"dem-bytes");

        let ortho = dir.path().join("ortho.tif");
        archive.extract(&AssetPattern::orthophoto(), &ortho).unwrap();
        assert_eq!(std::fs::read(&ortho).unwrap(), b"ortho-bytes");

        // Idempotent re-extraction
        archive.extract(&AssetPattern::dem(), &dem).unwrap();
        assert_eq!(std::fs::read(&dem).unwrap(), b"dem-bytes");
    }

    #[test]
    fn test_missing_entry_is_asset_not_found() {
        let dir = TempDir::new().unwrap();
        let archive = archive_with(&dir, &[("odm_report/report.pdf", &b"pdf"[..])]);
        let err = archive
            .extract(&AssetPattern::dem(), &dir.path().join("dem.tif"))
            .unwrap_err();
        assert!(matches!(err, EngineError::AssetNotFound { .. }));
        assert!(!dir.path().join("dem.tif").exists());
    }

    #[test]
    fn test_archive_file_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let archive = archive_with(&dir, &[("a.txt", &b"a"[..])]);
        let path = archive.path().to_path_buf();
        assert!(path.exists());
        drop(archive);
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        let file = NamedTempFile::new_in(dir.path()).unwrap();
        std::fs::write(file.path(), b"not a zip").unwrap();
        let archive = ResultArchive::new(file);
        assert!(matches!(
            archive.extract(&AssetPattern::dem(), &dir.path().join("x")),
            Err(EngineError::Archive(_))
        ));
    }
}
