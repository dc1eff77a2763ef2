//! File descriptors: what to fetch and how to check it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use url::Url;

use super::error::DownloadError;

/// Digest used to verify a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    /// No verification.
    #[default]
    None,
    /// MD5 digest.
    Md5,
    /// SHA-1 digest.
    Sha1,
}

/// Error returned for unrecognised checksum algorithm names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported checksum algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for ChecksumAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            Ok(Self::None)
        } else if trimmed.eq_ignore_ascii_case("md5") {
            Ok(Self::Md5)
        } else if trimmed.eq_ignore_ascii_case("sha1") || trimmed.eq_ignore_ascii_case("sha-1") {
            Ok(Self::Sha1)
        } else {
            Err(UnsupportedAlgorithm(trimmed.to_string()))
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
        })
    }
}

/// Absent and blank types both mean "not declared"; `"none"` opts out.
fn deserialize_algorithm<'de, D>(deserializer: D) -> Result<Option<ChecksumAlgorithm>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| raw.parse().map_err(serde::de::Error::custom))
        .transpose()
}

/// One downloadable remote file, as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct FileDescriptor {
    /// Source URL (`http(s)://` or `s3://`).
    pub url: String,
    /// Explicit filename; falls back to the URL basename.
    #[serde(default)]
    pub name: Option<String>,
    /// Declared size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Expected hex digest.
    #[serde(default)]
    pub checksum: Option<String>,
    /// Declared digest algorithm of `checksum`, if any.
    #[serde(
        default,
        rename = "checksumType",
        alias = "checksum_type",
        deserialize_with = "deserialize_algorithm"
    )]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
}

impl FileDescriptor {
    /// Creates a descriptor for `url` with no name, size or checksum.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the explicit filename.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the declared size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the expected digest and its algorithm.
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(checksum.into());
        self.checksum_algorithm = Some(algorithm);
        self
    }

    /// Returns the expected digest, if a non-empty one was declared.
    #[must_use]
    pub fn expected_checksum(&self) -> Option<&str> {
        self.checksum
            .as_deref()
            .map(str::trim)
            .filter(|checksum| !checksum.is_empty())
    }

    /// Algorithm actually used for verification.
    ///
    /// A checksum without a declared algorithm is an MD5 digest. An explicit
    /// [`ChecksumAlgorithm::None`] or a missing checksum skips verification.
    #[must_use]
    pub fn effective_algorithm(&self) -> ChecksumAlgorithm {
        match (self.expected_checksum(), self.checksum_algorithm) {
            (None, _) => ChecksumAlgorithm::None,
            (Some(_), None) => ChecksumAlgorithm::Md5,
            (Some(_), Some(algorithm)) => algorithm,
        }
    }

    /// Declared size when it is a usable progress total.
    #[must_use]
    pub fn declared_size(&self) -> Option<u64> {
        self.size.filter(|size| *size > 0)
    }

    /// Resolves the local filename for this descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::MissingUrl`] for an empty URL,
    /// [`DownloadError::UnknownFilename`] when neither a name nor a URL
    /// basename exists, and [`DownloadError::InvalidFilename`] for names
    /// that contain separators or are `.`/`..`.
    pub fn resolve_filename(&self) -> Result<String, DownloadError> {
        if self.url.trim().is_empty() {
            return Err(DownloadError::MissingUrl);
        }

        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => basename_from_url(&self.url).ok_or_else(|| DownloadError::UnknownFilename {
                url: self.url.clone(),
            })?,
        };

        if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            return Err(DownloadError::InvalidFilename {
                url: self.url.clone(),
                name,
            });
        }
        Ok(name)
    }
}

fn basename_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let segment = url.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment).ok()?;
    let decoded = decoded.trim();
    (!decoded.is_empty()).then(|| decoded.to_string())
}

/// A catalog product: an identifier plus its files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Product {
    /// Product identifier (granule or scene name).
    pub id: String,
    /// Files belonging to the product.
    #[serde(default)]
    pub files: Vec<FileDescriptor>,
}

impl Product {
    /// Creates a product.
    #[must_use]
    pub fn new(id: impl Into<String>, files: Vec<FileDescriptor>) -> Self {
        Self {
            id: id.into(),
            files,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_algorithm_parse() {
        assert_eq!("".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::None);
        assert_eq!("MD5".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Md5);
        assert_eq!("sha1".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha1);
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_descriptor_deserializes_catalog_record() {
        let json = r#"{
            "url": "https://datapool.asf.alaska.edu/SLC/SA/S1A_IW.zip",
            "size": 4096,
            "checksum": "ABCDEF",
            "checksumType": "MD5"
        }"#;
        let descriptor: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.size, Some(4096));
        assert_eq!(descriptor.checksum_algorithm, Some(ChecksumAlgorithm::Md5));
        assert!(descriptor.name.is_none());
    }

    #[test]
    fn test_descriptor_rejects_unknown_algorithm() {
        let json = r#"{"url": "https://x/a.zip", "checksumType": "crc32"}"#;
        assert!(serde_json::from_str::<FileDescriptor>(json).is_err());
    }

    #[test]
    fn test_checksum_without_algorithm_defaults_to_md5() {
        let json = r#"{"url": "https://x/a.zip", "checksum": "abc", "checksumType": ""}"#;
        let descriptor: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.checksum_algorithm, None);
        assert_eq!(descriptor.effective_algorithm(), ChecksumAlgorithm::Md5);

        let undeclared = FileDescriptor {
            checksum: Some("abc".into()),
            ..FileDescriptor::new("https://x/a.zip")
        };
        assert_eq!(undeclared.effective_algorithm(), ChecksumAlgorithm::Md5);

        let blank = FileDescriptor::new("https://x/a.zip").with_checksum("  ", ChecksumAlgorithm::Sha1);
        assert_eq!(blank.effective_algorithm(), ChecksumAlgorithm::None);
    }

    #[test]
    fn test_explicit_none_algorithm_skips_verification() {
        let json = r#"{"url": "https://x/a.zip", "checksum": "deadbeef", "checksumType": "NONE"}"#;
        let descriptor: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.checksum_algorithm, Some(ChecksumAlgorithm::None));
        assert_eq!(descriptor.effective_algorithm(), ChecksumAlgorithm::None);

        let built = FileDescriptor::new("https://x/a.zip")
            .with_checksum("deadbeef", ChecksumAlgorithm::None);
        assert_eq!(built.effective_algorithm(), ChecksumAlgorithm::None);
    }

    #[test]
    fn test_resolve_filename_prefers_explicit_name() {
        let descriptor = FileDescriptor::new("https://x/path/a.zip").with_name("b.zip");
        assert_eq!(descriptor.resolve_filename().unwrap(), "b.zip");
    }

    #[test]
    fn test_resolve_filename_decodes_url_basename() {
        let descriptor = FileDescriptor::new("https://x/path/S1A%20granule.zip?x=1");
        assert_eq!(descriptor.resolve_filename().unwrap(), "S1A granule.zip");
    }

    #[test]
    fn test_resolve_filename_failures() {
        assert!(matches!(
            FileDescriptor::new("https://x/").resolve_filename(),
            Err(DownloadError::UnknownFilename { .. })
        ));
        assert!(matches!(
            FileDescriptor::new("").resolve_filename(),
            Err(DownloadError::MissingUrl)
        ));
        assert!(matches!(
            FileDescriptor::new("https://x/a.zip").with_name("../etc").resolve_filename(),
            Err(DownloadError::InvalidFilename { .. })
        ));
        assert!(matches!(
            FileDescriptor::new("https://x/a/..").resolve_filename(),
            Err(DownloadError::InvalidFilename { .. }) | Err(DownloadError::UnknownFilename { .. })
        ));
    }

    #[test]
    fn test_object_url_basename() {
        let descriptor = FileDescriptor::new("s3://bucket/dir/file.h5");
        assert_eq!(descriptor.resolve_filename().unwrap(), "file.h5");
    }
}
