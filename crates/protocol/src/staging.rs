//! Structured key for a staged chunk.
//!
//! On disk a chunk of `movie.mp4` with index 7 is stored as `movie-7.mp4`.
//! The key keeps stem, extension and index as separate fields so callers
//! never split strings themselves; [`StagingKey::parse`] is the exact
//! inverse of [`StagingKey::file_name`] for a given source name.

use std::fmt;

/// Error returned when a staged file name does not belong to a source file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StagingKeyError {
    #[error("staged name {0:?} does not match the source file")]
    Foreign(String),

    #[error("staged name {0:?} has no decimal index")]
    BadIndex(String),
}

/// Identity of one staged chunk: source file plus sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingKey {
    stem: String,
    extension: Option<String>,
    index: u64,
}

impl StagingKey {
    /// Builds the key for chunk `index` of `source_name`.
    ///
    /// The extension is everything after the last `.`; a leading dot (as in
    /// `.bashrc`) does not start an extension.
    pub fn new(source_name: &str, index: u64) -> Self {
        let (stem, extension) = split_extension(source_name);
        Self {
            stem: stem.to_string(),
            extension: extension.map(str::to_string),
            index,
        }
    }

    /// Parses a staged file name produced for `source_name`.
    pub fn parse(source_name: &str, staged: &str) -> Result<Self, StagingKeyError> {
        let (stem, extension) = split_extension(source_name);

        let without_ext = match extension {
            Some(ext) => staged
                .strip_suffix(ext)
                .and_then(|s| s.strip_suffix('.'))
                .ok_or_else(|| StagingKeyError::Foreign(staged.to_string()))?,
            None => staged,
        };
        let digits = without_ext
            .strip_prefix(stem)
            .and_then(|s| s.strip_prefix('-'))
            .ok_or_else(|| StagingKeyError::Foreign(staged.to_string()))?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StagingKeyError::BadIndex(staged.to_string()));
        }
        let index = digits
            .parse::<u64>()
            .map_err(|_| StagingKeyError::BadIndex(staged.to_string()))?;

        Ok(Self {
            stem: stem.to_string(),
            extension: extension.map(str::to_string),
            index,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Name of the staged file, `<stem>-<index>.<ext>` or `<stem>-<index>`.
    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.extension {
            Some(ext) => write!(f, "{}-{}.{}", self.stem, self.index, ext),
            None => write!(f, "{}-{}", self.stem, self.index),
        }
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(pos) => (&name[..pos], Some(&name[pos + 1..])),
    }
}
