//! Locating the metadata member inside a package archive.
//!
//! A package is a tar archive, optionally gzip-compressed, whose metadata
//! document lives at `<dir>/<metadata-file>`. Members of nested packages
//! (for example `<dir>/charts/<sub>/<metadata-file>`) never match because
//! only two-segment paths are considered.

use flate2::read::GzDecoder;
use std::io::{self, Read};
use tar::Archive;
use thiserror::Error;
use tracing::debug;

/// File name of the metadata document when none is configured.
pub const DEFAULT_METADATA_FILE: &str = "Chart.yaml";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors that can occur while extracting the metadata member.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read archive: {0}")]
    Archive(#[source] io::Error),

    #[error("no archive member matches '*/{file_name}'")]
    NotFound { file_name: String },

    #[error("multiple archive members match '*/{file_name}': {}", .paths.join(", "))]
    Ambiguous {
        file_name: String,
        paths: Vec<String>,
    },
}

/// Extract the raw bytes of the sole `*/<file_name>` member of a package.
///
/// The bytes are returned exactly as stored: no decoding and no line-ending
/// normalization.
pub fn extract_metadata(package: &[u8], file_name: &str) -> Result<Vec<u8>, ExtractionError> {
    if package.starts_with(&GZIP_MAGIC) {
        debug!("package is gzip-compressed");
        read_matching_member(GzDecoder::new(package), file_name)
    } else {
        read_matching_member(package, file_name)
    }
}

fn read_matching_member<R: Read>(reader: R, file_name: &str) -> Result<Vec<u8>, ExtractionError> {
    let mut archive = Archive::new(reader);
    let mut matches: Vec<(String, Vec<u8>)> = Vec::new();

    for entry in archive.entries().map_err(ExtractionError::Archive)? {
        let mut entry = entry.map_err(ExtractionError::Archive)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(ExtractionError::Archive)?
            .to_string_lossy()
            .into_owned();
        if !is_metadata_path(&path, file_name) {
            continue;
        }

        let mut raw = Vec::new();
        entry
            .read_to_end(&mut raw)
            .map_err(ExtractionError::Archive)?;
        debug!(member = %path, bytes = raw.len(), "found metadata member");
        matches.push((path, raw));
    }

    match matches.len() {
        0 => Err(ExtractionError::NotFound {
            file_name: file_name.to_string(),
        }),
        1 => Ok(matches.remove(0).1),
        _ => Err(ExtractionError::Ambiguous {
            file_name: file_name.to_string(),
            paths: matches.into_iter().map(|(path, _)| path).collect(),
        }),
    }
}

/// True for `<dir>/<file_name>`, with an optional leading `./`.
fn is_metadata_path(path: &str, file_name: &str) -> bool {
    let trimmed = path.trim_start_matches("./");
    let mut segments = trimmed.split('/').filter(|segment| !segment.is_empty());
    matches!(
        (segments.next(), segments.next(), segments.next()),
        (Some(dir), Some(name), None) if dir != "." && dir != ".." && name == file_name
    )
}
