//! MD5 content checksums for package files
//!
//! The package file index stores one 32 hex digit MD5 per physical file.
//! Digests are rendered upper case, which is what the index schema expects;
//! comparisons are case-insensitive.

use crate::error::{AipError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Compute the MD5 checksum of bytes
pub fn compute_md5(data: &[u8]) -> String {
    format!("{:X}", md5::compute(data))
}

/// Compute the MD5 checksum of any readable source without buffering it whole
pub fn compute_md5_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }

    Ok(format!("{:X}", context.compute()))
}

/// Compute the MD5 checksum of a file
pub fn compute_file_md5(path: impl AsRef<Path>) -> Result<String> {
    let mut file = File::open(path)?;
    compute_md5_reader(&mut file)
}

/// Verify a file against an expected checksum
pub fn verify_file_md5(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let path = path.as_ref();
    let actual = compute_file_md5(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(AipError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}
