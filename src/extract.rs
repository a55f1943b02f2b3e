//! Extracts single-member gzip archives.

use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::{
    asset::strip_compression_suffix,
    error::{Error, Result},
};

/// Decompresses `compressed_path` into the sibling path without the `.gz`
/// suffix and returns that path.
///
/// Output goes through a temporary file that is renamed on success, so a
/// failed extraction never leaves a raw file behind. The archive itself is
/// left in place.
pub fn decompress(compressed_path: &Path) -> Result<PathBuf> {
    let file_name = compressed_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::CorruptArchive(format!("{}: no file name", compressed_path.display())))?;
    let raw_name = strip_compression_suffix(file_name).ok_or_else(|| {
        Error::CorruptArchive(format!("{}: expected a .gz suffix", compressed_path.display()))
    })?;
    let raw_path = compressed_path.with_file_name(raw_name);
    let dir = compressed_path.parent().unwrap_or_else(|| Path::new("."));

    let archive = File::open(compressed_path)?;
    let mut decoder = GzDecoder::new(BufReader::new(archive));

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", raw_name))
        .suffix(".part")
        .tempfile_in(dir)?;

    // Decoder errors mean a bad archive; write errors mean a bad disk.
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let read = match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(Error::CorruptArchive(format!(
                    "{}: {}",
                    compressed_path.display(),
                    e
                )))
            }
        };
        tmp.write_all(&buffer[..read])?;
        total += read as u64;
    }
    tmp.flush()?;

    tmp.persist(&raw_path).map_err(|e| e.error)?;
    debug!(path = %raw_path.display(), bytes = total, "Extracted archive");

    Ok(raw_path)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use tempfile::TempDir;

    pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn should_extract_next_to_archive() {
        let dir = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..200_000u32).map(|v| (v % 251) as u8).collect();
        let gz_path = dir.path().join("chirps-v2.0.2001.01.tif.gz");
        std::fs::write(&gz_path, gzip(&payload)).unwrap();

        let raw_path = decompress(&gz_path).unwrap();

        assert_eq!(raw_path, dir.path().join("chirps-v2.0.2001.01.tif"));
        assert_eq!(std::fs::read(&raw_path).unwrap(), payload);
        assert_eq!(
            file_names(dir.path()),
            vec!["chirps-v2.0.2001.01.tif", "chirps-v2.0.2001.01.tif.gz"]
        );
    }

    #[test]
    fn should_report_truncated_archive_and_leave_no_output() {
        let dir = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..100_000u32).map(|v| (v * 7 % 256) as u8).collect();
        let compressed = gzip(&payload);
        let gz_path = dir.path().join("chirps-v2.0.2001.02.tif.gz");
        std::fs::write(&gz_path, &compressed[..compressed.len() / 2]).unwrap();

        let result = decompress(&gz_path);

        assert!(matches!(result, Err(Error::CorruptArchive(_))));
        assert_eq!(file_names(dir.path()), vec!["chirps-v2.0.2001.02.tif.gz"]);
    }

    #[test]
    fn should_report_garbage_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let gz_path = dir.path().join("noise.tif.gz");
        std::fs::write(&gz_path, b"<html>Not Found</html>").unwrap();

        assert!(matches!(decompress(&gz_path), Err(Error::CorruptArchive(_))));
        assert!(!dir.path().join("noise.tif").exists());
    }

    #[test]
    fn should_require_gz_suffix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.tif");
        std::fs::write(&path, gzip(b"data")).unwrap();

        assert!(matches!(decompress(&path), Err(Error::CorruptArchive(_))));
    }
}
