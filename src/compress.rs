use {
    crate::{error::SinkError, rotating::set_permissions},
    flate2::write::GzEncoder,
    serde::{Deserialize, Serialize},
    std::{
        fs,
        io::{self, Write as _},
        path::{Path, PathBuf},
    },
};

/// Specifies the compression algorithm applied to rotated log files.
///
/// Compression runs on a background thread after the rename, so the active
/// file is never held while a large archive is being encoded. The compressed
/// artifact is named `<rotated>.<extension>` and the plain rotated file is
/// removed once the encoder has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Gzip compression, a good balance of ratio and speed. Compressed files
    /// have the `.gz` extension.
    Gzip,
    /// XZ (LZMA2) compression, smaller output at a higher CPU cost. Compressed
    /// files have the `.xz` extension.
    XZ,
}

impl Compression {
    /// Extension appended to a compressed rotated file.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => "gz",
            Compression::XZ => "xz",
        }
    }

    /// All extensions the retention sweep must strip before parsing a
    /// timestamp. Files compressed under an earlier configuration are still
    /// recognized after the setting changes.
    pub(crate) fn known_extensions() -> [&'static str; 2] {
        [Compression::Gzip.extension(), Compression::XZ.extension()]
    }
}

/// Compress `log_path` into `<log_path>.<ext>` and remove the original.
///
/// Returns the path of the compressed artifact.
pub(crate) fn compress_file(
    compression: Compression,
    log_path: &Path,
    file_mode: Option<u32>,
) -> Result<PathBuf, SinkError> {
    let wrap = |err: io::Error| SinkError::Compression {
        path: log_path.to_path_buf(),
        error: err.to_string(),
    };

    let infile = fs::File::open(log_path).map_err(wrap)?;
    let mut reader = io::BufReader::new(infile);

    let compressed_path = PathBuf::from(format!("{}.{}", log_path.to_string_lossy(), compression.extension()));
    let outfile = fs::File::create(&compressed_path).map_err(wrap)?;
    let mut writer = io::BufWriter::new(outfile);

    match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(writer, flate2::Compression::default());
            io::copy(&mut reader, &mut encoder).map_err(wrap)?;
            encoder.finish().map_err(wrap)?.flush().map_err(wrap)?;
        }
        Compression::XZ => {
            lzma_rs::xz_compress(&mut reader, &mut writer).map_err(wrap)?;
            writer.flush().map_err(wrap)?;
        }
    }
    set_permissions(&compressed_path, file_mode)?;

    fs::remove_file(log_path).map_err(|err| SinkError::RemoveFailed {
        path: log_path.to_path_buf(),
        error: err.to_string(),
    })?;
    Ok(compressed_path)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        flate2::read::GzDecoder,
        std::io::Read as _,
        tempfile::TempDir,
    };

    #[test]
    fn gzip_replaces_plain_file() {
        let dir = TempDir::new().unwrap();
        let rotated = dir.path().join("app.log.2026-01-02 03:04:05");
        fs::write(&rotated, b"line one\nline two\n").unwrap();

        let out = compress_file(Compression::Gzip, &rotated, None).unwrap();

        assert!(!rotated.exists());
        assert_eq!(out.file_name().unwrap().to_string_lossy(), "app.log.2026-01-02 03:04:05.gz");
        let mut decoded = String::new();
        GzDecoder::new(fs::File::open(&out).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "line one\nline two\n");
    }

    #[test]
    fn xz_round_trips() {
        let dir = TempDir::new().unwrap();
        let rotated = dir.path().join("app.log.old");
        fs::write(&rotated, b"payload").unwrap();

        let out = compress_file(Compression::XZ, &rotated, None).unwrap();

        let mut input = io::BufReader::new(fs::File::open(&out).unwrap());
        let mut decoded = Vec::new();
        lzma_rs::xz_decompress(&mut input, &mut decoded).unwrap();
        assert_eq!(decoded, b"payload");
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = compress_file(Compression::Gzip, &dir.path().join("nope"), None).unwrap_err();
        assert!(matches!(err, SinkError::Compression { .. }));
    }
}
