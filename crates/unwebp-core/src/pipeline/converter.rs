//! Single-file conversion: read, decode, name, encode.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::Codec;
use crate::config::Config;
use crate::error::ConvertError;
use crate::types::{ConversionOutcome, SourceFile};

/// Extension of every converted file.
pub const DESTINATION_EXTENSION: &str = "png";

/// Converts one source file into a randomly named file in the output directory.
pub struct Converter {
    codec: Arc<dyn Codec>,
    root: PathBuf,
    output_dir: PathBuf,
    name_length: usize,
}

impl Converter {
    /// Create a converter writing into `output_dir`.
    ///
    /// `root` is the watched directory; destinations under it are written to
    /// the ledger relative to it.
    pub fn new(
        codec: Arc<dyn Codec>,
        root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        name_length: usize,
    ) -> Self {
        Self {
            codec,
            root: root.into(),
            output_dir: output_dir.into(),
            name_length,
        }
    }

    pub fn from_config(codec: Arc<dyn Codec>, config: &Config) -> Self {
        Self::new(
            codec,
            config.watch_dir(),
            config.output_dir(),
            config.output.name_length,
        )
    }

    /// Convert `source`.
    ///
    /// Undecodable sources are deleted; read and encode failures leave the
    /// source in place so a later tick retries it.
    pub async fn convert(&self, source: &SourceFile) -> ConversionOutcome {
        match self.try_convert(&source.path).await {
            Ok(destination) => ConversionOutcome::Success {
                source: source.name.clone(),
                destination,
            },
            Err(error) => ConversionOutcome::Failure {
                source: source.name.clone(),
                error,
            },
        }
    }

    async fn try_convert(&self, path: &Path) -> Result<PathBuf, ConvertError> {
        let start = std::time::Instant::now();

        let bytes = tokio::fs::read(path).await.map_err(|e| ConvertError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let read_time = start.elapsed();

        let codec = self.codec.clone();
        let decoded = tokio::task::spawn_blocking(move || codec.decode(&bytes))
            .await
            .map_err(|e| ConvertError::Task {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                remove_corrupt(path).await;
                return Err(ConvertError::Decode {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };
        let decode_time = start.elapsed() - read_time;

        let destination = self.destination_path();
        let codec = self.codec.clone();
        let target = destination.clone();
        tokio::task::spawn_blocking(move || codec.encode(&decoded, &target))
            .await
            .map_err(|e| ConvertError::Task {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
            .map_err(|e| ConvertError::Encode {
                path: path.to_path_buf(),
                destination: destination.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!(
            source = %path.display(),
            destination = %destination.display(),
            ?read_time,
            ?decode_time,
            total = ?start.elapsed(),
            "Converted"
        );
        Ok(destination)
    }

    /// Fresh random destination inside the output directory.
    ///
    /// No existence check: the codec refuses to overwrite, so a collision
    /// surfaces as an encode failure and the source is retried next tick.
    pub fn destination_path(&self) -> PathBuf {
        let stem = random_name(self.name_length);
        self.output_dir.join(format!("{stem}.{DESTINATION_EXTENSION}"))
    }

    /// How `destination` is written to the ledger.
    pub fn ledger_destination(&self, destination: &Path) -> String {
        destination
            .strip_prefix(&self.root)
            .unwrap_or(destination)
            .to_string_lossy()
            .into_owned()
    }

    /// Output directory destinations are written into.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Random alphanumeric string of `len` characters.
pub fn random_name(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

async fn remove_corrupt(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(file = %path.display(), "Removed undecodable source"),
        Err(e) => {
            tracing::error!(file = %path.display(), error = %e, "Failed to remove undecodable source")
        }
    }
}
