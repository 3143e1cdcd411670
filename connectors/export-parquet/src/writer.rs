//! Parquet file writer.

use std::fs::File;
use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Deserialize;

/// Compression codec for the exported file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    None,
    #[default]
    Snappy,
    Gzip,
    Zstd,
}

impl ParquetCompression {
    #[must_use]
    pub fn to_parquet_compression(self) -> Compression {
        match self {
            Self::None => Compression::UNCOMPRESSED,
            Self::Snappy => Compression::SNAPPY,
            Self::Gzip => Compression::GZIP(GzipLevel::default()),
            Self::Zstd => Compression::ZSTD(ZstdLevel::default()),
        }
    }
}

pub const DEFAULT_ROW_GROUP_SIZE: usize = 100_000;

fn default_row_group_size() -> usize {
    DEFAULT_ROW_GROUP_SIZE
}

/// Output layout options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ParquetSettings {
    #[serde(default)]
    pub compression: ParquetCompression,
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
}

impl Default for ParquetSettings {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::default(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

impl ParquetSettings {
    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression.to_parquet_compression())
            .set_max_row_group_size(self.row_group_size.max(1))
            .set_created_by(format!("cdrsync {}", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

/// Write `batches` to `file`; returns the number of rows written.
pub(crate) fn write_batches(
    file: File,
    schema: &Arc<Schema>,
    batches: &[RecordBatch],
    settings: &ParquetSettings,
) -> Result<u64, String> {
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(settings.writer_properties()))
        .map_err(|e| format!("Parquet writer init failed: {e}"))?;
    let mut rows = 0u64;
    for batch in batches {
        writer
            .write(batch)
            .map_err(|e| format!("Parquet write failed: {e}"))?;
        rows += batch.num_rows() as u64;
    }
    writer
        .close()
        .map_err(|e| format!("Parquet finalize failed: {e}"))?;
    Ok(rows)
}
