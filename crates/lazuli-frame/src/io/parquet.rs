use std::fs::File;
use std::path::Path;

use arrow::record_batch::{RecordBatch, RecordBatchReader};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};

use crate::io::csv::projection_indices_from_schema;
use crate::io::options::{ParquetCompression, ParquetReadOptions, ParquetWriterOptions};
use crate::{DataFrame, DataFrameError, Result};

/// Reader batch size used when neither the scan nor the evaluator sets one.
pub const DEFAULT_PARQUET_BATCH_SIZE: usize = 65_536;

/// Read a Parquet file eagerly into a `DataFrame` using default `ParquetReadOptions`.
pub fn read_parquet(path: impl AsRef<Path>) -> Result<DataFrame> {
    read_parquet_with_options(path, &ParquetReadOptions::default())
}

/// Read a Parquet file eagerly into a `DataFrame` using the provided options.
pub fn read_parquet_with_options(
    path: impl AsRef<Path>,
    options: &ParquetReadOptions,
) -> Result<DataFrame> {
    let batch = read_parquet_batch(path.as_ref(), options, DEFAULT_PARQUET_BATCH_SIZE)?;
    Ok(DataFrame::from_record_batch(batch))
}

/// Write a `DataFrame` to a Parquet file.
pub fn write_parquet(path: impl AsRef<Path>, df: &DataFrame) -> Result<()> {
    write_parquet_with_options(path, df, &ParquetWriterOptions::default())
}

/// Write a `DataFrame` to a Parquet file using the provided options.
pub fn write_parquet_with_options(
    path: impl AsRef<Path>,
    df: &DataFrame,
    options: &ParquetWriterOptions,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| DataFrameError::io_with_path(source, path))?;

    let mut writer = ArrowWriter::try_new(file, df.schema(), Some(writer_properties(options)))?;
    for batch in df.to_arrow() {
        writer.write(&batch)?;
    }
    writer.close()?;

    Ok(())
}

pub(crate) fn writer_properties(options: &ParquetWriterOptions) -> WriterProperties {
    let compression = match options.compression {
        ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        ParquetCompression::Brotli => Compression::BROTLI(BrotliLevel::default()),
        ParquetCompression::Lz4Raw => Compression::LZ4_RAW,
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
    };
    let statistics = if options.statistics {
        EnabledStatistics::Page
    } else {
        EnabledStatistics::None
    };

    let mut builder = WriterProperties::builder()
        .set_compression(compression)
        .set_statistics_enabled(statistics);
    if let Some(rows) = options.row_group_size {
        builder = builder.set_max_row_group_size(rows.max(1));
    }
    builder.build()
}

/// Read a Parquet file into a single record batch.
pub(crate) fn read_parquet_batch(
    path: &Path,
    options: &ParquetReadOptions,
    default_batch_size: usize,
) -> Result<RecordBatch> {
    let batch_size = options.batch_size.unwrap_or(default_batch_size);
    if batch_size == 0 {
        return Err(DataFrameError::configuration(
            "batch_size",
            "batch_size must be greater than 0",
        ));
    }

    let file = File::open(path).map_err(|source| DataFrameError::io_with_path(source, path))?;

    let mut builder =
        ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(batch_size);

    if let Some(row_groups) = options.row_groups.as_deref() {
        builder = builder.with_row_groups(row_groups.to_vec());
    }

    if let Some(indices) =
        projection_indices_from_schema(builder.schema(), options.columns.as_deref())?
    {
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
        builder = builder.with_projection(mask);
    }

    if let Some(n_rows) = options.n_rows {
        builder = builder.with_limit(n_rows);
    }

    let reader = builder.build()?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(arrow::compute::concat_batches(&schema, &batches)?)
}
