use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::io::{
    csv_writer_builder, writer_properties, CsvWriterOptions, ParquetWriterOptions, SinkOptions,
    SyncOnClose,
};
use crate::{DataFrameError, Result};

fn create(path: &Path, sink: &SinkOptions) -> Result<File> {
    if sink.mkdir {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| DataFrameError::io_with_path(source, parent))?;
        }
    }
    File::create(path).map_err(|source| DataFrameError::io_with_path(source, path))
}

fn sync(file: &File, path: &Path, mode: SyncOnClose) -> Result<()> {
    let synced = match mode {
        SyncOnClose::None => Ok(()),
        SyncOnClose::Data => file.sync_data(),
        SyncOnClose::All => file.sync_all(),
    };
    synced.map_err(|source| DataFrameError::io_with_path(source, path))
}

/// `(offset, len)` chunks covering `num_rows`; at least one, so an empty
/// batch still produces a file with a schema.
fn chunks(num_rows: usize, batch_size: usize) -> Vec<(usize, usize)> {
    let batch_size = batch_size.max(1);
    let mut out = vec![(0, num_rows.min(batch_size))];
    let mut offset = out[0].1;
    while offset < num_rows {
        let len = batch_size.min(num_rows - offset);
        out.push((offset, len));
        offset += len;
    }
    out
}

/// Write `batch` as CSV in chunks of `options.batch_size` rows.
pub(crate) fn write_csv_sink(
    batch: &RecordBatch,
    path: &Path,
    options: &CsvWriterOptions,
    sink: &SinkOptions,
    default_batch_size: usize,
) -> Result<()> {
    let file = create(path, sink)?;
    let batch_size = options.batch_size.unwrap_or(default_batch_size);
    {
        let mut writer = csv_writer_builder(options).build(BufWriter::new(&file));
        for (offset, len) in chunks(batch.num_rows(), batch_size) {
            writer.write(&batch.slice(offset, len))?;
        }
        writer
            .into_inner()
            .flush()
            .map_err(|source| DataFrameError::io_with_path(source, path))?;
    }
    sync(&file, path, sink.sync_on_close)?;
    tracing::debug!(path = %path.display(), rows = batch.num_rows(), "csv sink written");
    Ok(())
}

/// Write `batch` as Parquet, one writer call per `default_batch_size` rows.
pub(crate) fn write_parquet_sink(
    batch: &RecordBatch,
    path: &Path,
    options: &ParquetWriterOptions,
    sink: &SinkOptions,
    default_batch_size: usize,
) -> Result<()> {
    let file = create(path, sink)?;
    let handle = file
        .try_clone()
        .map_err(|source| DataFrameError::io_with_path(source, path))?;
    let mut writer = ArrowWriter::try_new(handle, batch.schema(), Some(writer_properties(options)))?;
    for (offset, len) in chunks(batch.num_rows(), default_batch_size) {
        writer.write(&batch.slice(offset, len))?;
    }
    writer.close()?;
    sync(&file, path, sink.sync_on_close)?;
    tracing::debug!(path = %path.display(), rows = batch.num_rows(), "parquet sink written");
    Ok(())
}
