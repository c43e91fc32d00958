mod csv;
mod options;
mod parquet;

/// CSV I/O helpers.
pub use csv::{
    read_csv, read_csv_with_options, write_csv, write_csv_with_options,
    DEFAULT_INFER_SCHEMA_LENGTH,
};
/// I/O option types.
pub use options::{
    CsvReadOptions, CsvWriterOptions, ParquetCompression, ParquetReadOptions,
    ParquetWriterOptions, SinkOptions, SyncOnClose,
};
/// Parquet I/O helpers.
pub use parquet::{
    read_parquet, read_parquet_with_options, write_parquet, write_parquet_with_options,
    DEFAULT_PARQUET_BATCH_SIZE,
};

pub(crate) use csv::{csv_writer_builder, read_csv_batch};
pub(crate) use parquet::{read_parquet_batch, writer_properties};
