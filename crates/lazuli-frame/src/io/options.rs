use serde::{Deserialize, Serialize};

/// Options for reading CSV files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvReadOptions {
    /// Whether the CSV file has a header row.
    pub has_header: bool,
    /// Field delimiter byte (e.g. `b','`).
    pub delimiter: u8,
    /// Quote character byte (defaults to `Some(b'\"')`).
    pub quote_char: Option<u8>,
    /// Values that should be interpreted as null.
    pub null_values: Vec<String>,
    /// Maximum number of rows used for schema inference (`None`: evaluator default).
    pub infer_schema_length: Option<usize>,
    /// Optional column projection (names).
    pub projection: Option<Vec<String>>,
    /// Stop after reading this many rows.
    pub n_rows: Option<usize>,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            quote_char: Some(b'"'),
            null_values: Vec::new(),
            infer_schema_length: None,
            projection: None,
            n_rows: None,
        }
    }
}

impl CsvReadOptions {
    /// Set `has_header`.
    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Set `delimiter`.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set `quote_char`.
    pub fn with_quote_char(mut self, quote_char: Option<u8>) -> Self {
        self.quote_char = quote_char;
        self
    }

    /// Set `null_values`.
    pub fn with_null_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Set `infer_schema_length`.
    pub fn with_infer_schema_length(mut self, infer_schema_length: usize) -> Self {
        self.infer_schema_length = Some(infer_schema_length);
        self
    }

    /// Set a column projection by name.
    pub fn with_projection<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Read at most `n_rows` rows.
    pub fn with_n_rows(mut self, n_rows: usize) -> Self {
        self.n_rows = Some(n_rows);
        self
    }
}

/// Options for reading Parquet files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParquetReadOptions {
    /// Optional column projection (names).
    pub columns: Option<Vec<String>>,
    /// Optional row group selection.
    pub row_groups: Option<Vec<usize>>,
    /// Record batch size for the Parquet reader (`None`: evaluator default).
    pub batch_size: Option<usize>,
    /// Stop after reading this many rows.
    pub n_rows: Option<usize>,
}

impl Default for ParquetReadOptions {
    fn default() -> Self {
        Self {
            columns: None,
            row_groups: None,
            batch_size: None,
            n_rows: None,
        }
    }
}

impl ParquetReadOptions {
    /// Set a column projection by name.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Set row group indices to read.
    pub fn with_row_groups<I>(mut self, row_groups: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.row_groups = Some(row_groups.into_iter().collect());
        self
    }

    /// Set record batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Read at most `n_rows` rows.
    pub fn with_n_rows(mut self, n_rows: usize) -> Self {
        self.n_rows = Some(n_rows);
        self
    }
}

/// Options for writing CSV files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvWriterOptions {
    /// Write a header row.
    pub include_header: bool,
    /// Field separator.
    pub separator: u8,
    /// Quote character.
    pub quote_char: u8,
    /// Text written for null values.
    pub null_value: String,
    /// `chrono` format for `Date32` / `Date64` columns.
    pub date_format: Option<String>,
    /// `chrono` format for timestamp columns.
    pub datetime_format: Option<String>,
    /// `chrono` format for time columns.
    pub time_format: Option<String>,
    /// Rows per writer call (`None`: evaluator default).
    pub batch_size: Option<usize>,
}

impl Default for CsvWriterOptions {
    fn default() -> Self {
        Self {
            include_header: true,
            separator: b',',
            quote_char: b'"',
            null_value: String::new(),
            date_format: None,
            datetime_format: None,
            time_format: None,
            batch_size: None,
        }
    }
}

impl CsvWriterOptions {
    /// Set `include_header`.
    pub fn with_include_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    /// Set `separator`.
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Set `null_value`.
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = null_value.into();
        self
    }

    /// Set `date_format`.
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// Set `datetime_format`.
    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = Some(format.into());
        self
    }

    /// Set `batch_size`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Parquet page compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParquetCompression {
    Uncompressed,
    Snappy,
    Gzip,
    Brotli,
    Lz4Raw,
    #[default]
    Zstd,
}

/// Options for writing Parquet files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParquetWriterOptions {
    /// Page compression codec.
    pub compression: ParquetCompression,
    /// Write column statistics.
    pub statistics: bool,
    /// Maximum rows per row group.
    pub row_group_size: Option<usize>,
    /// Keep plan row order in the output.
    pub maintain_order: bool,
}

impl Default for ParquetWriterOptions {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::Zstd,
            statistics: false,
            row_group_size: None,
            maintain_order: false,
        }
    }
}

impl ParquetWriterOptions {
    /// Set `compression`.
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set `statistics`.
    pub fn with_statistics(mut self, statistics: bool) -> Self {
        self.statistics = statistics;
        self
    }

    /// Set `row_group_size`.
    pub fn with_row_group_size(mut self, row_group_size: usize) -> Self {
        self.row_group_size = Some(row_group_size);
        self
    }
}

/// Durability requested when a sink closes its file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOnClose {
    /// No explicit sync.
    None,
    /// `fsync` file data only.
    Data,
    /// `fsync` file data and metadata.
    #[default]
    All,
}

/// Options shared by all sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkOptions {
    /// Sync behaviour on close.
    pub sync_on_close: SyncOnClose,
    /// Keep plan row order in the output.
    pub maintain_order: bool,
    /// Create missing parent directories.
    pub mkdir: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            sync_on_close: SyncOnClose::All,
            maintain_order: false,
            mkdir: true,
        }
    }
}

impl SinkOptions {
    /// Set `sync_on_close`.
    pub fn with_sync_on_close(mut self, sync_on_close: SyncOnClose) -> Self {
        self.sync_on_close = sync_on_close;
        self
    }

    /// Set `maintain_order`.
    pub fn with_maintain_order(mut self, maintain_order: bool) -> Self {
        self.maintain_order = maintain_order;
        self
    }

    /// Set `mkdir`.
    pub fn with_mkdir(mut self, mkdir: bool) -> Self {
        self.mkdir = mkdir;
        self
    }
}
