use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_csv::reader::{Format, ReaderBuilder};
use arrow_csv::WriterBuilder;
use regex::Regex;

use crate::io::options::{CsvReadOptions, CsvWriterOptions};
use crate::{DataFrame, DataFrameError, Result};

/// Schema inference sample size used when neither the scan nor the evaluator sets one.
pub const DEFAULT_INFER_SCHEMA_LENGTH: usize = 100;

/// Read a CSV file eagerly into a `DataFrame` using default `CsvReadOptions`.
pub fn read_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    read_csv_with_options(path, &CsvReadOptions::default())
}

/// Read a CSV file eagerly into a `DataFrame` using the provided options.
pub fn read_csv_with_options(
    path: impl AsRef<Path>,
    options: &CsvReadOptions,
) -> Result<DataFrame> {
    let batch = read_csv_batch(path.as_ref(), options, DEFAULT_INFER_SCHEMA_LENGTH)?;
    Ok(DataFrame::from_record_batch(batch))
}

/// Write a `DataFrame` to a CSV file with a header row.
pub fn write_csv(path: impl AsRef<Path>, df: &DataFrame) -> Result<()> {
    write_csv_with_options(path, df, &CsvWriterOptions::default())
}

/// Write a `DataFrame` to a CSV file using the provided options.
pub fn write_csv_with_options(
    path: impl AsRef<Path>,
    df: &DataFrame,
    options: &CsvWriterOptions,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| DataFrameError::io_with_path(source, path))?;
    let mut writer = csv_writer_builder(options).build(BufWriter::new(file));

    for batch in df.to_arrow() {
        writer.write(&batch)?;
    }

    writer
        .into_inner()
        .flush()
        .map_err(|source| DataFrameError::io_with_path(source, path))
}

pub(crate) fn csv_writer_builder(options: &CsvWriterOptions) -> WriterBuilder {
    let mut builder = WriterBuilder::new()
        .with_header(options.include_header)
        .with_delimiter(options.separator)
        .with_quote(options.quote_char)
        .with_null(options.null_value.clone());
    if let Some(format) = &options.date_format {
        builder = builder.with_date_format(format.clone());
    }
    if let Some(format) = &options.datetime_format {
        builder = builder.with_timestamp_format(format.clone());
    }
    if let Some(format) = &options.time_format {
        builder = builder.with_time_format(format.clone());
    }
    builder
}

/// Read a CSV file into a single record batch.
///
/// `default_infer_len` applies when the options leave `infer_schema_length` unset.
pub(crate) fn read_csv_batch(
    path: &Path,
    options: &CsvReadOptions,
    default_infer_len: usize,
) -> Result<RecordBatch> {
    validate_csv_read_options(options)?;

    let file = File::open(path).map_err(|source| DataFrameError::io_with_path(source, path))?;
    let mut reader = BufReader::new(file);

    let mut format = Format::default()
        .with_header(options.has_header)
        .with_delimiter(options.delimiter);

    if let Some(quote_char) = options.quote_char {
        format = format.with_quote(quote_char);
    }

    if !options.null_values.is_empty() {
        let pattern = options
            .null_values
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            DataFrameError::configuration("null_values", format!("invalid regex: {e}"))
        })?;
        format = format.with_null_regex(regex);
    }

    let infer_len = options.infer_schema_length.unwrap_or(default_infer_len);
    let (schema, _) = format.infer_schema(&mut reader, Some(infer_len))?;
    let schema: SchemaRef = Arc::new(schema);

    reader
        .rewind()
        .map_err(|source| DataFrameError::io_with_path(source, path))?;

    let projection = projection_indices_from_schema(&schema, options.projection.as_deref())?;
    let out_schema: SchemaRef = match &projection {
        Some(indices) => Arc::new(schema.project(indices)?),
        None => schema.clone(),
    };

    let mut builder = ReaderBuilder::new(schema).with_format(format);
    if let Some(indices) = &projection {
        builder = builder.with_projection(indices.clone());
    }
    let csv_reader = builder.build(reader)?;

    let mut batches = Vec::new();
    let mut rows = 0usize;
    for maybe_batch in csv_reader {
        if options.n_rows.is_some_and(|n| rows >= n) {
            break;
        }
        let mut batch = maybe_batch?;
        if let Some(n) = options.n_rows {
            let keep = batch.num_rows().min(n - rows);
            batch = batch.slice(0, keep);
        }
        rows += batch.num_rows();
        batches.push(batch);
    }

    Ok(arrow::compute::concat_batches(&out_schema, &batches)?)
}

fn validate_csv_read_options(options: &CsvReadOptions) -> Result<()> {
    if options.delimiter == b'\0' {
        return Err(DataFrameError::configuration(
            "delimiter",
            "delimiter must not be NUL (0x00)",
        ));
    }
    if options.quote_char == Some(b'\0') {
        return Err(DataFrameError::configuration(
            "quote_char",
            "quote_char must not be NUL (0x00)",
        ));
    }
    if options.infer_schema_length == Some(0) {
        return Err(DataFrameError::configuration(
            "infer_schema_length",
            "infer_schema_length must be greater than 0",
        ));
    }
    Ok(())
}

/// Resolve projected names to column indices in file order.
pub(crate) fn projection_indices_from_schema(
    schema: &Schema,
    projection: Option<&[String]>,
) -> Result<Option<Vec<usize>>> {
    let Some(projection) = projection else {
        return Ok(None);
    };

    let mut indices = Vec::with_capacity(projection.len());
    for name in projection {
        let idx = schema
            .fields()
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| DataFrameError::column_not_found(name.clone()))?;
        indices.push(idx);
    }
    indices.sort_unstable();
    indices.dedup();

    Ok(Some(indices))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use super::{read_csv_with_options, write_csv, write_csv_with_options};
    use crate::io::{CsvReadOptions, CsvWriterOptions};
    use crate::{DataFrame, DataFrameError};

    #[test]
    fn csv_roundtrip_basic() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Float64, true),
            Field::new("c", DataType::Utf8, true),
        ]));

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])) as ArrayRef,
                Arc::new(Float64Array::from(vec![Some(1.5), Some(2.0), None])) as ArrayRef,
                Arc::new(StringArray::from(vec![Some("x"), None, Some("z")])) as ArrayRef,
            ],
        )
        .unwrap();

        let df = DataFrame::from_batches(vec![batch]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");

        write_csv(&path, &df).unwrap();
        let df2 = read_csv_with_options(&path, &CsvReadOptions::default()).unwrap();

        assert_eq!(df2.schema().as_ref(), df.schema().as_ref());
        assert_eq!(df2.height(), df.height());
    }

    #[test]
    fn csv_projection_unknown_column_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");

        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let options = CsvReadOptions::default().with_projection(["a", "x"]);
        let err = read_csv_with_options(&path, &options).unwrap_err();
        assert!(matches!(err, DataFrameError::ColumnNotFound { .. }));
    }

    #[test]
    fn csv_projection_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

        let options = CsvReadOptions::default().with_projection(["c", "a"]);
        let df = read_csv_with_options(&path, &options).unwrap();
        assert_eq!(df.column_names(), vec!["a", "c"]);
    }

    #[test]
    fn csv_n_rows_caps_rows_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, "a\n1\n2\n3\n4\n").unwrap();

        let df = read_csv_with_options(&path, &CsvReadOptions::default().with_n_rows(2)).unwrap();
        assert_eq!(df.height(), 2);

        let df = read_csv_with_options(&path, &CsvReadOptions::default().with_n_rows(0)).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 1);
    }

    #[test]
    fn csv_invalid_delimiter_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");

        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let options = CsvReadOptions::default().with_delimiter(b'\0');
        let err = read_csv_with_options(&path, &options).unwrap_err();
        assert!(matches!(err, DataFrameError::Configuration { .. }));
    }

    #[test]
    fn csv_writer_options_are_applied() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None])) as ArrayRef,
                Arc::new(StringArray::from(vec![Some("x"), Some("y")])) as ArrayRef,
            ],
        )
        .unwrap();
        let df = DataFrame::from_record_batch(batch);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let options = CsvWriterOptions::default()
            .with_include_header(false)
            .with_separator(b';')
            .with_null_value("NA");
        write_csv_with_options(&path, &df, &options).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1;x\nNA;y\n");
    }
}
