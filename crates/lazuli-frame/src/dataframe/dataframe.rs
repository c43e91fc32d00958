use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{DataFrameError, LazyFrame, Result, Series};

/// An eager table backed by one or more Arrow `RecordBatch` values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl DataFrame {
    /// Construct a `DataFrame` from a list of `Series`.
    ///
    /// Chunk boundaries do not need to align across series as long as total lengths match.
    pub fn new(columns: Vec<Series>) -> Result<Self> {
        if columns.is_empty() {
            return Ok(Self::empty());
        }

        let mut seen_names = HashSet::with_capacity(columns.len());
        for c in &columns {
            if !seen_names.insert(c.name().to_string()) {
                return Err(DataFrameError::schema_mismatch(format!(
                    "duplicate column name '{}'",
                    c.name()
                )));
            }
        }

        let expected_len = columns[0].len();
        for c in &columns[1..] {
            if c.len() != expected_len {
                return Err(DataFrameError::schema_mismatch(format!(
                    "column length mismatch: '{}' has length {}, expected {}",
                    c.name(),
                    c.len(),
                    expected_len
                )));
            }
        }

        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.name(), c.dtype(), true))
            .collect();
        let schema: SchemaRef = Arc::new(Schema::new(fields));

        let arrays = columns
            .iter()
            .map(Series::to_array)
            .collect::<Result<Vec<_>>>()?;

        let batch = RecordBatch::try_new(schema.clone(), arrays).map_err(|e| {
            DataFrameError::schema_mismatch(format!("failed to build RecordBatch: {e}"))
        })?;

        Ok(Self {
            schema,
            batches: vec![batch],
        })
    }

    /// Construct a `DataFrame` from Arrow record batches (all batches must share the same schema).
    pub fn from_batches(batches: Vec<RecordBatch>) -> Result<Self> {
        if batches.is_empty() {
            return Ok(Self::empty());
        }

        let schema = batches[0].schema();
        for (i, b) in batches.iter().enumerate().skip(1) {
            if b.schema().as_ref() != schema.as_ref() {
                return Err(DataFrameError::schema_mismatch(format!(
                    "schema mismatch between batches: batch 0 != batch {i}"
                )));
            }
        }

        Ok(Self { schema, batches })
    }

    /// Wrap a single record batch.
    pub fn from_record_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    /// Alias for `DataFrame::new`.
    pub fn from_series(series: Vec<Series>) -> Result<Self> {
        Self::new(series)
    }

    /// Return an empty `DataFrame` (no columns, no rows).
    pub fn empty() -> Self {
        Self {
            schema: Arc::new(Schema::empty()),
            batches: Vec::new(),
        }
    }

    /// Return the number of rows.
    pub fn height(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Return the number of columns.
    pub fn width(&self) -> usize {
        self.schema.fields().len()
    }

    /// Return the Arrow schema.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Get a column by name (case-sensitive).
    pub fn column(&self, name: &str) -> Result<Series> {
        let idx = self
            .schema
            .fields()
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| DataFrameError::column_not_found(name.to_string()))?;

        let chunks = self
            .batches
            .iter()
            .map(|b| b.column(idx).clone())
            .collect::<Vec<_>>();
        Ok(Series::from_arrow_unchecked(name, chunks))
    }

    /// Return all columns in construction order.
    pub fn columns(&self) -> Vec<Series> {
        self.schema
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                let chunks = self
                    .batches
                    .iter()
                    .map(|b| b.column(idx).clone())
                    .collect::<Vec<_>>();
                Series::from_arrow_unchecked(f.name(), chunks)
            })
            .collect()
    }

    /// Return the underlying Arrow batches.
    pub fn to_arrow(&self) -> Vec<RecordBatch> {
        self.batches.clone()
    }

    /// Concatenate all batches into one (an empty batch when there are none).
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        match self.batches.as_slice() {
            [single] => Ok(single.clone()),
            batches => Ok(arrow::compute::concat_batches(&self.schema, batches)?),
        }
    }

    /// Start a lazy query over this table on the process-wide evaluator.
    pub fn lazy(&self) -> LazyFrame {
        LazyFrame::from_dataframe(self.clone())
    }

    fn to_ipc_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut buf, &self.schema)?;
            for batch in &self.batches {
                writer.write(batch)?;
            }
            writer.finish()?;
        }
        Ok(buf)
    }

    fn from_ipc_bytes(bytes: Vec<u8>) -> Result<Self> {
        let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
        let schema = reader.schema();
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { schema, batches })
    }
}

/// Tables embedded in serialized plans travel as Arrow IPC stream bytes.
impl Serialize for DataFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let bytes = self.to_ipc_bytes().map_err(serde::ser::Error::custom)?;
        bytes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DataFrame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        DataFrame::from_ipc_bytes(bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use super::DataFrame;
    use crate::{DataFrameError, Series};

    fn s_i32(name: &str, chunks: Vec<Vec<i32>>) -> Series {
        let arrays: Vec<ArrayRef> = chunks
            .into_iter()
            .map(|v| Arc::new(Int32Array::from(v)) as ArrayRef)
            .collect();
        Series::from_arrow(name, arrays).unwrap()
    }

    #[test]
    fn dataframe_new_accepts_misaligned_chunks_by_normalizing() {
        let a = s_i32("a", vec![vec![1, 2], vec![3]]);
        let b = s_i32("b", vec![vec![10], vec![20, 30]]);

        let df = DataFrame::new(vec![a, b]).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 2);
        assert_eq!(df.column_names(), vec!["a", "b"]);
        assert_eq!(df.to_arrow().len(), 1);
    }

    #[test]
    fn dataframe_new_rejects_duplicate_column_names() {
        let a1 = s_i32("a", vec![vec![1]]);
        let a2 = s_i32("a", vec![vec![2]]);
        let err = DataFrame::new(vec![a1, a2]).unwrap_err();
        assert!(matches!(err, DataFrameError::SchemaMismatch { .. }));
    }

    #[test]
    fn dataframe_new_rejects_length_mismatch() {
        let a = s_i32("a", vec![vec![1, 2]]);
        let b = s_i32("b", vec![vec![10]]);
        let err = DataFrame::new(vec![a, b]).unwrap_err();
        assert!(matches!(err, DataFrameError::SchemaMismatch { .. }));
    }

    #[test]
    fn dataframe_column_is_case_sensitive() {
        let df = DataFrame::new(vec![s_i32("a", vec![vec![1]])]).unwrap();
        assert!(matches!(
            df.column("A").unwrap_err(),
            DataFrameError::ColumnNotFound { .. }
        ));
    }

    #[test]
    fn dataframe_from_batches_rejects_schema_mismatch() {
        let a1: ArrayRef = Arc::new(Int32Array::from(vec![1]));
        let a2: ArrayRef = Arc::new(StringArray::from(vec!["x"]));

        let s1 = Arc::new(Schema::new(vec![Field::new("a", DataType::Int32, true)]));
        let s2 = Arc::new(Schema::new(vec![Field::new("a", DataType::Utf8, true)]));

        let b1 = RecordBatch::try_new(s1, vec![a1]).unwrap();
        let b2 = RecordBatch::try_new(s2, vec![a2]).unwrap();

        let err = DataFrame::from_batches(vec![b1, b2]).unwrap_err();
        assert!(matches!(err, DataFrameError::SchemaMismatch { .. }));
    }

    #[test]
    fn to_record_batch_concatenates_batches() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int32, true)]));
        let b1 = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef],
        )
        .unwrap();
        let b2 = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int32Array::from(vec![3])) as ArrayRef],
        )
        .unwrap();
        let df = DataFrame::from_batches(vec![b1, b2]).unwrap();
        assert_eq!(df.to_record_batch().unwrap().num_rows(), 3);
        assert_eq!(DataFrame::empty().to_record_batch().unwrap().num_rows(), 0);
    }

    #[test]
    fn serde_roundtrip_uses_ipc() {
        let df = DataFrame::new(vec![s_i32("a", vec![vec![1, 2, 3]])]).unwrap();
        let json = serde_json::to_vec(&df).unwrap();
        let back: DataFrame = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, df);

        let bin = bincode::serialize(&df).unwrap();
        let back: DataFrame = bincode::deserialize(&bin).unwrap();
        assert_eq!(back, df);
    }
}
