//! In-memory inspection of curated Parquet artifacts

use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use paypipe_common::storage::ObjectStore;
use paypipe_common::{PipelineError, Result};

/// A fully decoded Parquet file
#[derive(Debug, Clone)]
pub struct CuratedTable {
    columns: Vec<String>,
    batches: Vec<RecordBatch>,
}

impl CuratedTable {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
            .map_err(|e| PipelineError::Parquet(format!("parquet reader init failed: {e}")))?;
        let columns = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        let reader = builder
            .build()
            .map_err(|e| PipelineError::Parquet(format!("parquet reader build failed: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| PipelineError::Parquet(format!("parquet read batch failed: {e}")))?;
            batches.push(batch);
        }
        Ok(Self { columns, batches })
    }

    /// Load `path` from the store, `None` when it does not exist.
    pub async fn load(store: &dyn ObjectStore, path: &str) -> Result<Option<Self>> {
        match store.get_bytes(path).await? {
            Some(bytes) => Ok(Some(Self::from_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn row_count(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Nulls in `column`, `None` if the column is absent.
    pub fn null_count(&self, column: &str) -> Option<usize> {
        if !self.has_column(column) {
            return None;
        }
        Some(
            self.batches
                .iter()
                .filter_map(|b| b.column_by_name(column))
                .map(|a| a.null_count())
                .sum(),
        )
    }

    /// Values of `column` rendered as strings, `None` if the column is absent.
    pub fn string_values(&self, column: &str) -> Result<Option<Vec<Option<String>>>> {
        if !self.has_column(column) {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(self.row_count());
        for batch in &self.batches {
            let Some(array) = batch.column_by_name(column) else {
                continue;
            };
            let utf8 = cast(array, &DataType::Utf8).map_err(|e| {
                PipelineError::Parquet(format!("column '{column}' is not castable to string: {e}"))
            })?;
            let strings = utf8
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| PipelineError::Parquet(format!("column '{column}' is not StringArray")))?;
            values.extend(strings.iter().map(|v| v.map(str::to_string)));
        }
        Ok(Some(values))
    }
}
