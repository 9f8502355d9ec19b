//! Metric observations attached to an experiment.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::errors::{DataError, SwResult};
use crate::trial::TrialIndex;

/// One observed metric value for one trial arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub trial_index: TrialIndex,
    pub arm_name: String,
    pub metric_name: String,
    pub mean: f64,
    pub sem: f64,
}

impl MetricRow {
    pub fn new(
        trial_index: TrialIndex,
        metric_name: impl Into<String>,
        mean: f64,
        sem: f64,
    ) -> Self {
        Self {
            trial_index,
            arm_name: format!("{trial_index}_0"),
            metric_name: metric_name.into(),
            mean,
            sem,
        }
    }
}

/// Tabular metric data: rows of `{trial_index, arm_name, metric_name, mean, sem}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data {
    rows: Vec<MetricRow>,
}

impl Data {
    pub fn new(rows: Vec<MetricRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: MetricRow) {
        self.rows.push(row);
    }

    pub fn extend(&mut self, other: Data) {
        self.rows.extend(other.rows);
    }

    /// Rows for a single metric, in insertion order.
    pub fn filter_by_metric(&self, metric_name: &str) -> Data {
        Data {
            rows: self
                .rows
                .iter()
                .filter(|row| row.metric_name == metric_name)
                .cloned()
                .collect(),
        }
    }

    pub fn means(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(|row| row.mean)
    }

    /// Arrow schema used for record batch interchange.
    pub fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("trial_index", DataType::Int64, false),
            Field::new("arm_name", DataType::Utf8, false),
            Field::new("metric_name", DataType::Utf8, false),
            Field::new("mean", DataType::Float64, false),
            Field::new("sem", DataType::Float64, false),
        ]))
    }

    pub fn to_record_batch(&self) -> SwResult<RecordBatch> {
        let trial_indices = self
            .rows
            .iter()
            .map(|row| {
                i64::try_from(row.trial_index).map_err(|_| DataError::InvalidColumn {
                    name: "trial_index".to_string(),
                    message: format!("{} does not fit in an Int64 column", row.trial_index),
                })
            })
            .collect::<Result<Vec<i64>, DataError>>()?;

        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(trial_indices)),
            Arc::new(StringArray::from(
                self.rows.iter().map(|r| r.arm_name.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                self.rows.iter().map(|r| r.metric_name.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                self.rows.iter().map(|r| r.mean).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                self.rows.iter().map(|r| r.sem).collect::<Vec<_>>(),
            )),
        ];

        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }

    pub fn from_record_batch(batch: &RecordBatch) -> SwResult<Self> {
        let trial_indices = typed_column::<Int64Array>(batch, "trial_index")?;
        let arm_names = typed_column::<StringArray>(batch, "arm_name")?;
        let metric_names = typed_column::<StringArray>(batch, "metric_name")?;
        let means = typed_column::<Float64Array>(batch, "mean")?;
        let sems = typed_column::<Float64Array>(batch, "sem")?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let raw_index = trial_indices.value(i);
            let trial_index =
                TrialIndex::try_from(raw_index).map_err(|_| DataError::InvalidColumn {
                    name: "trial_index".to_string(),
                    message: format!("negative trial index {raw_index}"),
                })?;

            rows.push(MetricRow {
                trial_index,
                arm_name: arm_names.value(i).to_string(),
                metric_name: metric_names.value(i).to_string(),
                mean: means.value(i),
                sem: sems.value(i),
            });
        }

        Ok(Self { rows })
    }
}

fn typed_column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> SwResult<&'a T> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| DataError::MissingColumn {
            name: name.to_string(),
        })?;

    if column.null_count() > 0 {
        return Err(DataError::InvalidColumn {
            name: name.to_string(),
            message: format!("{} null values", column.null_count()),
        }
        .into());
    }

    column
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            DataError::InvalidColumn {
                name: name.to_string(),
                message: format!("unexpected type {}", column.data_type()),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SwError;

    fn sample() -> Data {
        Data::new(vec![
            MetricRow::new(0, "m1", 0.0, 0.0),
            MetricRow::new(1, "m1", 1.0, 0.1),
            MetricRow::new(1, "objective", 2.5, 0.2),
        ])
    }

    #[test]
    fn filter_by_metric_keeps_only_matching_rows() {
        let data = sample();
        let m1 = data.filter_by_metric("m1");
        assert_eq!(m1.len(), 2);
        assert_eq!(m1.means().collect::<Vec<_>>(), vec![0.0, 1.0]);
        assert!(data.filter_by_metric("absent").is_empty());
    }

    #[test]
    fn record_batch_preserves_rows() {
        let data = sample();
        let batch = data.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 5);

        let back = Data::from_record_batch(&batch).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn record_batch_without_required_column_is_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "trial_index",
            DataType::Int64,
            false,
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![0_i64])) as ArrayRef],
        )
        .unwrap();

        let err = Data::from_record_batch(&batch).unwrap_err();
        assert!(matches!(
            err,
            SwError::Data(DataError::MissingColumn { ref name }) if name == "arm_name"
        ));
    }
}
