//! Mapping of raw query results to labeled samples.

use crate::connection::{Row, Value};
use crate::descriptor::{Extraction, MetricDescriptor, QueryMetric};

/// One observation of a metric, valid for a single scrape.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample<'d> {
    descriptor: &'d MetricDescriptor,
    value: f64,
    label_values: Vec<String>,
}

impl<'d> Sample<'d> {
    pub(crate) fn new(
        descriptor: &'d MetricDescriptor,
        value: f64,
        label_values: Vec<String>,
    ) -> Self {
        debug_assert_eq!(descriptor.label_names().len(), label_values.len());
        Self {
            descriptor,
            value,
            label_values,
        }
    }

    /// The descriptor this sample belongs to.
    pub fn descriptor(&self) -> &'d MetricDescriptor {
        self.descriptor
    }

    /// The gauge value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Label values, in the order of the descriptor's label names.
    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Label names zipped with their values.
    pub fn labels(&self) -> Vec<(String, String)> {
        self.descriptor
            .label_names()
            .iter()
            .cloned()
            .zip(self.label_values.iter().cloned())
            .collect()
    }
}

/// Errors converting query rows into samples.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// A scalar query returned no row.
    #[error("query returned no row")]
    MissingRow,
    /// A scalar query returned more than one row.
    #[error("expected a single row, query returned {0}")]
    UnexpectedRows(usize),
    /// A row has the wrong number of columns.
    #[error("row {row}: expected {expected} columns, found {found}")]
    ColumnCount {
        /// Zero based row index.
        row: usize,
        /// Columns required by the extraction strategy.
        expected: usize,
        /// Columns actually returned.
        found: usize,
    },
    /// The value column does not hold a number.
    #[error("row {row}, column {column}: {found} value is not numeric")]
    NotNumeric {
        /// Zero based row index.
        row: usize,
        /// Zero based column index.
        column: usize,
        /// Kind of the value found instead.
        found: &'static str,
    },
    /// The key column of a row set cannot be used as a label value.
    #[error("row {row}: {found} value cannot be used as a label")]
    InvalidKey {
        /// Zero based row index.
        row: usize,
        /// Kind of the value found instead.
        found: &'static str,
    },
}

/// Converts the rows returned by `metric`'s query into samples.
///
/// The result only depends on `rows`. A single bad row fails the whole metric.
pub fn extract(metric: &QueryMetric, rows: Vec<Row>) -> Result<Vec<Sample<'_>>, ExtractionError> {
    let descriptor = metric.descriptor();
    match metric.extraction() {
        Extraction::Scalar => {
            let value = scalar(rows)?;
            Ok(vec![Sample::new(descriptor, value, Vec::new())])
        }
        Extraction::RowSet { constant_labels } => rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let (key, value) = keyed(index, row)?;
                let mut label_values = Vec::with_capacity(1 + constant_labels.len());
                label_values.push(key);
                label_values.extend(constant_labels.iter().cloned());
                Ok(Sample::new(descriptor, value, label_values))
            })
            .collect(),
    }
}

fn scalar(rows: Vec<Row>) -> Result<f64, ExtractionError> {
    let mut rows = rows.into_iter();
    let row = rows.next().ok_or(ExtractionError::MissingRow)?;
    let extra = rows.count();
    if extra > 0 {
        return Err(ExtractionError::UnexpectedRows(extra + 1));
    }

    match row.as_slice() {
        [value] => numeric(0, 0, value),
        _ => Err(ExtractionError::ColumnCount {
            row: 0,
            expected: 1,
            found: row.len(),
        }),
    }
}

fn keyed(index: usize, row: Row) -> Result<(String, f64), ExtractionError> {
    let [key, value]: [Value; 2] = row
        .try_into()
        .map_err(|row: Row| ExtractionError::ColumnCount {
            row: index,
            expected: 2,
            found: row.len(),
        })?;

    let value = numeric(index, 1, &value)?;
    let key = match key {
        Value::Text(key) => key,
        Value::Int(key) => key.to_string(),
        Value::Float(key) => key.to_string(),
        other => {
            return Err(ExtractionError::InvalidKey {
                row: index,
                found: other.kind(),
            })
        }
    };

    Ok((key, value))
}

fn numeric(row: usize, column: usize, value: &Value) -> Result<f64, ExtractionError> {
    value.as_f64().ok_or(ExtractionError::NotNumeric {
        row,
        column,
        found: value.kind(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    fn connections() -> QueryMetric {
        QueryMetric::row_set(
            "test_connections",
            "Number of active connections",
            &["database", "state"],
            "SELECT name, count",
            &["current"],
        )
        .unwrap()
    }

    fn local_time() -> QueryMetric {
        QueryMetric::scalar("test_local_time", "Seconds since epoch", "SELECT now")
    }

    fn row(key: &str, value: i64) -> Row {
        vec![Value::Text(key.to_string()), Value::Int(value)]
    }

    #[test]
    fn scalar_single_value() {
        let metric = local_time();
        let samples = extract(&metric, vec![vec![Value::Int(1700000000)]]).unwrap();

        assert_eq!(1, samples.len());
        assert_eq!(1700000000.0, samples[0].value());
        assert!(samples[0].label_values().is_empty());
        assert_eq!("test_local_time", samples[0].descriptor().name());
    }

    #[test]
    fn scalar_failures() {
        let metric = local_time();

        assert_eq!(Err(ExtractionError::MissingRow), extract(&metric, vec![]));
        assert_eq!(
            Err(ExtractionError::UnexpectedRows(2)),
            extract(&metric, vec![vec![Value::Int(1)], vec![Value::Int(2)]])
        );
        assert_eq!(
            Err(ExtractionError::ColumnCount {
                row: 0,
                expected: 1,
                found: 2
            }),
            extract(&metric, vec![vec![Value::Int(1), Value::Int(2)]])
        );
        assert_eq!(
            Err(ExtractionError::NotNumeric {
                row: 0,
                column: 0,
                found: "null"
            }),
            extract(&metric, vec![vec![Value::Null]])
        );
    }

    #[test]
    fn row_set_keeps_row_order() {
        let metric = connections();
        let samples = extract(&metric, vec![row("db1", 5), row("db2", 2)]).unwrap();

        let got: Vec<_> = samples
            .iter()
            .map(|s| (s.value(), s.label_values().to_vec()))
            .collect();
        assert_eq!(
            vec![
                (5.0, vec!["db1".to_string(), "current".to_string()]),
                (2.0, vec!["db2".to_string(), "current".to_string()]),
            ],
            got
        );
        assert_eq!(
            vec![
                ("database".to_string(), "db1".to_string()),
                ("state".to_string(), "current".to_string()),
            ],
            samples[0].labels()
        );
    }

    #[test]
    fn row_set_without_rows() {
        assert_eq!(Ok(vec![]), extract(&connections(), vec![]));
    }

    #[test]
    fn row_set_bad_row_fails_metric() {
        let metric = connections();

        assert_eq!(
            Err(ExtractionError::InvalidKey {
                row: 1,
                found: "null"
            }),
            extract(
                &metric,
                vec![row("db1", 5), vec![Value::Null, Value::Int(3)]]
            )
        );
        assert_eq!(
            Err(ExtractionError::NotNumeric {
                row: 0,
                column: 1,
                found: "text"
            }),
            extract(
                &metric,
                vec![vec![Value::Text("db1".into()), Value::Text("many".into())]]
            )
        );
        assert_eq!(
            Err(ExtractionError::ColumnCount {
                row: 0,
                expected: 2,
                found: 1
            }),
            extract(&metric, vec![vec![Value::Int(3)]])
        );
    }

    #[test]
    fn row_set_integer_key() {
        let metric = connections();
        let samples = extract(&metric, vec![vec![Value::Int(7), Value::Float(1.5)]]).unwrap();
        assert_eq!(["7", "current"], samples[0].label_values());
    }

    #[test]
    fn row_set_float_key() {
        let metric = connections();
        let samples = extract(
            &metric,
            vec![
                vec![Value::Float(2.5), Value::Int(1)],
                vec![Value::Float(3.0), Value::Int(4)],
            ],
        )
        .unwrap();
        assert_eq!(["2.5", "current"], samples[0].label_values());
        assert_eq!(["3", "current"], samples[1].label_values());

        assert_eq!(
            Err(ExtractionError::InvalidKey {
                row: 0,
                found: "xml"
            }),
            extract(&metric, vec![vec![Value::Unsupported("xml"), Value::Int(1)]])
        );
    }

    #[test]
    fn row_set_label_count_matches_descriptor() {
        fn prop(rows: Vec<(String, i32)>) -> bool {
            let metric = connections();
            let rows = rows
                .into_iter()
                .map(|(key, value)| vec![Value::Text(key), Value::Int(value.into())])
                .collect::<Vec<_>>();
            let count = rows.len();

            let samples = extract(&metric, rows).unwrap();
            samples.len() == count
                && samples
                    .iter()
                    .all(|s| s.label_values().len() == metric.descriptor().label_names().len())
        }

        QuickCheck::new()
            .tests(200)
            .quickcheck(prop as fn(Vec<(String, i32)>) -> bool);
    }

    #[test]
    fn row_set_is_pure() {
        fn prop(rows: Vec<(String, i64)>) -> TestResult {
            if rows.is_empty() {
                return TestResult::discard();
            }
            let metric = connections();
            let rows = rows
                .into_iter()
                .map(|(key, value)| vec![Value::Text(key), Value::Int(value)])
                .collect::<Vec<_>>();

            let first = extract(&metric, rows.clone()).unwrap();
            let second = extract(&metric, rows).unwrap();
            TestResult::from_bool(first == second)
        }

        QuickCheck::new().quickcheck(prop as fn(Vec<(String, i64)>) -> TestResult);
    }
}
