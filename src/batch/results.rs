//! Ordered result containers: a timestamp-indexed series and a
//! timestamp × threshold table. Failed cells keep their reason.

use std::io::Write;

use serde::{Deserialize, Serialize};

use super::scheduler::TaskFailure;
use crate::data::Timestamp;
use crate::error::{FailureKind, RndError, Result};

/// Why a cell has no value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&RndError> for EstimationFailure {
    fn from(e: &RndError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<TaskFailure> for EstimationFailure {
    fn from(f: TaskFailure) -> Self {
        match f {
            TaskFailure::Error(e) => Self::from(&e),
            TaskFailure::Panic(message) => Self {
                kind: FailureKind::Panic,
                message,
            },
        }
    }
}

pub type Cell = std::result::Result<f64, EstimationFailure>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub timestamp: Timestamp,
    pub value: Cell,
}

/// One value per timestamp, ascending. Timestamps excluded for lack of data
/// are absent; failed estimations are present with their failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EstimateSeries {
    pub name: String,
    pub entries: Vec<SeriesEntry>,
}

impl EstimateSeries {
    pub fn new(name: impl Into<String>, mut entries: Vec<SeriesEntry>) -> Self {
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.entries.iter().map(|e| e.timestamp).collect()
    }

    /// Successful values only, the shape plots consume.
    pub fn values(&self) -> Vec<(Timestamp, f64)> {
        self.entries
            .iter()
            .filter_map(|e| e.value.as_ref().ok().map(|v| (e.timestamp, *v)))
            .collect()
    }

    pub fn failures(&self) -> Vec<(Timestamp, &EstimationFailure)> {
        self.entries
            .iter()
            .filter_map(|e| e.value.as_ref().err().map(|f| (e.timestamp, f)))
            .collect()
    }

    pub fn get(&self, timestamp: &Timestamp) -> Option<&Cell> {
        self.entries
            .binary_search_by(|e| e.timestamp.cmp(timestamp))
            .ok()
            .map(|i| &self.entries[i].value)
    }

    /// `timestamp,<name>` CSV with empty cells for failures.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(["timestamp", self.name.as_str()])?;
        for e in &self.entries {
            let value = e.value.as_ref().map(|v| v.to_string()).unwrap_or_default();
            w.write_record([e.timestamp.to_rfc3339(), value])?;
        }
        w.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub timestamp: Timestamp,
    /// One cell per threshold, in the table's column order.
    pub cells: Vec<Cell>,
}

/// Wide table: rows are timestamps, columns thresholds in request order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EstimateTable {
    pub thresholds: Vec<f64>,
    pub rows: Vec<TableRow>,
}

impl EstimateTable {
    pub fn new(thresholds: Vec<f64>, mut rows: Vec<TableRow>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|r| r.cells.len() != thresholds.len()) {
            return Err(RndError::invalid(format!(
                "row {} has {} cells for {} thresholds",
                bad.timestamp,
                bad.cells.len(),
                thresholds.len()
            )));
        }
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(Self { thresholds, rows })
    }

    pub fn n_columns(&self) -> usize {
        self.thresholds.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The column for `threshold` as a series.
    pub fn column(&self, threshold: f64) -> Option<EstimateSeries> {
        let j = self.thresholds.iter().position(|&t| t == threshold)?;
        Some(EstimateSeries::new(
            format!("p_{threshold}"),
            self.rows
                .iter()
                .map(|r| SeriesEntry {
                    timestamp: r.timestamp,
                    value: r.cells[j].clone(),
                })
                .collect(),
        ))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        let mut header = vec!["timestamp".to_string()];
        header.extend(self.thresholds.iter().map(|t| t.to_string()));
        w.write_record(&header)?;
        for row in &self.rows {
            let mut record = vec![row.timestamp.to_rfc3339()];
            record.extend(
                row.cells
                    .iter()
                    .map(|c| c.as_ref().map(|v| v.to_string()).unwrap_or_default()),
            );
            w.write_record(&record)?;
        }
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_timestamp;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn series_sorts_and_splits_values_from_failures() {
        let series = EstimateSeries::new(
            "p",
            vec![
                SeriesEntry {
                    timestamp: ts("2022-02-24 10:01:00+01:00"),
                    value: Err(EstimationFailure::from(&RndError::integration("boom"))),
                },
                SeriesEntry {
                    timestamp: ts("2022-02-24 10:00:00+01:00"),
                    value: Ok(0.3),
                },
            ],
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series.values(), vec![(ts("2022-02-24 10:00:00+01:00"), 0.3)]);
        assert_eq!(series.failures()[0].1.kind, FailureKind::Integration);
        assert_eq!(series.get(&ts("2022-02-24 10:00:00+01:00")), Some(&Ok(0.3)));

        let mut buf = Vec::new();
        series.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("timestamp,p\n"));
        assert!(text.trim_end().ends_with(','));
    }

    #[test]
    fn table_rejects_ragged_rows_and_exposes_columns() {
        let t = ts("2022-02-24 10:00:00+01:00");
        assert!(EstimateTable::new(
            vec![85.0, 95.0],
            vec![TableRow {
                timestamp: t,
                cells: vec![Ok(0.9)]
            }]
        )
        .is_err());

        let table = EstimateTable::new(
            vec![85.0, 95.0],
            vec![TableRow {
                timestamp: t,
                cells: vec![Ok(0.9), Ok(0.6)],
            }],
        )
        .unwrap();
        assert_eq!(table.n_columns(), 2);
        assert_eq!(table.column(95.0).unwrap().values(), vec![(t, 0.6)]);
        assert!(table.column(100.0).is_none());
    }

    #[test]
    fn panics_are_recorded_as_such() {
        let f = EstimationFailure::from(TaskFailure::Panic("index out of bounds".into()));
        assert_eq!(f.kind, FailureKind::Panic);
    }
}
