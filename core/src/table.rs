use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::prelude::{CoreError, CoreResult};

/// One named column of detection attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Numerical(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numerical(values) => values.len(),
            Column::Categorical(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, keep: &[usize]) -> Column {
        match self {
            Column::Numerical(values) => {
                Column::Numerical(keep.iter().map(|&idx| values[idx]).collect())
            }
            Column::Categorical(values) => {
                Column::Categorical(keep.iter().map(|&idx| values[idx].clone()).collect())
            }
        }
    }

    fn extend_from(&mut self, other: &Column) -> CoreResult<()> {
        match (self, other) {
            (Column::Numerical(lhs), Column::Numerical(rhs)) => {
                lhs.extend_from_slice(rhs);
                Ok(())
            }
            (Column::Categorical(lhs), Column::Categorical(rhs)) => {
                lhs.extend_from_slice(rhs);
                Ok(())
            }
            _ => Err(CoreError::InvalidInput(
                "column type mismatch during concat".into(),
            )),
        }
    }
}

/// Columnar detection table loaded from one or more log files.
///
/// Rows carry stable identifiers so visibility toggles and point selection
/// survive filtering; subsets always preserve the original ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionTable {
    row_ids: Vec<u64>,
    names: Vec<String>,
    columns: HashMap<String, Column>,
}

impl DetectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    pub fn row_ids(&self) -> &[u64] {
        &self.row_ids
    }

    /// Column names in encountered order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.get(key)
    }

    pub fn has_column(&self, key: &str) -> bool {
        self.columns.contains_key(key)
    }

    /// Adds a column; the first column fixes the row count and assigns
    /// sequential row ids.
    pub fn insert_column(&mut self, name: &str, column: Column) -> CoreResult<()> {
        if self.names.is_empty() {
            self.row_ids = (0..column.len() as u64).collect();
        } else if column.len() != self.row_ids.len() {
            return Err(CoreError::InvalidInput(format!(
                "column {} has {} rows, expected {}",
                name,
                column.len(),
                self.row_ids.len()
            )));
        }
        if self.columns.insert(name.to_string(), column).is_none() {
            self.names.push(name.to_string());
        }
        Ok(())
    }

    pub fn numeric(&self, key: &str) -> Option<&[f64]> {
        match self.columns.get(key) {
            Some(Column::Numerical(values)) => Some(values),
            _ => None,
        }
    }

    pub fn categorical(&self, key: &str) -> Option<&[String]> {
        match self.columns.get(key) {
            Some(Column::Categorical(values)) => Some(values),
            _ => None,
        }
    }

    /// Distinct values of a categorical column in encountered order.
    pub fn distinct_categories(&self, key: &str) -> Vec<String> {
        let mut seen = Vec::new();
        if let Some(values) = self.categorical(key) {
            for value in values {
                if !seen.contains(value) {
                    seen.push(value.clone());
                }
            }
        }
        seen
    }

    /// Sorted distinct values of a numeric column.
    pub fn distinct_numeric_sorted(&self, key: &str) -> Option<Vec<f64>> {
        let values = self.numeric(key)?;
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup_by(|a, b| a == b);
        Some(sorted)
    }

    /// (min, max) of a numeric column; None when absent or empty.
    pub fn numeric_bounds(&self, key: &str) -> Option<(f64, f64)> {
        let values = self.numeric(key)?;
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }

    /// Row subset by index, preserving the original row ids.
    pub fn select(&self, keep: &[usize]) -> DetectionTable {
        let row_ids = keep.iter().map(|&idx| self.row_ids[idx]).collect();
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| (name.clone(), column.select(keep)))
            .collect();
        DetectionTable {
            row_ids,
            names: self.names.clone(),
            columns,
        }
    }

    /// Row subset by boolean mask, preserving original row ids and order.
    pub fn filter_rows(&self, keep: &[bool]) -> DetectionTable {
        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(idx, &flag)| flag.then_some(idx))
            .collect();
        self.select(&indices)
    }

    /// Rows whose numeric `key` equals `frame`.
    pub fn frame_slice(&self, key: &str, frame: f64) -> CoreResult<DetectionTable> {
        let values = self.numeric(key).ok_or_else(|| {
            CoreError::InvalidInput(format!("unknown frame key {}", key))
        })?;
        let keep: Vec<bool> = values.iter().map(|&value| value == frame).collect();
        Ok(self.filter_rows(&keep))
    }

    /// Concatenates tables with identical schemas; row ids are renumbered
    /// sequentially across the combined table.
    pub fn concat(tables: &[DetectionTable]) -> CoreResult<DetectionTable> {
        let mut merged = DetectionTable::new();
        let Some(first) = tables.first() else {
            return Ok(merged);
        };
        merged.names = first.names.clone();
        merged.columns = first.columns.clone();
        for table in &tables[1..] {
            if table.names != merged.names {
                return Err(CoreError::InvalidInput(
                    "tables have mismatched columns".into(),
                ));
            }
            for name in &table.names {
                let source = table.columns.get(name).ok_or_else(|| {
                    CoreError::InvalidInput(format!("missing column {}", name))
                })?;
                if let Some(target) = merged.columns.get_mut(name) {
                    target.extend_from(source)?;
                }
            }
        }
        let total = merged
            .names
            .first()
            .and_then(|name| merged.columns.get(name))
            .map(Column::len)
            .unwrap_or(0);
        merged.row_ids = (0..total as u64).collect();
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> DetectionTable {
        let mut table = DetectionTable::new();
        table
            .insert_column("Frame", Column::Numerical(vec![0.0, 0.0, 1.0, 1.0]))
            .unwrap();
        table
            .insert_column("Speed", Column::Numerical(vec![-5.0, 12.0, 3.0, 40.0]))
            .unwrap();
        table
            .insert_column(
                "LookName",
                Column::Categorical(vec![
                    "MRLL".into(),
                    "LRLL".into(),
                    "MRLL".into(),
                    "MRML".into(),
                ]),
            )
            .unwrap();
        table
    }

    #[test]
    fn insert_column_rejects_length_mismatch() {
        let mut table = sample_table();
        let result = table.insert_column("Rcs", Column::Numerical(vec![1.0]));
        assert!(result.is_err());
    }

    #[test]
    fn select_preserves_row_ids() {
        let table = sample_table();
        let subset = table.select(&[1, 3]);
        assert_eq!(subset.row_ids(), &[1, 3]);
        assert_eq!(subset.numeric("Speed").unwrap(), &[12.0, 40.0]);
    }

    #[test]
    fn frame_slice_keeps_matching_rows() {
        let table = sample_table();
        let slice = table.frame_slice("Frame", 1.0).unwrap();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.row_ids(), &[2, 3]);
    }

    #[test]
    fn distinct_categories_keep_encountered_order() {
        let table = sample_table();
        assert_eq!(
            table.distinct_categories("LookName"),
            vec!["MRLL".to_string(), "LRLL".to_string(), "MRML".to_string()]
        );
    }

    #[test]
    fn concat_renumbers_row_ids() {
        let table = sample_table();
        let merged = DetectionTable::concat(&[table.clone(), table]).unwrap();
        assert_eq!(merged.len(), 8);
        assert_eq!(merged.row_ids()[4], 4);
        assert_eq!(merged.numeric("Speed").unwrap()[4], -5.0);
    }

    #[test]
    fn numeric_bounds_span_column() {
        let table = sample_table();
        assert_eq!(table.numeric_bounds("Speed"), Some((-5.0, 40.0)));
        assert_eq!(table.numeric_bounds("Missing"), None);
    }
}
