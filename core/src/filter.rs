use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::{KeyKind, UiConfig};
use crate::prelude::{CoreError, CoreResult};
use crate::table::DetectionTable;

/// Per-row visibility flag, independent of filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Row-id keyed visibility state; rows are visible unless toggled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibilityMask {
    hidden: HashSet<u64>,
}

impl VisibilityMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, row_id: u64) -> Visibility {
        if self.hidden.contains(&row_id) {
            Visibility::Hidden
        } else {
            Visibility::Visible
        }
    }

    /// Flips a single row between visible and hidden.
    pub fn toggle(&mut self, row_id: u64) -> Visibility {
        if !self.hidden.remove(&row_id) {
            self.hidden.insert(row_id);
        }
        self.state(row_id)
    }

    pub fn set(&mut self, row_id: u64, state: Visibility) {
        match state {
            Visibility::Hidden => {
                self.hidden.insert(row_id);
            }
            Visibility::Visible => {
                self.hidden.remove(&row_id);
            }
        }
    }

    /// Applies one state to a selection of rows (box/lasso hide).
    pub fn set_many(&mut self, row_ids: &[u64], state: Visibility) {
        for &row_id in row_ids {
            self.set(row_id, state);
        }
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }
}

/// Active per-session filter parameters: parallel key/range arrays for
/// numeric predicates and key/allowed-set arrays for categorical ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub numeric_keys: Vec<String>,
    pub numeric_ranges: Vec<(f64, f64)>,
    pub categorical_keys: Vec<String>,
    pub categorical_allowed: Vec<HashSet<String>>,
}

impl FilterSpec {
    /// Load-time defaults: numeric ranges span floor(min)..ceil(max) per
    /// key, categorical sets allow every distinct value.
    pub fn defaults(config: &UiConfig, table: &DetectionTable) -> FilterSpec {
        let mut spec = FilterSpec::default();
        for (name, key) in &config.keys {
            match key.kind {
                KeyKind::Numerical => {
                    let range = table
                        .numeric_bounds(name)
                        .map(|(min, max)| (min.floor(), max.ceil()))
                        .unwrap_or((0.0, 0.0));
                    spec.numeric_keys.push(name.clone());
                    spec.numeric_ranges.push(range);
                }
                KeyKind::Categorical => {
                    let allowed: HashSet<String> =
                        table.distinct_categories(name).into_iter().collect();
                    spec.categorical_keys.push(name.clone());
                    spec.categorical_allowed.push(allowed);
                }
            }
        }
        spec
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.numeric_keys.len() != self.numeric_ranges.len() {
            return Err(CoreError::InvalidInput(
                "numeric filter arrays diverge".into(),
            ));
        }
        if self.categorical_keys.len() != self.categorical_allowed.len() {
            return Err(CoreError::InvalidInput(
                "categorical filter arrays diverge".into(),
            ));
        }
        Ok(())
    }

    /// The active range for a numeric key, if one is configured.
    pub fn numeric_range_for(&self, key: &str) -> Option<(f64, f64)> {
        self.numeric_keys
            .iter()
            .position(|name| name == key)
            .map(|idx| self.numeric_ranges[idx])
    }
}

/// Applies every filter predicate plus the visibility choice and returns
/// the matching row subset with its original row ids.
///
/// Numeric predicates keep rows inside the closed range; categorical
/// predicates keep rows whose value is in the allowed set, where an empty
/// set excludes everything (an empty selection is "show nothing", not "no
/// filter"). Zero predicates of a kind impose no restriction.
pub fn filter_table(
    table: &DetectionTable,
    spec: &FilterSpec,
    mask: &VisibilityMask,
    visible_choice: &[Visibility],
) -> CoreResult<DetectionTable> {
    spec.validate()?;

    let mut keep = vec![true; table.len()];

    for (key, range) in spec.numeric_keys.iter().zip(&spec.numeric_ranges) {
        let values = table.numeric(key).ok_or_else(|| {
            CoreError::InvalidInput(format!("unknown numeric key {}", key))
        })?;
        for (slot, value) in keep.iter_mut().zip(values) {
            if *value < range.0 || *value > range.1 {
                *slot = false;
            }
        }
    }

    for (key, allowed) in spec.categorical_keys.iter().zip(&spec.categorical_allowed) {
        if allowed.is_empty() {
            keep.iter_mut().for_each(|slot| *slot = false);
            break;
        }
        let values = table.categorical(key).ok_or_else(|| {
            CoreError::InvalidInput(format!("unknown categorical key {}", key))
        })?;
        for (slot, value) in keep.iter_mut().zip(values) {
            if !allowed.contains(value) {
                *slot = false;
            }
        }
    }

    let show_visible = visible_choice.contains(&Visibility::Visible);
    let show_hidden = visible_choice.contains(&Visibility::Hidden);
    if !(show_visible && show_hidden) {
        match (show_visible, show_hidden) {
            (false, false) => keep.iter_mut().for_each(|slot| *slot = false),
            (true, false) => {
                for (slot, &row_id) in keep.iter_mut().zip(table.row_ids()) {
                    if mask.state(row_id) != Visibility::Visible {
                        *slot = false;
                    }
                }
            }
            (false, true) => {
                for (slot, &row_id) in keep.iter_mut().zip(table.row_ids()) {
                    if mask.state(row_id) != Visibility::Hidden {
                        *slot = false;
                    }
                }
            }
            (true, true) => unreachable!(),
        }
    }

    Ok(table.filter_rows(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    const BOTH: &[Visibility] = &[Visibility::Visible, Visibility::Hidden];

    fn sample_table() -> DetectionTable {
        let mut table = DetectionTable::new();
        table
            .insert_column(
                "Speed",
                Column::Numerical(vec![-20.0, -5.0, 0.0, 8.0, 35.0]),
            )
            .unwrap();
        table
            .insert_column(
                "LookName",
                Column::Categorical(vec![
                    "MRLL".into(),
                    "MRML".into(),
                    "MRLL".into(),
                    "LRLL".into(),
                    "MRLL".into(),
                ]),
            )
            .unwrap();
        table
    }

    fn speed_filter(min: f64, max: f64) -> FilterSpec {
        FilterSpec {
            numeric_keys: vec!["Speed".into()],
            numeric_ranges: vec![(min, max)],
            ..FilterSpec::default()
        }
    }

    #[test]
    fn numeric_range_keeps_inclusive_bounds() {
        let table = sample_table();
        let filtered =
            filter_table(&table, &speed_filter(-5.0, 8.0), &VisibilityMask::new(), BOTH)
                .unwrap();
        assert_eq!(filtered.row_ids(), &[1, 2, 3]);
    }

    #[test]
    fn filter_is_idempotent() {
        let table = sample_table();
        let spec = speed_filter(-5.0, 8.0);
        let mask = VisibilityMask::new();
        let once = filter_table(&table, &spec, &mask, BOTH).unwrap();
        let twice = filter_table(&once, &spec, &mask, BOTH).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_categorical_set_excludes_everything() {
        let table = sample_table();
        let spec = FilterSpec {
            categorical_keys: vec!["LookName".into()],
            categorical_allowed: vec![HashSet::new()],
            ..FilterSpec::default()
        };
        let filtered = filter_table(&table, &spec, &VisibilityMask::new(), BOTH).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn vacuous_filter_is_identity() {
        let table = sample_table();
        let filtered =
            filter_table(&table, &FilterSpec::default(), &VisibilityMask::new(), BOTH)
                .unwrap();
        assert_eq!(filtered, table);
    }

    #[test]
    fn categorical_membership_is_anded_with_numeric() {
        let table = sample_table();
        let spec = FilterSpec {
            numeric_keys: vec!["Speed".into()],
            numeric_ranges: vec![(-10.0, 10.0)],
            categorical_keys: vec!["LookName".into()],
            categorical_allowed: vec![["MRLL".to_string()].into_iter().collect()],
        };
        let filtered = filter_table(&table, &spec, &VisibilityMask::new(), BOTH).unwrap();
        assert_eq!(filtered.row_ids(), &[2]);
    }

    #[test]
    fn visibility_choice_restricts_rows() {
        let table = sample_table();
        let mut mask = VisibilityMask::new();
        mask.set(1, Visibility::Hidden);
        mask.set(3, Visibility::Hidden);

        let visible = filter_table(
            &table,
            &FilterSpec::default(),
            &mask,
            &[Visibility::Visible],
        )
        .unwrap();
        assert_eq!(visible.row_ids(), &[0, 2, 4]);

        let hidden = filter_table(
            &table,
            &FilterSpec::default(),
            &mask,
            &[Visibility::Hidden],
        )
        .unwrap();
        assert_eq!(hidden.row_ids(), &[1, 3]);

        let none = filter_table(&table, &FilterSpec::default(), &mask, &[]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn visibility_round_trip_restores_filter_result() {
        let table = sample_table();
        let mut mask = VisibilityMask::new();
        let before = filter_table(
            &table,
            &FilterSpec::default(),
            &mask,
            &[Visibility::Visible],
        )
        .unwrap();

        assert_eq!(mask.toggle(2), Visibility::Hidden);
        assert_eq!(mask.toggle(2), Visibility::Visible);
        assert_eq!(mask, VisibilityMask::new());

        let after = filter_table(
            &table,
            &FilterSpec::default(),
            &mask,
            &[Visibility::Visible],
        )
        .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn mismatched_parallel_arrays_are_rejected() {
        let table = sample_table();
        let spec = FilterSpec {
            numeric_keys: vec!["Speed".into()],
            numeric_ranges: vec![],
            ..FilterSpec::default()
        };
        assert!(filter_table(&table, &spec, &VisibilityMask::new(), BOTH).is_err());
    }

    #[test]
    fn defaults_span_data_and_allow_all_categories() {
        let table = sample_table();
        let config = UiConfig::from_json(
            r#"{
                "slider": "Speed",
                "keys": {
                    "Speed": {"description": "Speed", "type": "numerical"},
                    "LookName": {"description": "Look", "type": "categorical"}
                }
            }"#,
        )
        .unwrap();
        let spec = FilterSpec::defaults(&config, &table);
        assert_eq!(spec.numeric_ranges, vec![(-20.0, 35.0)]);
        assert_eq!(spec.categorical_allowed[0].len(), 3);
    }
}
