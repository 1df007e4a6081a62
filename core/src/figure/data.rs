use serde::{Deserialize, Serialize};

use crate::config::{KeyConfig, KeyKind};
use crate::table::DetectionTable;

use super::assemble::RenderParams;

const MARKER_SIZE: f64 = 3.0;
const REF_MARKER_SIZE: f64 = 6.0;
const MARKER_LINE_COLOR: &str = "#757575";

/// Marker outline styling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub width: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorBar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Marker color: a fixed CSS color or one value per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerColor {
    Fixed(String),
    Values(Vec<f64>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(default)]
    pub size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<MarkerColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorscale: Option<String>,
    #[serde(default)]
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorbar: Option<ColorBar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmax: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<MarkerLine>,
}

/// One scatter3d trace in the shape the front-end renderer consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<u64>>,
    #[serde(default)]
    pub x: Vec<f64>,
    #[serde(default)]
    pub y: Vec<f64>,
    #[serde(default)]
    pub z: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hovertemplate: Option<String>,
    #[serde(default)]
    pub showlegend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
}

impl Trace {
    /// Placeholder trace for an empty row subset.
    pub fn empty() -> Self {
        Self {
            kind: "scatter3d".into(),
            mode: "markers".into(),
            ids: None,
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            name: None,
            text: None,
            hovertemplate: None,
            showlegend: false,
            marker: None,
        }
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::empty()
    }
}

fn axis_values(table: &DetectionTable, key: &str) -> Vec<f64> {
    table.numeric(key).map(<[f64]>::to_vec).unwrap_or_default()
}

/// Builds the detection traces for one filtered row subset.
///
/// A numerical color key yields a single trace with a continuous colorbar
/// clamped to the configured color range. A categorical key yields one
/// trace per distinct value in encountered order (colors fall to the
/// renderer's default cycling), which means cross-frame color assignment
/// is not guaranteed stable.
pub fn scatter3d_traces(table: &DetectionTable, params: &RenderParams) -> Vec<Trace> {
    if table.is_empty() {
        return vec![Trace::empty()];
    }

    match params.c_type {
        KeyKind::Numerical => {
            let color = table
                .numeric(&params.c_key)
                .map(|values| MarkerColor::Values(values.to_vec()));
            vec![Trace {
                ids: Some(table.row_ids().to_vec()),
                x: axis_values(table, &params.x_key),
                y: axis_values(table, &params.y_key),
                z: axis_values(table, &params.z_key),
                name: params.name.clone(),
                showlegend: params.showlegend,
                marker: Some(Marker {
                    size: MARKER_SIZE,
                    color,
                    opacity: params.opacity,
                    colorbar: Some(ColorBar {
                        title: Some(params.c_label.clone()),
                    }),
                    cmin: Some(params.c_range.0),
                    cmax: Some(params.c_range.1),
                    line: Some(MarkerLine {
                        color: Some(MARKER_LINE_COLOR.into()),
                        width: 0.0,
                    }),
                    ..Marker::default()
                }),
                ..Trace::empty()
            }]
        }
        KeyKind::Categorical => table
            .distinct_categories(&params.c_key)
            .into_iter()
            .map(|category| {
                let values = table.categorical(&params.c_key).unwrap_or(&[]);
                let keep: Vec<bool> = values.iter().map(|value| *value == category).collect();
                let subset = table.filter_rows(&keep);
                Trace {
                    ids: Some(subset.row_ids().to_vec()),
                    x: axis_values(&subset, &params.x_key),
                    y: axis_values(&subset, &params.y_key),
                    z: axis_values(&subset, &params.z_key),
                    name: Some(category),
                    showlegend: params.showlegend,
                    marker: Some(Marker {
                        size: MARKER_SIZE,
                        opacity: params.opacity,
                        line: Some(MarkerLine {
                            color: Some(MARKER_LINE_COLOR.into()),
                            width: 0.0,
                        }),
                        ..Marker::default()
                    }),
                    ..Trace::empty()
                }
            })
            .collect(),
    }
}

/// Single-point host/reference marker, drawn from the first filtered row;
/// z defaults to ground level when no z reference key is configured.
pub fn ref_trace(
    table: &DetectionTable,
    x_key: &str,
    y_key: &str,
    z_key: Option<&str>,
    name: Option<&str>,
) -> Trace {
    let first = |key: &str| table.numeric(key).and_then(|values| values.first().copied());
    let (Some(x), Some(y)) = (first(x_key), first(y_key)) else {
        return Trace::empty();
    };
    let z = z_key.and_then(first).unwrap_or(0.0);
    Trace {
        x: vec![x],
        y: vec![y],
        z: vec![z],
        name: name.map(str::to_string),
        hovertemplate: Some("Lateral: %{x:.2f} m<br>Longitudinal: %{y:.2f} m<br>".into()),
        showlegend: true,
        marker: Some(Marker {
            size: REF_MARKER_SIZE,
            color: Some(MarkerColor::Fixed("rgb(255, 255, 255)".into())),
            opacity: 1.0,
            symbol: Some("circle".into()),
            line: Some(MarkerLine {
                color: Some("#000000".into()),
                width: 2.0,
            }),
            ..Marker::default()
        }),
        ..Trace::empty()
    }
}

fn hover_line(key: &str, config: &KeyConfig, table: &DetectionTable, row: usize) -> String {
    if let Some(values) = table.numeric(key) {
        format!("{}: {}<br>", config.description, config.format_numeric(values[row]))
    } else if let Some(values) = table.categorical(key) {
        format!("{}: {}<br>", config.description, values[row])
    } else {
        String::new()
    }
}

fn hover_block(table: &DetectionTable, keys: &[(String, KeyConfig)]) -> Vec<String> {
    (0..table.len())
        .map(|row| {
            keys.iter()
                .filter(|(key, _)| table.has_column(key))
                .map(|(key, config)| hover_line(key, config, table, row))
                .collect()
        })
        .collect()
}

/// Per-trace hover strings: one block for a numerical color key, one per
/// category (encountered order) for a categorical one. Built only on
/// demand, it is the expensive part of figure assembly.
pub fn hover_strings(
    table: &DetectionTable,
    c_key: &str,
    c_type: KeyKind,
    keys: &[(String, KeyConfig)],
) -> Vec<Vec<String>> {
    if keys.is_empty() {
        return Vec::new();
    }
    match c_type {
        KeyKind::Numerical => vec![hover_block(table, keys)],
        KeyKind::Categorical => table
            .distinct_categories(c_key)
            .into_iter()
            .map(|category| {
                let values = table.categorical(c_key).unwrap_or(&[]);
                let keep: Vec<bool> = values.iter().map(|value| *value == category).collect();
                hover_block(&table.filter_rows(&keep), keys)
            })
            .collect(),
    }
}

/// Attaches hover text to a trace group produced for the same row subset.
pub fn attach_hover(traces: &mut [Trace], hover: &[Vec<String>]) {
    for (trace, text) in traces.iter_mut().zip(hover) {
        trace.text = Some(text.clone());
        trace.hovertemplate = Some("%{text}".into());
    }
}
