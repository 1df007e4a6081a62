use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::prelude::{CoreError, CoreResult};

/// Whether a configured key carries numeric or categorical values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    #[default]
    Numerical,
    Categorical,
}

/// Per-key display and typing information from the dataset config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: KeyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal: Option<usize>,
}

impl KeyConfig {
    /// Formats a numeric value for hover text, honoring the configured
    /// printf-style `format` or `decimal` digit count.
    pub fn format_numeric(&self, value: f64) -> String {
        if let Some(spec) = &self.format {
            return format_printf(spec, value);
        }
        if let Some(digits) = self.decimal {
            return format!("{value:.digits$}");
        }
        format!("{value}")
    }
}

/// Supports the `%.Nf` and `%d` conversions the dataset configs use;
/// anything else falls through to the plain rendering.
fn format_printf(spec: &str, value: f64) -> String {
    if let Some(rest) = spec.strip_prefix("%.") {
        if let Some(digits) = rest.strip_suffix('f') {
            if let Ok(precision) = digits.parse::<usize>() {
                return format!("{value:.precision$}");
            }
        }
    }
    if spec == "%d" {
        return format!("{}", value.round() as i64);
    }
    format!("{value}")
}

/// Dataset/UI configuration: the slider key, the key table in declaration
/// order, and optional 3-D axis overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    pub slider: String,
    pub keys: Vec<(String, KeyConfig)>,
    pub x_3d: Option<String>,
    pub y_3d: Option<String>,
    pub z_3d: Option<String>,
    pub x_ref: Option<String>,
    pub y_ref: Option<String>,
}

/// On-disk JSON shape; `keys` is an object whose member order matters, so
/// it is captured as a raw map before conversion.
#[derive(Deserialize)]
struct RawUiConfig {
    slider: String,
    keys: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    x_3d: Option<String>,
    #[serde(default)]
    y_3d: Option<String>,
    #[serde(default)]
    z_3d: Option<String>,
    #[serde(default)]
    x_ref: Option<String>,
    #[serde(default)]
    y_ref: Option<String>,
}

impl UiConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            CoreError::Config(format!("reading {}: {}", path_ref.display(), err))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> CoreResult<Self> {
        let raw: RawUiConfig = serde_json::from_str(contents)
            .map_err(|err| CoreError::Config(format!("parsing config: {}", err)))?;
        let mut keys = Vec::with_capacity(raw.keys.len());
        for (name, value) in raw.keys {
            let key: KeyConfig = serde_json::from_value(value)
                .map_err(|err| CoreError::Config(format!("key {}: {}", name, err)))?;
            keys.push((name, key));
        }
        let config = UiConfig {
            slider: raw.slider,
            keys,
            x_3d: raw.x_3d,
            y_3d: raw.y_3d,
            z_3d: raw.z_3d,
            x_ref: raw.x_ref,
            y_ref: raw.y_ref,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CoreResult<()> {
        match self.key(&self.slider) {
            Some(key) if key.kind == KeyKind::Numerical => Ok(()),
            Some(_) => Err(CoreError::Config(format!(
                "slider key {} must be numerical",
                self.slider
            ))),
            None => Err(CoreError::Config(format!(
                "slider key {} missing from key table",
                self.slider
            ))),
        }
    }

    pub fn key(&self, name: &str) -> Option<&KeyConfig> {
        self.keys
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, config)| config)
    }

    /// Key kind lookup; unknown keys default to numerical.
    pub fn key_kind(&self, name: &str) -> KeyKind {
        self.key(name).map(|key| key.kind).unwrap_or_default()
    }

    pub fn description(&self, name: &str) -> String {
        self.key(name)
            .map(|key| key.description.clone())
            .unwrap_or_else(|| name.to_string())
    }

    pub fn slider_description(&self) -> String {
        self.description(&self.slider)
    }

    /// Numerical keys in declaration order.
    pub fn numeric_keys(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter(|(_, key)| key.kind == KeyKind::Numerical)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Categorical keys in declaration order.
    pub fn categorical_keys(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter(|(_, key)| key.kind == KeyKind::Categorical)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The 3-D axis keys: explicit overrides, else the first three
    /// numerical keys.
    pub fn axis_keys(&self) -> CoreResult<(String, String, String)> {
        let numeric = self.numeric_keys();
        let pick = |override_key: &Option<String>, index: usize| {
            override_key
                .clone()
                .or_else(|| numeric.get(index).cloned())
                .ok_or_else(|| {
                    CoreError::Config("not enough numerical keys for 3-D axes".into())
                })
        };
        Ok((
            pick(&self.x_3d, 0)?,
            pick(&self.y_3d, 1)?,
            pick(&self.z_3d, 2)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "slider": "Frame",
        "keys": {
            "Frame": {"description": "Frame", "type": "numerical"},
            "Speed": {"description": "Speed (m/s)", "type": "numerical", "format": "%.2f"},
            "Range": {"description": "Range (m)", "type": "numerical", "decimal": 1},
            "LookName": {"description": "Look Name", "type": "categorical"}
        },
        "x_3d": "Range",
        "x_ref": "HostSpeed"
    }"#;

    #[test]
    fn config_parses_keys_in_declaration_order() {
        let config = UiConfig::from_json(SAMPLE).unwrap();
        assert_eq!(
            config.numeric_keys(),
            vec!["Frame".to_string(), "Speed".to_string(), "Range".to_string()]
        );
        assert_eq!(config.categorical_keys(), vec!["LookName".to_string()]);
        assert_eq!(config.x_ref.as_deref(), Some("HostSpeed"));
    }

    #[test]
    fn config_load_reads_json_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(SAMPLE.as_bytes()).unwrap();
        let path = temp.into_temp_path();
        let config = UiConfig::load(&path).unwrap();
        assert_eq!(config.slider, "Frame");
    }

    #[test]
    fn config_rejects_missing_slider_key() {
        let result = UiConfig::from_json(
            r#"{"slider": "Frame", "keys": {"Speed": {"description": "Speed"}}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn config_rejects_categorical_slider() {
        let result = UiConfig::from_json(
            r#"{"slider": "Look", "keys": {"Look": {"description": "Look", "type": "categorical"}}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn axis_keys_honor_overrides() {
        let config = UiConfig::from_json(SAMPLE).unwrap();
        let (x, y, z) = config.axis_keys().unwrap();
        assert_eq!(x, "Range");
        assert_eq!(y, "Speed");
        assert_eq!(z, "Range");
    }

    #[test]
    fn format_numeric_honors_format_and_decimal() {
        let config = UiConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.key("Speed").unwrap().format_numeric(3.14159), "3.14");
        assert_eq!(config.key("Range").unwrap().format_numeric(12.0), "12.0");
        assert_eq!(config.key("Frame").unwrap().format_numeric(7.0), "7");
    }
}
