pub mod profile;

pub use profile::{build_detection_table, default_ui_config, GeneratorConfig, DEFAULT_CONFIG_JSON};
