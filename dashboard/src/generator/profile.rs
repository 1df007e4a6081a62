use anyhow::Context;
use detcore::config::UiConfig;
use detcore::table::{Column, DetectionTable};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// The dataset config matching generated scenarios; written next to an
/// emitted CSV so a generated case is loadable like a recorded one.
pub const DEFAULT_CONFIG_JSON: &str = r#"{
    "slider": "Frame",
    "keys": {
        "Frame": {"description": "Frame", "type": "numerical"},
        "Lat": {"description": "Lateral (m)", "type": "numerical", "format": "%.2f"},
        "Lon": {"description": "Longitudinal (m)", "type": "numerical", "format": "%.2f"},
        "Height": {"description": "Height (m)", "type": "numerical", "format": "%.2f"},
        "Range": {"description": "Range (m)", "type": "numerical", "format": "%.1f"},
        "Speed": {"description": "Speed (m/s)", "type": "numerical", "format": "%.2f"},
        "Rcs": {"description": "RCS (dBsm)", "type": "numerical", "format": "%.1f"},
        "Snr": {"description": "SNR (dB)", "type": "numerical", "format": "%.1f"},
        "HostLat": {"description": "Host Lateral (m)", "type": "numerical"},
        "HostLon": {"description": "Host Longitudinal (m)", "type": "numerical"},
        "LookName": {"description": "Look Name", "type": "categorical"},
        "AfType": {"description": "AF Type", "type": "categorical"}
    },
    "x_3d": "Lat",
    "y_3d": "Lon",
    "z_3d": "Height",
    "x_ref": "HostLat",
    "y_ref": "HostLon"
}"#;

/// Configuration for generating synthetic detection scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub frames: usize,
    pub points_per_frame: usize,
    pub speed_limit: f64,
    pub range_limit: f64,
    pub noise: f64,
    pub seed: u64,
    pub look_names: Vec<String>,
    pub description: Option<String>,
    pub scenario: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            frames: 32,
            points_per_frame: 64,
            speed_limit: 40.0,
            range_limit: 120.0,
            noise: 0.5,
            seed: 0,
            look_names: vec![
                "MRLL".into(),
                "MRML".into(),
                "LRLL".into(),
                "LRML".into(),
            ],
            description: None,
            scenario: None,
        }
    }
}

impl GeneratorConfig {
    fn normalized_frames(&self) -> usize {
        self.frames.max(1)
    }

    fn normalized_points(&self) -> usize {
        self.points_per_frame.max(1)
    }
}

pub fn default_ui_config() -> anyhow::Result<UiConfig> {
    UiConfig::from_json(DEFAULT_CONFIG_JSON).context("building generator UI config")
}

/// Builds a seeded synthetic scenario: `frames * points_per_frame`
/// detections drifting down-range with the host, with per-point jitter.
pub fn build_detection_table(config: &GeneratorConfig) -> anyhow::Result<DetectionTable> {
    let frames = config.normalized_frames();
    let points = config.normalized_points();
    let total = frames
        .checked_mul(points)
        .context("overflow computing detection count for generator")?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut frame_col = Vec::with_capacity(total);
    let mut lat = Vec::with_capacity(total);
    let mut lon = Vec::with_capacity(total);
    let mut height = Vec::with_capacity(total);
    let mut range = Vec::with_capacity(total);
    let mut speed = Vec::with_capacity(total);
    let mut rcs = Vec::with_capacity(total);
    let mut snr = Vec::with_capacity(total);
    let mut host_lat = Vec::with_capacity(total);
    let mut host_lon = Vec::with_capacity(total);
    let mut look_name = Vec::with_capacity(total);
    let mut af_type = Vec::with_capacity(total);

    for frame_index in 0..frames {
        let host_x = (frame_index as f64 * 0.15).sin() * 2.0;
        let host_y = frame_index as f64 * 0.8;
        for _ in 0..points {
            let jitter = rng.gen_range(-config.noise..=config.noise);
            let x = rng.gen_range(-config.range_limit / 4.0..config.range_limit / 4.0) + jitter;
            let y = rng.gen_range(0.0..config.range_limit) + host_y;
            let z = rng.gen_range(-2.0..10.0);

            frame_col.push(frame_index as f64);
            lat.push(x);
            lon.push(y);
            height.push(z);
            range.push((x * x + y * y).sqrt());
            speed.push(rng.gen_range(-config.speed_limit..config.speed_limit));
            rcs.push(rng.gen_range(-20.0..20.0));
            snr.push(rng.gen_range(5.0..40.0));
            host_lat.push(host_x);
            host_lon.push(host_y);
            let look = rng.gen_range(0..config.look_names.len().max(1));
            look_name.push(
                config
                    .look_names
                    .get(look)
                    .cloned()
                    .unwrap_or_else(|| "MRLL".into()),
            );
            af_type.push(if rng.gen_bool(0.5) { "AF0" } else { "AF1" }.to_string());
        }
    }

    let mut table = DetectionTable::new();
    table.insert_column("Frame", Column::Numerical(frame_col))?;
    table.insert_column("Lat", Column::Numerical(lat))?;
    table.insert_column("Lon", Column::Numerical(lon))?;
    table.insert_column("Height", Column::Numerical(height))?;
    table.insert_column("Range", Column::Numerical(range))?;
    table.insert_column("Speed", Column::Numerical(speed))?;
    table.insert_column("Rcs", Column::Numerical(rcs))?;
    table.insert_column("Snr", Column::Numerical(snr))?;
    table.insert_column("HostLat", Column::Numerical(host_lat))?;
    table.insert_column("HostLon", Column::Numerical(host_lon))?;
    table.insert_column("LookName", Column::Categorical(look_name))?;
    table.insert_column("AfType", Column::Categorical(af_type))?;
    Ok(table)
}
