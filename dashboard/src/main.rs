use anyhow::Context;
use clap::Parser;
use detcore::buffer::BufferBuilder;
use detcore::figure::ViewState;
use detcore::filter::Visibility;
use detcore::session::{initialize_session, invalidate_buffer};
use detcore::store::{SessionCache, SledSessionStore};
use generator::{build_detection_table, default_ui_config, GeneratorConfig, DEFAULT_CONFIG_JSON};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;

use bridge::Bridge;
use settings::ServerSettings;

mod bridge;
mod generator;
mod settings;

#[derive(Parser)]
#[command(author, version, about = "Rust-facing DetView session driver")]
struct Args {
    /// Run one offline buffering pass over a generated scenario and emit a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load server settings from YAML
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    #[arg(long, default_value = "./cache/session")]
    cache_dir: PathBuf,
    #[arg(long, default_value_t = 9000)]
    port: u16,
    /// Emit a synthetic scenario (CSV plus config.json) into this case directory and exit
    #[arg(long)]
    generate: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Keep the HTTP bridge alive for incoming session events
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = if let Some(path) = &args.settings {
        ServerSettings::load(path)?
    } else {
        ServerSettings::from_args(args.data_dir.clone(), args.cache_dir.clone(), args.port)
    };

    if let Some(case_dir) = args.generate {
        let config = GeneratorConfig {
            seed: args.seed,
            ..GeneratorConfig::default()
        };
        let table = build_detection_table(&config)?;
        fs::create_dir_all(&case_dir)
            .with_context(|| format!("creating case directory {}", case_dir.display()))?;
        detcore::dataset::write_csv(&table, &case_dir.join("run1.csv"))?;
        fs::write(case_dir.join("config.json"), DEFAULT_CONFIG_JSON)
            .context("writing scenario config")?;
        println!(
            "Generated scenario -> {} rows across {} frames in {}",
            table.len(),
            config.frames,
            case_dir.display()
        );
        return Ok(());
    }

    let store = Arc::new(SledSessionStore::open(&settings.cache_dir)?);
    let cache = SessionCache::with_ttl(store, settings.ttl());
    let builder = BufferBuilder::new(cache.clone());

    if args.offline {
        let config = GeneratorConfig {
            seed: args.seed,
            ..GeneratorConfig::default()
        };
        let table = build_detection_table(&config)?;
        let ui_config = default_ui_config()?;
        let init = initialize_session(&cache, "offline", &ui_config, &table)?;
        let task_id = invalidate_buffer(&cache, "offline")?;
        let view = ViewState {
            c_key: "Speed".into(),
            colormap: "Jet".into(),
            dark_mode: false,
            decay: 0,
            visible_choice: vec![Visibility::Visible, Visibility::Hidden],
        };
        let outcome = builder.run("offline", task_id, &view, None, |update| {
            log::debug!("{}", update.label);
        })?;

        println!(
            "Offline run -> frames {}, rows {}, ready index {}, outcome {:?}",
            init.frame_count,
            init.row_count,
            cache.ready_index("offline")?,
            outcome
        );

        let report = format!(
            "frames={} rows={} ready_index={} outcome={:?}\n",
            init.frame_count,
            init.row_count,
            cache.ready_index("offline")?,
            outcome
        );
        let report_path = settings.data_dir.join("reports/offline_buffer.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(report_path)?;
        file.write_all(report.as_bytes())?;
    }

    if args.serve {
        let bridge = Bridge::new(cache, builder, settings);
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
