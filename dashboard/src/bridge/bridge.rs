use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use detcore::buffer::{BufferBuilder, BufferProgress};
use detcore::config::UiConfig;
use detcore::dataset::{self, FileDescriptor};
use detcore::figure::{Figure, ViewState};
use detcore::filter::{filter_table, FilterSpec, Visibility, VisibilityMask};
use detcore::frames::FrameSequence;
use detcore::playback::{autoplay_step, manual_step, serve_frame};
use detcore::session::{
    initialize_session, invalidate_buffer, set_selection_visibility, toggle_visibility,
    update_filter,
};
use detcore::store::{CacheKey, SessionCache};
use detcore::table::DetectionTable;
use detcore::CoreError;
use serde::Deserialize;
use tokio::runtime::Builder as RuntimeBuilder;
use warp::Filter;

use crate::bridge::model::{
    ExportReply, ExportRequest, FilterRequest, FrameQuery, LoadReply, LoadRequest, StatusReply,
    StepReply, StepRequest, TaskReply, VisibilityRequest,
};
use crate::settings::ServerSettings;

fn bridge_bind_address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[derive(Debug)]
struct BridgeError;

impl warp::reject::Reject for BridgeError {}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionQuery {
    pub session_id: String,
}

/// In-process bridge state: which files each session loaded and the
/// latest buffering progress per session. Everything durable lives in the
/// session cache.
#[derive(Default)]
pub(crate) struct SharedState {
    files: HashMap<String, Vec<FileDescriptor>>,
    progress: HashMap<String, BufferProgress>,
}

type Shared = Arc<RwLock<SharedState>>;

/// Bridge hosting the session HTTP endpoints and dispatching user events
/// to the core handlers.
pub struct Bridge {
    state: Shared,
}

impl Bridge {
    pub fn new(cache: SessionCache, builder: BufferBuilder, settings: ServerSettings) -> Self {
        let state: Shared = Arc::new(RwLock::new(SharedState::default()));
        let port = settings.port;

        let cache_filter = {
            let cache = cache.clone();
            warp::any().map(move || cache.clone())
        };
        let builder_filter = {
            let builder = builder.clone();
            warp::any().map(move || builder.clone())
        };
        let state_filter = {
            let state = state.clone();
            warp::any().map(move || state.clone())
        };
        let settings_filter = {
            let settings = settings.clone();
            warp::any().map(move || settings.clone())
        };

        let deps = cache_filter
            .clone()
            .and(builder_filter.clone())
            .and(state_filter.clone())
            .and(settings_filter);

        let load_route = warp::path("load")
            .and(warp::post())
            .and(warp::body::json())
            .map(SessionEvent::Load)
            .and(deps.clone())
            .and_then(dispatch_route);

        let filter_route = warp::path("filter")
            .and(warp::post())
            .and(warp::body::json())
            .map(SessionEvent::FilterChanged)
            .and(deps.clone())
            .and_then(dispatch_route);

        let frame_route = warp::path("frame")
            .and(warp::get())
            .and(warp::query::<FrameQuery>())
            .map(SessionEvent::Navigate)
            .and(deps.clone())
            .and_then(dispatch_route);

        let step_route = warp::path("step")
            .and(warp::post())
            .and(warp::body::json())
            .map(SessionEvent::Step)
            .and(deps.clone())
            .and_then(dispatch_route);

        let visibility_route = warp::path("visibility")
            .and(warp::post())
            .and(warp::body::json())
            .map(SessionEvent::VisibilityChanged)
            .and(deps.clone())
            .and_then(dispatch_route);

        let export_route = warp::path("export")
            .and(warp::post())
            .and(warp::body::json())
            .map(SessionEvent::Export)
            .and(deps)
            .and_then(dispatch_route);

        let progress_route = warp::path("progress")
            .and(warp::get())
            .and(warp::query::<SessionQuery>())
            .and(state_filter.clone())
            .map(|query: SessionQuery, state: Shared| {
                warp::reply::json(&session_progress(&state, &query.session_id))
            });

        let status_route = warp::path("status")
            .and(warp::get())
            .and(warp::query::<SessionQuery>())
            .and(builder_filter)
            .and(state_filter)
            .map(|query: SessionQuery, builder: BufferBuilder, state: Shared| {
                let reply = StatusReply {
                    metrics: builder.metrics().snapshot(),
                    progress: session_progress(&state, &query.session_id),
                };
                warp::reply::json(&reply)
            });

        thread::spawn(move || {
            let routes = load_route
                .or(filter_route)
                .or(frame_route)
                .or(step_route)
                .or(visibility_route)
                .or(export_route)
                .or(progress_route)
                .or(status_route);
            let runtime = RuntimeBuilder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build runtime");
            runtime.block_on(async move {
                warp::serve(routes).run(bridge_bind_address(port)).await;
            });
        });

        Self { state }
    }

    pub fn publish_status(&self, message: &str) {
        let sessions = self.state.read().unwrap().files.len();
        println!("[BRIDGE] {} (sessions: {})", message, sessions);
    }
}

/// User events arriving from the reactive layer, dispatched as explicit
/// commands to the core handlers.
pub(crate) enum SessionEvent {
    Load(LoadRequest),
    FilterChanged(FilterRequest),
    Navigate(FrameQuery),
    Step(StepRequest),
    VisibilityChanged(VisibilityRequest),
    Export(ExportRequest),
}

impl SessionEvent {
    fn action(&self) -> &'static str {
        match self {
            SessionEvent::Load(_) => "load",
            SessionEvent::FilterChanged(_) => "filter change",
            SessionEvent::Navigate(_) => "frame request",
            SessionEvent::Step(_) => "step",
            SessionEvent::VisibilityChanged(_) => "visibility change",
            SessionEvent::Export(_) => "export",
        }
    }
}

pub(crate) fn dispatch(
    cache: &SessionCache,
    builder: &BufferBuilder,
    state: &Shared,
    settings: &ServerSettings,
    event: SessionEvent,
) -> anyhow::Result<serde_json::Value> {
    let reply = match event {
        SessionEvent::Load(request) => {
            serde_json::to_value(handle_load(cache, state, settings, &request)?)?
        }
        SessionEvent::FilterChanged(request) => {
            serde_json::to_value(handle_filter(cache, builder, state, request)?)?
        }
        SessionEvent::Navigate(query) => {
            serde_json::to_value(handle_frame(cache, state, &query)?)?
        }
        SessionEvent::Step(request) => serde_json::to_value(handle_step(cache, &request)?)?,
        SessionEvent::VisibilityChanged(request) => {
            serde_json::to_value(handle_visibility(cache, builder, state, request)?)?
        }
        SessionEvent::Export(request) => {
            serde_json::to_value(handle_export(cache, settings, &request)?)?
        }
    };
    Ok(reply)
}

async fn dispatch_route(
    event: SessionEvent,
    cache: SessionCache,
    builder: BufferBuilder,
    state: Shared,
    settings: ServerSettings,
) -> Result<warp::reply::Json, warp::Rejection> {
    let action = event.action();
    match dispatch(&cache, &builder, &state, &settings, event) {
        Ok(value) => Ok(warp::reply::json(&value)),
        Err(err) => {
            log::warn!("{} failed: {}", action, err);
            Err(warp::reject::custom(BridgeError))
        }
    }
}

fn session_progress(state: &Shared, session: &str) -> BufferProgress {
    state
        .read()
        .unwrap()
        .progress
        .get(session)
        .cloned()
        .unwrap_or_else(BufferProgress::idle)
}

fn first_file(state: &Shared, session: &str) -> Option<FileDescriptor> {
    state
        .read()
        .unwrap()
        .files
        .get(session)
        .and_then(|files| files.first().cloned())
}

/// Starts a background buffering pass; the handler returns immediately
/// while progress lands in the shared state.
fn spawn_buffer_pass(
    builder: &BufferBuilder,
    state: &Shared,
    session: String,
    task_id: u64,
    view: ViewState,
) {
    let builder = builder.clone();
    let image_source = first_file(state, &session);
    let progress_state = state.clone();
    let progress_session = session.clone();
    drop(tokio::task::spawn_blocking(move || {
        let result = builder.run(
            &session,
            task_id,
            &view,
            image_source.as_ref(),
            move |update| {
                progress_state
                    .write()
                    .unwrap()
                    .progress
                    .insert(progress_session.clone(), update);
            },
        );
        if let Err(err) = result {
            log::warn!("buffer task {} failed: {}", task_id, err);
        }
    }));
}

pub(crate) fn handle_load(
    cache: &SessionCache,
    state: &Shared,
    settings: &ServerSettings,
    request: &LoadRequest,
) -> anyhow::Result<LoadReply> {
    let config_path = settings
        .data_dir
        .join(&request.case)
        .join("config.json");
    let config = UiConfig::load(&config_path)?;
    let table = dataset::load_many(&request.files)?;
    let init = initialize_session(cache, &request.session_id, &config, &table)?;
    state
        .write()
        .unwrap()
        .files
        .insert(request.session_id.clone(), request.files.clone());
    Ok(LoadReply {
        status: "ok".into(),
        frames: init.frame_count,
        rows: init.row_count,
    })
}

pub(crate) fn handle_filter(
    cache: &SessionCache,
    builder: &BufferBuilder,
    state: &Shared,
    request: FilterRequest,
) -> anyhow::Result<TaskReply> {
    update_filter(cache, &request.session_id, &request.filter)?;
    let task_id = invalidate_buffer(cache, &request.session_id)?;
    spawn_buffer_pass(builder, state, request.session_id, task_id, request.view);
    Ok(TaskReply {
        status: "ok".into(),
        task_id,
    })
}

pub(crate) fn handle_frame(
    cache: &SessionCache,
    state: &Shared,
    query: &FrameQuery,
) -> anyhow::Result<Figure> {
    let image = if query.overlay {
        None
    } else {
        first_file(state, &query.session_id)
            .and_then(|descriptor| dataset::load_image(&dataset::image_path(&descriptor, query.position)))
    };
    Ok(serve_frame(
        cache,
        &query.session_id,
        &query.view(),
        &query.playback(),
        image,
    )?)
}

pub(crate) fn handle_step(cache: &SessionCache, request: &StepRequest) -> anyhow::Result<StepReply> {
    let position = if request.autoplay {
        autoplay_step(cache, &request.session_id, request.current)?
    } else {
        let direction = if request.direction == 0 {
            1
        } else {
            request.direction
        };
        Some(manual_step(
            cache,
            &request.session_id,
            request.current,
            direction,
        )?)
    };
    Ok(StepReply { position })
}

pub(crate) fn handle_visibility(
    cache: &SessionCache,
    builder: &BufferBuilder,
    state: &Shared,
    request: VisibilityRequest,
) -> anyhow::Result<TaskReply> {
    if let Some(row_id) = request.row_id {
        let _ = toggle_visibility(cache, &request.session_id, row_id)?;
    }
    if !request.selection.is_empty() {
        let target = if request.hide {
            Visibility::Hidden
        } else {
            Visibility::Visible
        };
        cache.set_json(
            &request.session_id,
            CacheKey::SelectedData,
            None,
            &request.selection,
        )?;
        set_selection_visibility(cache, &request.session_id, &request.selection, target)?;
    }
    let task_id = invalidate_buffer(cache, &request.session_id)?;
    spawn_buffer_pass(builder, state, request.session_id, task_id, request.view);
    Ok(TaskReply {
        status: "ok".into(),
        task_id,
    })
}

pub(crate) fn handle_export(
    cache: &SessionCache,
    settings: &ServerSettings,
    request: &ExportRequest,
) -> anyhow::Result<ExportReply> {
    let session = request.session_id.as_str();
    let spec = cache
        .get_json::<FilterSpec>(session, CacheKey::FilterState, None)?
        .ok_or(CoreError::MissingState("filter state"))?;
    let mask = cache
        .get_json::<VisibilityMask>(session, CacheKey::VisibleTable, None)?
        .ok_or(CoreError::MissingState("visibility mask"))?;

    let table: DetectionTable = if request.all_frames {
        cache
            .get_json(session, CacheKey::Dataset, None)?
            .ok_or(CoreError::MissingState("dataset"))?
    } else {
        let frames = cache
            .get_json::<FrameSequence>(session, CacheKey::FrameList, None)?
            .ok_or(CoreError::MissingState("frame list"))?;
        let frame_key = frames.key_at(request.position).ok_or_else(|| {
            CoreError::InvalidInput(format!("frame position {} out of range", request.position))
        })?;
        cache
            .get_json(
                session,
                CacheKey::FrameData,
                Some(&detcore::figure::frame_subkey(frame_key)),
            )?
            .ok_or(CoreError::MissingState("frame data"))?
    };

    let mut choice = Vec::new();
    if request.show_visible {
        choice.push(Visibility::Visible);
    }
    if request.show_hidden {
        choice.push(Visibility::Hidden);
    }
    let filtered = filter_table(&table, &spec, &mask, &choice)?;

    let export_dir = settings.data_dir.join("exports");
    std::fs::create_dir_all(&export_dir)?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    let path = export_dir.join(format!("{}_{}.csv", session, stamp));
    dataset::write_csv(&filtered, &path)?;

    Ok(ExportReply {
        status: "ok".into(),
        path: path.display().to_string(),
        rows: filtered.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{build_detection_table, GeneratorConfig, DEFAULT_CONFIG_JSON};
    use detcore::store::SledSessionStore;
    use std::fs;
    use std::time::Duration;

    fn test_setup(dir: &std::path::Path) -> (SessionCache, BufferBuilder, Shared, ServerSettings) {
        let cache = SessionCache::new(Arc::new(SledSessionStore::open_temp().unwrap()));
        let builder = BufferBuilder::new(cache.clone());
        let state: Shared = Arc::new(RwLock::new(SharedState::default()));
        let settings =
            ServerSettings::from_args(dir.to_path_buf(), dir.join("cache"), 9900);
        (cache, builder, state, settings)
    }

    fn write_case(dir: &std::path::Path) -> LoadRequest {
        let case_dir = dir.join("case1");
        fs::create_dir_all(&case_dir).unwrap();
        fs::write(case_dir.join("config.json"), DEFAULT_CONFIG_JSON).unwrap();

        let config = GeneratorConfig {
            frames: 4,
            points_per_frame: 8,
            seed: 7,
            ..GeneratorConfig::default()
        };
        let table = build_detection_table(&config).unwrap();
        dataset::write_csv(&table, &case_dir.join("run1.csv")).unwrap();

        LoadRequest {
            session_id: "s1".into(),
            case: "case1".into(),
            files: vec![FileDescriptor::new(
                case_dir.to_string_lossy(),
                "run1.csv",
            )],
        }
    }

    fn test_view() -> ViewState {
        ViewState {
            c_key: "Speed".into(),
            colormap: "Jet".into(),
            dark_mode: false,
            decay: 0,
            visible_choice: vec![Visibility::Visible, Visibility::Hidden],
        }
    }

    async fn wait_for_ready(cache: &SessionCache, session: &str, target: i64) {
        for _ in 0..200 {
            if cache.ready_index(session).unwrap() >= target {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("buffer never reached position {}", target);
    }

    #[tokio::test]
    async fn load_filter_and_serve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, builder, state, settings) = test_setup(dir.path());
        let request = write_case(dir.path());

        let loaded = handle_load(&cache, &state, &settings, &request).unwrap();
        assert_eq!(loaded.frames, 4);
        assert_eq!(loaded.rows, 32);

        let config = UiConfig::from_json(DEFAULT_CONFIG_JSON).unwrap();
        let table = dataset::load_many(&request.files).unwrap();
        let filter = FilterSpec::defaults(&config, &table);
        let reply = handle_filter(
            &cache,
            &builder,
            &state,
            FilterRequest {
                session_id: "s1".into(),
                filter,
                view: test_view(),
            },
        )
        .unwrap();
        assert_eq!(reply.task_id, 1);

        wait_for_ready(&cache, "s1", 3).await;

        let query = FrameQuery {
            session_id: "s1".into(),
            position: 2,
            paused: false,
            overlay: false,
            c_key: "Speed".into(),
            colormap: "Jet".into(),
            dark_mode: false,
            decay: 0,
            show_visible: true,
            show_hidden: true,
        };
        let figure = handle_frame(&cache, &state, &query).unwrap();
        // host reference trace plus one numerical detection trace
        assert_eq!(figure.data.len(), 2);
        assert_eq!(figure.data[1].x.len(), 8);

        for _ in 0..200 {
            if session_progress(&state, "s1").fraction >= 1.0 - f64::EPSILON {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(session_progress(&state, "s1").fraction >= 1.0 - f64::EPSILON);
        assert!(builder.metrics().snapshot().frames_built >= 4);
    }

    #[tokio::test]
    async fn step_and_export_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _builder, state, settings) = test_setup(dir.path());
        let request = write_case(dir.path());
        handle_load(&cache, &state, &settings, &request).unwrap();

        let step = handle_step(
            &cache,
            &StepRequest {
                session_id: "s1".into(),
                current: 3,
                direction: 1,
                autoplay: false,
            },
        )
        .unwrap();
        assert_eq!(step.position, Some(0));

        // nothing buffered yet, so an autoplay tick holds
        let hold = handle_step(
            &cache,
            &StepRequest {
                session_id: "s1".into(),
                current: 1,
                direction: 1,
                autoplay: true,
            },
        )
        .unwrap();
        assert_eq!(hold.position, None);

        let export = handle_export(
            &cache,
            &settings,
            &ExportRequest {
                session_id: "s1".into(),
                all_frames: true,
                position: 0,
                show_visible: true,
                show_hidden: true,
            },
        )
        .unwrap();
        assert_eq!(export.rows, 32);
        assert!(std::path::Path::new(&export.path).exists());
    }

    #[test]
    fn dispatch_routes_events_to_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, builder, state, settings) = test_setup(dir.path());
        let request = write_case(dir.path());

        let loaded = dispatch(
            &cache,
            &builder,
            &state,
            &settings,
            SessionEvent::Load(request),
        )
        .unwrap();
        assert_eq!(loaded["frames"], 4);

        let step = dispatch(
            &cache,
            &builder,
            &state,
            &settings,
            SessionEvent::Step(StepRequest {
                session_id: "s1".into(),
                current: 0,
                direction: -1,
                autoplay: false,
            }),
        )
        .unwrap();
        assert_eq!(step["position"], 3);
    }

    #[tokio::test]
    async fn visibility_change_restarts_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, builder, state, settings) = test_setup(dir.path());
        let request = write_case(dir.path());
        handle_load(&cache, &state, &settings, &request).unwrap();

        let reply = handle_visibility(
            &cache,
            &builder,
            &state,
            VisibilityRequest {
                session_id: "s1".into(),
                row_id: Some(3),
                selection: Vec::new(),
                hide: false,
                view: test_view(),
            },
        )
        .unwrap();
        assert_eq!(reply.task_id, 1);
        wait_for_ready(&cache, "s1", 3).await;

        let mask: VisibilityMask = cache
            .get_json("s1", CacheKey::VisibleTable, None)
            .unwrap()
            .unwrap();
        assert_eq!(mask.state(3), Visibility::Hidden);
    }
}
