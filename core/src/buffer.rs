use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dataset::{image_path, load_image, FileDescriptor};
use crate::figure::assemble::{frame_data, load_session_view};
use crate::figure::{
    frame_name, hover_strings, prepare_render_params, ref_trace, scatter3d_layout,
    scatter3d_traces, Trace, ViewState,
};
use crate::filter::filter_table;
use crate::prelude::CoreResult;
use crate::store::{CacheKey, SessionCache};
use crate::telemetry::BufferMetrics;

/// Fractional buffering progress plus the UI-ready label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferProgress {
    pub fraction: f64,
    pub label: String,
}

impl BufferProgress {
    pub fn idle() -> Self {
        Self {
            fraction: 0.0,
            label: "Buffering ... (0 %)".into(),
        }
    }

    fn at(fraction: f64) -> Self {
        Self {
            fraction,
            label: format!("Buffering ... ({:.2} %)", fraction * 100.0),
        }
    }

    fn ready() -> Self {
        Self {
            fraction: 1.0,
            label: "Buffer ready (100 %)".into(),
        }
    }
}

/// How a buffering run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOutcome {
    Completed,
    Cancelled,
}

/// Builds the per-frame figure buffer for a session, racing ahead of
/// playback.
///
/// A run iterates the frame sequence in order and, per position, caches
/// detection traces (no decay; readers recombine decay from adjacent
/// cached positions), hover strings, the reference trace, and the layout.
/// It is the sole writer of the ready index, and always commits the
/// artifacts before advancing it, so `position <= ready_index` is a safe
/// readiness test for concurrent readers.
#[derive(Clone)]
pub struct BufferBuilder {
    cache: SessionCache,
    metrics: Arc<BufferMetrics>,
}

impl BufferBuilder {
    pub fn new(cache: SessionCache) -> Self {
        Self::with_metrics(cache, Arc::new(BufferMetrics::new()))
    }

    pub fn with_metrics(cache: SessionCache, metrics: Arc<BufferMetrics>) -> Self {
        Self { cache, metrics }
    }

    pub fn metrics(&self) -> Arc<BufferMetrics> {
        self.metrics.clone()
    }

    /// One cooperative buffering pass under `task_id` (obtained from
    /// `session::invalidate_buffer`). Cancellation is polled once per
    /// frame: the live task id is re-checked after computing a frame and
    /// before any write, so a superseded run aborts without leaving
    /// partial artifacts under the new id. Worst-case cancellation
    /// latency is one frame's computation.
    pub fn run<F>(
        &self,
        session: &str,
        task_id: u64,
        view: &ViewState,
        image_source: Option<&FileDescriptor>,
        mut progress: F,
    ) -> CoreResult<BufferOutcome>
    where
        F: FnMut(BufferProgress),
    {
        log::info!("session {}: buffer task {} started", session, task_id);
        progress(BufferProgress::idle());

        let swept = self.cache.sweep().unwrap_or(0);
        if swept > 0 {
            log::debug!("dropped {} expired cache records", swept);
        }

        let state = load_session_view(&self.cache, session)?;
        let base_params = prepare_render_params(&state.config, &state.spec, view)?;
        let total = state.frames.len();

        for (position, &frame_key) in state.frames.keys().iter().enumerate() {
            let mut params = base_params.clone();
            params.name = Some(frame_name(&state.config, position, frame_key));
            params.image = image_source
                .and_then(|descriptor| load_image(&image_path(descriptor, position)));

            let slice = frame_data(&self.cache, session, frame_key)?;
            let filtered =
                filter_table(&slice, &state.spec, &state.mask, &view.visible_choice)?;

            let traces = scatter3d_traces(&filtered, &params);
            let hover =
                hover_strings(&filtered, &view.c_key, params.c_type, &state.config.keys);
            let ref_traces: Vec<Trace> = match (&params.x_ref, &params.y_ref) {
                (Some(x_ref), Some(y_ref)) => vec![ref_trace(
                    &filtered,
                    x_ref,
                    y_ref,
                    None,
                    params.ref_name.as_deref(),
                )],
                _ => Vec::new(),
            };
            let layout = scatter3d_layout(&params);

            if self.cache.task_id(session)? != task_id {
                log::info!(
                    "session {}: buffer task {} cancelled by a newer task",
                    session,
                    task_id
                );
                self.metrics.record_cancelled();
                progress(BufferProgress::idle());
                return Ok(BufferOutcome::Cancelled);
            }

            let position_key = position.to_string();
            self.cache
                .set_json(session, CacheKey::Figure, Some(&position_key), &traces)?;
            self.cache
                .set_json(session, CacheKey::Hover, Some(&position_key), &hover)?;
            self.cache
                .set_json(session, CacheKey::FigureRef, Some(&position_key), &ref_traces)?;
            self.cache
                .set_json(session, CacheKey::FigureLayout, Some(&position_key), &layout)?;
            // artifacts land before the index advances: a reader must
            // never observe ready >= position without the figure present
            self.cache.set_ready_index(session, position as i64)?;

            self.metrics.record_frame();
            progress(BufferProgress::at(position as f64 / total as f64));
        }

        progress(BufferProgress::ready());
        self.metrics.record_completed();
        log::info!("session {}: buffer task {} completed", session, task_id);
        Ok(BufferOutcome::Completed)
    }

    /// Fire-and-forget execution on the blocking pool so buffering never
    /// stalls interactive handlers; progress is observable through the
    /// returned watch channel.
    pub fn spawn(
        &self,
        session: String,
        task_id: u64,
        view: ViewState,
        image_source: Option<FileDescriptor>,
    ) -> (
        JoinHandle<CoreResult<BufferOutcome>>,
        watch::Receiver<BufferProgress>,
    ) {
        let (tx, rx) = watch::channel(BufferProgress::idle());
        let builder = self.clone();
        let handle = tokio::task::spawn_blocking(move || {
            builder.run(
                &session,
                task_id,
                &view,
                image_source.as_ref(),
                move |update| {
                    let _ = tx.send(update);
                },
            )
        });
        (handle, rx)
    }
}
