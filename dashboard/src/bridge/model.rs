use detcore::buffer::BufferProgress;
use detcore::dataset::FileDescriptor;
use detcore::figure::ViewState;
use detcore::filter::{FilterSpec, Visibility};
use detcore::playback::PlaybackState;
use detcore::telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_colormap() -> String {
    "Jet".into()
}

/// POST /load — bootstrap a session from one or more case files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    pub session_id: String,
    pub case: String,
    pub files: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReply {
    pub status: String,
    pub frames: usize,
    pub rows: usize,
}

/// POST /filter — store new filter parameters, invalidate the buffer, and
/// start a fresh background pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRequest {
    pub session_id: String,
    pub filter: FilterSpec,
    pub view: ViewState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReply {
    pub status: String,
    pub task_id: u64,
}

/// GET /frame — flat query-string shape for one navigation event.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameQuery {
    pub session_id: String,
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub overlay: bool,
    pub c_key: String,
    #[serde(default = "default_colormap")]
    pub colormap: String,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub decay: usize,
    #[serde(default = "default_true")]
    pub show_visible: bool,
    #[serde(default = "default_true")]
    pub show_hidden: bool,
}

impl FrameQuery {
    pub fn view(&self) -> ViewState {
        let mut visible_choice = Vec::new();
        if self.show_visible {
            visible_choice.push(Visibility::Visible);
        }
        if self.show_hidden {
            visible_choice.push(Visibility::Hidden);
        }
        ViewState {
            c_key: self.c_key.clone(),
            colormap: self.colormap.clone(),
            dark_mode: self.dark_mode,
            decay: self.decay,
            visible_choice,
        }
    }

    pub fn playback(&self) -> PlaybackState {
        PlaybackState {
            position: self.position,
            is_paused: self.paused,
            overlay: self.overlay,
        }
    }
}

/// POST /step — manual prev/next or a gated autoplay tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    pub session_id: String,
    pub current: usize,
    #[serde(default)]
    pub direction: i64,
    #[serde(default)]
    pub autoplay: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReply {
    /// None when an autoplay tick holds at the buffer ceiling.
    pub position: Option<usize>,
}

/// POST /visibility — click-to-toggle one row or hide/unhide a selection.
/// Both mutations invalidate the buffer, so the live view inputs ride
/// along to seed the fresh background pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityRequest {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selection: Vec<u64>,
    #[serde(default)]
    pub hide: bool,
    pub view: ViewState,
}

/// POST /export — write the filtered table (one frame or all) as CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub session_id: String,
    #[serde(default)]
    pub all_frames: bool,
    #[serde(default)]
    pub position: usize,
    #[serde(default = "default_true")]
    pub show_visible: bool,
    #[serde(default = "default_true")]
    pub show_hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReply {
    pub status: String,
    pub path: String,
    pub rows: usize,
}

/// GET /status — buffering counters plus the latest progress report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub metrics: MetricsSnapshot,
    pub progress: BufferProgress,
}
