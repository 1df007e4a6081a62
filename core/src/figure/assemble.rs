use serde::{Deserialize, Serialize};

use crate::config::{KeyKind, UiConfig};
use crate::filter::{filter_table, FilterSpec, Visibility, VisibilityMask};
use crate::frames::FrameSequence;
use crate::prelude::{CoreError, CoreResult};
use crate::store::{CacheKey, SessionCache};
use crate::table::DetectionTable;

use super::data::{attach_hover, hover_strings, ref_trace, scatter3d_traces, Trace};
use super::layout::{scatter3d_layout, TEMPLATE_DARK, TEMPLATE_LIGHT};
use super::Figure;

const DEFAULT_OPACITY: f64 = 0.8;
const DECAY_FLOOR_OPACITY: f64 = 0.2;
const DEFAULT_Z_RANGE: (f64, f64) = (-20.0, 20.0);
const DEFAULT_C_RANGE: (f64, f64) = (-30.0, 30.0);

/// Live view inputs accompanying every figure request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewState {
    pub c_key: String,
    pub colormap: String,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub decay: usize,
    pub visible_choice: Vec<Visibility>,
}

impl ViewState {
    pub fn template(&self) -> &'static str {
        if self.dark_mode {
            TEMPLATE_DARK
        } else {
            TEMPLATE_LIGHT
        }
    }
}

/// Structured render parameters threaded through trace and layout
/// builders; the validated replacement for the legacy kwargs bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderParams {
    pub x_key: String,
    pub y_key: String,
    pub z_key: String,
    pub c_key: String,
    pub c_type: KeyKind,
    pub c_label: String,
    pub x_ref: Option<String>,
    pub y_ref: Option<String>,
    pub ref_name: Option<String>,
    pub colormap: String,
    pub template: String,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub z_range: (f64, f64),
    pub c_range: (f64, f64),
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub z_label: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub opacity: f64,
    pub showlegend: bool,
    pub image: Option<String>,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            x_key: String::new(),
            y_key: String::new(),
            z_key: String::new(),
            c_key: String::new(),
            c_type: KeyKind::Numerical,
            c_label: String::new(),
            x_ref: None,
            y_ref: None,
            ref_name: None,
            colormap: String::new(),
            template: TEMPLATE_LIGHT.into(),
            x_range: (0.0, 1.0),
            y_range: (0.0, 1.0),
            z_range: DEFAULT_Z_RANGE,
            c_range: DEFAULT_C_RANGE,
            x_label: None,
            y_label: None,
            z_label: None,
            name: None,
            title: None,
            opacity: DEFAULT_OPACITY,
            showlegend: true,
            image: None,
        }
    }
}

fn union_range(base: (f64, f64), other: Option<(f64, f64)>) -> (f64, f64) {
    match other {
        Some(range) => (base.0.min(range.0), base.1.max(range.1)),
        None => base,
    }
}

/// Derives render parameters from the config and the active filter state.
///
/// Axis ranges are the filter's configured ranges for the chosen axes,
/// widened by the paired reference-key range when the host overlay is
/// active so both point sets stay inside frame.
pub fn prepare_render_params(
    config: &UiConfig,
    spec: &FilterSpec,
    view: &ViewState,
) -> CoreResult<RenderParams> {
    let (x_key, y_key, z_key) = config.axis_keys()?;
    let range_of = |key: &str| spec.numeric_range_for(key);

    let x_range = range_of(&x_key).ok_or_else(|| {
        CoreError::InvalidInput(format!("no numeric range for axis key {}", x_key))
    })?;
    let y_range = range_of(&y_key).ok_or_else(|| {
        CoreError::InvalidInput(format!("no numeric range for axis key {}", y_key))
    })?;
    let z_range = range_of(&z_key).unwrap_or(DEFAULT_Z_RANGE);

    let x_range = union_range(x_range, config.x_ref.as_deref().and_then(range_of));
    let y_range = union_range(y_range, config.y_ref.as_deref().and_then(range_of));

    let c_type = config.key_kind(&view.c_key);
    let c_range = match c_type {
        KeyKind::Numerical => range_of(&view.c_key).unwrap_or(DEFAULT_C_RANGE),
        KeyKind::Categorical => DEFAULT_C_RANGE,
    };

    Ok(RenderParams {
        x_label: Some(config.description(&x_key)),
        y_label: Some(config.description(&y_key)),
        z_label: Some(config.description(&z_key)),
        c_label: config.description(&view.c_key),
        x_key,
        y_key,
        z_key,
        c_key: view.c_key.clone(),
        c_type,
        x_ref: config.x_ref.clone(),
        y_ref: config.y_ref.clone(),
        ref_name: Some("Host Vehicle".into()),
        colormap: view.colormap.clone(),
        template: view.template().into(),
        x_range,
        y_range,
        z_range,
        c_range,
        ..RenderParams::default()
    })
}

/// Stable cache subkey for a frame value.
pub fn frame_subkey(frame_key: f64) -> String {
    format!("{}", frame_key)
}

/// Trace label for one frame: position plus the slider key's value.
pub fn frame_name(config: &UiConfig, position: usize, frame_key: f64) -> String {
    format!(
        "Index: {} ({}: {})",
        position,
        config.slider_description(),
        frame_key
    )
}

/// Opacities for the current frame plus `decay` trailing frames, fading
/// linearly from 1.0 down to 0.2.
pub fn opacity_ramp(decay: usize) -> Vec<f64> {
    if decay == 0 {
        return vec![1.0];
    }
    let step = (1.0 - DECAY_FLOOR_OPACITY) / decay as f64;
    (0..=decay).map(|idx| 1.0 - step * idx as f64).collect()
}

pub(crate) struct SessionView {
    pub config: UiConfig,
    pub spec: FilterSpec,
    pub mask: VisibilityMask,
    pub frames: FrameSequence,
}

pub(crate) fn load_session_view(cache: &SessionCache, session: &str) -> CoreResult<SessionView> {
    let config = cache
        .get_json::<UiConfig>(session, CacheKey::Config, None)?
        .ok_or(CoreError::MissingState("config"))?;
    let spec = cache
        .get_json::<FilterSpec>(session, CacheKey::FilterState, None)?
        .ok_or(CoreError::MissingState("filter state"))?;
    let mask = cache
        .get_json::<VisibilityMask>(session, CacheKey::VisibleTable, None)?
        .ok_or(CoreError::MissingState("visibility mask"))?;
    let frames = cache
        .get_json::<FrameSequence>(session, CacheKey::FrameList, None)?
        .ok_or(CoreError::MissingState("frame list"))?;
    Ok(SessionView {
        config,
        spec,
        mask,
        frames,
    })
}

pub(crate) fn frame_data(
    cache: &SessionCache,
    session: &str,
    frame_key: f64,
) -> CoreResult<DetectionTable> {
    cache
        .get_json::<DetectionTable>(session, CacheKey::FrameData, Some(&frame_subkey(frame_key)))?
        .ok_or(CoreError::MissingState("frame data"))
}

fn apply_colormap(traces: &mut [Trace], c_type: KeyKind, colormap: &str) {
    if c_type != KeyKind::Numerical {
        return;
    }
    if let Some(marker) = traces.first_mut().and_then(|trace| trace.marker.as_mut()) {
        marker.colorscale = Some(colormap.to_string());
    }
}

fn frame_traces(
    table: &DetectionTable,
    params: &RenderParams,
    view: &ViewState,
    keys: &[(String, crate::config::KeyConfig)],
    load_hover: bool,
) -> Vec<Trace> {
    let mut traces = scatter3d_traces(table, params);
    if load_hover {
        let hover = hover_strings(table, &params.c_key, params.c_type, keys);
        attach_hover(&mut traces, &hover);
    }
    apply_colormap(&mut traces, params.c_type, &view.colormap);
    traces
}

/// Assembles one frame's complete figure from the session's cached state:
/// filtered detection traces, up to `decay` trailing frames at reduced
/// opacity, the optional host-reference marker, and the layout.
///
/// Trailing frames stop silently at the start of the sequence, so fewer
/// than `decay` overlays near position zero is expected, not an error.
pub fn assemble_single_frame(
    cache: &SessionCache,
    session: &str,
    view: &ViewState,
    position: usize,
    load_hover: bool,
    image: Option<String>,
) -> CoreResult<Figure> {
    let state = load_session_view(cache, session)?;
    let frame_key = state.frames.key_at(position).ok_or_else(|| {
        CoreError::InvalidInput(format!("frame position {} out of range", position))
    })?;

    let mut params = prepare_render_params(&state.config, &state.spec, view)?;
    params.image = image;
    params.name = Some(frame_name(&state.config, position, frame_key));

    let slice = frame_data(cache, session, frame_key)?;
    let filtered = filter_table(&slice, &state.spec, &state.mask, &view.visible_choice)?;
    let mut traces = frame_traces(&filtered, &params, view, &state.config.keys, load_hover);

    let ramp = opacity_ramp(view.decay);
    for val in 1..=view.decay {
        let Some(prev_position) = position.checked_sub(val) else {
            break;
        };
        let Some(prev_key) = state.frames.key_at(prev_position) else {
            break;
        };
        let prev_slice = frame_data(cache, session, prev_key)?;
        let prev_filtered =
            filter_table(&prev_slice, &state.spec, &state.mask, &view.visible_choice)?;
        params.opacity = ramp[val];
        params.name = Some(frame_name(&state.config, prev_position, prev_key));
        traces.extend(frame_traces(
            &prev_filtered,
            &params,
            view,
            &state.config.keys,
            load_hover,
        ));
    }

    let mut data = Vec::new();
    if let (Some(x_ref), Some(y_ref)) = (&params.x_ref, &params.y_ref) {
        data.push(ref_trace(
            &filtered,
            x_ref,
            y_ref,
            None,
            params.ref_name.as_deref(),
        ));
    }
    data.extend(traces);

    params.opacity = DEFAULT_OPACITY;
    let layout = scatter3d_layout(&params);
    Ok(Figure { data, layout })
}

/// Assembles the overlay figure: every frame's filtered rows unioned into
/// one static figure. Position and decay are ignored, and no background
/// image is attached.
pub fn assemble_overlay_frame(
    cache: &SessionCache,
    session: &str,
    view: &ViewState,
    load_hover: bool,
) -> CoreResult<Figure> {
    let state = load_session_view(cache, session)?;

    let mut slices = Vec::with_capacity(state.frames.len());
    for &frame_key in state.frames.keys() {
        slices.push(frame_data(cache, session, frame_key)?);
    }
    let combined = DetectionTable::concat(&slices)?;
    let filtered = filter_table(&combined, &state.spec, &state.mask, &view.visible_choice)?;

    let params = prepare_render_params(&state.config, &state.spec, view)?;
    let traces = frame_traces(&filtered, &params, view, &state.config.keys, load_hover);

    let mut data = Vec::new();
    if let (Some(x_ref), Some(y_ref)) = (&params.x_ref, &params.y_ref) {
        data.push(ref_trace(
            &filtered,
            x_ref,
            y_ref,
            None,
            params.ref_name.as_deref(),
        ));
    }
    data.extend(traces);

    let layout = scatter3d_layout(&params);
    Ok(Figure { data, layout })
}
