use serde::{Deserialize, Serialize};

use crate::config::{KeyKind, UiConfig};
use crate::figure::{
    assemble_overlay_frame, assemble_single_frame, attach_hover, opacity_ramp, Figure, Layout,
    Trace, ViewState, TEMPLATE_DARK, TEMPLATE_LIGHT,
};
use crate::frames::{advance_autoplay, next_position, FrameSequence};
use crate::prelude::{CoreError, CoreResult};
use crate::store::{CacheKey, SessionCache};

/// Playback inputs for one navigation event. Decay travels with the view
/// inputs (`ViewState`) since it also shapes synchronous assembly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlaybackState {
    pub position: usize,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub overlay: bool,
}

fn template_for(dark_mode: bool) -> &'static str {
    if dark_mode {
        TEMPLATE_DARK
    } else {
        TEMPLATE_LIGHT
    }
}

/// Colormap swap on an already-produced figure; purely visual, never
/// triggers refiltering.
pub fn restyle_colormap(figure: &mut Figure, colormap: &str) {
    for trace in &mut figure.data {
        if let Some(marker) = trace.marker.as_mut() {
            marker.colorscale = Some(colormap.to_string());
        }
    }
}

/// Dark/light template swap on an already-produced figure.
pub fn apply_template(figure: &mut Figure, dark_mode: bool) {
    figure.layout.template = template_for(dark_mode).into();
}

fn swap_colorscale(traces: &mut [Trace], c_type: KeyKind, colormap: &str) {
    if c_type != KeyKind::Numerical {
        return;
    }
    if let Some(marker) = traces.first_mut().and_then(|trace| trace.marker.as_mut()) {
        marker.colorscale = Some(colormap.to_string());
    }
}

/// Reassembles a buffered frame from cached artifacts, reapplying only
/// the purely-visual overrides: hover while paused, the live colormap,
/// and decay recombination from already-cached earlier positions.
fn serve_cached(
    cache: &SessionCache,
    session: &str,
    view: &ViewState,
    playback: &PlaybackState,
) -> CoreResult<Option<Figure>> {
    let position_key = playback.position.to_string();
    let Some(mut traces) =
        cache.get_json::<Vec<Trace>>(session, CacheKey::Figure, Some(&position_key))?
    else {
        return Ok(None);
    };
    let config = cache
        .get_json::<UiConfig>(session, CacheKey::Config, None)?
        .ok_or(CoreError::MissingState("config"))?;
    let c_type = config.key_kind(&view.c_key);

    if playback.is_paused {
        if let Some(hover) =
            cache.get_json::<Vec<Vec<String>>>(session, CacheKey::Hover, Some(&position_key))?
        {
            attach_hover(&mut traces, &hover);
        }
    }
    swap_colorscale(&mut traces, c_type, &view.colormap);

    let ramp = opacity_ramp(view.decay);
    for val in 1..=view.decay {
        let Some(prev_position) = playback.position.checked_sub(val) else {
            break;
        };
        let prev_key = prev_position.to_string();
        let Some(mut prev_traces) =
            cache.get_json::<Vec<Trace>>(session, CacheKey::Figure, Some(&prev_key))?
        else {
            break;
        };
        if let Some(marker) = prev_traces
            .first_mut()
            .and_then(|trace| trace.marker.as_mut())
        {
            marker.opacity = ramp[val];
        }
        if playback.is_paused {
            if let Some(hover) =
                cache.get_json::<Vec<Vec<String>>>(session, CacheKey::Hover, Some(&prev_key))?
            {
                attach_hover(&mut prev_traces, &hover);
            }
        }
        swap_colorscale(&mut prev_traces, c_type, &view.colormap);
        traces.append(&mut prev_traces);
    }

    let ref_traces = cache
        .get_json::<Vec<Trace>>(session, CacheKey::FigureRef, Some(&position_key))?
        .unwrap_or_default();
    let Some(mut layout) =
        cache.get_json::<Layout>(session, CacheKey::FigureLayout, Some(&position_key))?
    else {
        return Ok(None);
    };
    layout.template = template_for(view.dark_mode).into();

    let mut data = ref_traces;
    data.append(&mut traces);
    Ok(Some(Figure { data, layout }))
}

/// The controller read protocol: overlay mode always reassembles the
/// union figure; otherwise a buffered frame is served from cache when
/// `position <= ready_index`, and anything past the buffer falls back to
/// synchronous single-frame assembly (a latency cost, never an error).
pub fn serve_frame(
    cache: &SessionCache,
    session: &str,
    view: &ViewState,
    playback: &PlaybackState,
    image: Option<String>,
) -> CoreResult<Figure> {
    if playback.overlay {
        let mut figure = assemble_overlay_frame(cache, session, view, playback.is_paused)?;
        apply_template(&mut figure, view.dark_mode);
        return Ok(figure);
    }

    let ready = cache.ready_index(session)?;
    if playback.position as i64 <= ready {
        if let Some(figure) = serve_cached(cache, session, view, playback)? {
            return Ok(figure);
        }
    }

    let mut figure = assemble_single_frame(
        cache,
        session,
        view,
        playback.position,
        playback.is_paused,
        image,
    )?;
    apply_template(&mut figure, view.dark_mode);
    Ok(figure)
}

fn frame_ceiling(cache: &SessionCache, session: &str) -> CoreResult<usize> {
    let frames = cache
        .get_json::<FrameSequence>(session, CacheKey::FrameList, None)?
        .ok_or(CoreError::MissingState("frame list"))?;
    frames
        .last_position()
        .ok_or_else(|| CoreError::InvalidInput("empty frame sequence".into()))
}

/// Manual prev/next step; wraps at both ends of the sequence.
pub fn manual_step(
    cache: &SessionCache,
    session: &str,
    current: usize,
    direction: i64,
) -> CoreResult<usize> {
    let max = frame_ceiling(cache, session)?;
    Ok(next_position(current, max, direction))
}

/// Autoplay timer tick; holds while playback has caught up with the
/// background buffer.
pub fn autoplay_step(
    cache: &SessionCache,
    session: &str,
    current: usize,
) -> CoreResult<Option<usize>> {
    let max = frame_ceiling(cache, session)?;
    let ready = cache.ready_index(session)?;
    Ok(advance_autoplay(current, max, ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferBuilder;
    use crate::filter::Visibility;
    use crate::session::{initialize_session, invalidate_buffer};
    use crate::store::SledSessionStore;
    use crate::table::{Column, DetectionTable};
    use std::sync::Arc;

    fn test_cache() -> SessionCache {
        SessionCache::new(Arc::new(SledSessionStore::open_temp().unwrap()))
    }

    fn test_config() -> UiConfig {
        UiConfig::from_json(
            r#"{
                "slider": "Frame",
                "keys": {
                    "Frame": {"description": "Frame"},
                    "Lat": {"description": "Lateral (m)"},
                    "Lon": {"description": "Longitudinal (m)"},
                    "Height": {"description": "Height (m)"},
                    "Speed": {"description": "Speed (m/s)"}
                },
                "x_3d": "Lat",
                "y_3d": "Lon",
                "z_3d": "Height"
            }"#,
        )
        .unwrap()
    }

    fn test_table() -> DetectionTable {
        let mut table = DetectionTable::new();
        table
            .insert_column(
                "Frame",
                Column::Numerical((0..40).map(|idx| (idx / 8) as f64).collect()),
            )
            .unwrap();
        table
            .insert_column(
                "Lat",
                Column::Numerical((0..40).map(|idx| idx as f64 * 0.2).collect()),
            )
            .unwrap();
        table
            .insert_column(
                "Lon",
                Column::Numerical((0..40).map(|idx| idx as f64).collect()),
            )
            .unwrap();
        table
            .insert_column(
                "Height",
                Column::Numerical((0..40).map(|idx| (idx % 4) as f64).collect()),
            )
            .unwrap();
        table
            .insert_column(
                "Speed",
                Column::Numerical((0..40).map(|idx| idx as f64 - 20.0).collect()),
            )
            .unwrap();
        table
    }

    fn view() -> ViewState {
        ViewState {
            c_key: "Speed".into(),
            colormap: "Jet".into(),
            dark_mode: false,
            decay: 0,
            visible_choice: vec![Visibility::Visible, Visibility::Hidden],
        }
    }

    fn buffered_session(cache: &SessionCache) {
        initialize_session(cache, "s1", &test_config(), &test_table()).unwrap();
        let task_id = invalidate_buffer(cache, "s1").unwrap();
        BufferBuilder::new(cache.clone())
            .run("s1", task_id, &view(), None, |_| {})
            .unwrap();
    }

    #[test]
    fn buffered_position_is_served_from_cache() {
        let cache = test_cache();
        buffered_session(&cache);

        let playback = PlaybackState {
            position: 2,
            is_paused: false,
            overlay: false,
        };
        let figure = serve_frame(&cache, "s1", &view(), &playback, None).unwrap();
        assert_eq!(figure.data.len(), 1);
        assert_eq!(
            figure.data[0].marker.as_ref().unwrap().colorscale.as_deref(),
            Some("Jet")
        );
        assert_eq!(figure.layout.template, TEMPLATE_LIGHT);
        // buffered traces carry no hover while playing
        assert!(figure.data[0].text.is_none());
    }

    #[test]
    fn paused_serve_attaches_cached_hover() {
        let cache = test_cache();
        buffered_session(&cache);

        let playback = PlaybackState {
            position: 1,
            is_paused: true,
            overlay: false,
        };
        let figure = serve_frame(&cache, "s1", &view(), &playback, None).unwrap();
        assert_eq!(figure.data[0].hovertemplate.as_deref(), Some("%{text}"));
        assert_eq!(figure.data[0].text.as_ref().unwrap().len(), 8);
    }

    #[test]
    fn decay_recombines_from_cached_positions() {
        let cache = test_cache();
        buffered_session(&cache);

        let mut decayed = view();
        decayed.decay = 2;
        let playback = PlaybackState {
            position: 3,
            is_paused: false,
            overlay: false,
        };
        let figure = serve_frame(&cache, "s1", &decayed, &playback, None).unwrap();
        assert_eq!(figure.data.len(), 3);
        let opacities: Vec<f64> = figure
            .data
            .iter()
            .map(|trace| trace.marker.as_ref().unwrap().opacity)
            .collect();
        assert!(opacities[1] < opacities[0]);
        assert!(opacities[2] < opacities[1]);
    }

    #[test]
    fn unbuffered_position_falls_back_to_synchronous_assembly() {
        let cache = test_cache();
        buffered_session(&cache);
        // a filter change invalidates the buffer
        invalidate_buffer(&cache, "s1").unwrap();
        assert_eq!(cache.ready_index("s1").unwrap(), -1);

        let playback = PlaybackState {
            position: 4,
            is_paused: false,
            overlay: false,
        };
        let figure = serve_frame(&cache, "s1", &view(), &playback, None).unwrap();
        assert_eq!(figure.data.len(), 1);
        assert_eq!(figure.data[0].x.len(), 8);
    }

    #[test]
    fn overlay_ignores_position_and_buffer() {
        let cache = test_cache();
        buffered_session(&cache);

        let playback = PlaybackState {
            position: 0,
            is_paused: false,
            overlay: true,
        };
        let figure = serve_frame(&cache, "s1", &view(), &playback, None).unwrap();
        assert_eq!(figure.data[0].x.len(), 40);
    }

    #[test]
    fn dark_mode_swaps_template_without_refiltering() {
        let cache = test_cache();
        buffered_session(&cache);

        let mut dark = view();
        dark.dark_mode = true;
        let playback = PlaybackState {
            position: 0,
            is_paused: false,
            overlay: false,
        };
        let figure = serve_frame(&cache, "s1", &dark, &playback, None).unwrap();
        assert_eq!(figure.layout.template, TEMPLATE_DARK);
    }

    #[test]
    fn restyle_touches_only_marker_colorscales() {
        let cache = test_cache();
        buffered_session(&cache);
        let playback = PlaybackState {
            position: 0,
            is_paused: false,
            overlay: false,
        };
        let mut figure = serve_frame(&cache, "s1", &view(), &playback, None).unwrap();
        let before_x = figure.data[0].x.clone();
        restyle_colormap(&mut figure, "Rainbow");
        assert_eq!(
            figure.data[0].marker.as_ref().unwrap().colorscale.as_deref(),
            Some("Rainbow")
        );
        assert_eq!(figure.data[0].x, before_x);
    }

    #[test]
    fn stepping_helpers_wrap_and_hold() {
        let cache = test_cache();
        buffered_session(&cache);

        assert_eq!(manual_step(&cache, "s1", 4, 1).unwrap(), 0);
        assert_eq!(manual_step(&cache, "s1", 0, -1).unwrap(), 4);
        assert_eq!(autoplay_step(&cache, "s1", 2).unwrap(), Some(3));

        invalidate_buffer(&cache, "s1").unwrap();
        assert_eq!(autoplay_step(&cache, "s1", 2).unwrap(), None);
    }
}
