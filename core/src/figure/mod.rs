pub mod assemble;
pub mod data;
pub mod layout;

pub use assemble::{
    assemble_overlay_frame, assemble_single_frame, frame_name, frame_subkey, opacity_ramp,
    prepare_render_params, RenderParams, ViewState,
};
pub use data::{attach_hover, hover_strings, ref_trace, scatter3d_traces, Marker, Trace};
pub use layout::{scatter3d_layout, Layout, TEMPLATE_DARK, TEMPLATE_LIGHT};

use serde::{Deserialize, Serialize};

/// One complete 3-D figure: reference/detection traces plus layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}
