use serde::{Deserialize, Serialize};

use super::assemble::RenderParams;

pub const TEMPLATE_LIGHT: &str = "plotly";
pub const TEMPLATE_DARK: &str = "plotly_dark";

const UIREVISION: &str = "no_change";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub range: (f64, f64),
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub autorange: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AspectRatio {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub zaxis: Axis,
    pub aspectmode: String,
    pub aspectratio: AspectRatio,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub l: f64,
    pub r: f64,
    pub b: f64,
    pub t: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub x: f64,
    pub y: f64,
}

/// Background image decoration anchored to the top-left plot corner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutImage {
    pub source: String,
    pub xref: String,
    pub yref: String,
    pub x: f64,
    pub y: f64,
    pub xanchor: String,
    pub yanchor: String,
    pub sizex: f64,
    pub sizey: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub template: String,
    pub scene: Scene,
    pub margin: Margin,
    pub legend: Legend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<LayoutImage>>,
    pub uirevision: String,
}

/// Builds the 3-D layout: axis ranges come straight from the active
/// numeric filter ranges, and the aspect ratio scales each axis by its
/// span over the smallest span so one unit renders equally on all axes.
pub fn scatter3d_layout(params: &RenderParams) -> Layout {
    let x_span = params.x_range.1 - params.x_range.0;
    let y_span = params.y_range.1 - params.y_range.0;
    let z_span = params.z_range.1 - params.z_range.0;
    let scale = x_span.min(y_span).min(z_span);
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let images = params.image.as_ref().map(|source| {
        vec![LayoutImage {
            source: source.clone(),
            xref: "x domain".into(),
            yref: "y domain".into(),
            x: 0.0,
            y: 1.0,
            xanchor: "left".into(),
            yanchor: "top".into(),
            sizex: 0.3,
            sizey: 0.3,
        }]
    });

    Layout {
        title: params.title.clone(),
        template: params.template.clone(),
        scene: Scene {
            xaxis: Axis {
                range: params.x_range,
                title: params.x_label.clone(),
                autorange: false,
            },
            yaxis: Axis {
                range: params.y_range,
                title: params.y_label.clone(),
                autorange: false,
            },
            zaxis: Axis {
                range: params.z_range,
                title: params.z_label.clone(),
                autorange: false,
            },
            aspectmode: "manual".into(),
            aspectratio: AspectRatio {
                x: x_span / scale,
                y: y_span / scale,
                z: z_span / scale,
            },
        },
        margin: Margin {
            l: 0.0,
            r: 0.0,
            b: 0.0,
            t: 40.0,
        },
        legend: Legend { x: 0.0, y: 0.0 },
        images,
        uirevision: UIREVISION.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RenderParams {
        RenderParams {
            x_range: (-40.0, 40.0),
            y_range: (0.0, 100.0),
            z_range: (-20.0, 20.0),
            template: TEMPLATE_LIGHT.into(),
            ..RenderParams::default()
        }
    }

    #[test]
    fn aspect_ratio_scales_by_smallest_span() {
        let layout = scatter3d_layout(&params());
        assert_eq!(layout.scene.aspectratio.x, 2.0);
        assert_eq!(layout.scene.aspectratio.y, 2.5);
        assert_eq!(layout.scene.aspectratio.z, 1.0);
        assert!(!layout.scene.xaxis.autorange);
    }

    #[test]
    fn image_decoration_is_optional() {
        let mut with_image = params();
        with_image.image = Some("data:image/jpeg;base64,abcd".into());
        assert!(scatter3d_layout(&params()).images.is_none());
        let decorated = scatter3d_layout(&with_image).images.unwrap();
        assert_eq!(decorated[0].xanchor, "left");
        assert_eq!(decorated[0].sizex, 0.3);
    }

    #[test]
    fn zero_span_does_not_poison_aspect() {
        let mut degenerate = params();
        degenerate.z_range = (5.0, 5.0);
        let layout = scatter3d_layout(&degenerate);
        assert_eq!(layout.scene.aspectratio.z, 0.0);
        assert!(layout.scene.aspectratio.x.is_finite());
    }
}
