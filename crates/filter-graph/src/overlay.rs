//! Image overlay placement.

use clipforge_edit_model::{Anchor, OverlayPosition, OverlaySpec};

use crate::color::format_number;
use crate::geometry::{even_ceil, Canvas};
use crate::graph::{Filter, FilterGraph, GraphError, Pad};

/// Distance between an anchored overlay and the canvas edge, in pixels.
pub const OVERLAY_MARGIN: u32 = 20;

/// Horizontal and vertical placement of an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Start,
    Middle,
    End,
}

fn edges(anchor: Anchor) -> (Edge, Edge) {
    use Edge::*;
    match anchor {
        Anchor::TopLeft => (Start, Start),
        Anchor::TopCenter => (Middle, Start),
        Anchor::TopRight => (End, Start),
        Anchor::CenterLeft => (Start, Middle),
        Anchor::Center => (Middle, Middle),
        Anchor::CenterRight => (End, Middle),
        Anchor::BottomLeft => (Start, End),
        Anchor::BottomCenter => (Middle, End),
        Anchor::BottomRight => (End, End),
    }
}

fn edge_expr(edge: Edge, canvas: char, item: char) -> String {
    match edge {
        Edge::Start => OVERLAY_MARGIN.to_string(),
        Edge::Middle => format!("({canvas}-{item})/2"),
        Edge::End => format!("{canvas}-{item}-{OVERLAY_MARGIN}"),
    }
}

/// Overlay filter coordinates for a position, as `(x, y)` expressions.
pub fn position_exprs(position: OverlayPosition) -> (String, String) {
    match position {
        OverlayPosition::Anchor(anchor) => {
            let (h, v) = edges(anchor);
            (edge_expr(h, 'W', 'w'), edge_expr(v, 'H', 'h'))
        }
        OverlayPosition::Free { x, y } => (
            format!("W*{}", format_number(x.clamp(0.0, 1.0))),
            format!("H*{}", format_number(y.clamp(0.0, 1.0))),
        ),
    }
}

/// Overlay width in pixels: a fraction of the canvas width, even, at least 2.
pub fn overlay_width(canvas: Canvas, scale: f64) -> u32 {
    let raw = (canvas.width as f64 * scale.clamp(0.0, 1.0)).round() as u32;
    even_ceil(raw)
}

/// Composite one overlay on top of the head. The image is bound as a
/// looping extra input.
pub fn apply_overlay(
    graph: &mut FilterGraph,
    spec: &OverlaySpec,
    canvas: Canvas,
) -> Result<(), GraphError> {
    let index = graph.add_input(&spec.path, true);
    let sticker = graph.add_chain(
        vec![Pad::Stream(index)],
        vec![
            Filter::new("format").arg("yuva420p"),
            Filter::new("scale")
                .arg(overlay_width(canvas, spec.scale))
                .arg(-2),
        ],
        "stk",
    );

    let (x, y) = position_exprs(spec.position);
    let base = graph.take_head()?;
    let composed = graph.add_chain(
        vec![base, sticker.into()],
        vec![Filter::new("overlay")
            .arg(x)
            .arg(y)
            .opt("shortest", 1)],
        "ov",
    );
    graph.set_head(composed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_expressions() {
        assert_eq!(
            position_exprs(OverlayPosition::Anchor(Anchor::BottomRight)),
            ("W-w-20".to_string(), "H-h-20".to_string())
        );
        assert_eq!(
            position_exprs(OverlayPosition::Anchor(Anchor::TopCenter)),
            ("(W-w)/2".to_string(), "20".to_string())
        );
        assert_eq!(
            position_exprs(OverlayPosition::Anchor(Anchor::CenterLeft)),
            ("20".to_string(), "(H-h)/2".to_string())
        );
    }

    #[test]
    fn test_free_position_is_fraction_of_canvas() {
        assert_eq!(
            position_exprs(OverlayPosition::Free { x: 0.25, y: 1.5 }),
            ("W*0.25".to_string(), "H*1".to_string())
        );
    }

    #[test]
    fn test_overlay_width_is_even() {
        let canvas = Canvas::new(1080, 1920);
        assert_eq!(overlay_width(canvas, 0.2), 216);
        assert_eq!(overlay_width(canvas, 0.15), 162);
        assert_eq!(overlay_width(Canvas::new(1278, 720), 0.1), 128);
        assert_eq!(overlay_width(canvas, 0.0), 2);
    }

    #[test]
    fn test_apply_overlay_wires_extra_input() {
        let mut graph = FilterGraph::new();
        graph.push(Filter::new("hflip")).unwrap();
        let spec = OverlaySpec::anchored("/tmp/logo.png", Anchor::BottomRight, 0.2);
        apply_overlay(&mut graph, &spec, Canvas::new(1080, 1920)).unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.inputs.len(), 1);
        assert!(compiled.inputs[0].looped);
        assert!(compiled
            .text
            .contains("[1:v]format=yuva420p,scale=216:-2[stk1]"));
        assert!(compiled
            .text
            .contains("[v0][stk1]overlay=W-w-20:H-h-20:shortest=1[ov2]"));
        assert_eq!(compiled.map_arg(), "[ov2]");
    }
}
