//! Graph builder: compiles job settings into a filter graph.
//!
//! Stages are appended in a fixed order:
//!
//! 1. simple per-frame stages (speed, mirror, color grade, brightness)
//! 2. canvas composition (blurred background, source, fill, or fit)
//! 3. image overlays, in list order
//! 4. extras (subtitle bar, closing text)
//! 5. subtitle burn-in, always last

use clipforge_edit_model::{
    FitPolicy, GeometryTarget, JobSettings, MediaInfo, ScaleFactors, SubtitleStyle, TextStyle,
};

use crate::color::{brightness_filter, format_number, grade_filter};
use crate::escape::{ass_colour, escape_filter_path};
use crate::geometry::{resolve_canvas, Canvas, BLUR_WORK_WIDTH};
use crate::graph::{Filter, FilterGraph, GraphError, Pad};
use crate::overlay::apply_overlay;
use crate::text::{drawtext, TextWindow};

/// Build the video filter graph for one job.
///
/// `info` is the probe result for the source, or a default when probing
/// failed. Geometry never fails: unusable probe data degrades to the
/// fallback canvas.
pub fn build(settings: &JobSettings, info: &MediaInfo) -> Result<FilterGraph, GraphError> {
    let canvas = resolve_canvas(settings, info);
    let mut graph = FilterGraph::new();

    push_simple_stages(&mut graph, settings)?;

    if settings.blur.is_active() && settings.fit == FitPolicy::Fit {
        compose_blurred(&mut graph, settings, canvas)?;
    } else if settings.geometry == GeometryTarget::Source {
        compose_source(&mut graph, settings)?;
    } else if settings.fit == FitPolicy::Fill {
        compose_fill(&mut graph, settings, canvas)?;
    } else if settings.scale.is_override() {
        compose_fit_zoomed(&mut graph, settings, canvas)?;
    } else {
        compose_fit_padded(&mut graph, canvas)?;
    }

    for overlay in &settings.overlays {
        apply_overlay(&mut graph, overlay, canvas)?;
    }

    if settings.subtitle_bar.enabled && settings.subtitle_bar.height > 0 {
        let height = settings.subtitle_bar.height;
        graph.push(
            Filter::new("drawbox")
                .opt("x", 0)
                .opt("y", format!("ih-{height}"))
                .opt("w", "iw")
                .opt("h", height)
                .opt("color", "black@1.0")
                .opt("t", "fill"),
        )?;
    }

    if let Some(text) = settings.text.as_ref().filter(|t| t.is_active()) {
        if text.style == TextStyle::Overlay {
            let window = output_duration(settings, info)
                .map(|total| TextWindow::closing(total, text.duration_secs));
            if window.is_none() {
                tracing::warn!("Output duration unknown; closing text spans the whole video");
            }
            graph.push(drawtext(text, window))?;
        }
    }

    if let Some(path) = &settings.subtitle_file {
        graph.push(subtitles_filter(path, &settings.subtitle_style))?;
    }

    tracing::debug!(
        width = canvas.width,
        height = canvas.height,
        labeled = graph.is_labeled(),
        chains = graph.chains().len(),
        overlays = settings.overlays.len(),
        "Built filter graph"
    );
    Ok(graph)
}

/// Length of the rendered main video in seconds, after trim and speed.
pub fn output_duration(settings: &JobSettings, info: &MediaInfo) -> Option<f64> {
    let source = match settings.trim.duration_secs {
        Some(duration) => match info.known_duration() {
            Some(total) => duration.min((total - settings.trim.start_secs).max(0.0)),
            None => duration,
        },
        None => (info.known_duration()? - settings.trim.start_secs).max(0.0),
    };
    let speed = if settings.speed > 0.0 {
        settings.speed
    } else {
        1.0
    };
    let total = source / speed;
    (total > 0.0).then_some(total)
}

fn push_simple_stages(graph: &mut FilterGraph, settings: &JobSettings) -> Result<(), GraphError> {
    if settings.speed > 0.0 && (settings.speed - 1.0).abs() > 1e-6 {
        graph.push(Filter::new("setpts").arg(format!("PTS/{}", format_number(settings.speed))))?;
    }
    if settings.mirror {
        graph.push(Filter::new("hflip"))?;
    }
    if let Some(grade) = grade_filter(settings.color_grade) {
        graph.push(grade)?;
    }
    if let Some(brightness) = brightness_filter(settings.brightness) {
        graph.push(brightness)?;
    }
    Ok(())
}

/// User zoom as an even-preserving scale, when set.
fn user_scale(scale: ScaleFactors) -> Option<Filter> {
    scale.is_override().then(|| {
        Filter::new("scale")
            .arg(format!("trunc(iw*{}/2)*2", format_number(scale.width)))
            .arg(format!("trunc(ih*{}/2)*2", format_number(scale.height)))
    })
}

fn fit_scale(canvas: Canvas) -> Filter {
    Filter::new("scale")
        .arg(canvas.width)
        .arg(canvas.height)
        .opt("force_original_aspect_ratio", "decrease")
}

fn centered_overlay() -> Filter {
    Filter::new("overlay")
        .arg("(W-w)/2")
        .arg("(H-h)/2")
        .opt("shortest", 1)
}

fn setsar() -> Filter {
    Filter::new("setsar").arg(1)
}

fn yuv420p() -> Filter {
    Filter::new("format").arg("yuv420p")
}

/// Blurred background: the background branch is shrunk to a small working
/// frame, blurred there, and scaled back up; the foreground is fit inside
/// the canvas and centered on top.
fn compose_blurred(
    graph: &mut FilterGraph,
    settings: &JobSettings,
    canvas: Canvas,
) -> Result<(), GraphError> {
    graph.push(yuv420p())?;
    let branches = graph.split(&["bg", "fg"])?;
    let (bg, fg) = (branches[0].clone(), branches[1].clone());

    let work_h = canvas.blur_work_height();
    let radius = canvas.clamp_blur_radius(settings.blur.radius);
    let blurred = graph.add_chain(
        vec![bg.into()],
        vec![
            Filter::new("scale")
                .arg(BLUR_WORK_WIDTH)
                .arg(work_h)
                .opt("force_original_aspect_ratio", "increase"),
            Filter::new("crop").arg(BLUR_WORK_WIDTH).arg(work_h),
            Filter::new("boxblur").arg(radius).arg(2),
            Filter::new("scale")
                .arg(canvas.width)
                .arg(canvas.height)
                .opt("flags", "bilinear"),
            setsar(),
        ],
        "bgblur",
    );

    let mut fg_filters = vec![fit_scale(canvas)];
    fg_filters.extend(user_scale(settings.scale));
    fg_filters.push(setsar());
    let sized = graph.add_chain(vec![fg.into()], fg_filters, "fgsized");

    let main = graph.add_chain(
        vec![blurred.into(), sized.into()],
        vec![
            centered_overlay(),
            Filter::new("scale").arg(canvas.width).arg(canvas.height),
            setsar(),
        ],
        "main",
    );
    graph.set_head(main);
    Ok(())
}

fn compose_source(graph: &mut FilterGraph, settings: &JobSettings) -> Result<(), GraphError> {
    graph.push(
        Filter::new("scale")
            .arg("trunc(iw/2)*2")
            .arg("trunc(ih/2)*2"),
    )?;
    graph.push(setsar())?;
    if let Some(scale) = user_scale(settings.scale) {
        graph.push(scale)?;
    }
    graph.push(yuv420p())
}

fn compose_fill(
    graph: &mut FilterGraph,
    settings: &JobSettings,
    canvas: Canvas,
) -> Result<(), GraphError> {
    if let Some(scale) = user_scale(settings.scale) {
        graph.push(scale)?;
    }
    graph.push(
        Filter::new("scale")
            .arg(canvas.width)
            .arg(canvas.height)
            .opt("force_original_aspect_ratio", "increase"),
    )?;
    graph.push(Filter::new("crop").arg(canvas.width).arg(canvas.height))?;
    graph.push(setsar())?;
    graph.push(yuv420p())
}

fn compose_fit_padded(graph: &mut FilterGraph, canvas: Canvas) -> Result<(), GraphError> {
    graph.push(yuv420p())?;
    graph.push(fit_scale(canvas))?;
    graph.push(
        Filter::new("pad")
            .arg(canvas.width)
            .arg(canvas.height)
            .arg("(ow-iw)/2")
            .arg("(oh-ih)/2")
            .arg("black"),
    )?;
    graph.push(setsar())
}

/// Fit with zoom: a zoomed foreground may overflow the canvas, which
/// padding cannot express, so it is overlaid on a black canvas instead.
fn compose_fit_zoomed(
    graph: &mut FilterGraph,
    settings: &JobSettings,
    canvas: Canvas,
) -> Result<(), GraphError> {
    let background = graph.add_chain(
        vec![],
        vec![Filter::new("color")
            .opt("c", "black")
            .opt("s", canvas.size_arg())],
        "bg",
    );

    graph.push(yuv420p())?;
    graph.push(fit_scale(canvas))?;
    if let Some(scale) = user_scale(settings.scale) {
        graph.push(scale)?;
    }
    graph.push(setsar())?;
    let foreground = graph.take_head()?;

    let main = graph.add_chain(
        vec![background.into(), foreground],
        vec![centered_overlay(), setsar()],
        "main",
    );
    graph.set_head(main);
    Ok(())
}

fn subtitles_filter(path: &std::path::Path, style: &SubtitleStyle) -> Filter {
    let force_style = format!(
        "FontSize={},PrimaryColour={},OutlineColour=&H000000,Outline={},Bold=1,Alignment=2",
        style.font_size,
        ass_colour(&style.color),
        style.outline
    );
    Filter::new("subtitles")
        .opt("filename", format!("'{}'", escape_filter_path(path)))
        .opt("force_style", format!("'{force_style}'"))
}

/// Whether any stage reads from an extra input (used to decide `-map`).
pub fn reads_extra_inputs(graph: &FilterGraph) -> bool {
    graph
        .chains()
        .iter()
        .flat_map(|c| c.inputs.iter())
        .any(|pad| matches!(pad, Pad::Stream(i) if *i > 0))
}
