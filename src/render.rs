use std::fmt::Write;

#[cfg(feature = "png")]
use anyhow::{Result, anyhow, bail};
#[cfg(feature = "png")]
use tiny_skia::{Pixmap, Transform as PixmapTransform};

use crate::canvas::{EdgeView, NodeView, Scene};
use crate::model::{Diagram, NodeType, Status};
use crate::utils::{LABEL_LINE_HEIGHT, escape_xml, label_lines, measure_label_box};

const EDGE_COLOR: &str = "#2d3748";
const SELECTION_COLOR: &str = "#3182ce";
const RUBBER_BAND_COLOR: &str = "#718096";

/// Static SVG of a scene. Coordinates stay in model space under a single group transform.
pub fn render_svg(scene: &Scene, background: &str) -> String {
    write_to_string(|svg| write_svg(svg, scene, background))
}

/// Runs a `fmt::Write` pass into a fresh `String`. Formatting into a `String` only fails when a
/// `Display` impl does, and every value written here formats infallibly.
fn write_to_string(pass: impl FnOnce(&mut String) -> std::fmt::Result) -> String {
    let mut out = String::new();
    let _ = pass(&mut out);
    out
}

fn write_svg(svg: &mut String, scene: &Scene, background: &str) -> std::fmt::Result {
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}" font-family="Inter, system-ui, sans-serif">
  <defs>
    <marker id="arrow-end" markerWidth="8" markerHeight="8" refX="6" refY="4" orient="auto" markerUnits="strokeWidth">
      <path d="M1,1 L6,4 L1,7 z" fill="context-stroke" />
    </marker>
  </defs>
  <rect width="100%" height="100%" fill="{}" />
  <g transform="{}">
"##,
        scene.viewport.width,
        scene.viewport.height,
        scene.viewport.width,
        scene.viewport.height,
        escape_xml(background),
        scene.transform.to_svg_attr()
    )?;

    for edge in &scene.edges {
        write_edge(svg, edge)?;
    }
    for node in &scene.nodes {
        write_node(svg, node)?;
    }

    if let Some((from, to)) = scene.rubber_band {
        writeln!(
            svg,
            "    <line class=\"rubber-band\" x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"2\" stroke-dasharray=\"6 4\" />",
            from.x, from.y, to.x, to.y, RUBBER_BAND_COLOR
        )?;
    }

    svg.push_str("  </g>\n</svg>\n");
    Ok(())
}

fn write_edge(svg: &mut String, edge: &EdgeView) -> std::fmt::Result {
    let stroke = if edge.selected {
        SELECTION_COLOR
    } else {
        EDGE_COLOR
    };
    let width = if edge.selected { 3 } else { 2 };
    let dash_attr = edge
        .line_style
        .dash_array()
        .map(|dash| format!(" stroke-dasharray=\"{dash}\""))
        .unwrap_or_default();

    writeln!(
        svg,
        "    <path id=\"{}\" class=\"connection {}\" d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\" marker-end=\"url(#arrow-end)\"{} />",
        escape_xml(&edge.id),
        edge.status.css_class(),
        edge.path.to_svg_data(),
        stroke,
        width,
        dash_attr
    )?;

    let lines = label_lines(&edge.label);
    if lines.is_empty() {
        return Ok(());
    }

    let anchor = edge.label_anchor;
    let (box_width, box_height) = measure_label_box(&lines);
    writeln!(
        svg,
        "    <g pointer-events=\"none\">\n      <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"6\" ry=\"6\" fill=\"white\" fill-opacity=\"0.96\" stroke=\"{}\" stroke-width=\"1\" />",
        anchor.x - box_width / 2.0,
        anchor.y - box_height / 2.0,
        box_width,
        box_height,
        stroke
    )?;
    write_text_lines(svg, &lines, anchor.x, anchor.y, EDGE_COLOR, 13)?;
    svg.push_str("    </g>\n");
    Ok(())
}

fn write_node(svg: &mut String, node: &NodeView) -> std::fmt::Result {
    let rect = node.bounds;
    let center = rect.center();
    let stroke = if node.selected {
        SELECTION_COLOR
    } else {
        node.stroke.as_str()
    };
    let width = if node.selected { 3 } else { 2 };

    writeln!(
        svg,
        "    <g id=\"{}\" class=\"node {} {}\">",
        escape_xml(&node.id),
        node.node_type.as_str(),
        node.status.css_class()
    )?;

    match node.node_type {
        NodeType::Start | NodeType::End => writeln!(
            svg,
            "      <ellipse cx=\"{:.1}\" cy=\"{:.1}\" rx=\"{:.1}\" ry=\"{:.1}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{}\" />",
            center.x,
            center.y,
            rect.half_width(),
            rect.half_height(),
            escape_xml(&node.fill),
            escape_xml(stroke),
            width
        )?,
        NodeType::Decision => writeln!(
            svg,
            "      <polygon points=\"{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} {:.1},{:.1}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{}\" />",
            center.x,
            rect.y,
            rect.right(),
            center.y,
            center.x,
            rect.bottom(),
            rect.x,
            center.y,
            escape_xml(&node.fill),
            escape_xml(stroke),
            width
        )?,
        NodeType::Process | NodeType::Connector => {
            let radius = if node.node_type == NodeType::Connector {
                rect.half_width().min(rect.half_height())
            } else {
                8.0
            };
            writeln!(
                svg,
                "      <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"{:.1}\" ry=\"{:.1}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{}\" />",
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                radius,
                radius,
                escape_xml(&node.fill),
                escape_xml(stroke),
                width
            )?
        }
    }

    let lines = label_lines(&node.text);
    write_text_lines(svg, &lines, center.x, center.y, &node.text_color, 14)?;
    svg.push_str("    </g>\n");
    Ok(())
}

fn write_text_lines(
    svg: &mut String,
    lines: &[String],
    x: f64,
    y: f64,
    color: &str,
    font_size: u32,
) -> std::fmt::Result {
    match lines {
        [] => Ok(()),
        [single] => writeln!(
            svg,
            "      <text x=\"{:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"{}\" text-anchor=\"middle\" dominant-baseline=\"middle\" xml:space=\"preserve\">{}</text>",
            x,
            y,
            escape_xml(color),
            font_size,
            escape_xml(single)
        ),
        many => {
            let start_y = y - LABEL_LINE_HEIGHT * (many.len() as f64 - 1.0) / 2.0;
            writeln!(
                svg,
                "      <text x=\"{:.1}\" fill=\"{}\" font-size=\"{}\" text-anchor=\"middle\" xml:space=\"preserve\">",
                x,
                escape_xml(color),
                font_size
            )?;
            for (idx, line) in many.iter().enumerate() {
                writeln!(
                    svg,
                    "        <tspan x=\"{:.1}\" y=\"{:.1}\" dominant-baseline=\"middle\">{}</tspan>",
                    x,
                    start_y + LABEL_LINE_HEIGHT * idx as f64,
                    escape_xml(line)
                )?;
            }
            svg.push_str("      </text>\n");
            Ok(())
        }
    }
}

#[cfg(feature = "png")]
pub fn render_png(svg: &str, scale: f32) -> Result<Vec<u8>> {
    if scale <= 0.0 {
        bail!("scale must be greater than zero when rendering PNG output");
    }

    let mut options = resvg::usvg::Options::default();
    options.font_family = "Inter".to_string();
    options.fontdb_mut().load_system_fonts();

    let tree = resvg::usvg::Tree::from_str(svg, &options)
        .map_err(|err| anyhow!("failed to parse generated SVG for PNG export: {err}"))?;

    let size = tree.size().to_int_size();
    let scaled_width = (size.width() as f32 * scale).ceil();
    let scaled_height = (size.height() as f32 * scale).ceil();

    if !scaled_width.is_finite() || !scaled_height.is_finite() {
        bail!("scaled dimensions are not finite; try a smaller scale factor");
    }
    if scaled_width < 1.0 || scaled_height < 1.0 {
        bail!("scaled dimensions collapsed below 1px; try a larger scale factor");
    }
    if scaled_width > u32::MAX as f32 || scaled_height > u32::MAX as f32 {
        bail!("scaled dimensions exceed supported limits; try a smaller scale factor");
    }

    let (width, height) = (scaled_width as u32, scaled_height as u32);
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("failed to allocate {width}x{height} surface for PNG export"))?;

    resvg::render(
        &tree,
        PixmapTransform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    pixmap
        .encode_png()
        .map_err(|err| anyhow!("failed to encode PNG output: {err}"))
}

/// Plain-text outline of every section, for terminals and diffs.
pub fn render_text(diagram: &Diagram) -> String {
    write_to_string(|out| write_outline(out, diagram))
}

fn write_outline(out: &mut String, diagram: &Diagram) -> std::fmt::Result {
    writeln!(out, "# {}", diagram.title)?;
    if !diagram.description.trim().is_empty() {
        writeln!(out, "\n{}", diagram.description.trim())?;
    }
    if !diagram.general_notes.trim().is_empty() {
        writeln!(out, "\nNotes: {}", diagram.general_notes.trim())?;
    }

    for flowchart in &diagram.flowcharts {
        let heading = if flowchart.title.trim().is_empty() {
            flowchart.id.as_str()
        } else {
            flowchart.title.as_str()
        };
        writeln!(out, "\n## {heading}")?;

        writeln!(out, "\nNodes ({}):", flowchart.nodes.len())?;
        for node in &flowchart.nodes {
            write!(
                out,
                "- {} [{}] {}",
                node.id,
                node.node_type.as_str(),
                single_line(&node.text)
            )?;
            if node.metadata.status != Status::Pending {
                write!(out, " ({})", node.metadata.status.as_str())?;
            }
            if !node.metadata.note.trim().is_empty() {
                write!(out, " -- {}", single_line(&node.metadata.note))?;
            }
            out.push('\n');
        }

        writeln!(out, "\nConnections ({}):", flowchart.connections.len())?;
        for connection in &flowchart.connections {
            write!(out, "- {}: {} -> {}", connection.id, connection.from, connection.to)?;
            if !connection.label.trim().is_empty() {
                write!(out, " \"{}\"", single_line(&connection.label))?;
            }
            if connection.metadata.status != Status::Pending {
                write!(out, " ({})", connection.metadata.status.as_str())?;
            }
            out.push('\n');
        }

        if !flowchart.questions.is_empty() {
            writeln!(out, "\nQuestions ({}):", flowchart.questions.len())?;
            for question in &flowchart.questions {
                let category = if question.category.trim().is_empty() {
                    String::new()
                } else {
                    format!("[{}] ", question.category.trim())
                };
                writeln!(out, "- {category}{}", single_line(&question.text))?;
                if !question.answer.trim().is_empty() {
                    writeln!(out, "  > {}", single_line(&question.answer))?;
                }
            }
        }
    }
    Ok(())
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
