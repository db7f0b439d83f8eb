//! SVG backend
//!
//! Serializes chart geometry as a standalone SVG document. Coordinates
//! are written with one decimal place so regenerated charts diff cleanly.

use std::fmt::Write as _;

use super::{Anchor, ChartGeometry, Primitive};

/// Serialize a laid-out chart as SVG markup
#[must_use]
pub fn render(geometry: &ChartGeometry) -> String {
    let mut svg = String::with_capacity(geometry.primitives.len() * 96 + 256);
    svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" \
         viewBox=\"0 0 {w} {h}\" font-family=\"Helvetica, Arial, sans-serif\">",
        w = geometry.width,
        h = geometry.height
    );
    for primitive in &geometry.primitives {
        element(&mut svg, primitive);
    }
    svg.push_str("</svg>\n");
    svg
}

fn element(svg: &mut String, primitive: &Primitive) {
    match primitive {
        Primitive::Rect {
            x,
            y,
            width,
            height,
            fill,
            stroke,
        } => {
            let _ = write!(
                svg,
                "  <rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{width:.1}\" \
                 height=\"{height:.1}\" fill=\"{}\"",
                fill.hex()
            );
            if let Some(stroke) = stroke {
                let _ = write!(svg, " stroke=\"{}\"", stroke.hex());
            }
            svg.push_str(" />\n");
        }
        Primitive::Line {
            x1,
            y1,
            x2,
            y2,
            color,
            width,
            dashed,
        } => {
            let _ = write!(
                svg,
                "  <line x1=\"{x1:.1}\" y1=\"{y1:.1}\" x2=\"{x2:.1}\" y2=\"{y2:.1}\" \
                 stroke=\"{}\" stroke-width=\"{width}\"",
                color.hex()
            );
            if *dashed {
                svg.push_str(" stroke-dasharray=\"6 4\"");
            }
            svg.push_str(" />\n");
        }
        Primitive::Polyline {
            points,
            color,
            width,
        } => {
            svg.push_str("  <polyline points=\"");
            for (idx, (x, y)) in points.iter().enumerate() {
                if idx > 0 {
                    svg.push(' ');
                }
                let _ = write!(svg, "{x:.1},{y:.1}");
            }
            let _ = writeln!(
                svg,
                "\" fill=\"none\" stroke=\"{}\" stroke-width=\"{width}\" \
                 stroke-linejoin=\"round\" />",
                color.hex()
            );
        }
        Primitive::Circle { cx, cy, r, fill } => {
            let _ = writeln!(
                svg,
                "  <circle cx=\"{cx:.1}\" cy=\"{cy:.1}\" r=\"{r:.1}\" fill=\"{}\" />",
                fill.hex()
            );
        }
        Primitive::Square { cx, cy, r, fill } => {
            let _ = writeln!(
                svg,
                "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\" />",
                cx - r,
                cy - r,
                2.0 * r,
                2.0 * r,
                fill.hex()
            );
        }
        Primitive::Cross {
            cx,
            cy,
            r,
            color,
            width,
        } => {
            let _ = writeln!(
                svg,
                "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" \
                 stroke=\"{}\" stroke-width=\"{width}\" />",
                cx - r,
                cy - r,
                cx + r,
                cy + r,
                color.hex()
            );
            let _ = writeln!(
                svg,
                "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" \
                 stroke=\"{}\" stroke-width=\"{width}\" />",
                cx - r,
                cy + r,
                cx + r,
                cy - r,
                color.hex()
            );
        }
        Primitive::Text {
            x,
            y,
            content,
            color,
            size,
            anchor,
            bold,
        } => {
            let _ = write!(
                svg,
                "  <text x=\"{x:.1}\" y=\"{y:.1}\" fill=\"{}\" font-size=\"{size}\" \
                 text-anchor=\"{}\"",
                color.hex(),
                anchor_attr(*anchor)
            );
            if *bold {
                svg.push_str(" font-weight=\"bold\"");
            }
            let _ = writeln!(svg, ">{}</text>", escape(content));
        }
    }
}

fn anchor_attr(anchor: Anchor) -> &'static str {
    match anchor {
        Anchor::Start => "start",
        Anchor::Middle => "middle",
        Anchor::End => "end",
    }
}

/// Escape text content for XML
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::Rgb;

    fn geometry(primitives: Vec<Primitive>) -> ChartGeometry {
        ChartGeometry {
            width: 100,
            height: 80,
            primitives,
        }
    }

    #[test]
    fn test_document_frame() {
        let out = render(&geometry(vec![]));
        assert!(out.starts_with("<?xml version=\"1.0\""));
        assert!(out.contains("width=\"100\" height=\"80\""));
        assert!(out.contains("viewBox=\"0 0 100 80\""));
        assert!(out.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_dashed_line_attribute() {
        let dashed = render(&geometry(vec![Primitive::Line {
            x1: 0.0,
            y1: 1.0,
            x2: 2.0,
            y2: 3.0,
            color: Rgb(0x2c, 0xa0, 0x2c),
            width: 1.5,
            dashed: true,
        }]));
        assert!(dashed.contains("stroke-dasharray=\"6 4\""));
        assert!(dashed.contains("stroke=\"#2ca02c\""));

        let solid = render(&geometry(vec![Primitive::Line {
            x1: 0.0,
            y1: 1.0,
            x2: 2.0,
            y2: 3.0,
            color: Rgb(0, 0, 0),
            width: 1.5,
            dashed: false,
        }]));
        assert!(!solid.contains("stroke-dasharray"));
    }

    #[test]
    fn test_polyline_points() {
        let out = render(&geometry(vec![Primitive::Polyline {
            points: vec![(1.0, 2.0), (3.25, 4.0), (5.0, 6.0)],
            color: Rgb(0x02, 0x3e, 0xff),
            width: 2.5,
        }]));
        assert!(out.contains("points=\"1.0,2.0 3.2,4.0 5.0,6.0\""));
        assert!(out.contains("fill=\"none\""));
    }

    #[test]
    fn test_square_and_cross_markers() {
        let out = render(&geometry(vec![
            Primitive::Square {
                cx: 10.0,
                cy: 10.0,
                r: 4.0,
                fill: Rgb(1, 2, 3),
            },
            Primitive::Cross {
                cx: 10.0,
                cy: 10.0,
                r: 5.0,
                color: Rgb(0xd6, 0x27, 0x28),
                width: 2.5,
            },
        ]));
        assert!(out.contains("<rect x=\"6.0\" y=\"6.0\" width=\"8.0\" height=\"8.0\""));
        assert_eq!(out.matches("<line ").count(), 2);
        assert!(out.contains("x1=\"5.0\" y1=\"5.0\" x2=\"15.0\" y2=\"15.0\""));
    }

    #[test]
    fn test_text_anchor_and_weight() {
        let out = render(&geometry(vec![Primitive::Text {
            x: 50.0,
            y: 28.0,
            content: "Tokens per Second".to_string(),
            color: Rgb(0x20, 0x20, 0x20),
            size: 18,
            anchor: Anchor::Middle,
            bold: true,
        }]));
        assert!(out.contains("text-anchor=\"middle\""));
        assert!(out.contains("font-weight=\"bold\""));
        assert!(out.contains(">Tokens per Second</text>"));
    }

    #[test]
    fn test_model_names_are_escaped() {
        let out = render(&geometry(vec![Primitive::Text {
            x: 0.0,
            y: 0.0,
            content: "a<b&c".to_string(),
            color: Rgb(0, 0, 0),
            size: 11,
            anchor: Anchor::Start,
            bold: false,
        }]));
        assert!(out.contains(">a&lt;b&amp;c</text>"));
    }
}
