//! Comparative chart generation
//!
//! Consumes [`AggregatedMetric`]s and renders three charts plus a
//! Markdown summary:
//!
//! - `performance` — tokens/sec vs context size, one line per model
//! - `memory` — resident memory vs context size, one line per model
//! - `benchmark` — combined view: throughput panel above a GPU% panel
//!
//! Axes are discovered from the data, never hardcoded: contexts present
//! go on the X axis at log2 positions labeled `{N}K`, and the Y range is
//! fitted to the values with headroom. Error bars appear only where a
//! key pooled two or more samples. A key that fell back to CPU-only
//! execution (`gpu_percent == 0`) is drawn with an X-shaped marker
//! instead of the series marker.
//!
//! One geometry builder produces positioned primitives; the [`svg`]
//! backend writes markup and the [`png`] backend rasterizes onto an RGB
//! [`canvas`] — the format switch changes encoding, never data.

pub mod canvas;
pub mod png;
pub mod svg;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{MedirError, Result};
use crate::stats::{contexts_present, AggregatedMetric};

// ============================================================================
// Colors
// ============================================================================

/// 24-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// CSS hex form, e.g. `#1ac938`
    #[must_use]
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Series colors, assigned to models in sorted-name order so a model
/// keeps its color across all charts
pub const PALETTE: [Rgb; 8] = [
    Rgb(0x02, 0x3e, 0xff),
    Rgb(0xff, 0x7c, 0x00),
    Rgb(0x1a, 0xc9, 0x38),
    Rgb(0x8b, 0x2b, 0xe2),
    Rgb(0x9f, 0x48, 0x00),
    Rgb(0xf1, 0x4c, 0xc1),
    Rgb(0xff, 0xc4, 0x00),
    Rgb(0x00, 0xd7, 0xff),
];

/// CPU-only fallback marker color
pub const CPU_FALLBACK: Rgb = Rgb(0xd6, 0x27, 0x28);

const BACKGROUND: Rgb = Rgb(0xff, 0xff, 0xff);
const GRID: Rgb = Rgb(0xe0, 0xe0, 0xe0);
const AXIS: Rgb = Rgb(0x40, 0x40, 0x40);
const TEXT: Rgb = Rgb(0x20, 0x20, 0x20);
const MUTED: Rgb = Rgb(0x70, 0x70, 0x70);
const FULL_GPU_LINE: Rgb = Rgb(0x2c, 0xa0, 0x2c);

// ============================================================================
// Geometry model
// ============================================================================

/// Horizontal anchoring of a text run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `x` is the left edge
    Start,
    /// `x` is the center
    Middle,
    /// `x` is the right edge
    End,
}

/// One positioned drawing primitive, in pixel coordinates with the
/// origin at the top-left
#[derive(Debug, Clone)]
pub enum Primitive {
    /// Filled axis-aligned rectangle, optionally outlined
    Rect {
        /// Left edge
        x: f64,
        /// Top edge
        y: f64,
        /// Width in pixels
        width: f64,
        /// Height in pixels
        height: f64,
        /// Fill color
        fill: Rgb,
        /// Outline color, if any
        stroke: Option<Rgb>,
    },
    /// Straight stroked segment
    Line {
        /// Start x
        x1: f64,
        /// Start y
        y1: f64,
        /// End x
        x2: f64,
        /// End y
        y2: f64,
        /// Stroke color
        color: Rgb,
        /// Stroke width in pixels
        width: f64,
        /// Dashed stroke (reference lines)
        dashed: bool,
    },
    /// Connected data line
    Polyline {
        /// Vertices in draw order
        points: Vec<(f64, f64)>,
        /// Stroke color
        color: Rgb,
        /// Stroke width in pixels
        width: f64,
    },
    /// Filled circular marker
    Circle {
        /// Center x
        cx: f64,
        /// Center y
        cy: f64,
        /// Radius
        r: f64,
        /// Fill color
        fill: Rgb,
    },
    /// Filled square marker
    Square {
        /// Center x
        cx: f64,
        /// Center y
        cy: f64,
        /// Half side length
        r: f64,
        /// Fill color
        fill: Rgb,
    },
    /// X-shaped marker; flags the CPU-only fallback state
    Cross {
        /// Center x
        cx: f64,
        /// Center y
        cy: f64,
        /// Arm half-length
        r: f64,
        /// Stroke color
        color: Rgb,
        /// Stroke width in pixels
        width: f64,
    },
    /// Text run with a baseline at `y`
    Text {
        /// Anchor x
        x: f64,
        /// Baseline y
        y: f64,
        /// Characters to draw
        content: String,
        /// Fill color
        color: Rgb,
        /// Nominal glyph height in pixels
        size: u32,
        /// Horizontal anchoring
        anchor: Anchor,
        /// Heavier stroke (titles)
        bold: bool,
    },
}

/// A fully laid-out chart, ready for either backend
#[derive(Debug, Clone)]
pub struct ChartGeometry {
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    /// Primitives in paint order
    pub primitives: Vec<Primitive>,
}

// ============================================================================
// Output format
// ============================================================================

/// Chart encoding; selects a backend, never a data set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFormat {
    /// Raster output
    Png,
    /// Vector markup output
    Svg,
}

impl ChartFormat {
    /// Parse a format name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming `format` for anything other
    /// than `png` or `svg`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            other => Err(MedirError::InvalidConfiguration {
                key: "format".to_string(),
                reason: format!("unknown chart format '{other}' (expected png or svg)"),
            }),
        }
    }

    /// File extension for this format
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

// ============================================================================
// Scales
// ============================================================================

/// Context sizes mapped onto a log2 X axis
#[derive(Debug, Clone)]
struct XScale {
    min_log: f64,
    max_log: f64,
}

impl XScale {
    fn new(contexts: &[u32]) -> Self {
        let min = f64::from(contexts.first().copied().unwrap_or(1024)).log2();
        let max = f64::from(contexts.last().copied().unwrap_or(1024)).log2();
        if (max - min).abs() < f64::EPSILON {
            // Single context: park it mid-axis.
            Self {
                min_log: min - 1.0,
                max_log: max + 1.0,
            }
        } else {
            Self {
                min_log: min,
                max_log: max,
            }
        }
    }

    /// Fractional position of a context on the axis, 0 at the left edge
    fn position(&self, context: u32) -> f64 {
        (f64::from(context).log2() - self.min_log) / (self.max_log - self.min_log)
    }
}

/// Round a positive value up to 1, 2, or 5 times a power of ten
fn nice_ceil(value: f64) -> f64 {
    if value <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(value.log10().floor());
    let mantissa = value / magnitude;
    let nice = if mantissa <= 1.0 {
        1.0
    } else if mantissa <= 2.0 {
        2.0
    } else if mantissa <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Tick label with a sensible precision for the step size
fn tick_label(value: f64, step: f64) -> String {
    if step >= 1.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

/// X tick label: `{N}K`
fn context_label(context: u32) -> String {
    format!("{}K", context / 1024)
}

// ============================================================================
// Series extraction
// ============================================================================

/// One data point of one model's line
#[derive(Debug, Clone)]
struct SeriesPoint {
    context: u32,
    mean: f64,
    std_dev: f64,
    count: usize,
    cpu_only: bool,
}

/// One model's line across the contexts it has data for
#[derive(Debug, Clone)]
struct Series {
    model: String,
    color: Rgb,
    points: Vec<SeriesPoint>,
}

/// Error bars are drawn only for keys that pooled at least two samples
/// with nonzero spread
fn wants_error_bars(count: usize, std_dev: f64) -> bool {
    count >= 2 && std_dev > 0.0
}

/// Legend label: the trailing default tag carries no information
fn legend_label(model: &str) -> &str {
    model.strip_suffix(":latest").unwrap_or(model)
}

fn build_series<F>(metrics: &[AggregatedMetric], value_of: F) -> Vec<Series>
where
    F: Fn(&AggregatedMetric) -> Option<(f64, f64, usize)>,
{
    let mut models: Vec<String> = metrics.iter().map(|m| m.model.clone()).collect();
    models.sort();
    models.dedup();

    models
        .iter()
        .enumerate()
        .map(|(idx, model)| {
            let mut points: Vec<SeriesPoint> = metrics
                .iter()
                .filter(|m| &m.model == model)
                .filter_map(|m| {
                    value_of(m).map(|(mean, std_dev, count)| SeriesPoint {
                        context: m.context,
                        mean,
                        std_dev,
                        count,
                        cpu_only: m.is_cpu_only(),
                    })
                })
                .collect();
            points.sort_by_key(|p| p.context);
            Series {
                model: model.clone(),
                color: PALETTE[idx % PALETTE.len()],
                points,
            }
        })
        .collect()
}

fn tps_series(metrics: &[AggregatedMetric]) -> Vec<Series> {
    build_series(metrics, |m| {
        Some((
            m.tokens_per_second.mean,
            m.tokens_per_second.std_dev,
            m.tokens_per_second.count,
        ))
    })
}

fn memory_series(metrics: &[AggregatedMetric]) -> Vec<Series> {
    build_series(metrics, |m| {
        m.memory_gb
            .as_ref()
            .map(|s| (s.mean, s.std_dev, s.count))
    })
}

fn gpu_series(metrics: &[AggregatedMetric]) -> Vec<Series> {
    // Placement shares carry no error bars; one pooled value per key.
    build_series(metrics, |m| m.gpu_percent.map(|g| (g, 0.0, 1)))
}

// ============================================================================
// Panel layout
// ============================================================================

const CHART_WIDTH: u32 = 960;
const CHART_HEIGHT: u32 = 600;
const COMBINED_HEIGHT: u32 = 840;

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 40.0;

const TITLE_SIZE: u32 = 18;
const LABEL_SIZE: u32 = 12;
const TICK_SIZE: u32 = 11;

const MARKER_RADIUS: f64 = 4.5;
const CROSS_RADIUS: f64 = 6.5;
const ERROR_CAP: f64 = 4.0;

/// Pixel rectangle a panel plots into
#[derive(Debug, Clone, Copy)]
struct PlotArea {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl PlotArea {
    fn x_at(&self, t: f64) -> f64 {
        self.left + t * (self.right - self.left)
    }

    /// `t` is the 0..1 value fraction; 0 sits on the bottom edge
    fn y_at(&self, t: f64) -> f64 {
        self.bottom - t * (self.bottom - self.top)
    }
}

/// Per-panel knobs; the geometry emitters share everything else
struct PanelSpec<'s> {
    series: &'s [Series],
    contexts: &'s [u32],
    y_label: String,
    y_max: f64,
    /// Draw `{N}K` labels under the axis
    x_labels: bool,
    /// Squares instead of circles for series markers
    square_markers: bool,
    /// Horizontal reference lines: (value, color, right-aligned note)
    reference_lines: Vec<(f64, Rgb, Option<String>)>,
    /// Vertical offset step stacked onto full-GPU values so overlapping
    /// 100% lines stay distinguishable
    full_scale_offset: f64,
}

/// Largest value a panel must accommodate, error bars included
fn panel_max(series: &[Series]) -> f64 {
    series
        .iter()
        .flat_map(|s| s.points.iter())
        .map(|p| p.mean + p.std_dev)
        .fold(0.0, f64::max)
}

fn emit_panel(primitives: &mut Vec<Primitive>, area: PlotArea, spec: &PanelSpec<'_>) {
    let xscale = XScale::new(spec.contexts);
    let y_fraction = |value: f64| (value / spec.y_max).clamp(0.0, 1.05);

    // Gridlines and Y ticks.
    let step = nice_ceil(spec.y_max / 5.0);
    let mut tick = 0.0;
    while tick <= spec.y_max + step * 0.01 {
        let y = area.y_at(y_fraction(tick));
        if tick > 0.0 {
            primitives.push(Primitive::Line {
                x1: area.left,
                y1: y,
                x2: area.right,
                y2: y,
                color: GRID,
                width: 1.0,
                dashed: false,
            });
        }
        primitives.push(Primitive::Text {
            x: area.left - 8.0,
            y: y + 4.0,
            content: tick_label(tick, step),
            color: TEXT,
            size: TICK_SIZE,
            anchor: Anchor::End,
            bold: false,
        });
        tick += step;
    }

    // X ticks at each context present.
    for &context in spec.contexts {
        let x = area.x_at(xscale.position(context));
        primitives.push(Primitive::Line {
            x1: x,
            y1: area.bottom,
            x2: x,
            y2: area.bottom + 5.0,
            color: AXIS,
            width: 1.0,
            dashed: false,
        });
        if spec.x_labels {
            primitives.push(Primitive::Text {
                x,
                y: area.bottom + 20.0,
                content: context_label(context),
                color: TEXT,
                size: TICK_SIZE,
                anchor: Anchor::Middle,
                bold: false,
            });
        }
    }

    // Reference lines under the data.
    for (value, color, note) in &spec.reference_lines {
        let y = area.y_at(y_fraction(*value));
        primitives.push(Primitive::Line {
            x1: area.left,
            y1: y,
            x2: area.right,
            y2: y,
            color: *color,
            width: 1.5,
            dashed: true,
        });
        if let Some(note) = note {
            primitives.push(Primitive::Text {
                x: area.right - 6.0,
                y: y - 6.0,
                content: note.clone(),
                color: MUTED,
                size: TICK_SIZE,
                anchor: Anchor::End,
                bold: false,
            });
        }
    }

    // Axis frame.
    primitives.push(Primitive::Line {
        x1: area.left,
        y1: area.top,
        x2: area.left,
        y2: area.bottom,
        color: AXIS,
        width: 1.5,
        dashed: false,
    });
    primitives.push(Primitive::Line {
        x1: area.left,
        y1: area.bottom,
        x2: area.right,
        y2: area.bottom,
        color: AXIS,
        width: 1.5,
        dashed: false,
    });

    // Y label above the axis, horizontal.
    primitives.push(Primitive::Text {
        x: area.left,
        y: area.top - 10.0,
        content: spec.y_label.clone(),
        color: TEXT,
        size: LABEL_SIZE,
        anchor: Anchor::Start,
        bold: true,
    });

    // Data lines, markers, error bars.
    for (series_idx, series) in spec.series.iter().enumerate() {
        let value_of = |p: &SeriesPoint| {
            // Stack full-scale values slightly so coincident lines at the
            // top of the range stay tellable apart.
            if spec.full_scale_offset > 0.0 && (p.mean - 100.0).abs() < f64::EPSILON {
                100.0 + series_idx as f64 * spec.full_scale_offset
            } else {
                p.mean
            }
        };

        let points: Vec<(f64, f64)> = series
            .points
            .iter()
            .map(|p| {
                (
                    area.x_at(xscale.position(p.context)),
                    area.y_at(y_fraction(value_of(p))),
                )
            })
            .collect();

        if points.len() > 1 {
            primitives.push(Primitive::Polyline {
                points: points.clone(),
                color: series.color,
                width: 2.5,
            });
        }

        for (p, &(x, y)) in series.points.iter().zip(&points) {
            if wants_error_bars(p.count, p.std_dev) {
                let y_lo = area.y_at(y_fraction(p.mean - p.std_dev));
                let y_hi = area.y_at(y_fraction(p.mean + p.std_dev));
                primitives.push(Primitive::Line {
                    x1: x,
                    y1: y_lo,
                    x2: x,
                    y2: y_hi,
                    color: series.color,
                    width: 1.5,
                    dashed: false,
                });
                for y_cap in [y_lo, y_hi] {
                    primitives.push(Primitive::Line {
                        x1: x - ERROR_CAP,
                        y1: y_cap,
                        x2: x + ERROR_CAP,
                        y2: y_cap,
                        color: series.color,
                        width: 1.5,
                        dashed: false,
                    });
                }
            }

            if spec.square_markers {
                primitives.push(Primitive::Square {
                    cx: x,
                    cy: y,
                    r: MARKER_RADIUS,
                    fill: series.color,
                });
            } else {
                primitives.push(Primitive::Circle {
                    cx: x,
                    cy: y,
                    r: MARKER_RADIUS,
                    fill: series.color,
                });
            }
            if p.cpu_only {
                primitives.push(Primitive::Cross {
                    cx: x,
                    cy: y,
                    r: CROSS_RADIUS,
                    color: CPU_FALLBACK,
                    width: 2.5,
                });
            }
        }
    }
}

/// Legend block in the panel's top-right corner
fn emit_legend(primitives: &mut Vec<Primitive>, area: PlotArea, series: &[Series]) {
    let any_cpu_only = series
        .iter()
        .any(|s| s.points.iter().any(|p| p.cpu_only));
    let rows = series.len() + usize::from(any_cpu_only);
    if rows == 0 {
        return;
    }

    let longest = series
        .iter()
        .map(|s| legend_label(&s.model).len())
        .max()
        .unwrap_or(0)
        .max(if any_cpu_only { 17 } else { 0 });
    let row_height = 18.0;
    let box_width = 46.0 + longest as f64 * 7.0;
    let box_height = rows as f64 * row_height + 10.0;
    let x0 = area.right - box_width - 8.0;
    let y0 = area.top + 8.0;

    primitives.push(Primitive::Rect {
        x: x0,
        y: y0,
        width: box_width,
        height: box_height,
        fill: BACKGROUND,
        stroke: Some(GRID),
    });

    for (idx, s) in series.iter().enumerate() {
        let y = y0 + 14.0 + idx as f64 * row_height;
        primitives.push(Primitive::Line {
            x1: x0 + 8.0,
            y1: y,
            x2: x0 + 30.0,
            y2: y,
            color: s.color,
            width: 2.5,
            dashed: false,
        });
        primitives.push(Primitive::Circle {
            cx: x0 + 19.0,
            cy: y,
            r: 3.5,
            fill: s.color,
        });
        primitives.push(Primitive::Text {
            x: x0 + 38.0,
            y: y + 4.0,
            content: legend_label(&s.model).to_string(),
            color: TEXT,
            size: LABEL_SIZE,
            anchor: Anchor::Start,
            bold: false,
        });
    }

    if any_cpu_only {
        let y = y0 + 14.0 + series.len() as f64 * row_height;
        primitives.push(Primitive::Cross {
            cx: x0 + 19.0,
            cy: y,
            r: 5.0,
            color: CPU_FALLBACK,
            width: 2.0,
        });
        primitives.push(Primitive::Text {
            x: x0 + 38.0,
            y: y + 4.0,
            content: "CPU-only fallback".to_string(),
            color: TEXT,
            size: LABEL_SIZE,
            anchor: Anchor::Start,
            bold: false,
        });
    }
}

fn emit_title(
    primitives: &mut Vec<Primitive>,
    width: u32,
    title: &str,
    run_count: usize,
) {
    primitives.push(Primitive::Text {
        x: f64::from(width) / 2.0,
        y: 28.0,
        content: title.to_string(),
        color: TEXT,
        size: TITLE_SIZE,
        anchor: Anchor::Middle,
        bold: true,
    });
    if run_count > 1 {
        primitives.push(Primitive::Text {
            x: f64::from(width) / 2.0,
            y: 46.0,
            content: format!("pooled across {run_count} runs"),
            color: MUTED,
            size: LABEL_SIZE,
            anchor: Anchor::Middle,
            bold: false,
        });
    }
}

fn emit_x_axis_label(primitives: &mut Vec<Primitive>, width: u32, y: f64) {
    primitives.push(Primitive::Text {
        x: f64::from(width) / 2.0,
        y,
        content: "Context Window (tokens)".to_string(),
        color: TEXT,
        size: LABEL_SIZE,
        anchor: Anchor::Middle,
        bold: true,
    });
}

fn background(width: u32, height: u32) -> Primitive {
    Primitive::Rect {
        x: 0.0,
        y: 0.0,
        width: f64::from(width),
        height: f64::from(height),
        fill: BACKGROUND,
        stroke: None,
    }
}

// ============================================================================
// Chart builders
// ============================================================================

/// Tokens/sec vs context size, one line per model
#[must_use]
pub fn performance_chart(metrics: &[AggregatedMetric], run_count: usize) -> ChartGeometry {
    let contexts = contexts_present(metrics);
    let series = tps_series(metrics);
    let area = PlotArea {
        left: MARGIN_LEFT,
        top: 64.0,
        right: f64::from(CHART_WIDTH) - MARGIN_RIGHT,
        bottom: f64::from(CHART_HEIGHT) - 72.0,
    };

    let mut primitives = vec![background(CHART_WIDTH, CHART_HEIGHT)];
    emit_title(
        &mut primitives,
        CHART_WIDTH,
        "Generation Throughput vs Context Size",
        run_count,
    );
    emit_panel(
        &mut primitives,
        area,
        &PanelSpec {
            series: &series,
            contexts: &contexts,
            y_label: "Tokens per Second".to_string(),
            y_max: nice_ceil(panel_max(&series) * 1.1),
            x_labels: true,
            square_markers: false,
            reference_lines: Vec::new(),
            full_scale_offset: 0.0,
        },
    );
    emit_legend(&mut primitives, area, &series);
    emit_x_axis_label(&mut primitives, CHART_WIDTH, area.bottom + 44.0);

    ChartGeometry {
        width: CHART_WIDTH,
        height: CHART_HEIGHT,
        primitives,
    }
}

/// Resident memory vs context size, one line per model
#[must_use]
pub fn memory_chart(metrics: &[AggregatedMetric], run_count: usize) -> ChartGeometry {
    let contexts = contexts_present(metrics);
    let series = memory_series(metrics);
    let area = PlotArea {
        left: MARGIN_LEFT,
        top: 64.0,
        right: f64::from(CHART_WIDTH) - MARGIN_RIGHT,
        bottom: f64::from(CHART_HEIGHT) - 72.0,
    };

    let mut primitives = vec![background(CHART_WIDTH, CHART_HEIGHT)];
    emit_title(
        &mut primitives,
        CHART_WIDTH,
        "Resident Memory vs Context Size",
        run_count,
    );
    emit_panel(
        &mut primitives,
        area,
        &PanelSpec {
            series: &series,
            contexts: &contexts,
            y_label: "Memory (GB)".to_string(),
            y_max: nice_ceil(panel_max(&series) * 1.15),
            x_labels: true,
            square_markers: true,
            reference_lines: Vec::new(),
            full_scale_offset: 0.0,
        },
    );
    emit_legend(&mut primitives, area, &series);
    emit_x_axis_label(&mut primitives, CHART_WIDTH, area.bottom + 44.0);

    ChartGeometry {
        width: CHART_WIDTH,
        height: CHART_HEIGHT,
        primitives,
    }
}

/// Combined view: throughput panel on top, GPU placement panel below
#[must_use]
pub fn benchmark_chart(metrics: &[AggregatedMetric], run_count: usize) -> ChartGeometry {
    let contexts = contexts_present(metrics);
    let tps = tps_series(metrics);
    let gpu = gpu_series(metrics);

    let top_area = PlotArea {
        left: MARGIN_LEFT,
        top: 64.0,
        right: f64::from(CHART_WIDTH) - MARGIN_RIGHT,
        bottom: 470.0,
    };
    let bottom_area = PlotArea {
        left: MARGIN_LEFT,
        top: 530.0,
        right: f64::from(CHART_WIDTH) - MARGIN_RIGHT,
        bottom: f64::from(COMBINED_HEIGHT) - 72.0,
    };

    let mut primitives = vec![background(CHART_WIDTH, COMBINED_HEIGHT)];
    emit_title(
        &mut primitives,
        CHART_WIDTH,
        "Throughput and GPU Placement vs Context Size",
        run_count,
    );
    emit_panel(
        &mut primitives,
        top_area,
        &PanelSpec {
            series: &tps,
            contexts: &contexts,
            y_label: "Tokens per Second".to_string(),
            y_max: nice_ceil(panel_max(&tps) * 1.1),
            x_labels: false,
            square_markers: false,
            reference_lines: Vec::new(),
            full_scale_offset: 0.0,
        },
    );
    emit_legend(&mut primitives, top_area, &tps);
    emit_panel(
        &mut primitives,
        bottom_area,
        &PanelSpec {
            series: &gpu,
            contexts: &contexts,
            y_label: "GPU %".to_string(),
            y_max: 112.0,
            x_labels: true,
            square_markers: true,
            reference_lines: vec![
                (100.0, FULL_GPU_LINE, None),
                (0.0, CPU_FALLBACK, Some("CPU-only fallback".to_string())),
            ],
            full_scale_offset: 1.5,
        },
    );
    emit_x_axis_label(&mut primitives, CHART_WIDTH, bottom_area.bottom + 44.0);

    ChartGeometry {
        width: CHART_WIDTH,
        height: COMBINED_HEIGHT,
        primitives,
    }
}

// ============================================================================
// Markdown summary
// ============================================================================

/// Per-context comparison tables plus pooling provenance
#[must_use]
pub fn summary_markdown(metrics: &[AggregatedMetric], run_count: usize) -> String {
    use std::fmt::Write as _;

    let mut out = String::from("# Benchmark Summary\n\n");
    if run_count > 1 {
        let _ = writeln!(out, "Statistics pooled across {run_count} run directories.\n");
    } else {
        out.push_str("Single run directory.\n\n");
    }

    for context in contexts_present(metrics) {
        let _ = writeln!(out, "## {} context\n", context_label(context));
        out.push_str("| Model | Tokens/sec | Memory (GB) | GPU % | Samples |\n");
        out.push_str("|-------|-----------:|------------:|------:|--------:|\n");

        let mut failed = 0usize;
        for m in metrics.iter().filter(|m| m.context == context) {
            let tps = if wants_error_bars(m.tokens_per_second.count, m.tokens_per_second.std_dev)
            {
                format!(
                    "{:.1} ± {:.1}",
                    m.tokens_per_second.mean, m.tokens_per_second.std_dev
                )
            } else {
                format!("{:.1}", m.tokens_per_second.mean)
            };
            let memory = m
                .memory_gb
                .as_ref()
                .map_or_else(|| "n/a".to_string(), |s| format!("{:.1}", s.mean));
            let gpu = m.gpu_percent.map_or_else(
                || "n/a".to_string(),
                |g| {
                    if m.is_cpu_only() {
                        "0 (cpu)".to_string()
                    } else {
                        format!("{g:.0}")
                    }
                },
            );
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                m.model, tps, memory, gpu, m.tokens_per_second.count
            );
            failed += m.failed_count;
        }
        if failed > 0 {
            let _ = writeln!(out, "\n_{failed} failed run(s) excluded from statistics._");
        }
        out.push('\n');
    }
    out
}

// ============================================================================
// Entry point
// ============================================================================

/// Render all charts and the summary into `output_dir`.
///
/// Returns the written paths in render order.
///
/// # Errors
///
/// Returns `FormatError` when `metrics` holds no chartable key, `IoError`
/// when the output directory or a file cannot be written.
pub fn write_charts(
    metrics: &[AggregatedMetric],
    run_count: usize,
    output_dir: &Path,
    format: ChartFormat,
) -> Result<Vec<PathBuf>> {
    if metrics.is_empty() {
        return Err(MedirError::FormatError {
            reason: "no aggregated samples to chart".to_string(),
        });
    }
    fs::create_dir_all(output_dir).map_err(|e| MedirError::IoError {
        message: format!("failed to create {}: {e}", output_dir.display()),
    })?;

    let charts = [
        ("performance", performance_chart(metrics, run_count)),
        ("memory", memory_chart(metrics, run_count)),
        ("benchmark", benchmark_chart(metrics, run_count)),
    ];

    let mut written = Vec::with_capacity(charts.len() + 1);
    for (name, geometry) in &charts {
        let path = output_dir.join(format!("{name}.{}", format.extension()));
        let bytes = match format {
            ChartFormat::Svg => svg::render(geometry).into_bytes(),
            ChartFormat::Png => png::render(geometry),
        };
        fs::write(&path, bytes).map_err(|e| MedirError::IoError {
            message: format!("failed to write {}: {e}", path.display()),
        })?;
        info!("wrote {}", path.display());
        written.push(path);
    }

    let summary_path = output_dir.join("summary.md");
    fs::write(&summary_path, summary_markdown(metrics, run_count)).map_err(|e| {
        MedirError::IoError {
            message: format!("failed to write {}: {e}", summary_path.display()),
        }
    })?;
    info!("wrote {}", summary_path.display());
    written.push(summary_path);

    Ok(written)
}
