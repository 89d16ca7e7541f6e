pub mod palette;

use std::{fs, path::PathBuf};

use common::{
    figure::RenderContext,
    stats,
    table::{Table, Value},
};
use eyre::{Context, Result};
use plotly::{
    Plot, Scatter,
    color::NamedColor,
    common::{DashType, ErrorData, ErrorType, Font, Line, Marker, MarkerSymbol, Mode, Title},
    layout::{Axis, Layout},
};
use tracing::debug;

pub const LINE_WIDTH: f64 = 2.0;
pub const MARKER_SIZE: usize = 12;
pub const FONT_FAMILY: &str = "Linux Biolinum O, sans-serif";
pub const FONT_SIZE: usize = 16;

/// Per-series chart attributes, keyed by series name in each figure's look
/// table.
#[derive(Debug, Clone)]
pub struct SeriesLook {
    /// Legend position; traces are added in ascending rank.
    pub rank: usize,
    pub color: &'static str,
    pub dash: DashType,
    pub marker: MarkerSymbol,
    pub title: &'static str,
}

/// One aggregated point of a scatter series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CiPoint {
    pub x: f64,
    pub mean: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Groups by a numeric x column and aggregates the y column into mean and
/// 95% confidence bounds, points ordered by x.
pub fn ci_points(df: &Table, x_col: &str, y_col: &str) -> Result<Vec<CiPoint>> {
    let mut points = Vec::new();
    for (key, group) in df.group_by(&[x_col])? {
        let Some(x) = key[0].as_f64() else {
            continue;
        };
        let ys = group.numeric_column(y_col)?;
        if ys.is_empty() {
            continue;
        }
        points.push(CiPoint {
            x,
            mean: stats::mean(&ys),
            ci_lower: stats::ci_lower(&ys),
            ci_upper: stats::ci_upper(&ys),
        });
    }
    Ok(points)
}

/// Scatter series with asymmetric error bars; `upper`/`lower` are offsets
/// from `ys`.
pub struct CiSeries {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

impl CiSeries {
    /// Plain mean-with-CI series from aggregated points.
    pub fn from_points(points: &[CiPoint]) -> CiSeries {
        CiSeries {
            xs: points.iter().map(|p| p.x).collect(),
            ys: points.iter().map(|p| p.mean).collect(),
            upper: points.iter().map(|p| p.ci_upper - p.mean).collect(),
            lower: points.iter().map(|p| p.mean - p.ci_lower).collect(),
        }
    }
}

pub fn ci_scatter(series: CiSeries, look: &SeriesLook) -> Box<Scatter<f64, f64>> {
    Scatter::new(series.xs, series.ys)
        .name(look.title)
        .mode(Mode::LinesMarkers)
        .line(
            Line::new()
                .width(LINE_WIDTH)
                .dash(look.dash.clone())
                .color(look.color),
        )
        .marker(
            Marker::new()
                .symbol(look.marker.clone())
                .size(MARKER_SIZE)
                .color(look.color)
                .line(Line::new().width(LINE_WIDTH).color(look.color)),
        )
        .error_y(
            ErrorData::new(ErrorType::Data)
                .array(series.upper)
                .array_minus(series.lower)
                .symmetric(false)
                .thickness(LINE_WIDTH),
        )
}

/// Framed axis with a title, the shared style of every figure.
pub fn frame_axis(title: &str) -> Axis {
    Axis::new()
        .show_line(true)
        .line_color(NamedColor::Black)
        .mirror(true)
        .title(Title::with_text(title))
}

/// [`frame_axis`] on a log scale with decade ticks.
pub fn log_frame_axis(title: &str) -> Axis {
    frame_axis(title)
        .type_(plotly::layout::AxisType::Log)
        .dtick(1.0)
}

pub fn base_layout(width: usize, height: usize) -> Layout {
    Layout::new()
        .width(width)
        .height(height)
        .font(Font::new().family(FONT_FAMILY).size(FONT_SIZE))
}

/// Writes a figure as a self-contained HTML file to
/// `<figs_dir>/<benchmark>/<stem>_<machine>.html`.
pub fn save_fig(plot: &Plot, ctx: &RenderContext, benchmark: &str, stem: &str) -> Result<PathBuf> {
    let dir = ctx.figs_dir.join(benchmark);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(format!("{stem}_{}.html", ctx.machine));
    fs::write(&path, plot.to_html()).with_context(|| format!("write {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

/// Dumps an extracted table as CSV next to the figures when the context asks
/// for it.
pub fn dump_table(ctx: &RenderContext, table: &Table, benchmark: &str, stem: &str) -> Result<()> {
    if !ctx.dump_tables {
        return Ok(());
    }
    let dir = ctx.figs_dir.join(benchmark).join("data");
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(format!("{stem}.csv"));
    let file = fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
    table.write_csv(file)?;
    Ok(())
}

/// Float value of a key column, for sorting/grouping helpers.
pub fn key_f64(key: &[Value]) -> Option<f64> {
    key.first().and_then(Value::as_f64)
}
