use common::{
    extract::extract,
    figure::{Figure, RenderContext},
    runs::RunMatrix,
    table::Table,
};
use eyre::{Context, Result, bail};
use plot_common::{CiPoint, CiSeries, base_layout, ci_points, save_fig};
use plotly::{
    Plot, Scatter,
    common::{ErrorData, ErrorType, Mode},
    layout::{Annotation, GridPattern, LayoutGrid, Margin},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Execution time against the coherence sub-block size, one subplot per
/// problem size, log-scaled x.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExafmmSbsize {
    #[serde(default = "default_n_warmups")]
    n_warmups: i64,
    #[serde(default = "default_batch")]
    batch: String,
    #[serde(default = "default_n_inputs")]
    n_inputs: Vec<i64>,
    #[serde(default = "default_sub_block_sizes")]
    sub_block_sizes: Vec<i64>,
    #[serde(default = "default_duplicates")]
    duplicates: Vec<i64>,
}

fn default_n_warmups() -> i64 {
    1
}

fn default_batch() -> String {
    "sbsize".to_owned()
}

fn default_n_inputs() -> Vec<i64> {
    vec![1_000_000, 10_000_000]
}

fn default_sub_block_sizes() -> Vec<i64> {
    vec![1, 4, 16, 64, 256, 1024, 4096, 16384, 65536]
}

fn default_duplicates() -> Vec<i64> {
    vec![0, 1, 2]
}

impl Default for ExafmmSbsize {
    fn default() -> Self {
        ExafmmSbsize {
            n_warmups: default_n_warmups(),
            batch: default_batch(),
            n_inputs: default_n_inputs(),
            sub_block_sizes: default_sub_block_sizes(),
            duplicates: default_duplicates(),
        }
    }
}

/// Short label for a body count, e.g. `1M bodies`.
fn input_label(n_input: f64) -> String {
    if n_input >= 1e6 && n_input % 1e6 == 0.0 {
        format!("{}M bodies", n_input / 1e6)
    } else {
        format!("{n_input} bodies")
    }
}

/// Annotations for one subplot: the time at the smallest sub-block size and
/// the best time over the sweep.
fn panel_annotations(points: &[CiPoint], axis: usize) -> Vec<Annotation> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let best = points
        .iter()
        .fold(*first, |acc, p| if p.mean < acc.mean { *p } else { acc });
    let (x_ref, y_ref) = if axis == 1 {
        ("x".to_owned(), "y".to_owned())
    } else {
        (format!("x{axis}"), format!("y{axis}"))
    };
    vec![
        Annotation::new()
            .x(first.x.log10())
            .y(first.mean)
            .ax(8.0)
            .ay(-25.0)
            .text(format!("{:.1} s", first.mean))
            .x_ref(x_ref.as_str())
            .y_ref(y_ref.as_str()),
        Annotation::new()
            .x(best.x.log10())
            .y(best.mean)
            .text(format!("Best: {:.1} s", best.mean))
            .x_ref(x_ref.as_str())
            .y_ref(y_ref.as_str()),
    ]
}

impl ExafmmSbsize {
    fn result(&self, ctx: &RenderContext) -> Result<Table> {
        let files = RunMatrix::new("n_{n_input}_s_{sub_block_size}_{duplicate}.out")
            .param("n_input", self.n_inputs.clone())
            .param("policy", ["writeback_lazy"])
            .param("sub_block_size", self.sub_block_sizes.clone())
            .param("duplicate", self.duplicates.clone())
            .files(&ctx.bench_dir("exafmm").join(&self.batch))?;
        let df = extract(
            &files,
            &[
                r"# of processes *: *(?P<nproc>\d+)",
                r"-* *Time average loop (?P<i>\d+) *-*",
            ],
            &[r"Traverse *: *(?P<time>\d+\.\d+) *s"],
        )?;
        Ok(df.filter(|r| r.i64("i").is_some_and(|i| i >= self.n_warmups)))
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Figure for ExafmmSbsize {
    fn benchmark(&self) -> &'static str {
        "exafmm"
    }

    fn stem(&self) -> &'static str {
        "sbsize"
    }

    async fn render(&self, ctx: &RenderContext) -> Result<()> {
        let df = self.result(ctx).context("extract exafmm sbsize logs")?;
        if df.is_empty() {
            bail!("No measurement rows extracted");
        }
        plot_common::dump_table(ctx, &df, self.benchmark(), self.stem())?;
        debug!("{} measurement row(s) after warmup filter", df.len());

        let groups = df.group_by(&["n_input"])?;
        let panels = groups.len();

        let mut plot = Plot::new();
        let mut annotations = Vec::new();
        for (idx, (key, group)) in groups.iter().enumerate() {
            // Largest problem size on the top subplot.
            let axis = panels - idx;
            let points = ci_points(group, "sub_block_size", "time")?;
            let series = CiSeries::from_points(&points);

            let mut trace = Scatter::new(series.xs, series.ys)
                .mode(Mode::LinesMarkers)
                .error_y(
                    ErrorData::new(ErrorType::Data)
                        .array(series.upper)
                        .array_minus(series.lower)
                        .symmetric(false)
                        .thickness(plot_common::LINE_WIDTH),
                )
                .show_legend(false);
            if axis != 1 {
                let xa = format!("x{axis}");
                let ya = format!("y{axis}");
                trace = trace.x_axis(xa.as_str()).y_axis(ya.as_str());
            }
            plot.add_trace(trace);

            annotations.extend(panel_annotations(&points, axis));

            let label = plot_common::key_f64(key).map(input_label).unwrap_or_default();
            annotations.push(
                Annotation::new()
                    .x(0.04)
                    .y(if axis == 1 { 1.02 } else { 0.4 })
                    .x_ref("paper")
                    .y_ref("paper")
                    .show_arrow(false)
                    .text(format!("<b>{label}</b>")),
            );
        }

        let x_bottom = plot_common::log_frame_axis("Sub-block size (bytes)");
        let x_top = plot_common::log_frame_axis("");
        plot.set_layout(
            base_layout(350, 250)
                .margin(Margin::new().left(60).right(15).top(10).bottom(50))
                .grid(
                    LayoutGrid::new()
                        .rows(panels)
                        .columns(1)
                        .pattern(GridPattern::Independent),
                )
                .x_axis(x_top)
                .x_axis2(x_bottom)
                .y_axis(plot_common::frame_axis("Execution time (s)").range_mode(plotly::layout::RangeMode::ToZero))
                .y_axis2(plot_common::frame_axis("Execution time (s)").range_mode(plotly::layout::RangeMode::ToZero))
                .annotations(annotations)
                .show_legend(false),
        );

        save_fig(&plot, ctx, self.benchmark(), self.stem())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, mean: f64) -> CiPoint {
        CiPoint {
            x,
            mean,
            ci_lower: mean,
            ci_upper: mean,
        }
    }

    #[test]
    fn annotations_mark_first_and_best_point() {
        let points = [point(1.0, 12.0), point(64.0, 4.0), point(65536.0, 7.0)];
        let anns = panel_annotations(&points, 2);
        assert_eq!(anns.len(), 2);
        let empty = panel_annotations(&[], 1);
        assert!(empty.is_empty());
    }

    #[test]
    fn input_labels_scale_to_millions() {
        assert_eq!(input_label(1_000_000.0), "1M bodies");
        assert_eq!(input_label(10_000_000.0), "10M bodies");
        assert_eq!(input_label(500.0), "500 bodies");
    }
}
