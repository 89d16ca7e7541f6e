use common::{
    extract::extract,
    figure::{Figure, RenderContext},
    runs::RunMatrix,
    table::{Table, Value},
};
use eyre::{Context, Result, bail};
use plot_common::{
    CiSeries, SeriesLook, base_layout, ci_points, ci_scatter, palette::bright, save_fig,
};
use plotly::{
    Plot,
    common::{DashType, MarkerSymbol},
    layout::Margin,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Unbalanced-tree-search traversal throughput against core count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UtsPerf {
    #[serde(default = "default_n_warmups")]
    n_warmups: i64,
    #[serde(default = "default_batch")]
    batch: String,
    #[serde(default = "default_tree")]
    tree: String,
    #[serde(default = "default_nodes")]
    nodes: Vec<String>,
    #[serde(default = "default_duplicates")]
    duplicates: Vec<i64>,
}

fn default_n_warmups() -> i64 {
    1
}

fn default_batch() -> String {
    "scaling".to_owned()
}

fn default_tree() -> String {
    "T1XXL".to_owned()
}

fn default_nodes() -> Vec<String> {
    ["1", "2:torus", "2x3:torus", "2x3x2:torus", "3x4x3:torus"]
        .map(str::to_owned)
        .to_vec()
}

fn default_duplicates() -> Vec<i64> {
    vec![0, 1, 2]
}

impl Default for UtsPerf {
    fn default() -> Self {
        UtsPerf {
            n_warmups: default_n_warmups(),
            batch: default_batch(),
            tree: default_tree(),
            nodes: default_nodes(),
            duplicates: default_duplicates(),
        }
    }
}

impl UtsPerf {
    fn result(&self, ctx: &RenderContext) -> Result<Table> {
        let files = RunMatrix::new("t_{tree}_nodes_{nodes}_{duplicate}.out")
            .param("tree", [self.tree.as_str()])
            .param("nodes", self.nodes.clone())
            .param("duplicate", self.duplicates.clone())
            .files(&ctx.bench_dir("uts").join(&self.batch))?;
        let df = extract(
            &files,
            &[r"# of processes: *(?P<nproc>\d+)"],
            &[
                r"\[(?P<i>\d+)\] *(?P<time>\d+) *ns *(?P<perf>[\d.eE+-]+) *Gnodes/s *\( *nodes: *(?P<nnodes>\d+) *depth: *(?P<depth>\d+) *leaves: *(?P<leaves>\d+) *\)",
            ],
        )?;
        let df = df.filter(|r| r.i64("i").is_some_and(|i| i >= self.n_warmups));
        Ok(df.with_column("ncore", |r| {
            r.get("nproc").cloned().unwrap_or(Value::Null)
        }))
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Figure for UtsPerf {
    fn benchmark(&self) -> &'static str {
        "uts"
    }

    fn stem(&self) -> &'static str {
        "perf"
    }

    async fn render(&self, ctx: &RenderContext) -> Result<()> {
        let df = self.result(ctx).context("extract uts logs")?;
        if df.is_empty() {
            bail!("No measurement rows extracted");
        }
        plot_common::dump_table(ctx, &df, self.benchmark(), self.stem())?;
        debug!("{} measurement row(s) after warmup filter", df.len());

        let points = ci_points(&df, "ncore", "perf")?;
        // Legend is hidden; the series title never shows.
        let look = SeriesLook {
            rank: 0,
            color: bright::BLUE,
            dash: DashType::Solid,
            marker: MarkerSymbol::CircleOpen,
            title: "uts",
        };

        let mut plot = Plot::new();
        plot.add_trace(ci_scatter(CiSeries::from_points(&points), &look));
        plot.set_layout(
            base_layout(400, 330)
                .margin(Margin::new().left(0).right(0).top(0).bottom(0))
                .x_axis(plot_common::log_frame_axis("# of cores"))
                .y_axis(
                    plot_common::frame_axis("Throughput (Gnodes/s)")
                        .range_mode(plotly::layout::RangeMode::ToZero),
                )
                .show_legend(false),
        );

        save_fig(&plot, ctx, self.benchmark(), self.stem())?;
        Ok(())
    }
}
