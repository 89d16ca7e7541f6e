use common::{
    extract::extract,
    figure::{Figure, RenderContext},
    runs::RunMatrix,
    stats,
    table::{Table, Value},
};
use eyre::{Context, Result, bail};
use plot_common::{CiSeries, SeriesLook, base_layout, ci_points, ci_scatter, palette::bright, save_fig};
use plotly::{
    Plot,
    common::{Anchor, DashType, MarkerSymbol},
    layout::{Legend, Margin},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Weak-scaling parallel efficiency of the FMM traversal, one series per
/// cache policy plus an MPI reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExafmmWeak {
    #[serde(default = "default_n_warmups")]
    n_warmups: i64,
    #[serde(default = "default_batch")]
    batch: String,
    #[serde(default = "default_nodes")]
    nodes: Vec<String>,
    #[serde(default = "default_duplicates")]
    duplicates: Vec<i64>,
}

fn default_n_warmups() -> i64 {
    1
}

fn default_batch() -> String {
    "weak1M".to_owned()
}

fn default_nodes() -> Vec<String> {
    ["1", "2:torus", "2x3:torus", "2x3x2:torus", "3x4x3:torus"]
        .map(str::to_owned)
        .to_vec()
}

fn default_duplicates() -> Vec<i64> {
    vec![0, 1, 2]
}

impl Default for ExafmmWeak {
    fn default() -> Self {
        ExafmmWeak {
            n_warmups: default_n_warmups(),
            batch: default_batch(),
            nodes: default_nodes(),
            duplicates: default_duplicates(),
        }
    }
}

fn policy_look(policy: &str) -> Option<SeriesLook> {
    Some(match policy {
        "nocache" => SeriesLook {
            rank: 0,
            color: bright::RED,
            dash: DashType::Dot,
            marker: MarkerSymbol::CircleOpen,
            title: "No Cache",
        },
        "writethrough" => SeriesLook {
            rank: 1,
            color: bright::BLUE,
            dash: DashType::Dash,
            marker: MarkerSymbol::DiamondOpen,
            title: "Write-Through",
        },
        "writeback" => SeriesLook {
            rank: 2,
            color: bright::YELLOW,
            dash: DashType::DashDot,
            marker: MarkerSymbol::SquareOpen,
            title: "Write-Back",
        },
        "writeback_lazy" => SeriesLook {
            rank: 3,
            color: bright::GREEN,
            dash: DashType::Solid,
            marker: MarkerSymbol::StarTriangleUpOpen,
            title: "Write-Back (Lazy)",
        },
        "mpi" => SeriesLook {
            rank: 4,
            color: bright::PURPLE,
            dash: DashType::LongDashDot,
            marker: MarkerSymbol::XThin,
            title: "MPI+MassiveThreads",
        },
        _ => return None,
    })
}

/// Parallel-efficiency series: `t_min / mean(time)` per core count, error
/// bars transformed through the same reciprocal.
fn efficiency_series(points: &[plot_common::CiPoint], t_min: f64) -> CiSeries {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| t_min / p.mean).collect();
    let upper = points
        .iter()
        .zip(&ys)
        .map(|(p, y)| t_min / p.ci_lower - y)
        .collect();
    let lower = points
        .iter()
        .zip(&ys)
        .map(|(p, y)| y - t_min / p.ci_upper)
        .collect();
    CiSeries {
        xs,
        ys,
        upper,
        lower,
    }
}

impl ExafmmWeak {
    fn runtime_result(&self, ctx: &RenderContext) -> Result<Table> {
        let files = RunMatrix::new("nodes_{nodes}_p_{policy}_{duplicate}.out")
            .param("nodes", self.nodes.clone())
            .param(
                "policy",
                ["nocache", "writethrough", "writeback", "writeback_lazy"],
            )
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
        let df = df.filter(|r| r.i64("i").is_some_and(|i| i >= self.n_warmups));
        Ok(df.with_column("ncore", |r| {
            r.get("nproc").cloned().unwrap_or(Value::Null)
        }))
    }

    fn mpi_result(&self, ctx: &RenderContext) -> Result<Table> {
        let files = RunMatrix::new("nodes_{nodes}_{duplicate}.out")
            .param("nodes", self.nodes.clone())
            .param("duplicate", self.duplicates.clone())
            .files(&ctx.bench_dir("exafmm_mpi").join(&self.batch))?;
        let df = extract(
            &files,
            &[
                r"threads *: *(?P<nthread>\d+)",
                r"# of processes *: *(?P<nproc>\d+)",
                r"-* *Time average loop (?P<i>\d+) *-*",
            ],
            &[r"Traverse \(total\) *: *(?P<time>\d+\.\d+) *s"],
        )?;
        let df = df.filter(|r| r.i64("i").is_some_and(|i| i >= self.n_warmups));
        let df = df.with_column("ncore", |r| match (r.i64("nproc"), r.i64("nthread")) {
            (Some(p), Some(t)) => Value::Int(p * t),
            _ => Value::Null,
        });
        Ok(df.with_column("policy", |_| Value::Text("mpi".to_owned())))
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Figure for ExafmmWeak {
    fn benchmark(&self) -> &'static str {
        "exafmm"
    }

    fn stem(&self) -> &'static str {
        "weak"
    }

    async fn render(&self, ctx: &RenderContext) -> Result<()> {
        let runtime = self.runtime_result(ctx).context("extract exafmm logs")?;
        let mpi = self.mpi_result(ctx).context("extract exafmm MPI logs")?;
        let df = Table::concat([runtime, mpi]);
        if df.is_empty() {
            bail!("No measurement rows extracted");
        }
        plot_common::dump_table(ctx, &df, self.benchmark(), self.stem())?;

        let t_min = stats::min(&df.numeric_column("time")?);

        let mut series = Vec::new();
        for (key, group) in df.group_by(&["policy"])? {
            let Some(policy) = key[0].as_str().map(str::to_owned) else {
                continue;
            };
            let Some(look) = policy_look(&policy) else {
                warn!("No look defined for policy {policy}");
                continue;
            };
            series.push((look, group));
        }
        series.sort_by_key(|(look, _)| look.rank);

        let mut plot = Plot::new();
        for (look, group) in series {
            let points = ci_points(&group, "ncore", "time")?;
            plot.add_trace(ci_scatter(efficiency_series(&points, t_min), &look));
        }

        plot.set_layout(
            base_layout(400, 330)
                .margin(Margin::new().left(0).right(0).top(0).bottom(0))
                .x_axis(plot_common::log_frame_axis("# of cores"))
                .y_axis(plot_common::frame_axis("Parallel Efficiency").range(vec![0.0, 1.0]))
                .legend(
                    Legend::new()
                        .x(0.02)
                        .x_anchor(Anchor::Left)
                        .y(1.05)
                        .y_anchor(Anchor::Top),
                ),
        );

        save_fig(&plot, ctx, self.benchmark(), self.stem())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use plot_common::CiPoint;

    use super::*;

    #[test]
    fn efficiency_is_relative_to_the_fastest_run() {
        let points = [
            CiPoint {
                x: 48.0,
                mean: 10.0,
                ci_lower: 8.0,
                ci_upper: 12.5,
            },
            CiPoint {
                x: 96.0,
                mean: 5.0,
                ci_lower: 5.0,
                ci_upper: 5.0,
            },
        ];
        let s = efficiency_series(&points, 5.0);
        assert_eq!(s.xs, vec![48.0, 96.0]);
        assert_eq!(s.ys, vec![0.5, 1.0]);
        // Slower CI bound maps to a higher efficiency bound.
        assert!((s.upper[0] - (5.0 / 8.0 - 0.5)).abs() < 1e-12);
        assert!((s.lower[0] - (0.5 - 5.0 / 12.5)).abs() < 1e-12);
        assert_eq!(s.upper[1], 0.0);
        assert_eq!(s.lower[1], 0.0);
    }

    #[test]
    fn every_default_policy_has_a_look() {
        for policy in [
            "nocache",
            "writethrough",
            "writeback",
            "writeback_lazy",
            "mpi",
        ] {
            assert!(policy_look(policy).is_some());
        }
        assert!(policy_look("unknown").is_none());
    }
}
