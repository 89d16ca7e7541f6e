use common::{
    NS_PER_SEC,
    extract::extract,
    figure::{Figure, RenderContext},
    runs::RunMatrix,
    stats,
    table::{Table, Value},
};
use eyre::{Context, Result, bail};
use plot_common::{base_layout, palette::light, save_fig};
use plotly::{
    Bar, Plot, Scatter,
    common::{Line, Marker, Mode, Position},
    layout::{BarMode, Margin},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SECTION_PATTERNS: &[&str] = &[
    r"# of processes: *(?P<nproc>\d+)",
    r"\[(?P<i>\d+)\] *(?P<time>\d+) *ns",
];
const MEASUREMENT_PATTERNS: &[&str] =
    &[r"^ *(?P<event>[a-zA-Z_]+) .*\( *(?P<acc>\d+) *ns */.*\)"];

/// Per-event time breakdown of the PGAS runtime (GET/PUT against
/// checkout/checkin), stacked bars with one column per configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CilksortGetput {
    #[serde(default = "default_n_warmups")]
    n_warmups: i64,
    #[serde(default = "default_shmem_batch")]
    shmem_batch: String,
    #[serde(default = "default_multinode_batch")]
    multinode_batch: String,
    #[serde(default = "default_multinode_nodes")]
    multinode_nodes: Vec<String>,
    #[serde(default = "default_duplicates")]
    duplicates: Vec<i64>,
    #[serde(default = "default_panels")]
    panels: Vec<PanelSpec>,
}

/// One bar column: a (label, cache policy, distribution policy) combination
/// and its x-axis caption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelSpec {
    pub label: String,
    pub cache_policy: String,
    pub dist_policy: String,
    pub title: String,
}

fn default_n_warmups() -> i64 {
    1
}

fn default_shmem_batch() -> String {
    "getput_shmem".to_owned()
}

fn default_multinode_batch() -> String {
    "getput_multinode".to_owned()
}

fn default_multinode_nodes() -> Vec<String> {
    vec!["3x4x3:torus".to_owned()]
}

fn default_duplicates() -> Vec<i64> {
    vec![0, 1, 2]
}

fn default_panels() -> Vec<PanelSpec> {
    let panel = |label: &str, cache: &str, dist: &str, title: &str| PanelSpec {
        label: label.to_owned(),
        cache_policy: cache.to_owned(),
        dist_policy: dist.to_owned(),
        title: title.to_owned(),
    };
    vec![
        panel("shmem", "getput", "block", "GET/PUT<br>1 node"),
        panel("shmem", "writeback_lazy", "block", "Checkout/in<br>1 node"),
        panel("multinode", "getput", "cyclic", "GET/PUT<br>36 nodes"),
        panel(
            "multinode",
            "writeback_lazy",
            "cyclic",
            "Checkout/in<br>36 nodes",
        ),
    ]
}

impl Default for CilksortGetput {
    fn default() -> Self {
        CilksortGetput {
            n_warmups: default_n_warmups(),
            shmem_batch: default_shmem_batch(),
            multinode_batch: default_multinode_batch(),
            multinode_nodes: default_multinode_nodes(),
            duplicates: default_duplicates(),
            panels: default_panels(),
        }
    }
}

struct BarLook {
    rank: usize,
    color: &'static str,
    title: &'static str,
}

fn event_look(event: &str) -> Option<BarLook> {
    let look = |rank, color, title| BarLook { rank, color, title };
    Some(match event {
        "others" => look(9, "#444444", "Others"),
        "get" => look(8, light::LIGHT_BLUE, "Get"),
        "put" => look(7, light::ORANGE, "Put"),
        "checkout" => look(6, light::LIGHT_CYAN, "Checkout"),
        "checkin" => look(5, light::PINK, "Checkin"),
        "release" => look(4, light::PEAR, "Release"),
        "release_lazy" => look(3, light::OLIVE, "Lazy Release"),
        "acquire" => look(2, light::MINT, "Acquire"),
        "merge_kernel" => look(1, "#BBBBBB", "Serial Merge"),
        "quicksort_kernel" => look(0, "#BBBBBB", "Serial Quicksort"),
        _ => return None,
    })
}

/// Mean accumulated time per (label, cache_policy, dist_policy, event) plus a
/// synthesized `others` row per configuration covering the gap between the
/// repeat wall time and the accounted events.
fn breakdown(df: &Table) -> Result<Table> {
    let mut agg = Table::new();
    for (key, group) in df.group_by(&["label", "cache_policy", "dist_policy", "event"])? {
        let acc = stats::mean(&group.numeric_column("acc")?);
        let time = stats::max(&group.numeric_column("time")?);
        agg.push_row(vec![
            ("label".to_owned(), key[0].clone()),
            ("cache_policy".to_owned(), key[1].clone()),
            ("dist_policy".to_owned(), key[2].clone()),
            ("event".to_owned(), key[3].clone()),
            ("acc".to_owned(), Value::Float(acc)),
            ("time".to_owned(), Value::Float(time)),
        ]);
    }

    let mut others = Vec::new();
    for (key, group) in agg.group_by(&["label", "cache_policy", "dist_policy"])? {
        let total = stats::max(&group.numeric_column("time")?);
        let accounted: f64 = group.numeric_column("acc")?.iter().sum();
        others.push((key, total - accounted, total));
    }
    for (key, gap, total) in others {
        agg.push_row(vec![
            ("label".to_owned(), key[0].clone()),
            ("cache_policy".to_owned(), key[1].clone()),
            ("dist_policy".to_owned(), key[2].clone()),
            ("event".to_owned(), Value::Text("others".to_owned())),
            ("acc".to_owned(), Value::Float(gap)),
            ("time".to_owned(), Value::Float(total)),
        ]);
    }
    Ok(agg)
}

fn panel_index(panels: &[PanelSpec], row: common::table::RowView<'_>) -> Option<usize> {
    panels.iter().position(|p| {
        row.str("label") == Some(p.label.as_str())
            && row.str("cache_policy") == Some(p.cache_policy.as_str())
            && row.str("dist_policy") == Some(p.dist_policy.as_str())
    })
}

impl CilksortGetput {
    fn result(&self, ctx: &RenderContext) -> Result<Table> {
        let base = ctx.bench_dir("cilksort");
        let shmem = RunMatrix::new("c_{cache_policy}_d_{dist_policy}_{duplicate}.out")
            .param("label", ["shmem"])
            .param("cache_policy", ["nocache", "writeback_lazy", "getput"])
            .param("dist_policy", ["block", "cyclic"])
            .param("nodes", ["1"])
            .param("duplicate", self.duplicates.clone())
            .files(&base.join(&self.shmem_batch))?;
        let multinode = RunMatrix::new("c_{cache_policy}_d_{dist_policy}_{duplicate}.out")
            .param("label", ["multinode"])
            .param("cache_policy", ["nocache", "writeback_lazy", "getput"])
            .param("dist_policy", ["block", "cyclic"])
            .param("nodes", self.multinode_nodes.clone())
            .param("duplicate", self.duplicates.clone())
            .files(&base.join(&self.multinode_batch))?;

        let files: Vec<_> = shmem.into_iter().chain(multinode).collect();
        let df = extract(&files, SECTION_PATTERNS, MEASUREMENT_PATTERNS)?;
        Ok(df.filter(|r| r.i64("i").is_some_and(|i| i >= self.n_warmups)))
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Figure for CilksortGetput {
    fn benchmark(&self) -> &'static str {
        "cilksort"
    }

    fn stem(&self) -> &'static str {
        "getput_stats"
    }

    async fn render(&self, ctx: &RenderContext) -> Result<()> {
        let df = self.result(ctx).context("extract cilksort logs")?;
        if df.is_empty() {
            bail!("No measurement rows extracted");
        }

        let df = df.filter(|r| r.str("event").is_some_and(|e| event_look(e).is_some()));
        // Event accumulators are summed over ranks; normalize to one process.
        let df = df.with_column("acc", |r| match (r.f64("acc"), r.f64("nproc")) {
            (Some(acc), Some(nproc)) => Value::Float(acc / nproc),
            _ => Value::Null,
        });

        let agg = breakdown(&df)?;
        plot_common::dump_table(ctx, &agg, self.benchmark(), self.stem())?;
        debug!("{} aggregated event row(s)", agg.len());

        // One y vector per event, aligned over the panel columns.
        let titles: Vec<String> = self.panels.iter().map(|p| p.title.clone()).collect();
        let mut events: Vec<(BarLook, Vec<f64>)> = Vec::new();
        let mut totals = vec![0.0f64; self.panels.len()];
        for row in agg.rows() {
            let Some(panel_idx) = panel_index(&self.panels, row) else {
                continue;
            };
            let Some(look) = row.str("event").and_then(event_look) else {
                continue;
            };
            let acc = row.f64("acc").unwrap_or(0.0) / NS_PER_SEC;
            match events.iter().position(|(l, _)| l.rank == look.rank) {
                Some(pos) => events[pos].1[panel_idx] += acc,
                None => {
                    let mut ys = vec![0.0; self.panels.len()];
                    ys[panel_idx] = acc;
                    events.push((look, ys));
                }
            }
            if let Some(total) = row.f64("time") {
                totals[panel_idx] = totals[panel_idx].max(total / NS_PER_SEC);
            }
        }
        // Low ranks first so serial kernels sit at the bottom of the stack.
        events.sort_by_key(|(look, _)| look.rank);

        let mut plot = Plot::new();
        for (look, ys) in events {
            plot.add_trace(
                Bar::new(titles.clone(), ys)
                    .name(look.title)
                    .marker(
                        Marker::new()
                            .color(look.color)
                            .line(Line::new().width(1.5).color("#333333")),
                    ),
            );
        }
        let labels: Vec<String> = totals.iter().map(|t| format!("{t:.2} s")).collect();
        plot.add_trace(
            Scatter::new(titles, totals)
                .mode(Mode::Text)
                .text_array(labels)
                .text_position(Position::TopCenter)
                .show_legend(false),
        );

        plot.set_layout(
            base_layout(550, 280)
                .margin(Margin::new().left(0).right(0).top(0).bottom(0))
                .bar_mode(BarMode::Stack)
                .x_axis(plot_common::frame_axis(""))
                .y_axis(plot_common::frame_axis("Execution Time (s)")),
        );

        save_fig(&plot, ctx, self.benchmark(), self.stem())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_row(label: &str, cache: &str, event: &str, acc: f64, time: f64) -> Vec<(String, Value)> {
        vec![
            ("label".to_owned(), Value::Text(label.to_owned())),
            ("cache_policy".to_owned(), Value::Text(cache.to_owned())),
            ("dist_policy".to_owned(), Value::Text("block".to_owned())),
            ("event".to_owned(), Value::Text(event.to_owned())),
            ("acc".to_owned(), Value::Float(acc)),
            ("time".to_owned(), Value::Float(time)),
        ]
    }

    #[test]
    fn breakdown_synthesizes_the_others_gap() {
        let mut df = Table::new();
        // Two repeats of the same configuration.
        df.push_row(event_row("shmem", "getput", "get", 100.0, 1000.0));
        df.push_row(event_row("shmem", "getput", "get", 300.0, 1200.0));
        df.push_row(event_row("shmem", "getput", "put", 50.0, 1200.0));

        let agg = breakdown(&df).unwrap();
        // get mean = 200, put mean = 50, wall max = 1200 -> others = 950.
        let mut by_event = std::collections::HashMap::new();
        for row in agg.rows() {
            by_event.insert(row.str("event").unwrap().to_owned(), row.f64("acc").unwrap());
        }
        assert_eq!(by_event["get"], 200.0);
        assert_eq!(by_event["put"], 50.0);
        assert_eq!(by_event["others"], 1200.0 - 250.0);
    }

    #[test]
    fn breakdown_keeps_configurations_separate() {
        let mut df = Table::new();
        df.push_row(event_row("shmem", "getput", "get", 100.0, 500.0));
        df.push_row(event_row("shmem", "writeback_lazy", "checkout", 80.0, 400.0));
        let agg = breakdown(&df).unwrap();
        // 2 event rows + one `others` per configuration.
        assert_eq!(agg.len(), 4);
    }

    #[test]
    fn default_panels_reference_known_events_and_policies() {
        let fig = CilksortGetput::default();
        assert_eq!(fig.panels.len(), 4);
        for p in &fig.panels {
            assert!(["shmem", "multinode"].contains(&p.label.as_str()));
            assert!(["getput", "writeback_lazy"].contains(&p.cache_policy.as_str()));
        }
        for event in [
            "others",
            "get",
            "put",
            "checkout",
            "checkin",
            "release",
            "release_lazy",
            "acquire",
            "merge_kernel",
            "quicksort_kernel",
        ] {
            assert!(event_look(event).is_some());
        }
        assert!(event_look("unknown_event").is_none());
    }
}
