use core::fmt::Debug;
use std::path::PathBuf;

use downcast_rs::{Downcast, impl_downcast};
use dyn_clone::{DynClone, clone_trait_object};
use eyre::Result;

/// Where a figure reads benchmark logs from and writes HTML to.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub machine: String,
    pub results_dir: PathBuf,
    pub figs_dir: PathBuf,
    /// Dump each figure's extracted table as CSV under
    /// `figs/<benchmark>/data/`.
    pub dump_tables: bool,
}

impl RenderContext {
    /// Root of one benchmark's logs: `<results_dir>/<machine>/<benchmark>`.
    pub fn bench_dir(&self, benchmark: &str) -> PathBuf {
        self.results_dir.join(&self.machine).join(benchmark)
    }
}

#[typetag::serde(tag = "type")]
#[async_trait::async_trait]
pub trait Figure: Debug + DynClone + Downcast + Send + Sync {
    /// Benchmark this figure belongs to; output lands in `figs/<benchmark>/`.
    fn benchmark(&self) -> &'static str;
    /// Output file stem; `weak` becomes `weak_<machine>.html`.
    fn stem(&self) -> &'static str;
    /// Extracts the logs, aggregates, and writes the figure.
    async fn render(&self, ctx: &RenderContext) -> Result<()>;
}
clone_trait_object!(Figure);
impl_downcast!(Figure);
