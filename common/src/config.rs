use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::figure::Figure;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Machine the logs were collected on; first path component under
    /// `results_dir` and suffix of every figure filename.
    pub machine: String,
    pub results_dir: PathBuf,
    pub figs_dir: PathBuf,
    pub figures: Vec<FigureEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureEntry {
    pub name: String,
    pub figure: Box<dyn Figure>,
}
