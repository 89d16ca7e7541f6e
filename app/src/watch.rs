use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use common::config::Config;
use console::style;
use eyre::{Context, Result};
use flume::Receiver;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::fs::read_to_string;
use tracing::{debug, error};

use crate::{render, serve};

const DEBOUNCE_MARGIN: Duration = Duration::from_secs(2);

/// Drops a repeated trigger for the same path inside the margin. Every
/// observed trigger slides the window, accepted or not.
struct Debounce {
    last_path: PathBuf,
    last_time: Option<Instant>,
    margin: Duration,
}

impl Debounce {
    fn new(margin: Duration) -> Debounce {
        Debounce {
            last_path: PathBuf::new(),
            last_time: None,
            margin,
        }
    }

    fn admit(&mut self, path: &Path, now: Instant) -> bool {
        let duplicate = self.last_path.as_path() == path
            && self.last_time.is_some_and(|t| now < t + self.margin);
        self.last_path = path.to_owned();
        self.last_time = Some(now);
        !duplicate
    }
}

/// Re-renders all figures whenever the config or a benchmark log changes, and
/// serves the figures directory over HTTP until interrupted.
pub async fn watch(config_file: &str, addr: &str) -> Result<()> {
    let config: Config = serde_yml::from_str(
        &read_to_string(config_file)
            .await
            .with_context(|| format!("read {config_file}"))?,
    )?;

    let (tx, rx) = flume::unbounded();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else { return };
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        for path in event.paths {
            let _ = tx.send(path);
        }
    })?;

    let config_path = PathBuf::from(config_file);
    let config_dir = match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
        _ => PathBuf::from("."),
    };
    watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;
    if config.results_dir.exists() {
        watcher.watch(&config.results_dir, RecursiveMode::Recursive)?;
    }

    println!(
        "{}",
        style(format!(
            "Watching '{config_file}' and '{}'; figures at http://{addr}/",
            config.results_dir.display()
        ))
        .blue()
    );

    tokio::select! {
        res = serve::serve_figs(config.figs_dir.clone(), addr.to_owned()) => res,
        res = rerender_loop(rx, config_file) => res,
    }
}

async fn rerender_loop(rx: Receiver<PathBuf>, config_file: &str) -> Result<()> {
    let mut debounce = Debounce::new(DEBOUNCE_MARGIN);
    while let Ok(path) = rx.recv_async().await {
        if path.is_dir() || !is_relevant(&path) {
            continue;
        }
        if !debounce.admit(&path, Instant::now()) {
            debug!("Debounced {}", path.display());
            continue;
        }

        println!(
            "{}",
            style(format!("Rendering for '{}'...", path.display())).blue()
        );
        // Reload so edits to the figure definitions take effect.
        let config: Config = match read_to_string(config_file).await {
            Ok(text) => match serde_yml::from_str(&text) {
                Ok(config) => config,
                Err(err) => {
                    error!("Invalid config {config_file}: {err}");
                    continue;
                }
            },
            Err(err) => {
                error!("Read config {config_file}: {err}");
                continue;
            }
        };
        // A failed render keeps the watch alive.
        match render::render_config(&config, &[], false).await {
            Ok(()) => println!("{}", style("Done.").blue()),
            Err(err) => println!("{}", style(format!("Rendering failed: {err:#}")).red()),
        }
    }
    Ok(())
}

fn is_relevant(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "out")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_drops_same_path_inside_margin() {
        let mut d = Debounce::new(Duration::from_millis(100));
        let t0 = Instant::now();
        let p = Path::new("plot/config.yaml");
        assert!(d.admit(p, t0));
        assert!(!d.admit(p, t0 + Duration::from_millis(50)));
        assert!(d.admit(p, t0 + Duration::from_millis(200)));
    }

    #[test]
    fn debounce_never_couples_distinct_paths() {
        let mut d = Debounce::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(d.admit(Path::new("a.out"), t0));
        assert!(d.admit(Path::new("b.out"), t0 + Duration::from_millis(1)));
    }

    #[test]
    fn suppressed_triggers_slide_the_window() {
        let mut d = Debounce::new(Duration::from_millis(100));
        let t0 = Instant::now();
        let p = Path::new("a.out");
        assert!(d.admit(p, t0));
        assert!(!d.admit(p, t0 + Duration::from_millis(90)));
        // Still inside the window slid by the suppressed trigger.
        assert!(!d.admit(p, t0 + Duration::from_millis(180)));
    }

    #[test]
    fn only_configs_and_logs_are_relevant() {
        assert!(is_relevant(Path::new("config.yaml")));
        assert!(is_relevant(Path::new("results/a/b/run_0.out")));
        assert!(!is_relevant(Path::new("figs/exafmm/weak.html")));
        assert!(!is_relevant(Path::new("log.log")));
    }
}
