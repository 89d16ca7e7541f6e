use common::{config::Config, figure::RenderContext};
use console::style;
use eyre::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::read_to_string;
use tracing::debug;

pub async fn render(config_file: &str, only: &[String], dump_tables: bool) -> Result<()> {
    let config: Config = serde_yml::from_str(
        &read_to_string(config_file)
            .await
            .with_context(|| format!("read {config_file}"))?,
    )?;
    render_config(&config, only, dump_tables).await
}

pub async fn render_config(config: &Config, only: &[String], dump_tables: bool) -> Result<()> {
    for name in only {
        if !config.figures.iter().any(|e| &e.name == name) {
            bail!("No figure named {name} in the config");
        }
    }
    let selected: Vec<_> = config
        .figures
        .iter()
        .filter(|e| only.is_empty() || only.contains(&e.name))
        .collect();

    let ctx = RenderContext {
        machine: config.machine.clone(),
        results_dir: config.results_dir.clone(),
        figs_dir: config.figs_dir.clone(),
        dump_tables,
    };

    let bar = ProgressBar::new(selected.len() as u64)
        .with_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
    for entry in selected {
        bar.set_message(entry.name.clone());
        entry
            .figure
            .render(&ctx)
            .await
            .with_context(|| format!("render figure {}", entry.name))?;
        debug!("Rendered {}", entry.name);
        bar.inc(1);
    }
    bar.finish_and_clear();
    println!(
        "{}",
        style(format!("Figures written to {}", config.figs_dir.display())).blue()
    );
    Ok(())
}
