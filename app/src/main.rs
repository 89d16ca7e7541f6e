use clap::{Parser, Subcommand};
use common::config::Config;
use eyre::Result;
use tokio::fs::read_to_string;
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod render;
mod serve;
mod watch;

const MODULES: &[&str] = &[
    "common",
    "plot_common",
    "cilksort_getput",
    "exafmm_sbsize",
    "exafmm_weak",
    "uts_perf",
];

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List figures declared in the config
    Ls {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
    },
    /// Render figures to HTML
    Render {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
        /// Only render the named figures
        #[arg(short, long)]
        fig: Vec<String>,
        /// Dump extracted tables as CSV next to the figures
        #[arg(long, default_value_t = false)]
        dump_data: bool,
    },
    /// Re-render on filesystem changes and serve the figures over HTTP
    Watch {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: String,
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("bench_plot={log_level}"));
    if !args.log.is_empty() {
        for log in &args.log {
            env_filter = env_filter.add_directive(log.parse()?);
        }
    }
    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    default_figs::init_figs();

    match args.command {
        Commands::Ls { config_file } => ls(&config_file).await?,
        Commands::Render {
            config_file,
            fig,
            dump_data,
        } => {
            if let Err(err) = render::render(&config_file, &fig, dump_data).await {
                error!("{err:#?}");
                return Err(err);
            }
        }
        Commands::Watch { config_file, addr } => watch::watch(&config_file, &addr).await?,
    };

    Ok(())
}

async fn ls(config_file: &str) -> Result<()> {
    let config: Config = serde_yml::from_str(&read_to_string(config_file).await?)?;
    for entry in &config.figures {
        println!(
            "{} -> {}/{}/{}_{}.html",
            entry.name,
            config.figs_dir.display(),
            entry.figure.benchmark(),
            entry.figure.stem(),
            config.machine
        );
    }
    Ok(())
}
