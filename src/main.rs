use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use maskstock::aggregate::{daily_totals, DailyTotal, StockRow};
use maskstock::config::{Config, ConfigOverrides};
use maskstock::output::csv::{daily_to_csv, stock_rows_to_csv};
use maskstock::output::json::render_json;
use maskstock::output::table::{render_daily_table, render_stock_table};
use maskstock::provider::run_refresh_cycle;
use maskstock::server::run_server;
use maskstock::source::{download_to, is_remote};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StockView {
    /// Latest observation per point of interest.
    Pois,
    /// Latest observation per point of interest per calendar day.
    ByDay,
    /// Total masks per calendar day.
    Daily,
}

#[derive(Debug, Parser)]
#[command(name = "maskstock", about = "Macao mask stock dashboard service")]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the raw table source (URL or local path).
    #[arg(short, long)]
    source: Option<String>,
    /// Override the low-stock alert threshold.
    #[arg(short, long)]
    threshold: Option<i64>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the dashboard API server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one refresh cycle and print a derived view.
    Show {
        /// Source for this run only; defaults to the configured one.
        #[arg(long)]
        input: Option<String>,
        #[arg(long, value_enum, default_value_t = StockView::Pois)]
        view: StockView,
    },
    /// Download the raw source object to a local file, as published.
    Fetch {
        #[arg(short = 'O', long, default_value = "df_full.gz")]
        output: PathBuf,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        source_url: cli.source.clone(),
        low_stock_threshold: cli.threshold,
        refresh_interval_secs: None,
    });

    match &cli.command {
        Commands::Config { init, show } => handle_config_command(*init, *show, &config, &config_path),
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, addr).await
        }
        Commands::Fetch { output } => {
            if !is_remote(&config.source.url) {
                return Err(anyhow!(
                    "fetch needs an http(s) source, got: {}",
                    config.source.url
                ));
            }
            let written =
                download_to(&config.source.url, output, config.source.request_timeout()).await?;
            println!("Wrote {written} bytes to {}", output.display());
            Ok(())
        }
        Commands::Show { input, view } => {
            if let Some(input) = input {
                config.source.url = input.clone();
            }
            let snapshot = run_refresh_cycle(&config).await?;
            match view {
                StockView::Pois => print_stock(&snapshot.tables.most_recent, cli.output),
                StockView::ByDay => print_stock(&snapshot.tables.by_poi_and_day, cli.output),
                StockView::Daily => {
                    print_daily(&daily_totals(&snapshot.tables.by_poi_and_day), cli.output)
                }
            }
        }
    }
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn print_stock(rows: &[StockRow], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_stock_table(rows)),
        OutputFormat::Json => println!("{}", render_json(rows)?),
        OutputFormat::Csv => println!("{}", stock_rows_to_csv(rows)?),
    }
    Ok(())
}

fn print_daily(series: &[DailyTotal], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_daily_table(series)),
        OutputFormat::Json => println!("{}", render_json(series)?),
        OutputFormat::Csv => println!("{}", daily_to_csv(series)?),
    }
    Ok(())
}
