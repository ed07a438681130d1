use anyhow::{bail, Context};
use autotrader::broker::{BrokerGateway, PaperBroker};
use autotrader::config::{credentials_from_env, Settings};
use autotrader::engine::{EngineEvent, EngineState, EngineSummary, TradingEngine};
use autotrader::market::{BarStore, WindowBuilder};
use autotrader::models::Timeframe;
use autotrader::predictor::{Predictor, TrainingReport};
use autotrader::report::CsvReportExporter;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(name = "autotrader", version, about = "Bar-driven autonomous trading engine")]
struct Cli {
    /// Settings file (TOML). Defaults to ./autotrader.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train on history, then trade against the paper broker until Ctrl+C
    Run {
        #[arg(long)]
        symbol: Option<String>,

        #[arg(long)]
        timeframe: Option<Timeframe>,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Fit the predictor on history and print validation metrics
    Train {
        /// Print the training report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Command::Run {
            symbol,
            timeframe,
            ticks,
        } => {
            if let Some(symbol) = symbol {
                settings.engine.symbol = symbol;
            }
            if let Some(timeframe) = timeframe {
                settings.engine.timeframe = timeframe;
            }
            if ticks.is_some() {
                settings.engine.max_ticks = ticks;
            }
            settings.validate().context("invalid settings")?;
            run(settings).await
        }
        Command::Train { json } => train(settings, json).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autotrader=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!("🚀 autotrader starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Symbol: {} ({})", settings.engine.symbol, settings.engine.timeframe);
    tracing::info!("  Tick interval: {} ms", settings.engine.tick_interval_ms);
    tracing::info!("  Window: {} bars", settings.engine.window);
    tracing::info!("  Tax rate: {}%", settings.trading.tax_rate * 100.0);
    tracing::info!("  Reports: {}", settings.engine.report_dir.display());

    let broker = PaperBroker::new(settings.paper.clone());
    let exporter = CsvReportExporter::new(settings.engine.report_dir.clone());

    let (handle, events) =
        TradingEngine::new(settings.engine, Box::new(broker), credentials_from_env())
            .with_trading(settings.trading)
            .with_predictor(settings.model)
            .with_exporter(exporter)
            .spawn();

    let observer = tokio::spawn(observe(events));
    let mut state = handle.subscribe_state();

    tracing::info!("Press Ctrl+C to stop...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
            handle.stop();
        }
        _ = state.wait_for(|s| s.is_terminal()) => {}
    }

    let summary = handle.join().await.context("trading worker crashed")?;
    // Ends once the worker drops its event sender
    let _ = observer.await;

    print_summary(&summary);
    if summary.state == EngineState::Failed {
        bail!(
            "engine failed: {}",
            summary.last_fault.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn train(settings: Settings, json: bool) -> anyhow::Result<()> {
    let engine = &settings.engine;

    let mut broker = PaperBroker::new(settings.paper.clone());
    broker
        .connect(&credentials_from_env())
        .await
        .context("broker login failed")?;
    let history = broker
        .fetch_bars(&engine.symbol, engine.timeframe, engine.history_bars)
        .await
        .with_context(|| format!("failed to fetch history for {}", engine.symbol))?;
    broker.disconnect().await;

    let mut store = BarStore::new(engine.store_capacity);
    store.extend(history);
    let bars = store.snapshot();
    let windows: Vec<_> = WindowBuilder::new(engine.window)
        .with_max_gap(engine.timeframe.max_gap())
        .build(&bars)
        .collect();

    let mut predictor = Predictor::new(settings.model.clone());
    let report = predictor.fit(&windows).context("training failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_training(&engine.symbol, &report);
    }
    Ok(())
}

async fn observe(mut events: UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Status(text) => tracing::info!("📣 {}", text),
            EngineEvent::AccountInfo { balance, equity } => {
                tracing::info!("💰 Balance: {:.2} | Equity: {:.2}", balance, equity)
            }
            EngineEvent::TradeInfo(info) => tracing::info!(
                "📈 Open Price: {} | Current Value: {} | P/L: {} | Predicted: {}",
                field(info.open_price, 5),
                field(info.current_value, 5),
                info.profit_loss_pct
                    .map(|pct| format!("{:+.2}%", pct))
                    .unwrap_or_else(|| "N/A".to_string()),
                field(info.predicted_price, 5),
            ),
            EngineEvent::Loading(true) => tracing::info!("⏳ Loading..."),
            EngineEvent::Loading(false) => {}
            EngineEvent::StateChanged(state) => tracing::debug!("State: {}", state),
        }
    }
}

fn field(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "N/A".to_string())
}

fn print_training(symbol: &str, report: &TrainingReport) {
    println!("\n=== Training report: {} ===", symbol);
    println!("Windows:            {}", report.windows);
    println!("Train samples:      {}", report.train_samples);
    println!("Validation samples: {}", report.validation_samples);
    println!("Train MSE:          {:.6}", report.train_mse);
    println!("Validation MSE:     {}", field(report.validation_mse, 6));
    println!(
        "Close range:        {:.5} .. {:.5}",
        report.close_min, report.close_max
    );
}

fn print_summary(summary: &EngineSummary) {
    let closed = summary
        .trades
        .iter()
        .filter(|t| t.profit_loss.is_some())
        .count();

    tracing::info!("\n📋 Session summary:");
    tracing::info!("  Final state: {}", summary.state);
    tracing::info!("  Ticks: {}", summary.ticks);
    tracing::info!("  Closed trades: {}", closed);
    tracing::info!("  Total P/L: {:.5}", summary.total_pnl);
    if let Some(last) = summary.equity.last() {
        tracing::info!("  Balance: {:.2} | Equity: {:.2}", last.balance, last.equity);
    }
    if let Some(fault) = &summary.last_fault {
        tracing::info!("  Last fault: {}", fault);
    }
    tracing::info!("👋 autotrader stopped");
}
