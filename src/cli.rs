//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::console_report::ConsoleReport;
use crate::adapters::csv_adapter::{read_bars, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{validate_backend_config, validate_config};
use crate::domain::cycle::{Cycle, CycleSettings, DEFAULT_LOOKBACK_DAYS};
use crate::domain::error::BreakoutError;
use crate::domain::ohlcv::Bar;
use crate::domain::params::{
    ModelParams, DEFAULT_REWARD_RISK_RATIO, DEFAULT_SCORE_THRESHOLD, DEFAULT_SELECTION_COUNT,
    DEFAULT_VOLATILITY_MULTIPLIER,
};
use crate::domain::retrain::{
    DEFAULT_ACCURACY_THRESHOLD, DEFAULT_MIN_SAMPLES, DEFAULT_TRAILING_CYCLES, DEFAULT_WINDOW,
};
use crate::domain::trading_days::{is_trading_day, next_trading_day};
use crate::domain::universe::Universe;
use crate::ports::bar_port::BarSource;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;
use crate::ports::store_port::RecordStore;

#[derive(Parser, Debug)]
#[command(name = "breakout", about = "Daily breakout scorer with self-tuning price levels")]
pub struct Cli {
    /// Force debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the schema and seed model parameters
    Init {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load daily bars from a CSV file into the store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Score the universe and store levels for the next trading day
    Predict {
        #[arg(short, long)]
        config: PathBuf,
        /// Issue date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Label predictions that targeted a session
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        /// Session date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Daily job: analyze the session, then predict the next one
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show current model parameters
    Params {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show recent evaluation metrics
    History {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Init { config }
            | Command::Import { config, .. }
            | Command::Predict { config, .. }
            | Command::Analyze { config, .. }
            | Command::Run { config, .. }
            | Command::Params { config }
            | Command::History { config, .. } => config,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let config = match load_config(cli.command.config_path()) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_logging(cli.verbose, &config);

    let result = match cli.command {
        Command::Init { .. } => run_init(&config),
        Command::Import {
            instrument, file, ..
        } => run_import(&config, &instrument, &file),
        Command::Predict { date, .. } => run_predict(&config, date.unwrap_or_else(today)),
        Command::Analyze { date, .. } => run_analyze(&config, date.unwrap_or_else(today)),
        Command::Run { date, .. } => run_daily(&config, date.unwrap_or_else(today)),
        Command::Params { .. } => run_params(&config),
        Command::History { limit, .. } => run_history(&config, limit),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// `--verbose` wins, then `RUST_LOG`, then `[logging] level`, then info.
pub fn log_filter(verbose: bool, config: &dyn ConfigPort) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            config
                .get_string("logging", "level")
                .unwrap_or_else(|| "info".to_string()),
        )
    })
}

fn init_logging(verbose: bool, config: &dyn ConfigPort) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, config))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Baseline parameters from `[model]`, used to seed an empty store.
pub fn build_params(config: &dyn ConfigPort) -> ModelParams {
    ModelParams {
        volatility_multiplier: config.get_double(
            "model",
            "volatility_multiplier",
            DEFAULT_VOLATILITY_MULTIPLIER,
        ),
        reward_risk_ratio: config.get_double("model", "reward_risk_ratio", DEFAULT_REWARD_RISK_RATIO),
        score_threshold: config.get_double("model", "score_threshold", DEFAULT_SCORE_THRESHOLD),
        selection_count: config
            .get_count("model", "selection_count", DEFAULT_SELECTION_COUNT)
            .max(1),
    }
}

pub fn build_settings(config: &dyn ConfigPort) -> CycleSettings {
    CycleSettings {
        lookback_days: config.get_count("scoring", "lookback_days", DEFAULT_LOOKBACK_DAYS),
        accuracy_threshold: config.get_double("retrain", "accuracy_threshold", DEFAULT_ACCURACY_THRESHOLD),
        trailing_cycles: config.get_count("retrain", "trailing_cycles", DEFAULT_TRAILING_CYCLES),
        retrain_window: config.get_count("retrain", "window", DEFAULT_WINDOW),
        min_retrain_samples: config.get_count("retrain", "min_samples", DEFAULT_MIN_SAMPLES),
    }
}

pub fn resolve_codes(config: &dyn ConfigPort) -> Result<Vec<String>, BreakoutError> {
    let codes = config
        .get_string("universe", "codes")
        .ok_or_else(|| BreakoutError::ConfigMissing {
            section: "universe".into(),
            key: "codes".into(),
        })?;
    let universe = Universe::parse(&codes)?;
    debug!("Universe has {} instruments", universe.count());
    Ok(universe.codes)
}

/// Configured store backend. Doubles as the bar source when `[bars] source`
/// is `store`.
pub enum Backend {
    #[cfg(feature = "sqlite")]
    Sqlite(crate::adapters::sqlite_adapter::SqliteAdapter),
    #[cfg(feature = "postgres")]
    Postgres(crate::adapters::postgres_adapter::PostgresAdapter),
}

impl Backend {
    /// Connect and make sure the schema exists.
    pub fn open(config: &dyn ConfigPort) -> Result<Self, BreakoutError> {
        let name = config.get_choice("store", "backend", "sqlite");

        let backend = match name.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => Backend::Sqlite(crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?),
            #[cfg(feature = "postgres")]
            "postgres" => Backend::Postgres(crate::adapters::postgres_adapter::PostgresAdapter::from_config(config)?),
            other => {
                return Err(BreakoutError::ConfigInvalid {
                    section: "store".into(),
                    key: "backend".into(),
                    reason: format!("backend '{}' is not compiled in", other),
                });
            }
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    pub fn store(&self) -> &dyn RecordStore {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(a) => a,
            #[cfg(feature = "postgres")]
            Backend::Postgres(a) => a,
        }
    }

    pub fn bars(&self) -> &dyn BarSource {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(a) => a,
            #[cfg(feature = "postgres")]
            Backend::Postgres(a) => a,
        }
    }

    fn initialize_schema(&self) -> Result<(), BreakoutError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(a) => a.initialize_schema(),
            #[cfg(feature = "postgres")]
            Backend::Postgres(a) => a.initialize_schema(),
        }
    }

    pub fn seed_params(&self, params: &ModelParams) -> Result<(), BreakoutError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(a) => a.seed_params(params),
            #[cfg(feature = "postgres")]
            Backend::Postgres(a) => a.seed_params(params),
        }
    }

    pub fn insert_bars(&self, bars: &[Bar]) -> Result<usize, BreakoutError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(a) => a.insert_bars(bars),
            #[cfg(feature = "postgres")]
            Backend::Postgres(a) => a.insert_bars(bars),
        }
    }
}

/// Bar source selected by `[bars] source`.
pub fn open_bar_source<'a>(
    config: &dyn ConfigPort,
    backend: &'a Backend,
) -> Result<Box<dyn BarSource + 'a>, BreakoutError> {
    match config.get_choice("bars", "source", "store").as_str() {
        "csv" => {
            let dir = config
                .get_string("bars", "csv_dir")
                .ok_or_else(|| BreakoutError::ConfigMissing {
                    section: "bars".into(),
                    key: "csv_dir".into(),
                })?;
            Ok(Box::new(CsvAdapter::new(PathBuf::from(dir))))
        }
        _ => Ok(Box::new(BackendBars(backend))),
    }
}

struct BackendBars<'a>(&'a Backend);

impl BarSource for BackendBars<'_> {
    fn fetch_daily_bars(
        &self,
        instrument: &str,
        as_of: NaiveDate,
        lookback_days: usize,
    ) -> Result<Vec<Bar>, BreakoutError> {
        self.0.bars().fetch_daily_bars(instrument, as_of, lookback_days)
    }

    fn fetch_intraday_bars(&self, instrument: &str, date: NaiveDate) -> Result<Vec<Bar>, BreakoutError> {
        self.0.bars().fetch_intraday_bars(instrument, date)
    }
}

fn run_init(config: &dyn ConfigPort) -> Result<(), BreakoutError> {
    validate_config(config)?;
    let backend = Backend::open(config)?;
    let params = build_params(config);
    backend.seed_params(&params)?;
    info!("Store initialized");
    ConsoleReport.params(&backend.store().get_params()?)
}

fn run_import(config: &dyn ConfigPort, instrument: &str, file: &Path) -> Result<(), BreakoutError> {
    validate_backend_config(config)?;
    let backend = Backend::open(config)?;
    let instrument = instrument.trim().to_uppercase();

    let bars = read_bars(file, &instrument)?;
    let total = bars.len();
    let (good, bad): (Vec<Bar>, Vec<Bar>) = bars.into_iter().partition(|b| b.is_well_formed());
    for bar in &bad {
        warn!("Skipping malformed {} bar on {}", instrument, bar.date);
    }

    let written = backend.insert_bars(&good)?;
    info!("Imported {} of {} bars for {} from {}", written, total, instrument, file.display());
    Ok(())
}

fn run_predict(config: &dyn ConfigPort, issued: NaiveDate) -> Result<(), BreakoutError> {
    validate_config(config)?;
    let backend = Backend::open(config)?;
    let bars = open_bar_source(config, &backend)?;
    let codes = resolve_codes(config)?;
    let cycle = Cycle::new(bars.as_ref(), backend.store(), &codes, build_settings(config));

    let predictions = cycle.run_scoring_cycle(next_trading_day(issued), issued)?;
    ConsoleReport.predictions(&predictions)
}

fn run_analyze(config: &dyn ConfigPort, date: NaiveDate) -> Result<(), BreakoutError> {
    validate_config(config)?;
    let backend = Backend::open(config)?;
    let bars = open_bar_source(config, &backend)?;
    let codes = resolve_codes(config)?;
    let cycle = Cycle::new(bars.as_ref(), backend.store(), &codes, build_settings(config));

    let report = cycle.run_analysis_cycle(date)?;
    ConsoleReport.analysis(&report)
}

fn run_daily(config: &dyn ConfigPort, date: NaiveDate) -> Result<(), BreakoutError> {
    if !is_trading_day(date) {
        info!("{} is not a trading day, nothing to do", date);
        return Ok(());
    }
    validate_config(config)?;
    let backend = Backend::open(config)?;
    let bars = open_bar_source(config, &backend)?;
    let codes = resolve_codes(config)?;
    let cycle = Cycle::new(bars.as_ref(), backend.store(), &codes, build_settings(config));

    let report = cycle.run_analysis_cycle(date)?;
    ConsoleReport.analysis(&report)?;

    let predictions = cycle.run_scoring_cycle(next_trading_day(date), date)?;
    ConsoleReport.predictions(&predictions)
}

fn run_params(config: &dyn ConfigPort) -> Result<(), BreakoutError> {
    validate_backend_config(config)?;
    let backend = Backend::open(config)?;
    ConsoleReport.params(&backend.store().get_params()?)
}

fn run_history(config: &dyn ConfigPort, limit: usize) -> Result<(), BreakoutError> {
    validate_backend_config(config)?;
    let backend = Backend::open(config)?;
    ConsoleReport.history(&backend.store().get_metrics(limit)?)
}
