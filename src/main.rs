use anyhow::{anyhow, Context, Result};
use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::Mutex;

use veloscore::backfill::BackfillJob;
use veloscore::config::EngineConfig;
use veloscore::export;
use veloscore::logging::{init_logging, LogLevel};
use veloscore::models::{
    ActivityRecord, AthleteProfile, DailyPhysioRecord, IllnessSeverity, SleepSession,
};
use veloscore::pipeline::ScoringPipeline;
use veloscore::providers::{dedup_key, DataProvider, ProviderChain, StaticProvider};
use veloscore::store::Store;
use veloscore::summary::DailySummary;
use veloscore::zones::{estimate_vo2max, hr_zones, FtpEstimator};

/// VeloScore - daily recovery, sleep, and strain scoring
///
/// Scores each day from activities, overnight physiology, and sleep
/// sessions, and maintains the CTL/ATL/TSB training-load chain.
#[derive(Parser)]
#[command(name = "veloscore")]
#[command(version = "0.1.0")]
#[command(about = "Daily physiological scoring and training-load engine", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the athlete profile
    Athlete {
        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Functional Threshold Power in watts
        #[arg(long)]
        ftp: Option<u16>,

        /// Maximum heart rate in bpm
        #[arg(long)]
        max_hr: Option<u16>,

        /// Resting heart rate in bpm
        #[arg(long)]
        resting_hr: Option<u16>,

        /// Body weight in kilograms
        #[arg(long)]
        weight: Option<f64>,

        /// Nightly sleep need in minutes
        #[arg(long)]
        sleep_need: Option<f64>,
    },

    /// Import normalized records from a JSON file into the store
    Import {
        /// JSON file with activities, physio, and sleep arrays
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Score a single day
    Score {
        /// Date to score (YYYY-MM-DD, default today)
        #[arg(short, long)]
        date: Option<String>,

        /// JSON data file served through the provider chain
        #[arg(long)]
        data: Option<PathBuf>,

        /// Overwrite even a higher-confidence persisted score
        #[arg(long)]
        force: bool,
    },

    /// Backfill a window of days from all sources
    Backfill {
        /// Window length in days
        #[arg(short, long, default_value = "30")]
        days: u16,

        /// Window end date (YYYY-MM-DD, default today)
        #[arg(short, long)]
        end: Option<String>,

        /// JSON data file served through the provider chain
        #[arg(long)]
        data: Option<PathBuf>,

        /// Overwrite higher-confidence persisted scores
        #[arg(long)]
        force: bool,
    },

    /// Estimate FTP and derived zones from recorded power data
    Zones {
        /// Estimate as of this date (YYYY-MM-DD, default today)
        #[arg(long)]
        as_of: Option<String>,

        /// Apply the estimate to the athlete profile
        #[arg(long)]
        apply: bool,
    },

    /// Show recent scores and the load chain
    Trends {
        /// Days to show
        #[arg(short, long, default_value = "14")]
        days: u16,
    },

    /// Export scores, loads, or summaries
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// What to export
        #[arg(short = 'w', long, value_enum, default_value_t = ExportKind::Scores)]
        what: ExportKind,

        /// Range start (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Range end (YYYY-MM-DD)
        #[arg(long)]
        to: String,
    },

    /// Show store and configuration status
    Status {
        /// Emit machine-readable JSON instead of the text report
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        /// Write the default config file
        #[arg(long)]
        init: bool,

        /// Print the active configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportKind {
    Scores,
    Loads,
    Summaries,
}

/// Normalized records served through a file-backed provider
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DataFile {
    activities: Vec<ActivityRecord>,
    physio: Vec<DailyPhysioRecord>,
    sleep: Vec<SleepSession>,
}

impl DataFile {
    fn load(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("cannot parse {}", path.display()))
    }

    fn into_provider(self) -> StaticProvider {
        let mut provider = StaticProvider::default();
        provider.activities = self.activities;
        provider.physio = self.physio;
        provider.sleep = self.sleep;
        provider
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load_or_default()?,
    };
    if cli.verbose > 0 {
        config.log.level = match cli.verbose {
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        };
    }
    init_logging(&config.log)?;

    match cli.command {
        Commands::Athlete {
            name,
            ftp,
            max_hr,
            resting_hr,
            weight,
            sleep_need,
        } => {
            let store = open_store(&config)?;
            let mut profile = store
                .first_athlete()?
                .unwrap_or_else(|| AthleteProfile::new(name.as_deref().unwrap_or("Athlete")));

            if let Some(name) = name {
                profile.name = name;
            }
            if ftp.is_some() {
                profile.ftp = ftp;
            }
            if max_hr.is_some() {
                profile.max_hr = max_hr;
            }
            if resting_hr.is_some() {
                profile.resting_hr = resting_hr;
            }
            if weight.is_some() {
                profile.weight_kg = weight;
            }
            if let Some(need) = sleep_need {
                profile.sleep_need_minutes = need;
            }
            if let (Some(max), Some(rest)) = (profile.max_hr, profile.resting_hr) {
                profile.hr_zones = hr_zones(max, rest);
            }
            profile.updated_at = Utc::now();
            store.upsert_athlete(&profile)?;

            println!("{}", "✓ Athlete profile saved".green());
            print_profile(&profile);
        }

        Commands::Import { file } => {
            let data = DataFile::load(&file)?;
            let store = open_store(&config)?;
            let athlete = ensure_athlete(&store)?;
            let tz = config.tz();

            for record in &data.physio {
                store.upsert_physio_day(athlete.id, record)?;
            }
            for activity in &data.activities {
                store.store_activity(athlete.id, &dedup_key(activity), activity)?;
            }
            let merged_sleep =
                veloscore::pipeline::merge_sleep_durations(&store, athlete.id, &data.sleep, tz)?;

            println!(
                "{} {} activities, {} physio days, {} sleep durations merged",
                "✓ Imported".green(),
                data.activities.len(),
                data.physio.len(),
                merged_sleep
            );
        }

        Commands::Score { date, data, force } => {
            let date = parse_date_or_today(date.as_deref(), &config)?;
            let store = shared_store(&config)?;
            let athlete = {
                let guard = store.lock().await;
                ensure_athlete(&guard)?
            };
            let chain = build_chain(&config, data)?;
            let pipeline = ScoringPipeline::new(store, chain, config.clone(), athlete);

            let outcome = pipeline.score_day(date, force).await?;
            print_summary(&outcome.summary);
        }

        Commands::Backfill {
            days,
            end,
            data,
            force,
        } => {
            let end = parse_date_or_today(end.as_deref(), &config)?;
            let store = shared_store(&config)?;
            let athlete = {
                let guard = store.lock().await;
                ensure_athlete(&guard)?
            };
            let chain = build_chain(&config, data)?;
            let job = BackfillJob::new(store, chain, config.clone(), athlete);

            let bar = ProgressBar::new(days as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} days",
                )?
                .progress_chars("=>-"),
            );

            let report = job
                .run(end, days, force, |done, _total| {
                    bar.set_position(done as u64);
                })
                .await?;
            bar.finish_and_clear();

            println!(
                "{} {} days: {} written, {} kept by the confidence guard, {} failed",
                "✓ Backfill complete".green().bold(),
                report.days,
                report.written,
                report.skipped,
                report.failed
            );
        }

        Commands::Zones { as_of, apply } => {
            let as_of = parse_date_or_today(as_of.as_deref(), &config)?;
            let store = open_store(&config)?;
            let mut athlete = ensure_athlete(&store)?;
            let tz = config.tz();

            let window_start = as_of
                .checked_sub_days(Days::new(config.zones.max_lookback_days as u64 + 1))
                .unwrap_or(as_of);
            let activities = store.activities_range(
                athlete.id,
                window_start.and_hms_opt(0, 0, 0).expect("midnight").and_utc(),
                as_of.and_hms_opt(23, 59, 59).expect("end of day").and_utc(),
            )?;

            let estimator = FtpEstimator::with_config(config.zones.clone());
            match estimator.estimate(&activities, as_of, tz) {
                Some(estimate) => {
                    println!("{}", "FTP estimate".bold());
                    println!("  Watts:      {}", estimate.ftp_watts.to_string().cyan());
                    println!("  Method:     {:?}", estimate.method);
                    println!("  Confidence: {:.2}", estimate.confidence);
                    println!("  Rides used: {}", estimate.sample_count);

                    if let Some(weight) = athlete.weight_kg {
                        if let Some(vo2) = estimate_vo2max(estimate.ftp_watts, weight) {
                            println!("  Est. VO2max: {:.1} ml/kg/min", vo2);
                        }
                    }

                    if apply {
                        if estimator.apply_estimate(&mut athlete, &estimate) {
                            if let (Some(max), Some(rest)) =
                                (athlete.max_hr, athlete.resting_hr)
                            {
                                athlete.hr_zones = hr_zones(max, rest);
                            }
                            athlete.updated_at = Utc::now();
                            store.upsert_athlete(&athlete)?;
                            println!("{}", "✓ Profile updated".green());
                        } else {
                            println!(
                                "{}",
                                "Estimate confidence too low to apply; record more hard rides"
                                    .yellow()
                            );
                        }
                    }
                }
                None => println!(
                    "{}",
                    "No qualifying power data in the lookback window".yellow()
                ),
            }
        }

        Commands::Trends { days } => {
            let store = open_store(&config)?;
            let athlete = ensure_athlete(&store)?;
            let end = today_local(&config);
            let start = end
                .checked_sub_days(Days::new(days.saturating_sub(1) as u64))
                .unwrap_or(end);

            let scores = store.score_range(athlete.id, start, end)?;
            let loads = store.load_range(athlete.id, start, end)?;
            if scores.is_empty() && loads.is_empty() {
                println!("{}", "No scored days in range".yellow());
                return Ok(());
            }

            let rows: Vec<TrendRow> = loads
                .iter()
                .map(|load| {
                    let score = scores.iter().find(|s| s.date == load.date);
                    TrendRow {
                        date: load.date.to_string(),
                        recovery: score
                            .and_then(|s| s.recovery)
                            .map(|r| r.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        sleep: score
                            .and_then(|s| s.sleep)
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        strain: score
                            .and_then(|s| s.strain)
                            .map(|s| format!("{:.1}", s))
                            .unwrap_or_else(|| "-".to_string()),
                        tss: format!("{:.0}", load.tss),
                        ctl: format!("{:.1}", load.ctl),
                        atl: format!("{:.1}", load.atl),
                        tsb: format!("{:.1}", load.tsb),
                        status: score
                            .map(|s| s.status.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    }
                })
                .collect();

            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);
        }

        Commands::Export {
            output,
            what,
            from,
            to,
        } => {
            let from = parse_date(&from)?;
            let to = parse_date(&to)?;
            let store = open_store(&config)?;
            let athlete = ensure_athlete(&store)?;

            match what {
                ExportKind::Scores => {
                    let scores = store.score_range(athlete.id, from, to)?;
                    export::export_scores_csv(&scores, &output)?;
                    println!("{} {} scores to {}", "✓ Exported".green(), scores.len(), output.display());
                }
                ExportKind::Loads => {
                    let loads = store.load_range(athlete.id, from, to)?;
                    export::export_loads_csv(&loads, &output)?;
                    println!("{} {} load days to {}", "✓ Exported".green(), loads.len(), output.display());
                }
                ExportKind::Summaries => {
                    let scores = store.score_range(athlete.id, from, to)?;
                    let loads = store.load_range(athlete.id, from, to)?;
                    let summaries: Vec<DailySummary> = scores
                        .iter()
                        .filter_map(|score| {
                            loads
                                .iter()
                                .find(|l| l.date == score.date)
                                .map(|load| DailySummary::assemble(score, load, None, None))
                        })
                        .collect();
                    export::export_summaries_json(&summaries, &output)?;
                    println!("{} {} summaries to {}", "✓ Exported".green(), summaries.len(), output.display());
                }
            }
        }

        Commands::Status { json } => {
            if json {
                let store = open_store(&config)?;
                let stats = store.stats()?;
                let report = serde_json::json!({
                    "store": config.store_path(),
                    "stats": stats,
                    "athlete": store.first_athlete()?,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            let store_path = config.store_path();
            println!("{}", "VeloScore status".bold());
            println!("  Config: {}", EngineConfig::default_path().display());
            println!("  Store:  {}", store_path.display());

            let store = open_store(&config)?;
            let stats = store.stats()?;
            println!("  Athletes:    {}", stats.athletes);
            println!("  Activities:  {}", stats.activities);
            println!("  Physio days: {}", stats.physio_days);
            println!("  Load days:   {}", stats.load_days);
            println!("  Score days:  {}", stats.score_days);
            if let Some((first, last)) = stats.score_span {
                println!("  Score span:  {} to {}", first, last);
            }
            if stats.degraded_score_days > 0 {
                println!(
                    "  {}",
                    format!("{} day(s) below full confidence", stats.degraded_score_days)
                        .yellow()
                );
            }

            if let Some(profile) = store.first_athlete()? {
                print_profile(&profile);
            }
        }

        Commands::Config { init, show } => {
            if init {
                let path = config.save()?;
                println!("{} {}", "✓ Wrote".green(), path.display());
            }
            if show || !init {
                let rendered = toml::to_string_pretty(&config)
                    .map_err(|e| anyhow!("cannot render config: {}", e))?;
                println!("{}", rendered);
            }
        }
    }

    Ok(())
}

#[derive(Tabled)]
struct TrendRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Recovery")]
    recovery: String,
    #[tabled(rename = "Sleep")]
    sleep: String,
    #[tabled(rename = "Strain")]
    strain: String,
    #[tabled(rename = "TSS")]
    tss: String,
    #[tabled(rename = "CTL")]
    ctl: String,
    #[tabled(rename = "ATL")]
    atl: String,
    #[tabled(rename = "TSB")]
    tsb: String,
    #[tabled(rename = "Status")]
    status: String,
}

fn open_store(config: &EngineConfig) -> Result<Store> {
    let path = config.store_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Store::new(&path)?)
}

fn shared_store(config: &EngineConfig) -> Result<Arc<Mutex<Store>>> {
    Ok(Arc::new(Mutex::new(open_store(config)?)))
}

fn ensure_athlete(store: &Store) -> Result<AthleteProfile> {
    if let Some(profile) = store.first_athlete()? {
        return Ok(profile);
    }
    let profile = AthleteProfile::new("Athlete");
    store.upsert_athlete(&profile)?;
    eprintln!(
        "{}",
        "No athlete profile found; created a default one. Set thresholds with `veloscore athlete`."
            .yellow()
    );
    Ok(profile)
}

fn build_chain(config: &EngineConfig, data: Option<PathBuf>) -> Result<Arc<ProviderChain>> {
    let mut providers: Vec<Arc<dyn DataProvider>> = Vec::new();
    if let Some(path) = data {
        providers.push(Arc::new(DataFile::load(&path)?.into_provider()));
    }
    Ok(Arc::new(ProviderChain::new(
        providers,
        Duration::from_secs(config.providers.fetch_timeout_secs),
    )))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow!("invalid date '{}'; expected YYYY-MM-DD", s))
}

fn today_local(config: &EngineConfig) -> NaiveDate {
    Utc::now().with_timezone(&config.tz()).date_naive()
}

fn parse_date_or_today(s: Option<&str>, config: &EngineConfig) -> Result<NaiveDate> {
    match s {
        Some(s) => parse_date(s),
        None => Ok(today_local(config)),
    }
}

fn print_profile(profile: &AthleteProfile) {
    println!("{}", format!("Athlete: {}", profile.name).bold());
    println!(
        "  FTP: {}  Max HR: {}  Resting HR: {}  Weight: {}",
        opt(profile.ftp, "W"),
        opt(profile.max_hr, "bpm"),
        opt(profile.resting_hr, "bpm"),
        profile
            .weight_kg
            .map(|w| format!("{:.1} kg", w))
            .unwrap_or_else(|| "-".to_string()),
    );
    if let Some(zones) = profile.hr_zones {
        println!(
            "  HR zones: Z1<{} Z2<{} Z3<{} Z4<{} Z5<{}",
            zones.zone1_max, zones.zone2_max, zones.zone3_max, zones.zone4_max, zones.zone5_max
        );
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
    value
        .map(|v| format!("{} {}", v, unit))
        .unwrap_or_else(|| "-".to_string())
}

fn print_summary(summary: &DailySummary) {
    println!("{}", format!("── {} ──", summary.date).bold());

    match summary.recovery {
        Some(recovery) => {
            let band = summary.recovery_band.as_deref().unwrap_or("-");
            let line = format!("Recovery: {}  ({})", recovery, band);
            let colored_line = match recovery {
                80..=100 => line.green(),
                60..=79 => line.cyan(),
                40..=59 => line.yellow(),
                _ => line.red(),
            };
            println!("  {}", colored_line);
        }
        None => println!("  {}", "Recovery: insufficient data".dimmed()),
    }

    if let Some(sleep) = summary.sleep {
        println!("  Sleep:    {}", sleep);
    }
    if let Some(strain) = summary.strain {
        println!("  Strain:   {:.1}", strain);
    }
    println!(
        "  Form:     TSB {:.1} ({}), suggested TSS {}-{}",
        summary.tsb, summary.tsb_band, summary.suggested_tss_range.0, summary.suggested_tss_range.1
    );
    if let Some(delta) = summary.hrv_delta_pct {
        println!("  HRV vs baseline: {:+.1}%", delta);
    }
    if let Some(delta) = summary.rhr_delta_pct {
        println!("  RHR vs baseline: {:+.1}%", delta);
    }
    if summary.illness_severity > IllnessSeverity::None {
        println!(
            "  {}",
            format!(
                "Illness signals: {} (confidence {:.2})",
                summary.illness_severity, summary.illness_confidence
            )
            .red()
            .bold()
        );
    }
    println!("  {}", summary.guidance.italic());
}
