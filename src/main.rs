use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgGroup, CommandFactory, Parser, ValueEnum};
use sensibo_watch::format::{describe_ac_state, format_local_time, TemperatureDisplay, Unit};
use sensibo_watch::{
    apply_ac_changes, AcChange, AcMode, Error, FailurePolicy, FanLevel, MessageLogMode, Pod,
    PodDirectory, SensiboClient, Thresholds, Watcher, DEFAULT_BASE_URL,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sensibo-watch")]
#[command(version, about = "Query Sensibo pods or keep rooms within a temperature range", long_about = None)]
#[command(group(ArgGroup::new("run_mode").args(["basic", "watcher"])))]
struct Cli {
    /// Sensibo API key
    api_key: String,

    /// Basic mode: print pods, temperatures and AC state, then exit
    #[arg(short, long)]
    basic: bool,

    /// Temperature watcher mode: keep every pod within range until interrupted
    #[arg(short, long)]
    watcher: bool,

    /// Room name of the pod to query (basic mode; defaults to the first pod)
    #[arg(short, long, conflicts_with_all = ["all", "watcher"])]
    device: Option<String>,

    /// Query every pod (basic mode)
    #[arg(short, long, conflicts_with = "watcher")]
    all: bool,

    /// AC turn off temperature, °C
    #[arg(long = "low-temperature", visible_alias = "lo", default_value_t = 23)]
    low_t: i32,

    /// AC turn on temperature, °C
    #[arg(long = "high-temperature", visible_alias = "hi", default_value_t = 25)]
    high_t: i32,

    /// AC operation temperature, °C
    #[arg(long = "operation-temperature", visible_alias = "op", default_value_t = 17)]
    op_t: i32,

    /// Seconds between watcher poll cycles
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// What the watcher does when a poll fails
    #[arg(long, value_enum, default_value_t = OnError::Stop)]
    on_error: OnError,

    /// Consecutive failed cycles tolerated before the watcher stops
    #[arg(long, default_value_t = 5)]
    max_failures: u32,

    /// Seconds to wait after a failed cycle when tolerating failures
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    backoff: u64,

    /// Temperature display unit
    #[arg(long, value_enum, default_value_t = UnitArg::Celsius)]
    unit: UnitArg,

    /// Omit unit suffixes from temperatures
    #[arg(long)]
    terse: bool,

    /// Show the last N AC state changes (basic mode)
    #[arg(long, value_name = "N", conflicts_with = "watcher")]
    history: Option<u32>,

    /// Switch the AC on or off (basic mode)
    #[arg(long, value_enum, conflicts_with = "watcher")]
    power: Option<Power>,

    /// Set the AC target temperature (basic mode)
    #[arg(long, conflicts_with = "watcher")]
    target: Option<i32>,

    /// Set the AC mode: cool, heat, fan, dry, auto (basic mode)
    #[arg(long, value_parser = parse_mode, conflicts_with = "watcher")]
    mode: Option<AcMode>,

    /// Set the AC fan level, e.g. auto, low, medium, high (basic mode)
    #[arg(long, value_parser = parse_fan, conflicts_with = "watcher")]
    fan: Option<FanLevel>,

    /// API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Append every request and response to this NDJSON file
    #[arg(long, value_name = "PATH")]
    message_log: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnError {
    Stop,
    Tolerate,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Celsius,
    Fahrenheit,
    Both,
}

#[derive(Clone, Copy, ValueEnum)]
enum Power {
    On,
    Off,
}

fn parse_mode(s: &str) -> std::result::Result<AcMode, String> {
    AcMode::from_api_str(s).ok_or_else(|| format!("unknown AC mode: {s}"))
}

fn parse_fan(s: &str) -> std::result::Result<FanLevel, String> {
    FanLevel::from_api_str(s).ok_or_else(|| format!("unknown fan level: {s}"))
}

impl Cli {
    fn display(&self) -> TemperatureDisplay {
        let unit = match self.unit {
            UnitArg::Celsius => Unit::Celsius,
            UnitArg::Fahrenheit => Unit::Fahrenheit,
            UnitArg::Both => Unit::Both,
        };
        TemperatureDisplay::new(unit, self.terse)
    }

    fn requested_changes(&self) -> Vec<AcChange> {
        let mut changes = Vec::new();
        if let Some(power) = self.power {
            changes.push(AcChange::On(matches!(power, Power::On)));
        }
        if let Some(mode) = self.mode {
            changes.push(AcChange::Mode(mode));
        }
        if let Some(target) = self.target {
            changes.push(AcChange::TargetTemperature(target));
        }
        if let Some(fan) = self.fan {
            changes.push(AcChange::FanLevel(fan));
        }
        changes
    }

    fn failure_policy(&self) -> FailurePolicy {
        match self.on_error {
            OnError::Stop => FailurePolicy::StopOnError,
            OnError::Tolerate => FailurePolicy::Tolerate {
                max_consecutive_failures: self.max_failures.max(1),
                backoff: Duration::from_secs(self.backoff),
            },
        }
    }

    fn client(&self) -> sensibo_watch::Result<SensiboClient> {
        let mut builder = SensiboClient::builder(&self.api_key).base_url(&self.base_url);
        if let Some(ref path) = self.message_log {
            builder = builder.message_log(MessageLogMode::Full, path.to_string_lossy());
        }
        builder.build()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if !cli.basic && !cli.watcher {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = if cli.basic {
        run_basic(&cli).await
    } else {
        run_watcher(&cli).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Pods basic mode reports on: every pod, the named one, or the first listed.
fn select_pods(
    pods: &PodDirectory,
    all: bool,
    device: Option<&str>,
) -> sensibo_watch::Result<Vec<Pod>> {
    if all {
        return Ok(pods.iter().cloned().collect());
    }
    if let Some(name) = device {
        let id = pods.resolve(name)?;
        return Ok(vec![Pod {
            id: id.clone(),
            name: name.to_string(),
        }]);
    }
    let first = pods
        .first()
        .ok_or_else(|| Error::MissingData("pods on this account".to_string()))?;
    Ok(vec![first.clone()])
}

async fn run_basic(cli: &Cli) -> sensibo_watch::Result<()> {
    let client = cli.client()?;
    let display = cli.display();

    let pods = client.list_devices().await?;
    let listing: Vec<String> = pods.iter().map(|p| format!("{} ({})", p.name, p.id)).collect();
    println!("All pods: {}", listing.join(", "));

    let selected = select_pods(&pods, cli.all, cli.device.as_deref())?;

    let changes = cli.requested_changes();
    for pod in &selected {
        let measurement = client.get_measurement(&pod.id).await?;
        let mut line = format!("{}: {}", pod.name, display.format_measurement(&measurement)?);
        if let Some(humidity) = measurement.humidity {
            line.push_str(&format!(", humidity {humidity:.1}%"));
        }
        if let Some(time) = measurement.time {
            line.push_str(&format!(" at {}", format_local_time(time.time)));
        }
        println!("{line}");

        let last = client.get_ac_state(&pod.id).await?;
        println!(
            "Last AC change {} and was caused by {}",
            if last.succeeded() { "was successful" } else { "failed" },
            last.reason
        );
        println!("and set the AC to {}", describe_ac_state(&last.ac_state));

        if let Some(limit) = cli.history {
            for record in client.get_ac_states(&pod.id, limit).await? {
                let when = record
                    .time
                    .map(|t| format_local_time(t.time))
                    .unwrap_or_else(|| "unknown time".to_string());
                println!(
                    "  {when}  {:<8} {:<16} {} [{}]",
                    record.status,
                    record.reason,
                    describe_ac_state(&record.ac_state),
                    record.changed_properties.join(", ")
                );
            }
        }

        if !changes.is_empty() {
            let updated = apply_ac_changes(&client, &pod.id, &last.ac_state, &changes).await?;
            println!("Changed AC state of {} to {}", pod.name, describe_ac_state(&updated));
        }
    }

    Ok(())
}

async fn run_watcher(cli: &Cli) -> sensibo_watch::Result<()> {
    let thresholds = Thresholds::new(cli.low_t, cli.high_t, cli.op_t)?;
    let client = cli.client()?;

    let watcher = Watcher::builder(client, thresholds)
        .interval(Duration::from_secs(cli.interval))
        .failure_policy(cli.failure_policy())
        .span(tracing::info_span!(
            "watcher",
            low = thresholds.low(),
            high = thresholds.high(),
            op = thresholds.operating()
        ))
        .build();

    watcher
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("cannot listen for interrupt: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
