//! cpu_vitals - CPU utilization, frequency and temperature sampler.
//!
//! A standalone binary that polls the Linux kernel counters and prints the
//! derived utilization for the aggregate and every logical core.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cpu_vitals::{
    discover, MetricsProvider, MonitorConfig, Reading, SensorDiscovery, SystemCollector,
    SystemSnapshot, UsageDetails, DEFAULT_INTERVAL_MS,
};
use futures_util::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

/// Width field names are padded to in the sensor dump.
const FIELD_NAME_WIDTH: usize = 40;

#[derive(Parser)]
#[command(name = "cpu_vitals")]
#[command(about = "CPU utilization, frequency and temperature from kernel counters")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Polling interval in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// Read every counter source below this directory instead of /
    #[arg(long)]
    root: Option<PathBuf>,

    /// Time-counter source
    #[arg(long)]
    proc_stat: Option<PathBuf>,

    /// CPU topology root
    #[arg(long)]
    cpu_root: Option<PathBuf>,

    /// Memory-totals source
    #[arg(long)]
    meminfo: Option<PathBuf>,

    /// Hardware-monitoring root
    #[arg(long)]
    hwmon_root: Option<PathBuf>,

    /// Temperature subsystem candidates, most preferred first
    #[arg(long, value_delimiter = ',')]
    sensor: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll continuously and print every tick (default)
    Watch(WatchArgs),

    /// Take one valid sample (two polls one interval apart) and exit
    Snapshot(SnapshotArgs),

    /// Dump every hardware-monitoring subsystem and its fields
    Sensors,

    /// Show discovered topology and sensors
    Info,
}

#[derive(Args, Default)]
struct WatchArgs {
    /// Stop after this many printed ticks; the unprinted baseline tick is
    /// polled first, so N printed ticks take N + 1 polls
    #[arg(short, long)]
    count: Option<u64>,
}

#[derive(Args)]
struct SnapshotArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = build_config(&cli);
    config.validate()?;

    match &cli.command {
        Some(Commands::Watch(args)) => watch_command(&config, args).await?,
        Some(Commands::Snapshot(args)) => snapshot_command(&config, args).await?,
        Some(Commands::Sensors) => sensors_command(&config),
        Some(Commands::Info) => info_command(&config)?,
        None => watch_command(&config, &WatchArgs::default()).await?,
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing::subscriber::set_global_default(build_subscriber(cli, directives.as_deref()))?;

    Ok(())
}

/// Level from the flags, refined by `RUST_LOG`-style `directives` if given.
fn build_subscriber(
    cli: &Cli,
    directives: Option<&str>,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(directives.unwrap_or_default());

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish()
}

fn build_config(cli: &Cli) -> MonitorConfig {
    let mut config = match &cli.root {
        Some(root) => MonitorConfig::with_root(root),
        None => MonitorConfig::default(),
    };
    config = config.with_interval_ms(cli.interval);

    if let Some(path) = &cli.proc_stat {
        config = config.with_proc_stat_path(path);
    }
    if let Some(path) = &cli.meminfo {
        config = config.with_meminfo_path(path);
    }
    if let Some(path) = &cli.cpu_root {
        config = config.with_cpu_root(path);
    }
    if let Some(path) = &cli.hwmon_root {
        config = config.with_hwmon_root(path);
    }
    if !cli.sensor.is_empty() {
        config = config.with_temperature_subsystems(cli.sensor.iter().cloned());
    }
    config
}

async fn watch_command(config: &MonitorConfig, args: &WatchArgs) -> anyhow::Result<()> {
    let collector = SystemCollector::new(config).context("counter discovery failed")?;
    info!(
        "Watching {} cores every {}ms",
        collector.topology().core_count(),
        config.interval_ms
    );

    let mut stream = collector.start_stream(config.interval_ms);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal, exiting...");
                break;
            }
            next = stream.next() => {
                let Some(snapshot) = next else { break };
                // The first tick only establishes the baseline.
                if snapshot.tick > 1 {
                    print_pretty_snapshot(&snapshot);
                }
                if args.count.is_some_and(|count| snapshot.tick > count) {
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn snapshot_command(config: &MonitorConfig, args: &SnapshotArgs) -> anyhow::Result<()> {
    let mut collector = SystemCollector::new(config).context("counter discovery failed")?;
    collector.poll();
    tokio::time::sleep(Duration::from_millis(config.interval_ms)).await;
    let snapshot = collector.poll();

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        "pretty" => print_pretty_snapshot(&snapshot),
        other => anyhow::bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }

    Ok(())
}

fn sensors_command(config: &MonitorConfig) {
    let subsystems = SensorDiscovery::new(&config.hwmon_root).subsystems();
    if subsystems.is_empty() {
        println!("No hardware-monitoring subsystems under {}", config.hwmon_root.display());
        return;
    }

    for subsystem in subsystems {
        println!("{} (hwmon{}):", subsystem.name, subsystem.index);
        for (field, value) in subsystem.fields() {
            let padding = ".".repeat(FIELD_NAME_WIDTH.saturating_sub(field.len()));
            println!("\t{}{}{}", field, padding, value);
        }
        println!();
    }
}

fn info_command(config: &MonitorConfig) -> anyhow::Result<()> {
    let discovery = discover(config).context("counter discovery failed")?;

    println!("Topology ({}):", config.cpu_root.display());
    println!("  Logical cores: {}", discovery.topology.core_count());
    println!("  Kernel ids: {:?}", discovery.topology.core_ids());
    println!();

    println!("Sensors ({}):", config.hwmon_root.display());
    match &discovery.temperature {
        Some(handle) => println!(
            "  CPU temperature: {} ({})",
            handle.label(),
            handle.path.display()
        ),
        None => println!(
            "  CPU temperature: unavailable (tried {})",
            config.temperature_subsystems.join(", ")
        ),
    }

    Ok(())
}

fn percent(fraction: f32) -> String {
    format!("{:05.2}", fraction * 100.0)
}

fn usage_line(reading: &Reading<UsageDetails>) -> String {
    let Some(usage) = reading.known() else {
        return "not sampled".to_string();
    };
    format!(
        "{} (I/O: {}, user: {}, system: {}, soft IRQ: {}, hard IRQ: {}){}",
        percent(usage.total),
        percent(usage.io),
        percent(usage.user),
        percent(usage.system),
        percent(usage.soft_irq),
        percent(usage.hard_irq),
        if reading.stale { " [stale]" } else { "" }
    )
}

fn scalar(reading: &Reading<u64>) -> String {
    match reading.known() {
        Some(value) if reading.stale => format!("{} [stale]", value),
        Some(value) => value.to_string(),
        None => "-".to_string(),
    }
}

fn print_pretty_snapshot(snapshot: &SystemSnapshot) {
    println!(
        "Tick {} ({})",
        snapshot.tick,
        chrono::DateTime::from_timestamp_millis(snapshot.timestamp as i64)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M:%S UTC")
    );

    println!("Total: {}", usage_line(&snapshot.cpu.aggregate));
    for (index, reading) in snapshot.cpu.core_usage.iter().enumerate() {
        println!("CPU{:02}: {}", index, usage_line(reading));
    }
    println!();

    for index in 0..snapshot.cpu.core_usage.len() {
        match snapshot.cpu.frequency_mhz(index) {
            Some(mhz) => println!("CPU{:02}: {:.0} MHz", index, mhz),
            None => println!("CPU{:02}: unknown MHz", index),
        }
    }
    println!();

    match (&snapshot.temperature.sensor, snapshot.temperature.cpu_celsius.known()) {
        (Some(sensor), Some(celsius)) => println!(
            "Temperature:       {:.1}°C ({}){}",
            celsius,
            sensor,
            if snapshot.temperature.cpu_celsius.stale { " [stale]" } else { "" }
        ),
        (Some(sensor), None) => println!("Temperature:       - ({})", sensor),
        (None, _) => println!("Temperature:       unavailable"),
    }

    let counters = &snapshot.counters;
    let boot_time = counters
        .boot_time
        .known()
        .and_then(|secs| chrono::DateTime::from_timestamp(*secs as i64, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("Boot time:         {}", boot_time);
    println!("Context switches:  {}", scalar(&counters.context_switches));
    println!("Processes created: {}", scalar(&counters.processes_created));
    println!("Processes running: {}", scalar(&counters.processes_running));
    println!("Processes blocked: {}", scalar(&counters.processes_blocked));

    if let Some(memory) = snapshot.memory.known() {
        println!(
            "Memory:            {:.1} / {:.1} GB available",
            memory.available_kb as f64 / 1024.0 / 1024.0,
            memory.total_kb as f64 / 1024.0 / 1024.0
        );
    }

    for anomaly in &snapshot.anomalies {
        println!("! {}", anomaly);
    }
    println!();
}
