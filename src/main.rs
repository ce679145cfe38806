use anyhow::Context;
use clap::{Parser, Subcommand};
use poct1_rs::constants::{DEFAULT_CAPTURES_DIR, DEFAULT_DATA_FILE, DEFAULT_DEVICE_PORT};
use poct1_rs::{
    init_logger, load_readings, reset_data, serve, summarize, AckPolicy, SyncConfig,
    TherapeuticRange,
};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "poct1-cli")]
#[command(about = "CLI tool for POCT1-A coagulometer synchronization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for device connections and sync readings
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, default_value_t = DEFAULT_DEVICE_PORT)]
        port: u16,
        #[arg(long, default_value = DEFAULT_DATA_FILE)]
        data_file: PathBuf,
        /// Directory for raw observation captures
        #[arg(long, default_value = DEFAULT_CAPTURES_DIR)]
        capture_dir: PathBuf,
        /// Disable raw capture archival
        #[arg(long)]
        no_captures: bool,
        /// Acknowledge observation batches with reject so the device keeps
        /// them queued for a later connection
        #[arg(long)]
        reject: bool,
    },
    /// Print the stored readings
    Results {
        #[arg(long, default_value = DEFAULT_DATA_FILE)]
        data_file: PathBuf,
    },
    /// Print time-in-range metrics for a target INR range
    Report {
        #[arg(long, default_value = DEFAULT_DATA_FILE)]
        data_file: PathBuf,
        #[arg(long, default_value_t = 2.0)]
        low: f64,
        #[arg(long, default_value_t = 3.0)]
        high: f64,
    },
    /// Delete the results snapshot and raw captures
    Reset {
        #[arg(long, default_value = DEFAULT_DATA_FILE)]
        data_file: PathBuf,
        #[arg(long, default_value = DEFAULT_CAPTURES_DIR)]
        capture_dir: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            host,
            port,
            data_file,
            capture_dir,
            no_captures,
            reject,
        } => {
            let config = SyncConfig {
                ack_policy: if reject {
                    AckPolicy::Reject
                } else {
                    AckPolicy::Accept
                },
                data_file,
                capture_dir: if no_captures { None } else { Some(capture_dir) },
            };
            serve(config, &format!("{host}:{port}"))
                .await
                .context("device server failed")?;
        }
        Commands::Results { data_file } => run_results(&data_file)?,
        Commands::Report {
            data_file,
            low,
            high,
        } => run_report(&data_file, low, high)?,
        Commands::Reset {
            data_file,
            capture_dir,
            force,
        } => run_reset(&data_file, &capture_dir, force)?,
    }

    Ok(())
}

fn run_results(data_file: &Path) -> anyhow::Result<()> {
    let set = load_readings(data_file).context("could not load results snapshot")?;
    if set.is_empty() {
        println!("No readings synced yet.");
        return Ok(());
    }

    println!("Device: {} ({})", set.device().model, set.device().serial);
    if let Some(last_sync) = set.last_sync() {
        println!("Last sync: {}", last_sync.to_rfc3339());
    }
    println!();
    println!(
        "{:>4}  {:<25}  {:>5}  {:>7}  {}",
        "#", "Observed", "INR", "PT (s)", "Status"
    );
    for reading in set.readings() {
        println!(
            "{:>4}  {:<25}  {:>5.1}  {:>7.1}  {}",
            reading.sequence,
            reading.observed_at.to_rfc3339(),
            reading.inr,
            reading.pt_seconds,
            reading.status
        );
    }
    println!();
    println!("{} reading(s) total", set.len());
    Ok(())
}

fn run_report(data_file: &Path, low: f64, high: f64) -> anyhow::Result<()> {
    let set = load_readings(data_file).context("could not load results snapshot")?;
    let range = TherapeuticRange::new(low, high).context("invalid target range")?;
    let summary = summarize(set.readings(), range);

    println!("Target range: INR {}", summary.range);
    println!("Readings:     {}", summary.count);
    println!("In range:     {}", summary.in_range_count);
    match summary.mean_inr {
        Some(mean) => println!("Mean INR:     {mean:.2}"),
        None => println!("Mean INR:     n/a"),
    }
    match summary.std_dev {
        Some(sd) => println!("Std dev:      {sd:.2}"),
        None => println!("Std dev:      n/a"),
    }
    match summary.ttr_percent {
        Some(ttr) => println!("TTR:          {ttr:.1}%"),
        None => println!("TTR:          n/a (needs two or more readings over time)"),
    }
    Ok(())
}

fn run_reset(data_file: &Path, capture_dir: &Path, force: bool) -> anyhow::Result<()> {
    println!("WARNING: irreversible data deletion");
    println!("This will permanently delete:");
    println!("  - All synced INR/PT readings ({})", data_file.display());
    println!("  - Raw device captures ({}/*.xml)", capture_dir.display());
    println!();
    println!("If the device has already marked this data as sent, it cannot be downloaded again.");
    println!("Consider backing up {} first.", data_file.display());
    println!();

    if !force {
        print!("Type 'DELETE' (all caps) to confirm: ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if answer.trim() != "DELETE" {
            println!("Cancelled. No data was deleted.");
            return Ok(());
        }
    }

    let report = reset_data(data_file, Some(capture_dir)).context("resetting stored data")?;
    if report.snapshot_removed {
        println!("Deleted {}", data_file.display());
    }
    if report.captures_removed > 0 {
        println!(
            "Deleted {} capture file(s) from {}",
            report.captures_removed,
            capture_dir.display()
        );
    }

    println!("Data reset complete.");
    Ok(())
}
