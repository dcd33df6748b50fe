//! headcount_logger - CSV logger for the realtime database
//!
//! Polls the database on a fixed interval, appends one CSV row per cycle
//! (stamp plus a name/people/image triple per device), and resets the
//! consumed fields to sentinels so a stalled counter surfaces in the log.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use headcount::clock::WallClock;
use headcount::logger::{CsvLog, LoggerSession};
use headcount::remote::{with_retry, HttpRealtimeDb};
use headcount::ui::Ui;

#[derive(Parser, Debug)]
#[command(name = "headcount_logger", version, about)]
struct Args {
    /// Realtime database base URL
    #[arg(long, env = "HEADCOUNT_DB_URL")]
    db_url: String,

    /// Output CSV file
    #[arg(long, env = "HEADCOUNT_LOGGER_CSV", default_value = "pose_people_counting_log.csv")]
    csv: PathBuf,

    /// Seconds between logging cycles
    #[arg(long, env = "HEADCOUNT_LOGGER_INTERVAL", default_value_t = 300)]
    interval_secs: u64,

    /// HTTP endpoint reporting UTC time as "YYYY-MM-DD HH:MM:SS"
    #[arg(long, env = "HEADCOUNT_TIME_ENDPOINT")]
    time_endpoint: Option<String>,

    /// UTC offset for log stamps, in hours
    #[arg(long, env = "HEADCOUNT_UTC_OFFSET", default_value_t = 8)]
    utc_offset_hours: i32,

    /// Progress output: auto, plain, or pretty
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let ui = Ui::from_flag(args.ui.as_deref(), std::io::stderr().is_terminal());
    let interval = Duration::from_secs(args.interval_secs.max(1));

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            stop.store(true, Ordering::Relaxed);
        })
        .context("install ctrl-c handler")?;
    }

    let store = HttpRealtimeDb::new(&args.db_url)?;
    let clock = WallClock::new(args.time_endpoint.clone(), args.utc_offset_hours)?;
    let mut csv = CsvLog::open(&args.csv)?;
    log::info!(
        "logging {} every {}s into {}",
        args.db_url,
        interval.as_secs(),
        args.csv.display(),
    );

    let mut session = LoggerSession::new();
    while !stop.load(Ordering::Relaxed) {
        let row = {
            let _stage = ui.stage("collect device status");
            with_retry(&stop, "logging cycle", || {
                let stamp = clock.now_stamp();
                session.run_cycle(&store, &stamp)
            })
        };
        let Some(row) = row else {
            break; // stop flag raised mid-retry
        };

        if let Some(row) = row {
            csv.append_row(&row)?;
            log::info!("logged {} columns: {}", row.len(), row.join(","));
        }

        ui.countdown("next cycle", interval, &stop);
    }

    log::info!("headcount_logger stopped");
    Ok(())
}
