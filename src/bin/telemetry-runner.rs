use clap::{crate_version, Parser};
use slog::*;
use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telemetry::config::PoolConfig;
use telemetry::{logging, Job, Signal, WorkerPool};

#[derive(Parser)]
#[clap(version, author)]
struct Options {
    #[clap(long, short, default_value = "2")]
    workers: usize,

    /// JSON pool config; overrides --workers
    #[clap(long, short)]
    config: Option<PathBuf>,

    #[clap(long, short, default_value = "1")]
    robots: usize,

    #[clap(long, default_value = "500")]
    interval_ms: u64,

    #[clap(long, short, default_value = "3000")]
    duration_ms: u64,

    /// submit a critical job that always fails
    #[clap(long)]
    fail_critical: bool,

    #[clap(long, short)]
    verbose: bool,
}

fn main() {
    let options = Options::parse();
    let level = if options.verbose {
        Level::Debug
    } else {
        Level::Info
    };
    let logger = logging::terminal(level);

    let code = match run(&options, &logger) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            error!(&logger, "{}", e);
            1
        }
    };
    // flush the async drain before exiting
    drop(logger);
    exit(code);
}

// Ok(false) when a critical failure stopped the pool
fn run(options: &Options, logger: &Logger) -> telemetry::Result<bool> {
    let config = match &options.config {
        Some(path) => PoolConfig::from_file(path)?,
        None => PoolConfig::new(options.workers),
    };
    info!(logger, "telemetry runner initializing";
        "version" => crate_version!(),
        "workers" => config.workers,
        "robots" => options.robots
    );

    let pool = Arc::new(WorkerPool::with_config(config, logger.clone())?);
    pool.start()?;

    let feeder = {
        let pool = pool.clone();
        let logger = logger.clone();
        let robots = options.robots;
        let interval = Duration::from_millis(options.interval_ms);
        let fail_critical = options.fail_critical;
        // submit blocks on a full queue, keep it off the main thread
        thread::spawn(move || {
            pool.submit(connect_job(logger.clone()));
            if fail_critical {
                pool.submit(
                    Job::new("command subscription", |_| {
                        Err(failure::err_msg("subscription rejected by broker"))
                    })
                    .retries(3)
                    .critical(true),
                );
            }
            for id in 0..robots {
                pool.submit(publish_job(id, interval, logger.clone()));
            }
        })
    };

    let stopped_early = pool
        .done()
        .wait_timeout(Duration::from_millis(options.duration_ms));
    if !stopped_early {
        info!(logger, "run finished, shutting down");
    }
    pool.shutdown();
    if feeder.join().is_err() {
        warn!(logger, "job feeder panicked");
    }

    println!("errors: {}", pool.error_count());
    match pool.last_critical() {
        Some(critical) => {
            println!("critical: {}", critical);
            Ok(false)
        }
        None => Ok(true),
    }
}

// the simulated broker accepts the third connection attempt
fn connect_job(logger: Logger) -> Job {
    let attempts = Arc::new(AtomicUsize::new(0));
    let on_error_logger = logger.clone();
    Job::new("broker connection", move |_| {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt < 3 {
            return Err(failure::err_msg("broker unreachable"));
        }
        info!(logger, "connected to broker"; "attempt" => attempt);
        Ok(())
    })
    .retries(3)
    .on_error(move |err| warn!(on_error_logger, "broker connection failed: {}", err))
}

fn publish_job(id: usize, interval: Duration, logger: Logger) -> Job {
    let name = format!("robot-{} telemetry", id);
    Job::new(name, move |cancel: &Signal| {
        let mut robot = Robot::new(id);
        while !cancel.wait_timeout(interval) {
            robot.step();
            info!(logger, "telemetry";
                "robot" => id,
                "x" => format!("{:.2}", robot.x),
                "y" => format!("{:.2}", robot.y),
                "battery" => format!("{:.1}", robot.battery)
            );
        }
        debug!(logger, "stopping telemetry publishing"; "robot" => id);
        Ok(())
    })
    .retries(1)
}

// synthetic robot walking a circle while its battery drains
struct Robot {
    id: usize,
    tick: u64,
    x: f64,
    y: f64,
    battery: f64,
}

impl Robot {
    fn new(id: usize) -> Self {
        Robot {
            id,
            tick: 0,
            x: 0.0,
            y: 0.0,
            battery: 100.0,
        }
    }

    fn step(&mut self) {
        self.tick += 1;
        let phase = self.tick as f64 / 10.0 + self.id as f64;
        self.x = phase.cos() * 5.0;
        self.y = phase.sin() * 5.0;
        self.battery = (self.battery - 0.5).max(0.0);
    }
}
