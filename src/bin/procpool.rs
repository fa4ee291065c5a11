use clap::{crate_authors, crate_version, Parser};
use procpool::{
    Error, FnProcess, Pid, Process, ProcessPool, ProcessStatus, Result, WorkerPool,
};
use serde::Serialize;
use slog::*;
use std::{fs, path::PathBuf, process::exit, sync::Arc, thread, time::Duration};

#[derive(Parser)]
#[clap(version = crate_version!(), author = crate_authors!())]
struct Options {
    /// number of workers
    #[clap(long, short, default_value = "2")]
    size: usize,

    /// number of processes to register
    #[clap(long, short, default_value = "10")]
    count: usize,

    /// how long each process sleeps
    #[clap(long, default_value = "300")]
    sleep_ms: u64,

    /// every nth process fails with "boom", 0 disables failures
    #[clap(long, default_value = "0")]
    fail_every: usize,

    /// pids to kill right after registering
    #[clap(long, short)]
    kill: Vec<String>,

    /// write the JSON report here instead of stdout
    #[clap(long, short)]
    report: Option<PathBuf>,
}

#[derive(Serialize)]
struct ReportRow {
    pid: Pid,
    name: String,
    worker: String,
    status: ProcessStatus,
    elapsed_ms: Option<u128>,
    error: Option<String>,
}

fn main() {
    let logger = logger();
    let options = Options::parse();

    if let Err(e) = run(&options, &logger) {
        error!(&logger, "{}", e);
        exit(1);
    }
}

fn logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, o!())
}

fn run(options: &Options, logger: &Logger) -> Result<()> {
    info!(logger, "procpool demo";
        "version" => crate_version!(),
        "size" => options.size,
        "count" => options.count
    );

    let pool = WorkerPool::with_logger(options.size, logger.clone())?;
    pool.start()?;

    let processes: Vec<Arc<dyn Process>> = (0..options.count)
        .map(|i| sleeper(i, options.sleep_ms, options.fail_every))
        .collect();
    let pids: Vec<Pid> = processes.iter().map(|p| p.pid()).collect();
    pool.register(processes);

    for pid in &options.kill {
        pool.kill(&Pid::from(pid.as_str()));
    }
    pool.close()?;

    let monitor = pool.monitor();
    let rows: Vec<ReportRow> = pids
        .into_iter()
        .map(|pid| {
            let stats = monitor.process_stats(&pid);
            ReportRow {
                name: stats.process.as_ref().map(|p| p.name()).unwrap_or_default(),
                worker: stats.worker_name.to_string(),
                status: stats.status,
                elapsed_ms: stats.elapsed().map(|d| d.as_millis()),
                error: stats.error.as_ref().map(|e| e.to_string()),
                pid,
            }
        })
        .collect();

    let report = serde_json::to_string_pretty(&rows)?;
    match &options.report {
        Some(path) => fs::write(path, report)?,
        None => println!("{}", report),
    }
    Ok(())
}

fn sleeper(index: usize, sleep_ms: u64, fail_every: usize) -> Arc<dyn Process> {
    let fails = fail_every > 0 && (index + 1) % fail_every == 0;
    Arc::new(FnProcess::new(
        format!("p-{}", index),
        format!("sleep-{}ms", sleep_ms),
        move || {
            thread::sleep(Duration::from_millis(sleep_ms));
            if fails {
                Err(Error::process("boom"))
            } else {
                Ok(())
            }
        },
    ))
}
