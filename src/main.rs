// src/main.rs
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use serde::Serialize;

use vmreserve::images;
use vmreserve::memory::maps;
use vmreserve::{VirtualMemory, VmConfig, VmError};

#[derive(Parser)]
#[command(name = "vmreserve", version, about = "Reserve, commit and inspect process address space")]
struct Cli {
    /// JSON config file (defaults to $VMRESERVE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Page sizes, capabilities and the effective configuration
    Info,
    /// List loaded images and their code ranges
    Modules {
        #[arg(long)]
        json: bool,
    },
    /// Walk one reservation through reserve, commit, uncommit and release
    Reserve {
        #[arg(long, value_parser = parse_size)]
        size: usize,
        #[arg(long, value_parser = parse_size)]
        alignment: Option<usize>,
        #[arg(long)]
        commit: bool,
        #[arg(long)]
        exec: bool,
    },
    /// Concurrent reservation cycles from several threads
    Stress {
        #[arg(long, default_value_t = 8)]
        tasks: usize,
        #[arg(long, default_value_t = 1000)]
        iterations: usize,
        #[arg(long, value_parser = parse_size, default_value = "64K")]
        size: usize,
        #[arg(long, value_parser = parse_size, default_value = "2M")]
        alignment: usize,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("stress task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Usage(String),
}

#[derive(Debug, Default, Serialize)]
struct StressStats {
    reserved: usize,
    committed: usize,
    released: usize,
    failures: usize,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => VmConfig::load(path)?,
        None => VmConfig::from_env()?,
    };
    let vm = Arc::new(VirtualMemory::with_config(config));

    match cli.command {
        Command::Info => info(&vm),
        Command::Modules { json } => modules(json),
        Command::Reserve {
            size,
            alignment,
            commit,
            exec,
        } => reserve(&vm, size, alignment, commit, exec),
        Command::Stress {
            tasks,
            iterations,
            size,
            alignment,
        } => stress(vm, tasks, iterations, size, alignment).await,
    }
}

fn info(vm: &VirtualMemory) -> Result<(), CliError> {
    let report = serde_json::json!({
        "page_size": vm.page_size(),
        "allocate_alignment": vm.allocate_alignment(),
        "commit_page_size": vm.commit_page_size(),
        "has_lazy_commits": vm.has_lazy_commits(),
        "config": vm.config(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn modules(json: bool) -> Result<(), CliError> {
    let records = images::loaded_modules();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{}", record);
        }
    }
    Ok(())
}

fn check_alignment(vm: &VirtualMemory, alignment: usize) -> Result<(), CliError> {
    if !alignment.is_power_of_two() || alignment % vm.allocate_alignment() != 0 {
        return Err(CliError::Usage(format!(
            "alignment {:#x} must be a power of two and a multiple of {:#x}",
            alignment,
            vm.allocate_alignment()
        )));
    }
    Ok(())
}

fn describe(address: usize) -> String {
    match maps::mapping_at(address) {
        Ok(Some(mapping)) => format!(
            "{}{} {}",
            maps::perms_string(mapping.protection),
            if mapping.private { 'p' } else { 's' },
            mapping.name.unwrap_or_default()
        ),
        Ok(None) => "unmapped".to_string(),
        Err(VmError::Unsupported(_)) => "n/a".to_string(),
        Err(e) => e.to_string(),
    }
}

fn reserve(
    vm: &VirtualMemory,
    size: usize,
    alignment: Option<usize>,
    commit: bool,
    exec: bool,
) -> Result<(), CliError> {
    if size == 0 {
        return Err(CliError::Usage("size must be non-zero".to_string()));
    }
    if let Some(alignment) = alignment {
        check_alignment(vm, alignment)?;
    }

    let mut reservation = vm.reserve(size, alignment, None)?;
    let base = reservation.base();
    println!(
        "reserved   {} ({:#x} bytes)  {}",
        reservation.region(),
        reservation.len(),
        describe(base)
    );

    if commit {
        let len = reservation.len();
        reservation.commit(0, len, exec)?;
        unsafe {
            // Fault in the first page
            reservation.as_mut_ptr().write_volatile(0xa5);
        }
        println!("committed  {}  {}", reservation.region(), describe(base));

        reservation.uncommit(0, len)?;
        println!("uncommitted {}  {}", reservation.region(), describe(base));
    }

    let region = reservation.region();
    reservation.release()?;
    println!("released   {}  {}", region, describe(base));
    Ok(())
}

async fn stress(
    vm: Arc<VirtualMemory>,
    tasks: usize,
    iterations: usize,
    size: usize,
    alignment: usize,
) -> Result<(), CliError> {
    if size == 0 {
        return Err(CliError::Usage("size must be non-zero".to_string()));
    }
    check_alignment(&vm, alignment)?;

    let stats = Arc::new(Mutex::new(StressStats::default()));
    let mut handles = Vec::with_capacity(tasks);

    for task in 0..tasks {
        let vm = Arc::clone(&vm);
        let stats = Arc::clone(&stats);

        handles.push(tokio::task::spawn_blocking(move || {
            for _ in 0..iterations {
                if let Err(e) = cycle(&vm, &stats, size, alignment) {
                    log::warn!("task {}: {}", task, e);
                    stats.lock().failures += 1;
                }
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }

    println!("{}", serde_json::to_string_pretty(&*stats.lock())?);
    Ok(())
}

fn cycle(
    vm: &VirtualMemory,
    stats: &Mutex<StressStats>,
    size: usize,
    alignment: usize,
) -> Result<(), VmError> {
    let mut reservation = vm.reserve(size, Some(alignment), None)?;
    debug_assert_eq!(reservation.base() % alignment, 0);
    stats.lock().reserved += 1;

    let len = reservation.len();
    reservation.commit(0, len, false)?;
    unsafe {
        reservation.as_mut_ptr().write_volatile(1);
    }
    stats.lock().committed += 1;

    reservation.uncommit(0, len)?;
    reservation.release()?;
    stats.lock().released += 1;
    Ok(())
}

/// Byte count with an optional K/M/G suffix, or `0x` hex.
fn parse_size(value: &str) -> Result<usize, String> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        return usize::from_str_radix(hex, 16).map_err(|e| e.to_string());
    }

    let (digits, shift) = match value.chars().last() {
        Some('k' | 'K') => (&value[..value.len() - 1], 10),
        Some('m' | 'M') => (&value[..value.len() - 1], 20),
        Some('g' | 'G') => (&value[..value.len() - 1], 30),
        _ => (value, 0),
    };

    let number: usize = digits.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    number
        .checked_mul(1usize << shift)
        .ok_or_else(|| format!("{} does not fit in the address space", value))
}
