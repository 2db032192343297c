//! Host-bus dispatcher binary.
//!
//! Runs the dispatcher against the in-process CPLD simulator: either as a
//! JSON-RPC server on stdio, or for a fixed wall-clock time followed by a
//! summary of what the host saw.

use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use cpld_link::SimLink;
use emu_hostbus::{
    ConfigError, Host, ImageConfig, MachineConfig, MemoryProfile, ModelId, RpcServer, StoreKind,
};
use log::info;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: Option<PathBuf>,
    model: Option<String>,
    profile: Option<String>,
    speed: Option<u8>,
    images: Vec<(String, StoreKind)>,
    no_lookahead: bool,
    rpc: bool,
    run_ms: u64,
}

fn usage() {
    eprintln!("Usage: emu-hostbus [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file>      JSON machine configuration");
    eprintln!("  --model <model>      mz700, mz1500, mz2000, pcw");
    eprintln!("  --profile <profile>  virtual or physical [default: virtual]");
    eprintln!("  --speed <n>          Speed multiplier: 1, 2, 4 ... 128 [default: 1]");
    eprintln!("  --rom <file@offset>  Load a file into virtual ROM");
    eprintln!("  --ram <file@offset>  Load a file into virtual RAM");
    eprintln!("  --no-lookahead       Disable I/O lookahead");
    eprintln!("  --rpc                Run as a JSON-RPC server on stdio");
    eprintln!("  --run-ms <n>         Run time without --rpc [default: 1000]");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        model: None,
        profile: None,
        speed: None,
        images: Vec::new(),
        no_lookahead: false,
        rpc: false,
        run_ms: 1000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                cli.config_path = args.get(i).map(PathBuf::from);
            }
            "--model" => {
                i += 1;
                cli.model = args.get(i).cloned();
            }
            "--profile" => {
                i += 1;
                cli.profile = args.get(i).cloned();
            }
            "--speed" => {
                i += 1;
                cli.speed = args.get(i).and_then(|s| s.parse().ok());
            }
            "--rom" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.images.push((s.clone(), StoreKind::Rom));
                }
            }
            "--ram" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.images.push((s.clone(), StoreKind::Ram));
                }
            }
            "--no-lookahead" => {
                cli.no_lookahead = true;
            }
            "--rpc" => {
                cli.rpc = true;
            }
            "--run-ms" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.run_ms = s.parse().unwrap_or(1000);
                }
            }
            "--help" | "-h" => {
                usage();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// Config file first, command-line flags on top.
fn build_config(cli: &CliArgs) -> Result<MachineConfig, ConfigError> {
    let mut config = match &cli.config_path {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };
    if let Some(model) = &cli.model {
        config.model = Some(model.parse::<ModelId>()?);
    }
    if let Some(profile) = &cli.profile {
        config.profile = profile.parse::<MemoryProfile>()?;
    }
    if let Some(speed) = cli.speed {
        config.speed = speed;
    }
    if cli.no_lookahead {
        config.lookahead = false;
    }
    for (spec, kind) in &cli.images {
        config.images.push(ImageConfig::parse(spec, *kind)?);
    }
    Ok(config)
}

fn run_timed(host: &Host<SimLink>, run_ms: u64) {
    host.start();
    thread::sleep(Duration::from_millis(run_ms));
    host.stop();

    for event in host.take_events() {
        println!("event: {}", serde_json::to_string(&event).unwrap_or_default());
    }
    let (pc, transactions, mode) = host.with_machine(|m| {
        use emu_core::Cpu;
        (
            m.cpu().pc(),
            m.engine().codec().transactions(),
            m.engine().modes().active().name,
        )
    });
    println!("pc={pc:04X} mode={mode} host transactions={transactions}");
}

fn main() {
    env_logger::init();
    let cli = parse_args();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };

    let mut link = SimLink::new();
    link.set_logging(false);
    let host = match Host::new(link) {
        Ok(host) => host,
        Err(e) => {
            eprintln!("Failed to start dispatcher: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = config.apply(&host) {
        eprintln!("Configuration error: {e}");
        process::exit(1);
    }
    info!("dispatcher ready");

    if cli.rpc {
        let mut server = RpcServer::new(host);
        server.run();
        return;
    }

    run_timed(&host, cli.run_ms);
}
