//! soundflow headless - audio analysis to OSC bridge
//!
//! Captures a live audio input, runs the SoundFlow analysis engine and
//! emits OSC trigger/level/BPM messages to a lighting console or other
//! show-control host. No GUI; Ctrl-C stops it.

mod capture;
mod logging_setup;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use soundflow_control::OscProtocol;
use soundflow_core::{AudioSource, Engine, EngineConfig, LogConfig};

use capture::CpalSource;

struct CliOptions {
    host: String,
    port: u16,
    rx_port: Option<u16>,
    protocol: OscProtocol,
    input_device: Option<String>,
    preset: Option<PathBuf>,
    verbose: bool,
    list_devices: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            rx_port: None,
            protocol: OscProtocol::Udp,
            input_device: None,
            preset: None,
            verbose: false,
            list_devices: false,
        }
    }
}

fn print_banner() {
    println!();
    println!("  soundflow headless v{}", env!("CARGO_PKG_VERSION"));
    println!("  Audio analysis to OSC bridge");
    println!();
}

fn print_usage() {
    println!("Usage: soundflow [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -H, --host <address>   OSC destination host (default: 127.0.0.1)");
    println!("  -p, --port <port>      OSC destination port (default: 9000)");
    println!("  -r, --rx-port <port>   Listen for incoming OSC control on this port");
    println!("  -i, --input <device>   Audio input device name");
    println!("  -c, --preset <file>    Preset JSON to load on startup");
    println!("      --tcp              Send OSC 1.0 over SLIP-framed TCP");
    println!("      --osc11            Send OSC 1.1 (SLIP/TCP, no bundles)");
    println!("      --list-devices     List audio input devices and exit");
    println!("      --verbose          Enable debug logging");
    println!("  -h, --help             Show this help");
}

fn parse_args() -> Result<Option<CliOptions>> {
    let mut opts = CliOptions::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let mut value_for = |flag: &str| -> Result<String> {
            args.next()
                .with_context(|| format!("missing value for {flag}"))
        };
        match arg.as_str() {
            "-H" | "--host" => opts.host = value_for(&arg)?,
            "-p" | "--port" => {
                opts.port = value_for(&arg)?
                    .parse()
                    .context("port must be a number in 1..65535")?
            }
            "-r" | "--rx-port" => {
                opts.rx_port = Some(
                    value_for(&arg)?
                        .parse()
                        .context("rx-port must be a number in 1..65535")?,
                )
            }
            "-i" | "--input" => opts.input_device = Some(value_for(&arg)?),
            "-c" | "--preset" => opts.preset = Some(PathBuf::from(value_for(&arg)?)),
            "--tcp" => opts.protocol = OscProtocol::Tcp,
            "--osc11" => opts.protocol = OscProtocol::Tcp11,
            "--list-devices" => opts.list_devices = true,
            "--verbose" => opts.verbose = true,
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            other => bail!("unknown argument '{other}' (try --help)"),
        }
    }
    Ok(Some(opts))
}

fn main() -> Result<()> {
    let Some(opts) = parse_args()? else {
        return Ok(());
    };

    let log_config = LogConfig {
        level: if opts.verbose { "debug" } else { "info" }.to_string(),
        ..LogConfig::default()
    };
    let _log_guard = logging_setup::init(&log_config)?;

    print_banner();

    let mut source = CpalSource::new();

    if opts.list_devices {
        let devices = source.list_devices();
        println!("Available audio input devices:");
        for (i, name) in devices.iter().enumerate() {
            println!("  [{i}] {name}");
        }
        if devices.is_empty() {
            println!("  (no devices found)");
        }
        return Ok(());
    }

    let target: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .with_context(|| format!("invalid OSC target {}:{}", opts.host, opts.port))?;
    tracing::info!("OSC output: {target} ({:?})", opts.protocol);

    let config = EngineConfig {
        osc_target: target,
        protocol: opts.protocol,
        osc_rx_port: opts.rx_port,
        preset_dir: opts
            .preset
            .as_ref()
            .and_then(|p| p.parent().map(PathBuf::from)),
        ..EngineConfig::default()
    };
    let (mut engine, diagnostics) = Engine::new(config).context("engine init")?;

    if let Some(preset) = &opts.preset {
        engine
            .load_preset(preset)
            .with_context(|| format!("loading preset {}", preset.display()))?;
        tracing::info!("Preset loaded: {}", preset.display());
    }

    if let Some(device) = &opts.input_device {
        source
            .select(device)
            .with_context(|| format!("selecting input '{device}'"))?;
    }
    engine.set_audio_source(Box::new(source));

    // Diagnostics are already mirrored to the log by the engine; drain the
    // channel so it never clogs.
    std::thread::spawn(move || while diagnostics.recv().is_ok() {});

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        })
        .context("installing Ctrl-C handler")?;
    }

    tracing::info!("Running. Press Ctrl+C to stop.");
    engine.run(&stop);

    tracing::info!("Goodbye!");
    Ok(())
}
