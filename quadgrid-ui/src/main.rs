use std::fs::File;
use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::thread;

use quadgrid_audio::{NullSynth, OscSynth, SynthEngine};
use quadgrid_core::config::{parse_generation, Config};
use quadgrid_core::control_loop::{ControlLoop, LoopError, LoopResult, LoopSettings, ShutdownHandle};
use quadgrid_core::hardware::launchpad::{self, LaunchpadAdapter};
use quadgrid_core::hardware::HardwareAdapter;
use quadgrid_core::instrument::{
    FieldInstrument, HarmonicInstrument, Instrument, InstrumentKind, ScanInstrument,
};
use quadgrid_core::led::SharedHardware;

const USAGE: &str = "usage: quadgrid [--instrument harmonic|field|scan] [--port N] [--list-ports] \
[--generation mk1|mk2] [--osc HOST:PORT|none] [--verbose]";

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("quadgrid")
        .join("quadgrid.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/quadgrid.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("quadgrid: cannot create log file: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, Config::default(), log_file) {
        eprintln!("quadgrid: logger init failed: {}", e);
        return;
    }

    log::info!("quadgrid starting (log level: {:?})", log_level);
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("quadgrid: {}", message);
    log::error!("{}", message);
    std::process::exit(1);
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    if args.iter().any(|a| a == "--list-ports") {
        return list_ports();
    }

    let config = Config::load();

    let kind = match flag_value(&args, "--instrument") {
        Some(name) => InstrumentKind::parse(name)
            .unwrap_or_else(|| fail(format!("unknown instrument '{}'\n{}", name, USAGE))),
        None => config.instrument(),
    };
    let port = match flag_value(&args, "--port") {
        Some(value) => Some(
            value
                .parse::<usize>()
                .unwrap_or_else(|_| fail(format!("invalid port index '{}'", value))),
        ),
        None => config.midi_port(),
    };
    let generation = match flag_value(&args, "--generation") {
        Some(value) => Some(
            parse_generation(value).unwrap_or_else(|| fail(format!("unknown generation '{}'", value))),
        ),
        None => config.generation(),
    };
    let osc = match flag_value(&args, "--osc") {
        Some("none") | Some("") => None,
        Some(addr) => Some(addr.to_string()),
        None => config.osc_server().map(str::to_string),
    };

    let adapter = LaunchpadAdapter::open(port, generation).unwrap_or_else(|e| fail(e));
    println!("quadgrid: {} on {}", kind, adapter.port_name());
    let boxed: Box<dyn HardwareAdapter> = Box::new(adapter);
    let hardware: SharedHardware = Arc::new(Mutex::new(boxed));

    let synth: Box<dyn SynthEngine> = match osc {
        Some(addr) => Box::new(OscSynth::connect(&addr).unwrap_or_else(|e| fail(e))),
        None => {
            log::warn!("no synthesis server configured, running silent");
            Box::new(NullSynth)
        }
    };

    let settings = config.instrument_settings();
    let loop_settings = LoopSettings::from_config(&config);
    let result = match kind {
        InstrumentKind::Harmonic => run(hardware, HarmonicInstrument::new(synth, &settings), loop_settings),
        InstrumentKind::Field => run(hardware, FieldInstrument::new(synth, &settings), loop_settings),
        InstrumentKind::Scan => run(hardware, ScanInstrument::new(synth, &settings), loop_settings),
    };
    if let Err(e) = result {
        fail(e);
    }
    println!("quadgrid: stopped");
    Ok(())
}

fn run<I: Instrument>(hardware: SharedHardware, instrument: I, settings: LoopSettings) -> LoopResult {
    let mut control = ControlLoop::new(hardware, instrument, settings)?;
    watch_stdin(control.shutdown_handle()).map_err(LoopError::from)?;
    println!("quadgrid: running, type q + Enter to quit");
    control.run()
}

/// Stop the loop when `q` is entered on the terminal.
fn watch_stdin(handle: ShutdownHandle) -> std::io::Result<()> {
    thread::Builder::new()
        .name("stdin-watch".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if matches!(line.trim(), "q" | "quit" | "exit") {
                    log::info!("quit requested from terminal");
                    handle.request();
                    break;
                }
            }
        })?;
    Ok(())
}

fn list_ports() -> std::io::Result<()> {
    match launchpad::list_ports() {
        Ok(ports) if ports.is_empty() => println!("no MIDI input ports"),
        Ok(ports) => {
            for port in ports {
                let generation = launchpad::generation_from_name(&port.name);
                println!("{:>3}: {} ({})", port.index, port.name, generation.name());
            }
        }
        Err(e) => fail(e),
    }
    Ok(())
}
