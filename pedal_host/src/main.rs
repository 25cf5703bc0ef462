use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pedal_host::config::{DisplayNames, PresetTable};
use pedal_host::engine;
use pedal_host::session::{self, Session};

#[derive(Parser, Debug)]
#[command(
    name = "pedal_host",
    about = "Bridges a serial foot-pedal controller to a JSON-RPC effects engine"
)]
struct Args {
    /// `run` drives the pedal loop; `listen` only prints engine notifications.
    #[arg(value_enum, default_value = "run")]
    mode: Mode,

    /// Effects engine RPC endpoint.
    #[arg(long, default_value = "127.0.0.1:7000")]
    addr: String,

    /// Pedal controller serial device.
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Bank/preset -> switches table.
    #[arg(long, default_value = "presets.json")]
    presets: PathBuf,

    /// Parameter id -> display label table.
    #[arg(long, default_value = "names.json")]
    names: PathBuf,

    /// Command used to start the engine when nothing listens on --addr.
    #[arg(long, default_value = "guitarix -p 7000")]
    engine_cmd: String,

    /// Never launch the engine; fail if it is not already running.
    #[arg(long, default_value_t = false)]
    no_launch: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Run,
    Listen,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let launch = (!args.no_launch).then_some(args.engine_cmd.as_str());
    let mut client = engine::connect_or_launch(&args.addr, launch)?;
    info!(addr = %args.addr, "connected to effects engine");

    match args.mode {
        Mode::Listen => {
            client.listen()?;
        }
        Mode::Run => {
            let presets = PresetTable::load(&args.presets)
                .with_context(|| format!("loading preset table {}", args.presets.display()))?;
            let names = DisplayNames::load(&args.names)
                .with_context(|| format!("loading display names {}", args.names.display()))?;

            let session = Session::start(client, presets, names)?;
            session::run(session, &args.port)?;
        }
    }
    Ok(())
}
