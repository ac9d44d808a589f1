use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{ArgAction, ArgMatches, Command, arg, value_parser};
use log::{error, info};
use tokio_util::sync::CancellationToken;

use huginn::{
    Configuration, FdmClient, KinematicModel, SimulationServer, Simulator, SimulatorError,
    TrimMode,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches = command().get_matches();

    let level = if matches.get_flag("debug") { "debug" } else { "info" };
    init_logger(level, matches.get_one::<PathBuf>("log"))?;

    let configuration = configuration(&matches)?;
    configuration.validate()?;

    info!("Creating the {} flight dynamics model", configuration.aircraft);
    let simulator = Simulator::new(Box::new(KinematicModel::new()), &configuration)?;
    let server = SimulationServer::bind(configuration, Arc::new(Mutex::new(simulator))).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, stopping the simulator");
                    cancel.cancel();
                }
                Err(e) => error!("Failed to listen for ctrl-c: {}", e),
            }
        }
    });

    info!("The simulator is paused; send a resume command to start it");
    server.run(cancel).await?;
    Ok(())
}

fn command() -> Command {
    Command::new("huginn_start")
        .about("start the huginn flight simulator")
        .arg(
            arg!(--config <FILE>)
                .help("TOML configuration file; command line values override it")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(--host <ADDRESS>).help("address the interfaces bind to"))
        .arg(
            arg!(--web <PORT>)
                .help("web server port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            arg!(--controls <PORT>)
                .help("controls listening port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            arg!(--"fdm-data" <PORT>)
                .help("FDM data request port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            arg!(--telemetry <PORT>)
                .help("telemetry stream port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            arg!(--fdm <CLIENT>)
                .help("send FDM data to a client, given as host,port,dt. May be repeated")
                .action(ArgAction::Append)
                .value_parser(|s: &str| s.parse::<FdmClient>().map_err(|e| e.to_string())),
        )
        .arg(
            arg!(--dt <SECONDS>)
                .help("simulation timestep")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--trim <MODE>)
                .help("trim mode: longitudinal, full, ground, pullup or turn")
                .value_parser(|s: &str| s.parse::<TrimMode>().map_err(|e| e.to_string())),
        )
        .arg(arg!(--aircraft <NAME>).help("aircraft model"))
        .arg(
            arg!(--latitude <DEGREES>)
                .help("initial latitude")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--longitude <DEGREES>)
                .help("initial longitude")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--altitude <METERS>)
                .help("initial altitude above sea level")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--airspeed <MPS>)
                .help("initial true airspeed")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--heading <DEGREES>)
                .help("initial heading")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--seed <SEED>)
                .help("seed for the sensor noise")
                .value_parser(value_parser!(u64)),
        )
        .arg(arg!(--debug "enable debug logging"))
        .arg(
            arg!(--log <FILE>)
                .help("also write the log to this file")
                .value_parser(value_parser!(PathBuf)),
        )
}

fn init_logger(level: &str, log_file: Option<&PathBuf>) -> io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if let Some(path) = log_file {
        builder.target(env_logger::Target::Pipe(Box::new(ConsoleAndFile::open(path)?)));
    }
    builder.init();
    Ok(())
}

/// Copies every log record to stderr and to the log file.
struct ConsoleAndFile {
    file: File,
}

impl ConsoleAndFile {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ConsoleAndFile { file })
    }
}

impl Write for ConsoleAndFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn configuration(matches: &ArgMatches) -> Result<Configuration, SimulatorError> {
    let mut configuration = match matches.get_one::<PathBuf>("config") {
        Some(path) => Configuration::from_toml_file(path)?,
        None => Configuration::default(),
    };

    if let Some(host) = matches.get_one::<String>("host") {
        configuration.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("web") {
        configuration.web_port = *port;
    }
    if let Some(port) = matches.get_one::<u16>("controls") {
        configuration.controls_port = *port;
    }
    if let Some(port) = matches.get_one::<u16>("fdm-data") {
        configuration.fdm_data_port = *port;
    }
    if let Some(port) = matches.get_one::<u16>("telemetry") {
        configuration.telemetry_port = *port;
    }
    if let Some(clients) = matches.get_many::<FdmClient>("fdm") {
        configuration.fdm_clients.extend(clients.cloned());
    }
    if let Some(dt) = matches.get_one::<f64>("dt") {
        configuration.dt = *dt;
    }
    if let Some(trim_mode) = matches.get_one::<TrimMode>("trim") {
        configuration.trim_mode = *trim_mode;
    }
    if let Some(aircraft) = matches.get_one::<String>("aircraft") {
        configuration.aircraft = aircraft.clone();
    }

    let ic = &mut configuration.initial_condition;
    if let Some(latitude) = matches.get_one::<f64>("latitude") {
        ic.latitude = *latitude;
    }
    if let Some(longitude) = matches.get_one::<f64>("longitude") {
        ic.longitude = *longitude;
    }
    if let Some(altitude) = matches.get_one::<f64>("altitude") {
        ic.altitude = *altitude;
    }
    if let Some(airspeed) = matches.get_one::<f64>("airspeed") {
        ic.airspeed = *airspeed;
    }
    if let Some(heading) = matches.get_one::<f64>("heading") {
        ic.heading = *heading;
    }

    if let Some(seed) = matches.get_one::<u64>("seed") {
        configuration.seed = Some(*seed);
    }

    Ok(configuration)
}
