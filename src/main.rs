// in-crate modules
mod config;
mod tsl4531;

// in-crate imports
use config::*;
use tsl4531::TSL4531;

// my libraries
use xdg_dirs::{dirs, xdg_location_of, xdg_user_dir};

// STD
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::{fs, thread, time};

// 3rd party libraries
use anyhow::Context;
use clap::{Parser, Subcommand, command};
use embedded_hal::i2c::I2c;
use ftdi_embedded_hal as hal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "tsl4531/config.ron";

const DEFAULT_CONFIG: &str = r#"
(
    bridge: (vid: 0x0403, pid: 0x6014),
    address: Primary,
    integration_time_ms: 100,
    mode: Normal,
    power_save_skip: true,
    poll_interval_ms: 1000,
)
"#;

#[derive(Debug, Subcommand, PartialEq)]
enum Command {
    #[command(about = "(default) Configure the sensor and print its lux value periodically.")]
    Run,

    #[command(about = "Take a single lux reading.")]
    Read,

    #[command(about = "Print the detected part and its current configuration.")]
    Info,

    #[command(about = "Turn the sensor off to save power.")]
    Off,

    #[command(about = "Check configuration file syntax and print out the settings.")]
    Check,

    #[command(about = "Generate a default config file")]
    GenConfig,
}

#[derive(Debug, Parser, PartialEq)]
#[command(
    about = "Read a TSL4531 ambient light sensor over an FTDI USB-I2C bridge",
    version
)]
struct Args {
    #[arg(
        global = true,
        short,
        long = "config",
        help = format!("Path to configuration file. Defaults to `{CONFIG_PATH}` under the user's config directory."),
    )]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Args {
    /// Get the config path, and verify the file exists. This is the either the path passed as an arg, or from the XDG directory if not specified.
    ///
    /// This returns error if the path does not exist.
    fn get_config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config_path {
            Some(path) => path
                .canonicalize()
                .with_context(|| format!("Could not open config file `{0}`", path.display())),
            None => xdg_location_of(&dirs::CONFIG, CONFIG_PATH)
                .with_context(|| "Could not open config file"),
        }
    }
}

/// Load the configuration based on arguments.
/// Uses the file supplied to the CLI, or in the default location if not specified, or the default config if there is no file.
fn get_config(args: &Args) -> anyhow::Result<Config> {
    match args.get_config_path() {
        Ok(path) => {
            info!("Reading config from {path}", path = path.display());
            Config::read_from_file(&path)
                .with_context(|| format!("Failed to parse config file {0}", path.display()))
        }
        Err(err) => {
            warn!("Config file not found in any standard locations, using default configuration.");
            warn!("  Config search error: {err:#}");
            Config::from_str(DEFAULT_CONFIG)
        }
    }
}

/// Driver errors are generic over the bridge's error type, so flatten them to a message for anyhow.
fn sensor_error<E: std::fmt::Debug>(e: tsl4531::Error<E>) -> anyhow::Error {
    anyhow::anyhow!("{e}")
}

/// Open the FTDI bridge and connect to the sensor, applying the configured settings.
///
/// Returns the sensor along with the part that was detected.
fn connect(config: &Config) -> anyhow::Result<(TSL4531<impl I2c>, tsl4531::Part)> {
    let device = ftdi::find_by_vid_pid(config.bridge.vid, config.bridge.pid)
        .interface(ftdi::Interface::A)
        .open()
        .with_context(|| {
            format!(
                "Could not open FTDI device {0:04x}:{1:04x}",
                config.bridge.vid, config.bridge.pid
            )
        })?;
    let i2c = hal::FtHal::init_default(device)?.i2c()?;

    let mut sensor = TSL4531::new(i2c, config.address.to_i2c());
    let part = sensor
        .initialize()
        .map_err(sensor_error)
        .with_context(|| format!("Failed to initialize sensor at {0:#04x}", sensor.address()))?;
    info!("Found {part:?} at {0:#04x}", sensor.address());

    configure(&mut sensor, config)
        .map_err(sensor_error)
        .with_context(|| "Failed to configure sensor")?;

    Ok((sensor, part))
}

/// Apply the configured settings. Mode goes last so the sensor starts converting with the new timing.
fn configure<I: I2c>(
    sensor: &mut TSL4531<I>,
    config: &Config,
) -> Result<(), tsl4531::Error<I::Error>> {
    sensor.set_power_save_skip(config.power_save_skip)?;
    sensor.set_integration_time(config.integration_time())?;
    sensor.set_mode(config.mode)
}

/// Read the data registers once and return the raw count with the lux computed from it.
fn take_reading<I: I2c>(
    sensor: &mut TSL4531<I>,
) -> Result<(u16, f32), tsl4531::Error<I::Error>> {
    let raw = sensor.raw_reading()?;
    Ok((raw, sensor.calculate_lux(raw)))
}

/// Time for one full integration period, plus a little margin for the conversion.
fn integration_period(sensor: &TSL4531<impl I2c>) -> time::Duration {
    time::Duration::from_millis(sensor.integration_time().as_millis() as u64 + 10)
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("args = {args:?}");

    // process commands
    match args.command {
        // Primary behaviour: repeatedly read and print the lux value
        None | Some(Command::Run) => main_loop(&args),

        Some(Command::Read) => read_once(&args),

        Some(Command::Info) => print_info(&args),

        Some(Command::Off) => power_off(&args),

        // Test config file: make sure it exists, can be read, and can be parsed
        Some(Command::Check) => check_config(&args),

        // Generate config file: if the file does not already exist, write
        Some(Command::GenConfig) => gen_config_file(&args),
    }
}

/// Verify the config file: Make sure it can be found at the expected location (passed through CLI or using XDG config location), and parses properly.
fn check_config(args: &Args) -> anyhow::Result<()> {
    // Try to _find_ the config file
    let path = args
        .get_config_path()
        .with_context(|| "Failed to find config file")?;

    // Try to _parse_ the config file
    println!("Attempting to load config from `{0}`", path.display());
    let config = Config::read_from_file(path).with_context(|| "Failed to parse configuration")?;

    println!("Successfully read config: {config:#?}");
    println!(
        "  Sensor address: {0:#04x}, integration time: {1}ms",
        config.address.to_i2c(),
        config.integration_time().as_millis()
    );

    Ok(())
}

/// Generate a default configuration file, at the expected location based on args or environment variables.
fn gen_config_file(args: &Args) -> anyhow::Result<()> {
    // CLI arg path, or default from environment
    let path = args
        .config_path
        .clone()
        .map_or_else(|| xdg_user_dir(&dirs::CONFIG, CONFIG_PATH), Ok)
        .with_context(|| "Could not determine location for config file")?;

    // Create parent directory path if applicable
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "Failed to create parent directory of the new config file {0}",
                path.display()
            )
        })?;
    }

    // Create the new file and write the default contents
    let mut file = File::create_new(&path)
        .with_context(|| format!("Failed to create new config file {0}", path.display()))?;

    write!(file, "{}", DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write the new config file {0}", path.display()))?;

    println!("Wrote default config to {0}", path.display());
    Ok(())
}

/// Take one reading. In one-shot mode the conversion is triggered again first.
fn read_once(args: &Args) -> anyhow::Result<()> {
    let config = get_config(args)?;
    let (mut sensor, _) = connect(&config)?;

    if sensor.mode() == tsl4531::Mode::OneShot {
        sensor
            .set_mode(tsl4531::Mode::OneShot)
            .map_err(sensor_error)?;
    }
    thread::sleep(integration_period(&sensor));

    let (raw, lux) = take_reading(&mut sensor).map_err(sensor_error)?;
    println!("lux={lux}, raw={raw}");

    Ok(())
}

fn print_info(args: &Args) -> anyhow::Result<()> {
    let config = get_config(args)?;
    let (sensor, part) = connect(&config)?;

    println!("Device: {part:?} at {0:#04x}", sensor.address());
    println!("  Mode: {0:?}", sensor.mode());
    println!(
        "  Integration time: {0}ms",
        sensor.integration_time().as_millis()
    );
    println!("  Power save skip: {0}", sensor.power_save_skip());

    Ok(())
}

fn power_off(args: &Args) -> anyhow::Result<()> {
    let config = get_config(args)?;
    let (mut sensor, _) = connect(&config)?;

    sensor
        .set_mode(tsl4531::Mode::Off)
        .map_err(sensor_error)
        .with_context(|| "Failed to turn off sensor")?;
    println!("Sensor at {0:#04x} is off", sensor.address());

    Ok(())
}

/// Default daemon behaviour: Read config file, then read the sensor forever.
fn main_loop(args: &Args) -> anyhow::Result<()> {
    // Read in configuration, or load default configuration
    let config = get_config(args)?;
    info!("Loaded configuration: {config:?}");

    let (mut sensor, _) = connect(&config)?;
    let interval = time::Duration::from_millis(config.poll_interval_ms);

    // Wait for the first conversion to complete
    thread::sleep(integration_period(&sensor));

    loop {
        if sensor.mode() == tsl4531::Mode::OneShot {
            sensor
                .set_mode(tsl4531::Mode::OneShot)
                .map_err(sensor_error)?;
            thread::sleep(integration_period(&sensor));
        }

        let lux = sensor.lux().map_err(sensor_error)?;
        println!("lux={lux}");

        thread::sleep(interval);
    }
}
