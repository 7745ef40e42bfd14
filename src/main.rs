mod config;
mod devices;
mod polling;
mod upload;

use std::path::PathBuf;
use std::time::Duration;
use linux_embedded_hal::I2cdev;
use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use config::Config;
use devices::{Ads1115, SoilProbe};
use polling::Poller;
use upload::Backend;

const CONFIG_ENV: &str = "SOIL_TELEMETRY_CONFIG";
const DEFAULT_CONFIG: &str = "soil-telemetry.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Resolve and load configuration
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", config_path.display(), e);
            return Err(Box::new(e));
        }
    };

    // Set up logging; the guard must outlive the polling loop
    let _guard = setup_logging(&config);
    info!("Starting soil telemetry with configuration from {}", config_path.display());

    // Open the soil probe on its serial port
    let probe = match SoilProbe::open(&config.serial) {
        Ok(probe) => probe,
        Err(e) => {
            error!("Failed to open soil probe on {}: {}", config.serial.port, e);
            return Err(Box::new(e));
        }
    };

    // Initialize the optional ADC channel
    let adc = match &config.adc {
        Some(adc_config) => {
            let bus = I2cdev::new(&adc_config.i2c_bus).map_err(|e| {
                error!("Failed to open I2C bus {}: {}", adc_config.i2c_bus, e);
                e
            })?;
            Some(Ads1115::new(bus, adc_config)?)
        }
        None => {
            info!("No ADC configured, reporting soil probe only");
            None
        }
    };

    // Poll and upload until the process is stopped
    let backend = Backend::from_config(&config.backend);
    let mut poller = Poller::new(probe, adc, backend, Duration::from_secs(config.interval_secs));
    poller.run()
}

fn setup_logging(config: &Config) -> WorkerGuard {
    // Daily rotating file, mirrored to the console
    let file_appender = rolling::daily(&config.log_dir, "soil-telemetry.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    fmt()
        .with_writer(non_blocking.and(std::io::stdout))
        .with_ansi(false)
        .with_level(true)
        .with_max_level(Level::INFO)
        .init();

    guard
}
