pub mod data;
pub mod measurements;

use std::time::Duration;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::devices::ads1115::AnalogInput;
use crate::devices::soil_probe::RegisterReader;
use crate::upload::Uploader;
use data::{FieldValue, Payload, Reading};
use measurements::{Measurement, ADC_FIELD, ADC_NAME, MEASUREMENTS};

/// Outcome of one poll-and-upload cycle
#[derive(Debug)]
pub struct CycleReport {
    pub payload: Payload,
    pub uploaded: bool,
}

/// Owns the sensor handles and the destination for the process lifetime.
pub struct Poller<R, A, U> {
    probe: R,
    adc: Option<A>,
    uploader: U,
    interval: Duration,
}

impl<R, A, U> Poller<R, A, U>
where
    R: RegisterReader,
    A: AnalogInput,
    U: Uploader,
{
    pub fn new(probe: R, adc: Option<A>, uploader: U, interval: Duration) -> Self {
        Poller { probe, adc, uploader, interval }
    }

    fn read_adc(adc: &mut A) -> FieldValue {
        match adc.read_voltage() {
            Ok(volts) => {
                info!("{}: {}", ADC_NAME, volts);
                FieldValue::Value(volts)
            }
            Err(e) => {
                error!("Error reading ADC sensor data: {}", e);
                FieldValue::Error
            }
        }
    }

    fn read_measurement(&mut self, measurement: &Measurement) -> FieldValue {
        match measurement.read(&mut self.probe) {
            Ok(value) => {
                info!("{}: {}", measurement.name, value);
                FieldValue::Value(value)
            }
            Err(e) => {
                error!("Error reading {}: {}", measurement.name, e);
                FieldValue::Error
            }
        }
    }

    /// Reads the probe, then the ADC, and uploads the result. Never fails: each
    /// reading and the upload are caught and logged on their own.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut payload = Payload::new(Utc::now());

        for measurement in MEASUREMENTS.iter() {
            let value = self.read_measurement(measurement);
            payload.insert(Reading {
                name: measurement.name,
                field: measurement.field,
                value,
            });
        }

        // field8 comes last on the wire
        if let Some(adc) = self.adc.as_mut() {
            let value = Self::read_adc(adc);
            payload.insert(Reading { name: ADC_NAME, field: ADC_FIELD, value });
        }

        if let Ok(json) = serde_json::to_string(&payload) {
            debug!("Cycle payload: {}", json);
        }
        let failures = payload.failures();
        if failures > 0 {
            warn!("{} of {} readings failed this cycle", failures, payload.len());
        }

        let uploaded = match self.uploader.upload(&payload) {
            Ok(()) => true,
            Err(e) => {
                error!("Error sending data: {}", e);
                false
            }
        };

        CycleReport { payload, uploaded }
    }

    /// Polls forever at the configured interval.
    pub fn run(&mut self) -> ! {
        info!("Starting polling loop, interval {:?}", self.interval);
        loop {
            let report = self.run_cycle();
            if !report.uploaded {
                warn!(
                    "Cycle from {} not uploaded, {} readings dropped",
                    report.payload.taken_at,
                    report.payload.len()
                );
            }
            std::thread::sleep(self.interval);
        }
    }
}
