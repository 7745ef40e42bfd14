//! TI ADS1115 16-bit ADC over I2C.
//!
//! Only the single-shot, single-ended path is used: one input against GND,
//! PGA at +/-4.096 V, 128 samples per second.

use std::time::Duration;
use embedded_hal::i2c::I2c;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AdcConfig;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const OS_START: u16 = 0x8000;
const MUX_SINGLE_AIN0: u16 = 0b100;
const PGA_4_096V: u16 = 0b001 << 9;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
const DR_128SPS: u16 = 0b100 << 5;
const COMP_DISABLE: u16 = 0b11;

// One conversion at 128 SPS takes ~7.8 ms.
const POLL_INTERVAL: Duration = Duration::from_millis(2);
const MAX_POLLS: u32 = 25;

#[derive(Error, Debug)]
pub enum AdcError {
    #[error("I2C error: {0}")]
    Bus(String),

    #[error("Invalid channel: {0}. Channel must be between 0 and 3.")]
    InvalidChannel(u8),

    #[error("Conversion did not complete after {0} polls")]
    Timeout(u32),
}

pub type Result<T> = std::result::Result<T, AdcError>;

/// Source of one analog voltage, in volts.
pub trait AnalogInput {
    fn read_voltage(&mut self) -> Result<f64>;
}

pub struct Ads1115<I> {
    i2c: I,
    address: u8,
    channel: u8,
    full_scale: f64,
    reference_volts: f64,
}

impl<I: I2c> Ads1115<I> {
    pub fn new(i2c: I, config: &AdcConfig) -> Result<Self> {
        if config.channel > 3 {
            return Err(AdcError::InvalidChannel(config.channel));
        }
        info!(
            "Initializing ADS1115 at {:#04x}, channel {}",
            config.address, config.channel
        );
        Ok(Ads1115 {
            i2c,
            address: config.address,
            channel: config.channel,
            full_scale: config.full_scale,
            reference_volts: config.reference_volts,
        })
    }

    fn config_word(&self) -> u16 {
        OS_START
            | ((MUX_SINGLE_AIN0 + self.channel as u16) << 12)
            | PGA_4_096V
            | MODE_SINGLE_SHOT
            | DR_128SPS
            | COMP_DISABLE
    }

    fn read_register(&mut self, register: u8) -> Result<u16> {
        let mut buf = [0_u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(|e| AdcError::Bus(format!("{:?}", e)))?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Starts a conversion and waits for it, returning the signed raw count.
    pub fn read_raw(&mut self) -> Result<i16> {
        let [hi, lo] = self.config_word().to_be_bytes();
        self.i2c
            .write(self.address, &[REG_CONFIG, hi, lo])
            .map_err(|e| AdcError::Bus(format!("{:?}", e)))?;

        for _ in 0..MAX_POLLS {
            std::thread::sleep(POLL_INTERVAL);
            if self.read_register(REG_CONFIG)? & OS_START != 0 {
                let raw = self.read_register(REG_CONVERSION)? as i16;
                debug!("ADS1115 channel {} raw: {}", self.channel, raw);
                return Ok(raw);
            }
        }
        Err(AdcError::Timeout(MAX_POLLS))
    }

    #[cfg(test)]
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> AnalogInput for Ads1115<I> {
    fn read_voltage(&mut self) -> Result<f64> {
        let raw = self.read_raw()?;
        Ok(to_voltage(raw, self.full_scale, self.reference_volts))
    }
}

pub fn to_voltage(raw: i16, full_scale: f64, reference_volts: f64) -> f64 {
    raw as f64 / full_scale * reference_volts
}
