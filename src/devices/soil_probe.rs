use std::io::{self, Read, Write};
use std::time::Duration;
use crc_any::CRCu16;
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::SerialConfig;

const READ_HOLDING_REGISTERS: u8 = 0x03;
const EXCEPTION_FLAG: u8 = 0x80;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    #[error("CRC mismatch: computed {computed:#06x}, received {received:#06x}")]
    CrcMismatch { computed: u16, received: u16 },

    #[error("Slave returned exception code {0:#04x}")]
    Exception(u8),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Anything that can answer a holding-register read.
pub trait RegisterReader {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;
}

/// Byte link to the probe. Input left over from an earlier exchange (a late
/// or malformed reply) must be droppable before the next request.
pub trait ProbeLink: Read + Write {
    fn discard_input(&mut self) -> io::Result<()>;
}

impl ProbeLink for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// 7-in-1 soil probe (NPK, temperature, moisture, conductivity, pH) on a
/// Modbus RTU link.
pub struct SoilProbe<T> {
    link: T,
    slave_id: u8,
}

impl SoilProbe<Box<dyn SerialPort>> {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        info!(
            "Opening soil probe on {} at {} baud, slave {}",
            config.port, config.baud_rate, config.slave_id
        );
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()?;
        Ok(Self::new(port, config.slave_id))
    }
}

impl<T: ProbeLink> SoilProbe<T> {
    pub fn new(link: T, slave_id: u8) -> Self {
        SoilProbe { link, slave_id }
    }

    /// Drops whatever is left of a rejected frame so the next exchange
    /// starts on a frame boundary.
    fn resync(&mut self, remaining: u64) {
        if remaining > 0 {
            let _ = io::copy(&mut (&mut self.link).take(remaining), &mut io::sink());
        }
        if let Err(e) = self.link.discard_input() {
            warn!("Failed to discard soil probe input: {}", e);
        }
    }

    fn transact(&mut self, request: &[u8], count: u16) -> Result<Vec<u16>> {
        self.link.discard_input()?;
        debug!("Sending request to soil probe: {:02X?}", request);
        self.link.write_all(request)?;
        self.link.flush()?;

        let mut head = [0_u8; 3];
        self.link.read_exact(&mut head)?;

        if head[0] != self.slave_id {
            self.resync(0);
            return Err(ProbeError::UnexpectedResponse(format!(
                "reply from slave {} while talking to slave {}",
                head[0], self.slave_id
            )));
        }

        if head[1] == READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
            let mut tail = [0_u8; 2];
            self.link.read_exact(&mut tail)?;
            let frame = [head[0], head[1], head[2], tail[0], tail[1]];
            check_crc(&frame)?;
            error!("Soil probe answered with exception code {:#04x}", head[2]);
            return Err(ProbeError::Exception(head[2]));
        }

        if head[1] != READ_HOLDING_REGISTERS {
            self.resync(0);
            return Err(ProbeError::UnexpectedResponse(format!(
                "function code {:#04x}",
                head[1]
            )));
        }

        let expected = count as usize * 2;
        if head[2] as usize != expected {
            self.resync(head[2] as u64 + 2);
            return Err(ProbeError::UnexpectedResponse(format!(
                "byte count {}, expected {}",
                head[2], expected
            )));
        }

        let mut frame = head.to_vec();
        frame.resize(3 + expected + 2, 0);
        self.link.read_exact(&mut frame[3..])?;
        debug!("Received response from soil probe: {:02X?}", frame);
        check_crc(&frame)?;

        Ok(frame[3..3 + expected]
            .chunks_exact(2)
            .map(|word| u16::from_be_bytes([word[0], word[1]]))
            .collect())
    }
}

impl<T: ProbeLink> RegisterReader for SoilProbe<T> {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        if count == 0 || count > 125 {
            return Err(ProbeError::UnexpectedResponse(format!(
                "register count {} out of range 1..=125",
                count
            )));
        }
        let request = read_request(self.slave_id, address, count);
        let words = self.transact(&request, count)?;
        debug!("Registers {:#06x}+{}: {:?}", address, count, words);
        Ok(words)
    }
}

fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRCu16::crc16modbus();
    crc.digest(data);
    crc.get_crc()
}

/// Builds a "read holding registers" frame, CRC appended low byte first.
pub fn read_request(slave_id: u8, address: u16, count: u16) -> [u8; 8] {
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let [count_hi, count_lo] = count.to_be_bytes();
    let body = [slave_id, READ_HOLDING_REGISTERS, addr_hi, addr_lo, count_hi, count_lo];
    let [crc_lo, crc_hi] = crc16(&body).to_le_bytes();
    [body[0], body[1], body[2], body[3], body[4], body[5], crc_lo, crc_hi]
}

fn check_crc(frame: &[u8]) -> Result<()> {
    let (body, tail) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    let computed = crc16(body);
    if computed != received {
        return Err(ProbeError::CrcMismatch { computed, received });
    }
    Ok(())
}
