//! Register map and unit conversion for the 7-in-1 soil probe.

use crate::devices::soil_probe::{self, RegisterReader};

/// What to do with the signed register value before publishing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Raw,
    Divide(f64),
    DivideClampMax { divisor: f64, max: f64 },
}

impl Transform {
    pub fn apply(self, raw: i16) -> f64 {
        let value = raw as f64;
        match self {
            Transform::Raw => value,
            Transform::Divide(divisor) => value / divisor,
            Transform::DivideClampMax { divisor, max } => (value / divisor).min(max),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub name: &'static str,
    pub address: u16,
    pub words: u16,
    pub field: &'static str,
    pub transform: Transform,
}

/// Probe registers in upload order.
pub const MEASUREMENTS: [Measurement; 7] = [
    Measurement {
        name: "Temperature",
        address: 0x13,
        words: 2,
        field: "field1",
        transform: Transform::Divide(10.0), // 0.1 °C
    },
    Measurement {
        name: "Moisture",
        address: 0x12,
        words: 2,
        field: "field2",
        transform: Transform::DivideClampMax { divisor: 10.0, max: 100.0 }, // 0.1 %
    },
    Measurement {
        name: "Conductivity",
        address: 0x15,
        words: 1,
        field: "field3",
        transform: Transform::Raw, // uS/cm
    },
    Measurement {
        name: "pH",
        address: 0x06,
        words: 1,
        field: "field4",
        transform: Transform::Divide(100.0), // 0.01 pH
    },
    Measurement {
        name: "Nitrogen",
        address: 0x1E,
        words: 1,
        field: "field5",
        transform: Transform::Raw, // mg/kg
    },
    Measurement {
        name: "Phosphorus",
        address: 0x1F,
        words: 1,
        field: "field6",
        transform: Transform::Raw,
    },
    Measurement {
        name: "Potassium",
        address: 0x20,
        words: 1,
        field: "field7",
        transform: Transform::Raw,
    },
];

/// Name and field the analog channel is published under.
pub const ADC_NAME: &str = "GS_Sensor";
pub const ADC_FIELD: &str = "field8";

/// Reinterprets a register word as a two's-complement 16-bit integer.
pub fn twos_complement(word: u16) -> i16 {
    word as i16
}

impl Measurement {
    pub fn decode(&self, word: u16) -> f64 {
        self.transform.apply(twos_complement(word))
    }

    /// Reads the registers for this measurement and decodes the first word.
    pub fn read<R: RegisterReader>(&self, reader: &mut R) -> soil_probe::Result<f64> {
        let words = reader.read_registers(self.address, self.words)?;
        let first = words.first().copied().ok_or_else(|| {
            soil_probe::ProbeError::UnexpectedResponse("no registers returned".to_string())
        })?;
        Ok(self.decode(first))
    }
}
