use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Literal sent to the dashboards in place of a failed reading.
pub const ERROR_MARKER: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Value(f64),
    Error,
}

impl FieldValue {
    pub fn is_error(&self) -> bool {
        matches!(self, FieldValue::Error)
    }

    /// Wire representation shared by every backend.
    pub fn to_wire(&self) -> String {
        match self {
            FieldValue::Value(v) => v.to_string(),
            FieldValue::Error => ERROR_MARKER.to_string(),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Value(v) => serializer.serialize_f64(*v),
            FieldValue::Error => serializer.serialize_str(ERROR_MARKER),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub name: &'static str,
    pub field: &'static str, // ThingSpeak field / Blynk pin source
    pub value: FieldValue,
}

/// One cycle's worth of readings, in field order.
#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub taken_at: DateTime<Utc>,
    pub readings: Vec<Reading>,
}

impl Payload {
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        Payload { taken_at, readings: Vec::new() }
    }

    /// Adds a reading; a second value for the same field replaces the first.
    pub fn insert(&mut self, reading: Reading) {
        match self.readings.iter_mut().find(|r| r.field == reading.field) {
            Some(existing) => *existing = reading,
            None => self.readings.push(reading),
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn failures(&self) -> usize {
        self.readings.iter().filter(|r| r.value.is_error()).count()
    }

    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.readings.iter().find(|r| r.field == field).map(|r| r.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_field_keeps_one_value() {
        let mut payload = Payload::new(Utc::now());
        payload.insert(Reading { name: "pH", field: "field4", value: FieldValue::Error });
        payload.insert(Reading { name: "pH", field: "field4", value: FieldValue::Value(6.5) });

        assert_eq!(payload.len(), 1);
        assert_eq!(payload.get("field4"), Some(FieldValue::Value(6.5)));
    }

    #[test]
    fn error_marker_serializes_as_string() {
        let reading = Reading { name: "Nitrogen", field: "field5", value: FieldValue::Error };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["value"], "Error");

        let reading = Reading { name: "Nitrogen", field: "field5", value: FieldValue::Value(12.0) };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["value"], 12.0);
    }

    #[test]
    fn wire_format() {
        assert_eq!(FieldValue::Value(25.5).to_wire(), "25.5");
        assert_eq!(FieldValue::Value(40.0).to_wire(), "40");
        assert_eq!(FieldValue::Error.to_wire(), "Error");
    }
}
