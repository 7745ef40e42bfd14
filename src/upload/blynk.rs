use tracing::{debug, info, warn};

use super::{UploadError, Uploader};
use crate::polling::data::Payload;

/// Blynk virtual-pin writes through the HTTP batch update endpoint.
pub struct Blynk {
    agent: ureq::Agent,
    url: String,
    auth_token: String,
}

/// `fieldN` is written to virtual pin `VN`.
pub fn virtual_pin(field: &str) -> Option<u8> {
    field.strip_prefix("field")?.parse().ok()
}

impl Blynk {
    pub fn new(agent: ureq::Agent, url: &str, auth_token: &str) -> Self {
        Blynk {
            agent,
            url: url.to_string(),
            auth_token: auth_token.to_string(),
        }
    }

    pub fn pin_writes(&self, payload: &Payload) -> Result<Vec<(String, String)>, UploadError> {
        payload
            .readings
            .iter()
            .map(|r| {
                let pin = virtual_pin(r.field)
                    .ok_or_else(|| UploadError::UnmappedField(r.field.to_string()))?;
                Ok((format!("V{}", pin), r.value.to_wire()))
            })
            .collect()
    }
}

impl Uploader for Blynk {
    fn upload(&mut self, payload: &Payload) -> Result<(), UploadError> {
        let writes = self.pin_writes(payload)?;
        debug!("Writing {} virtual pins to Blynk", writes.len());

        let mut request = self.agent.get(&self.url).query("token", &self.auth_token);
        for (pin, value) in &writes {
            request = request.query(pin, value);
        }
        let response = request.call()?;
        let status = response.status();
        if status != 200 {
            warn!("Failed to send data to Blynk. Status code: {}", status);
            return Err(UploadError::Status(status));
        }
        info!("Data sent to Blynk successfully.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::data::{FieldValue, Reading};
    use crate::upload::stub_server::serve_once;
    use chrono::Utc;

    #[test]
    fn field_number_selects_pin() {
        assert_eq!(virtual_pin("field1"), Some(1));
        assert_eq!(virtual_pin("field8"), Some(8));
        assert_eq!(virtual_pin("GS_Sensor"), None);
    }

    #[test]
    fn pin_writes_include_error_markers() {
        let client = Blynk::new(ureq::agent(), "http://localhost/batch/update", "TOKEN");
        let mut payload = Payload::new(Utc::now());
        payload.insert(Reading { name: "GS_Sensor", field: "field8", value: FieldValue::Value(0.5) });
        payload.insert(Reading { name: "Moisture", field: "field2", value: FieldValue::Error });
        payload.insert(Reading { name: "Potassium", field: "field7", value: FieldValue::Value(88.0) });

        let writes = client.pin_writes(&payload).unwrap();

        assert_eq!(
            writes,
            vec![
                ("V8".to_string(), "0.5".to_string()),
                ("V2".to_string(), "Error".to_string()),
                ("V7".to_string(), "88".to_string()),
            ]
        );
    }

    #[test]
    fn unmapped_field_is_an_error() {
        let client = Blynk::new(ureq::agent(), "http://localhost/batch/update", "TOKEN");
        let mut payload = Payload::new(Utc::now());
        payload.insert(Reading { name: "Odd", field: "extra", value: FieldValue::Value(1.0) });

        assert!(matches!(client.pin_writes(&payload), Err(UploadError::UnmappedField(_))));
    }

    #[test]
    fn batch_write_sends_token_and_pins() {
        let (url, server) = serve_once("200 OK", "");
        let mut client = Blynk::new(ureq::agent(), &url, "TOKEN");
        let mut payload = Payload::new(Utc::now());
        payload.insert(Reading { name: "pH", field: "field4", value: FieldValue::Value(6.89) });
        payload.insert(Reading { name: "Nitrogen", field: "field5", value: FieldValue::Error });

        client.upload(&payload).unwrap();

        let request = server.join().unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /update?"));
        assert!(request_line.contains("token=TOKEN"));
        assert!(request_line.contains("V4=6.89"));
        assert!(request_line.contains("V5=Error"));
    }

    #[test]
    fn error_status_is_reported() {
        let (url, server) = serve_once("400 Bad Request", r#"{"error":{"message":"Invalid token."}}"#);
        let mut client = Blynk::new(ureq::agent(), &url, "TOKEN");
        let mut payload = Payload::new(Utc::now());
        payload.insert(Reading { name: "pH", field: "field4", value: FieldValue::Value(6.89) });

        let err = client.upload(&payload).unwrap_err();

        assert!(matches!(err, UploadError::Status(400)));
        server.join().unwrap();
    }
}
