use chrono::SecondsFormat;
use tracing::{debug, info, warn};

use super::{UploadError, Uploader};
use crate::polling::data::Payload;

/// ThingSpeak channel update: one form-encoded POST per cycle.
pub struct ThingSpeak {
    agent: ureq::Agent,
    url: String,
    write_api_key: String,
}

impl ThingSpeak {
    pub fn new(agent: ureq::Agent, url: &str, write_api_key: &str) -> Self {
        ThingSpeak {
            agent,
            url: url.to_string(),
            write_api_key: write_api_key.to_string(),
        }
    }

    pub fn form(&self, payload: &Payload) -> Vec<(String, String)> {
        let mut form = vec![
            ("api_key".to_string(), self.write_api_key.clone()),
            (
                "created_at".to_string(),
                payload.taken_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ];
        form.extend(
            payload
                .readings
                .iter()
                .map(|r| (r.field.to_string(), r.value.to_wire())),
        );
        form
    }
}

impl Uploader for ThingSpeak {
    fn upload(&mut self, payload: &Payload) -> Result<(), UploadError> {
        let form = self.form(payload);
        let pairs: Vec<(&str, &str)> = form.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        debug!("Posting {} fields to ThingSpeak", payload.len());

        let response = self.agent.post(&self.url).send_form(&pairs)?;
        let status = response.status();
        if status != 200 {
            warn!("Failed to send data to ThingSpeak. Status code: {}", status);
            return Err(UploadError::Status(status));
        }

        // Body is the new entry id; 0 means the update was dropped.
        let body = response.into_string()?;
        if body.trim() == "0" {
            return Err(UploadError::Rejected(
                "ThingSpeak returned entry id 0 (rate limited or invalid key)".to_string(),
            ));
        }
        info!("Data sent to ThingSpeak successfully, entry {}", body.trim());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::data::{FieldValue, Reading};
    use crate::upload::stub_server::serve_once;
    use chrono::{TimeZone, Utc};

    #[test]
    fn form_carries_key_timestamp_and_fields() {
        let client = ThingSpeak::new(ureq::agent(), "http://localhost/update", "KEY");
        let mut payload = Payload::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        payload.insert(Reading { name: "Temperature", field: "field1", value: FieldValue::Value(25.5) });
        payload.insert(Reading { name: "pH", field: "field4", value: FieldValue::Error });
        payload.insert(Reading { name: "GS_Sensor", field: "field8", value: FieldValue::Value(1.25) });

        let form = client.form(&payload);

        let expected: Vec<(String, String)> = [
            ("api_key", "KEY"),
            ("created_at", "2024-05-01T12:00:00Z"),
            ("field1", "25.5"),
            ("field4", "Error"),
            ("field8", "1.25"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(form, expected);
    }

    fn one_reading() -> Payload {
        let mut payload = Payload::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        payload.insert(Reading { name: "Temperature", field: "field1", value: FieldValue::Value(25.5) });
        payload
    }

    #[test]
    fn entry_id_means_accepted() {
        let (url, server) = serve_once("200 OK", "42");
        let mut client = ThingSpeak::new(ureq::agent(), &url, "KEY");

        client.upload(&one_reading()).unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /update"));
        assert!(request.contains("api_key=KEY"));
        assert!(request.contains("field1=25.5"));
    }

    #[test]
    fn entry_id_zero_is_rejected() {
        let (url, server) = serve_once("200 OK", "0");
        let mut client = ThingSpeak::new(ureq::agent(), &url, "KEY");

        let err = client.upload(&one_reading()).unwrap_err();

        assert!(matches!(err, UploadError::Rejected(_)));
        server.join().unwrap();
    }

    #[test]
    fn error_status_is_reported() {
        let (url, server) = serve_once("400 Bad Request", "-1");
        let mut client = ThingSpeak::new(ureq::agent(), &url, "KEY");

        let err = client.upload(&one_reading()).unwrap_err();

        assert!(matches!(err, UploadError::Status(400)));
        server.join().unwrap();
    }
}
