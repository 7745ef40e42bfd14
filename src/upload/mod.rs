pub mod blynk;
pub mod thingspeak;

use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::BackendConfig;
use crate::polling::data::Payload;
pub use blynk::Blynk;
pub use thingspeak::ThingSpeak;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Server answered with status {0}")]
    Status(u16),

    #[error("Update rejected: {0}")]
    Rejected(String),

    #[error("No destination for field {0}")]
    UnmappedField(String),
}

impl From<ureq::Error> for UploadError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => UploadError::Status(code),
            ureq::Error::Transport(t) => UploadError::Transport(t.to_string()),
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Transport(err.to_string())
    }
}

/// Sends one cycle's payload to a cloud dashboard.
pub trait Uploader {
    fn upload(&mut self, payload: &Payload) -> Result<(), UploadError>;
}

/// The configured destination.
pub enum Backend {
    ThingSpeak(ThingSpeak),
    Blynk(Blynk),
}

impl Backend {
    pub fn from_config(config: &BackendConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        match config {
            BackendConfig::Thingspeak { url, write_api_key } => {
                info!("Uploading to ThingSpeak at {}", url);
                Backend::ThingSpeak(ThingSpeak::new(agent, url, write_api_key))
            }
            BackendConfig::Blynk { url, auth_token } => {
                info!("Uploading to Blynk at {}", url);
                Backend::Blynk(Blynk::new(agent, url, auth_token))
            }
        }
    }
}

impl Uploader for Backend {
    fn upload(&mut self, payload: &Payload) -> Result<(), UploadError> {
        match self {
            Backend::ThingSpeak(t) => t.upload(payload),
            Backend::Blynk(b) => b.upload(payload),
        }
    }
}
