//! Broker connection string.
//!
//! Format: `;`-separated `Key=Value` pairs, e.g.
//!
//! ```text
//! HostName=my-hub.example.net;DeviceId=sensor-01;SharedAccessKey=c2VjcmV0
//! ```
//!
//! `HostName` and `DeviceId` are required, plus exactly one of
//! `SharedAccessKey` or a pre-computed `SharedAccessSignature`.
//! Unknown keys (e.g. `GatewayHostName`, `ModuleId`) are ignored.

use core::fmt;

use crate::error::{Error, Result};
use crate::sas;

/// How the device authenticates to the broker.
#[derive(Clone, PartialEq, Eq)]
pub enum DeviceAuth {
    /// Base64 key; tokens are generated on demand.
    SharedAccessKey(String),
    /// Ready-made token, used verbatim.
    SharedAccessSignature(String),
}

// Keys never show up in logs.
impl fmt::Debug for DeviceAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedAccessKey(_) => write!(f, "SharedAccessKey(..)"),
            Self::SharedAccessSignature(_) => write!(f, "SharedAccessSignature(..)"),
        }
    }
}

/// Parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    host_name: String,
    device_id: String,
    auth: DeviceAuth,
}

impl ConnectionString {
    pub fn parse(s: &str) -> Result<Self> {
        let mut host_name = None;
        let mut device_id = None;
        let mut key = None;
        let mut signature = None;

        for part in s.trim().split(';').filter(|p| !p.is_empty()) {
            // Values may contain '=' (base64 padding); split on the first one.
            let (k, v) = part
                .split_once('=')
                .ok_or(Error::Config("connection string segment without '='"))?;
            let v = v.trim();
            match k.trim() {
                "HostName" => host_name = Some(v),
                "DeviceId" => device_id = Some(v),
                "SharedAccessKey" => key = Some(v),
                "SharedAccessSignature" => signature = Some(v),
                _ => {}
            }
        }

        let host_name = host_name
            .filter(|v| !v.is_empty())
            .ok_or(Error::Config("connection string has no HostName"))?;
        let device_id = device_id
            .filter(|v| !v.is_empty())
            .ok_or(Error::Config("connection string has no DeviceId"))?;
        let auth = match (key.filter(|v| !v.is_empty()), signature.filter(|v| !v.is_empty())) {
            (Some(k), None) => DeviceAuth::SharedAccessKey(k.to_owned()),
            (None, Some(sig)) => DeviceAuth::SharedAccessSignature(sig.to_owned()),
            (Some(_), Some(_)) => {
                return Err(Error::Config("connection string has both key and signature"));
            }
            (None, None) => return Err(Error::Config("connection string has no credentials")),
        };

        Ok(Self {
            host_name: host_name.to_owned(),
            device_id: device_id.to_owned(),
            auth,
        })
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn auth(&self) -> &DeviceAuth {
        &self.auth
    }

    /// Token resource: `<host>/devices/<device>`.
    pub fn resource_uri(&self) -> String {
        format!("{}/devices/{}", self.host_name, self.device_id)
    }

    /// MQTT user name expected by the broker.
    pub fn mqtt_username(&self) -> String {
        format!("{}/{}/?api-version=2021-04-12", self.host_name, self.device_id)
    }

    /// Topic for device-to-cloud telemetry.
    pub fn telemetry_topic(&self) -> String {
        format!("devices/{}/messages/events/", self.device_id)
    }

    /// Topic filter for cloud-to-device messages.
    pub fn c2d_topic_filter(&self) -> String {
        format!("devices/{}/messages/devicebound/#", self.device_id)
    }

    /// Password for the broker: the stored signature, or a fresh token
    /// valid until `expiry` (Unix seconds).
    pub fn password(&self, expiry: u64) -> Result<String> {
        match &self.auth {
            DeviceAuth::SharedAccessSignature(sig) => Ok(sig.clone()),
            DeviceAuth::SharedAccessKey(key) => sas::generate_token(&self.resource_uri(), key, expiry),
        }
    }
}
