//! Credential store adapter.
//!
//! Reads the fixed-size configuration blobs (Wi-Fi SSID, Wi-Fi password,
//! broker connection string) out of their storage zones.  Every read has
//! exactly three outcomes, expressed by [`ZoneRead`]:
//!
//! | Outcome  | Meaning                          | Error mapping          |
//! |----------|----------------------------------|------------------------|
//! | `Value`  | zone holds data                  | —                      |
//! | `Empty`  | zone blank, device unconfigured  | `Error::ConfigMissing` |
//! | `Failed` | storage driver error             | `Error::StorageFailure`|
//!
//! Nothing is cached: each bootstrap attempt re-reads the zones.

use log::{error, info};

use crate::app::ports::{StorageError, ZoneStore};
use crate::error::{Error, Result, Zone};

/// Zone capacity for the Wi-Fi SSID.
pub const WIFI_SSID_MAX_LEN: usize = 32;

/// Zone capacity for the Wi-Fi password.
pub const WIFI_PWD_MAX_LEN: usize = 64;

/// Zone capacity for the broker connection string.
pub const CONNECTION_STRING_MAX_LEN: usize = 200;

// ───────────────────────────────────────────────────────────────
// Credential record
// ───────────────────────────────────────────────────────────────

/// Bytes read from one zone, bounded by `N`, NUL padding stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential<const N: usize> {
    zone: Zone,
    bytes: heapless::Vec<u8, N>,
}

impl<const N: usize> Credential<N> {
    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// View the value as text.  Non-UTF-8 content is a configuration
    /// error rather than a storage failure.
    pub fn as_str(&self) -> Result<&str> {
        core::str::from_utf8(&self.bytes).map_err(|_| Error::Config("zone value is not valid UTF-8"))
    }
}

/// Three-way result of a zone read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneRead<const N: usize> {
    Value(Credential<N>),
    Empty,
    Failed(StorageError),
}

impl<const N: usize> ZoneRead<N> {
    /// Collapse into the crate error taxonomy.  `Empty` and `Failed` never
    /// map onto each other.
    pub fn into_result(self, zone: Zone) -> Result<Credential<N>> {
        match self {
            Self::Value(c) => Ok(c),
            Self::Empty => Err(Error::ConfigMissing(zone)),
            Self::Failed(e) => Err(Error::StorageFailure(zone, e)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// SSID and passphrase for station mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: heapless::String<WIFI_SSID_MAX_LEN>,
    pub password: heapless::String<WIFI_PWD_MAX_LEN>,
}

impl WifiCredentials {
    /// Build from borrowed strings, rejecting values that exceed the zones.
    pub fn new(ssid: &str, password: &str) -> Result<Self> {
        let mut c = Self::default();
        c.ssid
            .push_str(ssid)
            .map_err(|()| Error::Config("SSID longer than 32 bytes"))?;
        c.password
            .push_str(password)
            .map_err(|()| Error::Config("password longer than 64 bytes"))?;
        Ok(c)
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

/// Typed access to the credential zones of a [`ZoneStore`].
pub struct CredentialStore<S> {
    store: S,
}

impl<S: ZoneStore> CredentialStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store (e.g. for config persistence).
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Read up to `N` bytes from `zone`.
    pub fn read<const N: usize>(&self, zone: Zone) -> ZoneRead<N> {
        let mut buf = [0u8; N];
        let len = match self.store.read(zone, 0, &mut buf) {
            Ok(len) if len > N => return ZoneRead::Failed(StorageError::OutOfBounds),
            Ok(len) => len,
            Err(e) => return ZoneRead::Failed(e),
        };

        // Zones are NUL-padded; the value ends at the first NUL.
        let value = &buf[..len];
        let end = value.iter().position(|&b| b == 0).unwrap_or(len);
        if end == 0 {
            return ZoneRead::Empty;
        }

        let mut bytes = heapless::Vec::new();
        // Cannot overflow: `end <= N`.
        let _ = bytes.extend_from_slice(&value[..end]);
        ZoneRead::Value(Credential { zone, bytes })
    }

    pub fn wifi_ssid(&self) -> ZoneRead<WIFI_SSID_MAX_LEN> {
        self.read(Zone::WifiSsid)
    }

    pub fn wifi_password(&self) -> ZoneRead<WIFI_PWD_MAX_LEN> {
        self.read(Zone::WifiPassword)
    }

    pub fn connection_string(&self) -> ZoneRead<CONNECTION_STRING_MAX_LEN> {
        self.read(Zone::ConnectionString)
    }

    /// Read SSID and password for a station connect.
    ///
    /// An empty SSID aborts with `ConfigMissing`.  An empty password zone
    /// is passed through; the link manager decides whether the security
    /// policy allows it.
    pub fn wifi_credentials(&self) -> Result<WifiCredentials> {
        let ssid = match self.wifi_ssid() {
            ZoneRead::Value(c) => c,
            ZoneRead::Empty => {
                info!("Store: the Wi-Fi SSID is empty, please set the value in configuration mode");
                return Err(Error::ConfigMissing(Zone::WifiSsid));
            }
            ZoneRead::Failed(e) => {
                error!("Store: failed to get the Wi-Fi SSID ({})", e);
                return Err(Error::StorageFailure(Zone::WifiSsid, e));
            }
        };

        let password = match self.wifi_password() {
            ZoneRead::Value(c) => Some(c),
            ZoneRead::Empty => None,
            ZoneRead::Failed(e) => {
                error!("Store: failed to get the Wi-Fi password ({})", e);
                return Err(Error::StorageFailure(Zone::WifiPassword, e));
            }
        };

        let pwd = match &password {
            Some(c) => c.as_str()?,
            None => "",
        };
        WifiCredentials::new(ssid.as_str()?, pwd)
    }
}
