//! Trust bundle — the CA certificates used to authenticate the broker.
//!
//! The bundle is an opaque PEM asset.  It is either compiled into the
//! firmware or provisioned into [`Zone::TrustedCerts`]; this module only
//! checks that it looks like PEM and keeps it NUL-terminated for mbedTLS.

use log::{info, warn};

use crate::app::ports::ZoneStore;
use crate::error::{Error, Result, Zone};

/// Maximum bundle size (PEM, including headers and the trailing NUL).
pub const MAX_BUNDLE_SIZE: usize = 4096;

const PEM_BEGIN: &[u8] = b"-----BEGIN CERTIFICATE-----";
const PEM_END: &[u8] = b"-----END CERTIFICATE-----";

/// PEM-encoded CA certificate chain.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustBundle {
    /// PEM text followed by a single NUL.
    pem: heapless::Vec<u8, MAX_BUNDLE_SIZE>,
}

impl core::fmt::Debug for TrustBundle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "TrustBundle({} certs, {}B)", self.certificate_count(), self.pem.len())
    }
}

impl TrustBundle {
    /// Validate and copy a PEM bundle.  Trailing NUL padding is accepted.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let end = pem.iter().position(|&b| b == 0).unwrap_or(pem.len());
        let pem = &pem[..end];

        if count(pem, PEM_BEGIN) == 0 {
            return Err(Error::Config("trust bundle has no certificate"));
        }
        if count(pem, PEM_BEGIN) != count(pem, PEM_END) {
            return Err(Error::Config("trust bundle has an unterminated certificate"));
        }

        let mut buf = heapless::Vec::new();
        buf.extend_from_slice(pem)
            .map_err(|()| Error::Config("trust bundle exceeds 4 KiB"))?;
        buf.push(0).map_err(|_| Error::Config("trust bundle exceeds 4 KiB"))?;
        Ok(Self { pem: buf })
    }

    /// Load the bundle provisioned into [`Zone::TrustedCerts`].
    pub fn load(store: &impl ZoneStore) -> Result<Self> {
        let mut buf = vec![0u8; MAX_BUNDLE_SIZE];
        let len = store
            .read(Zone::TrustedCerts, 0, &mut buf)
            .map_err(|e| Error::StorageFailure(Zone::TrustedCerts, e))?;
        if len == 0 || buf[0] == 0 {
            warn!("Trust: no trusted certificates provisioned");
            return Err(Error::ConfigMissing(Zone::TrustedCerts));
        }
        let bundle = Self::from_pem(&buf[..len.min(MAX_BUNDLE_SIZE)])?;
        info!("Trust: loaded {} certificate(s) ({}B)", bundle.certificate_count(), len);
        Ok(bundle)
    }

    /// PEM bytes without the trailing NUL.
    pub fn as_pem(&self) -> &[u8] {
        &self.pem[..self.pem.len() - 1]
    }

    /// PEM bytes including the trailing NUL, as mbedTLS expects.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.pem
    }

    pub fn certificate_count(&self) -> usize {
        count(self.as_pem(), PEM_BEGIN)
    }
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}
