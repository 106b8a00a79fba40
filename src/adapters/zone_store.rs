//! NVS-backed zone store.
//!
//! Implements [`ZoneStore`] by mapping each [`Zone`] to one blob in the
//! `cloudlink` NVS namespace, keyed by its zone index (`zone_03`, ...).
//!
//! - A missing key reads as `Ok(0)` (empty zone), never as an error.
//! - Writes are committed with `nvs_commit()`, atomic per blob.
//! - The simulation backend keeps blobs in memory (dev/test only).

use crate::app::ports::{StorageError, ZoneStore};
use crate::error::Zone;
use log::info;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(target_os = "espidf")]
const NAMESPACE: &[u8] = b"cloudlink\0";

/// Largest blob accepted in a zone.
const MAX_BLOB_SIZE: usize = 4000;

/// NUL-terminated NVS key for `zone`, e.g. `zone_0a`.
fn zone_key(zone: Zone) -> [u8; 8] {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let i = zone.index();
    [
        b'z',
        b'o',
        b'n',
        b'e',
        b'_',
        HEX[usize::from(i >> 4)],
        HEX[usize::from(i & 0x0F)],
        0,
    ]
}

pub struct NvsZoneStore {
    #[cfg(not(target_os = "espidf"))]
    zones: std::cell::RefCell<HashMap<Zone, Vec<u8>>>,
}

impl NvsZoneStore {
    /// Initialise NVS flash.  On first boot or after a version mismatch
    /// the partition is erased and re-initialised.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret = unsafe { nvs_flash_erase() };
                if ret != ESP_OK {
                    return Err(StorageError::Io(ret));
                }
                let ret = unsafe { nvs_flash_init() };
                if ret != ESP_OK {
                    return Err(StorageError::Io(ret));
                }
            } else if ret != ESP_OK {
                return Err(StorageError::Io(ret));
            }
            info!("NvsZoneStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsZoneStore: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            zones: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// Open the namespace, run `f` with the handle, close.
    #[cfg(target_os = "espidf")]
    fn with_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let ret = unsafe { nvs_open(NAMESPACE.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }
}

impl ZoneStore for NvsZoneStore {
    fn read(&self, zone: Zone, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let zones = self.zones.borrow();
            let Some(data) = zones.get(&zone) else {
                return Ok(0);
            };
            let tail = data.get(offset..).unwrap_or(&[]);
            let len = tail.len().min(buf.len());
            buf[..len].copy_from_slice(&tail[..len]);
            Ok(len)
        }

        #[cfg(target_os = "espidf")]
        {
            let key = zone_key(zone);
            let result = Self::with_handle(false, |handle| {
                // First call: size only.
                let mut size: usize = 0;
                let ret = unsafe { nvs_get_blob(handle, key.as_ptr().cast(), core::ptr::null_mut(), &mut size) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                if size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH);
                }
                let mut blob = vec![0u8; size];
                let ret = unsafe { nvs_get_blob(handle, key.as_ptr().cast(), blob.as_mut_ptr().cast(), &mut size) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                blob.truncate(size);
                Ok(blob)
            });
            match result {
                Ok(blob) => {
                    let tail = blob.get(offset..).unwrap_or(&[]);
                    let len = tail.len().min(buf.len());
                    buf[..len].copy_from_slice(&tail[..len]);
                    Ok(len)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(0),
                Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::OutOfBounds),
                Err(e) => {
                    warn!("NvsZoneStore: read of {} failed ({})", zone, e);
                    Err(StorageError::Io(e))
                }
            }
        }
    }

    fn write(&mut self, zone: Zone, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::OutOfBounds);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.zones.borrow_mut().insert(zone, data.to_vec());
            info!("NvsZoneStore: {} written ({} bytes, simulation)", zone, data.len());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = zone_key(zone);
            let result = Self::with_handle(true, |handle| {
                let ret = unsafe { nvs_set_blob(handle, key.as_ptr().cast(), data.as_ptr().cast(), data.len()) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsZoneStore: {} written ({} bytes)", zone, data.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsZoneStore: write of {} failed ({})", zone, e);
                    Err(StorageError::Io(e))
                }
            }
        }
    }
}
