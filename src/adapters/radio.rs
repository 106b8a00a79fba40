//! Wi-Fi radio adapter.
//!
//! Implements [`RadioDriver`], the hexagonal boundary to the Wi-Fi
//! hardware.  One instance exists per process; the
//! [`LinkManager`](crate::link::LinkManager) owns it.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` over `EspWifi`.
//! - **all other targets**: an in-memory table of simulated networks.

use log::info;

use crate::app::ports::{AccessPoint, RadioDriver, RadioError, Security};

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    nvs::EspDefaultNvsPartition,
    sys::EspError,
    wifi::{AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(target_os = "espidf")]
fn driver_error(e: EspError) -> RadioError {
    RadioError::Driver(e.code())
}

#[cfg(target_os = "espidf")]
fn auth_method(security: Security, password: &str) -> AuthMethod {
    match security {
        Security::Open => AuthMethod::None,
        Security::Wep => AuthMethod::WEP,
        Security::Wpa3 => AuthMethod::WPA3Personal,
        Security::WpaWpa2 | Security::Unknown if password.is_empty() => AuthMethod::None,
        Security::WpaWpa2 | Security::Unknown => AuthMethod::WPAWPA2Personal,
    }
}

#[cfg(target_os = "espidf")]
fn security_of(auth: Option<AuthMethod>) -> Security {
    match auth {
        Some(AuthMethod::None) => Security::Open,
        Some(AuthMethod::WEP) => Security::Wep,
        Some(AuthMethod::WPA | AuthMethod::WPA2Personal | AuthMethod::WPAWPA2Personal) => Security::WpaWpa2,
        Some(AuthMethod::WPA3Personal | AuthMethod::WPA2WPA3Personal) => Security::Wpa3,
        _ => Security::Unknown,
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated network (host only)
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
struct SimNetwork {
    ssid: String,
    password: String,
    rssi: i8,
    channel: u8,
}

/// Driver status codes reported by the simulation, matching the
/// ESP-IDF disconnect reasons.
#[cfg(not(target_os = "espidf"))]
pub mod sim_reason {
    pub const AUTH_FAIL: i32 = 202;
    pub const NO_AP_FOUND: i32 = 201;
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiRadio {
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,

    #[cfg(not(target_os = "espidf"))]
    networks: Vec<SimNetwork>,
    #[cfg(not(target_os = "espidf"))]
    associated: Option<usize>,
    #[cfg(not(target_os = "espidf"))]
    access_point: Option<String>,
}

#[cfg(target_os = "espidf")]
impl WifiRadio {
    /// Bring up the Wi-Fi driver on `modem`.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, RadioError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs).map_err(driver_error)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop).map_err(driver_error)?;
        info!("WifiRadio: ESP-IDF driver created");
        Ok(Self { wifi })
    }

    fn restart_with(&mut self, config: &Configuration) -> Result<(), EspError> {
        if self.wifi.is_started()? {
            let _ = self.wifi.disconnect();
            self.wifi.stop()?;
        }
        self.wifi.set_configuration(config)?;
        self.wifi.start()
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiRadio {
    /// Simulation backend with no visible networks.
    pub fn new() -> Result<Self, RadioError> {
        info!("WifiRadio: simulation backend");
        Ok(Self {
            networks: Vec::new(),
            associated: None,
            access_point: None,
        })
    }

    /// Make a network visible to scans and joinable with `password`.
    pub fn with_network(mut self, ssid: &str, password: &str, rssi: i8) -> Self {
        let channel = (self.networks.len() % 11) as u8 + 1;
        self.networks.push(SimNetwork {
            ssid: ssid.to_owned(),
            password: password.to_owned(),
            rssi,
            channel,
        });
        self
    }

    /// SSID of the simulated soft AP, if started.
    pub fn access_point(&self) -> Option<&str> {
        self.access_point.as_deref()
    }
}

impl RadioDriver for WifiRadio {
    fn connect_station(
        &mut self,
        ssid: &str,
        password: &str,
        security: Security,
        timeout_ms: u32,
    ) -> Result<(), RadioError> {
        #[cfg(target_os = "espidf")]
        {
            let config = Configuration::Client(ClientConfiguration {
                ssid: ssid.try_into().map_err(|()| RadioError::Unsupported)?,
                password: password.try_into().map_err(|()| RadioError::Unsupported)?,
                auth_method: auth_method(security, password),
                ..Default::default()
            });
            self.restart_with(&config).map_err(driver_error)?;

            self.wifi.wifi_mut().connect().map_err(driver_error)?;
            let timeout = (timeout_ms > 0).then(|| core::time::Duration::from_millis(u64::from(timeout_ms)));
            self.wifi
                .wifi_wait_while(|| self.wifi.is_connected().map(|c| !c), timeout)
                .map_err(|e| {
                    warn!("WifiRadio: association with '{}' did not complete ({})", ssid, e);
                    RadioError::Timeout
                })?;
            self.wifi.wait_netif_up().map_err(driver_error)?;
            info!("WifiRadio: associated with '{}'", ssid);
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = (security, timeout_ms);
            self.access_point = None;
            let Some(idx) = self.networks.iter().position(|n| n.ssid == ssid) else {
                return Err(RadioError::Driver(sim_reason::NO_AP_FOUND));
            };
            if self.networks[idx].password != password {
                return Err(RadioError::Driver(sim_reason::AUTH_FAIL));
            }
            self.associated = Some(idx);
            info!("WifiRadio(sim): associated with '{}'", ssid);
            Ok(())
        }
    }

    fn start_access_point(&mut self, ssid: &str, passphrase: &str, security: Security) -> Result<(), RadioError> {
        #[cfg(target_os = "espidf")]
        {
            let config = Configuration::AccessPoint(AccessPointConfiguration {
                ssid: ssid.try_into().map_err(|()| RadioError::Unsupported)?,
                password: passphrase.try_into().map_err(|()| RadioError::Unsupported)?,
                auth_method: auth_method(security, passphrase),
                channel: 1,
                ..Default::default()
            });
            self.restart_with(&config).map_err(driver_error)?;
            self.wifi.wait_netif_up().map_err(driver_error)?;
            info!("WifiRadio: soft AP '{}' up", ssid);
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = (passphrase, security);
            self.associated = None;
            self.access_point = Some(ssid.to_owned());
            info!("WifiRadio(sim): soft AP '{}' up", ssid);
            Ok(())
        }
    }

    fn scan(&mut self, out: &mut [AccessPoint]) -> usize {
        #[cfg(target_os = "espidf")]
        {
            let found = match self.wifi.scan() {
                Ok(found) => found,
                Err(e) => {
                    warn!("WifiRadio: scan failed ({})", e);
                    return 0;
                }
            };
            let n = found.len().min(out.len());
            for (slot, info) in out.iter_mut().zip(found) {
                *slot = AccessPoint {
                    ssid: info.ssid,
                    bssid: info.bssid,
                    rssi: info.signal_strength,
                    channel: info.channel,
                    security: security_of(info.auth_method),
                };
            }
            n
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let n = self.networks.len().min(out.len());
            for (i, (slot, net)) in out.iter_mut().zip(&self.networks).enumerate() {
                let mut ssid = heapless::String::new();
                let _ = ssid.push_str(&net.ssid);
                *slot = AccessPoint {
                    ssid,
                    bssid: [0x02, 0, 0, 0, 0, i as u8],
                    rssi: net.rssi,
                    channel: net.channel,
                    security: if net.password.is_empty() {
                        Security::Open
                    } else {
                        Security::WpaWpa2
                    },
                };
            }
            n
        }
    }

    fn rssi(&self) -> i32 {
        #[cfg(target_os = "espidf")]
        {
            let mut info = esp_idf_svc::sys::wifi_ap_record_t::default();
            // SAFETY: `info` is a valid out-parameter for the duration of the call.
            let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut info) };
            if ret == esp_idf_svc::sys::ESP_OK {
                i32::from(info.rssi)
            } else {
                0
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.associated.map_or(0, |i| i32::from(self.networks[i].rssi))
        }
    }
}
