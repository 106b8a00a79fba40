//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements     | Connects to                   |
//! |--------------|----------------|-------------------------------|
//! | `zone_store` | ZoneStore      | NVS / in-memory store         |
//! | `radio`      | RadioDriver    | ESP-IDF Wi-Fi STA / soft-AP   |
//! | `broker`     | BrokerClient   | ESP-IDF MQTT over TLS         |
//! | `usage`      | UsageReporter  | Serial log output             |
//! | `log_sink`   | EventSink      | Serial log output             |

pub mod broker;
pub mod log_sink;
pub mod radio;
pub mod usage;
pub mod zone_store;
