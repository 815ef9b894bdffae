//! GATT-facing binding of the channel.
//!
//! The module exposes one service with one read/write characteristic. Reads
//! return the encoded descriptor verbatim; writes are handed to
//! [`ModuleDescriptorChannel::handle_command`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::bytes::Bytes;
use uuid::Uuid;

use crate::channel::ModuleDescriptorChannel;
use crate::command::CommandResult;
use crate::config::ModuleConfig;
use crate::descriptor::EncodedDescriptor;
use crate::error::ConfigError;
use crate::log_sink::LogSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
}

impl Default for CharacteristicProperties {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
        }
    }
}

/// Advertising hints passed through to the radio stack untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertisingHints {
    pub scan_response: bool,
    /// Connection interval hints, applied in order (units of 1.25 ms).
    pub min_preferred: Vec<u8>,
}

impl Default for AdvertisingHints {
    fn default() -> Self {
        Self {
            scan_response: true,
            min_preferred: vec![0x06, 0x12],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GattProfile {
    pub device_name: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub properties: CharacteristicProperties,
    /// Maximum characteristic value size the stack will hold.
    pub value_capacity: usize,
    pub advertising: AdvertisingHints,
}

impl GattProfile {
    pub const DEFAULT_VALUE_CAPACITY: usize = 200;
    pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);
    pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
        Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            device_name: "Modular-ESP32".to_string(),
            service_uuid: Self::DEFAULT_SERVICE_UUID,
            characteristic_uuid: Self::DEFAULT_CHARACTERISTIC_UUID,
            properties: CharacteristicProperties::default(),
            value_capacity: Self::DEFAULT_VALUE_CAPACITY,
            advertising: AdvertisingHints::default(),
        }
    }
}

/// The descriptor characteristic: a channel bound to a GATT profile.
#[derive(Debug)]
pub struct Characteristic {
    profile: GattProfile,
    channel: Arc<ModuleDescriptorChannel>,
}

impl Characteristic {
    /// The channel must enforce the capacity this profile declares.
    pub fn bind(
        profile: GattProfile,
        channel: Arc<ModuleDescriptorChannel>,
    ) -> Result<Self, ConfigError> {
        let enforced = channel.limits().value_capacity;
        if enforced != profile.value_capacity {
            return Err(ConfigError::CapacityMismatch {
                declared: profile.value_capacity,
                enforced,
            });
        }
        Ok(Self { profile, channel })
    }

    pub fn from_config(config: &ModuleConfig, sink: Arc<dyn LogSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let channel = ModuleDescriptorChannel::new(config.descriptor()?, config.limits(), sink)?
            .with_needs(config.needs()?);
        Self::bind(config.gatt.clone(), Arc::new(channel))
    }

    pub fn profile(&self) -> &GattProfile {
        &self.profile
    }

    pub fn channel(&self) -> &Arc<ModuleDescriptorChannel> {
        &self.channel
    }

    /// Nothing to prepare; reads and writes are legal from here on.
    pub fn on_connect(&self) {
        tracing::debug!(
            device = %self.profile.device_name,
            characteristic = %self.profile.characteristic_uuid,
            "Peer connected"
        );
    }

    pub fn read_value(&self) -> Bytes {
        self.read_encoded().into_bytes()
    }

    /// Like [`read_value`](Self::read_value) but keeps the overflow report.
    pub fn read_encoded(&self) -> EncodedDescriptor {
        self.channel.encode_descriptor()
    }

    /// The result is informational; the channel has already logged it.
    pub fn write_value(&self, value: &[u8]) -> CommandResult {
        let result = self.channel.handle_command(value);
        tracing::trace!(outcome = ?result.outcome(), len = value.len(), "Characteristic write");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelLimits;
    use crate::log_sink::MemorySink;

    #[test]
    fn default_profile_uuids() {
        let profile = GattProfile::default();
        assert_eq!(
            profile.service_uuid.to_string(),
            "4fafc201-1fb5-459e-8fcc-c5c9c331914b"
        );
        assert_eq!(
            profile.characteristic_uuid.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a8"
        );
        assert_eq!(profile.device_name, "Modular-ESP32");
        assert!(profile.properties.read && profile.properties.write);
    }

    #[test]
    fn profile_serializes() {
        insta::assert_json_snapshot!(GattProfile::default(), @r#"
        {
          "device_name": "Modular-ESP32",
          "service_uuid": "4fafc201-1fb5-459e-8fcc-c5c9c331914b",
          "characteristic_uuid": "beb5483e-36e1-4688-b7f5-ea07361b26a8",
          "properties": {
            "read": true,
            "write": true
          },
          "value_capacity": 200,
          "advertising": {
            "scan_response": true,
            "min_preferred": [
              6,
              18
            ]
          }
        }
        "#);
    }

    #[test]
    fn read_and_write_go_through_channel() {
        let sink = Arc::new(MemorySink::new());
        let characteristic = Characteristic::from_config(&ModuleConfig::default(), sink.clone())
            .unwrap();

        characteristic.on_connect();
        assert_eq!(
            &characteristic.read_value()[..],
            b"id=ESP32-CORE-001;type=COMPUTE;version=1.0.0;capabilities=WiFi, BLE, GPIO, UART"
        );
        assert_eq!(
            characteristic.write_value(b"PING"),
            CommandResult::Acknowledged("PING".to_string())
        );
        assert_eq!(sink.lines(), vec!["New value: PING"]);
    }

    #[test]
    fn bind_rejects_capacity_mismatch() {
        let config = ModuleConfig::default();
        let channel = ModuleDescriptorChannel::new(
            config.descriptor().unwrap(),
            ChannelLimits {
                value_capacity: 120,
                ..ChannelLimits::default()
            },
            Arc::new(MemorySink::new()),
        )
        .unwrap();

        let err = Characteristic::bind(GattProfile::default(), Arc::new(channel)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::CapacityMismatch {
                declared: 200,
                enforced: 120
            }
        ));
    }

    #[test]
    fn small_capacity_truncates_reads() {
        let sink = Arc::new(MemorySink::new());
        let mut config = ModuleConfig::default();
        config.gatt.value_capacity = 64;

        let characteristic = Characteristic::from_config(&config, sink.clone()).unwrap();
        let encoded = characteristic.read_encoded();
        assert!(encoded.is_truncated());
        assert!(encoded.as_bytes().len() <= 64);
        assert_eq!(sink.len(), 1);
    }
}
