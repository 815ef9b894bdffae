//! Module configuration.
//!
//! Defaults reproduce the reference ESP32 core module. Hosts may overlay a
//! JSON document; any field left out keeps its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::MAX_COMMAND_LEN;
use crate::descriptor::{Capabilities, ModuleDescriptor};
use crate::error::ConfigError;
use crate::gatt::GattProfile;
use crate::needs::NeedsList;

/// Size bounds the channel enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLimits {
    /// Largest descriptor encoding the transport can hold.
    pub value_capacity: usize,
    pub max_command_len: usize,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            value_capacity: GattProfile::DEFAULT_VALUE_CAPACITY,
            max_command_len: MAX_COMMAND_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub version: String,
    /// Declared order is kept on the wire.
    pub capabilities: Vec<String>,
    /// Firmware images reported by `/needs`.
    pub needs: Vec<String>,
    pub max_command_len: usize,
    pub gatt: GattProfile,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            id: "ESP32-CORE-001".to_string(),
            module_type: "COMPUTE".to_string(),
            version: "1.0.0".to_string(),
            capabilities: ["WiFi", "BLE", "GPIO", "UART"]
                .into_iter()
                .map(String::from)
                .collect(),
            needs: Vec::new(),
            max_command_len: MAX_COMMAND_LEN,
            gatt: GattProfile::default(),
        }
    }
}

impl ModuleConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_command_len == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max_command_len",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.gatt.value_capacity == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "gatt.value_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.descriptor()?;
        self.needs()?;
        Ok(())
    }

    pub fn descriptor(&self) -> Result<ModuleDescriptor, ConfigError> {
        let capabilities = Capabilities::try_from_tokens(self.capabilities.iter().cloned())?;
        let descriptor = ModuleDescriptor::new(
            self.id.clone(),
            self.module_type.clone(),
            self.version.clone(),
            capabilities,
        )?;
        Ok(descriptor)
    }

    pub fn needs(&self) -> Result<NeedsList, ConfigError> {
        NeedsList::new(self.needs.iter().cloned())
    }

    /// Capacity comes from the transport profile.
    pub fn limits(&self) -> ChannelLimits {
        ChannelLimits {
            value_capacity: self.gatt.value_capacity,
            max_command_len: self.max_command_len,
        }
    }
}
