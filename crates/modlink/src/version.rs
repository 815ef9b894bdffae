//! Version information reported to peers.

/// modlink version from Cargo.toml
pub const MODLINK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    /// modlink runtime version.
    pub modlink: &'static str,
    /// Firmware version from the module descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            modlink: MODLINK_VERSION,
            firmware: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware = Some(version.into());
        self
    }
}
