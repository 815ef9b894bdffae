//! Module identity record and its wire encoding.
//!
//! Wire shape (field order fixed):
//!
//! ```text
//! id=<ID>;type=<TYPE>;version=<VERSION>;capabilities=<tok>, <tok>, ...
//! ```
//!
//! Capabilities keep their declared order so the encoding is deterministic and
//! truncation always drops the *trailing* tokens.

use std::fmt;

use indexmap::IndexSet;
use tokio_util::bytes::Bytes;

use crate::error::{DescriptorError, EncodingOverflow, Result};

pub const FIELD_DELIMITER: char = ';';
pub const KEY_VALUE_DELIMITER: char = '=';
/// Separator between capability tokens in the encoded record.
pub const CAPABILITY_SEPARATOR: &str = ", ";

/// Set of capability tokens (e.g. `WiFi`, `BLE`).
///
/// Equality ignores order; iteration and encoding follow declaration order.
/// Duplicates collapse onto the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(IndexSet<String>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut caps = Self::new();
        for token in tokens {
            caps.insert(token)?;
        }
        Ok(caps)
    }

    /// Parse a comma-separated list. Whitespace around tokens is ignored,
    /// empty tokens are not.
    pub fn parse_list(list: &str) -> Result<Self> {
        Self::try_from_tokens(list.split(',').map(str::trim))
    }

    /// Returns `false` if the token was already present.
    pub fn insert(&mut self, token: impl Into<String>) -> Result<bool> {
        let token = token.into();
        validate_token(&token)?;
        Ok(self.0.insert(token))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

fn validate_token(token: &str) -> Result<()> {
    let malformed = token.is_empty()
        || token.trim() != token
        || token.contains([',', FIELD_DELIMITER, KEY_VALUE_DELIMITER]);
    if malformed {
        return Err(DescriptorError::InvalidCapability(token.to_string()));
    }
    Ok(())
}

fn validate_field(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DescriptorError::EmptyField { field });
    }
    if let Some(ch) = value
        .chars()
        .find(|c| *c == FIELD_DELIMITER || *c == KEY_VALUE_DELIMITER)
    {
        return Err(DescriptorError::ReservedCharacter { field, ch });
    }
    Ok(())
}

/// Accepts `MAJOR.MINOR.PATCH` with an optional `-pre` and/or `+build` suffix.
fn validate_version(version: &str) -> Result<()> {
    validate_field("version", version)?;
    let invalid = || DescriptorError::InvalidVersion(version.to_string());

    let (core, suffix) = match version.find(['-', '+']) {
        Some(at) => (&version[..at], Some(&version[at + 1..])),
        None => (version, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    let numeric = |p: &&str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    if parts.len() != 3 || !parts.iter().all(numeric) {
        return Err(invalid());
    }

    if let Some(suffix) = suffix {
        let ok = !suffix.is_empty()
            && suffix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
        if !ok {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Identity and capability record of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    id: String,
    module_type: String,
    version: String,
    capabilities: Capabilities,
}

impl ModuleDescriptor {
    pub fn new(
        id: impl Into<String>,
        module_type: impl Into<String>,
        version: impl Into<String>,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let id = id.into();
        let module_type = module_type.into();
        let version = version.into();

        validate_field("id", &id)?;
        validate_field("type", &module_type)?;
        validate_version(&version)?;

        Ok(Self {
            id,
            module_type,
            version,
            capabilities,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module_type(&self) -> &str {
        &self.module_type
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub(crate) fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    /// Encoded length with an empty capability list - the floor any
    /// transport capacity must clear.
    pub fn base_len(&self) -> usize {
        self.render(0).len()
    }

    /// Encode into at most `capacity` bytes, dropping trailing capabilities
    /// if needed.
    ///
    /// If even the capability-free record exceeds `capacity` it is returned
    /// as-is; [`ModuleDescriptorChannel::new`](crate::ModuleDescriptorChannel::new)
    /// refuses such configurations up front.
    pub fn encode(&self, capacity: usize) -> EncodedDescriptor {
        let full = self.render(self.capabilities.len());
        if full.len() <= capacity {
            return EncodedDescriptor {
                bytes: Bytes::from(full),
                overflow: None,
            };
        }

        let mut kept = self.capabilities.len();
        let mut record = full.clone();
        while kept > 0 && record.len() > capacity {
            kept -= 1;
            record = self.render(kept);
        }

        let dropped = self
            .capabilities
            .iter()
            .skip(kept)
            .map(str::to_string)
            .collect();

        EncodedDescriptor {
            bytes: Bytes::from(record),
            overflow: Some(EncodingOverflow {
                encoded_len: full.len(),
                capacity,
                dropped,
            }),
        }
    }

    fn render(&self, kept: usize) -> String {
        let caps: Vec<&str> = self.capabilities.iter().take(kept).collect();
        format!(
            "id={}{d}type={}{d}version={}{d}capabilities={}",
            self.id,
            self.module_type,
            self.version,
            caps.join(CAPABILITY_SEPARATOR),
            d = FIELD_DELIMITER,
        )
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(self.capabilities.len()))
    }
}

/// Output of [`ModuleDescriptor::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDescriptor {
    bytes: Bytes,
    overflow: Option<EncodingOverflow>,
}

impl EncodedDescriptor {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn overflow(&self) -> Option<&EncodingOverflow> {
        self.overflow.as_ref()
    }

    pub fn is_truncated(&self) -> bool {
        self.overflow.is_some()
    }
}
