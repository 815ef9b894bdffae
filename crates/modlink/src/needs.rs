//! Firmware images the module asks its provisioner to fetch.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Reply body for `/needs`: `{"modules": [...]}`.
///
/// Names end up in download paths, so they are restricted to ASCII
/// alphanumerics, `-`, `_` and `.`. Duplicates collapse to the first position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedsList {
    modules: Vec<String>,
}

impl NeedsList {
    pub fn new<I, S>(modules: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        for module in modules {
            let module = module.into();
            if !is_image_name(&module) {
                return Err(ConfigError::InvalidNeed(module));
            }
            if !list.modules.contains(&module) {
                list.modules.push(module);
            }
        }
        Ok(list)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }
}

fn is_image_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
