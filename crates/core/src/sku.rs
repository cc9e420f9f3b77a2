//! Stock-keeping unit value object.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A stock-keeping unit as it appears on billing-provider line items.
///
/// Several billing SKUs may share one storefront item: everything after the
/// first underscore is a variant suffix (`KIT01_BLUE` is sold as `KIT01`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The SKU the storefront knows this item by.
    pub fn storefront_sku(&self) -> &str {
        match self.0.split_once('_') {
            Some((base, _)) if !base.is_empty() => base,
            _ => &self.0,
        }
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
