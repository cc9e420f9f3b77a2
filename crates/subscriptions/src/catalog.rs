use std::collections::HashSet;

use invsync_core::Sku;

/// Snapshot of the controlled-SKU registry.
///
/// Loaded once per reconciliation cycle and used purely as a membership test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlledSkus {
    skus: HashSet<Sku>,
}

impl ControlledSkus {
    pub fn new(skus: impl IntoIterator<Item = Sku>) -> Self {
        Self {
            skus: skus.into_iter().collect(),
        }
    }

    pub fn contains(&self, sku: &Sku) -> bool {
        self.skus.contains(sku)
    }

    pub fn len(&self) -> usize {
        self.skus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skus.is_empty()
    }
}

impl FromIterator<Sku> for ControlledSkus {
    fn from_iter<I: IntoIterator<Item = Sku>>(iter: I) -> Self {
        Self::new(iter)
    }
}
