//! Stock-level bookkeeping for a single SKU.

use common::Sku;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// Stock counts for one SKU.
///
/// `available_quantity` and `reserved_quantity` are both non-negative by
/// type; the mutators below are the only legal ways to move quantity between
/// them and each checks its precondition before applying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub sku: Sku,
    pub available_quantity: u32,
    pub reserved_quantity: u32,
    /// Optimistic lock, bumped by the store on every committed update.
    pub version: i64,
}

impl InventoryItem {
    /// Creates a new item with all quantity available.
    pub fn new(sku: Sku, available_quantity: u32) -> Self {
        Self {
            sku,
            available_quantity,
            reserved_quantity: 0,
            version: 1,
        }
    }

    /// Returns true if `quantity` can be moved from available to reserved.
    pub fn can_reserve(&self, quantity: u32) -> bool {
        quantity > 0 && quantity <= self.available_quantity
    }

    /// Moves `quantity` from available to reserved.
    pub fn reserve(&mut self, quantity: u32) -> Result<()> {
        if !self.can_reserve(quantity) {
            return Err(InventoryError::InvalidQuantity {
                sku: self.sku.clone(),
                message: format!(
                    "cannot reserve {quantity}, available {}",
                    self.available_quantity
                ),
            });
        }
        self.available_quantity -= quantity;
        self.reserved_quantity += quantity;
        Ok(())
    }

    /// Returns `quantity` from reserved to available.
    pub fn release(&mut self, quantity: u32) -> Result<()> {
        if quantity > self.reserved_quantity {
            return Err(InventoryError::InvalidQuantity {
                sku: self.sku.clone(),
                message: format!(
                    "cannot release {quantity}, reserved {}",
                    self.reserved_quantity
                ),
            });
        }
        self.reserved_quantity -= quantity;
        self.available_quantity += quantity;
        Ok(())
    }

    /// Permanently removes `quantity` from reserved; the sale is final and
    /// the stock does not return to available.
    pub fn confirm(&mut self, quantity: u32) -> Result<()> {
        if quantity > self.reserved_quantity {
            return Err(InventoryError::InvalidQuantity {
                sku: self.sku.clone(),
                message: format!(
                    "cannot confirm {quantity}, reserved {}",
                    self.reserved_quantity
                ),
            });
        }
        self.reserved_quantity -= quantity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_moves_quantity() {
        let mut item = InventoryItem::new(Sku::new("SKU-1"), 10);
        item.reserve(4).unwrap();
        assert_eq!(item.available_quantity, 6);
        assert_eq!(item.reserved_quantity, 4);
    }

    #[test]
    fn test_cannot_reserve_more_than_available() {
        let mut item = InventoryItem::new(Sku::new("SKU-1"), 3);
        assert!(!item.can_reserve(4));
        assert!(item.reserve(4).is_err());
        assert_eq!(item.available_quantity, 3);
    }

    #[test]
    fn test_cannot_reserve_zero() {
        let item = InventoryItem::new(Sku::new("SKU-1"), 3);
        assert!(!item.can_reserve(0));
    }

    #[test]
    fn test_release_returns_quantity() {
        let mut item = InventoryItem::new(Sku::new("SKU-1"), 10);
        item.reserve(4).unwrap();
        item.release(4).unwrap();
        assert_eq!(item.available_quantity, 10);
        assert_eq!(item.reserved_quantity, 0);
    }

    #[test]
    fn test_confirm_removes_quantity_permanently() {
        let mut item = InventoryItem::new(Sku::new("SKU-1"), 10);
        item.reserve(4).unwrap();
        item.confirm(4).unwrap();
        assert_eq!(item.available_quantity, 6);
        assert_eq!(item.reserved_quantity, 0);
    }

    #[test]
    fn test_reserve_release_conserves_total() {
        let mut item = InventoryItem::new(Sku::new("SKU-1"), 10);
        let total_before = item.available_quantity + item.reserved_quantity;
        item.reserve(7).unwrap();
        item.release(7).unwrap();
        assert_eq!(item.available_quantity + item.reserved_quantity, total_before);
    }

    #[test]
    fn test_cannot_release_more_than_reserved() {
        let mut item = InventoryItem::new(Sku::new("SKU-1"), 10);
        item.reserve(2).unwrap();
        assert!(item.release(3).is_err());
        assert_eq!(item.reserved_quantity, 2);
    }
}
