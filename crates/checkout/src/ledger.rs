//! Inventory ledger: the four stock primitives and batch compensation.

use common::ProductId;
use domain::{Product, StockOperation};
use store::ProductRepository;

use crate::error::Result;

/// A stock operation against one product.
pub type LedgerEntry = (ProductId, StockOperation);

/// Applies stock operations through the product repository.
///
/// Every primitive is a single atomic check-and-mutate in the store. Batches
/// are applied in order and undone in reverse if any entry fails.
#[derive(Clone)]
pub struct InventoryLedger<S> {
    store: S,
}

impl<S: ProductRepository> InventoryLedger<S> {
    /// Creates a new ledger over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Holds `quantity` units: `sold_count += quantity`.
    pub async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        self.apply(product_id, StockOperation::Reserve(quantity))
            .await
    }

    /// Returns held units: `sold_count -= quantity`.
    pub async fn release(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        self.apply(product_id, StockOperation::Release(quantity))
            .await
    }

    /// Removes shipped units from stock: `total_stock -= quantity`.
    pub async fn commit(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        self.apply(product_id, StockOperation::Commit(quantity))
            .await
    }

    /// Puts returned units back: `total_stock += quantity`.
    pub async fn restore(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        self.apply(product_id, StockOperation::Restore(quantity))
            .await
    }

    /// Applies a single operation.
    #[tracing::instrument(skip(self), fields(operation = op.name(), quantity = op.quantity()))]
    pub async fn apply(&self, product_id: ProductId, op: StockOperation) -> Result<Product> {
        match self.store.apply_stock(product_id, op).await {
            Ok(product) => {
                metrics::counter!(
                    "inventory_operations_total",
                    "operation" => op.name(),
                    "outcome" => "applied"
                )
                .increment(1);
                Ok(product)
            }
            Err(e) => {
                metrics::counter!(
                    "inventory_operations_total",
                    "operation" => op.name(),
                    "outcome" => "rejected"
                )
                .increment(1);
                tracing::debug!(error = %e, "stock operation rejected");
                Err(e.into())
            }
        }
    }

    /// Applies every entry in order.
    ///
    /// If entry k+1 fails, entries 1..k are compensated in reverse and the
    /// original error is returned.
    #[tracing::instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn apply_all(&self, entries: &[LedgerEntry]) -> Result<()> {
        for (index, &(product_id, op)) in entries.iter().enumerate() {
            if let Err(e) = self.apply(product_id, op).await {
                tracing::warn!(
                    %product_id,
                    operation = op.name(),
                    error = %e,
                    applied = index,
                    "ledger batch failed, compensating"
                );
                self.compensate(&entries[..index]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undoes already-applied entries in reverse order with their inverses.
    ///
    /// Best effort: failures are logged and counted, never returned.
    pub async fn compensate(&self, applied: &[LedgerEntry]) {
        for &(product_id, op) in applied.iter().rev() {
            let inverse = op.inverse();
            if let Err(e) = self.apply(product_id, inverse).await {
                metrics::counter!("inventory_compensation_failures_total").increment(1);
                tracing::error!(
                    %product_id,
                    operation = inverse.name(),
                    quantity = inverse.quantity(),
                    error = %e,
                    "inventory compensation failed"
                );
            }
        }
    }
}
