use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{
    Cart, InventoryError, Money, Order, Product, ProductUpdate, Size, StockOperation, Variant,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    repository::{CartRepository, OrderRepository, ProductRepository},
};

const PRODUCT_COLUMNS: &str = "id, sku, name, image, price_cents, colour, size, total_stock, \
     sold_count, is_active, is_featured, created_at, updated_at";

/// Conditional updates that lose a race are retried this many times before
/// the rejection is reported.
const MAX_STOCK_ATTEMPTS: usize = 3;

/// PostgreSQL-backed store implementation.
///
/// Products are stored as columns so stock operations can be expressed as
/// single conditional `UPDATE` statements. Carts and orders are stored as
/// JSONB documents next to the columns they are queried by.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let id = ProductId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let size: String = row.try_get("size")?;
        let size = size
            .parse::<Size>()
            .map_err(|e| StoreError::Corrupt(format!("product {id}: {e}")))?;
        let total_stock = Self::counter(&row, "total_stock", id)?;
        let sold_count = Self::counter(&row, "sold_count", id)?;

        Product::from_parts(
            id,
            row.try_get("sku")?,
            row.try_get("name")?,
            row.try_get("image")?,
            Money::from_cents(row.try_get("price_cents")?),
            Variant::new(row.try_get::<String, _>("colour")?, size),
            total_stock,
            sold_count,
            row.try_get("is_active")?,
            row.try_get("is_featured")?,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
            row.try_get::<DateTime<Utc>, _>("updated_at")?,
        )
        .ok_or_else(|| StoreError::Corrupt(format!("product {id}: sold_count exceeds total_stock")))
    }

    fn counter(row: &PgRow, column: &str, id: ProductId) -> Result<u32> {
        let value: i64 = row.try_get(column)?;
        u32::try_from(value)
            .map_err(|_| StoreError::Corrupt(format!("product {id}: {column} = {value}")))
    }

    fn version_column(version: u64) -> Result<i64> {
        i64::try_from(version)
            .map_err(|_| StoreError::Corrupt(format!("order version {version} out of range")))
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let document: serde_json::Value = row.try_get("document")?;
        Ok(serde_json::from_value(document)?)
    }

    /// Maps a unique violation on a known constraint to `DuplicateKey`.
    fn duplicate_or(err: sqlx::Error, keys: &[(&str, &'static str, String)]) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = err
            && let Some(constraint) = db_err.constraint()
            && let Some((_, key, value)) = keys.iter().find(|(name, _, _)| *name == constraint)
        {
            return StoreError::DuplicateKey {
                key: *key,
                value: value.clone(),
            };
        }
        StoreError::Database(err)
    }

    /// One conditional statement per operation; no row means the guard failed.
    fn stock_statement(op: StockOperation) -> String {
        let (assignment, guard) = match op {
            StockOperation::Reserve(_) => (
                "sold_count = sold_count + $2",
                "is_active AND total_stock - sold_count >= $2",
            ),
            StockOperation::Release(_) => ("sold_count = sold_count - $2", "sold_count >= $2"),
            StockOperation::Commit(_) => (
                "total_stock = total_stock - $2",
                "total_stock - $2 >= sold_count",
            ),
            StockOperation::Restore(_) => (
                "total_stock = total_stock + $2",
                "total_stock + $2 <= 4294967295",
            ),
        };
        format!(
            "UPDATE products SET {assignment}, updated_at = NOW() \
             WHERE id = $1 AND {guard} RETURNING {PRODUCT_COLUMNS}"
        )
    }
}

#[async_trait]
impl ProductRepository for PostgresStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, image, price_cents, colour, size, total_stock,
                                  sold_count, is_active, is_featured, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.image)
        .bind(product.price.cents())
        .bind(&product.variant.colour)
        .bind(product.variant.size.as_str())
        .bind(i64::from(product.total_stock()))
        .bind(i64::from(product.sold_count()))
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Self::duplicate_or(
                e,
                &[
                    ("products_pkey", "id", product.id.to_string()),
                    ("products_sku_key", "sku", product.sku.clone()),
                ],
            )
        })?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so the sold_count check below cannot go stale
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::ProductNotFound(id))?;

        let mut product = Self::row_to_product(row)?;
        product.apply_update(update)?;

        sqlx::query(
            r#"
            UPDATE products
            SET name = $2, image = $3, price_cents = $4, total_stock = $5,
                is_active = $6, is_featured = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&product.name)
        .bind(&product.image)
        .bind(product.price.cents())
        .bind(i64::from(product.total_stock()))
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(product)
    }

    async fn apply_stock(&self, id: ProductId, op: StockOperation) -> Result<Product> {
        if op.quantity() == 0 {
            return Err(InventoryError::InvalidQuantity { quantity: 0 }.into());
        }
        let statement = Self::stock_statement(op);

        for _ in 0..MAX_STOCK_ATTEMPTS {
            let updated = sqlx::query(&statement)
                .bind(id.as_uuid())
                .bind(i64::from(op.quantity()))
                .fetch_optional(&self.pool)
                .await?;

            if let Some(row) = updated {
                let product = Self::row_to_product(row)?;
                tracing::debug!(
                    product_id = %id,
                    operation = op.name(),
                    quantity = op.quantity(),
                    total_stock = product.total_stock(),
                    sold_count = product.sold_count(),
                    "Applied stock operation"
                );
                return Ok(product);
            }

            // The guard rejected the update: replay it on a fresh read to
            // find out why. If the replay passes, the row changed in between.
            let mut current = self
                .get_product(id)
                .await?
                .ok_or(StoreError::ProductNotFound(id))?;
            current.apply_stock(op)?;
        }

        tracing::warn!(
            product_id = %id,
            operation = op.name(),
            attempts = MAX_STOCK_ATTEMPTS,
            "stock update kept losing races"
        );
        Err(StoreError::StockContention {
            product_id: id,
            operation: op.name(),
            attempts: MAX_STOCK_ATTEMPTS,
        })
    }
}

#[async_trait]
impl CartRepository for PostgresStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT document FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: serde_json::Value = row.try_get("document")?;
                Ok(Some(serde_json::from_value(document)?))
            }
            None => Ok(None),
        }
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let document = serde_json::to_value(cart)?;

        sqlx::query(
            r#"
            INSERT INTO carts (user_id, document, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.user_id().as_uuid())
        .bind(document)
        .bind(cart.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let document = serde_json::to_value(order)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, status, document, created_at, updated_at,
                                version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.user_id().as_uuid())
        .bind(order.status().as_str())
        .bind(document)
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(Self::version_column(order.version())?)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Self::duplicate_or(
                e,
                &[
                    ("orders_pkey", "id", order.id().to_string()),
                    (
                        "orders_order_number_key",
                        "order_number",
                        order.order_number().to_string(),
                    ),
                ],
            )
        })?;

        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn save_order(&self, order: &Order, expected_version: u64) -> Result<()> {
        let document = serde_json::to_value(order)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, document = $3, updated_at = $4, version = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(document)
        .bind(order.updated_at())
        .bind(Self::version_column(order.version())?)
        .bind(Self::version_column(expected_version)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing matched: either the order is gone or its version moved on
        let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(order.id().as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        match actual {
            Some(actual) => Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected: expected_version,
                actual: u64::try_from(actual).unwrap_or_default(),
            }),
            None => Err(StoreError::OrderNotFound(order.id())),
        }
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT document FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT document FROM orders ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn discard_order(&self, id: OrderId) -> Result<()> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
