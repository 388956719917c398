use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    CustomerId, Money, NewOrder, Order, OrderId, OrderItem, OrderItemId, OrderNumber, OrderStatus,
    ProductId,
};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    OrderStoreError, Result,
    store::{OrderStore, validate_new_order},
};

const ORDER_COLUMNS: &str =
    "id, order_number, customer_id, created_at, status, total_amount_cents";

const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price_cents";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
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

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity).map_err(|_| OrderStoreError::CorruptRow {
            table: "order_items",
            reason: format!("negative quantity {quantity}"),
        })?;

        Ok(OrderItem {
            id: OrderItemId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status: OrderStatus = status.parse().map_err(|_| OrderStoreError::CorruptRow {
            table: "orders",
            reason: format!("unknown status '{status}'"),
        })?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            order_number: OrderNumber::new(row.try_get::<String, _>("order_number")?),
            customer_id: CustomerId::new(row.try_get("customer_id")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            status,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            items,
        })
    }

    async fn load_items(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY position ASC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn load_one(&self, row: Option<PgRow>) -> Result<Option<Order>> {
        match row {
            Some(row) => {
                let items = self.load_items(row.try_get("id")?).await?;
                Ok(Some(Self::row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        validate_new_order(&order)?;

        // Order row and item rows commit together or not at all
        let mut tx = self.pool.begin().await?;

        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (order_number, customer_id, created_at, status, total_amount_cents)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(order.order_number.as_str())
        .bind(order.customer_id.as_i64())
        .bind(order.created_at)
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_order_number")
            {
                return OrderStoreError::DuplicateOrderNumber(order.order_number.clone());
            }
            OrderStoreError::Database(e)
        })?;

        let mut item_ids = Vec::with_capacity(order.lines.len());
        for (position, line) in order.lines.iter().enumerate() {
            let quantity = i32::try_from(line.quantity).map_err(|_| {
                OrderStoreError::InvalidOrder(format!(
                    "quantity {} for product {} does not fit the schema",
                    line.quantity, line.product_id
                ))
            })?;

            let item_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO order_items (order_id, position, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(order_id)
            .bind(position as i32)
            .bind(line.product_id.as_i64())
            .bind(quantity)
            .bind(line.unit_price.cents())
            .fetch_one(&mut *tx)
            .await?;

            item_ids.push(OrderItemId::new(item_id));
        }

        tx.commit().await?;

        metrics::counter!("order_store_inserts_total").increment(1);
        Ok(Order::from_new(OrderId::new(order_id), order, &item_ids))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        self.load_one(row).await
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        self.load_one(row).await
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let order_rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        let item_rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items ORDER BY order_id ASC, position ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let item = Self::row_to_item(row)?;
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        order_rows
            .iter()
            .map(|row| {
                let id = OrderId::new(row.try_get("id")?);
                let items = items_by_order.remove(&id).unwrap_or_default();
                Self::row_to_order(row, items)
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_i64())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        self.load_one(row)
            .await?
            .ok_or(OrderStoreError::OrderNotFound(id))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }
}
