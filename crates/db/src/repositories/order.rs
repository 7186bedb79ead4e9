use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use ordermate_core::domain::customer::CustomerId;
use ordermate_core::domain::order::{ItemMap, Order, OrderId, OrderStatus};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                customer_id,
                status,
                items_json,
                shipping_address,
                created_at
             FROM orders
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(order_from_row).transpose()
    }

    async fn insert(&self, order: Order) -> Result<(), RepositoryError> {
        let items_json = serde_json::to_string(&order.items)?;

        sqlx::query(
            "INSERT INTO orders (
                id,
                customer_id,
                status,
                items_json,
                shipping_address,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.customer_id.0)
        .bind(order.status.as_str())
        .bind(items_json)
        .bind(&order.shipping_address)
        .bind(order.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, order: &Order) -> Result<(), RepositoryError> {
        let items_json = serde_json::to_string(&order.items)?;

        sqlx::query("UPDATE orders SET items_json = ?, shipping_address = ? WHERE id = ?")
            .bind(items_json)
            .bind(&order.shipping_address)
            .bind(&order.id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn order_from_row(row: SqliteRow) -> Result<Order, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status_raw}`")))?;

    let items_raw = row.try_get::<String, _>("items_json")?;
    let items = serde_json::from_str::<ItemMap>(&items_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid items in `items_json`: {error}"))
    })?;

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        customer_id: CustomerId(row.try_get("customer_id")?),
        status,
        items,
        shipping_address: row.try_get("shipping_address")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
