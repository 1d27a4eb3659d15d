use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Row, Sqlite, Transaction};

use procure_core::domain::order::{Order, OrderId, OrderLine, OrderStatus};
use procure_core::domain::user::UserId;

use super::{decode_err, parse_timestamp, parse_u32, OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_order_status(value: &str) -> Result<OrderStatus, RepositoryError> {
    OrderStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{value}`")))
}

fn row_to_line(row: &sqlx::sqlite::SqliteRow) -> Result<OrderLine, RepositoryError> {
    let description: String = row.try_get("description").map_err(decode_err)?;
    let quantity: i64 = row.try_get("quantity").map_err(decode_err)?;
    let unit_price: String = row.try_get("unit_price").map_err(decode_err)?;
    let line_total: String = row.try_get("line_total").map_err(decode_err)?;

    Ok(OrderLine {
        description,
        quantity: parse_u32("quantity", quantity)?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        line_total: parse_decimal("line_total", &line_total)?,
    })
}

fn row_to_order(
    row: &sqlx::sqlite::SqliteRow,
    items: Vec<OrderLine>,
) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let applicant_id: String = row.try_get("applicant_id").map_err(decode_err)?;
    let store_id: String = row.try_get("store_id").map_err(decode_err)?;
    let subtotal: String = row.try_get("subtotal").map_err(decode_err)?;
    let tax: String = row.try_get("tax").map_err(decode_err)?;
    let total: String = row.try_get("total").map_err(decode_err)?;
    let currency: String = row.try_get("currency").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let notes: Option<String> = row.try_get("notes").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(Order {
        id: OrderId(id),
        applicant_id: UserId(applicant_id),
        store_id,
        items,
        subtotal: parse_decimal("subtotal", &subtotal)?,
        tax: parse_decimal("tax", &tax)?,
        total: parse_decimal("total", &total)?,
        currency,
        status: parse_order_status(&status)?,
        notes,
        created_at: parse_timestamp("created_at", created_at)?,
        updated_at: parse_timestamp("updated_at", updated_at)?,
    })
}

/// Writes the order header and its lines inside the caller's transaction.
pub(crate) async fn insert_order(
    tx: &mut Transaction<'_, Sqlite>,
    order: &Order,
) -> Result<(), RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO purchase_order (id, applicant_id, store_id, subtotal, tax, total,
                                     currency, status, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(&order.id.0)
    .bind(&order.applicant_id.0)
    .bind(&order.store_id)
    .bind(order.subtotal.to_string())
    .bind(order.tax.to_string())
    .bind(order.total.to_string())
    .bind(&order.currency)
    .bind(order.status.as_str())
    .bind(&order.notes)
    .bind(order.created_at.to_rfc3339())
    .bind(order.updated_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!("order `{}` already exists", order.id.0)));
    }

    for (line_no, line) in order.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO purchase_order_line (order_id, line_no, description, quantity,
                                              unit_price, line_total)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(line_no as i64)
        .bind(&line.description)
        .bind(i64::from(line.quantity))
        .bind(line.unit_price.to_string())
        .bind(line.line_total.to_string())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create(&self, order: Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_order(&mut tx, &order).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, applicant_id, store_id, subtotal, tax, total, currency, status, notes,
                    created_at, updated_at
             FROM purchase_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let line_rows = sqlx::query(
            "SELECT description, quantity, unit_price, line_total
             FROM purchase_order_line WHERE order_id = ? ORDER BY line_no ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        let items = line_rows.iter().map(row_to_line).collect::<Result<Vec<_>, _>>()?;

        row_to_order(&row, items).map(Some)
    }

    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE purchase_order SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
