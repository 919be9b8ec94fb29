use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{ItemStore, OrderStore, StoreResult};
use crate::domain::{Item, NewItem, NewOrderLine, Order, OrderFilter, OrderLine, OrderStatus};
use crate::error::StoreError;

const ORDER_COLUMNS: &str = "id, user_id, status, creation_date";
const LINE_COLUMNS: &str = "id, order_id, item_id, quantity";

/// PostgreSQL-backed store for items, orders and order lines.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    creation_date: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_str(&row.status).map_err(|_| {
            StoreError::Database(format!("order {} has unknown status {}", row.id, row.status))
        })?;
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            status,
            creation_date: row.creation_date,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

impl PgStore {
    #[instrument(skip(url))]
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        info!("Schema migrations applied");
        Ok(())
    }

    async fn insert_lines(
        conn: &mut PgConnection,
        order_id: Uuid,
        lines: &[NewOrderLine],
    ) -> StoreResult<Vec<OrderLine>> {
        let rows: Vec<OrderLine> = lines
            .iter()
            .map(|line| OrderLine {
                id: Uuid::new_v4(),
                order_id,
                item_id: line.item_id,
                quantity: line.quantity,
            })
            .collect();
        if rows.is_empty() {
            return Ok(rows);
        }

        let mut builder =
            QueryBuilder::<Postgres>::new("insert into order_items (id, order_id, item_id, quantity) ");
        builder.push_values(&rows, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.order_id)
                .push_bind(row.item_id)
                .push_bind(row.quantity);
        });
        builder.build().execute(&mut *conn).await?;
        Ok(rows)
    }
}

#[async_trait]
impl ItemStore for PgStore {
    async fn find_all(&self) -> StoreResult<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>("select id, name, price from items order by name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Item>> {
        let item = sqlx::query_as::<_, Item>("select id, name, price from items where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let items = sqlx::query_as::<_, Item>("select id, name, price from items where id = any($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn create(&self, item: NewItem) -> StoreResult<Item> {
        let item = sqlx::query_as::<_, Item>(
            "insert into items (id, name, price) values ($1, $2, $3) returning id, name, price",
        )
        .bind(Uuid::new_v4())
        .bind(item.name)
        .bind(item.price)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }

    async fn update(&self, id: Uuid, item: NewItem) -> StoreResult<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(
            "update items set name = $1, price = $2 where id = $3 returning id, name, price",
        )
        .bind(item.name)
        .bind(item.price)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("delete from items where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "select {ORDER_COLUMNS} from orders where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        if matches!(&filter.ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "select {ORDER_COLUMNS} from orders where true"
        ));
        if let Some(status) = filter.status {
            builder.push(" and status = ").push_bind(status.to_string());
        }
        if let Some(user_id) = filter.user_id {
            builder.push(" and user_id = ").push_bind(user_id);
        }
        if let Some(ids) = &filter.ids {
            builder.push(" and id = any(").push_bind(ids.clone()).push(")");
        }
        builder.push(" order by creation_date, id");

        debug!(sql = builder.sql(), "Querying orders");
        let rows = builder
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await?;
        into_orders(rows)
    }

    async fn create(
        &self,
        user_id: Uuid,
        status: OrderStatus,
        lines: &[NewOrderLine],
    ) -> StoreResult<(Order, Vec<OrderLine>)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "insert into orders (id, user_id, status, creation_date) \
             values ($1, $2, $3, current_timestamp) returning {ORDER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(status.to_string())
        .fetch_one(&mut *tx)
        .await?;
        let order = Order::try_from(row)?;
        let lines = Self::insert_lines(&mut *tx, order.id, lines).await?;

        tx.commit().await?;
        Ok((order, lines))
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        status: OrderStatus,
        lines: &[NewOrderLine],
    ) -> StoreResult<Option<(Order, Vec<OrderLine>)>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "update orders set user_id = $1, status = $2 where id = $3 returning {ORDER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(status.to_string())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let order = Order::try_from(row)?;

        sqlx::query("delete from order_items where order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let lines = Self::insert_lines(&mut *tx, id, lines).await?;

        tx.commit().await?;
        Ok(Some((order, lines)))
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "update orders set status = $1 where id = $2 returning {ORDER_COLUMNS}"
        ))
        .bind(status.to_string())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn delete(&self, id: Uuid, owner: Option<Uuid>) -> StoreResult<bool> {
        let result = match owner {
            Some(user_id) => {
                sqlx::query("delete from orders where id = $1 and user_id = $2")
                    .bind(id)
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("delete from orders where id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn lines_for_orders(&self, order_ids: &[Uuid]) -> StoreResult<Vec<OrderLine>> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "select {LINE_COLUMNS} from order_items where order_id = any($1) order by seq"
        ))
        .bind(order_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    async fn find_line(&self, id: Uuid) -> StoreResult<Option<OrderLine>> {
        let line = sqlx::query_as::<_, OrderLine>(&format!(
            "select {LINE_COLUMNS} from order_items where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(line)
    }

    async fn find_line_by_order_and_item(
        &self,
        order_id: Uuid,
        item_id: Uuid,
    ) -> StoreResult<Option<OrderLine>> {
        let line = sqlx::query_as::<_, OrderLine>(&format!(
            "select {LINE_COLUMNS} from order_items where order_id = $1 and item_id = $2"
        ))
        .bind(order_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(line)
    }

    async fn lines_for_item(&self, item_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "select {LINE_COLUMNS} from order_items where item_id = $1 order by seq"
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    async fn delete_line(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("delete from order_items where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
