use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

use super::{parse_id, StoreError};
use crate::models::{Shop, ShoppingItem};

#[derive(Debug, Clone)]
pub struct ShopRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ShopRow {
    id: String,
    name: String,
    items: String,
    is_expanded: bool,
    sort_order: i64,
    last_modified: i64,
    owner: String,
    is_deleted: bool,
}

impl TryFrom<ShopRow> for Shop {
    type Error = StoreError;

    fn try_from(row: ShopRow) -> Result<Self, Self::Error> {
        let items: Vec<ShoppingItem> =
            serde_json::from_str(&row.items).map_err(|source| StoreError::CorruptColumn {
                id: row.id.clone(),
                column: "items",
                source,
            })?;

        Ok(Shop {
            id: parse_id(&row.id, "shops")?,
            name: row.name,
            items,
            is_expanded: row.is_expanded,
            order: row.sort_order.max(0) as u32,
            last_modified: row.last_modified,
            owner: row.owner,
            is_deleted: row.is_deleted,
        })
    }
}

fn hydrate(rows: Vec<ShopRow>) -> Result<Vec<Shop>, StoreError> {
    rows.into_iter().map(Shop::try_from).collect()
}

fn encode_items(shop: &Shop) -> String {
    serde_json::to_string(&shop.items).unwrap_or_else(|_| "[]".to_string())
}

impl ShopRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every shop of `owner`, tombstones included (used by sync).
    pub async fn all_by_owner(&self, owner: &str) -> Result<Vec<Shop>, StoreError> {
        let rows: Vec<ShopRow> = sqlx::query_as("SELECT * FROM shops WHERE owner = ?")
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        hydrate(rows)
    }

    /// Live shops of `owner` in display order.
    pub async fn active_by_owner(&self, owner: &str) -> Result<Vec<Shop>, StoreError> {
        let rows: Vec<ShopRow> = sqlx::query_as(
            "SELECT * FROM shops WHERE owner = ? AND is_deleted = 0 ORDER BY sort_order ASC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        hydrate(rows)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Shop>, StoreError> {
        let row: Option<ShopRow> = sqlx::query_as("SELECT * FROM shops WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Shop::try_from).transpose()
    }

    pub async fn insert(&self, shop: &Shop) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO shops (id, name, items, is_expanded, sort_order, last_modified, owner, is_deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                items = excluded.items,
                is_expanded = excluded.is_expanded,
                sort_order = excluded.sort_order,
                last_modified = excluded.last_modified,
                owner = excluded.owner,
                is_deleted = excluded.is_deleted
            "#,
        )
        .bind(shop.id.to_string())
        .bind(&shop.name)
        .bind(encode_items(shop))
        .bind(shop.is_expanded)
        .bind(i64::from(shop.order))
        .bind(shop.last_modified)
        .bind(&shop.owner)
        .bind(shop.is_deleted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, shop: &Shop) -> Result<(), StoreError> {
        update_row(&self.pool, shop).await
    }

    pub async fn update_batch(&self, shops: &[Shop]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for shop in shops {
            update_row(&mut *tx, shop).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn hard_delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM shops WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn update_row<'e, E: SqliteExecutor<'e>>(executor: E, shop: &Shop) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE shops
        SET name = ?, items = ?, is_expanded = ?, sort_order = ?, last_modified = ?,
            owner = ?, is_deleted = ?
        WHERE id = ?
        "#,
    )
    .bind(&shop.name)
    .bind(encode_items(shop))
    .bind(shop.is_expanded)
    .bind(i64::from(shop.order))
    .bind(shop.last_modified)
    .bind(&shop.owner)
    .bind(shop.is_deleted)
    .bind(shop.id.to_string())
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_store;

    #[tokio::test]
    async fn test_insert_and_get_shop_with_items() {
        let ctx = setup_store().await;
        let repo = &ctx.store.shops;

        let shop = Shop::new("Market", "alice", 0)
            .with_items(vec![ShoppingItem::new("apples").checked(), ShoppingItem::new("leeks")]);
        repo.insert(&shop).await.unwrap();

        let fetched = repo.get_by_id(shop.id).await.unwrap().unwrap();
        assert_eq!(fetched, shop);
    }

    #[tokio::test]
    async fn test_active_by_owner_in_order() {
        let ctx = setup_store().await;
        let repo = &ctx.store.shops;

        repo.insert(&Shop::new("Bakery", "alice", 1)).await.unwrap();
        repo.insert(&Shop::new("Market", "alice", 0)).await.unwrap();
        repo.insert(&Shop::new("Closed", "alice", 2).deleted())
            .await
            .unwrap();
        repo.insert(&Shop::new("Elsewhere", "bob", 0)).await.unwrap();

        let names: Vec<String> = repo
            .active_by_owner("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Market", "Bakery"]);
        assert_eq!(repo.all_by_owner("alice").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_batch_and_hard_delete() {
        let ctx = setup_store().await;
        let repo = &ctx.store.shops;

        let mut a = Shop::new("A", "alice", 0);
        let mut b = Shop::new("B", "alice", 1);
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        a.order = 1;
        b.order = 0;
        repo.update_batch(&[a.clone(), b.clone()]).await.unwrap();
        let active = repo.active_by_owner("alice").await.unwrap();
        assert_eq!(active[0].id, b.id);

        repo.hard_delete(a.id).await.unwrap();
        assert!(repo.get_by_id(a.id).await.unwrap().is_none());
    }
}
