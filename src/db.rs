//! Persistence for users, listings and exchange records.
//!
//! Handlers only see the [`Store`] trait; [`SqliteStore`] backs it with SQLite.
//! Flows that touch more than one row (listing with bonus, redemption, swap
//! completion) run in a single transaction and guard every mutation with the
//! precondition it relies on, so a concurrent writer makes the flow fail
//! instead of overdrawing a balance or double-selling an item.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    Sqlite, SqlitePool, Transaction,
};
use uuid::Uuid;

use crate::{
    catalog::{ItemStatus, SwapKind, SwapStatus},
    errors::{AppError, AuthErrorCode},
    structs::{
        Credentials, Item, ItemFilter, ItemRow, NewItem, PlatformStats, SwapFilter, SwapRecord,
        SwapRow, User,
    },
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(
        &self,
        display_name: &str,
        email: &str,
        pwd_hash: &str,
        is_admin: bool,
    ) -> Result<User, AppError>;
    async fn get_user(&self, id: &str) -> Result<User, AppError>;
    async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>, AppError>;
    async fn list_users(&self) -> Result<Vec<User>, AppError>;
    async fn set_admin(&self, id: &str, is_admin: bool) -> Result<User, AppError>;
    /// Add `delta` to a balance. Fails without change if the result would be negative.
    async fn adjust_points(&self, id: &str, delta: i64) -> Result<User, AppError>;

    /// Store a listing priced at `points` and credit its owner `bonus` points.
    async fn create_listing(
        &self,
        owner_id: &str,
        item: &NewItem,
        points: i64,
        bonus: i64,
    ) -> Result<Item, AppError>;
    async fn get_item(&self, id: &str) -> Result<Item, AppError>;
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, AppError>;
    async fn set_item_status(&self, id: &str, status: ItemStatus) -> Result<Item, AppError>;
    async fn delete_item(&self, id: &str) -> Result<(), AppError>;

    async fn insert_swap_request(
        &self,
        item: &Item,
        requester: &User,
        message: &str,
    ) -> Result<SwapRecord, AppError>;
    async fn get_swap(&self, id: &str) -> Result<SwapRecord, AppError>;
    async fn list_records(
        &self,
        kind: SwapKind,
        filter: &SwapFilter,
    ) -> Result<Vec<SwapRecord>, AppError>;
    /// Close a pending swap request without touching its item.
    async fn close_swap(&self, id: &str, status: SwapStatus) -> Result<SwapRecord, AppError>;
    /// Complete a pending swap request and hand the item to the requester.
    async fn complete_swap(&self, id: &str) -> Result<SwapRecord, AppError>;
    /// Debit the redeemer, mark the item redeemed and record the purchase.
    async fn redeem_item(&self, item_id: &str, redeemer_id: &str) -> Result<SwapRecord, AppError>;

    async fn stats(&self) -> Result<PlatformStats, AppError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .read_only(false)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrated(pool).await
    }

    /// Private in-memory database on a single connection.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, AppError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::migrate!().run(&pool).await?;
        log::info!("Database migrated successfully");
        Ok(SqliteStore { pool })
    }
}

async fn fetch_item(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<Item, AppError> {
    let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("Item"))?;
    Ok(Item::try_from(row)?)
}

async fn fetch_user(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("User"))
}

async fn fetch_swap(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<SwapRecord, AppError> {
    let row = sqlx::query_as::<_, SwapRow>("SELECT * FROM swaps WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("Swap request"))?;
    Ok(SwapRecord::try_from(row)?)
}

/// Move an available item to `redeemed`, owned now by `redeemer_id`.
async fn hand_over_item(
    tx: &mut Transaction<'_, Sqlite>,
    item_id: &str,
    redeemer_id: &str,
) -> Result<(), AppError> {
    let now = Utc::now();
    let moved = sqlx::query(
        "UPDATE items SET status = ?, redeemed_by = ?, redeemed_at = ?, updated_at = ? \
         WHERE id = ? AND status = ?",
    )
    .bind(ItemStatus::Redeemed.as_str())
    .bind(redeemer_id)
    .bind(now)
    .bind(now)
    .bind(item_id)
    .bind(ItemStatus::Available.as_str())
    .execute(&mut **tx)
    .await?;
    if moved.rows_affected() == 0 {
        return Err(AppError::ItemUnavailable);
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_user(
        &self,
        display_name: &str,
        email: &str,
        pwd_hash: &str,
        is_admin: bool,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, display_name, email, pwd_hash, points, is_admin, joined_at) \
             VALUES (?, ?, ?, ?, 0, ?, ?) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(display_name)
        .bind(email)
        .bind(pwd_hash)
        .bind(is_admin)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Auth(AuthErrorCode::EmailInUse)
            }
            other => AppError::DatabaseError(other),
        })?;
        log::info!("User created: {}", user.id);
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<User, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("User"))
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>, AppError> {
        let creds = sqlx::query_as::<_, Credentials>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(creds)
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY joined_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn set_admin(&self, id: &str, is_admin: bool) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>("UPDATE users SET is_admin = ? WHERE id = ? RETURNING *")
            .bind(is_admin)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("User"))?;
        log::info!("User {} admin flag set to {}", user.id, is_admin);
        Ok(user)
    }

    async fn adjust_points(&self, id: &str, delta: i64) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;
        let user = fetch_user(&mut tx, id).await?;
        let balance = user.points.checked_add(delta).ok_or_else(|| {
            AppError::Validation(format!("Adjusting {} points by {} overflows", user.points, delta))
        })?;
        if balance < 0 {
            return Err(AppError::InsufficientPoints {
                balance: user.points,
                required: delta.saturating_neg(),
            });
        }
        // compare-and-set so a concurrent debit is not overwritten
        let updated = sqlx::query_as::<_, User>(
            "UPDATE users SET points = ? WHERE id = ? AND points = ? RETURNING *",
        )
        .bind(balance)
        .bind(id)
        .bind(user.points)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::Validation("Balance changed during the adjustment, try again".to_owned())
        })?;
        tx.commit().await?;
        log::info!("User {} points adjusted by {} to {}", updated.id, delta, updated.points);
        Ok(updated)
    }

    async fn create_listing(
        &self,
        owner_id: &str,
        item: &NewItem,
        points: i64,
        bonus: i64,
    ) -> Result<Item, AppError> {
        let now = Utc::now();
        let tags = serde_json::to_string(item.tags()).map_err(|e| AppError::Validation(e.to_string()))?;
        let images =
            serde_json::to_string(item.images()).map_err(|e| AppError::Validation(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, ItemRow>(
            "INSERT INTO items (id, owner_id, title, description, category, item_type, size, \
             condition, tags, images, points, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(owner_id)
        .bind(item.title())
        .bind(item.description())
        .bind(item.category().as_str())
        .bind(item.item_type().as_str())
        .bind(item.size().to_string())
        .bind(item.condition().as_str())
        .bind(tags)
        .bind(images)
        .bind(points)
        .bind(ItemStatus::Available.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let credited = sqlx::query("UPDATE users SET points = points + ? WHERE id = ?")
            .bind(bonus)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if credited.rows_affected() == 0 {
            return Err(AppError::NotFound("User"));
        }
        tx.commit().await?;

        let item = Item::try_from(row)?;
        log::info!(
            "Item {} listed by {} at {} points (+{} bonus)",
            item.id,
            owner_id,
            points,
            bonus
        );
        Ok(item)
    }

    async fn get_item(&self, id: &str) -> Result<Item, AppError> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Item"))?;
        Ok(Item::try_from(row)?)
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, AppError> {
        let mut query = String::from("SELECT * FROM items");
        let mut clauses = Vec::new();
        if filter.status.is_some() {
            clauses.push("status = ?");
        }
        if filter.category.is_some() {
            clauses.push("category = ?");
        }
        if filter.owner_id.is_some() {
            clauses.push("owner_id = ?");
        }
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, ItemRow>(&query);
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }
        if let Some(category) = filter.category {
            q = q.bind(category.as_str());
        }
        if let Some(owner_id) = &filter.owner_id {
            q = q.bind(owner_id);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| Item::try_from(row).map_err(AppError::from))
            .collect()
    }

    async fn set_item_status(&self, id: &str, status: ItemStatus) -> Result<Item, AppError> {
        let current = self.get_item(id).await?;
        if !current.status.can_transition_to(status) {
            return Err(AppError::ItemTransition {
                from: current.status,
                to: status,
            });
        }
        let row = sqlx::query_as::<_, ItemRow>(
            "UPDATE items SET status = ?, updated_at = ? WHERE id = ? AND status = ? RETURNING *",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(current.status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::ItemUnavailable)?;
        log::info!("Item {} moved from {} to {}", id, current.status, status);
        Ok(Item::try_from(row)?)
    }

    async fn delete_item(&self, id: &str) -> Result<(), AppError> {
        let deleted = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("Item"));
        }
        log::info!("Item with id {} deleted", id);
        Ok(())
    }

    async fn insert_swap_request(
        &self,
        item: &Item,
        requester: &User,
        message: &str,
    ) -> Result<SwapRecord, AppError> {
        let row = sqlx::query_as::<_, SwapRow>(
            "INSERT INTO swaps (id, item_id, item_title, owner_id, requester_id, requester_name, \
             status, kind, points, message, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.owner_id)
        .bind(&requester.id)
        .bind(&requester.display_name)
        .bind(SwapStatus::Pending.as_str())
        .bind(SwapKind::Swap.as_str())
        .bind(message)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        let record = SwapRecord::try_from(row)?;
        log::info!("Swap {} requested for item {} by {}", record.id, item.id, requester.id);
        Ok(record)
    }

    async fn get_swap(&self, id: &str) -> Result<SwapRecord, AppError> {
        let row = sqlx::query_as::<_, SwapRow>("SELECT * FROM swaps WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Swap request"))?;
        Ok(SwapRecord::try_from(row)?)
    }

    async fn list_records(
        &self,
        kind: SwapKind,
        filter: &SwapFilter,
    ) -> Result<Vec<SwapRecord>, AppError> {
        let mut query = format!("SELECT * FROM {}", kind.table());
        let mut clauses = Vec::new();
        if filter.owner_id.is_some() {
            clauses.push("owner_id = ?");
        }
        if filter.requester_id.is_some() {
            clauses.push("requester_id = ?");
        }
        if filter.status.is_some() {
            clauses.push("status = ?");
        }
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, SwapRow>(&query);
        if let Some(owner_id) = &filter.owner_id {
            q = q.bind(owner_id);
        }
        if let Some(requester_id) = &filter.requester_id {
            q = q.bind(requester_id);
        }
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| SwapRecord::try_from(row).map_err(AppError::from))
            .collect()
    }

    async fn close_swap(&self, id: &str, status: SwapStatus) -> Result<SwapRecord, AppError> {
        let current = self.get_swap(id).await?;
        if status == SwapStatus::Completed || !current.status.can_transition_to(status) {
            return Err(AppError::SwapTransition {
                from: current.status,
                to: status,
            });
        }
        let row = sqlx::query_as::<_, SwapRow>(
            "UPDATE swaps SET status = ? WHERE id = ? AND status = ? RETURNING *",
        )
        .bind(status.as_str())
        .bind(id)
        .bind(SwapStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::SwapTransition {
            from: current.status,
            to: status,
        })?;
        log::info!("Swap {} closed as {}", id, status);
        Ok(SwapRecord::try_from(row)?)
    }

    async fn complete_swap(&self, id: &str) -> Result<SwapRecord, AppError> {
        let mut tx = self.pool.begin().await?;
        let swap = fetch_swap(&mut tx, id).await?;
        if !swap.status.can_transition_to(SwapStatus::Completed) {
            return Err(AppError::SwapTransition {
                from: swap.status,
                to: SwapStatus::Completed,
            });
        }
        hand_over_item(&mut tx, &swap.item_id, &swap.requester_id).await?;

        sqlx::query("UPDATE swaps SET status = ? WHERE id = ?")
            .bind(SwapStatus::Completed.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        // the item is gone, so competing requests for it cannot succeed
        sqlx::query("UPDATE swaps SET status = ? WHERE item_id = ? AND status = ? AND id != ?")
            .bind(SwapStatus::Rejected.as_str())
            .bind(&swap.item_id)
            .bind(SwapStatus::Pending.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let completed = fetch_swap(&mut tx, id).await?;
        tx.commit().await?;

        log::info!("Swap {} completed, item {} handed over", id, swap.item_id);
        Ok(completed)
    }

    async fn redeem_item(&self, item_id: &str, redeemer_id: &str) -> Result<SwapRecord, AppError> {
        let mut tx = self.pool.begin().await?;
        let item = fetch_item(&mut tx, item_id).await?;
        if item.status != ItemStatus::Available {
            return Err(AppError::ItemUnavailable);
        }
        if item.owner_id == redeemer_id {
            return Err(AppError::Forbidden("cannot redeem your own item"));
        }
        let redeemer = fetch_user(&mut tx, redeemer_id).await?;

        let debited = sqlx::query("UPDATE users SET points = points - ? WHERE id = ? AND points >= ?")
            .bind(item.points)
            .bind(redeemer_id)
            .bind(item.points)
            .execute(&mut *tx)
            .await?;
        if debited.rows_affected() == 0 {
            return Err(AppError::InsufficientPoints {
                balance: redeemer.points,
                required: item.points,
            });
        }
        hand_over_item(&mut tx, item_id, redeemer_id).await?;

        let row = sqlx::query_as::<_, SwapRow>(
            "INSERT INTO purchases (id, item_id, item_title, owner_id, requester_id, \
             requester_name, status, kind, points, message, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, '', ?) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.owner_id)
        .bind(&redeemer.id)
        .bind(&redeemer.display_name)
        .bind(SwapStatus::Completed.as_str())
        .bind(SwapKind::Points.as_str())
        .bind(item.points)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        log::info!(
            "Item {} redeemed by {} for {} points",
            item.id,
            redeemer.id,
            item.points
        );
        Ok(SwapRecord::try_from(row)?)
    }

    async fn stats(&self) -> Result<PlatformStats, AppError> {
        let count = |sql: &'static str| sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool);
        Ok(PlatformStats {
            users: count("SELECT COUNT(*) FROM users").await?,
            items: count("SELECT COUNT(*) FROM items").await?,
            available_items: count("SELECT COUNT(*) FROM items WHERE status = 'available'").await?,
            pending_swaps: count("SELECT COUNT(*) FROM swaps WHERE status = 'pending'").await?,
            completed_exchanges: count(
                "SELECT (SELECT COUNT(*) FROM swaps WHERE status = 'completed') \
                 + (SELECT COUNT(*) FROM purchases)",
            )
            .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Condition, ItemType, Size};

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.expect("in-memory store")
    }

    fn jacket() -> NewItem {
        NewItem::new(
            "Wool coat",
            "Warm",
            Category::Outerwear,
            ItemType::Coat,
            Size::M,
            Condition::Good,
            vec!["wool".into()],
            vec!["/uploads/items/x/1_0".into()],
        )
        .unwrap()
    }

    async fn user(store: &SqliteStore, email: &str) -> User {
        store.insert_user("Tester", email, "hash", false).await.unwrap()
    }

    #[tokio::test]
    async fn duplicate_email_maps_to_auth_code() {
        let store = store().await;
        user(&store, "a@example.com").await;
        let err = store
            .insert_user("Other", "a@example.com", "hash", false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthErrorCode::EmailInUse)));
    }

    #[tokio::test]
    async fn credentials_carry_hash_and_profile() {
        let store = store().await;
        let created = user(&store, "a@example.com").await;
        let creds = store.find_credentials("a@example.com").await.unwrap().unwrap();
        assert_eq!(creds.user, created);
        assert_eq!(creds.pwd_hash, "hash");
        assert!(store.find_credentials("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_stores_item_and_credits_bonus() {
        let store = store().await;
        let owner = user(&store, "o@example.com").await;

        let item = store.create_listing(&owner.id, &jacket(), 13, 5).await.unwrap();

        assert_eq!(item.points, 13);
        assert_eq!(item.status, ItemStatus::Available);
        assert_eq!(item.tags, vec!["wool".to_owned()]);
        assert_eq!(store.get_user(&owner.id).await.unwrap().points, 5);
        assert_eq!(store.get_item(&item.id).await.unwrap(), item);
    }

    #[tokio::test]
    async fn listing_for_unknown_owner_rolls_back() {
        let store = store().await;
        let err = store.create_listing("ghost", &jacket(), 13, 5).await.unwrap_err();
        // foreign key or missing user, either way nothing is stored
        assert!(matches!(err, AppError::NotFound(_) | AppError::DatabaseError(_)));
        assert!(store.list_items(&ItemFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_items_applies_equality_filters() {
        let store = store().await;
        let a = user(&store, "a@example.com").await;
        let b = user(&store, "b@example.com").await;
        let coat = store.create_listing(&a.id, &jacket(), 13, 0).await.unwrap();
        let shirt = NewItem::new(
            "Shirt",
            "",
            Category::Tops,
            ItemType::Shirt,
            Size::S,
            Condition::Fair,
            vec![],
            vec![],
        )
        .unwrap();
        let shirt = store.create_listing(&b.id, &shirt, 10, 0).await.unwrap();
        store.set_item_status(&shirt.id, ItemStatus::Rejected).await.unwrap();

        let available = store.list_items(&ItemFilter::available()).await.unwrap();
        assert_eq!(available, vec![coat.clone()]);

        let tops = ItemFilter {
            category: Some(Category::Tops),
            ..Default::default()
        };
        assert_eq!(store.list_items(&tops).await.unwrap().len(), 1);
        assert_eq!(store.list_items(&ItemFilter::owned_by(&a.id)).await.unwrap(), vec![coat]);
    }

    #[tokio::test]
    async fn item_status_cannot_return_to_available() {
        let store = store().await;
        let owner = user(&store, "o@example.com").await;
        let item = store.create_listing(&owner.id, &jacket(), 13, 0).await.unwrap();

        store.set_item_status(&item.id, ItemStatus::Pending).await.unwrap();
        let err = store
            .set_item_status(&item.id, ItemStatus::Available)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::ItemTransition {
                from: ItemStatus::Pending,
                to: ItemStatus::Available
            }
        ));
    }

    #[tokio::test]
    async fn adjust_points_refuses_negative_balance() {
        let store = store().await;
        let u = user(&store, "u@example.com").await;
        assert_eq!(store.adjust_points(&u.id, 7).await.unwrap().points, 7);

        let err = store.adjust_points(&u.id, -8).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientPoints { balance: 7, required: 8 }));
        assert_eq!(store.get_user(&u.id).await.unwrap().points, 7);
    }

    #[tokio::test]
    async fn adjust_points_refuses_overflow_and_keeps_balance_readable() {
        let store = store().await;
        let u = user(&store, "u@example.com").await;
        store.adjust_points(&u.id, 10).await.unwrap();

        let err = store.adjust_points(&u.id, i64::MAX).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = store.adjust_points(&u.id, i64::MIN).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientPoints { balance: 10, required: i64::MAX }));

        assert_eq!(store.get_user(&u.id).await.unwrap().points, 10);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn redemption_debits_once_and_records_purchase() {
        let store = store().await;
        let owner = user(&store, "o@example.com").await;
        let buyer = user(&store, "b@example.com").await;
        store.adjust_points(&buyer.id, 20).await.unwrap();
        let item = store.create_listing(&owner.id, &jacket(), 13, 0).await.unwrap();

        let record = store.redeem_item(&item.id, &buyer.id).await.unwrap();

        assert_eq!(record.kind, SwapKind::Points);
        assert_eq!(record.status, SwapStatus::Completed);
        assert_eq!(record.points, Some(13));
        assert_eq!(store.get_user(&buyer.id).await.unwrap().points, 7);
        let item = store.get_item(&item.id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Redeemed);
        assert_eq!(item.redeemed_by.as_deref(), Some(buyer.id.as_str()));

        let again = store.redeem_item(&item.id, &buyer.id).await.unwrap_err();
        assert!(matches!(again, AppError::ItemUnavailable));
        assert_eq!(store.get_user(&buyer.id).await.unwrap().points, 7);

        let purchases = store
            .list_records(
                SwapKind::Points,
                &SwapFilter {
                    requester_id: Some(buyer.id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(purchases, vec![record]);
    }

    #[tokio::test]
    async fn redemption_without_balance_changes_nothing() {
        let store = store().await;
        let owner = user(&store, "o@example.com").await;
        let buyer = user(&store, "b@example.com").await;
        store.adjust_points(&buyer.id, 3).await.unwrap();
        let item = store.create_listing(&owner.id, &jacket(), 13, 0).await.unwrap();

        let err = store.redeem_item(&item.id, &buyer.id).await.unwrap_err();

        assert!(matches!(err, AppError::InsufficientPoints { balance: 3, required: 13 }));
        assert_eq!(store.get_user(&buyer.id).await.unwrap().points, 3);
        assert_eq!(store.get_item(&item.id).await.unwrap().status, ItemStatus::Available);
        assert_eq!(store.stats().await.unwrap().completed_exchanges, 0);
    }

    #[tokio::test]
    async fn completing_a_swap_rejects_competing_requests() {
        let store = store().await;
        let owner = user(&store, "o@example.com").await;
        let first = user(&store, "f@example.com").await;
        let second = user(&store, "s@example.com").await;
        let item = store.create_listing(&owner.id, &jacket(), 13, 0).await.unwrap();
        let winning = store.insert_swap_request(&item, &first, "hi").await.unwrap();
        let losing = store.insert_swap_request(&item, &second, "me too").await.unwrap();

        let done = store.complete_swap(&winning.id).await.unwrap();

        assert_eq!(done.status, SwapStatus::Completed);
        assert_eq!(store.get_swap(&losing.id).await.unwrap().status, SwapStatus::Rejected);
        let item = store.get_item(&item.id).await.unwrap();
        assert_eq!(item.status, ItemStatus::Redeemed);
        assert_eq!(item.redeemed_by.as_deref(), Some(first.id.as_str()));

        let err = store.close_swap(&winning.id, SwapStatus::Cancelled).await.unwrap_err();
        assert!(matches!(err, AppError::SwapTransition { .. }));
    }

    #[tokio::test]
    async fn stats_count_rows() {
        let store = store().await;
        let owner = user(&store, "o@example.com").await;
        let other = user(&store, "x@example.com").await;
        let item = store.create_listing(&owner.id, &jacket(), 13, 0).await.unwrap();
        store.insert_swap_request(&item, &other, "").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            PlatformStats {
                users: 2,
                items: 1,
                available_items: 1,
                pending_swaps: 1,
                completed_exchanges: 0,
            }
        );
    }
}
