//! Remote data store: the abstract CRUD seam and its SQLite implementation.
//!
//! - `model`: write payloads and queue rows.
//! - `repo`: `SqliteStore`, SQL-only functions that map rows into domain records.
//!
//! Everything above this module works against [`CatalogStore`], so any backend
//! offering the same operations can be substituted.

pub mod model;
pub mod repo;

pub use model::{BulkPatch, PendingCascade};
pub use repo::{init_pool, run_migrations, Pool, SqliteStore};

use crate::model::{Article, FieldEdit, ItemKey, ItemKind, Lot, Seller, Transition};
use anyhow::Result;
use async_trait::async_trait;

/// Operations the catalog needs from its backing store, scoped to one account.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn fetch_articles(&self) -> Result<Vec<Article>>;

    async fn fetch_lots(&self) -> Result<Vec<Lot>>;

    async fn fetch_sellers(&self) -> Result<Vec<Seller>>;

    /// Update one field of one record. Fails if the record does not exist.
    async fn update_field(&self, key: &ItemKey, edit: &FieldEdit) -> Result<()>;

    /// One batched update over `ids`, all of the same kind.
    async fn update_many(&self, kind: ItemKind, ids: &[String], patch: &BulkPatch) -> Result<()>;

    async fn delete_many(&self, kind: ItemKind, ids: &[String]) -> Result<()>;

    /// Insert fully built records and return them as stored.
    async fn insert_articles(&self, articles: &[Article]) -> Result<Vec<Article>>;

    /// Insert lots together with their constituent associations.
    async fn insert_lots(&self, lots: &[Lot]) -> Result<Vec<Lot>>;

    async fn apply_transition(&self, key: &ItemKey, transition: &Transition) -> Result<()>;

    /// Flag the constituents of a sold lot as `vendu_en_lot`.
    async fn mark_sold_in_lot(&self, lot_id: &str, article_ids: &[String]) -> Result<()>;

    async fn insert_seller(&self, name: &str) -> Result<Seller>;

    /// Make `seller_id` the only default seller of the account.
    async fn set_default_seller(&self, seller_id: &str) -> Result<()>;

    async fn enqueue_pending_cascade(&self, lot_id: &str) -> Result<i64>;

    async fn next_due_cascade(&self) -> Result<Option<PendingCascade>>;

    async fn complete_cascade(&self, id: i64) -> Result<()>;

    async fn backoff_cascade(&self, id: i64, attempt: i32, max_cap_secs: i64) -> Result<()>;
}
