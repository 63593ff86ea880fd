use super::model::{BulkPatch, PendingCascade};
use super::CatalogStore;
use crate::model::{
    Article, Field, FieldEdit, ItemKey, ItemKind, Lot, Season, Seller, Status, Transition,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

const ARTICLE_COLUMNS: &str = "id, title, description, brand, price, status, season, \
    reference_number, photos, seller_id, created_at, published_at, scheduled_for, vinted_url, \
    sold_at, sold_price, fees, shipping_cost, net_profit, buyer_name, sale_notes, sold_lot_id";

const LOT_COLUMNS: &str = "id, name, description, price, status, season, reference_number, \
    photos, seller_id, created_at, published_at, scheduled_for, vinted_url, sold_at, \
    sold_price, fees, shipping_cost, net_profit, buyer_name, sale_notes";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = normalized.starts_with("sqlite::memory");
    let mut options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .foreign_keys(true)
        .synchronous(SqliteSynchronous::Full);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }
    let pool = if in_memory {
        // Each connection to an in-memory URL would open a separate database.
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new().connect_with(options).await?
    };
    Ok(pool)
}

/// Expand a leading `~/` in file-backed SQLite URLs and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through unchanged.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// SQLite-backed catalog store scoped to one account.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
    user_id: String,
}

impl SqliteStore {
    pub fn new(pool: Pool, user_id: impl Into<String>) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn lot_article_ids(&self) -> Result<HashMap<String, Vec<String>>> {
        let rows = sqlx::query(
            "SELECT li.lot_id, li.article_id FROM lot_items li \
             JOIN lots l ON l.id = li.lot_id \
             WHERE l.user_id = ? ORDER BY li.lot_id, li.position",
        )
        .bind(&self.user_id)
        .fetch_all(&self.pool)
        .await?;
        let mut by_lot: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let lot_id: String = row.get("lot_id");
            by_lot.entry(lot_id).or_default().push(row.get("article_id"));
        }
        Ok(by_lot)
    }
}

// Coercion of stored values into typed fields lives here and nowhere else.

fn parse_status_column(raw: &str, key: &ItemKey) -> Status {
    Status::parse_status(raw).unwrap_or_else(|| {
        warn!(%key, status = raw, "unknown status; treating as error");
        Status::Error
    })
}

fn parse_season_column(raw: Option<String>, key: &ItemKey) -> Option<Season> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;
    match raw.parse() {
        Ok(season) => Some(season),
        Err(err) => {
            warn!(%key, ?err, "ignoring unknown season");
            None
        }
    }
}

fn parse_photos_column(raw: Option<String>, key: &ItemKey) -> Vec<String> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        warn!(%key, ?err, "photos column is not a JSON array");
        Vec::new()
    })
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let id: String = row.try_get("id")?;
    let key = ItemKey::new(ItemKind::Article, id.clone());
    let status: String = row.try_get("status")?;
    Ok(Article {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        brand: row.try_get("brand")?,
        price: row.try_get("price")?,
        status: parse_status_column(&status, &key),
        season: parse_season_column(row.try_get("season")?, &key),
        reference_number: row.try_get("reference_number")?,
        photos: parse_photos_column(row.try_get("photos")?, &key),
        seller_id: row.try_get("seller_id")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
        scheduled_for: row.try_get("scheduled_for")?,
        vinted_url: row.try_get("vinted_url")?,
        sold_at: row.try_get("sold_at")?,
        sold_price: row.try_get("sold_price")?,
        fees: row.try_get("fees")?,
        shipping_cost: row.try_get("shipping_cost")?,
        net_profit: row.try_get("net_profit")?,
        buyer_name: row.try_get("buyer_name")?,
        sale_notes: row.try_get("sale_notes")?,
        sold_lot_id: row.try_get("sold_lot_id")?,
        id,
    })
}

fn lot_from_row(row: &SqliteRow, article_ids: Vec<String>) -> Result<Lot> {
    let id: String = row.try_get("id")?;
    let key = ItemKey::new(ItemKind::Lot, id.clone());
    let status: String = row.try_get("status")?;
    Ok(Lot {
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        status: parse_status_column(&status, &key),
        season: parse_season_column(row.try_get("season")?, &key),
        reference_number: row.try_get("reference_number")?,
        photos: parse_photos_column(row.try_get("photos")?, &key),
        seller_id: row.try_get("seller_id")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
        scheduled_for: row.try_get("scheduled_for")?,
        vinted_url: row.try_get("vinted_url")?,
        sold_at: row.try_get("sold_at")?,
        sold_price: row.try_get("sold_price")?,
        fees: row.try_get("fees")?,
        shipping_cost: row.try_get("shipping_cost")?,
        net_profit: row.try_get("net_profit")?,
        buyer_name: row.try_get("buyer_name")?,
        sale_notes: row.try_get("sale_notes")?,
        article_ids,
        id,
    })
}

fn column_for(kind: ItemKind, field: Field) -> Option<&'static str> {
    match (field, kind) {
        (Field::Title, ItemKind::Article) => Some("title"),
        (Field::Title, ItemKind::Lot) => Some("name"),
        (Field::Brand, ItemKind::Article) => Some("brand"),
        (Field::Brand, ItemKind::Lot) => None,
        (Field::Description, _) => Some("description"),
        (Field::Price, _) => Some("price"),
        (Field::Status, _) => Some("status"),
        (Field::Seller, _) => Some("seller_id"),
        (Field::Season, _) => Some("season"),
        (Field::ReferenceNumber, _) => Some("reference_number"),
    }
}

fn push_edit_value(qb: &mut QueryBuilder<'_, Sqlite>, edit: &FieldEdit) {
    match edit {
        FieldEdit::Title(v) => {
            qb.push_bind(v.clone());
        }
        FieldEdit::Description(v)
        | FieldEdit::Brand(v)
        | FieldEdit::Seller(v)
        | FieldEdit::ReferenceNumber(v) => {
            qb.push_bind(v.clone());
        }
        FieldEdit::Price(v) => {
            qb.push_bind(*v);
        }
        FieldEdit::Status(s) => {
            qb.push_bind(s.as_str());
        }
        FieldEdit::Season(s) => {
            qb.push_bind(s.map(|s| s.as_str()));
        }
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    qb.push(" AND id IN (");
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(id.clone());
    }
    list.push_unseparated(")");
}

#[async_trait]
impl CatalogStore for SqliteStore {
    #[instrument(skip_all)]
    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE user_id = ? ORDER BY created_at DESC"
        ))
        .bind(&self.user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(article_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn fetch_lots(&self) -> Result<Vec<Lot>> {
        let mut members = self.lot_article_ids().await?;
        let rows = sqlx::query(&format!(
            "SELECT {LOT_COLUMNS} FROM lots WHERE user_id = ? ORDER BY created_at DESC"
        ))
        .bind(&self.user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                lot_from_row(row, members.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    #[instrument(skip_all)]
    async fn fetch_sellers(&self) -> Result<Vec<Seller>> {
        let rows = sqlx::query(
            "SELECT id, name, is_default FROM family_members WHERE user_id = ? ORDER BY name",
        )
        .bind(&self.user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| Seller {
                id: row.get("id"),
                name: row.get("name"),
                is_default: row.get("is_default"),
            })
            .collect())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn update_field(&self, key: &ItemKey, edit: &FieldEdit) -> Result<()> {
        let column = column_for(key.kind, edit.field())
            .ok_or_else(|| anyhow!("{:?} is not stored on {}", edit.field(), key.kind.table()))?;
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "UPDATE {} SET {} = ",
            key.kind.table(),
            column
        ));
        push_edit_value(&mut qb, edit);
        qb.push(" WHERE user_id = ");
        qb.push_bind(self.user_id.clone());
        qb.push(" AND id = ");
        qb.push_bind(key.id.clone());
        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update {key}"))?;
        if res.rows_affected() == 0 {
            return Err(anyhow!("{key} not found"));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %kind, count = ids.len()))]
    async fn update_many(&self, kind: ItemKind, ids: &[String], patch: &BulkPatch) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let edit = patch.as_edit();
        let column = column_for(kind, edit.field())
            .ok_or_else(|| anyhow!("{:?} is not stored on {}", edit.field(), kind.table()))?;
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET {} = ", kind.table(), column));
        push_edit_value(&mut qb, &edit);
        qb.push(" WHERE user_id = ");
        qb.push_bind(self.user_id.clone());
        push_id_list(&mut qb, ids);
        qb.build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update {} {}", ids.len(), kind.table()))?;
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %kind, count = ids.len()))]
    async fn delete_many(&self, kind: ItemKind, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE user_id = ", kind.table()));
        qb.push_bind(self.user_id.clone());
        push_id_list(&mut qb, ids);
        qb.build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete {} {}", ids.len(), kind.table()))?;
        Ok(())
    }

    #[instrument(skip_all, fields(count = articles.len()))]
    async fn insert_articles(&self, articles: &[Article]) -> Result<Vec<Article>> {
        let mut tx = self.pool.begin().await?;
        for a in articles {
            sqlx::query(
                "INSERT INTO articles (id, user_id, title, description, brand, price, status, season, \
                 reference_number, photos, seller_id, created_at, published_at, scheduled_for, vinted_url, \
                 sold_at, sold_price, fees, shipping_cost, net_profit, buyer_name, sale_notes, sold_lot_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&a.id)
            .bind(&self.user_id)
            .bind(&a.title)
            .bind(a.description.as_deref())
            .bind(a.brand.as_deref())
            .bind(a.price)
            .bind(a.status.as_str())
            .bind(a.season.map(|s| s.as_str()))
            .bind(a.reference_number.as_deref())
            .bind(serde_json::to_string(&a.photos)?)
            .bind(a.seller_id.as_deref())
            .bind(a.created_at)
            .bind(a.published_at)
            .bind(a.scheduled_for)
            .bind(a.vinted_url.as_deref())
            .bind(a.sold_at)
            .bind(a.sold_price)
            .bind(a.fees)
            .bind(a.shipping_cost)
            .bind(a.net_profit)
            .bind(a.buyer_name.as_deref())
            .bind(a.sale_notes.as_deref())
            .bind(a.sold_lot_id.as_deref())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert article {}", a.id))?;
        }
        tx.commit().await?;
        Ok(articles.to_vec())
    }

    #[instrument(skip_all, fields(count = lots.len()))]
    async fn insert_lots(&self, lots: &[Lot]) -> Result<Vec<Lot>> {
        let mut tx = self.pool.begin().await?;
        for l in lots {
            sqlx::query(
                "INSERT INTO lots (id, user_id, name, description, price, status, season, \
                 reference_number, photos, seller_id, created_at, published_at, scheduled_for, vinted_url, \
                 sold_at, sold_price, fees, shipping_cost, net_profit, buyer_name, sale_notes) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&l.id)
            .bind(&self.user_id)
            .bind(&l.name)
            .bind(l.description.as_deref())
            .bind(l.price)
            .bind(l.status.as_str())
            .bind(l.season.map(|s| s.as_str()))
            .bind(l.reference_number.as_deref())
            .bind(serde_json::to_string(&l.photos)?)
            .bind(l.seller_id.as_deref())
            .bind(l.created_at)
            .bind(l.published_at)
            .bind(l.scheduled_for)
            .bind(l.vinted_url.as_deref())
            .bind(l.sold_at)
            .bind(l.sold_price)
            .bind(l.fees)
            .bind(l.shipping_cost)
            .bind(l.net_profit)
            .bind(l.buyer_name.as_deref())
            .bind(l.sale_notes.as_deref())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert lot {}", l.id))?;

            for (position, article_id) in l.article_ids.iter().enumerate() {
                sqlx::query("INSERT INTO lot_items (lot_id, article_id, position) VALUES (?, ?, ?)")
                    .bind(&l.id)
                    .bind(article_id)
                    .bind(position as i64)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("failed to link article {article_id} to lot {}", l.id))?;
            }
        }
        tx.commit().await?;
        Ok(lots.to_vec())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn apply_transition(&self, key: &ItemKey, transition: &Transition) -> Result<()> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", key.kind.table()));
        match transition {
            Transition::Publish { at } => {
                qb.push("status = 'published', scheduled_for = NULL, published_at = ");
                qb.push_bind(*at);
            }
            Transition::Schedule { at } => {
                qb.push("status = 'scheduled', scheduled_for = ");
                qb.push_bind(*at);
            }
            Transition::RevertToDraft => {
                qb.push(
                    "status = 'draft', scheduled_for = NULL, sold_at = NULL, sold_price = NULL, \
                     fees = NULL, shipping_cost = NULL, net_profit = NULL, buyer_name = NULL, \
                     sale_notes = NULL",
                );
                if key.kind == ItemKind::Article {
                    qb.push(", sold_lot_id = NULL");
                }
            }
            Transition::Sold(sale) => {
                qb.push("status = 'sold', sold_at = ");
                qb.push_bind(sale.sold_at);
                qb.push(", sold_price = ");
                qb.push_bind(sale.sold_price);
                qb.push(", fees = ");
                qb.push_bind(sale.fees);
                qb.push(", shipping_cost = ");
                qb.push_bind(sale.shipping_cost);
                qb.push(", net_profit = ");
                qb.push_bind(sale.net_profit());
                qb.push(", buyer_name = ");
                qb.push_bind(sale.buyer_name.clone());
                qb.push(", sale_notes = ");
                qb.push_bind(sale.notes.clone());
            }
        }
        qb.push(" WHERE user_id = ");
        qb.push_bind(self.user_id.clone());
        qb.push(" AND id = ");
        qb.push_bind(key.id.clone());
        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update {key}"))?;
        if res.rows_affected() == 0 {
            return Err(anyhow!("{key} not found"));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(lot_id = %lot_id, count = article_ids.len()))]
    async fn mark_sold_in_lot(&self, lot_id: &str, article_ids: &[String]) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "UPDATE articles SET status = 'vendu_en_lot', sold_lot_id = ",
        );
        qb.push_bind(lot_id.to_string());
        qb.push(" WHERE user_id = ");
        qb.push_bind(self.user_id.clone());
        push_id_list(&mut qb, article_ids);
        qb.build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to flag articles of lot {lot_id}"))?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn insert_seller(&self, name: &str) -> Result<Seller> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO family_members (id, user_id, name, is_default) VALUES (?, ?, ?, 0)")
            .bind(&id)
            .bind(&self.user_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .context("failed to insert seller")?;
        Ok(Seller {
            id,
            name: name.to_string(),
            is_default: false,
        })
    }

    #[instrument(skip_all)]
    async fn set_default_seller(&self, seller_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query_scalar::<_, String>(
            "SELECT id FROM family_members WHERE id = ? AND user_id = ?",
        )
        .bind(seller_id)
        .bind(&self.user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Err(anyhow!("seller {seller_id} not found"));
        }
        sqlx::query("UPDATE family_members SET is_default = 0 WHERE user_id = ?")
            .bind(&self.user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE family_members SET is_default = 1 WHERE id = ?")
            .bind(seller_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn enqueue_pending_cascade(&self, lot_id: &str) -> Result<i64> {
        let rec = sqlx::query(
            "INSERT INTO pending_cascades (user_id, lot_id, attempt, due_at) VALUES (?, ?, 0, ?) RETURNING id",
        )
        .bind(&self.user_id)
        .bind(lot_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.get("id"))
    }

    #[instrument(skip_all)]
    async fn next_due_cascade(&self) -> Result<Option<PendingCascade>> {
        let row = sqlx::query(
            "SELECT id, lot_id, attempt FROM pending_cascades \
             WHERE user_id = ? AND datetime(due_at) <= CURRENT_TIMESTAMP \
             ORDER BY datetime(due_at) ASC, id ASC LIMIT 1",
        )
        .bind(&self.user_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let lot_id: String = row.get("lot_id");
        let article_ids: Vec<String> =
            sqlx::query_scalar("SELECT article_id FROM lot_items WHERE lot_id = ? ORDER BY position")
                .bind(&lot_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(Some(PendingCascade {
            id: row.get("id"),
            lot_id,
            article_ids,
            attempt: row.get("attempt"),
        }))
    }

    #[instrument(skip_all)]
    async fn complete_cascade(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pending_cascades WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn backoff_cascade(&self, id: i64, attempt: i32, max_cap_secs: i64) -> Result<()> {
        // 5s * 2^attempt, capped
        let secs = 5_i64 * (1_i64 << attempt.clamp(0, 10));
        let secs = if max_cap_secs > 0 {
            secs.min(max_cap_secs)
        } else {
            secs
        };
        sqlx::query(
            "UPDATE pending_cascades SET attempt = ?, due_at = datetime('now', ? || ' seconds') WHERE id = ?",
        )
        .bind(attempt + 1)
        .bind(secs)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{article, lot, ts};
    use crate::model::SaleOutcome;

    async fn setup_store() -> SqliteStore {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool, "user-1")
    }

    #[test]
    fn sqlite_url_normalization() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x/y"), "postgres://x/y");

        let td = tempfile::tempdir().unwrap();
        let db = td.path().join("nested").join("catalog.db");
        let url = format!("sqlite://{}?mode=rwc", db.display());
        let out = prepare_sqlite_url(&url);
        assert_eq!(out, url);
        assert!(db.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn articles_and_lots_round_trip() {
        let store = setup_store().await;
        let mut a = article("a1", "Jacket", Status::Ready);
        a.photos = vec!["front.jpg".into(), "back.jpg".into()];
        a.season = Some(Season::Winter);
        a.price = Some(25.5);
        let b = article("a2", "Scarf", Status::Draft);
        store.insert_articles(&[a.clone(), b]).await.unwrap();
        store
            .insert_lots(&[lot("l1", "Pack", Status::Draft, &["a2", "a1"])])
            .await
            .unwrap();

        let articles = store.fetch_articles().await.unwrap();
        assert_eq!(articles.len(), 2);
        let fetched = articles.iter().find(|x| x.id == "a1").unwrap();
        assert_eq!(fetched, &a);

        let lots = store.fetch_lots().await.unwrap();
        assert_eq!(lots[0].article_ids, vec!["a2".to_string(), "a1".to_string()]);
    }

    #[tokio::test]
    async fn other_accounts_are_invisible() {
        let store = setup_store().await;
        store
            .insert_articles(&[article("a1", "Jacket", Status::Ready)])
            .await
            .unwrap();
        let other = SqliteStore::new(store.pool().clone(), "user-2");
        assert!(other.fetch_articles().await.unwrap().is_empty());
        let err = other
            .update_field(
                &ItemKey::new(ItemKind::Article, "a1"),
                &FieldEdit::Title("Hijacked".into()),
            )
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn update_field_maps_lot_title_to_name() {
        let store = setup_store().await;
        store
            .insert_lots(&[lot("l1", "Pack", Status::Draft, &[])])
            .await
            .unwrap();
        store
            .update_field(&ItemKey::new(ItemKind::Lot, "l1"), &FieldEdit::Title("Big pack".into()))
            .await
            .unwrap();
        assert_eq!(store.fetch_lots().await.unwrap()[0].name, "Big pack");

        let brand = store
            .update_field(&ItemKey::new(ItemKind::Lot, "l1"), &FieldEdit::Brand(Some("X".into())))
            .await;
        assert!(brand.is_err());
    }

    #[tokio::test]
    async fn unknown_status_is_coerced() {
        let store = setup_store().await;
        store
            .insert_articles(&[article("a1", "Jacket", Status::Ready)])
            .await
            .unwrap();
        sqlx::query("UPDATE articles SET status = 'PUBLISHED' WHERE id = 'a1'")
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.fetch_articles().await.unwrap()[0].status, Status::Published);

        sqlx::query("UPDATE articles SET status = 'archived' WHERE id = 'a1'")
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.fetch_articles().await.unwrap()[0].status, Status::Error);
    }

    #[tokio::test]
    async fn sale_and_cascade_are_persisted() {
        let store = setup_store().await;
        store
            .insert_articles(&[
                article("a1", "Jacket", Status::Published),
                article("a2", "Scarf", Status::Published),
            ])
            .await
            .unwrap();
        store
            .insert_lots(&[lot("l1", "Pack", Status::Published, &["a1", "a2"])])
            .await
            .unwrap();

        let sale = SaleOutcome {
            sold_price: 50.0,
            fees: 5.0,
            shipping_cost: 3.0,
            buyer_name: Some("Bob".into()),
            notes: None,
            sold_at: ts(9),
        };
        store
            .apply_transition(&ItemKey::new(ItemKind::Lot, "l1"), &Transition::Sold(sale))
            .await
            .unwrap();
        store
            .mark_sold_in_lot("l1", &["a1".into(), "a2".into()])
            .await
            .unwrap();

        let l = &store.fetch_lots().await.unwrap()[0];
        assert_eq!(l.status, Status::Sold);
        assert_eq!(l.net_profit, Some(42.0));
        assert_eq!(l.sold_at, Some(ts(9)));
        for a in store.fetch_articles().await.unwrap() {
            assert_eq!(a.status, Status::VenduEnLot);
            assert_eq!(a.sold_lot_id.as_deref(), Some("l1"));
        }
    }

    #[tokio::test]
    async fn only_one_default_seller() {
        let store = setup_store().await;
        let alice = store.insert_seller("Alice").await.unwrap();
        let bruno = store.insert_seller("Bruno").await.unwrap();
        store.set_default_seller(&alice.id).await.unwrap();
        store.set_default_seller(&bruno.id).await.unwrap();
        let sellers = store.fetch_sellers().await.unwrap();
        let defaults: Vec<&str> = sellers
            .iter()
            .filter(|s| s.is_default)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(defaults, vec!["Bruno"]);
        assert!(store.set_default_seller("missing").await.is_err());
    }

    #[tokio::test]
    async fn pending_cascade_queue() {
        let store = setup_store().await;
        store
            .insert_articles(&[article("a1", "Jacket", Status::Published)])
            .await
            .unwrap();
        store
            .insert_lots(&[lot("l1", "Pack", Status::Sold, &["a1"])])
            .await
            .unwrap();
        let id = store.enqueue_pending_cascade("l1").await.unwrap();

        let due = store.next_due_cascade().await.unwrap().unwrap();
        assert_eq!(due.id, id);
        assert_eq!(due.article_ids, vec!["a1".to_string()]);
        assert_eq!(due.attempt, 0);

        store.backoff_cascade(id, 0, 60).await.unwrap();
        assert!(store.next_due_cascade().await.unwrap().is_none());

        store.complete_cascade(id).await.unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_cascades")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
