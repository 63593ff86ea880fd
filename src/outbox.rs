use crate::store::CatalogStore;
use anyhow::Result;
use tracing::{info, instrument, warn};

/// Retry one due lot cascade. Returns `false` when nothing was due.
#[instrument(skip_all)]
pub async fn process_next_cascade(store: &dyn CatalogStore, max_backoff_secs: i64) -> Result<bool> {
    let Some(task) = store.next_due_cascade().await? else {
        return Ok(false);
    };
    match store.mark_sold_in_lot(&task.lot_id, &task.article_ids).await {
        Ok(()) => {
            store.complete_cascade(task.id).await?;
            info!(
                id = task.id,
                lot_id = %task.lot_id,
                articles = task.article_ids.len(),
                "pending cascade applied"
            );
        }
        Err(err) => {
            warn!(
                ?err,
                id = task.id,
                lot_id = %task.lot_id,
                attempt = task.attempt,
                "pending cascade failed; backoff"
            );
            store
                .backoff_cascade(task.id, task.attempt, max_backoff_secs)
                .await?;
        }
    }
    Ok(true)
}
