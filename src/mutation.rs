//! Local catalog state and the writes that change it.
//!
//! [`CatalogState::apply`] is the only place local items change. Inline edits
//! are optimistic: the reducer snapshots the field on `EditStart` and restores
//! it on `EditCancel` or `EditFail`. Bulk and lifecycle writes are applied only
//! once the store has confirmed them (`BulkCommit`).
//!
//! [`Coordinator`] drives the reducer around calls to a [`CatalogStore`].

use crate::model::{
    CatalogEntity, Field, FieldEdit, Item, ItemKey, ItemKind, RawRecord, SaleOutcome, Transition,
};
use crate::store::{BulkPatch, CatalogStore};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("invalid input: {0}")]
    Validation(&'static str),
    #[error("{0} not found")]
    NotFound(ItemKey),
    #[error("write failed: {0:#}")]
    Write(#[from] anyhow::Error),
    #[error("lot {lot_id} is sold but its articles were not updated: {source:#}")]
    Cascade {
        lot_id: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Short-lived, dismissable notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// A change the store has already confirmed.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Patched { keys: Vec<ItemKey>, patch: BulkPatch },
    Deleted { keys: Vec<ItemKey> },
    Inserted { items: Vec<Item> },
    Transitioned { key: ItemKey, transition: Transition },
    SoldInLot { lot_id: String, article_ids: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    EditStart { key: ItemKey, field: Field },
    EditInput { key: ItemKey, edit: FieldEdit },
    EditCancel { key: ItemKey, field: Field },
    EditCommit { key: ItemKey, field: Field },
    EditSaved { key: ItemKey, field: Field },
    EditFail { key: ItemKey, field: Field, message: String },
    BulkCommit(Change),
    BulkFail { message: String },
}

/// What the caller must do after an op.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    Persist { key: ItemKey, edit: FieldEdit },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Editing,
    Saving,
}

#[derive(Debug, Clone)]
struct EditSession {
    snapshot: FieldEdit,
    phase: EditPhase,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    items: Vec<Item>,
    edits: HashMap<(ItemKey, Field), EditSession>,
    notices: Vec<Notice>,
}

impl CatalogState {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Replace items after a fetch. Open edit sessions are discarded.
    pub fn replace_items(&mut self, items: Vec<Item>) {
        self.items = items;
        self.edits.clear();
    }

    pub fn get(&self, key: &ItemKey) -> Option<&Item> {
        self.items.iter().find(|i| i.kind == key.kind && i.id == key.id)
    }

    fn get_mut(&mut self, key: &ItemKey) -> Option<&mut Item> {
        self.items
            .iter_mut()
            .find(|i| i.kind == key.kind && i.id == key.id)
    }

    pub fn edit_phase(&self, key: &ItemKey, field: Field) -> Option<EditPhase> {
        self.edits.get(&(key.clone(), field)).map(|s| s.phase)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn dismiss(&mut self, index: usize) {
        if index < self.notices.len() {
            self.notices.remove(index);
        }
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn restore(&mut self, key: &ItemKey, field: Field) {
        if let Some(session) = self.edits.remove(&(key.clone(), field)) {
            if let Some(item) = self.get_mut(key) {
                item.apply_edit(&session.snapshot);
            }
        }
    }

    pub fn apply(&mut self, op: Op) -> Effect {
        match op {
            Op::EditStart { key, field } => {
                let Some(item) = self.get(&key) else {
                    return Effect::None;
                };
                let snapshot = item.value_of(field);
                self.edits.entry((key, field)).or_insert(EditSession {
                    snapshot,
                    phase: EditPhase::Editing,
                });
                Effect::None
            }
            Op::EditInput { key, edit } => {
                let field = edit.field();
                let Some(item) = self.get(&key) else {
                    return Effect::None;
                };
                let snapshot = item.value_of(field);
                self.edits
                    .entry((key.clone(), field))
                    .or_insert(EditSession {
                        snapshot,
                        phase: EditPhase::Editing,
                    });
                if let Some(item) = self.get_mut(&key) {
                    item.apply_edit(&edit);
                }
                Effect::None
            }
            Op::EditCancel { key, field } => {
                self.restore(&key, field);
                Effect::None
            }
            Op::EditCommit { key, field } => {
                let Some(current) = self.get(&key).map(|i| i.value_of(field)) else {
                    self.edits.remove(&(key, field));
                    return Effect::None;
                };
                let Some(session) = self.edits.get_mut(&(key.clone(), field)) else {
                    return Effect::None;
                };
                if session.snapshot == current {
                    self.edits.remove(&(key, field));
                    return Effect::None;
                }
                session.phase = EditPhase::Saving;
                Effect::Persist { key, edit: current }
            }
            Op::EditSaved { key, field } => {
                self.edits.remove(&(key, field));
                Effect::None
            }
            Op::EditFail {
                key,
                field,
                message,
            } => {
                self.restore(&key, field);
                self.notices.push(Notice::error(message));
                Effect::None
            }
            Op::BulkCommit(change) => {
                self.apply_change(change);
                Effect::None
            }
            Op::BulkFail { message } => {
                self.notices.push(Notice::error(message));
                Effect::None
            }
        }
    }

    fn apply_change(&mut self, change: Change) {
        match change {
            Change::Patched { keys, patch } => {
                let edit = patch.as_edit();
                for key in &keys {
                    if let Some(item) = self.get_mut(key) {
                        item.apply_edit(&edit);
                    }
                }
            }
            Change::Deleted { keys } => {
                let gone: HashSet<ItemKey> = keys.into_iter().collect();
                self.items.retain(|i| !gone.contains(&i.key()));
                let gone_articles: HashSet<&str> = gone
                    .iter()
                    .filter(|k| k.kind == ItemKind::Article)
                    .map(|k| k.id.as_str())
                    .collect();
                if !gone_articles.is_empty() {
                    for item in self.items.iter_mut().filter(|i| i.kind == ItemKind::Lot) {
                        item.drop_articles(&gone_articles);
                    }
                }
                self.edits.retain(|(key, _), _| !gone.contains(key));
            }
            Change::Inserted { items } => {
                // newest first
                self.items.splice(0..0, items);
            }
            Change::Transitioned { key, transition } => {
                if let Some(item) = self.get_mut(&key) {
                    item.apply_transition(&transition);
                }
            }
            Change::SoldInLot {
                lot_id,
                article_ids,
            } => {
                for id in &article_ids {
                    if let Some(item) = self.get_mut(&ItemKey::new(ItemKind::Article, id.clone())) {
                        item.mark_sold_in_lot(&lot_id);
                    }
                }
            }
        }
    }
}

/// Operations over a user selection.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    Patch(BulkPatch),
    Delete,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Unchanged,
    Saved,
}

/// Selection order kept, repeats dropped.
fn unique_keys(selection: &[ItemKey]) -> Vec<ItemKey> {
    let mut seen = HashSet::new();
    selection
        .iter()
        .filter(|key| seen.insert(*key))
        .cloned()
        .collect()
}

/// Keys split by backing collection, preserving selection order.
#[derive(Debug, Default)]
struct Partition {
    articles: Vec<String>,
    lots: Vec<String>,
}

impl Partition {
    fn of(keys: &[ItemKey]) -> Self {
        let mut seen = HashSet::new();
        let mut p = Partition::default();
        for key in keys {
            if !seen.insert(key) {
                continue;
            }
            match key.kind {
                ItemKind::Article => p.articles.push(key.id.clone()),
                ItemKind::Lot => p.lots.push(key.id.clone()),
            }
        }
        p
    }
}

fn validate_edit(edit: &FieldEdit) -> Result<(), MutationError> {
    match edit {
        FieldEdit::Title(t) if t.trim().is_empty() => {
            Err(MutationError::Validation("title must be non-empty"))
        }
        FieldEdit::Price(Some(p)) if !p.is_finite() || *p < 0.0 => {
            Err(MutationError::Validation("price must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

fn validate_sale(sale: &SaleOutcome) -> Result<(), MutationError> {
    let amounts = [sale.sold_price, sale.fees, sale.shipping_cost];
    if amounts.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(MutationError::Validation("sale amounts must be non-negative numbers"));
    }
    Ok(())
}

/// Applies user edits locally and persists them through the store.
pub struct Coordinator {
    store: Arc<dyn CatalogStore>,
    state: CatalogState,
}

impl Coordinator {
    pub fn new(store: Arc<dyn CatalogStore>, state: CatalogState) -> Self {
        Self { store, state }
    }

    pub fn state(&self) -> &CatalogState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CatalogState {
        &mut self.state
    }

    fn require(&self, key: &ItemKey) -> Result<&Item, MutationError> {
        self.state
            .get(key)
            .ok_or_else(|| MutationError::NotFound(key.clone()))
    }

    pub fn begin_edit(&mut self, key: &ItemKey, field: Field) -> Result<(), MutationError> {
        self.require(key)?;
        if !field.supported_by(key.kind) {
            return Err(MutationError::Validation("field is not available for this kind"));
        }
        self.state.apply(Op::EditStart {
            key: key.clone(),
            field,
        });
        Ok(())
    }

    /// Keystroke: update local state immediately.
    pub fn input(&mut self, key: &ItemKey, edit: FieldEdit) -> Result<(), MutationError> {
        self.require(key)?;
        if !edit.field().supported_by(key.kind) {
            return Err(MutationError::Validation("field is not available for this kind"));
        }
        self.state.apply(Op::EditInput {
            key: key.clone(),
            edit,
        });
        Ok(())
    }

    /// Escape: restore the snapshot, never persist.
    pub fn cancel_edit(&mut self, key: &ItemKey, field: Field) {
        self.state.apply(Op::EditCancel {
            key: key.clone(),
            field,
        });
    }

    /// Blur or Enter: persist the field if it changed since `begin_edit`.
    #[instrument(skip_all, fields(key = %key, field = ?field))]
    pub async fn commit_edit(
        &mut self,
        key: &ItemKey,
        field: Field,
    ) -> Result<CommitOutcome, MutationError> {
        let current = self.require(key)?.value_of(field);
        if let Err(err) = validate_edit(&current) {
            self.state.apply(Op::EditFail {
                key: key.clone(),
                field,
                message: err.to_string(),
            });
            return Err(err);
        }

        let Effect::Persist { key, edit } = self.state.apply(Op::EditCommit {
            key: key.clone(),
            field,
        }) else {
            return Ok(CommitOutcome::Unchanged);
        };

        match self.store.update_field(&key, &edit).await {
            Ok(()) => {
                self.state.apply(Op::EditSaved { key, field });
                Ok(CommitOutcome::Saved)
            }
            Err(err) => {
                warn!(?err, %key, ?field, "inline edit failed; rolling back");
                self.state.apply(Op::EditFail {
                    key,
                    field,
                    message: format!("Échec de la mise à jour : {err}"),
                });
                Err(MutationError::Write(err))
            }
        }
    }

    /// Start, type and commit in one step.
    pub async fn edit(
        &mut self,
        key: &ItemKey,
        edit: FieldEdit,
    ) -> Result<CommitOutcome, MutationError> {
        let field = edit.field();
        self.begin_edit(key, field)?;
        self.input(key, edit)?;
        self.commit_edit(key, field).await
    }

    /// Run one action over the selection: one write per kind, issued together.
    /// Local state changes only if every write succeeded.
    #[instrument(skip_all, fields(count = selection.len()))]
    pub async fn bulk(
        &mut self,
        selection: &[ItemKey],
        action: BulkAction,
    ) -> Result<usize, MutationError> {
        let keys = unique_keys(selection);
        if keys.is_empty() {
            return Err(MutationError::Validation("nothing selected"));
        }
        for key in &keys {
            self.require(key)?;
        }
        let partition = Partition::of(&keys);
        let keys = keys.as_slice();
        let store = self.store.as_ref();

        let result = match &action {
            BulkAction::Patch(patch) => {
                let (a, l) = futures::future::join(
                    store.update_many(ItemKind::Article, &partition.articles, patch),
                    store.update_many(ItemKind::Lot, &partition.lots, patch),
                )
                .await;
                a.and(l).map(|()| Change::Patched {
                    keys: keys.to_vec(),
                    patch: patch.clone(),
                })
            }
            BulkAction::Delete => {
                let (a, l) = futures::future::join(
                    store.delete_many(ItemKind::Article, &partition.articles),
                    store.delete_many(ItemKind::Lot, &partition.lots),
                )
                .await;
                a.and(l).map(|()| Change::Deleted {
                    keys: keys.to_vec(),
                })
            }
            BulkAction::Duplicate => {
                let now = Utc::now();
                let mut articles = Vec::new();
                let mut lots = Vec::new();
                for key in keys {
                    match &self.require(key)?.raw {
                        RawRecord::Article(a) => {
                            articles.push(a.duplicate(uuid::Uuid::new_v4().to_string(), now))
                        }
                        RawRecord::Lot(l) => {
                            lots.push(l.duplicate(uuid::Uuid::new_v4().to_string(), now))
                        }
                    }
                }
                let (a, l) = futures::future::join(
                    async {
                        if articles.is_empty() {
                            Ok(Vec::new())
                        } else {
                            store.insert_articles(&articles).await
                        }
                    },
                    async {
                        if lots.is_empty() {
                            Ok(Vec::new())
                        } else {
                            store.insert_lots(&lots).await
                        }
                    },
                )
                .await;
                match (a, l) {
                    (Ok(a), Ok(l)) => Ok(Change::Inserted {
                        items: a
                            .iter()
                            .map(CatalogEntity::to_item)
                            .chain(l.iter().map(CatalogEntity::to_item))
                            .collect(),
                    }),
                    (Err(err), _) | (_, Err(err)) => Err(err),
                }
            }
        };

        match result {
            Ok(change) => {
                let count = keys.len();
                info!(count, ?action, "bulk action applied");
                self.state.apply(Op::BulkCommit(change));
                Ok(count)
            }
            Err(err) => {
                warn!(?err, ?action, "bulk action failed; local state untouched");
                self.state.apply(Op::BulkFail {
                    message: format!("Échec de l'action groupée : {err}"),
                });
                Err(MutationError::Write(err))
            }
        }
    }

    /// Publish, schedule or revert one item; local state follows the store.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn transition(
        &mut self,
        key: &ItemKey,
        transition: Transition,
    ) -> Result<(), MutationError> {
        self.require(key)?;
        if let Transition::Sold(sale) = &transition {
            validate_sale(sale)?;
        }
        if let Err(err) = self.store.apply_transition(key, &transition).await {
            warn!(?err, "status change failed");
            self.state.apply(Op::BulkFail {
                message: format!("Échec du changement de statut : {err}"),
            });
            return Err(MutationError::Write(err));
        }
        self.state.apply(Op::BulkCommit(Change::Transitioned {
            key: key.clone(),
            transition,
        }));
        Ok(())
    }

    /// Record a sale. For a lot, a second write flags its articles as
    /// `vendu_en_lot`; if that write fails the lot stays sold and a pending
    /// cascade is queued for retry.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn mark_sold(
        &mut self,
        key: &ItemKey,
        sale: SaleOutcome,
    ) -> Result<(), MutationError> {
        let article_ids = self.require(key)?.article_ids.clone();
        self.transition(key, Transition::Sold(sale)).await?;
        if key.kind != ItemKind::Lot {
            return Ok(());
        }

        match self.store.mark_sold_in_lot(&key.id, &article_ids).await {
            Ok(()) => {
                self.state.apply(Op::BulkCommit(Change::SoldInLot {
                    lot_id: key.id.clone(),
                    article_ids,
                }));
                Ok(())
            }
            Err(err) => {
                warn!(?err, lot_id = %key.id, "lot sold but cascade to articles failed");
                if let Err(queue_err) = self.store.enqueue_pending_cascade(&key.id).await {
                    warn!(?queue_err, lot_id = %key.id, "could not queue pending cascade");
                }
                self.state.apply(Op::BulkFail {
                    message: format!(
                        "Lot vendu, mais les articles n'ont pas été mis à jour : {err}"
                    ),
                });
                Err(MutationError::Cascade {
                    lot_id: key.id.clone(),
                    source: err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{article, lot};
    use crate::model::{CatalogEntity, Status};

    fn state() -> CatalogState {
        let mut a = article("a1", "Jacket", Status::Draft);
        a.price = Some(20.0);
        CatalogState::new(vec![
            a.to_item(),
            article("a2", "Scarf", Status::Ready).to_item(),
            lot("l1", "Pack", Status::Draft, &["a1", "a2"]).to_item(),
        ])
    }

    fn key(kind: ItemKind, id: &str) -> ItemKey {
        ItemKey::new(kind, id)
    }

    #[test]
    fn unchanged_commit_is_discarded() {
        let mut s = state();
        let k = key(ItemKind::Article, "a1");
        s.apply(Op::EditStart { key: k.clone(), field: Field::Title });
        s.apply(Op::EditInput { key: k.clone(), edit: FieldEdit::Title("Coat".into()) });
        s.apply(Op::EditInput { key: k.clone(), edit: FieldEdit::Title("Jacket".into()) });
        let effect = s.apply(Op::EditCommit { key: k.clone(), field: Field::Title });
        assert_eq!(effect, Effect::None);
        assert_eq!(s.edit_phase(&k, Field::Title), None);
    }

    #[test]
    fn changed_commit_asks_for_persist_then_rolls_back_on_failure() {
        let mut s = state();
        let k = key(ItemKind::Article, "a1");
        s.apply(Op::EditStart { key: k.clone(), field: Field::Price });
        s.apply(Op::EditInput { key: k.clone(), edit: FieldEdit::Price(Some(35.0)) });
        assert_eq!(s.get(&k).unwrap().price, Some(35.0));

        let effect = s.apply(Op::EditCommit { key: k.clone(), field: Field::Price });
        assert_eq!(
            effect,
            Effect::Persist { key: k.clone(), edit: FieldEdit::Price(Some(35.0)) }
        );
        assert_eq!(s.edit_phase(&k, Field::Price), Some(EditPhase::Saving));

        s.apply(Op::EditFail { key: k.clone(), field: Field::Price, message: "boom".into() });
        assert_eq!(s.get(&k).unwrap().price, Some(20.0));
        assert_eq!(s.notices().len(), 1);
        assert_eq!(s.notices()[0].level, NoticeLevel::Error);
    }

    #[test]
    fn cancel_always_restores() {
        let mut s = state();
        let k = key(ItemKind::Lot, "l1");
        s.apply(Op::EditStart { key: k.clone(), field: Field::Title });
        s.apply(Op::EditInput { key: k.clone(), edit: FieldEdit::Title("Other".into()) });
        s.apply(Op::EditCancel { key: k.clone(), field: Field::Title });
        assert_eq!(s.get(&k).unwrap().title, "Pack");
        assert!(s.notices().is_empty());
    }

    #[test]
    fn bulk_fail_touches_nothing() {
        let mut s = state();
        let before = s.items().to_vec();
        s.apply(Op::BulkFail { message: "nope".into() });
        assert_eq!(s.items(), before.as_slice());
        assert_eq!(s.notices().len(), 1);
    }

    #[test]
    fn confirmed_changes_are_applied() {
        let mut s = state();
        s.apply(Op::BulkCommit(Change::Patched {
            keys: vec![key(ItemKind::Article, "a1"), key(ItemKind::Lot, "l1")],
            patch: BulkPatch::Status(Status::Ready),
        }));
        assert_eq!(s.get(&key(ItemKind::Article, "a1")).unwrap().status, Status::Ready);
        assert_eq!(s.get(&key(ItemKind::Lot, "l1")).unwrap().status, Status::Ready);

        s.apply(Op::BulkCommit(Change::SoldInLot {
            lot_id: "l1".into(),
            article_ids: vec!["a1".into(), "a2".into()],
        }));
        let a2 = s.get(&key(ItemKind::Article, "a2")).unwrap();
        assert_eq!(a2.status, Status::VenduEnLot);
        assert!(matches!(&a2.raw, RawRecord::Article(a) if a.sold_lot_id.as_deref() == Some("l1")));

        s.apply(Op::BulkCommit(Change::Deleted { keys: vec![key(ItemKind::Article, "a2")] }));
        assert!(s.get(&key(ItemKind::Article, "a2")).is_none());
        assert_eq!(s.items().len(), 2);
    }

    #[test]
    fn partition_dedupes_and_splits_by_kind() {
        let keys = vec![
            key(ItemKind::Article, "1"),
            key(ItemKind::Lot, "1"),
            key(ItemKind::Article, "1"),
            key(ItemKind::Article, "2"),
        ];
        let p = Partition::of(&keys);
        assert_eq!(p.articles, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(p.lots, vec!["1".to_string()]);
    }

    #[test]
    fn edit_validation() {
        assert!(validate_edit(&FieldEdit::Title("  ".into())).is_err());
        assert!(validate_edit(&FieldEdit::Price(Some(-1.0))).is_err());
        assert!(validate_edit(&FieldEdit::Price(None)).is_ok());
    }
}
