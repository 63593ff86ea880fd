//! Write payloads and queue rows exchanged with the store.

use crate::model::{FieldEdit, Season, Status};

/// A change applied to every record of a bulk selection.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkPatch {
    Status(Status),
    Seller(Option<String>),
    Season(Option<Season>),
}

impl BulkPatch {
    pub fn as_edit(&self) -> FieldEdit {
        match self {
            BulkPatch::Status(s) => FieldEdit::Status(*s),
            BulkPatch::Seller(s) => FieldEdit::Seller(s.clone()),
            BulkPatch::Season(s) => FieldEdit::Season(*s),
        }
    }
}

/// A lot sale whose constituent articles still need `vendu_en_lot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCascade {
    pub id: i64,
    pub lot_id: String,
    pub article_ids: Vec<String>,
    pub attempt: i32,
}
