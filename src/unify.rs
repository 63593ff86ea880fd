//! Merge articles and lots into a single kind-tagged item list.

use crate::model::{Article, CatalogEntity, Item, ItemKey, Lot};
use std::collections::HashSet;

/// Unify both collections. Articles come first, then lots, each in input order.
/// Duplicates are detected on `(kind, id)`; the first occurrence wins.
pub fn unify(articles: &[Article], lots: &[Lot]) -> Vec<Item> {
    let mut seen: HashSet<ItemKey> = HashSet::with_capacity(articles.len() + lots.len());
    let mut items = Vec::with_capacity(articles.len() + lots.len());
    push_unique(&mut items, &mut seen, articles);
    push_unique(&mut items, &mut seen, lots);
    items
}

fn push_unique<E: CatalogEntity>(
    items: &mut Vec<Item>,
    seen: &mut HashSet<ItemKey>,
    records: &[E],
) {
    for record in records {
        if seen.insert(ItemKey::new(E::KIND, record.id())) {
            items.push(record.to_item());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{article, lot};
    use crate::model::{ItemKind, RawRecord, Status};

    #[test]
    fn tags_kinds_and_keeps_raw() {
        let articles = vec![article("1", "Shirt", Status::Draft)];
        let lots = vec![lot("9", "Summer pack", Status::Ready, &["1"])];
        let items = unify(&articles, &lots);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, ItemKind::Article);
        assert_eq!(items[0].title, "Shirt");
        assert_eq!(items[1].kind, ItemKind::Lot);
        assert_eq!(items[1].title, "Summer pack");
        assert_eq!(items[1].article_count, Some(1));
        assert!(matches!(&items[1].raw, RawRecord::Lot(l) if l.name == "Summer pack"));
    }

    #[test]
    fn same_id_across_kinds_is_kept() {
        let articles = vec![article("7", "Shirt", Status::Draft)];
        let lots = vec![lot("7", "Pack", Status::Draft, &[])];
        let items = unify(&articles, &lots);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn duplicate_within_kind_is_dropped() {
        let articles = vec![
            article("7", "Shirt", Status::Draft),
            article("7", "Shirt again", Status::Ready),
        ];
        let items = unify(&articles, &[]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Shirt");
    }

    #[test]
    fn unify_is_idempotent() {
        let articles = vec![
            article("1", "Shirt", Status::Draft),
            article("2", "Coat", Status::Sold),
        ];
        let lots = vec![lot("1", "Pack", Status::Published, &["1", "2"])];
        let first = serde_json::to_string(&unify(&articles, &lots)).unwrap();
        let second = serde_json::to_string(&unify(&articles, &lots)).unwrap();
        assert_eq!(first, second);
    }
}
