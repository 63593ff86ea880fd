//! Typed catalog records.
//!
//! Raw rows are parsed into these types at the storage boundary; nothing past
//! `store` handles untyped payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Suffix appended to the title of a duplicated record.
pub const COPY_SUFFIX: &str = " (Copie)";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown {what}: {value}")]
    Unknown { what: &'static str, value: String },
    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
}

impl ParseError {
    pub(crate) fn unknown(what: &'static str, value: &str) -> Self {
        ParseError::Unknown {
            what,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Article,
    Lot,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Article => "article",
            ItemKind::Lot => "lot",
        }
    }

    /// Backing collection for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            ItemKind::Article => "articles",
            ItemKind::Lot => "lots",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Article => "Article",
            ItemKind::Lot => "Lot",
        }
    }
}

impl FromStr for ItemKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "article" | "articles" => Ok(ItemKind::Article),
            "lot" | "lots" => Ok(ItemKind::Lot),
            _ => Err(ParseError::unknown("item kind", s)),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Ready,
    Scheduled,
    VintedDraft,
    Published,
    Sold,
    VenduEnLot,
    Processing,
    Error,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::Draft,
        Status::Ready,
        Status::Scheduled,
        Status::VintedDraft,
        Status::Published,
        Status::Sold,
        Status::VenduEnLot,
        Status::Processing,
        Status::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Ready => "ready",
            Status::Scheduled => "scheduled",
            Status::VintedDraft => "vinted_draft",
            Status::Published => "published",
            Status::Sold => "sold",
            Status::VenduEnLot => "vendu_en_lot",
            Status::Processing => "processing",
            Status::Error => "error",
        }
    }

    /// Case-insensitive exact match against the stored status names.
    pub fn parse_status(s: &str) -> Option<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        Status::ALL.into_iter().find(|st| st.as_str() == lowered)
    }

    /// `sold` or `vendu_en_lot`: the states in which `sold_at` must be set.
    pub fn is_sold_state(&self) -> bool {
        matches!(self, Status::Sold | Status::VenduEnLot)
    }

    /// Visible to buyers or further along; denominator of conversion rate.
    pub fn is_published_like(&self) -> bool {
        matches!(
            self,
            Status::Published | Status::Scheduled | Status::Sold | Status::VenduEnLot
        )
    }
}

impl FromStr for Status {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::parse_status(s).ok_or_else(|| ParseError::unknown("status", s))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
    AllSeasons,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
            Season::AllSeasons => "all_seasons",
        }
    }
}

impl FromStr for Season {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "autumn" | "fall" => Ok(Season::Autumn),
            "winter" => Ok(Season::Winter),
            "all_seasons" | "all" => Ok(Season::AllSeasons),
            _ => Err(ParseError::unknown("season", s)),
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A household member selling through the account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seller {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub status: Status,
    pub season: Option<Season>,
    pub reference_number: Option<String>,
    pub photos: Vec<String>,
    pub seller_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub vinted_url: Option<String>,
    pub sold_at: Option<DateTime<Utc>>,
    pub sold_price: Option<f64>,
    pub fees: Option<f64>,
    pub shipping_cost: Option<f64>,
    pub net_profit: Option<f64>,
    pub buyer_name: Option<String>,
    pub sale_notes: Option<String>,
    /// Lot this article was sold in, when sold as part of a bundle.
    pub sold_lot_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub status: Status,
    pub season: Option<Season>,
    pub reference_number: Option<String>,
    pub photos: Vec<String>,
    pub seller_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub vinted_url: Option<String>,
    pub sold_at: Option<DateTime<Utc>>,
    pub sold_price: Option<f64>,
    pub fees: Option<f64>,
    pub shipping_cost: Option<f64>,
    pub net_profit: Option<f64>,
    pub buyer_name: Option<String>,
    pub sale_notes: Option<String>,
    /// Constituent articles, shared by reference.
    pub article_ids: Vec<String>,
}

/// Columns editable inline or in bulk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Description,
    Brand,
    Price,
    Status,
    Seller,
    Season,
    ReferenceNumber,
}

impl Field {
    pub fn supported_by(&self, kind: ItemKind) -> bool {
        !matches!((self, kind), (Field::Brand, ItemKind::Lot))
    }

    /// Parse a user-entered value for this field. Empty input clears optional fields.
    pub fn parse_value(&self, raw: &str) -> Result<FieldEdit, ParseError> {
        let trimmed = raw.trim();
        let opt = || (!trimmed.is_empty()).then(|| trimmed.to_string());
        Ok(match self {
            Field::Title => FieldEdit::Title(trimmed.to_string()),
            Field::Description => FieldEdit::Description(opt()),
            Field::Brand => FieldEdit::Brand(opt()),
            Field::ReferenceNumber => FieldEdit::ReferenceNumber(opt()),
            Field::Seller => FieldEdit::Seller(opt()),
            Field::Price => {
                if trimmed.is_empty() {
                    FieldEdit::Price(None)
                } else {
                    let value = trimmed
                        .replace(',', ".")
                        .parse::<f64>()
                        .map_err(|_| ParseError::Invalid {
                            what: "price",
                            value: raw.to_string(),
                        })?;
                    FieldEdit::Price(Some(value))
                }
            }
            Field::Status => FieldEdit::Status(trimmed.parse()?),
            Field::Season => {
                if trimmed.is_empty() {
                    FieldEdit::Season(None)
                } else {
                    FieldEdit::Season(Some(trimmed.parse()?))
                }
            }
        })
    }
}

impl FromStr for Field {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "title" | "name" => Ok(Field::Title),
            "description" => Ok(Field::Description),
            "brand" => Ok(Field::Brand),
            "price" => Ok(Field::Price),
            "status" => Ok(Field::Status),
            "seller" | "seller_id" => Ok(Field::Seller),
            "season" => Ok(Field::Season),
            "reference_number" | "reference" => Ok(Field::ReferenceNumber),
            _ => Err(ParseError::unknown("field", s)),
        }
    }
}

/// A new value for one field of one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FieldEdit {
    Title(String),
    Description(Option<String>),
    Brand(Option<String>),
    Price(Option<f64>),
    Status(Status),
    Seller(Option<String>),
    Season(Option<Season>),
    ReferenceNumber(Option<String>),
}

impl FieldEdit {
    pub fn field(&self) -> Field {
        match self {
            FieldEdit::Title(_) => Field::Title,
            FieldEdit::Description(_) => Field::Description,
            FieldEdit::Brand(_) => Field::Brand,
            FieldEdit::Price(_) => Field::Price,
            FieldEdit::Status(_) => Field::Status,
            FieldEdit::Seller(_) => Field::Seller,
            FieldEdit::Season(_) => Field::Season,
            FieldEdit::ReferenceNumber(_) => Field::ReferenceNumber,
        }
    }
}

/// Sale details captured when an item is marked sold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleOutcome {
    pub sold_price: f64,
    pub fees: f64,
    pub shipping_cost: f64,
    pub buyer_name: Option<String>,
    pub notes: Option<String>,
    pub sold_at: DateTime<Utc>,
}

impl SaleOutcome {
    pub fn net_profit(&self) -> f64 {
        self.sold_price - self.fees - self.shipping_cost
    }
}

/// Lifecycle step applied to a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Publish { at: DateTime<Utc> },
    Schedule { at: DateTime<Utc> },
    RevertToDraft,
    Sold(SaleOutcome),
}

/// Per-kind capabilities used by the unifier and the mutation reducer.
pub trait CatalogEntity: Clone + Send + Sync {
    const KIND: ItemKind;

    fn id(&self) -> &str;

    fn to_item(&self) -> Item;

    fn apply_edit(&mut self, edit: &FieldEdit);

    fn apply_transition(&mut self, transition: &Transition);

    /// Copy without identity, audit timestamps or sale outcome.
    fn duplicate(&self, new_id: String, now: DateTime<Utc>) -> Self;
}

macro_rules! apply_common_transition {
    ($rec:expr, $transition:expr) => {
        match $transition {
            Transition::Publish { at } => {
                $rec.status = Status::Published;
                $rec.published_at = Some(*at);
                $rec.scheduled_for = None;
            }
            Transition::Schedule { at } => {
                $rec.status = Status::Scheduled;
                $rec.scheduled_for = Some(*at);
            }
            Transition::RevertToDraft => {
                $rec.status = Status::Draft;
                $rec.scheduled_for = None;
                $rec.sold_at = None;
                $rec.sold_price = None;
                $rec.fees = None;
                $rec.shipping_cost = None;
                $rec.net_profit = None;
                $rec.buyer_name = None;
                $rec.sale_notes = None;
            }
            Transition::Sold(sale) => {
                $rec.status = Status::Sold;
                $rec.sold_at = Some(sale.sold_at);
                $rec.sold_price = Some(sale.sold_price);
                $rec.fees = Some(sale.fees);
                $rec.shipping_cost = Some(sale.shipping_cost);
                $rec.net_profit = Some(sale.net_profit());
                $rec.buyer_name = sale.buyer_name.clone();
                $rec.sale_notes = sale.notes.clone();
            }
        }
    };
}

impl CatalogEntity for Article {
    const KIND: ItemKind = ItemKind::Article;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_item(&self) -> Item {
        Item {
            kind: ItemKind::Article,
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            brand: self.brand.clone(),
            reference_number: self.reference_number.clone(),
            price: self.price,
            status: self.status,
            season: self.season,
            seller_id: self.seller_id.clone(),
            photos: self.photos.clone(),
            created_at: self.created_at,
            published_at: self.published_at,
            scheduled_for: self.scheduled_for,
            sold_at: self.sold_at,
            sold_price: self.sold_price,
            fees: self.fees,
            shipping_cost: self.shipping_cost,
            net_profit: self.net_profit,
            article_count: None,
            article_ids: Vec::new(),
            raw: RawRecord::Article(self.clone()),
        }
    }

    fn apply_edit(&mut self, edit: &FieldEdit) {
        match edit {
            FieldEdit::Title(v) => self.title = v.clone(),
            FieldEdit::Description(v) => self.description = v.clone(),
            FieldEdit::Brand(v) => self.brand = v.clone(),
            FieldEdit::Price(v) => self.price = *v,
            FieldEdit::Status(v) => self.status = *v,
            FieldEdit::Seller(v) => self.seller_id = v.clone(),
            FieldEdit::Season(v) => self.season = *v,
            FieldEdit::ReferenceNumber(v) => self.reference_number = v.clone(),
        }
    }

    fn apply_transition(&mut self, transition: &Transition) {
        apply_common_transition!(self, transition);
        if matches!(transition, Transition::RevertToDraft) {
            self.sold_lot_id = None;
        }
    }

    fn duplicate(&self, new_id: String, now: DateTime<Utc>) -> Self {
        Article {
            id: new_id,
            title: format!("{}{}", self.title, COPY_SUFFIX),
            status: Status::Draft,
            created_at: now,
            scheduled_for: None,
            published_at: None,
            vinted_url: None,
            sold_at: None,
            sold_price: None,
            fees: None,
            shipping_cost: None,
            net_profit: None,
            buyer_name: None,
            sale_notes: None,
            reference_number: None,
            sold_lot_id: None,
            ..self.clone()
        }
    }
}

impl Article {
    /// Constituent of a lot that was just sold.
    pub fn mark_sold_in_lot(&mut self, lot_id: &str) {
        self.status = Status::VenduEnLot;
        self.sold_lot_id = Some(lot_id.to_string());
    }
}

impl CatalogEntity for Lot {
    const KIND: ItemKind = ItemKind::Lot;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_item(&self) -> Item {
        Item {
            kind: ItemKind::Lot,
            id: self.id.clone(),
            title: self.name.clone(),
            description: self.description.clone(),
            brand: None,
            reference_number: self.reference_number.clone(),
            price: self.price,
            status: self.status,
            season: self.season,
            seller_id: self.seller_id.clone(),
            photos: self.photos.clone(),
            created_at: self.created_at,
            published_at: self.published_at,
            scheduled_for: self.scheduled_for,
            sold_at: self.sold_at,
            sold_price: self.sold_price,
            fees: self.fees,
            shipping_cost: self.shipping_cost,
            net_profit: self.net_profit,
            article_count: Some(self.article_ids.len()),
            article_ids: self.article_ids.clone(),
            raw: RawRecord::Lot(self.clone()),
        }
    }

    fn apply_edit(&mut self, edit: &FieldEdit) {
        match edit {
            FieldEdit::Title(v) => self.name = v.clone(),
            FieldEdit::Description(v) => self.description = v.clone(),
            // lots carry no brand
            FieldEdit::Brand(_) => {}
            FieldEdit::Price(v) => self.price = *v,
            FieldEdit::Status(v) => self.status = *v,
            FieldEdit::Seller(v) => self.seller_id = v.clone(),
            FieldEdit::Season(v) => self.season = *v,
            FieldEdit::ReferenceNumber(v) => self.reference_number = v.clone(),
        }
    }

    fn apply_transition(&mut self, transition: &Transition) {
        apply_common_transition!(self, transition);
    }

    fn duplicate(&self, new_id: String, now: DateTime<Utc>) -> Self {
        Lot {
            id: new_id,
            name: format!("{}{}", self.name, COPY_SUFFIX),
            status: Status::Draft,
            created_at: now,
            scheduled_for: None,
            published_at: None,
            vinted_url: None,
            sold_at: None,
            sold_price: None,
            fees: None,
            shipping_cost: None,
            net_profit: None,
            buyer_name: None,
            sale_notes: None,
            reference_number: None,
            ..self.clone()
        }
    }
}

/// Source record kept alongside the unified view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawRecord {
    Article(Article),
    Lot(Lot),
}

impl RawRecord {
    pub fn to_item(&self) -> Item {
        match self {
            RawRecord::Article(a) => a.to_item(),
            RawRecord::Lot(l) => l.to_item(),
        }
    }

    pub fn apply_edit(&mut self, edit: &FieldEdit) {
        match self {
            RawRecord::Article(a) => a.apply_edit(edit),
            RawRecord::Lot(l) => l.apply_edit(edit),
        }
    }

    pub fn apply_transition(&mut self, transition: &Transition) {
        match self {
            RawRecord::Article(a) => a.apply_transition(transition),
            RawRecord::Lot(l) => l.apply_transition(transition),
        }
    }
}

/// Identity of a unified item. Ids are only unique within a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemKey {
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for ItemKey {
    type Err = ParseError;

    /// `article:<id>` or `lot:<id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| ParseError::Invalid {
            what: "item key",
            value: s.to_string(),
        })?;
        let id = id.trim();
        if id.is_empty() {
            return Err(ParseError::Invalid {
                what: "item key",
                value: s.to_string(),
            });
        }
        Ok(ItemKey::new(kind.parse()?, id))
    }
}

/// Normalized view of an article or a lot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub reference_number: Option<String>,
    pub price: Option<f64>,
    pub status: Status,
    pub season: Option<Season>,
    pub seller_id: Option<String>,
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sold_at: Option<DateTime<Utc>>,
    pub sold_price: Option<f64>,
    pub fees: Option<f64>,
    pub shipping_cost: Option<f64>,
    pub net_profit: Option<f64>,
    pub article_count: Option<usize>,
    pub article_ids: Vec<String>,
    pub raw: RawRecord,
}

impl Item {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.kind, self.id.clone())
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.photos.first().map(String::as_str)
    }

    pub fn is_sold(&self) -> bool {
        self.status.is_sold_state()
    }

    /// Persisted net profit, only when the item is in a sold state.
    pub fn realized_profit(&self) -> Option<f64> {
        if self.is_sold() {
            self.net_profit
        } else {
            None
        }
    }

    /// Current value of `field`, in the shape an edit of that field would take.
    pub fn value_of(&self, field: Field) -> FieldEdit {
        match field {
            Field::Title => FieldEdit::Title(self.title.clone()),
            Field::Description => FieldEdit::Description(self.description.clone()),
            Field::Brand => FieldEdit::Brand(self.brand.clone()),
            Field::Price => FieldEdit::Price(self.price),
            Field::Status => FieldEdit::Status(self.status),
            Field::Seller => FieldEdit::Seller(self.seller_id.clone()),
            Field::Season => FieldEdit::Season(self.season),
            Field::ReferenceNumber => FieldEdit::ReferenceNumber(self.reference_number.clone()),
        }
    }

    /// Apply an edit to the source record and rebuild the view from it.
    pub fn apply_edit(&mut self, edit: &FieldEdit) {
        let mut raw = self.raw.clone();
        raw.apply_edit(edit);
        *self = raw.to_item();
    }

    pub fn apply_transition(&mut self, transition: &Transition) {
        let mut raw = self.raw.clone();
        raw.apply_transition(transition);
        *self = raw.to_item();
    }

    /// Forget constituents that no longer exist. No-op for articles.
    pub fn drop_articles(&mut self, article_ids: &HashSet<&str>) {
        if let RawRecord::Lot(lot) = &self.raw {
            let mut lot = lot.clone();
            lot.article_ids.retain(|id| !article_ids.contains(id.as_str()));
            *self = lot.to_item();
        }
    }

    /// Mark a lot constituent as sold through `lot_id`. No-op for lots.
    pub fn mark_sold_in_lot(&mut self, lot_id: &str) {
        if let RawRecord::Article(article) = &self.raw {
            let mut article = article.clone();
            article.mark_sold_in_lot(lot_id);
            *self = article.to_item();
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    pub fn article(id: &str, title: &str, status: Status) -> Article {
        Article {
            id: id.into(),
            title: title.into(),
            description: None,
            brand: None,
            price: None,
            status,
            season: None,
            reference_number: None,
            photos: Vec::new(),
            seller_id: None,
            created_at: ts(1),
            published_at: None,
            scheduled_for: None,
            vinted_url: None,
            sold_at: None,
            sold_price: None,
            fees: None,
            shipping_cost: None,
            net_profit: None,
            buyer_name: None,
            sale_notes: None,
            sold_lot_id: None,
        }
    }

    pub fn lot(id: &str, name: &str, status: Status, article_ids: &[&str]) -> Lot {
        Lot {
            id: id.into(),
            name: name.into(),
            description: None,
            price: None,
            status,
            season: None,
            reference_number: None,
            photos: Vec::new(),
            seller_id: None,
            created_at: ts(1),
            published_at: None,
            scheduled_for: None,
            vinted_url: None,
            sold_at: None,
            sold_price: None,
            fees: None,
            shipping_cost: None,
            net_profit: None,
            buyer_name: None,
            sale_notes: None,
            article_ids: article_ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(Status::parse_status("SOLD"), Some(Status::Sold));
        assert_eq!(Status::parse_status(" Vinted_Draft "), Some(Status::VintedDraft));
        assert_eq!(Status::parse_status("sold-ish"), None);
    }

    #[test]
    fn duplicate_article_drops_sale_fields() {
        let mut a = article("a1", "Jacket", Status::Sold);
        a.sold_at = Some(ts(3));
        a.sold_price = Some(50.0);
        a.net_profit = Some(42.0);
        a.fees = Some(5.0);
        a.reference_number = Some("REF-1".into());
        a.scheduled_for = Some(ts(4));
        a.brand = Some("Acme".into());
        a.photos = vec!["p1.jpg".into()];

        let copy = a.duplicate("a2".into(), ts(10));
        assert_eq!(copy.id, "a2");
        assert_eq!(copy.title, "Jacket (Copie)");
        assert_eq!(copy.status, Status::Draft);
        assert_eq!(copy.created_at, ts(10));
        assert!(copy.scheduled_for.is_none());
        assert!(copy.sold_at.is_none());
        assert!(copy.sold_price.is_none());
        assert!(copy.net_profit.is_none());
        assert!(copy.fees.is_none());
        assert!(copy.reference_number.is_none());
        assert_eq!(copy.brand.as_deref(), Some("Acme"));
        assert_eq!(copy.photos, vec!["p1.jpg".to_string()]);
    }

    #[test]
    fn duplicate_lot_keeps_constituents() {
        let l = lot("l1", "Bundle", Status::Published, &["a1", "a2"]);
        let copy = l.duplicate("l2".into(), ts(5));
        assert_eq!(copy.name, "Bundle (Copie)");
        assert_eq!(copy.article_ids, vec!["a1".to_string(), "a2".to_string()]);
    }

    #[test]
    fn sold_transition_computes_net_profit() {
        let mut item = article("a1", "Jacket", Status::Published).to_item();
        item.apply_transition(&Transition::Sold(SaleOutcome {
            sold_price: 50.0,
            fees: 5.0,
            shipping_cost: 3.0,
            buyer_name: Some("Bob".into()),
            notes: None,
            sold_at: ts(7),
        }));
        assert_eq!(item.status, Status::Sold);
        assert_eq!(item.net_profit, Some(42.0));
        assert_eq!(item.realized_profit(), Some(42.0));
        match &item.raw {
            RawRecord::Article(a) => assert_eq!(a.buyer_name.as_deref(), Some("Bob")),
            RawRecord::Lot(_) => panic!("wrong kind"),
        }
    }

    #[test]
    fn lot_title_edit_updates_name() {
        let mut item = lot("l1", "Bundle", Status::Draft, &[]).to_item();
        item.apply_edit(&FieldEdit::Title("Winter bundle".into()));
        assert_eq!(item.title, "Winter bundle");
        match &item.raw {
            RawRecord::Lot(l) => assert_eq!(l.name, "Winter bundle"),
            RawRecord::Article(_) => panic!("wrong kind"),
        }
    }

    #[test]
    fn field_value_parsing() {
        assert_eq!(Field::Price.parse_value("12,5").unwrap(), FieldEdit::Price(Some(12.5)));
        assert_eq!(Field::Price.parse_value("").unwrap(), FieldEdit::Price(None));
        assert!(Field::Price.parse_value("abc").is_err());
        assert_eq!(
            Field::Status.parse_value("Ready").unwrap(),
            FieldEdit::Status(Status::Ready)
        );
        assert!(!Field::Brand.supported_by(ItemKind::Lot));
    }

    #[test]
    fn revert_to_draft_clears_sale_outcome() {
        let mut a = article("a1", "Jacket", Status::Ready);
        a.apply_transition(&Transition::Sold(SaleOutcome {
            sold_price: 50.0,
            fees: 5.0,
            shipping_cost: 3.0,
            buyer_name: Some("Chloé".into()),
            notes: Some("fast".into()),
            sold_at: ts(9),
        }));
        a.sold_lot_id = Some("l1".into());
        a.apply_transition(&Transition::RevertToDraft);
        assert_eq!(a.status, Status::Draft);
        assert_eq!(a.sold_at, None);
        assert_eq!(a.sold_price, None);
        assert_eq!(a.fees, None);
        assert_eq!(a.shipping_cost, None);
        assert_eq!(a.net_profit, None);
        assert_eq!(a.buyer_name, None);
        assert_eq!(a.sale_notes, None);
        assert_eq!(a.sold_lot_id, None);
    }

    #[test]
    fn dropped_articles_leave_the_lot() {
        let mut item = lot("l1", "Pack", Status::Draft, &["a1", "a2"]).to_item();
        item.drop_articles(&HashSet::from(["a1"]));
        assert_eq!(item.article_ids, vec!["a2".to_string()]);
        assert_eq!(item.article_count, Some(1));
    }

    #[test]
    fn item_key_parsing() {
        let key: ItemKey = "lot:42".parse().unwrap();
        assert_eq!(key, ItemKey::new(ItemKind::Lot, "42"));
        assert_eq!(key.to_string(), "lot:42");
        assert!("42".parse::<ItemKey>().is_err());
        assert!("article:".parse::<ItemKey>().is_err());
        assert!("box:1".parse::<ItemKey>().is_err());
    }
}
