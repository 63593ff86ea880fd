//! Filtering, ordering and pagination over unified items. Pure; no I/O.

use crate::model::{Item, ItemKind, ParseError, Season, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Page size of the catalog grid.
pub const CATALOG_PAGE_SIZE: usize = 10;
/// Page size of the analytics item table.
pub const ANALYTICS_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFilter {
    #[default]
    Any,
    Article,
    Lot,
}

impl TypeFilter {
    fn accepts(&self, kind: ItemKind) -> bool {
        match self {
            TypeFilter::Any => true,
            TypeFilter::Article => kind == ItemKind::Article,
            TypeFilter::Lot => kind == ItemKind::Lot,
        }
    }
}

impl FromStr for TypeFilter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "all" => Ok(TypeFilter::Any),
            "article" | "articles" => Ok(TypeFilter::Article),
            "lot" | "lots" => Ok(TypeFilter::Lot),
            _ => Err(ParseError::unknown("type filter", s)),
        }
    }
}

/// Active filter dimensions, combined with AND. Unset dimensions match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub kind: TypeFilter,
    pub status: Option<Status>,
    pub seller_id: Option<String>,
    pub season: Option<Season>,
    pub search: String,
}

impl Filter {
    pub fn matches(&self, item: &Item) -> bool {
        self.kind.accepts(item.kind)
            && self.status.map_or(true, |s| item.status == s)
            && self
                .seller_id
                .as_deref()
                .map_or(true, |id| item.seller_id.as_deref() == Some(id))
            && self.season.map_or(true, |s| item.season == Some(s))
            && matches_search(item, &self.search)
    }
}

/// Case-insensitive substring over title, brand and reference number.
fn matches_search(item: &Item, search: &str) -> bool {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    [
        Some(item.title.as_str()),
        item.brand.as_deref(),
        item.reference_number.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&needle))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Kind,
    Title,
    Brand,
    Status,
    Price,
    SoldPrice,
    NetProfit,
    CreatedAt,
    SoldAt,
}

impl FromStr for SortColumn {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "kind" | "type" => Ok(SortColumn::Kind),
            "title" | "name" => Ok(SortColumn::Title),
            "brand" => Ok(SortColumn::Brand),
            "status" => Ok(SortColumn::Status),
            "price" => Ok(SortColumn::Price),
            "sold_price" => Ok(SortColumn::SoldPrice),
            "net_profit" | "profit" => Ok(SortColumn::NetProfit),
            "created_at" | "created" => Ok(SortColumn::CreatedAt),
            "sold_at" | "sold" => Ok(SortColumn::SoldAt),
            _ => Err(ParseError::unknown("sort column", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            column: SortColumn::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Text(String, String),
    Number(f64),
    Date(DateTime<Utc>),
}

impl SortKey {
    fn text(raw: &str) -> Self {
        SortKey::Text(collation_key(raw), raw.to_string())
    }

    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Text(ka, ra), SortKey::Text(kb, rb)) => ka.cmp(kb).then_with(|| ra.cmp(rb)),
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Date(a), SortKey::Date(b)) => a.cmp(b),
            // one column always yields one key shape
            _ => Ordering::Equal,
        }
    }
}

fn sort_key(item: &Item, column: SortColumn) -> Option<SortKey> {
    match column {
        SortColumn::Kind => Some(SortKey::text(item.kind.as_str())),
        SortColumn::Title => Some(SortKey::text(&item.title)),
        SortColumn::Brand => item.brand.as_deref().map(SortKey::text),
        SortColumn::Status => Some(SortKey::text(item.status.as_str())),
        SortColumn::Price => item.price.map(SortKey::Number),
        SortColumn::SoldPrice => item.sold_price.map(SortKey::Number),
        SortColumn::NetProfit => item.realized_profit().map(SortKey::Number),
        SortColumn::CreatedAt => Some(SortKey::Date(item.created_at)),
        SortColumn::SoldAt => item.sold_at.map(SortKey::Date),
    }
}

/// Lowercased, accent-folded comparison key approximating French collation.
pub fn collation_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
            'ç' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'ñ' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => out.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            other => out.push(other),
        }
    }
    out
}

/// Missing values sort last whatever the direction.
pub fn compare_items(a: &Item, b: &Item, sort: Sort) -> Ordering {
    match (sort_key(a, sort.column), sort_key(b, sort.column)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(ka), Some(kb)) => {
            let ord = ka.compare(&kb);
            match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    }
}

pub fn filter_items<'a>(items: &'a [Item], filter: &Filter) -> Vec<&'a Item> {
    items.iter().filter(|item| filter.matches(item)).collect()
}

pub fn sort_items(items: &mut [&Item], sort: Sort) {
    items.sort_by(|a, b| compare_items(a, b, sort));
}

/// Filter then sort.
pub fn select<'a>(items: &'a [Item], filter: &Filter, sort: Sort) -> Vec<&'a Item> {
    let mut selected = filter_items(items, filter);
    sort_items(&mut selected, sort);
    selected
}

/// Number of pages needed for `len` items; never less than one.
pub fn page_count(len: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    len.div_ceil(page_size).max(1)
}

/// 1-based page slice. Pages past the end yield an empty slice.
pub fn paginate<T>(items: &[T], page_size: usize, page: usize) -> &[T] {
    if page == 0 || page_size == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(page_size);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageView<'a> {
    pub items: Vec<&'a Item>,
    pub page: usize,
    pub page_count: usize,
    pub total: usize,
}

/// Grid query state. Any filter change sends the view back to page 1.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    filter: Filter,
    sort: Sort,
    page: usize,
    page_size: usize,
}

impl QueryState {
    pub fn new(page_size: usize) -> Self {
        Self {
            filter: Filter::default(),
            sort: Sort::default(),
            page: 1,
            page_size,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
        self.page = 1;
    }

    pub fn set_kind(&mut self, kind: TypeFilter) {
        self.filter.kind = kind;
        self.page = 1;
    }

    pub fn set_status(&mut self, status: Option<Status>) {
        self.filter.status = status;
        self.page = 1;
    }

    pub fn set_seller(&mut self, seller_id: Option<String>) {
        self.filter.seller_id = seller_id;
        self.page = 1;
    }

    pub fn set_season(&mut self, season: Option<Season>) {
        self.filter.season = season;
        self.page = 1;
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.filter.search = search.into();
        self.page = 1;
    }

    pub fn set_sort(&mut self, sort: Sort) {
        self.sort = sort;
    }

    /// Clicking the active column flips its direction; another column starts ascending.
    pub fn toggle_sort(&mut self, column: SortColumn) {
        self.sort = if self.sort.column == column {
            Sort {
                column,
                direction: self.sort.direction.reversed(),
            }
        } else {
            Sort {
                column,
                direction: SortDirection::Asc,
            }
        };
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn run<'a>(&self, items: &'a [Item]) -> PageView<'a> {
        let selected = select(items, &self.filter, self.sort);
        let total = selected.len();
        PageView {
            items: paginate(&selected, self.page_size, self.page).to_vec(),
            page: self.page,
            page_count: page_count(total, self.page_size),
            total,
        }
    }
}
