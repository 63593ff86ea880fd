//! Sales analytics over unified items: time scoping, metric rollups,
//! period-over-period deltas, a per-seller leaderboard and a daily trend.

use crate::model::{Item, ParseError, Seller, Status};
use crate::query::{self, PageView, Sort, SortColumn, SortDirection, ANALYTICS_PAGE_SIZE};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Number of daily buckets in the trend series.
pub const TREND_DAYS: usize = 14;

/// Leaderboard label for items without a seller.
pub const UNASSIGNED_LABEL: &str = "Non assigné";

/// Which timestamp decides whether an item is in scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateMode {
    Created,
    #[default]
    Sold,
}

impl DateMode {
    fn date_of(&self, item: &Item) -> Option<DateTime<Utc>> {
        match self {
            DateMode::Created => Some(item.created_at),
            DateMode::Sold => item.sold_at,
        }
    }
}

impl FromStr for DateMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "created_at" => Ok(DateMode::Created),
            "sold" | "sold_at" => Ok(DateMode::Sold),
            _ => Err(ParseError::unknown("date mode", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    pub fn days(&self) -> Option<i64> {
        match self {
            TimeRange::Week => Some(7),
            TimeRange::Month => Some(30),
            TimeRange::Quarter => Some(90),
            TimeRange::All => None,
        }
    }

    /// `[now - N days, now)`; `None` for `All`.
    pub fn current_window(&self, now: DateTime<Utc>) -> Option<Window> {
        let days = self.days()?;
        Some(Window {
            start: now - Duration::days(days),
            end: now,
        })
    }

    /// `[now - 2N days, now - N days)`; `None` for `All`.
    pub fn previous_window(&self, now: DateTime<Utc>) -> Option<Window> {
        let days = self.days()?;
        Some(Window {
            start: now - Duration::days(2 * days),
            end: now - Duration::days(days),
        })
    }
}

impl FromStr for TimeRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7d" => Ok(TimeRange::Week),
            "30d" => Ok(TimeRange::Month),
            "90d" => Ok(TimeRange::Quarter),
            "all" => Ok(TimeRange::All),
            _ => Err(ParseError::unknown("time range", s)),
        }
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Items whose `mode` date falls inside `window`. A missing window keeps everything.
pub fn scope<'a>(items: &'a [Item], mode: DateMode, window: Option<&Window>) -> Vec<&'a Item> {
    match window {
        None => items.iter().collect(),
        Some(window) => items
            .iter()
            .filter(|item| mode.date_of(item).is_some_and(|at| window.contains(at)))
            .collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub draft: usize,
    pub ready: usize,
    pub processing: usize,
    pub vinted_draft: usize,
    pub sold: usize,
    pub error: usize,
    pub published_like: usize,
    pub sold_transactions: usize,
    pub total_revenue: f64,
    pub total_fees: f64,
    pub total_shipping: f64,
    pub total_net_profit: f64,
    pub avg_sale_price: f64,
    pub conversion_rate: f64,
}

/// Sold with a recorded sale date. A `sold` item lacking `sold_at` still counts
/// under `Metrics::sold` but contributes no revenue.
fn is_sale_transaction(item: &Item) -> bool {
    item.status == Status::Sold && item.sold_at.is_some()
}

fn ratio_percent(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        100.0 * numerator as f64 / denominator as f64
    }
}

pub fn compute_metrics(scope: &[&Item]) -> Metrics {
    let mut m = Metrics::default();
    for item in scope {
        match item.status {
            Status::Draft => m.draft += 1,
            Status::Ready => m.ready += 1,
            Status::Processing => m.processing += 1,
            Status::VintedDraft => m.vinted_draft += 1,
            Status::Sold => m.sold += 1,
            Status::Error => m.error += 1,
            Status::Scheduled | Status::Published | Status::VenduEnLot => {}
        }
        if item.status.is_published_like() {
            m.published_like += 1;
        }
        if is_sale_transaction(item) {
            m.sold_transactions += 1;
            m.total_revenue += item.sold_price.unwrap_or(0.0);
            m.total_fees += item.fees.unwrap_or(0.0);
            m.total_shipping += item.shipping_cost.unwrap_or(0.0);
            m.total_net_profit += item.net_profit.unwrap_or(0.0);
        }
    }
    m.avg_sale_price = if m.sold_transactions == 0 {
        0.0
    } else {
        m.total_revenue / m.sold_transactions as f64
    };
    m.conversion_rate = ratio_percent(m.sold_transactions, m.published_like);
    m
}

/// Percentage change from `previous` to `current`. Undefined (`None`) when there
/// is no previous value or it is zero.
pub fn percent_delta(current: f64, previous: Option<f64>) -> Option<f64> {
    match previous {
        Some(prev) if prev != 0.0 => Some((current - prev) / prev.abs() * 100.0),
        _ => None,
    }
}

/// Render a delta; undefined deltas render as a neutral dash.
pub fn format_delta(delta: Option<f64>) -> String {
    match delta {
        Some(d) => format!("{d:+.1}%"),
        None => "—".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub current: Metrics,
    pub previous: Option<Metrics>,
    pub revenue_delta: Option<f64>,
    pub net_profit_delta: Option<f64>,
    pub sales_delta: Option<f64>,
    pub conversion_delta: Option<f64>,
}

pub fn compare_periods(
    items: &[Item],
    mode: DateMode,
    range: TimeRange,
    now: DateTime<Utc>,
) -> PeriodComparison {
    let current_window = range.current_window(now);
    let current = compute_metrics(&scope(items, mode, current_window.as_ref()));
    let previous = range
        .previous_window(now)
        .map(|w| compute_metrics(&scope(items, mode, Some(&w))));
    let prev = previous.as_ref();
    PeriodComparison {
        revenue_delta: percent_delta(current.total_revenue, prev.map(|p| p.total_revenue)),
        net_profit_delta: percent_delta(
            current.total_net_profit,
            prev.map(|p| p.total_net_profit),
        ),
        sales_delta: percent_delta(
            current.sold_transactions as f64,
            prev.map(|p| p.sold_transactions as f64),
        ),
        conversion_delta: percent_delta(
            current.conversion_rate,
            prev.map(|p| p.conversion_rate),
        ),
        current,
        previous,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardKey {
    #[default]
    Profit,
    Revenue,
    Sales,
    Conversion,
}

impl FromStr for LeaderboardKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "profit" => Ok(LeaderboardKey::Profit),
            "revenue" => Ok(LeaderboardKey::Revenue),
            "sales" | "count" => Ok(LeaderboardKey::Sales),
            "conversion" => Ok(LeaderboardKey::Conversion),
            _ => Err(ParseError::unknown("leaderboard key", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellerStats {
    /// `None` for the unassigned bucket.
    pub seller_id: Option<String>,
    pub name: String,
    pub items_sold: usize,
    pub items_published: usize,
    pub revenue: f64,
    pub profit: f64,
    pub avg_sale_price: f64,
    pub conversion_rate: f64,
}

impl SellerStats {
    fn empty(seller_id: Option<String>, name: String) -> Self {
        Self {
            seller_id,
            name,
            items_sold: 0,
            items_published: 0,
            revenue: 0.0,
            profit: 0.0,
            avg_sale_price: 0.0,
            conversion_rate: 0.0,
        }
    }

    fn has_activity(&self) -> bool {
        self.items_sold > 0 || self.items_published > 0 || self.revenue != 0.0 || self.profit != 0.0
    }

    fn sort_value(&self, key: LeaderboardKey) -> f64 {
        match key {
            LeaderboardKey::Profit => self.profit,
            LeaderboardKey::Revenue => self.revenue,
            LeaderboardKey::Sales => self.items_sold as f64,
            LeaderboardKey::Conversion => self.conversion_rate,
        }
    }
}

/// Per-seller rollup, sorted descending by `key`.
///
/// Every known seller is seeded, but entries with no activity at all are
/// dropped, so a seller without any published or sold item does not appear.
pub fn leaderboard(scope: &[&Item], sellers: &[Seller], key: LeaderboardKey) -> Vec<SellerStats> {
    let mut rows: Vec<SellerStats> = sellers
        .iter()
        .map(|s| SellerStats::empty(Some(s.id.clone()), s.name.clone()))
        .collect();
    rows.push(SellerStats::empty(None, UNASSIGNED_LABEL.to_string()));
    let mut index: HashMap<Option<String>, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (row.seller_id.clone(), i))
        .collect();

    for item in scope {
        let slot = match index.get(&item.seller_id) {
            Some(&i) => i,
            None => {
                // seller reference not in the roster
                let id = item.seller_id.clone().unwrap_or_default();
                rows.push(SellerStats::empty(item.seller_id.clone(), id));
                index.insert(item.seller_id.clone(), rows.len() - 1);
                rows.len() - 1
            }
        };
        let row = &mut rows[slot];
        if item.status.is_published_like() {
            row.items_published += 1;
        }
        if is_sale_transaction(item) {
            row.items_sold += 1;
            row.revenue += item.sold_price.unwrap_or(0.0);
            row.profit += item.net_profit.unwrap_or(0.0);
        }
    }

    let mut rows: Vec<SellerStats> = rows
        .into_iter()
        .filter(SellerStats::has_activity)
        .map(|mut row| {
            row.avg_sale_price = if row.items_sold == 0 {
                0.0
            } else {
                row.revenue / row.items_sold as f64
            };
            row.conversion_rate = ratio_percent(row.items_sold, row.items_published);
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        b.sort_value(key)
            .total_cmp(&a.sort_value(key))
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub day: NaiveDate,
    pub value: f64,
}

/// Daily series over the last [`TREND_DAYS`] days (UTC), ending today.
///
/// Computed over the whole collection, not the time-range scope.
pub fn trend(items: &[Item], mode: DateMode, now: DateTime<Utc>) -> Vec<TrendPoint> {
    let today = now.date_naive();
    let first = today - Duration::days(TREND_DAYS as i64 - 1);
    let mut points: Vec<TrendPoint> = (0..TREND_DAYS as i64)
        .map(|offset| TrendPoint {
            day: first + Duration::days(offset),
            value: 0.0,
        })
        .collect();

    for item in items {
        if mode == DateMode::Sold && !is_sale_transaction(item) {
            continue;
        }
        let Some(at) = mode.date_of(item) else {
            continue;
        };
        let offset = (at.date_naive() - first).num_days();
        if !(0..TREND_DAYS as i64).contains(&offset) {
            continue;
        }
        let point = &mut points[offset as usize];
        point.value += match mode {
            DateMode::Created => 1.0,
            DateMode::Sold => item.sold_price.unwrap_or(0.0),
        };
    }
    points
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSettings {
    pub date_mode: DateMode,
    pub time_range: TimeRange,
    pub leaderboard_key: LeaderboardKey,
}

/// Everything the analytics dashboard renders.
#[derive(Debug, Clone)]
pub struct AnalyticsReport<'a> {
    pub settings: AnalyticsSettings,
    pub generated_at: DateTime<Utc>,
    pub comparison: PeriodComparison,
    pub leaderboard: Vec<SellerStats>,
    pub trend: Vec<TrendPoint>,
    /// In-scope items, most recent first by the selected date.
    pub scope: Vec<&'a Item>,
}

impl<'a> AnalyticsReport<'a> {
    pub fn build(
        items: &'a [Item],
        sellers: &[Seller],
        settings: AnalyticsSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let window = settings.time_range.current_window(now);
        let mut in_scope = scope(items, settings.date_mode, window.as_ref());
        let column = match settings.date_mode {
            DateMode::Created => SortColumn::CreatedAt,
            DateMode::Sold => SortColumn::SoldAt,
        };
        query::sort_items(
            &mut in_scope,
            Sort {
                column,
                direction: SortDirection::Desc,
            },
        );

        Self {
            settings,
            generated_at: now,
            comparison: compare_periods(items, settings.date_mode, settings.time_range, now),
            leaderboard: leaderboard(&in_scope, sellers, settings.leaderboard_key),
            trend: trend(items, settings.date_mode, now),
            scope: in_scope,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.comparison.current
    }

    /// One page of the in-scope item table.
    pub fn page(&self, page: usize) -> PageView<'a> {
        self.page_with_size(page, ANALYTICS_PAGE_SIZE)
    }

    pub fn page_with_size(&self, page: usize, page_size: usize) -> PageView<'a> {
        PageView {
            items: query::paginate(&self.scope, page_size, page).to_vec(),
            page,
            page_count: query::page_count(self.scope.len(), page_size),
            total: self.scope.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{article, lot};
    use crate::model::CatalogEntity;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 30, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    fn sold(id: &str, seller: Option<&str>, price: f64, days: i64) -> Item {
        let mut a = article(id, id, Status::Sold);
        a.seller_id = seller.map(str::to_string);
        a.sold_price = Some(price);
        a.fees = Some(5.0);
        a.shipping_cost = Some(3.0);
        a.net_profit = Some(price - 8.0);
        a.sold_at = Some(days_ago(days));
        a.created_at = days_ago(days + 1);
        a.to_item()
    }

    fn with_status(id: &str, seller: Option<&str>, status: Status, created_days: i64) -> Item {
        let mut a = article(id, id, status);
        a.seller_id = seller.map(str::to_string);
        a.created_at = days_ago(created_days);
        a.to_item()
    }

    fn seller(id: &str, name: &str) -> Seller {
        Seller {
            id: id.into(),
            name: name.into(),
            is_default: false,
        }
    }

    #[test]
    fn conversion_rate_scenario() {
        let items = vec![
            sold("a1", None, 50.0, 1),
            with_status("a2", None, Status::Published, 1),
            with_status("a3", None, Status::Scheduled, 1),
            with_status("a4", None, Status::Published, 1),
        ];
        let refs: Vec<&Item> = items.iter().collect();
        let m = compute_metrics(&refs);
        assert_eq!(m.published_like, 4);
        assert_eq!(m.sold_transactions, 1);
        assert_eq!(m.conversion_rate, 25.0);
        assert_eq!(m.total_revenue, 50.0);
        assert_eq!(m.total_fees, 5.0);
        assert_eq!(m.total_shipping, 3.0);
        assert_eq!(m.total_net_profit, 42.0);
        assert_eq!(m.avg_sale_price, 50.0);
    }

    #[test]
    fn empty_scope_has_no_nan() {
        let m = compute_metrics(&[]);
        assert_eq!(m.avg_sale_price, 0.0);
        assert_eq!(m.conversion_rate, 0.0);
        assert!(m.avg_sale_price.is_finite() && m.conversion_rate.is_finite());
    }

    #[test]
    fn sold_without_date_is_counted_but_not_revenue() {
        let mut a = article("a1", "Coat", Status::Sold);
        a.sold_price = Some(100.0);
        let item = a.to_item();
        let m = compute_metrics(&[&item]);
        assert_eq!(m.sold, 1);
        assert_eq!(m.sold_transactions, 0);
        assert_eq!(m.total_revenue, 0.0);
        assert_eq!(m.published_like, 1);
        assert_eq!(m.conversion_rate, 0.0);
    }

    #[test]
    fn total_profit_uses_persisted_values() {
        let mut item = sold("a1", None, 50.0, 1);
        item.net_profit = Some(10.0);
        let m = compute_metrics(&[&item]);
        assert_eq!(m.total_net_profit, 10.0);
    }

    #[test]
    fn windows_are_half_open() {
        let w = TimeRange::Week.current_window(now()).unwrap();
        assert!(w.contains(days_ago(7)));
        assert!(!w.contains(now()));
        let p = TimeRange::Week.previous_window(now()).unwrap();
        assert!(p.contains(days_ago(14)));
        assert!(!p.contains(days_ago(7)));
        assert!(TimeRange::All.current_window(now()).is_none());
    }

    #[test]
    fn scope_by_mode() {
        let items = vec![
            sold("a1", None, 10.0, 2),
            sold("a2", None, 10.0, 20),
            with_status("a3", None, Status::Draft, 3),
        ];
        let w = TimeRange::Week.current_window(now());
        let by_sold = scope(&items, DateMode::Sold, w.as_ref());
        assert_eq!(by_sold.len(), 1);
        let by_created = scope(&items, DateMode::Created, w.as_ref());
        assert_eq!(by_created.len(), 2);
        assert_eq!(scope(&items, DateMode::Sold, None).len(), 3);
    }

    #[test]
    fn delta_is_undefined_without_previous_revenue() {
        let items = vec![sold("a1", None, 100.0, 1)];
        let cmp = compare_periods(&items, DateMode::Sold, TimeRange::Week, now());
        assert_eq!(cmp.current.total_revenue, 100.0);
        assert_eq!(cmp.previous.as_ref().unwrap().total_revenue, 0.0);
        assert_eq!(cmp.revenue_delta, None);
        assert_eq!(format_delta(cmp.revenue_delta), "—");
    }

    #[test]
    fn delta_against_previous_period() {
        let items = vec![sold("a1", None, 150.0, 1), sold("a2", None, 100.0, 10)];
        let cmp = compare_periods(&items, DateMode::Sold, TimeRange::Week, now());
        assert_eq!(cmp.revenue_delta, Some(50.0));
        assert_eq!(cmp.sales_delta, Some(0.0));
        assert_eq!(format_delta(cmp.revenue_delta), "+50.0%");

        let all = compare_periods(&items, DateMode::Sold, TimeRange::All, now());
        assert!(all.previous.is_none());
        assert_eq!(all.revenue_delta, None);
    }

    #[test]
    fn leaderboard_seeds_and_drops_idle_sellers() {
        let items = vec![
            sold("a1", Some("s1"), 40.0, 1),
            sold("a2", Some("s2"), 100.0, 1),
            with_status("a3", Some("s2"), Status::Published, 1),
            with_status("a4", Some("s3"), Status::Draft, 1),
            with_status("a5", None, Status::Published, 1),
        ];
        let sellers = vec![
            seller("s1", "Alice"),
            seller("s2", "Bruno"),
            seller("s3", "Chloé"),
            seller("s4", "Dora"),
        ];
        let refs: Vec<&Item> = items.iter().collect();
        let board = leaderboard(&refs, &sellers, LeaderboardKey::Profit);
        let names: Vec<&str> = board.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Bruno", "Alice", UNASSIGNED_LABEL]);

        let bruno = &board[0];
        assert_eq!(bruno.items_sold, 1);
        assert_eq!(bruno.items_published, 2);
        assert_eq!(bruno.revenue, 100.0);
        assert_eq!(bruno.profit, 92.0);
        assert_eq!(bruno.conversion_rate, 50.0);

        let by_conversion = leaderboard(&refs, &sellers, LeaderboardKey::Conversion);
        assert_eq!(by_conversion[0].name, "Alice");
    }

    #[test]
    fn leaderboard_keeps_unknown_seller_ids() {
        let items = vec![sold("a1", Some("ghost"), 20.0, 1)];
        let refs: Vec<&Item> = items.iter().collect();
        let board = leaderboard(&refs, &[], LeaderboardKey::Revenue);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].seller_id.as_deref(), Some("ghost"));
    }

    #[test]
    fn trend_has_fourteen_daily_buckets() {
        let mut items = vec![
            sold("a1", None, 30.0, 0),
            sold("a2", None, 20.0, 0),
            sold("a3", None, 99.0, 40),
        ];
        items.push(with_status("a4", None, Status::Draft, 13));
        let series = trend(&items, DateMode::Sold, now());
        assert_eq!(series.len(), TREND_DAYS);
        assert_eq!(series.last().unwrap().day, now().date_naive());
        assert_eq!(series.last().unwrap().value, 50.0);
        assert_eq!(series.iter().map(|p| p.value).sum::<f64>(), 50.0);

        let created = trend(&items, DateMode::Created, now());
        assert_eq!(created[0].value, 1.0);
        assert_eq!(created[0].day, days_ago(13).date_naive());
    }

    #[test]
    fn sold_trend_skips_items_no_longer_sold() {
        let mut reverted = article("a1", "a1", Status::Draft);
        reverted.sold_at = Some(days_ago(0));
        reverted.sold_price = Some(50.0);
        let items = vec![reverted.to_item(), sold("a2", None, 20.0, 0)];
        let series = trend(&items, DateMode::Sold, now());
        assert_eq!(series.iter().map(|p| p.value).sum::<f64>(), 20.0);
    }

    #[test]
    fn trend_ignores_time_range() {
        let items = vec![sold("a1", None, 30.0, 10)];
        let report = AnalyticsReport::build(
            &items,
            &[],
            AnalyticsSettings {
                time_range: TimeRange::Week,
                ..AnalyticsSettings::default()
            },
            now(),
        );
        assert!(report.scope.is_empty());
        assert_eq!(report.trend.iter().map(|p| p.value).sum::<f64>(), 30.0);
    }

    #[test]
    fn report_pages_scope_at_twenty() {
        let items: Vec<Item> = (0..45).map(|i| sold(&format!("a{i}"), None, 1.0, 1)).collect();
        let lots = vec![lot("l1", "Pack", Status::Draft, &[]).to_item()];
        let mut all = items.clone();
        all.extend(lots);
        let report = AnalyticsReport::build(&all, &[], AnalyticsSettings::default(), now());
        assert_eq!(report.scope.len(), 45);
        let third = report.page(3);
        assert_eq!(third.page_count, 3);
        assert_eq!(third.items.len(), 5);
        assert!(report.page(4).items.is_empty());
        assert_eq!(report.metrics().sold_transactions, 45);
    }
}
