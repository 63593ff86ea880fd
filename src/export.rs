//! Spreadsheet export of the analytics table.

use crate::model::{Item, Seller};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const BOM: &[u8] = b"\xEF\xBB\xBF";

pub const HEADER: [&str; 10] = [
    "Type",
    "Titre",
    "Marque",
    "Vendeur",
    "Statut",
    "Prix",
    "Prix de vente",
    "Bénéfice net",
    "Date de création",
    "Date de vente",
];

pub fn file_name(date: NaiveDate) -> String {
    format!("statistiques_{}.csv", date.format("%Y-%m-%d"))
}

fn money(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_default()
}

fn day(v: Option<DateTime<Utc>>) -> String {
    v.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn row(item: &Item, sellers: &HashMap<&str, &str>) -> [String; 10] {
    let seller = item
        .seller_id
        .as_deref()
        .and_then(|id| sellers.get(id).copied())
        .unwrap_or_default();
    let sold = item.is_sold();
    [
        item.kind.label().to_string(),
        item.title.clone(),
        item.brand.clone().unwrap_or_default(),
        seller.to_string(),
        item.status.as_str().to_string(),
        money(item.price),
        if sold { money(item.sold_price) } else { String::new() },
        if sold { money(item.net_profit) } else { String::new() },
        day(Some(item.created_at)),
        if sold { day(item.sold_at) } else { String::new() },
    ]
}

/// UTF-8 CSV with a byte-order mark, one row per item.
pub fn to_csv(items: &[&Item], sellers: &[Seller]) -> Result<Vec<u8>> {
    let names: HashMap<&str, &str> = sellers
        .iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(BOM.to_vec());
    writer.write_record(HEADER)?;
    for item in items {
        writer.write_record(row(item, &names))?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("failed to flush csv: {}", e.error()))
}

/// Write `statistiques_<today>.csv` into `dir` and return its path.
#[instrument(skip_all, fields(dir = %dir.display(), count = items.len()))]
pub async fn write_export(
    dir: &Path,
    items: &[&Item],
    sellers: &[Seller],
    today: NaiveDate,
) -> Result<PathBuf> {
    let bytes = to_csv(items, sellers)?;
    let path = dir.join(file_name(today));
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "export written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{article, ts};
    use crate::model::{CatalogEntity, Status};
    use tempfile::tempdir;

    fn sample() -> (Vec<Item>, Vec<Seller>) {
        let mut sold = article("a1", "Veste \"vintage\"", Status::Sold);
        sold.brand = Some("Levi's".into());
        sold.price = Some(40.0);
        sold.sold_price = Some(50.0);
        sold.net_profit = Some(42.0);
        sold.sold_at = Some(ts(10));
        sold.seller_id = Some("s1".into());
        let mut draft = article("a2", "Jupe", Status::Draft);
        draft.price = Some(15.0);
        draft.sold_price = Some(99.0);
        let sellers = vec![Seller {
            id: "s1".into(),
            name: "Alice".into(),
            is_default: true,
        }];
        (vec![sold.to_item(), draft.to_item()], sellers)
    }

    #[test]
    fn header_plus_one_line_per_item() {
        let (items, sellers) = sample();
        let refs: Vec<&Item> = items.iter().collect();
        let bytes = to_csv(&refs, &sellers).unwrap();
        assert!(bytes.starts_with(BOM));

        let text = String::from_utf8(bytes[BOM.len()..].to_vec()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("\"Veste \"\"vintage\"\"\""));

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][3], "Alice");
        assert_eq!(&rows[0][6], "50.00");
        assert_eq!(&rows[0][9], "2026-03-10");
        assert_eq!(&rows[1][6], "");
        assert_eq!(&rows[1][7], "");
        assert_eq!(&rows[1][9], "");
        assert_eq!(&rows[1][5], "15.00");
    }

    #[tokio::test]
    async fn export_file_name_uses_date() {
        let td = tempdir().unwrap();
        let (items, sellers) = sample();
        let refs: Vec<&Item> = items.iter().collect();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let path = write_export(td.path(), &refs, &sellers, date).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "statistiques_2026-03-14.csv");
        assert!(path.exists());
    }
}
