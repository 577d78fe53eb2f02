use crate::types::{Coordinate, DecadeFilter, GroupedCount, Record, UNKNOWN};
use geo::Point;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Lexicographic by key; chronological for decade labels.
    KeyAscending,
    /// Largest groups first, ties kept in encounter order.
    CountDescending,
}

/// Parse a `"lat,lon"` string into a lon/lat point.
///
/// Anything other than exactly two finite numbers separated by one comma
/// yields `None`.
pub fn parse_geo_point(geo: Option<&str>) -> Option<Coordinate> {
    let geo = geo?;
    let (lat, lon) = geo.split_once(',')?;
    if lon.contains(',') {
        return None;
    }
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some(Point::new(lon, lat))
}

/// Bucket a year string into a `"1980s"`-style label, or `Unknown`.
pub fn decade_of(year: Option<&str>) -> String {
    match year.and_then(leading_integer).and_then(|y| y.div_euclid(10).checked_mul(10)) {
        Some(decade) => format!("{}s", decade),
        None => UNKNOWN.to_string(),
    }
}

// Optional sign followed by digits, ignoring leading whitespace and any trailing text.
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let sign_len = usize::from(text.starts_with(['+', '-']));
    let digits = text[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    text[..sign_len + digits].parse().ok()
}

pub fn record_decade(record: &Record) -> String {
    decade_of(record.year_of_installation.as_deref())
}

/// Count records per key, one entry per distinct key.
pub fn group_counts<F>(records: &[Record], key_fn: F, order: SortOrder) -> Vec<GroupedCount>
where
    F: Fn(&Record) -> String,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<GroupedCount> = Vec::new();

    for record in records {
        let key = key_fn(record);
        match positions.get(&key) {
            Some(&i) => groups[i].count += 1,
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push(GroupedCount::new(key, 1));
            }
        }
    }

    // sort_by is stable, so equal counts stay in encounter order
    match order {
        SortOrder::KeyAscending => groups.sort_by(|a, b| a.key.cmp(&b.key)),
        SortOrder::CountDescending => groups.sort_by(|a, b| b.count.cmp(&a.count)),
    }

    groups
}

/// Records installed in the selected decade, in dataset order.
pub fn filter_by_decade(records: &[Record], filter: &DecadeFilter) -> Vec<Record> {
    match filter {
        DecadeFilter::All => records.to_vec(),
        DecadeFilter::Decade(decade) => records
            .iter()
            .filter(|r| record_decade(r) == *decade)
            .cloned()
            .collect(),
    }
}

/// Distinct decade labels present in the dataset, sorted.
pub fn decade_options(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(record_decade)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
