use anyhow::{anyhow, Error};
use geo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder for blank categories and unparseable years.
pub const UNKNOWN: &str = "Unknown";

/// Selector value meaning "no decade filter".
pub const ALL_DECADES: &str = "All";

/// Longitude on `x`, latitude on `y`.
pub type Coordinate = Point<f64>;

/// One public-art entry, as read from the dataset CSV.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Record {
    #[serde(rename = "Neighbourhood", default)]
    pub neighbourhood: String,
    #[serde(rename = "Type", default)]
    pub art_type: String,
    #[serde(rename = "YearOfInstallation", default)]
    pub year_of_installation: Option<String>,
    #[serde(rename = "geo_point_2d", default)]
    pub geo_point_2d: Option<String>,
}

impl Record {
    /// Trim every field; blank categories become `Unknown`, a blank year becomes absent.
    pub fn normalize(self) -> Self {
        Self {
            neighbourhood: or_unknown(&self.neighbourhood),
            art_type: or_unknown(&self.art_type),
            year_of_installation: self
                .year_of_installation
                .map(|y| y.trim().to_string())
                .filter(|y| !y.is_empty()),
            geo_point_2d: self.geo_point_2d,
        }
    }
}

fn or_unknown(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedCount {
    pub key: String,
    pub count: usize,
}

impl GroupedCount {
    pub fn new(key: impl Into<String>, count: usize) -> Self {
        Self { key: key.into(), count }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Neighbourhood,
    Type,
    Year,
    Map,
}

impl View {
    pub const CHARTS: [View; 3] = [View::Neighbourhood, View::Type, View::Year];

    pub fn as_str(self) -> &'static str {
        match self {
            View::Neighbourhood => "neighbourhood",
            View::Type => "type",
            View::Year => "year",
            View::Map => "map",
        }
    }

    /// Axis/title label used by the chart views.
    pub fn label(self) -> &'static str {
        match self {
            View::Neighbourhood => "Neighbourhood",
            View::Type => "Type",
            View::Year => "Decade",
            View::Map => "Map",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neighbourhood" => Ok(View::Neighbourhood),
            "type" => Ok(View::Type),
            "year" => Ok(View::Year),
            "map" => Ok(View::Map),
            other => Err(anyhow!("Unknown view: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DecadeFilter {
    #[default]
    All,
    Decade(String),
}

impl DecadeFilter {
    pub fn as_str(&self) -> &str {
        match self {
            DecadeFilter::All => ALL_DECADES,
            DecadeFilter::Decade(d) => d,
        }
    }
}

impl fmt::Display for DecadeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for DecadeFilter {
    fn from(value: &str) -> Self {
        if value == ALL_DECADES {
            DecadeFilter::All
        } else {
            DecadeFilter::Decade(value.to_string())
        }
    }
}

impl Serialize for DecadeFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The only mutable interaction state: which view is shown and which decade is selected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ViewState {
    pub view: View,
    pub decade: DecadeFilter,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(neighbourhood: &str, art_type: &str, year: Option<&str>) -> Record {
        Record {
            neighbourhood: neighbourhood.to_string(),
            art_type: art_type.to_string(),
            year_of_installation: year.map(str::to_string),
            geo_point_2d: None,
        }
    }

    #[test]
    fn normalize_fills_blank_categories() {
        let record = raw("  ", "", Some("  ")).normalize();
        assert_eq!(record.neighbourhood, UNKNOWN);
        assert_eq!(record.art_type, UNKNOWN);
        assert_eq!(record.year_of_installation, None);
    }

    #[test]
    fn normalize_trims_values() {
        let record = raw(" Downtown ", "Mural ", Some(" 1995")).normalize();
        assert_eq!(record.neighbourhood, "Downtown");
        assert_eq!(record.art_type, "Mural");
        assert_eq!(record.year_of_installation.as_deref(), Some("1995"));
    }

    #[test]
    fn views_parse_from_their_names() {
        for view in [View::Neighbourhood, View::Type, View::Year, View::Map] {
            assert_eq!(view.as_str().parse::<View>().unwrap(), view);
        }
        assert!("chart".parse::<View>().is_err());
    }

    #[test]
    fn all_is_the_unfiltered_selector() {
        assert_eq!(DecadeFilter::from("All"), DecadeFilter::All);
        assert_eq!(DecadeFilter::from("1990s"), DecadeFilter::Decade("1990s".into()));
        assert_eq!(ViewState::default().decade.as_str(), "All");
        assert_eq!(ViewState::default().view, View::Neighbourhood);
    }
}
