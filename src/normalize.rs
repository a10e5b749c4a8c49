use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<RawElement>,
    /// Set by Overpass when the query failed server-side but still returned 200.
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<i64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub center: Option<Centroid>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Centroid {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: String,
}

impl RawElement {
    fn coordinates(&self) -> Option<(f64, f64)> {
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            return Some((lat, lon));
        }
        let center = self.center?;
        Some((center.lat?, center.lon?))
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

pub fn normalize(raw: &RawElement, category: &str, city: &str) -> Option<OrganizationRecord> {
    let name = raw.tag("name").map(str::trim).filter(|v| !v.is_empty())?;
    let (latitude, longitude) = raw.coordinates()?;

    let address = match raw.tag("addr:street").filter(|v| !v.is_empty()) {
        Some(street) => {
            let housenumber = raw.tag("addr:housenumber").unwrap_or_default();
            format!("{street} {housenumber}").trim().to_string()
        }
        None => city.to_string(),
    };

    Some(OrganizationRecord {
        name: name.to_string(),
        address,
        latitude,
        longitude,
        category: category.to_string(),
    })
}

pub fn normalize_all(elements: &[RawElement], category: &str, city: &str) -> Vec<OrganizationRecord> {
    elements
        .iter()
        .filter_map(|raw| normalize(raw, category, city))
        .collect()
}
