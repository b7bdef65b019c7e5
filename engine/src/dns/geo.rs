//! Geo and weight resolution for cluster targets

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Geo code used when a cluster carries no usable geo label
pub const DEFAULT_GEO: &str = "default";
/// Geo code attached to the catch-all record
pub const WILDCARD_GEO: &str = "*";
/// Weight used when a policy does not set one
pub const DEFAULT_WEIGHT: u32 = 120;

/// Cluster label holding the cluster's geo code
pub const LABEL_GEO_CODE: &str = "gslb.io/lb-attribute-geo-code";
/// Cluster label looked up in a policy's custom weight table
pub const LABEL_CUSTOM_WEIGHT: &str = "gslb.io/lb-attribute-custom-weight";

const CONTINENT_CODES: [&str; 7] = ["C-AF", "C-AN", "C-AS", "C-EU", "C-OC", "C-NA", "C-SA"];

const ISO_3166_ALPHA2: [&str; 249] = [
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

/// A geo routing tag: continent code, ISO-3166 country code, or `default`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoCode(String);

impl GeoCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default_code(&self) -> bool {
        self.0 == DEFAULT_GEO
    }

    pub fn is_wildcard_code(&self) -> bool {
        self.0 == WILDCARD_GEO
    }

    pub fn is_continent_code(&self) -> bool {
        CONTINENT_CODES.contains(&self.0.as_str())
    }

    pub fn is_country_code(&self) -> bool {
        ISO_3166_ALPHA2.contains(&self.0.as_str())
    }

    /// Usable as a cluster geo label
    pub fn is_valid(&self) -> bool {
        self.is_continent_code() || self.is_country_code()
    }
}

impl Default for GeoCode {
    fn default() -> Self {
        Self(DEFAULT_GEO.to_string())
    }
}

impl std::fmt::Display for GeoCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolve a cluster's geo.
///
/// A policy default of `default` wins over any label. Labels that are not a
/// continent or country code are ignored rather than rejected.
pub fn resolve_geo(labels: &BTreeMap<String, String>, default_geo: &GeoCode) -> GeoCode {
    if default_geo.is_default_code() {
        return default_geo.clone();
    }

    match labels.get(LABEL_GEO_CODE).map(GeoCode::new) {
        Some(geo) if geo.is_valid() => geo,
        _ => default_geo.clone(),
    }
}

/// Resolve a cluster's weight from the custom weight table, falling back to
/// the policy default
pub fn resolve_weight(
    labels: &BTreeMap<String, String>,
    default_weight: u32,
    custom_weights: &BTreeMap<String, u32>,
) -> u32 {
    labels
        .get(LABEL_CUSTOM_WEIGHT)
        .and_then(|value| custom_weights.get(value))
        .copied()
        .unwrap_or(default_weight)
}
