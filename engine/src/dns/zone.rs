//! Managed zone lookup

use serde::{Deserialize, Serialize};

use crate::error::DnsError;

/// A DNS zone records can be published into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedZone {
    pub id: String,
    pub domain_name: String,
}

/// Find the most specific managed zone containing `host`.
///
/// Strips one label at a time until a zone matches. Returns the zone and the
/// part of the host below it (empty for the zone apex). A single-label
/// candidate is a TLD and ends the search.
pub fn find_matching_managed_zone<'a>(
    host: &str,
    zones: &'a [ManagedZone],
) -> Result<(&'a ManagedZone, String), DnsError> {
    let host = host.trim_end_matches('.').to_lowercase();
    if host.is_empty() || host.split('.').any(str::is_empty) {
        return Err(DnsError::InvalidHost(host));
    }

    let mut candidate = host.as_str();
    while candidate.contains('.') {
        let zone = zones
            .iter()
            .find(|z| z.domain_name.trim_end_matches('.').eq_ignore_ascii_case(candidate));

        if let Some(zone) = zone {
            let subdomain = host
                .strip_suffix(candidate)
                .unwrap_or_default()
                .trim_end_matches('.');
            return Ok((zone, subdomain.to_string()));
        }

        candidate = match candidate.split_once('.') {
            Some((_, parent)) => parent,
            None => break,
        };
    }

    Err(DnsError::NoManagedZone { host })
}
