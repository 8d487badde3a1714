//! Metadata document parsing.
//!
//! Accepts either a single `EntityDescriptor` or an `EntitiesDescriptor`
//! (possibly nested) and produces one [`EntityRecord`] per entity.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::catalog::{Endpoint, EntityRecord, KeyDescriptorUse};
use crate::error::{SamlError, SamlResult};
use crate::types::{SamlBinding, MD_NS};
use crate::xml::{self, XmlElement};

/// Days of validity assumed when metadata declares neither `validUntil`
/// nor `cacheDuration`.
pub const DEFAULT_METADATA_VALIDITY_DAYS: i64 = 7;

/// Freshness constraints inherited from an enclosing `EntitiesDescriptor`.
#[derive(Debug, Clone, Copy, Default)]
struct Freshness {
    valid_until: Option<DateTime<Utc>>,
    cache_duration: Option<Duration>,
}

impl Freshness {
    fn read(element: &XmlElement, inherited: Self) -> SamlResult<Self> {
        let valid_until = match element.attr("validUntil") {
            Some(raw) => Some(parse_instant(raw)?),
            None => inherited.valid_until,
        };
        let cache_duration = match element.attr("cacheDuration") {
            Some(raw) => Some(parse_duration(raw)?),
            None => inherited.cache_duration,
        };
        Ok(Self {
            valid_until,
            cache_duration,
        })
    }

    fn resolve(self, entity_id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        // A cache duration past the representable range means "no expiry".
        let from_cache = self
            .cache_duration
            .map(|d| now.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC));
        match (self.valid_until, from_cache) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => {
                info!(
                    entity_id = %entity_id,
                    days = DEFAULT_METADATA_VALIDITY_DAYS,
                    "Metadata declares no validUntil or cacheDuration, assuming default validity"
                );
                now.checked_add_signed(Duration::days(DEFAULT_METADATA_VALIDITY_DAYS))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
        }
    }
}

/// Parses a metadata document into entity records.
///
/// ## Errors
///
/// Returns [`SamlError::XmlParse`] for malformed XML and
/// [`SamlError::Metadata`] if the root is not an entity descriptor or an
/// entity lacks its `entityID`.
pub fn parse_metadata(xml_text: &str, now: DateTime<Utc>) -> SamlResult<Vec<EntityRecord>> {
    let root = xml::parse(xml_text)?;
    let mut records = Vec::new();

    match root.name.as_str() {
        "EntityDescriptor" => {
            records.push(parse_entity(&root, Freshness::default(), now)?);
        }
        "EntitiesDescriptor" => {
            collect_entities(&root, Freshness::default(), now, &mut records)?;
        }
        other => {
            return Err(SamlError::Metadata(format!(
                "expected EntityDescriptor or EntitiesDescriptor, found {other}"
            )));
        }
    }

    if root.namespace.as_deref() != Some(MD_NS) {
        debug!(namespace = ?root.namespace, "Metadata root is outside the metadata namespace");
    }

    Ok(records)
}

fn collect_entities(
    container: &XmlElement,
    inherited: Freshness,
    now: DateTime<Utc>,
    out: &mut Vec<EntityRecord>,
) -> SamlResult<()> {
    let freshness = Freshness::read(container, inherited)?;
    for child in &container.children {
        match child.name.as_str() {
            "EntityDescriptor" => out.push(parse_entity(child, freshness, now)?),
            "EntitiesDescriptor" => collect_entities(child, freshness, now, out)?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_entity(
    entity: &XmlElement,
    inherited: Freshness,
    now: DateTime<Utc>,
) -> SamlResult<EntityRecord> {
    let entity_id = entity
        .attr("entityID")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SamlError::Metadata("EntityDescriptor without entityID".to_string()))?
        .to_string();

    let freshness = Freshness::read(entity, inherited)?;

    let key_descriptors: Vec<(KeyDescriptorUse, &XmlElement)> = entity
        .descendants("KeyDescriptor")
        .into_iter()
        .map(|kd| (KeyDescriptorUse::from_attr(kd.attr("use")), kd))
        .collect();

    let acs = entity.descendants("AssertionConsumerService");
    let slo = entity.descendants("SingleLogoutService");

    let mut record = EntityRecord::new(entity_id.clone(), freshness.resolve(&entity_id, now));
    record.signing_certificate = select_certificate(&key_descriptors, KeyDescriptorUse::Signing);
    record.encryption_certificate =
        select_certificate(&key_descriptors, KeyDescriptorUse::Encryption);
    record.assertion_consumer_service = select_endpoint(&acs);
    record.single_logout_service = select_endpoint(&slo);

    if record.signing_certificate.is_none() {
        debug!(entity_id = %entity_id, "Entity publishes no usable signing certificate");
    }

    Ok(record)
}

/// Picks the certificate for `wanted`.
///
/// Descriptors tagged `wanted` are scanned first, then untagged ones; the
/// first certificate that is non-blank and decodes wins.
#[must_use]
pub fn select_certificate(
    key_descriptors: &[(KeyDescriptorUse, &XmlElement)],
    wanted: KeyDescriptorUse,
) -> Option<Vec<u8>> {
    for priority in [wanted, KeyDescriptorUse::Unspecified] {
        for (usage, descriptor) in key_descriptors {
            if *usage != priority {
                continue;
            }
            for cert in descriptor.descendants("X509Certificate") {
                let text = cert.text_trimmed();
                if text.is_empty() {
                    continue;
                }
                if let Some(der) = kc_crypto::decode_certificate(text) {
                    return Some(der);
                }
            }
        }
    }
    None
}

/// Picks the endpoint to use from a list of declared service endpoints.
///
/// An endpoint flagged `isDefault="true"` with a browser binding wins;
/// otherwise the first endpoint with a browser binding in document order.
#[must_use]
pub fn select_endpoint(declared: &[&XmlElement]) -> Option<Endpoint> {
    let supported: Vec<(Endpoint, bool)> = declared
        .iter()
        .filter_map(|e| {
            let binding = SamlBinding::from_uri(e.attr("Binding")?.trim())?;
            let location = e.attr("Location")?.trim();
            let is_default = e.attr("isDefault").is_some_and(|v| v.trim() == "true");
            (binding.is_browser() && !location.is_empty()).then(|| {
                let endpoint = Endpoint {
                    location: location.to_string(),
                    binding,
                };
                (endpoint, is_default)
            })
        })
        .collect();

    let preferred = supported.iter().position(|(_, is_default)| *is_default);
    supported
        .into_iter()
        .nth(preferred.unwrap_or(0))
        .map(|(endpoint, _)| endpoint)
}

fn parse_instant(raw: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::Metadata(format!("invalid instant '{raw}': {e}")))
}

/// Parses an `xs:duration` such as `PT6H` or `P1DT30M`.
///
/// Years count as 365 days and months as 30 days.
///
/// ## Errors
///
/// Returns [`SamlError::Metadata`] for negative, malformed or
/// unrepresentably long durations.
pub fn parse_duration(raw: &str) -> SamlResult<Duration> {
    let invalid = || SamlError::Metadata(format!("invalid duration '{raw}'"));
    let out_of_range = || SamlError::Metadata(format!("duration '{raw}' is out of range"));
    let rest = raw.trim().strip_prefix('P').ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) if !t.is_empty() => (d, Some(t)),
        Some(_) => return Err(invalid()),
        None => (rest, None),
    };

    let mut total_ms: i64 = 0;
    let mut accumulate = |part: &str, units: &[(char, i64)]| -> SamlResult<()> {
        let mut number = String::new();
        let mut unit_index = 0;
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let position = units[unit_index..]
                .iter()
                .position(|(u, _)| *u == c)
                .ok_or_else(invalid)?;
            let (_, ms_per_unit) = units[unit_index + position];
            unit_index += position + 1;

            let value: f64 = number.parse().map_err(|_| invalid())?;
            number.clear();
            let part_ms = (value * ms_per_unit as f64).round();
            if !part_ms.is_finite() || part_ms >= i64::MAX as f64 {
                return Err(out_of_range());
            }
            total_ms = total_ms.checked_add(part_ms as i64).ok_or_else(out_of_range)?;
        }
        if number.is_empty() {
            Ok(())
        } else {
            Err(invalid())
        }
    };

    const SECOND: i64 = 1000;
    const DAY: i64 = 86_400 * SECOND;
    accumulate(date_part, &[('Y', 365 * DAY), ('M', 30 * DAY), ('D', DAY)])?;
    if let Some(time) = time_part {
        accumulate(time, &[('H', 3600 * SECOND), ('M', 60 * SECOND), ('S', SECOND)])?;
    }

    Duration::try_milliseconds(total_ms).ok_or_else(out_of_range)
}
