//! Discover the municipality → district → street → house hierarchy.
//!
//! Only the municipality listing is mandatory. Every level below it is allowed to be sparse:
//! a missing or broken response simply means the branch has no children.

use std::collections::BTreeSet;

use crate::{
    error::GeneratorError,
    upstream_client::{value_as_name, Payload, QueryParams, Upstream},
};

static MUNICIPALITIES_KEY: &str = "obce";
static REFERENCE_KEY: &str = "ov";

/// A street, addressed by its full path of names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreetPath {
    pub municipality: String,
    pub district: String,
    pub street: String,
}

/// A house with the reference code used to request its schedule.
///
/// The field order gives the catalog order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct House {
    pub municipality: String,
    pub district: String,
    pub street: String,
    pub reference: String,
    /// The upstream's internal identifier of the house.
    pub id: String,
}

impl House {
    fn same_address(&self, other: &House) -> bool {
        self.municipality == other.municipality
            && self.district == other.district
            && self.street == other.street
            && self.reference == other.reference
    }
}

/// List all municipalities known upstream.
///
/// This is the one query a run cannot do without.
pub async fn list_municipalities(upstream: &dyn Upstream) -> Result<Vec<String>, GeneratorError> {
    let municipalities: Vec<String> = match upstream.query(&QueryParams::init()).await {
        Ok(Payload::Map(map)) => match map.get(MUNICIPALITIES_KEY) {
            Some(serde_json::Value::Object(object)) => object.keys().cloned().collect(),
            Some(serde_json::Value::Array(array)) => {
                array.iter().filter_map(value_as_name).collect()
            }
            _ => vec![],
        },
        _ => vec![],
    };
    if municipalities.is_empty() {
        return Err(GeneratorError::NoMunicipalities);
    }
    Ok(municipalities)
}

/// Restrict the discovered municipalities to the allow-list, keeping discovery order.
///
/// An empty allow-list selects everything. Allowed names which were not discovered are
/// reported and otherwise ignored.
pub fn select_municipalities(discovered: Vec<String>, allowed: &[String]) -> Vec<String> {
    if allowed.is_empty() {
        return discovered;
    }
    let known: BTreeSet<&str> = discovered.iter().map(String::as_str).collect();
    for name in allowed {
        if !known.contains(name.as_str()) {
            log::warn!("municipality {name:?} is not offered upstream, skipping it");
        }
    }
    discovered
        .into_iter()
        .filter(|name| allowed.contains(name))
        .collect()
}

/// List the districts of a municipality.
pub async fn list_districts(upstream: &dyn Upstream, municipality: &str) -> Vec<String> {
    upstream
        .query(&QueryParams::districts(municipality))
        .await
        .map(|payload| payload.names())
        .unwrap_or_default()
}

/// List the streets of a district.
///
/// Some districts are not split into streets; those get a single street named after the
/// district itself.
pub async fn list_streets(
    upstream: &dyn Upstream,
    municipality: &str,
    district: &str,
) -> Vec<String> {
    match upstream.query(&QueryParams::streets(municipality, district)).await {
        Ok(Payload::Map(map)) if !map.is_empty() => map
            .iter()
            .map(|(key, value)| value_as_name(value).unwrap_or_else(|| key.clone()))
            .collect(),
        Ok(payload @ Payload::List(_)) if !payload.is_empty() => payload.names(),
        _ => vec![district.to_owned()],
    }
}

/// List the houses of a street.
///
/// A house without its own reference code is referenced by its internal identifier.
pub async fn list_houses(upstream: &dyn Upstream, street: &StreetPath) -> Vec<House> {
    let params = QueryParams::houses(&street.municipality, &street.district, &street.street);
    let Some(map) = upstream.query(&params).await.ok().and_then(Payload::into_map) else {
        return vec![];
    };
    map.into_iter()
        .map(|(id, record)| {
            let reference = record
                .get(REFERENCE_KEY)
                .and_then(value_as_name)
                .filter(|reference| !reference.trim().is_empty())
                .unwrap_or_else(|| id.clone());
            House {
                municipality: street.municipality.clone(),
                district: street.district.clone(),
                street: street.street.clone(),
                reference,
                id,
            }
        })
        .collect()
}

/// Sort houses into catalog order and drop those sharing an address.
pub fn dedup_houses(mut houses: Vec<House>) -> Vec<House> {
    houses.sort();
    houses.dedup_by(|a, b| a.same_address(b));
    houses
}
