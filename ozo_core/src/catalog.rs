//! The index of all calendar artifacts produced by a run.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::hierarchy::House;

/// Where the calendar of one address was written.
///
/// The serialized field names are the ones consumers of `index.json` know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRecord {
    #[serde(rename = "obec")]
    pub municipality: String,
    #[serde(rename = "obvod")]
    pub district: String,
    #[serde(rename = "ulice")]
    pub street: String,
    #[serde(rename = "cislo")]
    pub reference: String,
    pub path: String,
}

impl CatalogRecord {
    pub fn new(house: &House, path: String) -> Self {
        Self {
            municipality: house.municipality.clone(),
            district: house.district.clone(),
            street: house.street.clone(),
            reference: house.reference.clone(),
            path,
        }
    }

    fn sort_key(&self) -> (&str, &str, &str, &str) {
        (
            self.municipality.as_str(),
            self.district.as_str(),
            self.street.as_str(),
            self.reference.as_str(),
        )
    }
}

/// All records of a run, in their published order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    records: Vec<CatalogRecord>,
}

impl Catalog {
    /// Order records by municipality, district, street and reference code.
    ///
    /// The order records arrived in has no influence on the result.
    pub fn assemble(mut records: Vec<CatalogRecord>) -> Self {
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self { records }
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the catalog to `path`, replacing any previous one.
    pub async fn write(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }
}
