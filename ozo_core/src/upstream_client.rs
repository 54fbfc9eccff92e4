//! This client queries the OZO pickup endpoint and decodes its loosely typed answers.
//!
//! The endpoint answers with JSON, but sometimes it leaks PHP diagnostics into the body and
//! it is not consistent about returning lists or mappings. Both problems are dealt with here,
//! so everything behind [`Upstream::query`] sees a [`Payload`] or an [`Absent`].

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{config::GeneratorConfig, error::Absent};

static DIAGNOSTIC_MARKERS: [&str; 3] = ["Notice:", "Warning:", "Fatal error:"];

/// The filter parameters understood by the endpoint.
///
/// Unset parameters are left out of the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct QueryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<u8>,
    #[serde(rename = "druh", skip_serializing_if = "Option::is_none")]
    pub kind: Option<i8>,
    #[serde(rename = "obec", skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(rename = "obvod", skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(rename = "ulice", skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(rename = "cisp", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mgr: Option<u8>,
}

/// Kind discriminator used for every listing and schedule query.
const KIND_ALL: i8 = -1;

impl QueryParams {
    /// The bootstrap query listing all municipalities.
    pub fn init() -> Self {
        Self {
            init: Some(1),
            ..Self::default()
        }
    }

    pub fn districts(municipality: &str) -> Self {
        Self {
            kind: Some(KIND_ALL),
            municipality: Some(municipality.to_owned()),
            ..Self::default()
        }
    }

    pub fn streets(municipality: &str, district: &str) -> Self {
        Self {
            district: Some(district.to_owned()),
            ..Self::districts(municipality)
        }
    }

    pub fn houses(municipality: &str, district: &str, street: &str) -> Self {
        Self {
            street: Some(street.to_owned()),
            mgr: Some(0),
            ..Self::streets(municipality, district)
        }
    }

    /// The pickup schedule of one house. The endpoint does not want the municipality here.
    pub fn schedule(district: &str, street: &str, reference: &str) -> Self {
        Self {
            kind: Some(KIND_ALL),
            district: Some(district.to_owned()),
            street: Some(street.to_owned()),
            reference: Some(reference.to_owned()),
            ..Self::default()
        }
    }
}

/// A decoded response body: the endpoint answers with either shape for the same query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    List(Vec<Value>),
    Map(Map<String, Value>),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::List(list) => list.is_empty(),
            Payload::Map(map) => map.is_empty(),
        }
    }

    /// The names this payload lists: the scalar items of a list or the keys of a mapping.
    pub fn names(&self) -> Vec<String> {
        match self {
            Payload::List(list) => list.iter().filter_map(value_as_name).collect(),
            Payload::Map(map) => map.keys().cloned().collect(),
        }
    }

    pub fn into_map(self) -> Option<Map<String, Value>> {
        match self {
            Payload::Map(map) => Some(map),
            Payload::List(_) => None,
        }
    }
}

/// Read a scalar JSON value as a name. Numbers are accepted since the endpoint mixes both.
pub fn value_as_name(value: &Value) -> Option<String> {
    match value {
        Value::String(string) => Some(string.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Decode a raw response body.
pub fn decode_body(body: &str) -> Result<Payload, Absent> {
    let text = body.trim();
    if text.is_empty() {
        return Err(Absent::EmptyBody);
    }
    if DIAGNOSTIC_MARKERS.iter().any(|marker| text.contains(marker)) {
        return Err(Absent::Diagnostic);
    }
    Ok(serde_json::from_str(text)?)
}

/// Something which answers endpoint queries.
///
/// Implementations never fail loudly: any fault is an [`Absent`].
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn query(&self, params: &QueryParams) -> Result<Payload, Absent>;
}

/// The real endpoint, reached over HTTP.
///
/// One instance is created per run and shared by all workers.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    endpoint: String,
}

impl HttpUpstream {
    /// Build a client whose connection pool matches the worker pool.
    pub fn new(config: &GeneratorConfig) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.worker_count())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn query(&self, params: &QueryParams) -> Result<Payload, Absent> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .send()
            .await?;
        let body = response.text().await?;
        let payload = decode_body(&body);
        if let Err(absent) = &payload {
            log::debug!("no data for {params:?}: {absent}");
        }
        payload
    }
}
