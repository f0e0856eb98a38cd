use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use histo_core::config::VWorldConfig;
use histo_core::Record;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::source::{param_bool, param_str, param_u64, RecordSource, SourceParams};

pub const VWORLD_SEARCH_ENDPOINT: &str = "https://api.vworld.kr/req/search";
pub const DEFAULT_CRS: &str = "EPSG:4326";
pub const DEFAULT_SIZE: u32 = 10;
pub const MAX_SIZE: u32 = 1000;

/// Address category used by the search API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchCategory {
    /// 도로명 주소.
    Road,
    /// 지번 주소.
    #[default]
    Parcel,
}

impl SearchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Road => "ROAD",
            Self::Parcel => "PARCEL",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Road => Self::Parcel,
            Self::Parcel => Self::Road,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ROAD" => Some(Self::Road),
            "PARCEL" => Some(Self::Parcel),
            _ => None,
        }
    }
}

/// One address search request.
#[derive(Debug, Clone)]
pub struct AddressQuery {
    pub address: String,
    /// Used when the address does not look like a road address.
    pub category: SearchCategory,
    pub crs: String,
    pub size: u32,
    pub page: u32,
    /// `[min_x, min_y, max_x, max_y]`.
    pub bbox: Option<Vec<f64>>,
    /// Keep only items whose road or parcel address matches the query's
    /// name and number.
    pub exact_match: bool,
}

impl AddressQuery {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            category: SearchCategory::default(),
            crs: DEFAULT_CRS.to_string(),
            size: DEFAULT_SIZE,
            page: 1,
            bbox: None,
            exact_match: false,
        }
    }

    pub fn category(mut self, category: SearchCategory) -> Self {
        self.category = category;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn bbox(mut self, bbox: Vec<f64>) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn exact_match(mut self, exact: bool) -> Self {
        self.exact_match = exact;
        self
    }

    pub fn validate(&self) -> Result<(), SourceError> {
        if self.address.trim().is_empty() {
            return Err(SourceError::InvalidArgument("address must not be empty".into()));
        }
        if self.size == 0 || self.size > MAX_SIZE {
            return Err(SourceError::InvalidArgument(format!(
                "size must be between 1 and {MAX_SIZE}"
            )));
        }
        if self.page == 0 {
            return Err(SourceError::InvalidArgument("page must be at least 1".into()));
        }
        if let Some(bbox) = &self.bbox {
            if bbox.len() != 4 {
                return Err(SourceError::InvalidArgument(
                    "bbox must contain exactly four values".into(),
                ));
            }
        }
        Ok(())
    }

    /// Category tried first: road-style addresses go to ROAD, everything
    /// else to the requested category.
    pub fn primary_category(&self) -> SearchCategory {
        if looks_like_road_address(&self.address) {
            SearchCategory::Road
        } else {
            self.category
        }
    }
}

/// `12길`, `3 로`, `12번길`.
static NUMBERED_ROAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*(?:로|길|번길)").expect("static road regex"));

/// `세종대로 1`, `테헤란로1`.
static NAMED_ROAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d\s]+(?:로|길)\s*\d").expect("static road regex"));

static ROAD_PARTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^\d\s]{1,}(?:로|길))\s*(\d+(?:-\d+)?)").expect("static road parts regex")
});

static PARCEL_PARTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^\d\s]{1,})(?:동|리|가)?\s*(\d+(?:-\d+)?)").expect("static parcel parts regex")
});

/// True when the address contains a road-name marker next to a number,
/// e.g. `세종대로 175`, `테헤란로12길`, `12번길`.
pub fn looks_like_road_address(address: &str) -> bool {
    NUMBERED_ROAD.is_match(address) || NAMED_ROAD.is_match(address)
}

/// Items whose road (or parcel) address has the same name and number as
/// `address`. Everything is kept when `address` has no recognizable parts.
pub fn filter_exact_matches(address: &str, category: SearchCategory, items: &[Value]) -> Vec<Value> {
    let (pattern, field) = match category {
        SearchCategory::Road => (&*ROAD_PARTS, "road"),
        SearchCategory::Parcel => (&*PARCEL_PARTS, "parcel"),
    };
    let Some((name, number)) = name_and_number(pattern, address) else {
        return items.to_vec();
    };

    items
        .iter()
        .filter(|item| {
            let candidate = item
                .get("address")
                .and_then(|a| a.get(field))
                .and_then(Value::as_str)
                .unwrap_or_default();
            name_and_number(pattern, candidate).is_some_and(|(n, no)| n == name && no == number)
        })
        .cloned()
        .collect()
}

/// Name and `N` / `N-M` number captured by `pattern`, retried with spaces
/// removed when nothing matches (`세종대 로 110`).
fn name_and_number(pattern: &Regex, value: &str) -> Option<(String, String)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let captures = |text: &str| {
        pattern
            .captures(text)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
    };
    captures(value).or_else(|| captures(&value.replace(' ', "")))
}

/// Outcome of one search call after status normalization.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// `OK` or `NOT_FOUND`.
    pub status: String,
    pub category: SearchCategory,
    /// The `response` block, with `result.items` always present.
    pub response: Value,
}

impl SearchOutcome {
    pub fn is_not_found(&self) -> bool {
        self.status == "NOT_FOUND"
    }

    pub fn items(&self) -> &[Value] {
        self.response
            .pointer("/result/items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drop items whose address does not match `address` in this outcome's
    /// category.
    pub fn retain_exact_matches(&mut self, address: &str) {
        let kept = filter_exact_matches(address, self.category, self.items());
        if let Some(items) = self.response.pointer_mut("/result/items") {
            *items = Value::Array(kept);
        }
    }

    /// Flatten result items into records, renaming `id` to `item_id`.
    pub fn to_records(&self) -> Result<Vec<Record>, SourceError> {
        self.items().iter().map(item_to_record).collect()
    }
}

fn item_to_record(item: &Value) -> Result<Record, SourceError> {
    let mut flat = Record::from_json_object(item)?;
    let mut record = Record::new();
    if let Some(id) = flat.remove("id") {
        record.insert("item_id", id);
    }
    for (name, value) in flat.iter() {
        record.insert(name, value.clone());
    }
    Ok(record)
}

/// Interpret a raw search response body.
///
/// `NOT_FOUND` becomes an outcome with an empty item list. Every other
/// non-`OK` status is an API error carrying the service's error text.
pub fn parse_search_response(body: &str, category: SearchCategory) -> Result<SearchOutcome, SourceError> {
    let payload: Value =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(format!("invalid JSON: {e}")))?;
    let mut response = payload
        .get("response")
        .filter(|r| r.is_object())
        .cloned()
        .ok_or_else(|| SourceError::Decode("missing 'response' object".into()))?;

    let status = response
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match status.as_str() {
        "OK" | "NOT_FOUND" => ensure_items(&mut response),
        _ => {
            let message = response
                .get("error")
                .and_then(|e| match e {
                    Value::Object(map) => map
                        .get("text")
                        .or_else(|| map.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(SourceError::Api {
                service: "VWorld search".into(),
                status: if status.is_empty() { "UNKNOWN".into() } else { status },
                message,
            });
        }
    }

    Ok(SearchOutcome {
        status,
        category,
        response,
    })
}

/// Make `result.items` an array, keeping an existing one.
fn ensure_items(response: &mut Value) {
    let Some(obj) = response.as_object_mut() else {
        return;
    };
    let result = obj
        .entry("result")
        .or_insert_with(|| Value::Object(Default::default()));
    if !result.is_object() {
        *result = Value::Object(Default::default());
    }
    if let Some(result) = result.as_object_mut() {
        if !result.get("items").is_some_and(Value::is_array) {
            result.insert("items".into(), Value::Array(Vec::new()));
        }
    }
}

/// HTTP client for the VWorld address search API.
pub struct VWorldClient {
    client: Client,
    endpoint: String,
    api_key: String,
    domain: Option<String>,
}

impl VWorldClient {
    pub fn new(api_key: impl Into<String>, domain: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SourceError::InvalidArgument("VWorld API key is required".into()));
        }
        if timeout.is_zero() {
            return Err(SourceError::InvalidArgument("timeout must be positive".into()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: VWORLD_SEARCH_ENDPOINT.to_string(),
            api_key,
            domain: domain.filter(|d| !d.trim().is_empty()),
        })
    }

    pub fn from_config(config: &VWorldConfig) -> Result<Self, SourceError> {
        let api_key = config.api_key.clone().unwrap_or_default();
        Self::new(
            api_key,
            config.domain.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Query parameters shared by every category attempt.
    pub fn base_params(&self, query: &AddressQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("service", "search".to_string()),
            ("request", "search".to_string()),
            ("version", "2.0".to_string()),
            ("format", "json".to_string()),
            ("errorformat", "json".to_string()),
            ("type", "address".to_string()),
            ("crs", query.crs.clone()),
            ("size", query.size.to_string()),
            ("page", query.page.to_string()),
            ("query", query.address.trim().to_string()),
            ("key", self.api_key.trim().to_string()),
        ];
        if let Some(bbox) = &query.bbox {
            let joined = bbox.iter().map(f64::to_string).collect::<Vec<_>>().join(",");
            params.push(("bbox", joined));
        }
        if let Some(domain) = &self.domain {
            params.push(("domain", domain.clone()));
        }
        params
    }

    /// Search an address, retrying with the other category when the first
    /// attempt finds nothing.
    pub async fn search_address(&self, query: &AddressQuery) -> Result<SearchOutcome, SourceError> {
        query.validate()?;
        let params = self.base_params(query);
        let primary = query.primary_category();

        let mut outcome = self.request(&params, primary).await?;
        if outcome.is_not_found() {
            debug!(
                address = %query.address,
                from = primary.as_str(),
                to = primary.other().as_str(),
                "No address match, trying other category"
            );
            outcome = self.request(&params, primary.other()).await?;
        }

        if query.exact_match && !outcome.is_not_found() {
            outcome.retain_exact_matches(&query.address);
        }
        Ok(outcome)
    }

    async fn request(
        &self,
        params: &[(&'static str, String)],
        category: SearchCategory,
    ) -> Result<SearchOutcome, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .query(&[("category", category.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                service: "VWorld search".into(),
                status: status.as_u16().to_string(),
                message: body,
            });
        }

        let body = response.text().await?;
        parse_search_response(&body, category)
    }
}

/// Record source exposing address search as `vworld`.
pub struct VWorldSource {
    client: VWorldClient,
}

impl VWorldSource {
    pub fn new(client: VWorldClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &VWorldClient {
        &self.client
    }
}

/// Build an [`AddressQuery`] from job parameters.
pub fn query_from_params(params: &SourceParams) -> Result<AddressQuery, SourceError> {
    let address = param_str(params, "address")?
        .ok_or_else(|| SourceError::InvalidArgument("'address' parameter is required".into()))?;
    let mut query = AddressQuery::new(address);

    if let Some(category) = param_str(params, "category")? {
        query.category = SearchCategory::parse(category).ok_or_else(|| {
            SourceError::InvalidArgument(format!("unknown category '{category}', expected ROAD or PARCEL"))
        })?;
    }
    if let Some(crs) = param_str(params, "crs")? {
        query.crs = crs.to_string();
    }
    if let Some(size) = param_u64(params, "size")? {
        query.size = u32::try_from(size).unwrap_or(u32::MAX);
    }
    if let Some(page) = param_u64(params, "page")? {
        query.page = u32::try_from(page).unwrap_or(u32::MAX);
    }
    if let Some(exact) = param_bool(params, "exact_match")? {
        query.exact_match = exact;
    }
    if let Some(bbox) = params.get("bbox").filter(|v| !v.is_null()) {
        let values = bbox
            .as_array()
            .ok_or_else(|| SourceError::InvalidArgument("'bbox' must be an array of numbers".into()))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| SourceError::InvalidArgument("'bbox' must be an array of numbers".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        query.bbox = Some(values);
    }
    Ok(query)
}

#[async_trait]
impl RecordSource for VWorldSource {
    fn name(&self) -> &str {
        "vworld"
    }

    async fn fetch(&self, params: &SourceParams) -> Result<Vec<Record>, SourceError> {
        let query = query_from_params(params)?;
        let outcome = self.client.search_address(&query).await?;
        let records = outcome.to_records()?;
        info!(
            address = %query.address,
            category = outcome.category.as_str(),
            count = records.len(),
            "VWorld address search complete"
        );
        Ok(records)
    }
}
