use crate::error::{EngineResult, SnowballError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

// ── Year-indexed values ───────────────────────────────────────────────────────

/// A `(year, value)` pair. Serialized as a two-element JSON array, which is
/// how the scraper stores explicitly-dated series such as `GPs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearValue(pub i32, pub Option<f64>);

impl YearValue {
    pub fn year(&self) -> i32 {
        self.0
    }

    pub fn value(&self) -> Option<f64> {
        self.1
    }
}

/// Positional yearly series. `None` is a missing cell, distinct from `0.0`.
pub type Series = Vec<Option<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quarter {
    pub year: i32,
    pub number: u8,
    #[serde(default)]
    pub estimated: bool,
}

impl Quarter {
    /// Parse a header cell like `2023/06` or `2024/03(E)`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let estimated = text.ends_with("(E)");
        let text = text.trim_end_matches("(E)");
        let (year, month) = text.split_once('/')?;
        let year = year.trim().parse().ok()?;
        let month: u8 = month.trim().parse().ok()?;
        Some(Self { year, number: month / 3, estimated })
    }
}

/// Quarterly value, `[quarter, value]` on the wire. The quarter cell is null
/// when the scraped header could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuarterValue(pub Option<Quarter>, pub Option<f64>);

// ── Positional series names ───────────────────────────────────────────────────

/// The positional series a stock document may carry. Each is anchored to
/// calendar years through `last_year_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesField {
    Roe,
    Pbr,
    Per,
    Eps,
    Bps,
    Dps,
    NetProfit,
    Cfo,
    Cfi,
    Cff,
    Fcf,
    TotalAssets,
    TotalIssued,
    Debt,
}

impl SeriesField {
    pub const ALL: [SeriesField; 14] = [
        SeriesField::Roe,
        SeriesField::Pbr,
        SeriesField::Per,
        SeriesField::Eps,
        SeriesField::Bps,
        SeriesField::Dps,
        SeriesField::NetProfit,
        SeriesField::Cfo,
        SeriesField::Cfi,
        SeriesField::Cff,
        SeriesField::Fcf,
        SeriesField::TotalAssets,
        SeriesField::TotalIssued,
        SeriesField::Debt,
    ];

    /// Document key of the series.
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesField::Roe => "ROEs",
            SeriesField::Pbr => "PBRs",
            SeriesField::Per => "PERs",
            SeriesField::Eps => "EPSs",
            SeriesField::Bps => "BPSs",
            SeriesField::Dps => "DPSs",
            SeriesField::NetProfit => "NPs",
            SeriesField::Cfo => "CFOs",
            SeriesField::Cfi => "CFIs",
            SeriesField::Cff => "CFFs",
            SeriesField::Fcf => "FCFs",
            SeriesField::TotalAssets => "TAs",
            SeriesField::TotalIssued => "TIs",
            SeriesField::Debt => "DEPTs",
        }
    }
}

impl fmt::Display for SeriesField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesField {
    type Err = SnowballError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SeriesField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SnowballError::UnknownSeries(s.to_string()))
    }
}

// ── Stock document ────────────────────────────────────────────────────────────

/// Scraped values are frequently `null`; treat those like absent fields.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One stock as persisted in the document store.
///
/// Known raw fields are typed. Everything else (memoized engine output, rank
/// fields, scraper extras) lands in `extra` and survives a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub code: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,

    #[serde(default, deserialize_with = "nullable")]
    pub current_price: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub bps: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub per: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub pbr: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub dividend_rate: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub beta: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub foreigner_weight: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub floating_rate: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub month1: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub month3: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub month6: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub month12: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub relative_earning_rate: f64,
    /// Market capitalisation.
    #[serde(default, deserialize_with = "nullable")]
    pub agg_value: f64,

    /// Position of the latest completed fiscal year inside every positional series.
    #[serde(default)]
    pub last_year_index: Option<usize>,

    #[serde(rename = "ROEs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub roes: Series,
    #[serde(rename = "PBRs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub pbrs: Series,
    #[serde(rename = "PERs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub pers: Series,
    #[serde(rename = "EPSs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub epss: Series,
    #[serde(rename = "BPSs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub bpss: Series,
    #[serde(rename = "DPSs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub dpss: Series,
    #[serde(rename = "NPs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub nps: Series,
    #[serde(rename = "CFOs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub cfos: Series,
    #[serde(rename = "CFIs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub cfis: Series,
    #[serde(rename = "CFFs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub cffs: Series,
    #[serde(rename = "FCFs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub fcfs: Series,
    #[serde(rename = "TAs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub tas: Series,
    #[serde(rename = "TIs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub tis: Series,
    #[serde(rename = "DEPTs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub depts: Series,

    #[serde(rename = "GPs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub gps: Vec<YearValue>,
    #[serde(rename = "PCRs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub pcrs: Vec<YearValue>,
    #[serde(rename = "PSRs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub psrs: Vec<YearValue>,
    #[serde(rename = "ROICs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub roics: Vec<YearValue>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub current_assets: Vec<YearValue>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub current_liability: Vec<YearValue>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub total_liability: Vec<YearValue>,
    #[serde(rename = "QROEs", default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub qroes: Vec<QuarterValue>,

    // User overrides
    #[serde(default, deserialize_with = "nullable")]
    pub adjusted_future_roe: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub adjusted_future_pbr: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub my_price: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub note: String,
    #[serde(default, deserialize_with = "nullable")]
    pub starred: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub owned: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub doubtful: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StockRecord {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into(), ..Default::default() }
    }

    /// Build a record from a stored JSON document.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn series(&self, field: SeriesField) -> &[Option<f64>] {
        match field {
            SeriesField::Roe => &self.roes,
            SeriesField::Pbr => &self.pbrs,
            SeriesField::Per => &self.pers,
            SeriesField::Eps => &self.epss,
            SeriesField::Bps => &self.bpss,
            SeriesField::Dps => &self.dpss,
            SeriesField::NetProfit => &self.nps,
            SeriesField::Cfo => &self.cfos,
            SeriesField::Cfi => &self.cfis,
            SeriesField::Cff => &self.cffs,
            SeriesField::Fcf => &self.fcfs,
            SeriesField::TotalAssets => &self.tas,
            SeriesField::TotalIssued => &self.tis,
            SeriesField::Debt => &self.depts,
        }
    }

    /// First non-empty positional series, if any. Used to report which
    /// series made a missing anchor fatal.
    pub fn first_present_series(&self) -> Option<SeriesField> {
        SeriesField::ALL.iter().copied().find(|f| !self.series(*f).is_empty())
    }

    /// Numeric value of an unmodeled document field (memoized output,
    /// rank fields). Booleans read as 0/1, everything else as absent.
    pub fn extra_number(&self, key: &str) -> Option<f64> {
        match self.extra.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl fmt::Display for StockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.title, self.code)
    }
}

// ── Patch ─────────────────────────────────────────────────────────────────────

/// A partial document keyed by `code`.
///
/// Applying a patch sets or overwrites only the keys it carries; every other
/// key of the stored document is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockPatch(Map<String, Value>);

impl StockPatch {
    pub fn new(code: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("code".to_string(), Value::String(code.into()));
        Self(map)
    }

    /// Wrap a raw JSON document. It must be an object with a string `code`.
    pub fn from_value(value: Value) -> EngineResult<Self> {
        let Value::Object(map) = value else {
            return Err(SnowballError::InvalidPatch("document is not a JSON object".into()));
        };
        match map.get("code") {
            Some(Value::String(code)) if !code.trim().is_empty() => Ok(Self(map)),
            _ => Err(SnowballError::InvalidPatch("missing string field `code`".into())),
        }
    }

    pub fn code(&self) -> &str {
        self.0.get("code").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of keys besides `code`.
    pub fn field_count(&self) -> usize {
        self.0.keys().filter(|k| k.as_str() != "code").count()
    }

    /// Overlay this patch onto an existing document.
    pub fn merge_into(&self, doc: &mut Map<String, Value>) {
        for (k, v) in &self.0 {
            doc.insert(k.clone(), v.clone());
        }
    }
}

// ── Filters ───────────────────────────────────────────────────────────────────

/// One predicate clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOption {
    pub key: String,
    pub title: String,
    pub more_than: bool,
    pub value: Option<f64>,
    pub is_boolean: bool,
}

/// One axis of a composite ranking. `ascending` means rank 1 is the smallest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankOption {
    pub key: String,
    pub title: String,
    pub ascending: bool,
}

/// Option as stored inside a filter document, discriminated by `is_rankoption`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOption {
    pub id: u32,
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_rankoption: bool,
    #[serde(default)]
    pub more_than: bool,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub is_boolean: bool,
    #[serde(default)]
    pub ascending: bool,
}

impl StoredOption {
    pub fn filter(id: u32, option: &FilterOption) -> Self {
        Self {
            id,
            key: option.key.clone(),
            title: option.title.clone(),
            is_rankoption: false,
            more_than: option.more_than,
            value: option.value,
            is_boolean: option.is_boolean,
            ascending: false,
        }
    }

    pub fn rank(id: u32, option: &RankOption) -> Self {
        Self {
            id,
            key: option.key.clone(),
            title: option.title.clone(),
            is_rankoption: true,
            more_than: false,
            value: None,
            is_boolean: false,
            ascending: option.ascending,
        }
    }

    pub fn as_filter_option(&self) -> Option<FilterOption> {
        (!self.is_rankoption).then(|| FilterOption {
            key: self.key.clone(),
            title: self.title.clone(),
            more_than: self.more_than,
            value: self.value,
            is_boolean: self.is_boolean,
        })
    }

    pub fn as_rank_option(&self) -> Option<RankOption> {
        self.is_rankoption.then(|| RankOption {
            key: self.key.clone(),
            title: self.title.clone(),
            ascending: self.ascending,
        })
    }
}

/// A named, persisted set of filter and rank options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub options: Vec<StoredOption>,
}

impl Filter {
    pub fn filter_options(&self) -> Vec<FilterOption> {
        self.options.iter().filter_map(StoredOption::as_filter_option).collect()
    }

    pub fn rank_options(&self) -> Vec<RankOption> {
        self.options.iter().filter_map(StoredOption::as_rank_option).collect()
    }

    fn next_option_id(&self) -> u32 {
        self.options.iter().map(|o| o.id).max().map_or(1, |id| id + 1)
    }

    pub fn push_filter_option(&mut self, option: &FilterOption) -> u32 {
        let id = self.next_option_id();
        self.options.push(StoredOption::filter(id, option));
        id
    }

    pub fn push_rank_option(&mut self, option: &RankOption) -> u32 {
        let id = self.next_option_id();
        self.options.push(StoredOption::rank(id, option));
        id
    }

    /// Returns false when no option carries `option_id`.
    pub fn remove_option(&mut self, option_id: u32) -> bool {
        let before = self.options.len();
        self.options.retain(|o| o.id != option_id);
        self.options.len() != before
    }
}

// ── Query inputs ──────────────────────────────────────────────────────────────

/// Coarse selection applied by the store before the engine sees the documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Starred,
    Owned,
    StarredOrOwned,
    Doubtful,
    /// All stocks, keeping the ones with a negative expected rate.
    Bad,
}

impl StatusFilter {
    /// Whether the base expected-rate sign filter applies at all.
    pub fn filter_by_expected_rate(&self) -> bool {
        matches!(self, StatusFilter::All | StatusFilter::Bad)
    }

    /// `true` keeps positive expected rates, `false` keeps negative ones.
    pub fn filter_bad(&self) -> bool {
        !matches!(self, StatusFilter::Bad)
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Ok(StatusFilter::All),
            "starred" => Ok(StatusFilter::Starred),
            "owned" => Ok(StatusFilter::Owned),
            "starredorowned" | "starred-or-owned" => Ok(StatusFilter::StarredOrOwned),
            "doubtful" => Ok(StatusFilter::Doubtful),
            "bad" => Ok(StatusFilter::Bad),
            other => Err(format!("unknown status filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ordering {
    Asc,
    #[default]
    Desc,
}

impl FromStr for Ordering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Ordering::Asc),
            "desc" => Ok(Ordering::Desc),
            other => Err(format!("unknown ordering: {other}")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
