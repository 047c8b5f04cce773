//! Builds REST query parameters from listing state.
//!
//! Filter parameters hold user-chosen values only. The reserved keys
//! (`__order`, `__page`, `__page_size`) are always derived here, on a fresh
//! [`QueryParams`], so the count and rows requests never share state.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AdminError, AdminResult};

pub const ORDER_KEY: &str = "__order";
pub const PAGE_KEY: &str = "__page";
pub const PAGE_SIZE_KEY: &str = "__page_size";
pub const READABLE_KEY: &str = "__readable";

const RESERVED_KEYS: [&str; 4] = [ORDER_KEY, PAGE_KEY, PAGE_SIZE_KEY, READABLE_KEY];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// One column and direction of a composite sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByConfig {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderByConfig {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

impl fmt::Display for OrderByConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ascending {
            f.write_str(&self.column)
        } else {
            write!(f, "-{}", self.column)
        }
    }
}

/// Join configs as `col,-other`. Empty input gives an empty string.
pub fn build_order_by_string(configs: &[OrderByConfig]) -> String {
    configs
        .iter()
        .map(OrderByConfig::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`build_order_by_string`]. A leading `-` marks descending.
pub fn parse_order_by_string(s: &str) -> AdminResult<Vec<OrderByConfig>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }

    s.split(',')
        .map(|part| {
            let (column, ascending) = match part.strip_prefix('-') {
                Some(column) => (column, false),
                None => (part, true),
            };
            if column.is_empty() || column.starts_with('-') {
                return Err(AdminError::InvalidOrderBy(s.to_string()));
            }
            Ok(OrderByConfig {
                column: column.to_string(),
                ascending,
            })
        })
        .collect()
}

/// A filter value: a single scalar or a list sent as repeated keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(String),
    List(Vec<String>),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Scalar(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Scalar(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Scalar(value.to_string())
    }
}

impl From<usize> for FilterValue {
    fn from(value: usize) -> Self {
        FilterValue::Scalar(value.to_string())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Scalar(value.to_string())
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::List(values)
    }
}

impl FilterValue {
    /// Convert a JSON value as received from callers of the daemon.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::String(s) => Some(FilterValue::Scalar(s.clone())),
            Value::Array(items) => Some(FilterValue::List(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            )),
            other => Some(FilterValue::Scalar(other.to_string())),
        }
    }
}

/// User-chosen filters keyed by column name.
pub type FilterParams = IndexMap<String, FilterValue>;

/// Request parameters for a single call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(IndexMap<String, FilterValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    /// Scalar value of `key`, if it holds one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(FilterValue::Scalar(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten to key/value pairs; lists become repeated keys.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            match value {
                FilterValue::Scalar(v) => pairs.push((key.clone(), v.clone())),
                FilterValue::List(values) => {
                    pairs.extend(values.iter().map(|v| (key.clone(), v.clone())))
                }
            }
        }
        pairs
    }

    fn from_filters(filters: &FilterParams) -> Self {
        Self(
            filters
                .iter()
                .filter(|(key, _)| !is_reserved_key(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }
}

/// Parameters for the count endpoint. Ordering and paging don't apply.
pub fn build_count_params(filters: &FilterParams) -> QueryParams {
    QueryParams::from_filters(filters)
}

/// Parameters for the rows endpoint. `__order` is omitted when empty.
pub fn build_listing_params(
    filters: &FilterParams,
    order_by: &[OrderByConfig],
    page: usize,
    page_size: usize,
) -> QueryParams {
    let mut params = QueryParams::from_filters(filters);

    let order = build_order_by_string(order_by);
    if !order.is_empty() {
        params.insert(ORDER_KEY, order);
    }
    params.insert(PAGE_KEY, page);
    params.insert(PAGE_SIZE_KEY, page_size);

    params
}

/// Parameters for the ids endpoint used by reference pickers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdsQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl IdsQuery {
    /// Only set, non-empty values are sent.
    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            params.insert("search", search);
        }
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            params.insert("limit", limit);
        }
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            params.insert("offset", offset);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_order_by_string() {
        let configs = vec![OrderByConfig::desc("rating"), OrderByConfig::asc("name")];
        assert_eq!(build_order_by_string(&configs), "-rating,name");
        assert_eq!(build_order_by_string(&[]), "");
    }

    #[test]
    fn test_parse_order_by_string() {
        assert_eq!(
            parse_order_by_string("-rating,name").unwrap(),
            vec![OrderByConfig::desc("rating"), OrderByConfig::asc("name")]
        );
        assert!(parse_order_by_string("").unwrap().is_empty());
    }

    #[test]
    fn test_order_by_round_trip() {
        let cases = vec![
            vec![OrderByConfig::asc("id")],
            vec![OrderByConfig::desc("id")],
            vec![
                OrderByConfig::asc("director"),
                OrderByConfig::desc("box_office"),
                OrderByConfig::asc("name"),
            ],
            vec![OrderByConfig::asc(" padded "), OrderByConfig::desc("trailing ")],
        ];
        for configs in cases {
            let built = build_order_by_string(&configs);
            assert_eq!(parse_order_by_string(&built).unwrap(), configs);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_order_by_string("name,,id").is_err());
        assert!(parse_order_by_string("-").is_err());
        assert!(parse_order_by_string("--name").is_err());
    }

    #[test]
    fn test_listing_params_omit_empty_order() {
        let mut filters = FilterParams::new();
        filters.insert("name".into(), "Star Wars".into());

        let params = build_listing_params(&filters, &[], 2, 15);
        assert!(!params.contains_key(ORDER_KEY));
        assert_eq!(params.get_str("name"), Some("Star Wars"));
        assert_eq!(params.get_str(PAGE_KEY), Some("2"));
        assert_eq!(params.get_str(PAGE_SIZE_KEY), Some("15"));
    }

    #[test]
    fn test_listing_params_do_not_mutate_filters() {
        let mut filters = FilterParams::new();
        filters.insert("oscar_nominations".into(), 3i64.into());
        let before = filters.clone();

        let params = build_listing_params(&filters, &[OrderByConfig::desc("id")], 1, 15);
        assert_eq!(params.get_str(ORDER_KEY), Some("-id"));
        assert_eq!(filters, before);
    }

    #[test]
    fn test_count_params_strip_reserved_keys() {
        let mut filters = FilterParams::new();
        filters.insert("name".into(), "Alien".into());
        filters.insert(ORDER_KEY.into(), "-id".into());
        filters.insert(PAGE_KEY.into(), "3".into());

        let params = build_count_params(&filters);
        assert_eq!(params.len(), 1);
        assert!(!params.contains_key(ORDER_KEY));
        assert!(!params.contains_key(PAGE_KEY));
    }

    #[test]
    fn test_list_values_become_repeated_pairs() {
        let mut filters = FilterParams::new();
        filters.insert("genre".into(), vec!["1".to_string(), "3".to_string()].into());

        let pairs = build_count_params(&filters).to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("genre".to_string(), "1".to_string()),
                ("genre".to_string(), "3".to_string())
            ]
        );
    }

    #[test]
    fn test_ids_query_skips_unset_values() {
        let query = IdsQuery {
            search: Some(String::new()),
            limit: Some(5),
            offset: Some(0),
        };
        let params = query.to_params();
        assert_eq!(params.len(), 1);
        assert_eq!(params.get_str("limit"), Some("5"));
    }

    #[test]
    fn test_filter_value_from_json() {
        use serde_json::json;
        assert_eq!(FilterValue::from_json(&json!(null)), None);
        assert_eq!(FilterValue::from_json(&json!(42)), Some("42".into()));
        assert_eq!(FilterValue::from_json(&json!(true)), Some("true".into()));
        assert_eq!(
            FilterValue::from_json(&json!(["a", 2])),
            Some(FilterValue::List(vec!["a".into(), "2".into()]))
        );
    }
}
