//! Query normalization for collection reads.
//!
//! Turns raw query-string parameters into the engine's [`FindManyArgs`] and
//! derives the content hash used in collection cache keys.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::engine::{FindManyArgs, SortOrder};
use crate::error::{AppError, AppResult, FieldIssue};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const DEFAULT_SORT_BY: &str = "createdAt";
pub const DEFAULT_ORDER: SortOrder = SortOrder::Desc;

const RESERVED: [&str; 4] = ["page", "limit", "sortBy", "order"];

// == Normalized Query ==
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    pub page: u64,
    pub limit: u64,
    pub args: FindManyArgs,
}

/// Normalizes `{page, limit, sortBy, order, ...filters}`.
///
/// Every other parameter becomes an equality filter. All problems are
/// reported together, one issue per parameter.
pub fn parse_query(params: &HashMap<String, String>) -> AppResult<NormalizedQuery> {
    let mut issues = Vec::new();

    let page = positive_param(params, "page", DEFAULT_PAGE, &mut issues);
    let limit = positive_param(params, "limit", DEFAULT_LIMIT, &mut issues);

    let order = match params.get("order") {
        None => DEFAULT_ORDER,
        Some(raw) => SortOrder::parse(raw).unwrap_or_else(|| {
            issues.push(FieldIssue::new("order", "order must be either 'asc' or 'desc'"));
            DEFAULT_ORDER
        }),
    };

    let sort_by = params
        .get("sortBy")
        .filter(|s| !s.trim().is_empty())
        .map_or(DEFAULT_SORT_BY, String::as_str);

    if !issues.is_empty() {
        return Err(AppError::Validation(issues));
    }

    let mut args = FindManyArgs {
        skip: (page - 1).saturating_mul(limit),
        take: limit,
        ..FindManyArgs::default()
    };
    args.order_by.insert(sort_by.to_string(), order);
    args.filters = params
        .iter()
        .filter(|(key, _)| !RESERVED.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(NormalizedQuery { page, limit, args })
}

fn positive_param(
    params: &HashMap<String, String>,
    name: &str,
    default: u64,
    issues: &mut Vec<FieldIssue>,
) -> u64 {
    let Some(raw) = params.get(name) else {
        return default;
    };

    match raw.trim().parse::<u64>() {
        Ok(value) if value >= 1 => value,
        _ => {
            issues.push(FieldIssue::new(
                name,
                format!("{} must be a positive integer", name),
            ));
            default
        }
    }
}

/// Hex SHA-256 of the query's canonical JSON form.
///
/// Equal queries hash equally whatever the parameter order.
pub fn query_hash(args: &FindManyArgs) -> String {
    let canonical = serde_json::to_vec(args).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let query = parse_query(&HashMap::new()).unwrap();

        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.args.skip, 0);
        assert_eq!(query.args.take, 10);
        assert_eq!(query.args.order_by.get("createdAt"), Some(&SortOrder::Desc));
        assert!(query.args.filters.is_empty());
    }

    #[test]
    fn test_paging_and_filters() {
        let query = parse_query(&params(&[
            ("page", "3"),
            ("limit", "5"),
            ("sortBy", "title"),
            ("order", "ASC"),
            ("status", "open"),
        ]))
        .unwrap();

        assert_eq!(query.args.skip, 10);
        assert_eq!(query.args.take, 5);
        assert_eq!(query.args.order_by.get("title"), Some(&SortOrder::Asc));
        assert_eq!(query.args.filters.len(), 1);
        assert_eq!(query.args.filters.get("status").map(String::as_str), Some("open"));
    }

    #[test]
    fn test_invalid_parameters_are_reported_together() {
        let err = parse_query(&params(&[("page", "0"), ("limit", "ten"), ("order", "up")]))
            .unwrap_err();

        match err {
            AppError::Validation(issues) => {
                let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
                assert_eq!(paths, vec!["page", "limit", "order"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a = parse_query(&params(&[("status", "open"), ("owner", "ada")])).unwrap();
        let b = parse_query(&params(&[("owner", "ada"), ("status", "open")])).unwrap();

        assert_eq!(query_hash(&a.args), query_hash(&b.args));
        assert_eq!(query_hash(&a.args).len(), 64);
    }

    #[test]
    fn test_hash_distinguishes_queries() {
        let first = parse_query(&params(&[("page", "1")])).unwrap();
        let second = parse_query(&params(&[("page", "2")])).unwrap();
        assert_ne!(query_hash(&first.args), query_hash(&second.args));
    }
}
