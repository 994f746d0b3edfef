//! Tool request model
//!
//! Provides:
//! - Parameter declarations shared by the registry and the MCP schema
//! - Normalization of raw tool arguments into typed request fields
//! - The per-call [`SearchRequest`] handed to the dispatcher

mod normalize;

pub use normalize::{
    normalize, translate_legacy_filters, Limits, Normalized, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

use crate::error::{PiaError, Result};
use crate::filter::Expr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which index the backend searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Content,
    Titles,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Titles => "titles",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "content" => Ok(Self::Content),
            "titles" => Ok(Self::Titles),
            other => Err(PiaError::validation(format!(
                "search_mode must be 'content' or 'titles', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool parameter the normalizer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Query,
    Filter,
    /// Legacy object form of `filter`
    Filters,
    Page,
    PageSize,
    Limit,
    SearchMode,
    IncludeFacets,
    Id,
}

impl Param {
    pub const ALL: [Param; 9] = [
        Param::Query,
        Param::Filter,
        Param::Filters,
        Param::Page,
        Param::PageSize,
        Param::Limit,
        Param::SearchMode,
        Param::IncludeFacets,
        Param::Id,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Filter => "filter",
            Self::Filters => "filters",
            Self::Page => "page",
            Self::PageSize => "page_size",
            Self::Limit => "limit",
            Self::SearchMode => "search_mode",
            Self::IncludeFacets => "include_facets",
            Self::Id => "id",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Parameters accepted by one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub accepted: Vec<Param>,
    pub query_required: bool,
}

impl ParamSpec {
    /// Full search parameter set, `search_mode` optional
    pub fn search(with_mode: bool) -> Self {
        let mut accepted = vec![
            Param::Query,
            Param::Filter,
            Param::Filters,
            Param::Page,
            Param::PageSize,
            Param::Limit,
        ];
        if with_mode {
            accepted.push(Param::SearchMode);
        }
        accepted.push(Param::IncludeFacets);
        Self {
            accepted,
            query_required: true,
        }
    }

    /// Facet discovery: optional query plus filter
    pub fn facets() -> Self {
        Self {
            accepted: vec![Param::Query, Param::Filter, Param::Filters],
            query_required: false,
        }
    }

    pub fn query_only() -> Self {
        Self {
            accepted: vec![Param::Query],
            query_required: true,
        }
    }

    pub fn fetch() -> Self {
        Self {
            accepted: vec![Param::Id],
            query_required: false,
        }
    }

    pub fn none() -> Self {
        Self {
            accepted: Vec::new(),
            query_required: false,
        }
    }

    pub fn accepts(&self, param: Param) -> bool {
        self.accepted.contains(&param)
    }

    pub fn accepts_name(&self, name: &str) -> bool {
        Param::from_name(name).is_some_and(|p| self.accepts(p))
    }

    /// Whether the tool takes any pagination parameter
    pub fn paginated(&self) -> bool {
        self.accepts(Param::Page) || self.accepts(Param::PageSize) || self.accepts(Param::Limit)
    }
}

/// Fully resolved search request, built fresh for every call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchRequest {
    pub filter: Option<Arc<Expr>>,
    pub query: Option<String>,
    /// 1-based; `None` for tools without paging
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub mode: Option<SearchMode>,
    pub include_facets: bool,
    pub id: Option<String>,
}

impl SearchRequest {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Option<Arc<Expr>>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_paging(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_mode_parse() {
        assert_eq!(SearchMode::parse("titles").unwrap(), SearchMode::Titles);
        assert!(SearchMode::parse("Titles").is_err());
        assert_eq!(SearchMode::default().to_string(), "content");
    }

    #[test]
    fn test_param_names_round_trip() {
        for param in Param::ALL {
            assert_eq!(Param::from_name(param.name()), Some(param));
        }
        assert_eq!(Param::from_name("offset"), None);
    }

    #[test]
    fn test_param_specs() {
        let titles = ParamSpec::search(false);
        assert!(!titles.accepts(Param::SearchMode));
        assert!(titles.accepts_name("limit"));
        assert!(titles.paginated());
        assert!(!ParamSpec::facets().paginated());
        assert!(!ParamSpec::fetch().query_required);
    }
}
