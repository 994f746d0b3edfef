//! Static catalog of tool variants
//!
//! Every tool is data: a parameter declaration, a search mode, an optional
//! preset filter and the backend tool it forwards to. One generic handler
//! serves them all.

use crate::error::{PiaError, Result};
use crate::filter::{parse, Expr};
use crate::request::{Param, ParamSpec, SearchMode};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const SOURCES_NOTE: &str = "Major data sources include: Department of Justice (198k+ docs), \
Congress.gov (29k+ docs), Oversight.gov (22k+ docs), CRS (22k+ docs), GAO (10k+ docs), \
Federal Register (1k+ executive orders).";

const FILTER_HELP: &str = "Optional OData filter expression supporting boolean logic.

FIELDS:
- SourceDocumentDataSource: publishing source, e.g. 'Department of Justice', 'Congress.gov', 'Oversight.gov', 'CRS', 'GAO', 'Federal Register'
- SourceDocumentDataSet: 'press-releases', 'reports', 'bills-and-laws', 'federal-reports', 'executive orders', 'state-and-local-reports', 'federal reports'
- SourceDocumentOrg, SourceDocumentTitle, RecStatus, RecPriorityFlag, IsIntegrityRelated
- SourceDocumentPublishDate: ISO 8601 date, use ge/le for ranges
- SourceDocumentIsRecDoc: 'Yes' or 'No'
- RecFraudRiskManagementThemePIA, RecMatterForCongressPIA, RecRecommendation, RecAgencyComments
- referenced_agencies: collection, e.g. referenced_agencies/any(a: a eq 'Department of Defense (DOD)')

OPERATORS: eq ne gt ge lt le, in (...), contains/startswith/endswith(Field, 'text'), and, or, not, parentheses.

EXAMPLES:
- SourceDocumentDataSource eq 'GAO' and RecStatus ne 'Closed'
- (SourceDocumentDataSource eq 'GAO' or SourceDocumentDataSource eq 'Oversight.gov') and RecStatus eq 'Open'
- SourceDocumentPublishDate ge 2020-01-01 and SourceDocumentPublishDate le 2024-12-31

Use the facet tools to discover current field values.";

/// What a tool does once its arguments are normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Filtered, paginated search
    Search,
    /// Facet discovery; responses feed the live schema
    Facets,
    /// Connector-style query-only search
    ConnectorSearch,
    /// Fetch one document by id
    Fetch,
    /// Answered locally from the rate limiter
    RateLimitStats,
}

/// One catalog entry
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub kind: ToolKind,
    /// Mode used when the caller does not pick one
    pub mode: Option<SearchMode>,
    /// Parsed once at startup and shared by every call
    pub preset: Option<Arc<Expr>>,
    pub params: ParamSpec,
    /// Remote tool name; `None` when the tool never reaches the backend
    pub backend_tool: Option<String>,
}

impl ToolSpec {
    fn new(name: &str, kind: ToolKind, params: ParamSpec, description: String) -> Self {
        Self {
            name: name.to_string(),
            description,
            kind,
            mode: None,
            preset: None,
            params,
            backend_tool: Some(name.to_string()),
        }
    }

    fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    fn forward_to(mut self, backend_tool: &str) -> Self {
        self.backend_tool = Some(backend_tool.to_string());
        self
    }

    fn preset(mut self, text: &str) -> Result<Self> {
        let tree = parse(text).map_err(|e| {
            PiaError::Config(format!("invalid preset for tool '{}': {}", self.name, e))
        })?;
        self.preset = tree;
        Ok(self)
    }

    /// Preset rendered as filter text
    pub fn preset_text(&self) -> Option<String> {
        self.preset.as_ref().map(|p| p.to_string())
    }

    /// JSON Schema for the tool's arguments
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params.accepted {
            properties.insert(param.name().to_string(), self.param_schema(*param));
        }

        let mut required = Vec::new();
        if self.params.query_required {
            required.push("query");
        }
        if self.params.accepts(Param::Id) {
            required.push("id");
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    fn param_schema(&self, param: Param) -> Value {
        match param {
            Param::Query => json!({
                "type": "string",
                "description": if self.params.query_required {
                    "Search query"
                } else {
                    "Optional query to scope the facets"
                },
            }),
            Param::Filter => {
                let description = match self.preset_text() {
                    Some(preset) => format!(
                        "{}\n\nThis tool always applies: {}. Your filter is combined with it using 'and'.",
                        FILTER_HELP, preset
                    ),
                    None => FILTER_HELP.to_string(),
                };
                json!({"type": "string", "description": description})
            }
            Param::Filters => json!({
                "type": "object",
                "description": "Deprecated. Object form such as {\"SourceDocumentDataSource\": {\"eq\": \"GAO\"}}; translated to 'filter' and combined with it",
            }),
            Param::Page => json!({
                "type": "integer",
                "description": "Page number (1-based)",
                "minimum": 1,
                "default": 1,
            }),
            Param::PageSize => json!({
                "type": "integer",
                "description": "Number of results per page",
                "minimum": 1,
            }),
            Param::Limit => json!({
                "type": "integer",
                "description": "Alias for page_size; ignored when page_size is given",
                "minimum": 1,
            }),
            Param::SearchMode => json!({
                "type": "string",
                "description": "Search content or titles",
                "enum": ["content", "titles"],
                "default": self.mode.unwrap_or_default().as_str(),
            }),
            Param::IncludeFacets => json!({
                "type": "boolean",
                "description": "Include facets in results",
                "default": false,
            }),
            Param::Id => json!({
                "type": "string",
                "description": "A unique identifier for the document to retrieve",
            }),
        }
    }
}

/// Immutable tool catalog, built once at startup
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<ToolSpec>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(specs: Vec<ToolSpec>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(PiaError::Config(format!("duplicate tool name '{}'", spec.name)));
            }
        }
        Ok(Self {
            tools: specs.into_iter().map(Arc::new).collect(),
            index,
        })
    }

    /// The PIA catalog
    pub fn pia() -> Result<Self> {
        use ToolKind::*;

        let agency = |suffix: &str, label: &str, preset: &str| -> Result<ToolSpec> {
            ToolSpec::new(
                &format!("pia_search_content_{}", suffix),
                Search,
                ParamSpec::search(true),
                format!(
                    "Search the Program Integrity Alliance (PIA) database for {} document content and \
                     recommendations. Results are always restricted to {}. Returns results with full \
                     citation information for attribution.",
                    label, label
                ),
            )
            .mode(SearchMode::Content)
            .forward_to("pia_search_content")
            .preset(preset)
        };

        let specs = vec![
            ToolSpec::new(
                "pia_search_content",
                Search,
                ParamSpec::search(true),
                format!(
                    "Search the Program Integrity Alliance (PIA) database for document content and \
                     recommendations. Returns results with full citation information for attribution. {} \
                     Supports OData filtering with boolean logic.",
                    SOURCES_NOTE
                ),
            )
            .mode(SearchMode::Content),
            ToolSpec::new(
                "pia_search_content_facets",
                Facets,
                ParamSpec::facets(),
                format!(
                    "Get available facets (filter values) for content search. Use it before \
                     searching to learn which filter values exist. {}",
                    SOURCES_NOTE
                ),
            )
            .mode(SearchMode::Content),
            ToolSpec::new(
                "pia_search_titles",
                Search,
                ParamSpec::search(false),
                format!(
                    "Search the Program Integrity Alliance (PIA) database for document titles only. \
                     Useful for finding specific documents by title. {}",
                    SOURCES_NOTE
                ),
            )
            .mode(SearchMode::Titles),
            ToolSpec::new(
                "pia_search_titles_facets",
                Facets,
                ParamSpec::facets(),
                format!(
                    "Get available facets (filter values) for title search. {}",
                    SOURCES_NOTE
                ),
            )
            .mode(SearchMode::Titles),
            agency(
                "gao",
                "Government Accountability Office (GAO)",
                "SourceDocumentDataSource eq 'GAO'",
            )?,
            agency(
                "oig",
                "Office of Inspector General (Oversight.gov)",
                "SourceDocumentDataSource eq 'Oversight.gov'",
            )?,
            agency(
                "crs",
                "Congressional Research Service (CRS)",
                "SourceDocumentDataSource eq 'CRS'",
            )?,
            agency(
                "doj",
                "Department of Justice",
                "SourceDocumentDataSource eq 'Department of Justice'",
            )?,
            agency(
                "congress",
                "Congress.gov",
                "SourceDocumentDataSource eq 'Congress.gov'",
            )?,
            agency(
                "executive_orders",
                "Executive Orders from the Federal Register",
                "SourceDocumentDataSource eq 'Federal Register' and SourceDocumentDataSet eq 'executive orders'",
            )?,
            ToolSpec::new(
                "search",
                ConnectorSearch,
                ParamSpec::query_only(),
                "Search the Program Integrity Alliance (PIA) database and return potentially relevant \
                 results with titles, snippets and URLs for citation."
                    .to_string(),
            ),
            ToolSpec::new(
                "fetch",
                Fetch,
                ParamSpec::fetch(),
                "Retrieve the full contents of a specific document from the PIA database using its \
                 unique identifier."
                    .to_string(),
            ),
            ToolSpec::new(
                "get_rate_limit_stats",
                RateLimitStats,
                ParamSpec::none(),
                "Get rate limiting statistics and current configuration: request counts, rejected \
                 requests and the configured limits, for this server and, when an API key is \
                 configured, for the PIA backend."
                    .to_string(),
            ),
        ];

        Self::new(specs)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ToolSpec>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<ToolSpec>> {
        self.get(name)
            .ok_or_else(|| PiaError::UnknownTool(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolSpec>> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
