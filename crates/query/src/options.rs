use document::FieldPath;
use std::collections::BTreeSet;

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    NotEq,
    Lt,
    Gt,
    In,
    NotIn,
    /// Label presence. Rejected on non-label fields.
    Exists,
    NotExists,
}

/// Filter is one predicate over an indexed field, a label, or (when
/// `indirect`) a field of another GVK joined through this one.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: FieldPath,
    pub op: Op,
    pub matches: Vec<String>,
    /// Substring match: Eq/NotEq compile to LIKE with escaped wildcards.
    pub partial: bool,
    pub indirect: bool,
    /// `[group/version, kind, selector column, target column]` of the
    /// external GVK's fields table.
    pub indirect_fields: Vec<String>,
}

impl Filter {
    pub fn new(field: FieldPath, op: Op, matches: Vec<String>) -> Self {
        Self {
            field,
            op,
            matches,
            partial: false,
            indirect: false,
            indirect_fields: Vec::new(),
        }
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn indirect(mut self, indirect_fields: Vec<String>) -> Self {
        self.indirect = true;
        self.indirect_fields = indirect_fields;
        self
    }
}

/// OrFilter is a disjunction of filters. The query matches the
/// conjunction of all OrFilters.
#[derive(Debug, Clone, Default)]
pub struct OrFilter {
    pub filters: Vec<Filter>,
}

impl OrFilter {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One sort directive, applied in list position.
#[derive(Debug, Clone)]
pub struct Sort {
    pub fields: FieldPath,
    pub order: SortOrder,
    /// Order textual addresses numerically via inet_aton.
    pub sort_as_ip: bool,
    pub indirect: bool,
    pub indirect_fields: Vec<String>,
}

impl Sort {
    pub fn new(fields: FieldPath, order: SortOrder) -> Self {
        Self {
            fields,
            order,
            sort_as_ip: false,
            indirect: false,
            indirect_fields: Vec::new(),
        }
    }

    pub fn as_ip(mut self) -> Self {
        self.sort_as_ip = true;
        self
    }

    pub fn indirect(mut self, indirect_fields: Vec<String>) -> Self {
        self.indirect = true;
        self.indirect_fields = indirect_fields;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    /// Zero means unlimited.
    pub page_size: u32,
    /// Pages are 1-based; zero and one both mean the first page.
    pub page: u32,
}

/// Partition restricts a query to a disjunctive slice of the key
/// space. The effective restriction of a query is the union of its
/// partitions; no partitions at all yields an empty result.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// No restriction at all.
    pub passthrough: bool,
    pub namespace: String,
    /// All names within the namespace. When false, only `names`.
    pub all: bool,
    pub names: BTreeSet<String>,
}

impl Partition {
    pub fn passthrough() -> Self {
        Self {
            passthrough: true,
            ..Default::default()
        }
    }

    pub fn all(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            all: true,
            ..Default::default()
        }
    }

    pub fn names<I: IntoIterator<Item = S>, S: Into<String>>(namespace: &str, names: I) -> Self {
        Self {
            namespace: namespace.to_string(),
            names: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// ListOptions describes one structured list query.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filters: Vec<OrFilter>,
    pub sort_list: Vec<Sort>,
    pub pagination: Pagination,
    /// Upper bound on page size; zero means none.
    pub chunk_size: u32,
    /// Continue token of a previous page.
    pub resume: String,
    /// Minimum resource version the response must reflect.
    pub revision: String,
    /// Fields to aggregate distinct-value counts for.
    pub summary_fields: Vec<FieldPath>,
}
