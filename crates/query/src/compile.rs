use super::options::{Filter, ListOptions, Op, OrFilter, Partition, Sort, SortOrder};
use super::Error;
use document::FieldPath;
use itertools::Itertools;
use rusqlite::types::Value as SqlValue;
use std::collections::{BTreeMap, BTreeSet};

/// The queried GVK, as the compiler sees it: its table base, the
/// declared indexed columns, and whether documents are namespaced.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub base: String,
    pub columns: BTreeSet<String>,
    pub namespaced: bool,
}

/// One summary aggregation: distinct values of `field` counted among
/// the rows matching the query's predicate.
#[derive(Debug, Clone)]
pub struct SummaryQuery {
    pub field: String,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// A compiled list query. Every user value is bound as a parameter;
/// the SQL text is a pure function of the inputs.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub count_sql: Option<String>,
    pub count_params: Vec<SqlValue>,
    /// Zero means unlimited.
    pub limit: i64,
    pub offset: i64,
    pub summaries: Vec<SummaryQuery>,
}

/// Compile `opts` + `partitions` + `namespace` into SQL over the
/// context's object, fields and labels tables.
pub fn compile(
    ctx: &QueryContext,
    opts: &ListOptions,
    partitions: &[Partition],
    namespace: &str,
) -> Result<CompiledQuery, Error> {
    let indirect_label_sorts = opts
        .sort_list
        .iter()
        .filter(|s| s.indirect && s.fields.label_name().is_some())
        .count();
    if indirect_label_sorts > 1 {
        return Err(Error::BadValue {
            value: indirect_label_sorts.to_string(),
            detail: "at most one indirect label sort is supported per query".to_string(),
        });
    }

    let (limit, offset) = page_bounds(opts)?;

    let mut compiled = if indirect_label_sorts == 1 {
        compile_union(ctx, opts, partitions, namespace)?
    } else {
        compile_plain(ctx, opts, partitions, namespace)?
    };

    if limit > 0 || offset > 0 {
        compiled.sql.push_str("\n  LIMIT ?");
        compiled
            .params
            .push(SqlValue::Integer(if limit > 0 { limit } else { -1 }));
        if offset > 0 {
            compiled.sql.push_str(" OFFSET ?");
            compiled.params.push(SqlValue::Integer(offset));
        }
        compiled.limit = limit;
        compiled.offset = offset;
    } else {
        // Without pagination the row count is the item count; no count
        // query is needed.
        compiled.count_sql = None;
        compiled.count_params = Vec::new();
    }

    compiled.summaries = compile_summaries(ctx, opts, partitions, namespace)?;

    Ok(compiled)
}

fn compile_plain(
    ctx: &QueryContext,
    opts: &ListOptions,
    partitions: &[Partition],
    namespace: &str,
) -> Result<CompiledQuery, Error> {
    let mut b = Builder::new(ctx);
    b.add_filters(&opts.filters)?;
    b.add_namespace(namespace);
    b.add_partitions(partitions, namespace);

    for sort in sorts_or_default(ctx, opts) {
        let (expr, suffix) = b.sort_expr(&sort)?;
        b.order.push((expr, suffix));
    }

    let order_by = b
        .order
        .iter()
        .map(|(expr, suffix)| format!("{expr}{suffix}"))
        .join(", ");

    // SQLite requires ORDER BY terms of a DISTINCT query to appear in
    // its result set.
    let sort_selects = if b.distinct {
        b.order.iter().map(|(expr, _)| expr.clone()).collect()
    } else {
        Vec::new()
    };

    let mut sql = b.assemble("o.object, o.objectnonce, o.dekid", &sort_selects);
    let count_sql = format!("SELECT COUNT(*) FROM (\n{}\n)", b.assemble("o.key", &[]));
    if !order_by.is_empty() {
        sql.push_str(&format!("\n  ORDER BY {order_by}"));
    }

    Ok(CompiledQuery {
        sql,
        count_sql: Some(count_sql),
        count_params: b.all_params(),
        params: b.all_params(),
        limit: 0,
        offset: 0,
        summaries: Vec::new(),
    })
}

// The indirect label sort compiles the whole query twice: once
// restricted to documents bearing the label (joined through to the
// external field) and once to documents without it (NULL sort key),
// combined with UNION ALL so the outer ORDER BY spans both.
fn compile_union(
    ctx: &QueryContext,
    opts: &ListOptions,
    partitions: &[Partition],
    namespace: &str,
) -> Result<CompiledQuery, Error> {
    let sorts = sorts_or_default(ctx, opts);

    let branch = |bound: bool| -> Result<(String, String, Vec<SqlValue>), Error> {
        let mut b = Builder::new(ctx);

        let mut filters = opts.filters.clone();
        let sort_label = sorts
            .iter()
            .find(|s| s.indirect && s.fields.label_name().is_some())
            .map(|s| s.fields.clone())
            .unwrap();
        filters.push(OrFilter::new(vec![Filter::new(
            sort_label,
            if bound { Op::Exists } else { Op::NotExists },
            Vec::new(),
        )]));

        b.add_filters(&filters)?;
        b.add_namespace(namespace);
        b.add_partitions(partitions, namespace);

        let mut selects = Vec::new();
        for (i, sort) in sorts.iter().enumerate() {
            let expr = if sort.indirect && sort.fields.label_name().is_some() {
                if bound {
                    let (expr, _) = b.sort_expr(sort)?;
                    expr
                } else {
                    "NULL".to_string()
                }
            } else {
                let (expr, _) = b.sort_expr(sort)?;
                expr
            };
            selects.push(format!(r#"{expr} AS "_sort{i}""#));
        }

        let sql = b.assemble(
            "o.object AS object, o.objectnonce AS objectnonce, o.dekid AS dekid",
            &selects,
        );
        let count = b.assemble("o.key", &[]);
        Ok((sql, count, b.all_params()))
    };

    let (bound_sql, bound_count, bound_params) = branch(true)?;
    let (absent_sql, absent_count, absent_params) = branch(false)?;

    let order_by = sorts
        .iter()
        .enumerate()
        .map(|(i, sort)| {
            let nullable = sort.indirect || sort.fields.label_name().is_some();
            format!(r#""_sort{i}"{}"#, direction(sort, nullable))
        })
        .join(", ");

    // Each branch may carry its own WITH bindings, so branches nest as
    // sub-selects rather than bare compound-select arms.
    let sql = format!(
        "SELECT object, objectnonce, dekid FROM (\n\
         SELECT * FROM (\n{bound_sql}\n)\n\
         UNION ALL\n\
         SELECT * FROM (\n{absent_sql}\n)\n\
         )\n  ORDER BY {order_by}"
    );
    let count_sql = format!(
        "SELECT COUNT(*) FROM (\n\
         SELECT * FROM (\n{bound_count}\n)\n\
         UNION ALL\n\
         SELECT * FROM (\n{absent_count}\n)\n\
         )"
    );

    let params: Vec<SqlValue> = bound_params.iter().chain(&absent_params).cloned().collect();

    Ok(CompiledQuery {
        sql,
        count_sql: Some(count_sql),
        count_params: params.clone(),
        params,
        limit: 0,
        offset: 0,
        summaries: Vec::new(),
    })
}

fn compile_summaries(
    ctx: &QueryContext,
    opts: &ListOptions,
    partitions: &[Partition],
    namespace: &str,
) -> Result<Vec<SummaryQuery>, Error> {
    let mut out = Vec::new();

    for field in &opts.summary_fields {
        let mut b = Builder::new(ctx);
        b.add_filters(&opts.filters)?;
        b.add_namespace(namespace);
        b.add_partitions(partitions, namespace);

        let expr = match field.label_name() {
            Some(label) => {
                let alias = b.sort_label_alias(label);
                format!("{alias}.value")
            }
            None => b.field_expr(field)?,
        };

        // The query's predicate becomes a CTE of (key, value); the
        // outer select counts its distinct non-empty values. Label
        // CTEs, when present, precede it in the WITH list.
        let body = b.assemble_body(&format!("o.key, {expr}"), &[]);
        let mut ctes: Vec<String> = b
            .ctes
            .iter()
            .map(|(alias, cte_body)| format!("{alias}(key, value) AS ({cte_body})"))
            .collect();
        ctes.push(format!("w(key, value) AS (\n{body}\n)"));

        let sql = format!(
            "WITH {}\n\
             SELECT COUNT(*) AS count, value FROM w WHERE value != '' GROUP BY value\n\
             ORDER BY count DESC, value ASC",
            ctes.join(", ")
        );

        out.push(SummaryQuery {
            field: field.column_name(),
            sql,
            params: b.all_params(),
        });
    }

    Ok(out)
}

fn sorts_or_default(ctx: &QueryContext, opts: &ListOptions) -> Vec<Sort> {
    if !opts.sort_list.is_empty() {
        return opts.sort_list.clone();
    }
    let mut sorts = vec![Sort::new(
        FieldPath::new(["metadata", "name"]),
        SortOrder::Asc,
    )];
    if ctx.namespaced {
        sorts.push(Sort::new(
            FieldPath::new(["metadata", "namespace"]),
            SortOrder::Asc,
        ));
    }
    sorts
}

fn page_bounds(opts: &ListOptions) -> Result<(i64, i64), Error> {
    let mut limit = opts.pagination.page_size as i64;
    let chunk = opts.chunk_size as i64;
    if chunk > 0 && (limit == 0 || chunk < limit) {
        limit = chunk;
    }

    let mut offset = 0i64;
    if !opts.resume.is_empty() {
        offset = opts
            .resume
            .parse()
            .ok()
            .filter(|o| *o >= 0)
            .ok_or_else(|| Error::BadValue {
                value: opts.resume.clone(),
                detail: "continue token is not a row offset".to_string(),
            })?;
    }
    if opts.pagination.page >= 1 {
        offset += (opts.pagination.page as i64 - 1) * opts.pagination.page_size as i64;
    }
    Ok((limit, offset))
}

fn direction(sort: &Sort, nullable: bool) -> &'static str {
    match (sort.order, nullable) {
        (SortOrder::Asc, false) => " ASC",
        (SortOrder::Desc, false) => " DESC",
        (SortOrder::Asc, true) => " ASC NULLS LAST",
        (SortOrder::Desc, true) => " DESC NULLS FIRST",
    }
}

struct Builder<'c> {
    ctx: &'c QueryContext,
    distinct: bool,

    // Label-bound CTEs, rendered ahead of the SELECT.
    ctes: Vec<(String, String)>,
    cte_params: Vec<SqlValue>,

    joins: Vec<String>,
    filter_label_aliases: BTreeMap<String, String>,
    sort_label_aliases: BTreeMap<String, String>,
    ext_aliases: BTreeMap<String, String>,

    clauses: Vec<String>,
    params: Vec<SqlValue>,

    order: Vec<(String, String)>,

    next_lt: usize,
    next_ext: usize,
}

impl<'c> Builder<'c> {
    fn new(ctx: &'c QueryContext) -> Self {
        Self {
            ctx,
            distinct: false,
            ctes: Vec::new(),
            cte_params: Vec::new(),
            joins: Vec::new(),
            filter_label_aliases: BTreeMap::new(),
            sort_label_aliases: BTreeMap::new(),
            ext_aliases: BTreeMap::new(),
            clauses: Vec::new(),
            params: Vec::new(),
            order: Vec::new(),
            next_lt: 1,
            next_ext: 1,
        }
    }

    // Parameters in SQL text order: WITH bindings precede the body.
    fn all_params(&self) -> Vec<SqlValue> {
        self.cte_params.iter().chain(&self.params).cloned().collect()
    }

    fn render_ctes(&self) -> String {
        if self.ctes.is_empty() {
            return String::new();
        }
        format!(
            "WITH {}",
            self.ctes
                .iter()
                .map(|(alias, body)| format!("{alias}(key, value) AS ({body})"))
                .join(", ")
        )
    }

    fn assemble(&self, select: &str, extra_selects: &[String]) -> String {
        let mut sql = self.render_ctes();
        if !sql.is_empty() {
            sql.push('\n');
        }
        sql.push_str(&self.assemble_body(select, extra_selects));
        sql
    }

    fn assemble_body(&self, select: &str, extra_selects: &[String]) -> String {
        let base = &self.ctx.base;
        let mut sql = String::new();

        sql.push_str("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(select);
        for extra in extra_selects {
            sql.push_str(", ");
            sql.push_str(extra);
        }
        sql.push_str(&format!(
            "\nFROM \"{base}\" o\n  JOIN \"{base}_fields\" f ON o.key = f.key"
        ));
        for join in &self.joins {
            sql.push_str("\n  ");
            sql.push_str(join);
        }
        if !self.clauses.is_empty() {
            sql.push_str(&format!("\n  WHERE ({})", self.clauses.join(") AND\n    (")));
        }
        sql
    }

    fn add_filters(&mut self, filters: &[OrFilter]) -> Result<(), Error> {
        for or_filter in filters {
            let mut predicates = Vec::new();
            for filter in &or_filter.filters {
                predicates.push(self.predicate(filter)?);
            }
            if !predicates.is_empty() {
                self.clauses.push(predicates.join(" OR "));
            }
        }
        Ok(())
    }

    fn add_namespace(&mut self, namespace: &str) {
        if !namespace.is_empty() && namespace != "*" {
            self.clauses.push(r#"f."metadata.namespace" = ?"#.to_string());
            self.params.push(SqlValue::Text(namespace.to_string()));
        }
    }

    // Partitions restrict disjunctively. A passthrough partition, or an
    // all-names partition over every namespace, absorbs the rest. When
    // the caller's explicit namespace already satisfies an all-names
    // partition the clause is elided entirely.
    fn add_partitions(&mut self, partitions: &[Partition], namespace: &str) {
        if partitions.is_empty() {
            self.clauses.push("FALSE".to_string());
            return;
        }
        if partitions.iter().any(|p| p.passthrough) {
            return;
        }
        if !namespace.is_empty()
            && partitions
                .iter()
                .any(|p| p.all && (p.namespace.is_empty() || p.namespace == namespace))
        {
            return;
        }
        if partitions.iter().any(|p| p.all && p.namespace.is_empty()) {
            return;
        }

        // Coalesce partitions sharing a names signature; their
        // namespaces merge into one IN list.
        let mut groups: BTreeMap<Vec<String>, BTreeSet<String>> = BTreeMap::new();
        let mut all_namespaces: BTreeSet<String> = BTreeSet::new();
        for p in partitions {
            if p.all {
                all_namespaces.insert(p.namespace.clone());
            } else {
                groups
                    .entry(p.names.iter().cloned().collect())
                    .or_default()
                    .insert(p.namespace.clone());
            }
        }

        let mut conditions = Vec::new();
        if !all_namespaces.is_empty() {
            conditions.push(self.namespaces_condition(&all_namespaces));
        }
        for (names, namespaces) in &groups {
            if names.is_empty() {
                conditions.push("FALSE".to_string());
                continue;
            }

            // A cluster-scoped member (empty namespace) widens the
            // group to a names-only restriction.
            let ns_cond = if namespaces.contains("") {
                None
            } else {
                Some(self.namespaces_condition(namespaces))
            };

            let names_cond = format!(
                r#"f."metadata.name" IN ({})"#,
                vec!["?"; names.len()].join(", ")
            );
            self.params
                .extend(names.iter().map(|n| SqlValue::Text(n.clone())));

            conditions.push(match ns_cond {
                Some(ns_cond) => format!("({ns_cond} AND {names_cond})"),
                None => names_cond,
            });
        }

        self.clauses.push(conditions.join(" OR "));
    }

    fn namespaces_condition(&mut self, namespaces: &BTreeSet<String>) -> String {
        let cond = if namespaces.len() == 1 {
            r#"f."metadata.namespace" = ?"#.to_string()
        } else {
            format!(
                r#"f."metadata.namespace" IN ({})"#,
                vec!["?"; namespaces.len()].join(", ")
            )
        };
        self.params
            .extend(namespaces.iter().map(|ns| SqlValue::Text(ns.clone())));
        cond
    }

    fn predicate(&mut self, filter: &Filter) -> Result<String, Error> {
        if filter.indirect {
            return self.indirect_predicate(filter);
        }
        if let Some(label) = filter.field.label_name() {
            return self.label_predicate(filter, &label.to_string());
        }
        let lhs = self.field_expr(&filter.field)?;
        match filter.op {
            Op::Exists | Op::NotExists => Err(Error::UnsupportedOperator {
                detail: format!(
                    "existence is only supported on labels, not field {:?}",
                    filter.field.column_name()
                ),
            }),
            _ => self.comparison(&lhs, filter),
        }
    }

    // Compile the operator against `lhs`, binding match values.
    fn comparison(&mut self, lhs: &str, filter: &Filter) -> Result<String, Error> {
        let first = || {
            filter.matches.first().cloned().ok_or(Error::BadValue {
                value: String::new(),
                detail: "filter has no match value".to_string(),
            })
        };

        Ok(match filter.op {
            Op::Eq | Op::NotEq => {
                let value = first()?;
                let (op, value, escape) = match (filter.op, filter.partial) {
                    (Op::Eq, false) => ("=", value, ""),
                    (Op::NotEq, false) => ("!=", value, ""),
                    (Op::Eq, true) => ("LIKE", like_pattern(&value), r#" ESCAPE '\'"#),
                    (Op::NotEq, true) => ("NOT LIKE", like_pattern(&value), r#" ESCAPE '\'"#),
                    _ => unreachable!(),
                };
                self.params.push(SqlValue::Text(value));
                format!("{lhs} {op} ?{escape}")
            }
            Op::Lt | Op::Gt => {
                let value = first()?;
                let number: f64 = value.parse().map_err(|_| Error::BadValue {
                    value: value.clone(),
                    detail: "comparison target is not numeric".to_string(),
                })?;
                self.params.push(SqlValue::Real(number));
                format!("{lhs} {} ?", if filter.op == Op::Lt { "<" } else { ">" })
            }
            Op::In if filter.matches.is_empty() => "FALSE".to_string(),
            Op::NotIn if filter.matches.is_empty() => "TRUE".to_string(),
            Op::In | Op::NotIn => {
                self.params
                    .extend(filter.matches.iter().map(|m| SqlValue::Text(m.clone())));
                format!(
                    "{lhs} {} ({})",
                    if filter.op == Op::In { "IN" } else { "NOT IN" },
                    vec!["?"; filter.matches.len()].join(", ")
                )
            }
            Op::Exists | Op::NotExists => unreachable!("rejected by callers"),
        })
    }

    fn label_predicate(&mut self, filter: &Filter, label: &str) -> Result<String, Error> {
        let base = &self.ctx.base;
        let absent =
            |b: &str| format!(r#"o.key NOT IN (SELECT key FROM "{b}_labels" WHERE label = ?)"#);

        // NotExists needs no join at all.
        if filter.op == Op::NotExists {
            self.params.push(SqlValue::Text(label.to_string()));
            return Ok(absent(base));
        }

        let alias = self.filter_label_alias(label);
        self.params.push(SqlValue::Text(label.to_string()));

        Ok(match filter.op {
            Op::Exists => format!("{alias}.label = ?"),
            Op::NotEq | Op::NotIn => {
                let inner = self.comparison(&format!("{alias}.value"), filter)?;
                let absent = absent(base);
                self.params.push(SqlValue::Text(label.to_string()));
                format!("(({alias}.label = ? AND {inner}) OR {absent})")
            }
            _ => {
                let inner = self.comparison(&format!("{alias}.value"), filter)?;
                format!("({alias}.label = ? AND {inner})")
            }
        })
    }

    fn indirect_predicate(&mut self, filter: &Filter) -> Result<String, Error> {
        if matches!(filter.op, Op::Exists | Op::NotExists) {
            return Err(Error::UnsupportedOperator {
                detail: "existence is not supported on indirect fields".to_string(),
            });
        }
        let (ext_base, sel_col, tgt_col) = indirect_target(&filter.indirect_fields)?;

        let (source, guard) = match filter.field.label_name() {
            Some(label) => {
                let alias = self.filter_label_alias(label);
                self.params.push(SqlValue::Text(label.to_string()));
                (format!("{alias}.value"), Some(format!("{alias}.label = ?")))
            }
            None => (self.field_expr(&filter.field)?, None),
        };

        let ext = self.ext_alias(&ext_base, &sel_col, &source);
        let inner = self.comparison(&format!(r#"{ext}."{tgt_col}""#), filter)?;

        Ok(match guard {
            Some(guard) => format!("({guard} AND {inner})"),
            None => inner,
        })
    }

    fn sort_expr(&mut self, sort: &Sort) -> Result<(String, String), Error> {
        if sort.indirect {
            let (ext_base, sel_col, tgt_col) = indirect_target(&sort.indirect_fields)?;
            let source = match sort.fields.label_name() {
                Some(label) => {
                    let alias = self.sort_label_alias(label);
                    format!("{alias}.value")
                }
                None => self.field_expr(&sort.fields)?,
            };
            let ext = self.ext_alias(&ext_base, &sel_col, &source);
            return Ok((format!(r#"{ext}."{tgt_col}""#), direction(sort, true).to_string()));
        }

        if let Some(label) = sort.fields.label_name() {
            let alias = self.sort_label_alias(label);
            return Ok((format!("{alias}.value"), direction(sort, true).to_string()));
        }

        let mut expr = self.field_expr(&sort.fields)?;
        if sort.sort_as_ip {
            expr = format!("inet_aton({expr})");
        }
        Ok((expr, direction(sort, false).to_string()))
    }

    /// The SQL expression selecting `path` from the fields table. A
    /// trailing numeric segment addresses one element of a bar-joined
    /// array column.
    fn field_expr(&mut self, path: &FieldPath) -> Result<String, Error> {
        let column = path.column_name();
        if self.ctx.columns.contains(&column) {
            return Ok(format!(r#"f."{column}""#));
        }
        if let Some((base_path, index)) = path.split_trailing_index() {
            let base_column = base_path.column_name();
            if self.ctx.columns.contains(&base_column) {
                return Ok(format!(r#"extract_barred_value(f."{base_column}", {index})"#));
            }
        }
        Err(Error::InvalidColumn { column })
    }

    // Filter-bound labels join the labels table outright; the label
    // binding lives in the WHERE clause, so the join fans out and the
    // query goes DISTINCT.
    fn filter_label_alias(&mut self, label: &str) -> String {
        if let Some(alias) = self.filter_label_aliases.get(label) {
            return alias.clone();
        }
        let alias = format!("lt{}", self.next_lt);
        self.next_lt += 1;
        self.joins.push(format!(
            r#"LEFT OUTER JOIN "{}_labels" {alias} ON f.key = {alias}.key"#,
            self.ctx.base
        ));
        self.distinct = true;
        self.filter_label_aliases
            .insert(label.to_string(), alias.clone());
        alias
    }

    // Sort-bound labels are attached through a CTE restricted to the
    // one label, so unlabeled documents survive as NULLs and order by
    // the NULLS suffix.
    fn sort_label_alias(&mut self, label: &str) -> String {
        if let Some(alias) = self.sort_label_aliases.get(label) {
            return alias.clone();
        }
        let alias = format!("lt{}", self.next_lt);
        self.next_lt += 1;
        self.ctes.push((
            alias.clone(),
            format!(
                r#"SELECT key, value FROM "{}_labels" WHERE label = ?"#,
                self.ctx.base
            ),
        ));
        self.cte_params.push(SqlValue::Text(label.to_string()));
        self.joins
            .push(format!("LEFT OUTER JOIN {alias} ON o.key = {alias}.key"));
        self.sort_label_aliases
            .insert(label.to_string(), alias.clone());
        alias
    }

    // External joins are emitted at most once per (table, column,
    // source expression).
    fn ext_alias(&mut self, ext_base: &str, sel_col: &str, source: &str) -> String {
        let key = format!("{ext_base}|{sel_col}|{source}");
        if let Some(alias) = self.ext_aliases.get(&key) {
            return alias.clone();
        }
        let alias = format!("ext{}", self.next_ext);
        self.next_ext += 1;
        self.joins.push(format!(
            r#"LEFT OUTER JOIN "{ext_base}_fields" {alias} ON {source} = {alias}."{sel_col}""#
        ));
        self.ext_aliases.insert(key, alias.clone());
        alias
    }
}

// Resolve and validate an indirect directive's
// `[group/version, kind, selector column, target column]`.
fn indirect_target(fields: &[String]) -> Result<(String, String, String), Error> {
    let [gv, kind, sel_col, tgt_col] = fields else {
        return Err(Error::BadValue {
            value: format!("{fields:?}"),
            detail: "indirect directives take [group/version, kind, selector field, target field]"
                .to_string(),
        });
    };

    for (name, allow_slash) in [(gv, true), (kind, false), (sel_col, false), (tgt_col, false)] {
        let ok = !name.is_empty()
            && name.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') || (allow_slash && c == '/')
            });
        if !ok {
            return Err(Error::InvalidColumn {
                column: name.clone(),
            });
        }
    }

    Ok((
        document::sanitize(&format!("{gv}_{kind}")),
        sel_col.clone(),
        tgt_col.clone(),
    ))
}

// Escape LIKE wildcards and wrap for substring matching.
fn like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
