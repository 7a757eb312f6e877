//! Validated mapping specification.
//!
//! [`MappingSpec::from_document`] checks a raw [`SpecDocument`] and collects
//! every problem it finds before failing, so a user sees all mistakes in a
//! spec at once.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use indexmap::IndexMap;

use super::document::{LookupDocument, RuleDocument, SpecDocument, SpecFormat, TransformList};
use super::{SpecError, SpecIssue};
use crate::expr::{self, Expression};
use crate::value::Value;

// ============================================================================
// Transforms and coercions
// ============================================================================

/// A named string operation in a transform chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Strip,
    Lower,
    Upper,
    Title,
}

impl Transform {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "strip" => Some(Transform::Strip),
            "lower" => Some(Transform::Lower),
            "upper" => Some(Transform::Upper),
            "title" => Some(Transform::Title),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Transform::Strip => "strip",
            Transform::Lower => "lower",
            Transform::Upper => "upper",
            Transform::Title => "title",
        }
    }

    pub fn apply(self, input: &str) -> String {
        match self {
            Transform::Strip => input.trim().to_string(),
            Transform::Lower => input.to_lowercase(),
            Transform::Upper => input.to_uppercase(),
            Transform::Title => title_case(input),
        }
    }
}

/// Uppercase the first letter of every run of letters, lowercase the rest.
/// Digits and punctuation break runs, so `"o'neil 3rd"` becomes
/// `"O'Neil 3Rd"`.
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_word = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Target type for `as_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsType {
    Int,
    Float,
    Str,
}

impl AsType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" => Some(AsType::Int),
            "float" => Some(AsType::Float),
            "str" => Some(AsType::Str),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AsType::Int => "int",
            AsType::Float => "float",
            AsType::Str => "str",
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Where a rule's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSource {
    /// Copy an input field.
    Field(String),
    /// A literal.
    Const(Value),
    /// A computed expression.
    Expr(Expression),
    /// A foreign-key lookup. Only valid on top-level column rules.
    Lookup(Box<LookupRule>),
}

/// A value source plus its post-processing.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub source: RuleSource,
    pub transforms: Vec<Transform>,
    pub as_type: Option<AsType>,
}

impl Rule {
    pub fn field(name: impl Into<String>) -> Self {
        Self::from_source(RuleSource::Field(name.into()))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::from_source(RuleSource::Const(value.into()))
    }

    pub fn from_source(source: RuleSource) -> Self {
        Self {
            source,
            transforms: Vec::new(),
            as_type: None,
        }
    }

    pub fn with_transforms(mut self, transforms: Vec<Transform>) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_as_type(mut self, as_type: AsType) -> Self {
        self.as_type = Some(as_type);
        self
    }

    /// Input fields this rule reads, including those inside a lookup.
    pub fn input_fields(&self) -> Vec<String> {
        match &self.source {
            RuleSource::Field(name) => vec![name.clone()],
            RuleSource::Const(_) => Vec::new(),
            RuleSource::Expr(e) => e.referenced_fields(),
            RuleSource::Lookup(lookup) => lookup
                .matches
                .values()
                .chain(lookup.defaults.values())
                .flat_map(Rule::input_fields)
                .collect(),
        }
    }

    /// Fields copied directly with `from`. These must exist in the input
    /// header; expression reads are only checked per row.
    pub fn direct_fields(&self) -> Vec<String> {
        match &self.source {
            RuleSource::Field(name) => vec![name.clone()],
            RuleSource::Const(_) | RuleSource::Expr(_) => Vec::new(),
            RuleSource::Lookup(lookup) => lookup
                .matches
                .values()
                .chain(lookup.defaults.values())
                .flat_map(Rule::direct_fields)
                .collect(),
        }
    }

    fn to_document(&self) -> RuleDocument {
        let mut doc = RuleDocument::default();
        match &self.source {
            RuleSource::Field(name) => doc.from = Some(name.clone()),
            RuleSource::Const(value) => doc.constant = Some(value.clone()),
            RuleSource::Expr(e) => doc.expr = Some(e.source().to_string()),
            RuleSource::Lookup(lookup) => doc.lookup = Some(lookup.to_document()),
        }
        if !self.transforms.is_empty() {
            let names: Vec<&str> = self.transforms.iter().map(|t| t.name()).collect();
            doc.transform = Some(TransformList::Pipe(names.join("|")));
        }
        doc.as_type = self.as_type.map(|t| t.name().to_string());
        doc
    }
}

/// Foreign-key lookup against another table.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupRule {
    pub table: String,
    pub get: String,
    pub matches: IndexMap<String, Rule>,
    pub create_if_missing: bool,
    pub defaults: IndexMap<String, Rule>,
}

impl LookupRule {
    fn to_document(&self) -> LookupDocument {
        LookupDocument {
            table: Some(self.table.clone()),
            get: Some(self.get.clone()),
            matches: self
                .matches
                .iter()
                .map(|(k, r)| (k.clone(), r.to_document()))
                .collect(),
            create_if_missing: self.create_if_missing,
            defaults: self
                .defaults
                .iter()
                .map(|(k, r)| (k.clone(), r.to_document()))
                .collect(),
        }
    }
}

// ============================================================================
// Mapping spec
// ============================================================================

/// How mapped rows are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMode {
    /// Append every row.
    Insert,
    /// Insert or update on conflict with `key`.
    Upsert { key: Vec<String> },
}

impl LoadMode {
    pub fn name(&self) -> &'static str {
        match self {
            LoadMode::Insert => "insert",
            LoadMode::Upsert { .. } => "upsert",
        }
    }
}

/// A target column and the rule that fills it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub rule: Rule,
}

/// A validated mapping specification.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingSpec {
    pub table: String,
    pub mode: LoadMode,
    pub pre_dedupe_on: Vec<String>,
    /// Output order is declaration order.
    pub columns: Vec<ColumnSpec>,
}

impl MappingSpec {
    /// Upsert key columns; empty in insert mode.
    pub fn key(&self) -> &[String] {
        match &self.mode {
            LoadMode::Insert => &[],
            LoadMode::Upsert { key } => key,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Lookup rules with the column they fill.
    pub fn lookups(&self) -> impl Iterator<Item = (&str, &LookupRule)> {
        self.columns.iter().filter_map(|c| match &c.rule.source {
            RuleSource::Lookup(lookup) => Some((c.name.as_str(), lookup.as_ref())),
            _ => None,
        })
    }

    /// Every input field any rule reads, deduplicated, in first-use order.
    pub fn input_fields(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .flat_map(|c| c.rule.input_fields())
            .filter(|f| seen.insert(f.clone()))
            .collect()
    }

    /// Fields copied with `from`, which the input header must contain.
    pub fn direct_fields(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .flat_map(|c| c.rule.direct_fields())
            .filter(|f| seen.insert(f.clone()))
            .collect()
    }

    /// Parse and validate a spec document from text.
    pub fn parse(text: &str, format: SpecFormat) -> Result<Self, SpecError> {
        Self::from_document(SpecDocument::parse(text, format)?)
    }

    /// Read, parse and validate a spec file.
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        Self::from_document(SpecDocument::load(path)?)
    }

    /// Validate a raw document.
    pub fn from_document(doc: SpecDocument) -> Result<Self, SpecError> {
        let mut issues = Issues::default();

        for key in doc.extra.keys().filter(|k| !k.starts_with('_')) {
            issues.push(key, "unknown top-level key");
        }

        let table = match doc.table.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                issues.push("table", "is required");
                String::new()
            }
        };

        if doc.columns.is_empty() {
            issues.push("columns", "must map at least one column");
        }

        let mut columns = Vec::with_capacity(doc.columns.len());
        for (name, rule_doc) in &doc.columns {
            let path = format!("columns.{}", name);
            if let Some(rule) = build_rule(&path, rule_doc, true, &mut issues) {
                columns.push(ColumnSpec {
                    name: name.clone(),
                    rule,
                });
            }
        }

        let key = doc.key.clone().unwrap_or_default();
        let mode = match doc.mode.as_deref().map(|m| m.trim().to_ascii_lowercase()) {
            None => LoadMode::Insert,
            Some(m) if m == "insert" => LoadMode::Insert,
            Some(m) if m == "upsert" => {
                if key.is_empty() {
                    issues.push("key", "upsert mode requires a non-empty key");
                }
                LoadMode::Upsert { key: key.clone() }
            }
            Some(other) => {
                issues.push("mode", format!("must be 'insert' or 'upsert', got '{}'", other));
                LoadMode::Insert
            }
        };

        if matches!(mode, LoadMode::Insert) && !key.is_empty() {
            issues.push("key", "is only meaningful in upsert mode");
        }

        for k in &key {
            if !doc.columns.contains_key(k) {
                issues.push("key", format!("column '{}' is not a mapped column", k));
            }
        }

        let pre_dedupe_on = doc.pre_dedupe_on.clone().unwrap_or_default();
        for c in &pre_dedupe_on {
            if !doc.columns.contains_key(c) {
                issues.push("pre_dedupe_on", format!("column '{}' is not a mapped column", c));
            }
        }

        issues.into_result()?;

        Ok(MappingSpec {
            table,
            mode,
            pre_dedupe_on,
            columns,
        })
    }

    /// Convert back to a document for serialization.
    pub fn to_document(&self) -> SpecDocument {
        SpecDocument {
            table: Some(self.table.clone()),
            mode: Some(self.mode.name().to_string()),
            key: match &self.mode {
                LoadMode::Insert => None,
                LoadMode::Upsert { key } => Some(key.clone()),
            },
            pre_dedupe_on: (!self.pre_dedupe_on.is_empty()).then(|| self.pre_dedupe_on.clone()),
            columns: self
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.rule.to_document()))
                .collect(),
            extra: IndexMap::new(),
        }
    }

    /// Write the spec as a standalone document.
    pub fn render(&self, format: SpecFormat) -> Result<String, SpecError> {
        self.to_document().render(format)
    }
}

impl fmt::Display for MappingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> '{}' ({} column(s))",
            self.mode.name(),
            self.table,
            self.columns.len()
        )
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

#[derive(Default)]
struct Issues(Vec<SpecIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(SpecIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn into_result(self) -> Result<(), SpecError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(SpecError::Invalid(self.0))
        }
    }
}

fn build_rule(
    path: &str,
    doc: &RuleDocument,
    allow_lookup: bool,
    issues: &mut Issues,
) -> Option<Rule> {
    let mut sources = Vec::new();
    if doc.from.is_some() {
        sources.push("from");
    }
    if doc.constant.is_some() {
        sources.push("const");
    }
    if doc.expr.is_some() {
        sources.push("expr");
    }
    if doc.lookup.is_some() {
        sources.push("lookup");
    }

    let expected = if allow_lookup {
        "from, const, expr or lookup"
    } else {
        "from, const or expr"
    };
    match sources.len() {
        0 => {
            issues.push(path, format!("rule needs exactly one of {}", expected));
            return None;
        }
        1 => {}
        _ => {
            issues.push(
                path,
                format!(
                    "rule sets {} but needs exactly one of {}",
                    sources.join(" and "),
                    expected
                ),
            );
            return None;
        }
    }

    let before = issues.0.len();

    let mut transforms = Vec::new();
    if let Some(list) = &doc.transform {
        for name in list.names() {
            match Transform::from_name(&name) {
                Some(t) => transforms.push(t),
                None => issues.push(
                    format!("{}.transform", path),
                    format!("unknown transform '{}'", name),
                ),
            }
        }
    }

    let as_type = match doc.as_type.as_deref() {
        None => None,
        Some(name) => match AsType::from_name(name) {
            Some(t) => Some(t),
            None => {
                issues.push(
                    format!("{}.as_type", path),
                    format!("unsupported type '{}' (expected int, float or str)", name),
                );
                None
            }
        },
    };

    let source = if let Some(field) = &doc.from {
        if field.is_empty() {
            issues.push(format!("{}.from", path), "field name is empty");
        }
        RuleSource::Field(field.clone())
    } else if let Some(value) = &doc.constant {
        RuleSource::Const(value.clone())
    } else if let Some(source) = &doc.expr {
        match expr::parse(source) {
            Ok(e) => RuleSource::Expr(e),
            Err(err) => {
                issues.push(format!("{}.expr", path), err.to_string());
                return None;
            }
        }
    } else if let Some(lookup) = &doc.lookup {
        let lookup_path = format!("{}.lookup", path);
        if !allow_lookup {
            issues.push(&lookup_path, "lookups cannot be nested inside a lookup");
            return None;
        }
        RuleSource::Lookup(Box::new(build_lookup(&lookup_path, lookup, issues)?))
    } else {
        return None;
    };

    if issues.0.len() > before {
        return None;
    }

    Some(Rule {
        source,
        transforms,
        as_type,
    })
}

fn build_lookup(path: &str, doc: &LookupDocument, issues: &mut Issues) -> Option<LookupRule> {
    let before = issues.0.len();

    let table = doc.table.clone().unwrap_or_default();
    if table.trim().is_empty() {
        issues.push(format!("{}.table", path), "is required");
    }
    let get = doc.get.clone().unwrap_or_default();
    if get.trim().is_empty() {
        issues.push(format!("{}.get", path), "is required");
    }

    let mut build_map = |section: &str, docs: &IndexMap<String, RuleDocument>| {
        let mut rules = IndexMap::new();
        for (column, rule_doc) in docs {
            let rule_path = format!("{}.{}.{}", path, section, column);
            if let Some(rule) = build_rule(&rule_path, rule_doc, false, issues) {
                rules.insert(column.clone(), rule);
            }
        }
        rules
    };
    let matches = build_map("match", &doc.matches);
    let defaults = build_map("defaults", &doc.defaults);

    for column in defaults.keys().filter(|c| matches.contains_key(*c)) {
        issues.push(
            format!("{}.defaults.{}", path, column),
            "column is already set by match",
        );
    }

    if issues.0.len() > before {
        return None;
    }

    Some(LookupRule {
        table,
        get,
        matches,
        create_if_missing: doc.create_if_missing,
        defaults,
    })
}
