// Schema Binder - validation rules derived from a table definition
// A schema is plain data: an ordered list of per-field rules plus computed
// fields. Rules coerce store representations (0/1 booleans, numeric strings)
// into the entity's declared shape and report every failing field at once.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

use crate::ent_framework::table::{ColumnDefinition, ColumnType, TableDefinition};
use crate::error::{AppError, AppResult, FieldIssue, FieldIssues};
use crate::infrastructure::database::Row;

/// Shape a single field value must have.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Boolean,
    /// RFC 3339 text or epoch milliseconds; normalised to RFC 3339 UTC.
    Timestamp,
    /// Base64 text.
    Blob,
    Enum(Vec<String>),
    List(Box<FieldRule>),
    Object(Box<Schema>),
    Any,
}

impl FieldKind {
    fn describe(&self) -> String {
        match self {
            FieldKind::Text => "string".to_string(),
            FieldKind::Integer => "integer".to_string(),
            FieldKind::Number => "number".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Timestamp => "timestamp".to_string(),
            FieldKind::Blob => "base64 string".to_string(),
            FieldKind::Enum(variants) => variants
                .iter()
                .map(|v| format!("'{}'", v))
                .collect::<Vec<_>>()
                .join(" | "),
            FieldKind::List(_) => "array".to_string(),
            FieldKind::Object(_) => "object".to_string(),
            FieldKind::Any => "any".to_string(),
        }
    }
}

/// Extra constraint checked after the kind matched.
#[derive(Debug, Clone)]
pub enum Check {
    MinLength(usize, String),
    MaxLength(usize, String),
    Pattern(Regex, String),
}

impl Check {
    fn apply(&self, value: &Value) -> Option<FieldIssue> {
        let text = value.as_str()?;
        let failed = match self {
            Check::MinLength(min, _) => text.chars().count() < *min,
            Check::MaxLength(max, _) => text.chars().count() > *max,
            Check::Pattern(regex, _) => !regex.is_match(text),
        };
        failed.then(|| {
            let message = match self {
                Check::MinLength(_, m) | Check::MaxLength(_, m) | Check::Pattern(_, m) => m,
            };
            FieldIssue::new("", message.clone())
        })
    }
}

/// Where a field comes from, which decides whether callers may supply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Column,
    PrimaryKey,
    /// Filled on insert (e.g. `created_at`).
    ServerAssigned,
    /// Not a stored column; joined or derived.
    Extension,
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub nullable: bool,
    /// The key may be absent entirely.
    pub optional: bool,
    /// The table supplies a value when the key is absent on insert.
    pub has_default: bool,
    pub brand: Option<&'static str>,
    pub checks: Vec<Check>,
    pub role: FieldRole,
}

impl FieldRule {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            nullable: false,
            optional: false,
            has_default: false,
            brand: None,
            checks: Vec::new(),
            role: FieldRole::Extension,
        }
    }

    pub fn text() -> Self {
        Self::new(FieldKind::Text)
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn timestamp() -> Self {
        Self::new(FieldKind::Timestamp)
    }

    pub fn blob() -> Self {
        Self::new(FieldKind::Blob)
    }

    pub fn any() -> Self {
        Self::new(FieldKind::Any)
    }

    /// A collection of rows, each conforming to `schema`.
    pub fn list_of(schema: &Schema) -> Self {
        Self::list(Self::object(schema))
    }

    pub fn list(item: FieldRule) -> Self {
        Self::new(FieldKind::List(Box::new(item)))
    }

    pub fn object(schema: &Schema) -> Self {
        Self::new(FieldKind::Object(Box::new(schema.clone())))
    }

    /// Default rule for a column's storage type.
    pub fn for_column(column: &ColumnDefinition) -> Self {
        let kind = match column.column_type {
            ColumnType::Text => FieldKind::Text,
            ColumnType::Integer => FieldKind::Integer,
            ColumnType::Real => FieldKind::Number,
            ColumnType::Boolean => FieldKind::Boolean,
            ColumnType::Timestamp => FieldKind::Timestamp,
            ColumnType::Blob => FieldKind::Blob,
        };
        Self {
            nullable: column.nullable,
            has_default: column.default.is_some(),
            role: if column.is_server_assigned() {
                FieldRole::ServerAssigned
            } else {
                FieldRole::Column
            },
            ..Self::new(kind)
        }
    }

    pub fn brand(mut self, brand: &'static str) -> Self {
        self.brand = Some(brand);
        self
    }

    /// Restrict to a fixed set of string variants.
    pub fn one_of(mut self, variants: &[&str]) -> Self {
        self.kind = FieldKind::Enum(variants.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn min_length(mut self, min: usize, message: &str) -> Self {
        self.checks.push(Check::MinLength(min, message.to_string()));
        self
    }

    pub fn max_length(mut self, max: usize, message: &str) -> Self {
        self.checks.push(Check::MaxLength(max, message.to_string()));
        self
    }

    pub fn non_empty(self, message: &str) -> Self {
        self.min_length(1, message)
    }

    pub fn pattern(mut self, regex: Regex, message: &str) -> Self {
        self.checks.push(Check::Pattern(regex, message.to_string()));
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Present and non-null.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn expected(&self) -> String {
        match self.brand {
            Some(brand) => format!("{} ({})", brand, self.kind.describe()),
            None => self.kind.describe(),
        }
    }

    fn mismatch(&self, received: &Value) -> Vec<FieldIssue> {
        vec![FieldIssue::new(
            "",
            format!("Expected {}, received {}", self.expected(), describe_value(received)),
        )]
    }

    /// Check and coerce one value.
    pub fn validate(&self, value: &Value) -> Result<Value, Vec<FieldIssue>> {
        if value.is_null() {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(self.mismatch(value))
            };
        }

        let coerced = match (&self.kind, value) {
            (FieldKind::Any, v) => v.clone(),
            (FieldKind::Text, Value::String(_)) => value.clone(),
            (FieldKind::Integer, Value::Number(n)) => match n.as_i64() {
                Some(_) => value.clone(),
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
                    _ => return Err(self.mismatch(value)),
                },
            },
            (FieldKind::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::from(i),
                Err(_) => return Err(self.mismatch(value)),
            },
            (FieldKind::Number, Value::Number(_)) => value.clone(),
            (FieldKind::Number, Value::String(s)) => {
                match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                    Some(n) => Value::Number(n),
                    None => return Err(self.mismatch(value)),
                }
            }
            (FieldKind::Boolean, Value::Bool(_)) => value.clone(),
            (FieldKind::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Value::Bool(false),
                Some(1) => Value::Bool(true),
                _ => return Err(self.mismatch(value)),
            },
            (FieldKind::Timestamp, Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(parsed) => Value::String(
                    parsed
                        .with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Micros, true),
                ),
                Err(_) => return Err(self.mismatch(value)),
            },
            (FieldKind::Timestamp, Value::Number(n)) => {
                match n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
                    Some(parsed) => Value::String(parsed.to_rfc3339_opts(SecondsFormat::Micros, true)),
                    None => return Err(self.mismatch(value)),
                }
            }
            (FieldKind::Blob, Value::String(s)) => {
                if STANDARD.decode(s).is_err() {
                    return Err(vec![FieldIssue::new("", "Invalid base64 content")]);
                }
                value.clone()
            }
            (FieldKind::Enum(variants), Value::String(s)) => {
                if !variants.iter().any(|v| v == s) {
                    return Err(vec![FieldIssue::new(
                        "",
                        format!(
                            "Invalid enum value. Expected {}, received '{}'",
                            self.kind.describe(),
                            s
                        ),
                    )]);
                }
                value.clone()
            }
            (FieldKind::List(item), Value::Array(items)) => {
                let mut issues = Vec::new();
                let mut out = Vec::with_capacity(items.len());
                for (index, element) in items.iter().enumerate() {
                    match item.validate(element) {
                        Ok(v) => out.push(v),
                        Err(errs) => {
                            let index = index.to_string();
                            issues.extend(errs.into_iter().map(|e| e.nested(&index)));
                        }
                    }
                }
                if !issues.is_empty() {
                    return Err(issues);
                }
                Value::Array(out)
            }
            (FieldKind::Object(schema), Value::Object(_)) => match schema.parse(value) {
                Ok(row) => Value::Object(row),
                Err(issues) => return Err(issues.0),
            },
            _ => return Err(self.mismatch(value)),
        };

        let issues: Vec<FieldIssue> = self.checks.iter().filter_map(|c| c.apply(&coerced)).collect();
        if issues.is_empty() {
            Ok(coerced)
        } else {
            Err(issues)
        }
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(s) => format!("string '{}'", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

pub type ComputedField = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

type OverrideFn = Box<dyn FnOnce(FieldRule) -> FieldRule + Send>;

/// Per-field adjustments applied on top of the column-derived defaults.
#[derive(Default)]
pub struct Overrides {
    entries: Vec<(String, OverrideFn)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjust the default rule for `name`.
    pub fn field(
        mut self,
        name: &str,
        adjust: impl FnOnce(FieldRule) -> FieldRule + Send + 'static,
    ) -> Self {
        self.entries.push((name.to_string(), Box::new(adjust)));
        self
    }

    /// Swap the rule for `name` entirely. The field keeps its role and
    /// column default, which come from the table.
    pub fn replace(self, name: &str, rule: FieldRule) -> Self {
        self.field(name, move |existing| FieldRule {
            role: existing.role,
            has_default: existing.has_default || rule.has_default,
            ..rule
        })
    }
}

/// Validated entity shape.
#[derive(Clone)]
pub struct Schema {
    entity: String,
    fields: Vec<(String, FieldRule)>,
    computed: Vec<(String, ComputedField)>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("entity", &self.entity)
            .field("fields", &self.fields)
            .field(
                "computed",
                &self.computed.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Schema {
    /// An empty schema, for shapes that are not backed by a table.
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            fields: Vec::new(),
            computed: Vec::new(),
        }
    }

    /// Derive a schema from `table`, then apply `overrides`. Never fails:
    /// an override for an unknown field is skipped.
    pub fn bind(table: &TableDefinition, overrides: Overrides) -> Self {
        let key = &table.primary_key().column;
        let fields = table
            .column_definitions()
            .iter()
            .map(|column| {
                let mut rule = FieldRule::for_column(column);
                if &column.name == key {
                    rule.role = FieldRole::PrimaryKey;
                }
                (column.name.clone(), rule)
            })
            .collect();

        let mut schema = Self {
            entity: table.name().to_string(),
            fields,
            computed: Vec::new(),
        };

        for (name, adjust) in overrides.entries {
            match schema.fields.iter_mut().find(|(field, _)| *field == name) {
                Some((_, rule)) => {
                    let current = rule.clone();
                    *rule = adjust(current);
                }
                None => warn!(
                    entity = %schema.entity,
                    field = %name,
                    "Ignoring override for unknown field"
                ),
            }
        }
        schema
    }

    /// Append a field to a hand-built schema.
    pub fn with_field(mut self, name: &str, rule: FieldRule) -> Self {
        self.fields.retain(|(field, _)| field != name);
        self.fields.push((name.to_string(), rule));
        self
    }

    /// Add non-column fields such as relation collections.
    pub fn extend<'a>(mut self, extra: impl IntoIterator<Item = (&'a str, FieldRule)>) -> Self {
        for (name, mut rule) in extra {
            rule.role = FieldRole::Extension;
            self = self.with_field(name, rule);
        }
        self
    }

    /// Add a field derived from the validated row.
    pub fn computed(
        mut self,
        name: &str,
        derive: impl Fn(&Row) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.computed.push((name.to_string(), Arc::new(derive)));
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[(String, FieldRule)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, rule)| rule)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some() || self.computed.iter().any(|(field, _)| field == name)
    }

    /// What callers may supply on create: stored, caller-writable columns.
    /// Nullable and defaulted columns may be omitted.
    pub fn input_schema(&self) -> Schema {
        let fields = self
            .fields
            .iter()
            .filter(|(_, rule)| rule.role == FieldRole::Column)
            .map(|(name, rule)| {
                let mut rule = rule.clone();
                rule.optional = rule.optional || rule.nullable || rule.has_default;
                // null on a defaulted column selects the default
                rule.nullable = rule.nullable || rule.has_default;
                (name.clone(), rule)
            })
            .collect();
        Self {
            entity: self.entity.clone(),
            fields,
            computed: Vec::new(),
        }
    }

    /// Every field optional.
    pub fn partial(&self) -> Schema {
        let mut schema = self.clone();
        for (_, rule) in schema.fields.iter_mut() {
            rule.optional = true;
        }
        schema
    }

    pub fn without(&self, names: &[&str]) -> Schema {
        let mut schema = self.clone();
        schema.fields.retain(|(field, _)| !names.contains(&field.as_str()));
        schema.computed.retain(|(field, _)| !names.contains(&field.as_str()));
        schema
    }

    pub fn pick(&self, names: &[&str]) -> Schema {
        let mut schema = self.clone();
        schema.fields.retain(|(field, _)| names.contains(&field.as_str()));
        schema.computed.retain(|(field, _)| names.contains(&field.as_str()));
        schema
    }

    /// Validate `value` against every field. Unknown keys are dropped and
    /// computed fields are derived from the validated row.
    pub fn parse(&self, value: &Value) -> Result<Row, FieldIssues> {
        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(FieldIssues(vec![FieldIssue::new(
                    "",
                    format!("Expected object, received {}", describe_value(other)),
                )]))
            }
        };

        let mut row = Row::new();
        let mut issues = Vec::new();
        for (name, rule) in &self.fields {
            match object.get(name) {
                None if rule.optional => {}
                None => issues.push(FieldIssue::new(name.as_str(), "Required")),
                Some(field_value) => match rule.validate(field_value) {
                    Ok(coerced) => {
                        row.insert(name.clone(), coerced);
                    }
                    Err(errs) => issues.extend(errs.into_iter().map(|e| e.nested(name))),
                },
            }
        }

        if !issues.is_empty() {
            return Err(FieldIssues(issues));
        }

        for (name, derive) in &self.computed {
            let derived = derive(&row);
            row.insert(name.clone(), derived);
        }
        Ok(row)
    }

    /// Output-side check: a failure means store and schema disagree.
    pub fn check_output(&self, value: &Value) -> AppResult<Row> {
        self.parse(value).map_err(|issues| {
            error!(entity = %self.entity, %issues, "Row does not match entity schema");
            AppError::schema_mismatch(self.entity.clone(), issues)
        })
    }

    /// Input-side check for caller-supplied data.
    pub fn check_input(&self, value: &Value) -> AppResult<Row> {
        self.parse(value).map_err(AppError::Validation)
    }

    /// Serialize `input` and validate it as caller-supplied data.
    pub fn check_input_of<T: Serialize>(&self, input: &T) -> AppResult<Row> {
        let value = serde_json::to_value(input)?;
        self.check_input(&value)
    }
}
