use std::fmt;

/// A single failed field rule, addressed by a dotted path (`technologies.1.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Prefix the path with a parent field or list index.
    pub fn nested(self, parent: &str) -> Self {
        let path = if self.path.is_empty() {
            parent.to_string()
        } else {
            format!("{}.{}", parent, self.path)
        };
        Self { path, ..self }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldIssues(pub Vec<FieldIssue>);

impl FieldIssues {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldIssue> {
        self.0.iter()
    }

    /// Whether any issue is reported for the given field path.
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|issue| issue.path == path)
    }
}

impl fmt::Display for FieldIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|issue| issue.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", joined)
    }
}

impl From<Vec<FieldIssue>> for FieldIssues {
    fn from(issues: Vec<FieldIssue>) -> Self {
        Self(issues)
    }
}

#[derive(Debug)]
pub enum AppError {
    /// Caller-supplied input failed an action's input schema. Nothing was written.
    Validation(FieldIssues),
    /// Data crossing the store boundary does not match the entity's declared shape.
    SchemaMismatch { entity: String, issues: FieldIssues },
    NotFound(String),
    DatabaseError(String),
    /// The store rejected a statement because of a uniqueness constraint.
    UniqueViolation(String),
    SerializationError(String),
    ConfigurationError(String),
    IdGenerationError(String),
    Internal(String),
}

impl AppError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(FieldIssues(vec![FieldIssue::new(path, message)]))
    }

    pub fn schema_mismatch(entity: impl Into<String>, issues: impl Into<FieldIssues>) -> Self {
        AppError::SchemaMismatch {
            entity: entity.into(),
            issues: issues.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, AppError::SchemaMismatch { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, AppError::UniqueViolation(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(issues) => write!(f, "Validation error: {}", issues),
            AppError::SchemaMismatch { entity, issues } => {
                write!(f, "Schema mismatch for {}: {}", entity, issues)
            }
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::UniqueViolation(msg) => write!(f, "Unique constraint violated: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::IdGenerationError(msg) => write!(f, "ID generation error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
