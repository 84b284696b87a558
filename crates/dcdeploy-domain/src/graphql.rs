use std::fmt;

use serde::{Deserialize, Serialize};

/// How risky a detected schema change is. Ordered from harmless to destructive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningLevel {
    LogOnly,
    InteractiveAck,
    RequireAck,
    RequireForce,
}

impl WarningLevel {
    pub const ALL: [Self; 4] = [
        Self::LogOnly,
        Self::InteractiveAck,
        Self::RequireAck,
        Self::RequireForce,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::LogOnly => 0,
            Self::InteractiveAck => 1,
            Self::RequireAck => 2,
            Self::RequireForce => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LogOnly => "LOG_ONLY",
            Self::InteractiveAck => "INTERACTIVE_ACK",
            Self::RequireAck => "REQUIRE_ACK",
            Self::RequireForce => "REQUIRE_FORCE",
        }
    }
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workaround {
    pub description: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_with: Option<String>,
}

impl Workaround {
    /// Workaround cell text: the description, plus the replacement when one is offered.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.replace_with {
            Some(replacement) if !replacement.is_empty() => {
                format!("{}\nReplace with:\n{replacement}", self.description)
            }
            _ => self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlErrorExtensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_level: Option<WarningLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workarounds: Vec<Workaround>,
}

/// Structured compiler or migration error. A missing warning level marks a hard error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SourceLocation>,
    #[serde(default)]
    pub extensions: GraphqlErrorExtensions,
}

impl GraphqlError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
            locations: Vec::new(),
            extensions: GraphqlErrorExtensions::default(),
        }
    }

    #[must_use]
    pub const fn with_level(mut self, level: WarningLevel) -> Self {
        self.extensions.warning_level = Some(level);
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.extensions.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn with_workaround(mut self, workaround: Workaround) -> Self {
        self.extensions.workarounds.push(workaround);
        self
    }

    #[must_use]
    pub const fn warning_level(&self) -> Option<WarningLevel> {
        self.extensions.warning_level
    }

    #[must_use]
    pub const fn is_hard_error(&self) -> bool {
        self.extensions.warning_level.is_none()
    }

    /// `Issue | Workaround | Reason` rows: one per workaround with the issue on the
    /// first row only, or a single row with empty workaround cells.
    #[must_use]
    pub fn table_rows(&self) -> Vec<[String; 3]> {
        let issue = self.to_string();
        if self.extensions.workarounds.is_empty() {
            return vec![[issue, String::new(), String::new()]];
        }
        self.extensions
            .workarounds
            .iter()
            .enumerate()
            .map(|(index, workaround)| {
                let first = if index == 0 { issue.clone() } else { String::new() };
                [first, workaround.render(), workaround.reason.clone()]
            })
            .collect()
    }
}

impl fmt::Display for GraphqlError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut header = self.extensions.file.clone().unwrap_or_default();
        if let Some(location) = self.locations.first().filter(|location| location.line > 0) {
            header.push(':');
            header.push_str(&location.line.to_string());
        }
        if !header.is_empty() {
            write!(formatter, "{header}: ")?;
        }
        if !self.path.is_empty() {
            formatter.write_str("On ")?;
            for (index, segment) in self.path.iter().enumerate() {
                match segment {
                    PathSegment::Field(field) if index == 0 => formatter.write_str(field)?,
                    PathSegment::Field(field) => write!(formatter, ".{field}")?,
                    PathSegment::Index(position) => write!(formatter, "[{position}]")?,
                }
            }
            formatter.write_str(": ")?;
        }
        formatter.write_str(&self.message)
    }
}
