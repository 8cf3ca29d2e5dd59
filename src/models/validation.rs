use std::fmt;

/// Severity of a configuration validation finding.
///
/// `Error` issues are exactly those [`crate::config::ConfigManager::load`]
/// refuses to load; `Warning` issues are surfaced but do not block a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single structured finding from config validation.
///
/// `field` is the dotted path of the offending field, e.g.
/// `installer.metadata.upgrade_code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", tag, self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(ValidationIssue::error("project.name", "must not be empty").is_fatal());
        assert!(!ValidationIssue::warning("project.icon", "file not found").is_fatal());
    }

    #[test]
    fn test_display() {
        let issue = ValidationIssue::error("project.name", "must not be empty");
        assert_eq!(issue.to_string(), "error: project.name: must not be empty");
    }
}
