use serde::Serialize;

/// Log levels understood by the record model.
///
/// `Trace` has no wire equivalent; the severity field is omitted for it and
/// the assembler treats it as below-error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    Alert,
}

/// LogSeverity vocabulary understood by the ingestion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Alert,
}

impl Level {
    /// Map an internal level onto the wire vocabulary. Total over the level
    /// set; `None` for levels the backend has no word for.
    pub fn severity(self) -> Option<Severity> {
        match self {
            Level::Trace => None,
            Level::Debug => Some(Severity::Debug),
            Level::Info => Some(Severity::Info),
            Level::Warn => Some(Severity::Warning),
            Level::Error => Some(Severity::Error),
            Level::Critical => Some(Severity::Critical),
            Level::Alert => Some(Severity::Alert),
        }
    }
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
        }
    }

    /// Severities the error-reporting pipeline treats as discrete error
    /// occurrences.
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::Critical | Severity::Alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_to_severity_mapping() {
        let cases = [
            (Level::Debug, "DEBUG"),
            (Level::Info, "INFO"),
            (Level::Warn, "WARNING"),
            (Level::Error, "ERROR"),
            (Level::Critical, "CRITICAL"),
            (Level::Alert, "ALERT"),
        ];

        for (level, expected) in cases {
            let severity = level.severity().expect("mapped level");
            assert_eq!(severity.as_str(), expected);
        }
    }

    #[test]
    fn test_trace_is_unmapped() {
        assert_eq!(Level::Trace.severity(), None);
    }

    #[test]
    fn test_error_severities() {
        assert!(Severity::Error.is_error());
        assert!(Severity::Critical.is_error());
        assert!(Severity::Alert.is_error());
        assert!(!Severity::Warning.is_error());
        assert!(!Severity::Info.is_error());
        assert!(!Severity::Debug.is_error());
    }

    #[test]
    fn test_severity_serializes_to_wire_string() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }
}
