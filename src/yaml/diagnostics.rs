//! YAML error diagnostics pointing at the offending line of a document

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// YAML syntax or shape error with source location
#[derive(Debug, Error, Diagnostic)]
#[error("could not read {filename}: {message}")]
#[diagnostic(code(tbt::yaml::syntax))]
pub struct YamlSyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("error here")]
    span: SourceSpan,

    #[help]
    help: Option<String>,

    filename: String,

    /// The underlying error message
    message: String,
}

impl YamlSyntaxError {
    /// Create an error from a serde_yml error
    pub fn from_serde_error(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));

        let offset = line_col_to_offset(source, line, column);
        let message = err.to_string();
        let help = generate_help(&message);

        Self {
            src: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::from(offset..offset.saturating_add(1)),
            help,
            filename: filename.to_string(),
            message,
        }
    }

    /// The underlying parser message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Parse a YAML document, turning failures into a located diagnostic
pub fn parse_document<T: serde::de::DeserializeOwned>(
    source: &str,
    filename: &str,
) -> Result<T, YamlSyntaxError> {
    serde_yml::from_str(source).map_err(|e| YamlSyntaxError::from_serde_error(&e, source, filename))
}

/// Convert 1-based line/column to byte offset
fn line_col_to_offset(source: &str, line: usize, column: usize) -> usize {
    let mut line_start = 0;
    for (idx, current) in source.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let col_offset = current
                .char_indices()
                .nth(column.saturating_sub(1))
                .map_or(current.len(), |(i, _)| i);
            return line_start + col_offset;
        }
        line_start += current.len();
    }
    source.len().saturating_sub(1)
}

/// Generate suggestions based on the parser message
fn generate_help(message: &str) -> Option<String> {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("tab") {
        return Some(
            "YAML requires spaces for indentation, not tabs. Replace tabs with spaces.".to_string(),
        );
    }

    if msg_lower.contains("duplicate key") {
        return Some("Each key can only appear once. Remove or rename the duplicate key.".to_string());
    }

    if msg_lower.contains("missing field") {
        return Some(
            "A required field is missing. Compare with a file created by `tbt` to see the expected layout."
                .to_string(),
        );
    }

    if msg_lower.contains("unknown variant") {
        return Some("Enumerated values are snake_case, e.g. `in_progress` or `quality_checked`.".to_string());
    }

    if msg_lower.contains("invalid entity prefix") || msg_lower.contains("invalid ulid") {
        return Some("IDs look like BAT-01HC2JB7SMQX7RS1Y0GFKBHPTD; do not edit them by hand.".to_string());
    }

    if msg_lower.contains("invalid value: integer") || msg_lower.contains("invalid type") {
        return Some("Quantities must be non-negative whole numbers.".to_string());
    }

    if msg_lower.contains("mapping values are not allowed") {
        return Some("You may be missing a space after ':' or have incorrect indentation.".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_to_offset() {
        let source = "line1\nline2\nline3";
        assert_eq!(line_col_to_offset(source, 1, 1), 0);
        assert_eq!(line_col_to_offset(source, 2, 1), 6);
        assert_eq!(line_col_to_offset(source, 3, 3), 14);
    }

    #[test]
    fn test_help_generation() {
        assert!(generate_help("found tab character").is_some());
        assert!(generate_help("duplicate key").is_some());
        assert!(generate_help("missing field `quantity_planned`").is_some());
        assert!(generate_help("some random error").is_none());
    }

    #[test]
    fn test_parse_document_reports_filename() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Doc {
            quantity: u32,
        }

        let err = parse_document::<Doc>("quantity: -4\n", "BAT-1.tbt.yaml").unwrap_err();
        assert!(err.to_string().contains("BAT-1.tbt.yaml"));
        assert!(!err.message().is_empty());
    }
}
