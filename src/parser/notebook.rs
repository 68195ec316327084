//! Notebook import checks: `<timestamp> - <STATUS>[ - <error>] - <notebook path>`.
//!
//! Success lines have three fields and failures four. The path is always the
//! last field and the error (when present) everything between status and path.

use super::{
    fields, require_arity, split_fields, LineParser, ParseError, ParsedEntry, ServiceKind,
    StatusKind, Timestamp,
};

const SEPARATOR: &str = " - ";

pub struct NotebookParser;

impl LineParser for NotebookParser {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Notebook
    }

    fn parse(&self, line: &str) -> Result<ParsedEntry, ParseError> {
        let parts = split_fields(line, SEPARATOR);
        require_arity(ServiceKind::Notebook, &parts, 3)?;

        let timestamp = Timestamp::parse(parts[0])?;
        let status = StatusKind::from_token(parts[1]);
        let last = parts.len() - 1;
        let notebook = parts[last];
        if notebook.is_empty() {
            return Err(ParseError::MissingField {
                grammar: ServiceKind::Notebook,
                field: fields::NOTEBOOK,
            });
        }
        let error = parts[2..last].join(SEPARATOR);

        Ok(ParsedEntry::new(timestamp, status)
            .with_extra(fields::NOTEBOOK, notebook)
            .with_extra(fields::ERROR, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_line() {
        let entry = NotebookParser
            .parse("2025-01-09 10:12:06 - SUCCESS - demos/workspaces/demo-create-workspace.ipynb")
            .unwrap();
        assert_eq!(entry.status, StatusKind::Success);
        assert_eq!(
            entry.extra(fields::NOTEBOOK),
            Some("demos/workspaces/demo-create-workspace.ipynb")
        );
        assert_eq!(entry.extra(fields::ERROR), None);
    }

    #[test]
    fn test_parse_failure_line() {
        let entry = NotebookParser
            .parse("2025-01-09 10:12:07 - FAILURE - Import Error: No module named 'xarray' - demos/a.ipynb")
            .unwrap();
        assert_eq!(entry.status, StatusKind::Failure);
        assert_eq!(entry.extra(fields::ERROR), Some("Import Error: No module named 'xarray'"));
        assert_eq!(entry.extra(fields::NOTEBOOK), Some("demos/a.ipynb"));
    }

    #[test]
    fn test_skipped_and_invalid_tokens() {
        let skipped = NotebookParser
            .parse("2025-01-09 10:12:08 - SKIPPED - No Imports Found - b.ipynb")
            .unwrap();
        assert_eq!(skipped.status, StatusKind::Skipped);

        let invalid = NotebookParser
            .parse("2025-01-09 10:12:09 - INVALID - Not a valid JSON notebook - c.ipynb")
            .unwrap();
        assert_eq!(invalid.status, StatusKind::Invalid);
        assert_eq!(invalid.extra(fields::ERROR), Some("Not a valid JSON notebook"));
    }

    #[test]
    fn test_two_fields_is_malformed() {
        assert!(matches!(
            NotebookParser.parse("2025-01-09 10:12:06 - SUCCESS"),
            Err(ParseError::Malformed { expected: 3, found: 2, .. })
        ));
    }
}
