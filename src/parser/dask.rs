//! Dask Gateway grammar: `<timestamp> - <STATUS>[ - <message>]`.
//!
//! The datacube probe puts its message in the status field instead
//! (`<timestamp> - SUCCESS <msg>`, `<timestamp> - FAILURE: <msg>`); the first
//! word is the status and the rest is message text.

use super::{
    fields, require_arity, split_fields, LineParser, ParseError, ParsedEntry, ServiceKind,
    StatusKind, Timestamp,
};

const SEPARATOR: &str = " - ";

pub struct DaskParser;

impl LineParser for DaskParser {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Dask
    }

    fn parse(&self, line: &str) -> Result<ParsedEntry, ParseError> {
        let parts = split_fields(line, SEPARATOR);
        require_arity(ServiceKind::Dask, &parts, 2)?;

        let timestamp = Timestamp::parse(parts[0])?;
        let (token, inline) = parts[1].split_once(char::is_whitespace).unwrap_or((parts[1], ""));
        let status = StatusKind::from_token(token.trim_end_matches(':'));
        // The message is free text and may itself contain the separator.
        let message = std::iter::once(inline.trim())
            .filter(|m| !m.is_empty())
            .chain(parts[2..].iter().copied())
            .collect::<Vec<_>>()
            .join(SEPARATOR);

        Ok(ParsedEntry::new(timestamp, status).with_extra(fields::MESSAGE, message))
    }
}
