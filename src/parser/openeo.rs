//! openEO collection checks:
//! `<timestamp>, <status>, collection: <id>[, item: <id>][, reason: <msg>]`.
//!
//! The openEO probe also writes an unprefixed free-text message after the
//! collection; it is kept as `message`.

use super::{
    fields, prefixed, require_arity, split_fields, LineParser, ParseError, ParsedEntry, ServiceKind,
    StatusKind, Timestamp,
};

const SEPARATOR: &str = ", ";

pub struct OpenEoParser;

impl LineParser for OpenEoParser {
    fn kind(&self) -> ServiceKind {
        ServiceKind::OpenEo
    }

    fn parse(&self, line: &str) -> Result<ParsedEntry, ParseError> {
        let parts = split_fields(line, SEPARATOR);
        require_arity(ServiceKind::OpenEo, &parts, 3)?;

        let timestamp = Timestamp::parse(parts[0])?;
        let status = StatusKind::from_token(parts[1]);
        let collection = prefixed(parts[2], fields::COLLECTION).ok_or(ParseError::MissingField {
            grammar: ServiceKind::OpenEo,
            field: fields::COLLECTION,
        })?;

        let mut entry =
            ParsedEntry::new(timestamp, status).with_extra(fields::COLLECTION, collection);

        let mut rest = &parts[3..];
        if let Some(item) = rest.first().and_then(|f| prefixed(f, fields::ITEM)) {
            entry = entry.with_extra(fields::ITEM, item);
            rest = &rest[1..];
        }
        if !rest.is_empty() {
            let tail = rest.join(SEPARATOR);
            entry = match prefixed(&tail, fields::REASON) {
                Some(reason) => entry.with_extra(fields::REASON, reason),
                None => entry.with_extra(fields::MESSAGE, tail),
            };
        }

        Ok(entry)
    }
}
