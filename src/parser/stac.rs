//! STAC collection checks:
//! `<timestamp>, <STATUS>, collection: <id>, item: <id>[, reason: <msg>]`.
//!
//! One line is written per checked collection, so a single run produces many
//! lines sharing a timestamp.

use super::{
    fields, prefixed, require_arity, split_fields, LineParser, ParseError, ParsedEntry, ServiceKind,
    StatusKind, Timestamp,
};

const SEPARATOR: &str = ", ";

pub struct StacParser;

impl LineParser for StacParser {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Stac
    }

    fn parse(&self, line: &str) -> Result<ParsedEntry, ParseError> {
        let parts = split_fields(line, SEPARATOR);
        require_arity(ServiceKind::Stac, &parts, 4)?;

        let timestamp = Timestamp::parse(parts[0])?;
        let status = StatusKind::from_token(parts[1]);
        let collection = prefixed(parts[2], fields::COLLECTION).ok_or(ParseError::MissingField {
            grammar: ServiceKind::Stac,
            field: fields::COLLECTION,
        })?;
        let item = prefixed(parts[3], fields::ITEM).ok_or(ParseError::MissingField {
            grammar: ServiceKind::Stac,
            field: fields::ITEM,
        })?;

        // The reason is the tail of the line; rejoin in case it contained ", ".
        let rest = parts[4..].join(SEPARATOR);
        let reason = prefixed(&rest, fields::REASON).unwrap_or(rest.as_str());

        Ok(ParsedEntry::new(timestamp, status)
            .with_extra(fields::COLLECTION, collection)
            .with_extra(fields::ITEM, item)
            .with_extra(fields::REASON, reason))
    }
}
