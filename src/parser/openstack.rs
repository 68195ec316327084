//! OpenStack VM provisioning grammar: `<timestamp>, <STATUS>[, <message>]`.

use super::{
    fields, require_arity, split_fields, LineParser, ParseError, ParsedEntry, ServiceKind,
    StatusKind, Timestamp,
};

const SEPARATOR: &str = ", ";

pub struct OpenStackParser;

impl LineParser for OpenStackParser {
    fn kind(&self) -> ServiceKind {
        ServiceKind::OpenStack
    }

    fn parse(&self, line: &str) -> Result<ParsedEntry, ParseError> {
        let parts = split_fields(line, SEPARATOR);
        require_arity(ServiceKind::OpenStack, &parts, 2)?;

        let timestamp = Timestamp::parse(parts[0])?;
        let status = StatusKind::from_token(parts[1]);
        let message = parts[2..].join(SEPARATOR);

        Ok(ParsedEntry::new(timestamp, status).with_extra(fields::MESSAGE, message))
    }
}
