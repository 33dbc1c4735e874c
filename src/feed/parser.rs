//! Defensive Atom+CAP parsing.
//!
//! One document maps to a sequence of per-entry outcomes: an entry either
//! yields an [`AlertRecord`] or a [`SkipReason`] that tests and logs can
//! observe. Only a document that is not well-formed XML at all aborts the
//! whole pass with [`FeedError::Malformed`].

use std::fmt::{self, Display};

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};

use crate::error::FeedError;
use crate::model::{AlertDetail, AlertRecord};

const ATOM_NS: Namespace<'static> = Namespace(b"http://www.w3.org/2005/Atom");
const CAP_NS: Namespace<'static> = Namespace(b"urn:oasis:names:tc:emergency:cap:1.1");

type Reader<'a> = NsReader<&'a [u8]>;

/// Result of parsing one feed entry.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryOutcome {
    Record(AlertRecord),
    Skipped(SkipReason),
}

/// Why an individual entry was dropped. Never escalates past the entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    MissingTitle,
    MissingTimestamp,
    InvalidTimestamp,
    MissingPayload,
    UnreadablePayload,
    MissingIdentifier,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingTitle => "entry has no title",
            Self::MissingTimestamp => "entry has no updated timestamp",
            Self::InvalidTimestamp => "entry timestamp does not parse",
            Self::MissingPayload => "entry has no CAP payload",
            Self::UnreadablePayload => "CAP payload does not parse",
            Self::MissingIdentifier => "CAP payload has no identifier",
        })
    }
}

/// Parse a raw feed document into per-entry outcomes, in document order.
///
/// # Errors
///
/// Returns [`FeedError::Malformed`] when the document itself cannot be
/// read as XML; individual bad entries come back as
/// [`EntryOutcome::Skipped`] instead.
pub fn parse_feed(raw: &[u8]) -> Result<Vec<EntryOutcome>, FeedError> {
    let text = std::str::from_utf8(raw).map_err(|err| FeedError::Malformed {
        message: err.to_string(),
    })?;
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut outcomes = Vec::new();
    loop {
        let (resolved, event) = next_event(&mut reader)?;
        let ns = resolve(resolved);
        match event {
            Event::Start(e) if ns == Ns::Atom && e.local_name().as_ref() == b"entry" => {
                outcomes.push(parse_entry(&mut reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(outcomes)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Ns {
    Atom,
    Cap,
    Other,
}

fn resolve(result: ResolveResult<'_>) -> Ns {
    match result {
        ResolveResult::Bound(ns) if ns == ATOM_NS => Ns::Atom,
        ResolveResult::Bound(ns) if ns == CAP_NS => Ns::Cap,
        _ => Ns::Other,
    }
}

fn next_event<'buf, 'a>(
    reader: &'buf mut Reader<'a>,
) -> Result<(ResolveResult<'buf>, Event<'a>), FeedError> {
    reader.read_resolved_event().map_err(|err| FeedError::Malformed {
        message: err.to_string(),
    })
}

/// Everything found inside one `<atom:content>` element.
enum ContentPayload {
    Inline(RawAlert),
    Text(String),
    Empty,
}

#[derive(Default)]
struct RawAlert {
    identifier: Option<String>,
    sender: Option<String>,
    sent: Option<String>,
    status: Option<String>,
    msg_type: Option<String>,
    source: Option<String>,
    scope: Option<String>,
    code: Option<String>,
    note: Option<String>,
    references: Option<String>,
    details: Vec<AlertDetail>,
}

fn parse_entry(reader: &mut Reader<'_>) -> Result<EntryOutcome, FeedError> {
    let mut title: Option<String> = None;
    let mut updated_raw: Option<String> = None;
    let mut content: Option<ContentPayload> = None;

    loop {
        let (resolved, event) = next_event(reader)?;
        let ns = resolve(resolved);
        match event {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                match (ns, local.as_slice()) {
                    (Ns::Atom, b"title") => title = Some(element_text(reader)?),
                    (Ns::Atom, b"updated") => updated_raw = Some(element_text(reader)?),
                    (Ns::Atom, b"content") => content = Some(parse_content(reader)?),
                    _ => skip_element(reader)?,
                }
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(FeedError::Malformed {
                    message: "document ended inside an entry".to_string(),
                });
            }
            _ => {}
        }
    }

    Ok(build_record(title, updated_raw, content))
}

/// Assemble the record, or name the first reason the entry cannot become
/// one. Pure so the skip taxonomy is easy to pin down in tests.
fn build_record(
    title: Option<String>,
    updated_raw: Option<String>,
    content: Option<ContentPayload>,
) -> EntryOutcome {
    let Some(title) = title.filter(|t| !t.is_empty()) else {
        return EntryOutcome::Skipped(SkipReason::MissingTitle);
    };
    let Some(updated_raw) = updated_raw.filter(|t| !t.is_empty()) else {
        return EntryOutcome::Skipped(SkipReason::MissingTimestamp);
    };
    let Some(updated) = parse_timestamp(&updated_raw) else {
        return EntryOutcome::Skipped(SkipReason::InvalidTimestamp);
    };

    let alert = match content {
        None | Some(ContentPayload::Empty) => {
            return EntryOutcome::Skipped(SkipReason::MissingPayload);
        }
        Some(ContentPayload::Inline(alert)) => alert,
        Some(ContentPayload::Text(text)) => match parse_embedded_alert(&text) {
            Some(alert) => alert,
            None => return EntryOutcome::Skipped(SkipReason::UnreadablePayload),
        },
    };

    let Some(identifier) = alert.identifier.filter(|id| !id.is_empty()) else {
        return EntryOutcome::Skipped(SkipReason::MissingIdentifier);
    };

    let sent = match alert.sent.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match parse_timestamp(raw) {
            Some(dt) => Some(dt),
            None => return EntryOutcome::Skipped(SkipReason::InvalidTimestamp),
        },
    };

    EntryOutcome::Record(AlertRecord {
        identifier,
        title,
        updated,
        sent,
        sender: alert.sender,
        status: alert.status,
        msg_type: alert.msg_type,
        source: alert.source,
        scope: alert.scope,
        code: alert.code,
        note: alert.note,
        references: alert.references,
        details: alert.details,
    })
}

/// Upstream timestamps are RFC 3339 most of the time; some historic
/// entries drop the offset, those are read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

fn parse_content(reader: &mut Reader<'_>) -> Result<ContentPayload, FeedError> {
    let mut text = String::new();
    let mut inline: Option<RawAlert> = None;

    loop {
        let (resolved, event) = next_event(reader)?;
        let ns = resolve(resolved);
        match event {
            Event::Start(e) => {
                if ns == Ns::Cap && e.local_name().as_ref() == b"alert" {
                    inline = Some(parse_alert(reader)?);
                } else {
                    skip_element(reader)?;
                }
            }
            Event::Text(t) => text.push_str(&unescape_text(&t)?),
            Event::CData(t) => text.push_str(&String::from_utf8_lossy(&t)),
            Event::End(_) => break,
            Event::Eof => {
                return Err(FeedError::Malformed {
                    message: "document ended inside entry content".to_string(),
                });
            }
            _ => {}
        }
    }

    if let Some(alert) = inline {
        Ok(ContentPayload::Inline(alert))
    } else if text.trim().is_empty() {
        Ok(ContentPayload::Empty)
    } else {
        Ok(ContentPayload::Text(text))
    }
}

/// Second parse pass for the escaped-text form of the payload. Any
/// failure here is an entry-level problem, never a document error.
fn parse_embedded_alert(text: &str) -> Option<RawAlert> {
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(true);
    loop {
        let (resolved, event) = reader.read_resolved_event().ok()?;
        let ns = resolve(resolved);
        match event {
            Event::Start(e) if ns == Ns::Cap && e.local_name().as_ref() == b"alert" => {
                return parse_alert(&mut reader).ok();
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn parse_alert(reader: &mut Reader<'_>) -> Result<RawAlert, FeedError> {
    let mut alert = RawAlert::default();
    loop {
        let (resolved, event) = next_event(reader)?;
        let ns = resolve(resolved);
        match event {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                if ns != Ns::Cap {
                    skip_element(reader)?;
                    continue;
                }
                match local.as_slice() {
                    b"identifier" => alert.identifier = Some(element_text(reader)?),
                    b"sender" => alert.sender = Some(element_text(reader)?),
                    b"sent" => alert.sent = Some(element_text(reader)?),
                    b"status" => alert.status = Some(element_text(reader)?),
                    b"msgType" => alert.msg_type = Some(element_text(reader)?),
                    b"source" => alert.source = Some(element_text(reader)?),
                    b"scope" => alert.scope = Some(element_text(reader)?),
                    b"code" => alert.code = Some(element_text(reader)?),
                    b"note" => alert.note = Some(element_text(reader)?),
                    b"references" => alert.references = Some(element_text(reader)?),
                    b"info" => alert.details.push(parse_info(reader)?),
                    _ => skip_element(reader)?,
                }
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(FeedError::Malformed {
                    message: "document ended inside a CAP alert".to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(alert)
}

fn parse_info(reader: &mut Reader<'_>) -> Result<AlertDetail, FeedError> {
    let mut detail = AlertDetail::default();
    loop {
        let (resolved, event) = next_event(reader)?;
        let ns = resolve(resolved);
        match event {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                if ns != Ns::Cap {
                    skip_element(reader)?;
                    continue;
                }
                match local.as_slice() {
                    b"language" => detail.language = Some(element_text(reader)?),
                    b"category" => detail.category = Some(element_text(reader)?),
                    b"event" => detail.event = Some(element_text(reader)?),
                    b"responseType" => detail.response_type = Some(element_text(reader)?),
                    b"urgency" => detail.urgency = Some(element_text(reader)?),
                    b"severity" => detail.severity = Some(element_text(reader)?),
                    b"certainty" => detail.certainty = Some(element_text(reader)?),
                    b"audience" => detail.audience = Some(element_text(reader)?),
                    b"eventCode" => detail.event_code = Some(element_text(reader)?),
                    b"effective" => detail.effective = Some(element_text(reader)?),
                    b"onset" => detail.onset = Some(element_text(reader)?),
                    b"expires" => detail.expires = Some(element_text(reader)?),
                    b"senderName" => detail.sender_name = Some(element_text(reader)?),
                    b"headline" => detail.headline = Some(element_text(reader)?),
                    b"description" => detail.description = Some(element_text(reader)?),
                    b"instruction" => detail.instruction = Some(element_text(reader)?),
                    b"web" => detail.web = Some(element_text(reader)?),
                    b"contact" => detail.contact = Some(element_text(reader)?),
                    b"area" => parse_area(reader, &mut detail)?,
                    _ => skip_element(reader)?,
                }
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(FeedError::Malformed {
                    message: "document ended inside a CAP info block".to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(detail)
}

fn parse_area(reader: &mut Reader<'_>, detail: &mut AlertDetail) -> Result<(), FeedError> {
    loop {
        let (resolved, event) = next_event(reader)?;
        let ns = resolve(resolved);
        match event {
            Event::Start(e) => {
                if ns == Ns::Cap && e.local_name().as_ref() == b"circle" {
                    let circle = element_text(reader)?;
                    if detail.area_circle.is_none() && !circle.is_empty() {
                        detail.area_circle = Some(circle);
                    }
                } else {
                    skip_element(reader)?;
                }
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(FeedError::Malformed {
                    message: "document ended inside a CAP area".to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Collect the immediate text of the element just opened, skipping any
/// nested markup, up to and including its end tag.
fn element_text(reader: &mut Reader<'_>) -> Result<String, FeedError> {
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        let (_, event) = next_event(reader)?;
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Text(t) if depth == 0 => out.push_str(&unescape_text(&t)?),
            Event::CData(t) if depth == 0 => out.push_str(&String::from_utf8_lossy(&t)),
            Event::Eof => {
                return Err(FeedError::Malformed {
                    message: "document ended inside an element".to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(out.trim().to_string())
}

/// Consume the subtree of the element just opened.
fn skip_element(reader: &mut Reader<'_>) -> Result<(), FeedError> {
    let mut depth = 0usize;
    loop {
        let (_, event) = next_event(reader)?;
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            Event::Eof => {
                return Err(FeedError::Malformed {
                    message: "document ended inside an element".to_string(),
                });
            }
            _ => {}
        }
    }
}

fn unescape_text(text: &quick_xml::events::BytesText<'_>) -> Result<String, FeedError> {
    text.unescape()
        .map(|cow| cow.into_owned())
        .map_err(|err| FeedError::Malformed {
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{EntryOutcome, SkipReason, parse_feed};
    use crate::model::AlertRecord;

    const CAP_NS: &str = "urn:oasis:names:tc:emergency:cap:1.1";

    fn feed(entries: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>SASMEX-CAP</title>{entries}</feed>"#
        )
        .into_bytes()
    }

    fn entry_with_alert(identifier: &str, severity: &str) -> String {
        format!(
            r#"<entry>
  <title>Sismo</title>
  <updated>2024-05-01T12:00:00-06:00</updated>
  <content type="text/xml">
    <alert xmlns="{CAP_NS}">
      <identifier>{identifier}</identifier>
      <sender>sasmex.net</sender>
      <sent>2024-05-01T11:59:58-06:00</sent>
      <status>Actual</status>
      <msgType>Alert</msgType>
      <scope>Public</scope>
      <info>
        <language>es-MX</language>
        <event>Earthquake</event>
        <urgency>Immediate</urgency>
        <severity>{severity}</severity>
        <headline>Alerta Sismica</headline>
        <area>
          <areaDesc>Ciudad de Mexico</areaDesc>
          <circle>19.4326,-99.1332 50.0</circle>
        </area>
      </info>
    </alert>
  </content>
</entry>"#
        )
    }

    fn records(outcomes: Vec<EntryOutcome>) -> Vec<AlertRecord> {
        outcomes
            .into_iter()
            .filter_map(|o| match o {
                EntryOutcome::Record(r) => Some(r),
                EntryOutcome::Skipped(_) => None,
            })
            .collect()
    }

    fn parse(doc: &[u8]) -> Vec<EntryOutcome> {
        match parse_feed(doc) {
            Ok(outcomes) => outcomes,
            Err(err) => panic!("document should parse: {err}"),
        }
    }

    #[test]
    fn inline_payload_parses_full_record() {
        let outcomes = parse(&feed(&entry_with_alert("X1", "Moderate")));
        let records = records(outcomes);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.identifier, "X1");
        assert_eq!(record.title, "Sismo");
        assert_eq!(record.sender.as_deref(), Some("sasmex.net"));
        assert_eq!(record.msg_type.as_deref(), Some("Alert"));
        assert!(record.sent.is_some());
        assert_eq!(record.severity(), Some("Moderate"));
        assert_eq!(
            record.details[0].area_circle.as_deref(),
            Some("19.4326,-99.1332 50.0")
        );
    }

    #[test]
    fn escaped_payload_is_reparsed() {
        let entry = format!(
            r#"<entry>
  <title>Sismo</title>
  <updated>2024-05-01T12:00:00Z</updated>
  <content type="text">&lt;alert xmlns="{CAP_NS}"&gt;&lt;identifier&gt;E9&lt;/identifier&gt;&lt;info&gt;&lt;severity&gt;Severe&lt;/severity&gt;&lt;/info&gt;&lt;/alert&gt;</content>
</entry>"#
        );
        let records = records(parse(&feed(&entry)));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "E9");
        assert_eq!(records[0].severity(), Some("Severe"));
    }

    #[test]
    fn malformed_entries_are_skipped_in_place() {
        let missing_identifier = format!(
            r#"<entry>
  <title>Sismo</title>
  <updated>2024-05-01T12:00:00Z</updated>
  <content><alert xmlns="{CAP_NS}"><sender>x</sender></alert></content>
</entry>"#
        );
        let doc = feed(&format!(
            "{}{}{}",
            entry_with_alert("A", "Minor"),
            missing_identifier,
            entry_with_alert("B", "Severe"),
        ));
        let outcomes = parse(&doc);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[1],
            EntryOutcome::Skipped(SkipReason::MissingIdentifier)
        );
        let records = records(outcomes);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "A");
        assert_eq!(records[1].identifier, "B");
    }

    #[test]
    fn entry_without_payload_is_skipped() {
        let entry = r"<entry>
  <title>Sismo</title>
  <updated>2024-05-01T12:00:00Z</updated>
</entry>";
        let outcomes = parse(&feed(entry));
        assert_eq!(outcomes, vec![EntryOutcome::Skipped(SkipReason::MissingPayload)]);
    }

    #[test]
    fn garbage_escaped_payload_skips_only_that_entry() {
        let entry = r"<entry>
  <title>Sismo</title>
  <updated>2024-05-01T12:00:00Z</updated>
  <content type='text'>&lt;alert&gt;&lt;broken</content>
</entry>";
        let doc = feed(&format!("{}{}", entry, entry_with_alert("OK1", "Minor")));
        let outcomes = parse(&doc);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0],
            EntryOutcome::Skipped(SkipReason::UnreadablePayload)
        );
        assert_eq!(records(outcomes).len(), 1);
    }

    #[test]
    fn missing_and_invalid_timestamps_skip() {
        let missing = format!(
            r#"<entry><title>Sismo</title><content><alert xmlns="{CAP_NS}"><identifier>T1</identifier></alert></content></entry>"#
        );
        let invalid = format!(
            r#"<entry><title>Sismo</title><updated>yesterday-ish</updated><content><alert xmlns="{CAP_NS}"><identifier>T2</identifier></alert></content></entry>"#
        );
        let outcomes = parse(&feed(&format!("{missing}{invalid}")));
        assert_eq!(
            outcomes,
            vec![
                EntryOutcome::Skipped(SkipReason::MissingTimestamp),
                EntryOutcome::Skipped(SkipReason::InvalidTimestamp),
            ]
        );
    }

    #[test]
    fn zero_info_blocks_still_delivers() {
        let entry = format!(
            r#"<entry>
  <title>Sismo</title>
  <updated>2024-05-01T12:00:00Z</updated>
  <content><alert xmlns="{CAP_NS}"><identifier>N0</identifier></alert></content>
</entry>"#
        );
        let records = records(parse(&feed(&entry)));
        assert_eq!(records.len(), 1);
        assert!(records[0].details.is_empty());
        assert!(records[0].severity().is_none());
    }

    #[test]
    fn foreign_namespace_fields_are_invisible() {
        // identifier bound to the wrong namespace resolves as absent
        let entry = format!(
            r#"<entry>
  <title>Sismo</title>
  <updated>2024-05-01T12:00:00Z</updated>
  <content><alert xmlns="{CAP_NS}" xmlns:x="urn:example:other"><x:identifier>BAD</x:identifier></alert></content>
</entry>"#
        );
        let outcomes = parse(&feed(&entry));
        assert_eq!(
            outcomes,
            vec![EntryOutcome::Skipped(SkipReason::MissingIdentifier)]
        );
    }

    #[test]
    fn duplicate_identifiers_both_parse_in_document_order() {
        // dedup happens downstream in the store, not here
        let doc = feed(&format!(
            "{}{}",
            entry_with_alert("DUP", "Minor"),
            entry_with_alert("DUP", "Minor"),
        ));
        let records = records(parse(&doc));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, records[1].identifier);
    }

    #[test]
    fn top_level_garbage_is_a_structural_error() {
        let err = parse_feed(b"this is not xml <feed").err();
        assert!(err.is_some());
        let outcomes = parse_feed(b"<feed xmlns=\"http://www.w3.org/2005/Atom\"></feed>");
        match outcomes {
            Ok(v) => assert!(v.is_empty()),
            Err(err) => panic!("empty feed should parse: {err}"),
        }
    }
}
