//! Minimal XML lookup backing the [`XmlCursor`] collaborator.
//!
//! The inbound handlers only query element text, attribute values and
//! attribute maps at fixed tag paths, so a small event scanner over the
//! document is sufficient; namespace prefixes are ignored and paths match on
//! local names.

use std::collections::HashMap;

use ehrflow_core::{CoreError, Result};
use ehrflow_inbound::XmlCursor;

#[derive(Debug)]
enum Event {
    Start {
        name: String,
        attributes: HashMap<String, String>,
        self_closing: bool,
    },
    End,
    Text(String),
}

#[derive(Debug)]
struct Query {
    /// `true` for `/A/B` (match from the root), `false` for `//A/B` (match
    /// any suffix).
    anchored: bool,
    segments: Vec<String>,
    attribute: Option<String>,
}

fn parse_query(path: &str) -> Query {
    let (anchored, rest) = match path.strip_prefix("//") {
        Some(rest) => (false, rest),
        None => (true, path.trim_start_matches('/')),
    };
    let mut segments: Vec<String> = rest
        .split('/')
        .filter(|s| !s.is_empty())
        .map(local_name)
        .collect();
    let attribute = segments
        .last()
        .and_then(|s| s.strip_prefix('@'))
        .map(str::to_string);
    if attribute.is_some() {
        segments.pop();
    }
    Query {
        anchored,
        segments,
        attribute,
    }
}

fn local_name(name: &str) -> String {
    name.rsplit(':').next().unwrap_or(name).to_string()
}

fn matches(query: &Query, stack: &[String]) -> bool {
    if query.anchored {
        stack == query.segments.as_slice()
    } else {
        stack.len() >= query.segments.len()
            && stack[stack.len() - query.segments.len()..] == query.segments[..]
    }
}

fn scan(xml: &str) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut rest = xml;
    loop {
        let Some(open) = rest.find('<') else {
            break;
        };
        let text = &rest[..open];
        if !text.trim().is_empty() {
            events.push(Event::Text(text.trim().to_string()));
        }
        rest = &rest[open..];

        if let Some(stripped) = rest.strip_prefix("<!--") {
            let end = stripped
                .find("-->")
                .ok_or_else(|| CoreError::invalid_inbound_message("unterminated XML comment"))?;
            rest = &stripped[end + 3..];
            continue;
        }
        if let Some(stripped) = rest.strip_prefix("<![CDATA[") {
            let end = stripped
                .find("]]>")
                .ok_or_else(|| CoreError::invalid_inbound_message("unterminated CDATA section"))?;
            events.push(Event::Text(stripped[..end].to_string()));
            rest = &stripped[end + 3..];
            continue;
        }
        if rest.starts_with("<?") || rest.starts_with("<!") {
            let end = rest
                .find('>')
                .ok_or_else(|| CoreError::invalid_inbound_message("unterminated XML declaration"))?;
            rest = &rest[end + 1..];
            continue;
        }

        let end = rest
            .find('>')
            .ok_or_else(|| CoreError::invalid_inbound_message("unterminated XML tag"))?;
        let tag = &rest[1..end];
        rest = &rest[end + 1..];

        if let Some(name) = tag.strip_prefix('/') {
            let _ = local_name(name.trim());
            events.push(Event::End);
            continue;
        }

        let self_closing = tag.ends_with('/');
        let tag = tag.trim_end_matches('/').trim();
        let (name, attr_text) = match tag.find(char::is_whitespace) {
            Some(split) => (&tag[..split], &tag[split..]),
            None => (tag, ""),
        };
        events.push(Event::Start {
            name: local_name(name),
            attributes: parse_attributes(attr_text),
            self_closing,
        });
    }
    Ok(events)
}

fn parse_attributes(text: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut rest = text;
    while let Some(eq) = rest.find('=') {
        let name = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let after = &after[1..];
        let Some(close) = after.find(quote) else {
            break;
        };
        attributes.insert(local_name(name), after[..close].to_string());
        rest = &after[close + 1..];
    }
    attributes
}

/// Tag-path based [`XmlCursor`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagPathCursor;

impl TagPathCursor {
    pub fn new() -> Self {
        Self
    }
}

impl XmlCursor for TagPathCursor {
    fn node_value(&self, xml: &str, path: &str) -> Result<Option<String>> {
        let query = parse_query(path);
        let events = scan(xml)?;
        let mut stack: Vec<String> = Vec::new();
        let mut capture_depth: Option<usize> = None;
        let mut text = String::new();

        for event in &events {
            match event {
                Event::Start {
                    name,
                    attributes,
                    self_closing,
                } => {
                    stack.push(name.clone());
                    if capture_depth.is_none() && matches(&query, &stack) {
                        match &query.attribute {
                            Some(attr) => {
                                stack.pop();
                                return Ok(attributes.get(attr).cloned());
                            }
                            None => {
                                if *self_closing {
                                    return Ok(Some(String::new()));
                                }
                                capture_depth = Some(stack.len());
                            }
                        }
                    }
                    if *self_closing {
                        stack.pop();
                    }
                }
                Event::End => {
                    if let Some(depth) = capture_depth
                        && stack.len() == depth
                    {
                        return Ok(Some(text.trim().to_string()));
                    }
                    stack.pop();
                }
                Event::Text(t) => {
                    if capture_depth.is_some() {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(t);
                    }
                }
            }
        }
        Ok(None)
    }

    fn node_entries(&self, xml: &str, path: &str) -> Result<Vec<HashMap<String, String>>> {
        let query = parse_query(path);
        let events = scan(xml)?;
        let mut stack: Vec<String> = Vec::new();
        let mut entries = Vec::new();

        for event in &events {
            match event {
                Event::Start {
                    name,
                    attributes,
                    self_closing,
                } => {
                    stack.push(name.clone());
                    if matches(&query, &stack) {
                        entries.push(attributes.clone());
                    }
                    if *self_closing {
                        stack.pop();
                    }
                }
                Event::End => {
                    stack.pop();
                }
                Event::Text(_) => {}
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"<?xml version="1.0"?>
        <soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
          <soap:Header>
            <eb:MessageHeader xmlns:eb="urn:oasis">
              <eb:ConversationId>c-1</eb:ConversationId>
              <eb:Action>RCMR_IN010000UK05</eb:Action>
              <eb:MessageData>
                <eb:MessageId>m-1</eb:MessageId>
              </eb:MessageData>
            </eb:MessageHeader>
          </soap:Header>
        </soap:Envelope>"#;

    const ACK: &str = r#"
        <MCCI_IN010000UK13>
          <id root="ack-root-1"/>
          <acknowledgement typeCode="AE">
            <messageRef><id root="m-1"/></messageRef>
            <acknowledgementDetail><code code="02" displayName="Rejected"/></acknowledgementDetail>
          </acknowledgement>
          <ControlActEvent>
            <reason>
              <justifyingDetectedIssueEvent>
                <code code="99" displayName="Unexpected condition"/>
              </justifyingDetectedIssueEvent>
            </reason>
            <reason>
              <justifyingDetectedIssueEvent>
                <code code="30" displayName="LM general failure"/>
              </justifyingDetectedIssueEvent>
            </reason>
          </ControlActEvent>
        </MCCI_IN010000UK13>"#;

    #[test]
    fn anchored_path_reads_element_text_ignoring_namespaces() {
        let cursor = TagPathCursor::new();
        let value = cursor
            .node_value(ENVELOPE, "/Envelope/Header/MessageHeader/ConversationId")
            .unwrap();
        assert_eq!(value.as_deref(), Some("c-1"));

        let value = cursor
            .node_value(ENVELOPE, "/Envelope/Header/MessageHeader/MessageData/MessageId")
            .unwrap();
        assert_eq!(value.as_deref(), Some("m-1"));
    }

    #[test]
    fn missing_path_returns_none() {
        let cursor = TagPathCursor::new();
        let value = cursor
            .node_value(ENVELOPE, "/Envelope/Header/MessageHeader/RefToMessageId")
            .unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn floating_path_reads_attribute_value() {
        let cursor = TagPathCursor::new();
        let value = cursor
            .node_value(ACK, "//MCCI_IN010000UK13/acknowledgement/@typeCode")
            .unwrap();
        assert_eq!(value.as_deref(), Some("AE"));

        let value = cursor
            .node_value(ACK, "//MCCI_IN010000UK13/acknowledgement/messageRef/id/@root")
            .unwrap();
        assert_eq!(value.as_deref(), Some("m-1"));

        let value = cursor
            .node_value(ACK, "//MCCI_IN010000UK13/id/@root")
            .unwrap();
        assert_eq!(value.as_deref(), Some("ack-root-1"));
    }

    #[test]
    fn node_entries_returns_attribute_maps_in_document_order() {
        let cursor = TagPathCursor::new();
        let entries = cursor
            .node_entries(ACK, "//justifyingDetectedIssueEvent/code")
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].get("code").map(String::as_str), Some("99"));
        assert_eq!(
            entries[1].get("displayName").map(String::as_str),
            Some("LM general failure")
        );
    }

    #[test]
    fn rejection_details_are_read_from_acknowledgement_detail() {
        let cursor = TagPathCursor::new();
        let entries = cursor
            .node_entries(ACK, "//MCCI_IN010000UK13/acknowledgement/acknowledgementDetail/code")
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get("code").map(String::as_str), Some("02"));
    }

    #[test]
    fn unterminated_tag_is_an_error() {
        let cursor = TagPathCursor::new();
        let err = cursor.node_value("<Envelope", "/Envelope").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInboundMessage(_)));
    }
}
