//! Minimal, namespace-agnostic probes over SAML message XML. Full parsing
//! and signature verification stay in the protocol engine; these helpers only
//! pull out the few fields the engine's API does not expose.

use quick_xml::Reader;
use quick_xml::events::Event;

/// Text content of the first element with the given local name, ignoring
/// namespace prefixes.
pub fn element_text(xml: &str, local_name: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == local_name.as_bytes() => {
                inside = true;
            }
            Ok(Event::Text(t)) if inside => {
                text.push_str(t.unescape().ok()?.as_ref());
            }
            Ok(Event::End(e)) if inside && e.local_name().as_ref() == local_name.as_bytes() => {
                return Some(text);
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Value of an attribute on the first element with the given local name.
pub fn element_attr(xml: &str, local_name: &str, attr_name: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == local_name.as_bytes() =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == attr_name.as_bytes() {
                        return attr.unescape_value().ok().map(|v| v.into_owned());
                    }
                }
                return None;
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Whether the document parses as XML end to end.
pub fn well_formed(xml: &str) -> bool {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return true,
            Err(_) => return false,
            _ => {}
        }
    }
}

pub fn escape(raw: &str) -> String {
    quick_xml::escape::escape(raw).into_owned()
}
