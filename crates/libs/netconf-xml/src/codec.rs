//! Parse and serialize [`XmlElement`] trees with quick-xml.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::tree::XmlElement;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XmlError {
    #[error("malformed xml: {0}")]
    Malformed(String),
    #[error("document has no root element")]
    NoRoot,
    #[error("content after document root")]
    TrailingContent,
}

/// Parse one XML document into its root element.
pub fn parse(input: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(input);

    let mut root: Option<XmlElement> = None;
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref start)) => {
                if root.is_some() && stack.is_empty() {
                    return Err(XmlError::TrailingContent);
                }
                stack.push(element_from_start(start)?);
            }
            Ok(Event::Empty(ref start)) => {
                if root.is_some() && stack.is_empty() {
                    return Err(XmlError::TrailingContent);
                }
                let element = element_from_start(start)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unexpected close tag".to_string()))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(ref text)) => {
                let unescaped = text
                    .decode()
                    .map_err(|err| XmlError::Malformed(err.to_string()))?;
                append_text(&mut stack, &unescaped);
            }
            Ok(Event::CData(ref cdata)) => {
                let raw = std::str::from_utf8(cdata.as_ref())
                    .map_err(|err| XmlError::Malformed(err.to_string()))?;
                append_text(&mut stack, raw);
            }
            Ok(Event::GeneralRef(ref reference)) => {
                let name = std::str::from_utf8(reference.as_ref())
                    .map_err(|err| XmlError::Malformed(err.to_string()))?;
                let resolved = resolve_entity(name)
                    .ok_or_else(|| XmlError::Malformed(format!("unsupported entity &{name};")))?;
                append_text(&mut stack, &resolved);
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions.
            Ok(_) => {}
            Err(err) => return Err(XmlError::Malformed(err.to_string())),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unclosed element".to_string()));
    }
    root.ok_or(XmlError::NoRoot)
}

/// Predefined XML entities and character references.
fn resolve_entity(name: &str) -> Option<String> {
    match name {
        "amp" => Some("&".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "quot" => Some("\"".to_string()),
        "apos" => Some("'".to_string()),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value).map(String::from)
        }
    }
}

/// Serialize an element tree to compact XML text (no declaration).
pub fn serialize(element: &XmlElement) -> String {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, element);
    String::from_utf8(writer.into_inner()).unwrap_or_default()
}

/// Serialize with a leading `<?xml?>` declaration, for on-the-wire documents.
pub fn serialize_document(element: &XmlElement) -> String {
    let mut writer = Writer::new(Vec::new());
    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));
    write_element(&mut writer, element);
    String::from_utf8(writer.into_inner()).unwrap_or_default()
}

fn element_from_start(start: &BytesStart) -> Result<XmlElement, XmlError> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(|err| XmlError::Malformed(err.to_string()))?
        .to_string();
    let mut element = XmlElement::new(tag);
    for attr in start.attributes() {
        let attr = attr.map_err(|err| XmlError::Malformed(err.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| XmlError::Malformed(err.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Malformed(err.to_string()))?
            .into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn append_text(stack: &mut [XmlElement], text: &str) {
    if let Some(current) = stack.last_mut() {
        current.text.push_str(text);
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) {
    let mut start = BytesStart::new(element.tag.as_str());
    for (key, value) in &element.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.text.is_empty() && element.children.is_empty() {
        let _ = writer.write_event(Event::Empty(start));
        return;
    }

    let _ = writer.write_event(Event::Start(start));
    if !element.text.is_empty() {
        let _ = writer.write_event(Event::Text(BytesText::new(element.text.as_str())));
    }
    for child in &element.children {
        write_element(writer, child);
    }
    let _ = writer.write_event(Event::End(BytesEnd::new(element.tag.as_str())));
}
