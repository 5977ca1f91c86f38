//! Reading XML text into an [`Element`] tree.
//!
//! Uses the namespace-aware quick-xml reader. Whitespace is preserved as
//! text content; comments, processing instructions, the XML declaration
//! and the DOCTYPE are dropped. Adjacent character data (text, CDATA and
//! resolved references) is coalesced into one text item.

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::error::{DomError, DomResult};
use crate::node::{Attribute, Content, Element, XML_NAMESPACE};

/// Parse a complete document and return its root element.
pub fn parse_str(xml: &str) -> DomResult<Element> {
    let mut reader = NsReader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(DomError::Parse {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                })
            }
        };

        match event {
            Event::Start(e) => {
                let element = start_element(&reader, &e)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = start_element(&reader, &e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(e) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DomError::UnbalancedEnd(lossy(e.name().as_ref())))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                let raw = utf8(&e)?;
                let text = unescape(raw).map_err(|er| DomError::Parse {
                    position: reader.buffer_position(),
                    message: er.to_string(),
                })?;
                push_text(&mut stack, &text);
            }
            Event::CData(e) => {
                let text = utf8(&e)?.to_string();
                push_text(&mut stack, &text);
            }
            Event::GeneralRef(e) => {
                let name = utf8(e.as_ref())?;
                let resolved = resolve_reference(name).ok_or_else(|| DomError::Parse {
                    position: reader.buffer_position(),
                    message: format!("unknown entity reference &{name};"),
                })?;
                push_text(&mut stack, &resolved);
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(DomError::UnclosedElement(open.qualified_name()));
    }
    root.ok_or(DomError::NoRoot)
}

fn start_element<R: std::io::BufRead>(
    reader: &NsReader<R>,
    start: &BytesStart<'_>,
) -> DomResult<Element> {
    let qname = start.name();
    let (ns, local) = reader.resolver().resolve_element(qname);
    let mut element = Element {
        name: utf8(local.as_ref())?.to_string(),
        namespace: namespace_uri(ns, qname)?,
        prefix: split_prefix(qname.as_ref()).map(lossy),
        attributes: Vec::new(),
        content: Vec::new(),
    };

    for attr in start.attributes() {
        let attr = attr.map_err(|er| DomError::Parse {
            position: reader.buffer_position(),
            message: er.to_string(),
        })?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }

        let (ns, local) = reader.resolver().resolve_attribute(attr.key);
        let raw = utf8(attr.value.as_ref())?;
        let value = unescape(raw).map_err(|er| DomError::Parse {
            position: reader.buffer_position(),
            message: er.to_string(),
        })?;
        element.attributes.push(Attribute {
            name: utf8(local.as_ref())?.to_string(),
            namespace: namespace_uri(ns, attr.key)?,
            prefix: split_prefix(key).map(lossy),
            value: value.into_owned(),
        });
    }

    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> DomResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.content.push(Content::Element(element)),
        None if root.is_some() => return Err(DomError::MultipleRoots),
        None => *root = Some(element),
    }
    Ok(())
}

/// Text outside the root element is dropped.
fn push_text(stack: &mut [Element], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if text.is_empty() {
        return;
    }
    match parent.content.last_mut() {
        Some(Content::Text(previous)) => previous.push_str(text),
        _ => parent.content.push(Content::Text(text.to_string())),
    }
}

fn namespace_uri(ns: ResolveResult<'_>, qname: QName<'_>) -> DomResult<String> {
    match ns {
        ResolveResult::Bound(ns) => Ok(utf8(ns.as_ref())?.to_string()),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) if prefix.as_slice() == b"xml" => {
            Ok(XML_NAMESPACE.to_string())
        }
        ResolveResult::Unknown(_) => Err(DomError::UnknownPrefix(lossy(qname.as_ref()))),
    }
}

fn resolve_reference(name: &str) -> Option<String> {
    if let Some(digits) = name.strip_prefix('#') {
        let code_point = match digits.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => digits.parse::<u32>().ok()?,
        };
        return char::from_u32(code_point).map(String::from);
    }
    resolve_predefined_entity(name).map(str::to_string)
}

fn split_prefix(name: &[u8]) -> Option<&[u8]> {
    let pos = name.iter().position(|b| *b == b':')?;
    Some(&name[..pos])
}

fn utf8(bytes: &[u8]) -> DomResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| DomError::Utf8(e.to_string()))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
