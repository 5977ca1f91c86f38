//! Canonical compact serialization of element trees.
//!
//! The output has no XML declaration and no added whitespace. Namespace
//! declarations are emitted on the first element that needs a binding,
//! reusing the prefixes recorded by the reader where possible. Two trees
//! with equal names, namespaces, attributes (in order) and content always
//! serialize to the same string, which is what value comparison relies on.

use quick_xml::escape::{escape, partial_escape};

use crate::node::{Attribute, Content, Element, XML_NAMESPACE};

/// Serialize `element` and its subtree.
pub fn to_xml_string(element: &Element) -> String {
    let mut writer = Writer::default();
    writer.element(element);
    writer.out
}

/// Serialize a text item the same way it appears inside an element.
pub fn escape_text(text: &str) -> String {
    partial_escape(text).into_owned()
}

/// In-scope prefix bindings; `None` is the default namespace.
type Binding = (Option<String>, String);

#[derive(Default)]
struct Writer {
    out: String,
    scopes: Vec<Vec<Binding>>,
    generated: usize,
}

impl Writer {
    fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn prefix_for(&self, uri: &str) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .filter_map(|(p, u)| p.as_ref().filter(|_| u == uri))
            .find(|p| self.lookup(Some(p.as_str())) == Some(uri))
            .cloned()
    }

    fn element(&mut self, element: &Element) {
        let mut declared: Vec<Binding> = Vec::new();
        self.scopes.push(Vec::new());

        let name = self.element_name(element, &mut declared);
        self.out.push('<');
        self.out.push_str(&name);

        let mut attributes = Vec::with_capacity(element.attributes.len());
        for attribute in &element.attributes {
            let qname = self.attribute_name(attribute, &mut declared);
            attributes.push((qname, attribute.value.as_str()));
        }

        for (prefix, uri) in &declared {
            match prefix {
                Some(p) => self.out.push_str(&format!(" xmlns:{p}=\"{}\"", escape(uri))),
                None => self.out.push_str(&format!(" xmlns=\"{}\"", escape(uri))),
            }
        }
        for (qname, value) in attributes {
            self.out.push_str(&format!(" {qname}=\"{}\"", escape(value)));
        }

        if element.content.is_empty() {
            self.out.push_str("/>");
        } else {
            self.out.push('>');
            for item in &element.content {
                match item {
                    Content::Element(child) => self.element(child),
                    Content::Text(text) => self.out.push_str(&partial_escape(text)),
                }
            }
            self.out.push_str("</");
            self.out.push_str(&name);
            self.out.push('>');
        }

        self.scopes.pop();
    }

    fn bind(&mut self, prefix: Option<String>, uri: &str, declared: &mut Vec<Binding>) {
        let binding = (prefix, uri.to_string());
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(binding.clone());
        }
        declared.push(binding);
    }

    fn element_name(&mut self, element: &Element, declared: &mut Vec<Binding>) -> String {
        let prefix = element.prefix.as_deref().filter(|p| !p.is_empty());
        match prefix {
            Some("xml") => {}
            Some(p) => {
                if self.lookup(Some(p)) != Some(element.namespace.as_str()) {
                    self.bind(Some(p.to_string()), &element.namespace, declared);
                }
            }
            None => {
                let current = self.lookup(None).unwrap_or("");
                if current != element.namespace {
                    self.bind(None, &element.namespace, declared);
                }
            }
        }
        element.qualified_name()
    }

    fn attribute_name(&mut self, attribute: &Attribute, declared: &mut Vec<Binding>) -> String {
        if attribute.namespace.is_empty() {
            return attribute.name.clone();
        }
        if attribute.namespace == XML_NAMESPACE {
            return format!("xml:{}", attribute.name);
        }

        let wanted = attribute.prefix.as_deref().filter(|p| !p.is_empty());
        let prefix = match wanted {
            Some(p) if self.lookup(Some(p)) == Some(attribute.namespace.as_str()) => p.to_string(),
            Some(p) if self.lookup(Some(p)).is_none() => {
                self.bind(Some(p.to_string()), &attribute.namespace, declared);
                p.to_string()
            }
            _ => match self.prefix_for(&attribute.namespace) {
                Some(p) => p,
                None => {
                    let p = self.fresh_prefix();
                    self.bind(Some(p.clone()), &attribute.namespace, declared);
                    p
                }
            },
        };
        format!("{prefix}:{}", attribute.name)
    }

    fn fresh_prefix(&mut self) -> String {
        loop {
            let candidate = format!("ns{}", self.generated);
            self.generated += 1;
            if self.lookup(Some(&candidate)).is_none() {
                return candidate;
            }
        }
    }
}
