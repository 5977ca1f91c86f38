use std::fmt;

/// Namespace URI permanently bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A namespace-qualified attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Local name.
    pub name: String,
    /// Namespace URI; empty for unqualified attributes.
    pub namespace: String,
    /// Prefix used in the source document, kept for writing.
    pub prefix: Option<String>,
    /// Unescaped value.
    pub value: String,
}

impl Attribute {
    /// An unqualified attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            prefix: None,
            value: value.into(),
        }
    }

    /// A namespace-qualified attribute written with `prefix`.
    pub fn qualified(
        prefix: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            prefix: Some(prefix.into()),
            value: value.into(),
        }
    }

    /// Whether this attribute has the given local name and namespace.
    pub fn is(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace == namespace
    }
}

/// One item of an element's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Element(Element),
    Text(String),
}

impl Content {
    /// The element, if this item is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(e) => Some(e),
            Self::Text(_) => None,
        }
    }

    /// The text, if this item is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Element(_) => None,
        }
    }

    /// Returns `true` for text items.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// An owned XML element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name.
    pub name: String,
    /// Namespace URI; empty when the element is in no namespace.
    pub namespace: String,
    /// Prefix used in the source document, kept for writing.
    pub prefix: Option<String>,
    /// Attributes in document order.
    pub attributes: Vec<Attribute>,
    /// Child elements and text in document order.
    pub content: Vec<Content>,
}

impl Element {
    /// An element in no namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An element in `namespace`, written with the default namespace.
    pub fn in_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// An empty element sharing this element's name, namespace, and prefix.
    pub fn shallow_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            prefix: self.prefix.clone(),
            attributes: Vec::new(),
            content: Vec::new(),
        }
    }

    /// Set the prefix used when writing.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Add or replace an unqualified attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(Attribute::new(name, value));
        self
    }

    /// Append a text item.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(Content::Text(text.into()));
        self
    }

    /// Append a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.content.push(Content::Element(child));
        self
    }

    /// The unqualified attribute called `name`.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attribute_ns(name, "")
    }

    /// The attribute called `name` in `namespace`.
    pub fn attribute_ns(&self, name: &str, namespace: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is(name, namespace))
    }

    /// Add an attribute, replacing one with the same name and namespace.
    pub fn set_attribute(&mut self, attribute: Attribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.is(&attribute.name, &attribute.namespace))
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.content.iter().filter_map(Content::as_element)
    }

    /// Child elements with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.child_elements().filter(move |e| e.name == name)
    }

    /// Returns `true` if the element has at least one child element.
    pub fn has_child_elements(&self) -> bool {
        self.content.iter().any(|c| matches!(c, Content::Element(_)))
    }

    /// Concatenation of the direct text children.
    pub fn text(&self) -> String {
        self.content.iter().filter_map(Content::as_text).collect()
    }

    /// Concatenation of all descendant text, the XPath string-value.
    pub fn string_value(&self) -> String {
        fn collect(element: &Element, out: &mut String) {
            for item in &element.content {
                match item {
                    Content::Text(t) => out.push_str(t),
                    Content::Element(e) => collect(e, out),
                }
            }
        }

        let mut out = String::new();
        collect(self, &mut out);
        out
    }

    /// Qualified name as written, `prefix:name` or `name`.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.name),
            _ => self.name.clone(),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::write::to_xml_string(self))
    }
}

/// Trim `text` and collapse every internal whitespace run to one space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
