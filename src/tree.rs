use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

// ---------------------------------------------------------------------------
// Node capability — what the search engine needs from a tree
// ---------------------------------------------------------------------------

/// Read-only view of one element of a configuration tree.
///
/// The matchers, the path resolver and the child lister only talk to the tree
/// through this trait, so any parse-tree representation that can answer these
/// questions can be searched.
pub trait ConfigNode {
    fn tag(&self) -> &str;

    fn attribute(&self, name: &str) -> Option<&str>;

    /// Child elements in document order.
    fn elements(&self) -> impl Iterator<Item = &Self>;

    /// Direct text and CDATA runs in document order, untrimmed.
    fn text_runs(&self) -> impl Iterator<Item = &str>;

    /// Text before the first child element, if any.
    fn leading_text(&self) -> Option<String>;

    fn has_elements(&self) -> bool {
        self.elements().next().is_some()
    }

    /// All direct text runs joined together.
    fn text(&self) -> String {
        self.text_runs().collect()
    }
}

// ---------------------------------------------------------------------------
// XML tree representation
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlChild>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlChild {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), children: Vec::new() }
    }

    /// Returns iterator over child elements (avoids Vec allocation)
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlChild::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text of this element and all its descendants, in document order.
    pub fn deep_text(&self) -> String {
        let mut s = String::new();
        for child in &self.children {
            match child {
                XmlChild::Text(t) | XmlChild::CData(t) => s.push_str(t),
                XmlChild::Element(el) => s.push_str(&el.deep_text()),
                XmlChild::Comment(_) => {}
            }
        }
        s
    }

    /// First child element with the given tag.
    pub fn find_child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|el| el.name == name)
    }
}

impl ConfigNode for XmlElement {
    fn tag(&self) -> &str {
        &self.name
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.get_attribute(name)
    }

    fn elements(&self) -> impl Iterator<Item = &Self> {
        self.child_elements()
    }

    fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|c| match c {
            XmlChild::Text(t) | XmlChild::CData(t) => Some(t.as_str()),
            _ => None,
        })
    }

    fn leading_text(&self) -> Option<String> {
        let mut text: Option<String> = None;
        for child in &self.children {
            match child {
                XmlChild::Element(_) => break,
                XmlChild::Text(t) | XmlChild::CData(t) => text.get_or_insert_with(String::new).push_str(t),
                XmlChild::Comment(_) => {}
            }
        }
        text
    }
}

// ---------------------------------------------------------------------------
// XML parsing — quick-xml events → tree
// ---------------------------------------------------------------------------

/// Parses a document into an owned tree. Whitespace-only text is kept: it can
/// be matched by a keyword, and the child lister needs to see it.
pub fn parse_xml_tree(xml: &str) -> Result<XmlElement, String> {
    let xml = normalize_line_endings(xml);
    let mut reader = Reader::from_str(&xml);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e)?;
                let attrs = read_attributes(e)?;
                stack.push(XmlElement { name, attributes: attrs, children: Vec::new() });
            }
            Ok(Event::End(_)) => {
                let completed = stack.pop().ok_or("Unexpected closing tag")?;
                attach(&mut stack, &mut root, completed)?;
            }
            Ok(Event::Empty(ref e)) => {
                let name = element_name(e)?;
                let attrs = read_attributes(e)?;
                let elem = XmlElement { name, attributes: attrs, children: Vec::new() };
                attach(&mut stack, &mut root, elem)?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|err| format!("Text error: {err}"))?.into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlChild::Text(text));
                }
            }
            Ok(Event::CData(ref e)) => {
                let text = std::str::from_utf8(e.as_ref())
                    .map_err(|err| format!("CData error: {err}"))?
                    .to_string();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlChild::CData(text));
                }
            }
            Ok(Event::Comment(ref e)) => {
                let text = std::str::from_utf8(e.as_ref())
                    .map_err(|err| format!("Comment error: {err}"))?
                    .to_string();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlChild::Comment(text));
                }
            }
            Ok(Event::Eof) => {
                if !stack.is_empty() {
                    let unclosed: Vec<&str> = stack.iter().map(|el| el.name.as_str()).collect();
                    return Err(format!(
                        "XML parse error: unclosed element(s): <{}>",
                        unclosed.join(">, <")
                    ));
                }
                break;
            }
            Ok(_) => {} // Skip declarations, PIs, doctype
            Err(e) => return Err(format!("XML parse error at position {}: {e}", reader.error_position())),
        }
    }

    root.ok_or_else(|| "Empty XML document: no root element found".to_string())
}

/// `\r\n` and lone `\r` become `\n` before parsing, as every XML processor
/// does. A `&#13;` reference still unescapes to a carriage return.
fn normalize_line_endings(xml: &str) -> Cow<'_, str> {
    if !xml.contains('\r') {
        return Cow::Borrowed(xml);
    }
    Cow::Owned(xml.replace("\r\n", "\n").replace('\r', "\n"))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, elem: XmlElement) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlChild::Element(elem));
    } else if root.is_some() {
        return Err(format!("XML parse error: second root element <{}>", elem.name));
    } else {
        *root = Some(elem);
    }
    Ok(())
}

fn element_name(e: &BytesStart) -> Result<String, String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| format!("Invalid element name: {err}"))
}

fn read_attributes(e: &BytesStart) -> Result<Vec<(String, String)>, String> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| format!("Attribute error: {err}"))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| format!("Attribute key error: {err}"))?
            .to_string();
        let val = attr.unescape_value()
            .map_err(|err| format!("Attribute value error: {err}"))?
            .to_string();
        attrs.push((key, val));
    }
    Ok(attrs)
}

// ---------------------------------------------------------------------------
// Document — a parsed retrieval response
// ---------------------------------------------------------------------------

/// Envelope of an API response.
pub const RESPONSE_TAG: &str = "response";
/// Top-level result wrapper inside the envelope.
pub const RESULT_TAG: &str = "result";

/// One retrieved configuration document. Built fresh for every search or
/// drill-down and dropped afterwards.
#[derive(Clone, Debug)]
pub struct Document {
    root: XmlElement,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self, String> {
        parse_xml_tree(xml).map(Self::from_root)
    }

    pub fn from_root(root: XmlElement) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Elements that paths are rooted at.
    ///
    /// The `response` envelope and the `result` wrapper carry no addressing
    /// information, so paths start below them. A document without the
    /// wrappers is addressed from its root element.
    pub fn scope(&self) -> Vec<&XmlElement> {
        let container = match self.root.name.as_str() {
            RESPONSE_TAG => Some(self.root.find_child(RESULT_TAG).unwrap_or(&self.root)),
            RESULT_TAG => Some(&self.root),
            _ => None,
        };
        match container {
            Some(wrapper) => wrapper.child_elements().collect(),
            None => vec![&self.root],
        }
    }

    /// `status` attribute of the response envelope, if present.
    pub fn status(&self) -> Option<&str> {
        (self.root.name == RESPONSE_TAG).then(|| self.root.get_attribute("status")).flatten()
    }
}
