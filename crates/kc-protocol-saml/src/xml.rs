//! Minimal XML object model over quick-xml.
//!
//! Elements keep the byte span they occupy in the source document so that
//! signature handling can cut and splice the original text instead of
//! re-serializing it. DTDs are rejected outright.

use std::borrow::Cow;
use std::ops::Range;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use xml_canonicalization::Canonicalizer;

use crate::error::{SamlError, SamlResult};

/// A namespace binding: prefix (`None` for the default namespace) and URI.
pub type NamespaceBinding = (Option<String>, String);

/// A parsed XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name.
    pub name: String,
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Attributes as (qualified name, unescaped value), excluding `xmlns`.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Concatenated direct text content.
    pub text: String,
    /// Namespaces in scope at this element, innermost last.
    pub namespaces: Vec<NamespaceBinding>,
    /// Byte range of the whole element in the source.
    pub span: Range<usize>,
    /// Byte offset just past the start tag.
    pub content_start: usize,
}

impl XmlElement {
    /// Qualified name as written.
    #[must_use]
    pub fn qualified_name(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(format!("{prefix}:{}", self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }

    /// Returns true if this element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Attribute value by local name.
    #[must_use]
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.rsplit(':').next() == Some(local))
            .map(|(_, value)| value.as_str())
    }

    /// First child element with the given local name.
    #[must_use]
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == local)
    }

    /// All child elements with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == local)
    }

    /// All descendants (excluding self) with the given local name, in
    /// document order.
    #[must_use]
    pub fn descendants(&self, local: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        collect_descendants(self, local, &mut found);
        found
    }

    /// Trimmed text content.
    #[must_use]
    pub fn text_trimmed(&self) -> &str {
        self.text.trim()
    }

    /// Trimmed text of the first child with the given local name.
    #[must_use]
    pub fn child_text(&self, local: &str) -> Option<&str> {
        self.child(local).map(XmlElement::text_trimmed)
    }

    /// Returns the element's source text, carrying in-scope namespace
    /// declarations into its start tag so it parses standalone.
    #[must_use]
    pub fn standalone_source(&self, source: &str) -> String {
        let fragment = &source[self.span.clone()];
        let start_tag = &source[self.span.start..self.content_start];

        let mut declarations = String::new();
        let mut seen: Vec<&Option<String>> = Vec::new();
        for (prefix, uri) in self.namespaces.iter().rev() {
            if seen.contains(&prefix) {
                continue;
            }
            seen.push(prefix);
            let attr = match prefix {
                Some(p) => format!("xmlns:{p}"),
                None => "xmlns".to_string(),
            };
            if !declares(start_tag, &attr) {
                declarations.push_str(&format!(" {attr}=\"{}\"", escape(uri.as_str())));
            }
        }

        if declarations.is_empty() {
            return fragment.to_string();
        }
        let insert_at = 1 + self.qualified_name().len();
        format!(
            "{}{}{}",
            &fragment[..insert_at],
            declarations,
            &fragment[insert_at..]
        )
    }
}

fn declares(start_tag: &str, attr: &str) -> bool {
    start_tag
        .match_indices(attr)
        .any(|(i, _)| {
            let before = start_tag[..i].chars().last();
            let after = start_tag[i + attr.len()..].trim_start().chars().next();
            before.is_some_and(char::is_whitespace) && after == Some('=')
        })
}

fn collect_descendants<'a>(element: &'a XmlElement, local: &str, out: &mut Vec<&'a XmlElement>) {
    for child in &element.children {
        if child.name == local {
            out.push(child);
        }
        collect_descendants(child, local, out);
    }
}

fn split_qname(raw: &str) -> (Option<String>, String) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, raw.to_string()),
    }
}

fn resolve(namespaces: &[NamespaceBinding], prefix: Option<&str>) -> Option<String> {
    namespaces
        .iter()
        .rev()
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, uri)| uri.clone())
        .filter(|uri| !uri.is_empty())
}

fn open_element(
    start: &BytesStart<'_>,
    parent_namespaces: &[NamespaceBinding],
    span_start: usize,
    content_start: usize,
) -> SamlResult<XmlElement> {
    let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let (prefix, name) = split_qname(&raw_name);

    let mut namespaces = parent_namespaces.to_vec();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| SamlError::XmlParse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| SamlError::XmlParse(e.to_string()))?
            .into_owned();

        if key == "xmlns" {
            namespaces.push((None, value));
        } else if let Some(p) = key.strip_prefix("xmlns:") {
            namespaces.push((Some(p.to_string()), value));
        } else {
            attributes.push((key, value));
        }
    }

    let namespace = resolve(&namespaces, prefix.as_deref());
    if prefix.is_some() && namespace.is_none() {
        return Err(SamlError::XmlParse(format!(
            "undeclared namespace prefix in <{raw_name}>"
        )));
    }

    Ok(XmlElement {
        name,
        prefix,
        namespace,
        attributes,
        children: Vec::new(),
        text: String::new(),
        namespaces,
        span: span_start..content_start,
        content_start,
    })
}

/// Parses a document and returns its root element.
///
/// ## Errors
///
/// Returns [`SamlError::XmlParse`] for malformed input, DTDs, undeclared
/// prefixes, or anything other than exactly one root element.
pub fn parse(xml: &str) -> SamlResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event()?;
        let after = reader.buffer_position() as usize;

        match event {
            Event::Start(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(SamlError::XmlParse("multiple root elements".to_string()));
                }
                let parent_ns = stack.last().map(|e| e.namespaces.as_slice()).unwrap_or(&[]);
                let element = open_element(&start, parent_ns, before, after)?;
                stack.push(element);
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                element.span = element.span.start..after;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| SamlError::XmlParse(e.to_string()))?;
                match stack.last_mut() {
                    Some(element) => element.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(SamlError::XmlParse(
                            "text outside the root element".to_string(),
                        ))
                    }
                }
            }
            Event::CData(data) => {
                if let Some(element) = stack.last_mut() {
                    element
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse("DTDs are not allowed".to_string()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

/// Applies exclusive XML canonicalization (without comments).
///
/// ## Errors
///
/// Returns [`SamlError::XmlParse`] if the canonicalizer rejects the input.
pub fn canonicalize(xml: &str) -> SamlResult<String> {
    let mut output = Vec::new();
    Canonicalizer::read_from_str(xml)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| SamlError::XmlParse(format!("canonicalization failed: {e}")))?;

    String::from_utf8(output)
        .map_err(|e| SamlError::XmlParse(format!("canonical form is not UTF-8: {e}")))
}

/// Escapes text for use in element content or attribute values.
#[must_use]
pub fn escape_text(value: &str) -> Cow<'_, str> {
    escape(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_abc" Version="2.0">
  <saml:Issuer>https://sp.example.com</saml:Issuer>
  <saml:NameID Format="urn:x">user&amp;co</saml:NameID>
  <samlp:SessionIndex>s1</samlp:SessionIndex>
  <samlp:SessionIndex/>
</samlp:LogoutRequest>"#;

    #[test]
    fn parses_names_namespaces_and_text() {
        let root = parse(SAMPLE).unwrap();
        assert!(root.is("urn:oasis:names:tc:SAML:2.0:protocol", "LogoutRequest"));
        assert_eq!(root.attr("ID"), Some("_abc"));
        assert_eq!(root.child_text("Issuer"), Some("https://sp.example.com"));

        let name_id = root.child("NameID").unwrap();
        assert_eq!(name_id.text_trimmed(), "user&co");
        assert_eq!(name_id.namespace.as_deref(), Some("urn:oasis:names:tc:SAML:2.0:assertion"));
        assert_eq!(root.children_named("SessionIndex").count(), 2);
    }

    #[test]
    fn spans_cover_source_text() {
        let root = parse(SAMPLE).unwrap();
        let issuer = root.child("Issuer").unwrap();
        assert_eq!(
            &SAMPLE[issuer.span.clone()],
            "<saml:Issuer>https://sp.example.com</saml:Issuer>"
        );
        assert!(SAMPLE[root.span.clone()].starts_with("<samlp:LogoutRequest"));
        assert!(SAMPLE[root.span.clone()].ends_with("</samlp:LogoutRequest>"));
        assert_eq!(&SAMPLE[issuer.span.start..issuer.content_start], "<saml:Issuer>");
    }

    #[test]
    fn standalone_source_carries_inherited_namespaces() {
        let root = parse(SAMPLE).unwrap();
        let issuer = root.child("Issuer").unwrap();
        let standalone = issuer.standalone_source(SAMPLE);
        assert!(standalone.starts_with("<saml:Issuer xmlns:saml="));
        assert!(standalone.contains("xmlns:samlp="));

        let reparsed = parse(&standalone).unwrap();
        assert_eq!(reparsed.text_trimmed(), "https://sp.example.com");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("").is_err());
        assert!(parse("<a/><b/>").is_err());
        assert!(parse("<x:a/>").is_err());
        assert!(parse("<!DOCTYPE a [<!ENTITY e \"boom\">]><a>&e;</a>").is_err());
    }

    #[test]
    fn descendants_in_document_order() {
        let root = parse("<a><b id=\"1\"><b id=\"2\"/></b><c><b id=\"3\"/></c></a>").unwrap();
        let ids: Vec<_> = root.descendants("b").iter().filter_map(|b| b.attr("id")).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn canonicalization_is_stable() {
        let first = canonicalize("<a b=\"1\"   c=\"2\"><d/></a>").unwrap();
        let second = canonicalize(&first).unwrap();
        assert_eq!(first, second);
    }
}
