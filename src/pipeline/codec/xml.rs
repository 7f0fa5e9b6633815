use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::CodecError;

/// One step of a document walk, with namespace prefixes stripped.
pub(crate) enum Node<'a> {
    Open(&'a [(String, String)]),
    Text(&'a str),
    Close,
}

/// Walks `bytes` element by element, handing the callback the path of
/// enclosing local names (current element last) and the node.
pub(crate) fn walk<F>(bytes: &[u8], root: &str, mut visit: F) -> Result<(), CodecError>
where
    F: FnMut(&[String], Node<'_>) -> Result<(), CodecError>,
{
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let (name, attrs) = open_element(&e)?;
                check_root(&mut seen_root, &path, &name, root)?;
                path.push(name);
                visit(&path, Node::Open(&attrs))?;
            }
            Ok(Event::Empty(e)) => {
                let (name, attrs) = open_element(&e)?;
                check_root(&mut seen_root, &path, &name, root)?;
                path.push(name);
                visit(&path, Node::Open(&attrs))?;
                visit(&path, Node::Close)?;
                path.pop();
            }
            Ok(Event::Text(e)) => {
                if path.is_empty() {
                    continue;
                }
                let text = e.unescape().map_err(malformed)?;
                visit(&path, Node::Text(&text))?;
            }
            Ok(Event::CData(e)) => {
                if path.is_empty() {
                    continue;
                }
                let raw = e.into_inner();
                let text = std::str::from_utf8(&raw).map_err(malformed)?;
                visit(&path, Node::Text(text.trim()))?;
            }
            Ok(Event::End(_)) => {
                visit(&path, Node::Close)?;
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(CodecError::MalformedDocument(format!(
            "missing <{}> root element",
            root
        )));
    }
    if let Some(open) = path.last() {
        return Err(CodecError::MalformedDocument(format!(
            "unclosed element <{}>",
            open
        )));
    }
    Ok(())
}

/// True when `path` ends with `tail`.
pub(crate) fn at(path: &[String], tail: &[&str]) -> bool {
    path.len() >= tail.len()
        && path[path.len() - tail.len()..]
            .iter()
            .zip(tail)
            .all(|(a, b)| a == b)
}

/// True when any enclosing element is `name`.
pub(crate) fn within(path: &[String], name: &str) -> bool {
    path.iter().any(|p| p == name)
}

pub(crate) fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub(crate) fn parse_value<T>(text: &str, field: &str) -> Result<T, CodecError>
where
    T: FromStr,
    T::Err: Display,
{
    text.trim().parse::<T>().map_err(|e| {
        CodecError::MalformedDocument(format!("invalid {} value {:?}: {}", field, text, e))
    })
}

pub(crate) fn parse_time(text: &str, field: &str) -> Result<DateTime<Utc>, CodecError> {
    parse_value::<DateTime<Utc>>(text, field)
}

pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn open_element(e: &BytesStart<'_>) -> Result<(String, Vec<(String, String)>), CodecError> {
    let name = utf8(e.local_name().as_ref())?;
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = utf8(attr.key.local_name().as_ref())?;
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        attrs.push((key, value));
    }
    Ok((name, attrs))
}

fn check_root(
    seen_root: &mut bool,
    path: &[String],
    name: &str,
    root: &str,
) -> Result<(), CodecError> {
    if !path.is_empty() {
        return Ok(());
    }
    if *seen_root || name != root {
        return Err(CodecError::MalformedDocument(format!(
            "expected a single <{}> root element, found <{}>",
            root, name
        )));
    }
    *seen_root = true;
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<String, CodecError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(malformed)
}

fn malformed(e: impl Display) -> CodecError {
    CodecError::MalformedDocument(e.to_string())
}

/// Indented XML writer that only ever emits the elements it is given values for.
pub(crate) struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    pub fn new() -> Result<Self, CodecError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { writer })
    }

    pub fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), CodecError> {
        let mut start = BytesStart::new(name);
        for &(key, value) in attrs {
            start.push_attribute((key, value));
        }
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    pub fn close(&mut self, name: &str) -> Result<(), CodecError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn leaf(&mut self, name: &str, value: &str) -> Result<(), CodecError> {
        self.open(name, &[])?;
        self.writer.write_event(Event::Text(BytesText::new(value)))?;
        self.close(name)
    }

    /// Writes `<name>value</name>` only when the value is present.
    pub fn leaf_opt<T: Display>(&mut self, name: &str, value: Option<T>) -> Result<(), CodecError> {
        match value {
            Some(value) => self.leaf(name, &value.to_string()),
            None => Ok(()),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        let mut bytes = self.writer.into_inner();
        bytes.push(b'\n');
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(xml: &str, root: &str) -> Result<Vec<String>, CodecError> {
        let mut seen = Vec::new();
        walk(xml.as_bytes(), root, |path, node| {
            if let Node::Text(text) = node {
                seen.push(format!("{}={}", path.join("/"), text));
            }
            Ok(())
        })?;
        Ok(seen)
    }

    #[test]
    fn strips_namespace_prefixes() {
        let xml = r#"<a xmlns:x="urn:x"><x:b><x:c>1</x:c></x:b></a>"#;
        assert_eq!(collect(xml, "a").unwrap(), vec!["a/b/c=1"]);
    }

    #[test]
    fn rejects_wrong_root() {
        let err = collect("<b/>", "a").unwrap_err();
        assert!(matches!(err, CodecError::MalformedDocument(_)));
    }

    #[test]
    fn rejects_unclosed_document() {
        let err = collect("<a><b>1</b>", "a").unwrap_err();
        assert!(matches!(err, CodecError::MalformedDocument(_)));
    }

    #[test]
    fn rejects_mismatched_end_tag() {
        let err = collect("<a><b>1</c></a>", "a").unwrap_err();
        assert!(matches!(err, CodecError::MalformedDocument(_)));
    }

    #[test]
    fn path_suffix_matching() {
        let path: Vec<String> = ["gpx", "trk", "trkseg", "trkpt", "time"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(at(&path, &["trkpt", "time"]));
        assert!(!at(&path, &["metadata", "time"]));
        assert!(within(&path, "trk"));
    }

    #[test]
    fn writer_omits_absent_leaves() {
        let mut out = XmlOut::new().unwrap();
        out.open("a", &[("k", "v")]).unwrap();
        out.leaf_opt("b", Some(1.5)).unwrap();
        out.leaf_opt::<f64>("c", None).unwrap();
        out.close("a").unwrap();
        let xml = String::from_utf8(out.finish()).unwrap();
        assert!(xml.contains(r#"<a k="v">"#));
        assert!(xml.contains("<b>1.5</b>"));
        assert!(!xml.contains("<c>"));
    }
}
