//! Manifest export implementation.
//!
//! Writes the computed headers as the main section of a JAR manifest.

use super::{ExportData, Exporter};
use std::io::{self, Write};

/// Maximum bytes per manifest line, excluding the line break.
const LINE_LIMIT: usize = 72;

/// Manifest exporter implementation.
pub struct ManifestExporter;

impl Exporter for ManifestExporter {
    fn export<W: Write>(&self, data: &ExportData<'_>, writer: &mut W) -> io::Result<()> {
        write_header(writer, "Manifest-Version", "1.0")?;
        for (name, value) in data.result.headers() {
            write_header(writer, &name, &value)?;
        }
        write!(writer, "\r\n")
    }
}

/// Writes `name: value`, continuing long lines with a leading space.
fn write_header<W: Write>(writer: &mut W, name: &str, value: &str) -> io::Result<()> {
    let line = format!("{name}: {value}");
    let mut rest = line.as_str();
    let mut limit = LINE_LIMIT;
    loop {
        let split = floor_char_boundary(rest, limit);
        let (head, tail) = rest.split_at(split);
        writer.write_all(head.as_bytes())?;
        writer.write_all(b"\r\n")?;
        if tail.is_empty() {
            return Ok(());
        }
        writer.write_all(b" ")?;
        rest = tail;
        limit = LINE_LIMIT - 1;
    }
}

/// Largest char boundary of `text` at or below `index`, but at least one char.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut split = index;
    while !text.is_char_boundary(split) {
        split -= 1;
    }
    if split == 0 {
        text.chars().next().map_or(text.len(), char::len_utf8)
    } else {
        split
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures;

    fn manifest() -> String {
        let (model, result) = fixtures::analyzed();
        let data = ExportData::new("acme", &model, &result);
        let mut output = Vec::new();
        ManifestExporter.export(&data, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_manifest_headers() {
        let text = manifest();
        assert!(text.starts_with("Manifest-Version: 1.0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        let unwrapped = text.replace("\r\n ", "");
        assert!(unwrapped.contains("Bundle-Activator: com.acme.impl.Activator\r\n"));
        assert!(unwrapped.contains("Export-Package: com.acme.api;version=\"1.2.0\";uses:=\"org.slf4j\"\r\n"));
        assert!(unwrapped.contains("Private-Package: com.acme.impl\r\n"));
    }

    #[test]
    fn test_lines_are_wrapped() {
        let text = manifest();
        assert!(text.split("\r\n").all(|line| line.len() <= LINE_LIMIT));
    }

    #[test]
    fn test_wrap_respects_char_boundaries() {
        let value = "ä".repeat(80);
        let mut output = Vec::new();
        write_header(&mut output, "X", &value).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.replace("\r\n ", "").trim_end(), format!("X: {value}"));
        assert!(text.split("\r\n").all(|line| line.len() <= LINE_LIMIT));
    }
}
