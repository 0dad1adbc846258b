// Hoerbuch - Narrated audiobooks from text documents
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Word (.docx) and OpenDocument (.odt) documents
//!
//! # DOCX
//! - `word/document.xml`: body paragraphs (`w:p`), text runs (`w:t`)
//! - `word/styles.xml`: style id → style name, to recognise headings
//! - `docProps/core.xml`: `dc:title`, `dc:creator`
//!
//! Paragraphs whose style name starts with "Heading" or "Überschrift" start
//! a new segment. Only direct children of `w:body` count, so table content
//! is not narrated.
//!
//! # ODT
//! - `content.xml`: `text:h` headings and `text:p` paragraphs
//! - `meta.xml`: `dc:title`, `meta:initial-creator` / `dc:creator`
//!
//! A paragraph is a heading if it is a `text:h` or its style (or the parent
//! of its automatic style) is named "heading..." or contains "überschrift".
//! Footnotes and annotations are skipped.

use crate::document::{decode_text, non_empty, Archive, ExtractedDocument, SegmentBuilder};
use crate::error::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Attribute value by qualified name
pub(crate) fn attribute(element: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    match element.try_get_attribute(key)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Text content of the first occurrence of each element in `names`
pub(crate) fn element_texts(xml: &str, names: &[&str]) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut found = HashMap::new();
    let mut capturing: Option<(String, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if capturing.is_none() && names.contains(&name.as_str()) && !found.contains_key(&name) {
                    capturing = Some((name, String::new()));
                }
            }
            Event::Text(t) => {
                if let Some((_, text)) = capturing.as_mut() {
                    text.push_str(&decode_text(&t));
                }
            }
            Event::CData(c) => {
                if let Some((_, text)) = capturing.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                let name = e.name();
                if capturing.as_ref().map(|(n, _)| n.as_bytes()) == Some(name.as_ref()) {
                    if let Some((name, text)) = capturing.take() {
                        if let Some(text) = non_empty(&text) {
                            found.insert(name, text);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(found)
}

fn is_docx_heading(style_name: &str) -> bool {
    let lower = style_name.to_lowercase();
    lower.starts_with("heading") || lower.starts_with("überschrift")
}

/// Style id → display name from `word/styles.xml`
fn docx_style_names(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut names = HashMap::new();
    let mut current_id: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"w:style" => current_id = attribute(&e, b"w:styleId")?,
                b"w:name" => {
                    if let (Some(id), Some(name)) = (current_id.as_ref(), attribute(&e, b"w:val")?) {
                        names.insert(id.clone(), name);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"w:style" => current_id = None,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(names)
}

/// Paragraph being collected
struct Paragraph {
    heading: bool,
    style: Option<String>,
    text: String,
}

fn docx_paragraphs(
    xml: &str,
    style_names: &HashMap<String, String>,
    builder: &mut SegmentBuilder,
) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut body_depth: Option<usize> = None;
    let mut paragraph: Option<Paragraph> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                match e.name().as_ref() {
                    b"w:body" => body_depth = Some(depth),
                    b"w:p" if body_depth.map(|d| d + 1) == Some(depth) => {
                        paragraph = Some(Paragraph {
                            heading: false,
                            style: None,
                            text: String::new(),
                        });
                    }
                    b"w:pStyle" => set_docx_style(&mut paragraph, &e)?,
                    b"w:t" => in_text = true,
                    _ => {}
                }
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"w:pStyle" => set_docx_style(&mut paragraph, &e)?,
                b"w:tab" => push_text(&mut paragraph, "\t"),
                b"w:br" | b"w:cr" => push_text(&mut paragraph, "\n"),
                _ => {}
            },
            Event::Text(t) if in_text => push_text(&mut paragraph, &decode_text(&t)),
            Event::End(e) => {
                match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:p" if body_depth.map(|d| d + 1) == Some(depth) => {
                        if let Some(done) = paragraph.take() {
                            let style_name = done
                                .style
                                .as_ref()
                                .map(|id| style_names.get(id).unwrap_or(id).as_str());
                            finish_paragraph(builder, done.text, style_name.map(is_docx_heading).unwrap_or(false));
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}

fn set_docx_style(paragraph: &mut Option<Paragraph>, element: &BytesStart) -> Result<()> {
    if let Some(p) = paragraph.as_mut() {
        p.style = attribute(element, b"w:val")?;
    }
    Ok(())
}

fn push_text(paragraph: &mut Option<Paragraph>, text: &str) {
    if let Some(p) = paragraph.as_mut() {
        p.text.push_str(text);
    }
}

fn finish_paragraph(builder: &mut SegmentBuilder, text: String, heading: bool) {
    if let Some(text) = non_empty(&text) {
        if heading {
            builder.heading(text);
        } else {
            builder.paragraph(text);
        }
    }
}

/// Extract segments and metadata from a `.docx` file
pub fn parse_docx(bytes: &[u8], stem: &str) -> Result<ExtractedDocument> {
    let mut archive = Archive::open(bytes)?;

    let style_names = match archive.read_optional("word/styles.xml")? {
        Some(xml) => docx_style_names(&xml)?,
        None => HashMap::new(),
    };

    let document = archive.read_string("word/document.xml")?;
    let mut builder = SegmentBuilder::new(stem);
    docx_paragraphs(&document, &style_names, &mut builder)?;

    let mut metadata = match archive.read_optional("docProps/core.xml")? {
        Some(xml) => element_texts(&xml, &["dc:title", "dc:creator"])?,
        None => HashMap::new(),
    };

    Ok(ExtractedDocument {
        segments: builder.finish(),
        title: metadata.remove("dc:title"),
        author: metadata.remove("dc:creator"),
    })
}

fn is_odt_heading_style(style_name: &str) -> bool {
    let lower = style_name.to_lowercase();
    lower.starts_with("heading") || lower.contains("überschrift")
}

fn odt_paragraphs(xml: &str, builder: &mut SegmentBuilder) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut parent_styles: HashMap<String, String> = HashMap::new();
    let mut paragraph: Option<Paragraph> = None;
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"text:note" | b"office:annotation" => skip_depth += 1,
                _ if skip_depth > 0 => {}
                b"style:style" => record_parent_style(&mut parent_styles, &e)?,
                name @ (b"text:h" | b"text:p") => {
                    if paragraph.is_none() {
                        paragraph = Some(Paragraph {
                            heading: name == b"text:h",
                            style: attribute(&e, b"text:style-name")?,
                            text: String::new(),
                        });
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                _ if skip_depth > 0 => {}
                b"style:style" => record_parent_style(&mut parent_styles, &e)?,
                b"text:s" => {
                    let count = attribute(&e, b"text:c")?
                        .and_then(|c| c.parse::<usize>().ok())
                        .unwrap_or(1);
                    push_text(&mut paragraph, &" ".repeat(count));
                }
                b"text:tab" => push_text(&mut paragraph, "\t"),
                b"text:line-break" => push_text(&mut paragraph, "\n"),
                _ => {}
            },
            Event::Text(t) if skip_depth == 0 => push_text(&mut paragraph, &decode_text(&t)),
            Event::End(e) => match e.name().as_ref() {
                b"text:note" | b"office:annotation" => skip_depth = skip_depth.saturating_sub(1),
                _ if skip_depth > 0 => {}
                b"text:h" | b"text:p" => {
                    if let Some(done) = paragraph.take() {
                        let heading = done.heading
                            || done.style.as_deref().is_some_and(|style| {
                                is_odt_heading_style(style)
                                    || parent_styles
                                        .get(style)
                                        .is_some_and(|parent| is_odt_heading_style(parent))
                            });
                        finish_paragraph(builder, done.text, heading);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}

fn record_parent_style(parents: &mut HashMap<String, String>, element: &BytesStart) -> Result<()> {
    if let (Some(name), Some(parent)) = (
        attribute(element, b"style:name")?,
        attribute(element, b"style:parent-style-name")?,
    ) {
        parents.insert(name, parent);
    }
    Ok(())
}

/// Extract segments and metadata from an `.odt` file
pub fn parse_odt(bytes: &[u8], stem: &str) -> Result<ExtractedDocument> {
    let mut archive = Archive::open(bytes)?;

    let content = archive.read_string("content.xml")?;
    let mut builder = SegmentBuilder::new(stem);
    odt_paragraphs(&content, &mut builder)?;

    let mut metadata = match archive.read_optional("meta.xml")? {
        Some(xml) => element_texts(&xml, &["dc:title", "meta:initial-creator", "dc:creator"])?,
        None => HashMap::new(),
    };

    let author = metadata
        .remove("meta:initial-creator")
        .or_else(|| metadata.remove("dc:creator"));

    Ok(ExtractedDocument {
        segments: builder.finish(),
        title: metadata.remove("dc:title"),
        author,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chapters::marker::Segment;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub(crate) fn zip_of(members: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in members {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const DOCX_STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:styleId="berschrift1"><w:name w:val="heading 1"/></w:style>
  <w:style w:type="paragraph" w:styleId="Standard"><w:name w:val="Normal"/></w:style>
</w:styles>"#;

    const DOCX_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:pPr><w:pStyle w:val="berschrift1"/></w:pPr><w:r><w:t>Kapitel Eins</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Es war </w:t></w:r><w:r><w:t>einmal &amp; so.</w:t></w:r></w:p>
    <w:p><w:r><w:t>   </w:t></w:r></w:p>
    <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Tabelle</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
    <w:p><w:r><w:t>Zweiter Absatz.</w:t></w:r></w:p>
    <w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Kapitel Zwei</w:t></w:r></w:p>
    <w:p><w:r><w:t>Ende.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    const DOCX_CORE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Ein Märchen</dc:title>
  <dc:creator>Grimm</dc:creator>
</cp:coreProperties>"#;

    #[test]
    fn test_parse_docx() {
        let bytes = zip_of(&[
            ("word/document.xml", DOCX_DOCUMENT),
            ("word/styles.xml", DOCX_STYLES),
            ("docProps/core.xml", DOCX_CORE),
        ]);

        let document = parse_docx(&bytes, "maerchen").unwrap();
        assert_eq!(
            document.segments,
            vec![
                Segment::new("Kapitel Eins", "Es war einmal & so.\nZweiter Absatz."),
                Segment::new("Kapitel Zwei", "Ende."),
            ]
        );
        assert_eq!(document.title.as_deref(), Some("Ein Märchen"));
        assert_eq!(document.author.as_deref(), Some("Grimm"));
    }

    #[test]
    fn test_docx_without_headings_is_one_segment() {
        let document_xml = r#"<w:document xmlns:w="x"><w:body>
            <w:p><w:r><w:t>Nur Text.</w:t></w:r></w:p>
            <w:p><w:r><w:t>Mehr Text.</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let bytes = zip_of(&[("word/document.xml", document_xml)]);

        let document = parse_docx(&bytes, "notiz").unwrap();
        assert_eq!(document.segments, vec![Segment::new("notiz", "Nur Text.\nMehr Text.")]);
        assert_eq!(document.title, None);
    }

    #[test]
    fn test_docx_missing_document_part() {
        let bytes = zip_of(&[("word/styles.xml", DOCX_STYLES)]);
        assert!(parse_docx(&bytes, "x").is_err());
        assert!(parse_docx(b"not a zip", "x").is_err());
    }

    const ODT_CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="o" xmlns:text="t" xmlns:style="s">
  <office:automatic-styles>
    <style:style style:name="P1" style:family="paragraph" style:parent-style-name="Heading_20_1"/>
  </office:automatic-styles>
  <office:body><office:text>
    <text:p text:style-name="P1">Erstes Kapitel</text:p>
    <text:p text:style-name="Standard">Ein <text:span text:style-name="T1">kurzer</text:span><text:s/>Satz.<text:note><text:note-body><text:p>Fußnote</text:p></text:note-body></text:note></text:p>
    <text:h text:outline-level="1">Zweites Kapitel</text:h>
    <text:p text:style-name="Standard">Noch<text:s text:c="2"/>einer.</text:p>
    <text:p text:style-name="Überschrift_20_2">Drittes</text:p>
    <text:p text:style-name="Standard">Schluss.</text:p>
  </office:text></office:body>
</office:document-content>"#;

    const ODT_META: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-meta xmlns:office="o" xmlns:meta="m" xmlns:dc="d">
  <office:meta>
    <dc:title>Die Geschichte</dc:title>
    <meta:initial-creator>Erika Muster</meta:initial-creator>
    <dc:creator>Jemand Anderes</dc:creator>
  </office:meta>
</office:document-meta>"#;

    #[test]
    fn test_parse_odt() {
        let bytes = zip_of(&[("content.xml", ODT_CONTENT), ("meta.xml", ODT_META)]);

        let document = parse_odt(&bytes, "geschichte").unwrap();
        assert_eq!(
            document.segments,
            vec![
                Segment::new("Erstes Kapitel", "Ein kurzer Satz."),
                Segment::new("Zweites Kapitel", "Noch  einer."),
                Segment::new("Drittes", "Schluss."),
            ]
        );
        assert_eq!(document.title.as_deref(), Some("Die Geschichte"));
        assert_eq!(document.author.as_deref(), Some("Erika Muster"));
    }

    #[test]
    fn test_element_texts_first_occurrence() {
        let xml = "<r><a>eins</a><a>zwei</a><b> </b><c>drei</c></r>";
        let texts = element_texts(xml, &["a", "b", "c"]).unwrap();
        assert_eq!(texts.get("a").map(String::as_str), Some("eins"));
        assert_eq!(texts.get("b"), None);
        assert_eq!(texts.get("c").map(String::as_str), Some("drei"));
    }
}
