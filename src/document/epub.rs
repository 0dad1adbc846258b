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

//! EPUB e-books
//!
//! # Reading Order
//! 1. `META-INF/container.xml` names the package document (OPF)
//! 2. OPF: `dc:title`, `dc:creator`, manifest and spine
//! 3. Table of contents, first one that yields entries:
//!    - EPUB 3 navigation document (`nav` with `epub:type="toc"`)
//!    - EPUB 2 NCX `navMap`
//!    - the spine itself
//!
//! Only top-level TOC entries become segments. Fragment identifiers are
//! dropped, so a content document is narrated at most once even when several
//! entries point into it. Body text is joined with single spaces; entries
//! without text are skipped.

use crate::chapters::marker::Segment;
use crate::document::office::{attribute, element_texts};
use crate::document::{decode_text, non_empty, Archive, ExtractedDocument};
use crate::error::{HoerbuchError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use url::Url;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const ARCHIVE_ROOT: &str = "epub://archive/";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// One manifest item
#[derive(Debug, Clone)]
struct ManifestItem {
    href: String,
    media_type: String,
    properties: String,
}

/// Parsed package document
#[derive(Debug, Default)]
struct Package {
    manifest: HashMap<String, ManifestItem>,
    spine: Vec<String>,
    spine_toc: Option<String>,
}

/// Table of contents entry with an archive path
#[derive(Debug, Clone, PartialEq, Eq)]
struct TocEntry {
    title: Option<String>,
    path: String,
}

fn xml_reader(xml: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;
    reader
}

/// Directory part of an archive path, with trailing slash
fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..=pos],
        None => "",
    }
}

/// Resolve `href` against `base_dir` into a normalized archive path
///
/// Both are treated as URL paths below [`ARCHIVE_ROOT`]. The fragment is
/// dropped and the result is percent-decoded.
fn resolve_href(base_dir: &str, href: &str) -> String {
    let base = base_dir
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");

    let resolved = Url::parse(ARCHIVE_ROOT)
        .and_then(|root| root.join(&base))
        .and_then(|base| base.join(href));

    match resolved {
        Ok(url) => {
            let path = url.path().trim_start_matches('/');
            String::from_utf8_lossy(&urlencoding::decode_binary(path.as_bytes())).into_owned()
        }
        Err(e) => {
            warn!("Cannot resolve '{}' against '{}': {}", href, base_dir, e);
            let href = href.split('#').next().unwrap_or("");
            format!("{}{}", base_dir, href)
        }
    }
}

fn rootfile_path(container: &str) -> Result<String> {
    let mut reader = xml_reader(container);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(HoerbuchError::parse(
        "No rootfile in container",
        Some(CONTAINER_PATH.to_string()),
    ))
}

fn parse_package(opf: &str) -> Result<Package> {
    let mut reader = xml_reader(opf);
    let mut package = Package::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"item" => {
                    if let (Some(id), Some(href)) = (attribute(&e, b"id")?, attribute(&e, b"href")?) {
                        package.manifest.insert(
                            id,
                            ManifestItem {
                                href,
                                media_type: attribute(&e, b"media-type")?.unwrap_or_default(),
                                properties: attribute(&e, b"properties")?.unwrap_or_default(),
                            },
                        );
                    }
                }
                b"spine" => package.spine_toc = attribute(&e, b"toc")?,
                b"itemref" => {
                    if let Some(idref) = attribute(&e, b"idref")? {
                        package.spine.push(idref);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(package)
}

/// Top-level entries of an NCX `navMap`
fn parse_ncx(ncx: &str, base_dir: &str) -> Result<Vec<TocEntry>> {
    let mut reader = xml_reader(ncx);
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut in_label = false;
    let mut title = String::new();
    let mut src: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"navPoint" => {
                    depth += 1;
                    if depth == 1 {
                        title.clear();
                        src = None;
                    }
                }
                b"navLabel" if depth == 1 => in_label = true,
                b"content" if depth == 1 => src = attribute(&e, b"src")?.or(src.take()),
                _ => {}
            },
            Event::Empty(e) if depth == 1 && e.local_name().as_ref() == b"content" => {
                if src.is_none() {
                    src = attribute(&e, b"src")?;
                }
            }
            Event::Text(t) if in_label => title.push_str(&decode_text(&t)),
            Event::End(e) => match e.local_name().as_ref() {
                b"navLabel" => in_label = false,
                b"navPoint" => {
                    if depth == 1 {
                        if let Some(src) = src.take() {
                            entries.push(TocEntry {
                                title: non_empty(&title),
                                path: resolve_href(base_dir, &src),
                            });
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

/// Top-level links of the `toc` nav in an EPUB 3 navigation document
fn parse_nav(nav: &str, base_dir: &str) -> Result<Vec<TocEntry>> {
    let mut reader = xml_reader(nav);
    let mut entries = Vec::new();
    let mut in_toc = false;
    let mut nav_depth = 0usize;
    let mut list_depth = 0usize;
    let mut link: Option<(String, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"nav" => {
                    if in_toc {
                        nav_depth += 1;
                    } else {
                        let kind = attribute(&e, b"epub:type")?.unwrap_or_default();
                        if kind.split_whitespace().any(|k| k == "toc") {
                            in_toc = true;
                            nav_depth = 1;
                        }
                    }
                }
                b"ol" if in_toc => list_depth += 1,
                b"a" if in_toc && list_depth == 1 => {
                    if let Some(href) = attribute(&e, b"href")? {
                        link = Some((href, String::new()));
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some((_, text)) = link.as_mut() {
                    text.push_str(&decode_text(&t));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"a" => {
                    if let Some((href, text)) = link.take() {
                        entries.push(TocEntry {
                            title: non_empty(&text),
                            path: resolve_href(base_dir, &href),
                        });
                    }
                }
                b"ol" if in_toc => list_depth = list_depth.saturating_sub(1),
                b"nav" if in_toc => {
                    nav_depth -= 1;
                    if nav_depth == 0 {
                        break;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

/// Body text of an XHTML document and its first heading or `<title>`
fn xhtml_text(xhtml: &str) -> Result<(Option<String>, String)> {
    let mut reader = xml_reader(xhtml);
    let mut parts: Vec<String> = Vec::new();
    let mut in_body = false;
    let mut skip_depth = 0usize;
    let mut heading: Option<(Vec<u8>, String)> = None;
    let mut title: Option<String> = None;
    let mut head_title = String::new();
    let mut in_head_title = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"body" => in_body = true,
                    b"script" | b"style" => skip_depth += 1,
                    b"title" if !in_body => in_head_title = true,
                    b"h1" | b"h2" | b"h3" if in_body && title.is_none() && heading.is_none() => {
                        heading = Some((name, String::new()));
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = decode_text(&t);
                if in_head_title {
                    head_title.push_str(&text);
                }
                if in_body && skip_depth == 0 {
                    if let Some((_, heading_text)) = heading.as_mut() {
                        heading_text.push_str(&text);
                        heading_text.push(' ');
                    }
                    if let Some(part) = non_empty(&text) {
                        parts.push(part);
                    }
                }
            }
            Event::CData(c) if in_body && skip_depth == 0 => {
                if let Some(part) = non_empty(&String::from_utf8_lossy(&c)) {
                    parts.push(part);
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"body" => in_body = false,
                    b"script" | b"style" => skip_depth = skip_depth.saturating_sub(1),
                    b"title" => in_head_title = false,
                    other => {
                        if heading.as_ref().is_some_and(|(tag, _)| tag.as_slice() == other) {
                            if let Some((_, text)) = heading.take() {
                                title = non_empty(&text.split_whitespace().collect::<Vec<_>>().join(" "));
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((title.or_else(|| non_empty(&head_title)), parts.join(" ")))
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Extract segments and metadata from an `.epub` file
pub fn parse_epub(bytes: &[u8], stem: &str) -> Result<ExtractedDocument> {
    let mut archive = Archive::open(bytes)?;

    let container = archive.read_string(CONTAINER_PATH)?;
    let opf_path = rootfile_path(&container)?;
    let opf = archive.read_string(&opf_path)?;
    let opf_dir = parent_dir(&opf_path).to_string();

    let package = parse_package(&opf)?;
    let mut metadata = element_texts(&opf, &["dc:title", "dc:creator"])?;

    let entries = table_of_contents(&mut archive, &package, &opf_dir)?;

    let mut seen = HashSet::new();
    let mut segments = Vec::new();

    for entry in entries {
        if !seen.insert(entry.path.clone()) {
            debug!("Skipping repeated TOC target {}", entry.path);
            continue;
        }

        let xhtml = match archive.read_optional(&entry.path)? {
            Some(xhtml) => xhtml,
            None => {
                debug!("TOC target {} not in archive", entry.path);
                continue;
            }
        };

        let (document_title, text) = match xhtml_text(&xhtml) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("Skipping unreadable chapter {}: {}", entry.path, e);
                continue;
            }
        };

        if text.trim().is_empty() {
            continue;
        }

        let title = entry
            .title
            .or(document_title)
            .unwrap_or_else(|| file_name(&entry.path));
        segments.push(Segment::new(title, text));
    }

    if segments.is_empty() {
        debug!("No segments found in EPUB {}", stem);
    }

    Ok(ExtractedDocument {
        segments,
        title: metadata.remove("dc:title"),
        author: metadata.remove("dc:creator"),
    })
}

fn table_of_contents(archive: &mut Archive, package: &Package, opf_dir: &str) -> Result<Vec<TocEntry>> {
    let href_of = |item: &ManifestItem| resolve_href(opf_dir, &item.href);

    if let Some(nav_item) = package
        .manifest
        .values()
        .find(|item| item.properties.split_whitespace().any(|p| p == "nav"))
    {
        let nav_path = href_of(nav_item);
        if let Some(nav) = archive.read_optional(&nav_path)? {
            let entries = parse_nav(&nav, parent_dir(&nav_path))?;
            if !entries.is_empty() {
                debug!("Using EPUB 3 navigation document ({} entries)", entries.len());
                return Ok(entries);
            }
        }
    }

    let ncx_item = package
        .spine_toc
        .as_ref()
        .and_then(|id| package.manifest.get(id))
        .or_else(|| package.manifest.values().find(|item| item.media_type == NCX_MEDIA_TYPE));

    if let Some(ncx_item) = ncx_item {
        let ncx_path = href_of(ncx_item);
        if let Some(ncx) = archive.read_optional(&ncx_path)? {
            let entries = parse_ncx(&ncx, parent_dir(&ncx_path))?;
            if !entries.is_empty() {
                debug!("Using NCX table of contents ({} entries)", entries.len());
                return Ok(entries);
            }
        }
    }

    debug!("No table of contents, falling back to the spine");
    Ok(package
        .spine
        .iter()
        .filter_map(|id| package.manifest.get(id))
        .map(|item| TocEntry {
            title: None,
            path: href_of(item),
        })
        .collect())
}
