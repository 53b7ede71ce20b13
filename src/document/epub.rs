//! Чтение EPUB контейнера
//!
//! Разбирает `META-INF/container.xml`, OPF пакет (метаданные, манифест,
//! порядок чтения) и оглавление (NCX или навигационный документ EPUB3) и
//! собирает из них [`StructuredDocument`]. XML читается потоково событиями
//! quick-xml.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use percent_encoding::percent_decode_str;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use zip::ZipArchive;
use crate::document::structured::{EntryContent, SpineEntry, StructuredDocument};
use crate::document::BookMetadata;
use crate::error::{ReaderError, Result};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Элемент манифеста OPF
#[derive(Debug, Clone, PartialEq)]
struct ManifestItem {
    href: String,
    media_type: String,
    properties: String,
}

/// Поля метаданных Dublin Core, которые нас интересуют
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataField {
    Title,
    Creator,
    Publisher,
    Language,
}

impl MetadataField {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"creator" => Some(Self::Creator),
            b"publisher" => Some(Self::Publisher),
            b"language" => Some(Self::Language),
            _ => None,
        }
    }
}

/// Содержимое OPF пакета
#[derive(Debug, Default)]
struct Package {
    title: Option<String>,
    author: Option<String>,
    publisher: Option<String>,
    language: Option<String>,
    manifest: HashMap<String, ManifestItem>,
    /// Атрибут `toc` элемента spine
    toc_id: Option<String>,
    /// idref элементов spine в порядке чтения
    spine: Vec<String>,
}

impl Package {
    /// Учесть элемент манифеста или порядка чтения
    fn visit(&mut self, element: &BytesStart) {
        match element.local_name().as_ref() {
            b"item" => {
                let mut attrs = attributes(element);
                if let (Some(id), Some(href)) = (attrs.remove("id"), attrs.remove("href")) {
                    self.manifest.insert(
                        id,
                        ManifestItem {
                            href,
                            media_type: attrs.remove("media-type").unwrap_or_default(),
                            properties: attrs.remove("properties").unwrap_or_default(),
                        },
                    );
                }
            }
            b"spine" => self.toc_id = attributes(element).remove("toc"),
            b"itemref" => {
                if let Some(idref) = attributes(element).remove("idref") {
                    self.spine.push(idref);
                }
            }
            _ => {}
        }
    }

    /// Запомнить значение поля; первое непустое значение побеждает
    fn set_field(&mut self, field: MetadataField, value: &str) {
        let value = collapse_whitespace(value);
        if value.is_empty() {
            return;
        }
        let slot = match field {
            MetadataField::Title => &mut self.title,
            MetadataField::Creator => &mut self.author,
            MetadataField::Publisher => &mut self.publisher,
            MetadataField::Language => &mut self.language,
        };
        slot.get_or_insert(value);
    }

    fn metadata(&self, name: &str) -> BookMetadata {
        let defaults = BookMetadata::from_name(name);
        BookMetadata {
            title: self.title.clone().unwrap_or(defaults.title),
            author: self.author.clone().unwrap_or(defaults.author),
            publisher: self.publisher.clone().unwrap_or(defaults.publisher),
            language: self.language.clone().unwrap_or(defaults.language),
        }
    }
}

/// Прочитать EPUB из байтов
pub fn read_epub(bytes: &[u8], name: &str) -> Result<StructuredDocument> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let container = read_text(&mut archive, CONTAINER_PATH)?;
    let opf_path = parse_container(&container)?;
    let opf = read_text(&mut archive, &opf_path)?;
    let opf_dir = parent_dir(&opf_path);

    let package = parse_package(&opf)?;
    let metadata = package.metadata(name);
    log::debug!(
        "EPUB '{}': {} manifest items, {} spine entries",
        metadata.title,
        package.manifest.len(),
        package.spine.len()
    );

    let toc = read_toc(&mut archive, &package, &opf_dir);

    let spine = package
        .spine
        .iter()
        .map(|idref| match package.manifest.get(idref) {
            Some(item) => {
                let href = resolve_href(&opf_dir, &item.href);
                let content = match read_text(&mut archive, &href) {
                    Ok(markup) => EntryContent::Markup(markup),
                    Err(e) => EntryContent::Unavailable(e.to_string()),
                };
                SpineEntry { href, content }
            }
            None => SpineEntry {
                href: idref.clone(),
                content: EntryContent::Unavailable(format!("Spine idref '{}' not in manifest", idref)),
            },
        })
        .collect();

    Ok(StructuredDocument { metadata, toc, spine })
}

/// Прочитать член архива как UTF-8 текст
fn read_text(archive: &mut ZipArchive<Cursor<&[u8]>>, path: &str) -> Result<String> {
    let mut file = archive.by_name(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| ReaderError::InvalidFormat(format!("{} is not UTF-8: {}", path, e)))
}

fn xml_reader(xml: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(xml);
    // Навигационные документы часто оказываются не вполне корректным XHTML
    reader.config_mut().check_end_names = false;
    reader
}

/// Атрибуты элемента: локальное имя -> значение со снятым экранированием
fn attributes(element: &BytesStart) -> HashMap<String, String> {
    element
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value_with(html_entity)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect()
}

/// Именованные HTML сущности, которые встречаются в XHTML книг
fn html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "hellip" => Some("\u{2026}"),
        "laquo" => Some("\u{ab}"),
        "raquo" => Some("\u{bb}"),
        _ => None,
    }
}

/// Текст события со снятым экранированием; при неизвестной сущности
/// текст остаётся как есть
fn text_value(text: &BytesText) -> String {
    text.unescape_with(html_entity)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| String::from_utf8_lossy(text).into_owned())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Путь к OPF пакету из `container.xml`
fn parse_container(xml: &str) -> Result<String> {
    let mut reader = xml_reader(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attributes(&e).remove("full-path") {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(ReaderError::InvalidFormat("No rootfile found in container.xml".to_string()))
}

fn parse_package(opf: &str) -> Result<Package> {
    let mut reader = xml_reader(opf);
    let mut package = Package::default();
    let mut in_metadata = false;
    let mut field: Option<MetadataField> = None;
    let mut value = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"metadata" => in_metadata = true,
                name if in_metadata => {
                    field = MetadataField::from_local_name(name);
                    value.clear();
                }
                _ => package.visit(&e),
            },
            Event::Empty(e) => package.visit(&e),
            Event::Text(text) if field.is_some() => value.push_str(&text_value(&text)),
            Event::CData(data) if field.is_some() => value.push_str(&String::from_utf8_lossy(&data.into_inner())),
            Event::End(e) => {
                if e.local_name().as_ref() == b"metadata" {
                    in_metadata = false;
                } else if let Some(field) = field.take() {
                    package.set_field(field, &value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(package)
}

/// Оглавление NCX: `navPoint/navLabel/text` + `content@src`.
///
/// Ссылка регистрируется на элементе `content`, поэтому родительская точка
/// попадает в оглавление раньше вложенных.
fn parse_ncx(ncx: &str, base: &str, toc: &mut HashMap<String, String>) -> Result<()> {
    let mut reader = xml_reader(ncx);
    // Заголовки открытых navPoint, от внешнего к внутреннему
    let mut labels: Vec<Option<String>> = Vec::new();
    let mut label: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"navPoint" => labels.push(None),
                b"text" if !labels.is_empty() => label = Some(String::new()),
                b"content" => add_ncx_content(&e, &labels, base, toc),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"content" => add_ncx_content(&e, &labels, base, toc),
            Event::Text(text) => {
                if let Some(label) = label.as_mut() {
                    label.push_str(&text_value(&text));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"text" => {
                    if let (Some(text), Some(top)) = (label.take(), labels.last_mut()) {
                        top.get_or_insert(collapse_whitespace(&text));
                    }
                }
                b"navPoint" => {
                    labels.pop();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

fn add_ncx_content(element: &BytesStart, labels: &[Option<String>], base: &str, toc: &mut HashMap<String, String>) {
    if let (Some(Some(title)), Some(src)) = (labels.last(), attributes(element).remove("src")) {
        insert_toc_entry(toc, base, &src, title);
    }
}

/// Навигационный документ EPUB3: ссылки внутри `<nav epub:type="toc">`
fn parse_nav(nav: &str, base: &str, toc: &mut HashMap<String, String>) -> Result<()> {
    let mut reader = xml_reader(nav);
    let mut nav_depth = 0usize;
    let mut toc_depth: Option<usize> = None;
    // href и текст открытой ссылки
    let mut link: Option<(String, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"nav" => {
                    nav_depth += 1;
                    let is_toc = attributes(&e)
                        .get("type")
                        .map_or(false, |kind| kind.split_whitespace().any(|kind| kind == "toc"));
                    if toc_depth.is_none() && is_toc {
                        toc_depth = Some(nav_depth);
                    }
                }
                b"a" if toc_depth.is_some() => {
                    link = attributes(&e).remove("href").map(|href| (href, String::new()));
                }
                _ => {}
            },
            Event::Text(text) => {
                if let Some((_, label)) = link.as_mut() {
                    label.push_str(&text_value(&text));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"a" => {
                    if let Some((href, label)) = link.take() {
                        insert_toc_entry(toc, base, &href, &collapse_whitespace(&label));
                    }
                }
                b"nav" => {
                    if toc_depth == Some(nav_depth) {
                        toc_depth = None;
                    }
                    nav_depth = nav_depth.saturating_sub(1);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

/// Собрать оглавление: путь ресурса -> заголовок.
///
/// Предпочитается NCX, затем навигационный документ EPUB3. Для ресурса берётся
/// первая ссылка на него. Ошибки оглавления не прерывают разбор книги.
fn read_toc(archive: &mut ZipArchive<Cursor<&[u8]>>, package: &Package, opf_dir: &str) -> HashMap<String, String> {
    let mut toc = HashMap::new();

    let ncx = package
        .toc_id
        .as_deref()
        .and_then(|id| package.manifest.get(id))
        .or_else(|| package.manifest.values().find(|item| item.media_type == NCX_MEDIA_TYPE));
    let nav = package
        .manifest
        .values()
        .find(|item| item.properties.split_whitespace().any(|p| p == "nav"));

    if let Some(item) = ncx {
        let path = resolve_href(opf_dir, &item.href);
        let parsed = read_text(archive, &path).and_then(|ncx| parse_ncx(&ncx, &parent_dir(&path), &mut toc));
        if let Err(e) = parsed {
            log::warn!("Failed to read NCX {}: {}", path, e);
        }
    }

    if toc.is_empty() {
        if let Some(item) = nav {
            let path = resolve_href(opf_dir, &item.href);
            let parsed = read_text(archive, &path).and_then(|nav| parse_nav(&nav, &parent_dir(&path), &mut toc));
            if let Err(e) = parsed {
                log::warn!("Failed to read navigation document {}: {}", path, e);
            }
        }
    }

    toc
}

fn insert_toc_entry(toc: &mut HashMap<String, String>, base: &str, href: &str, title: &str) {
    if title.is_empty() {
        return;
    }
    toc.entry(resolve_href(base, href)).or_insert_with(|| title.to_string());
}

/// Каталог, содержащий путь внутри архива
fn parent_dir(path: &str) -> String {
    path.rsplit_once('/').map(|(dir, _)| dir.to_string()).unwrap_or_default()
}

/// Разрешить относительную ссылку в путь внутри архива.
///
/// Фрагмент отбрасывается, процентное кодирование снимается.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let href = percent_decode_str(href).decode_utf8_lossy();

    let mut parts: Vec<&str> = if href.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|part| !part.is_empty()).collect()
    };

    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join("/")
}
