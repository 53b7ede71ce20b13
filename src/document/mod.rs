//! Модуль разбора документов на главы
//!
//! Превращает байты книги в полный текст, список глав со смещениями и
//! метаданные. Тип документа определяется снаружи и передаётся явно.

pub mod markup;
pub mod plain;
pub mod structured;
pub mod epub;

use std::io::Read;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// Разделитель между главами структурированного документа
pub const CHAPTER_SEPARATOR: &str = "\n\n";

/// Тип документа
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Простой текст
    Plain,
    /// Разметка с оглавлением и порядком чтения (EPUB)
    StructuredMarkup,
}

/// Глава документа
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    /// Заголовок главы
    pub title: String,
    /// Смещение начала в символах полного текста
    pub start_offset: usize,
    /// Смещение конца в символах полного текста
    pub end_offset: usize,
    /// Текст главы
    pub text: String,
}

impl Chapter {
    /// Содержит ли глава указанную позицию
    pub fn contains(&self, position: usize) -> bool {
        position >= self.start_offset && position < self.end_offset
    }
}

/// Метаданные книги
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub language: String,
}

impl BookMetadata {
    /// Метаданные по умолчанию, построенные из имени файла
    pub fn from_name(name: &str) -> Self {
        Self {
            title: title_from_name(name),
            author: "Unknown".to_string(),
            publisher: String::new(),
            language: "en".to_string(),
        }
    }
}

/// Элемент, пропущенный при разборе
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedEntry {
    /// Путь ресурса внутри документа
    pub href: String,
    /// Причина пропуска
    pub reason: String,
}

/// Результат разбора документа
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub metadata: BookMetadata,
    pub chapters: Vec<Chapter>,
    pub full_text: String,
    /// Ресурсы, которые не удалось разобрать
    pub skipped: Vec<SkippedEntry>,
}

impl ParsedDocument {
    /// Все ли элементы документа вошли в текст
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Длина полного текста в символах
    pub fn total_characters(&self) -> usize {
        self.full_text.chars().count()
    }

    /// Индекс главы, содержащей позицию
    pub fn chapter_index_at(&self, position: usize) -> Option<usize> {
        chapter_index_at(&self.chapters, position)
    }
}

/// Индекс главы, содержащей позицию; позиция в конце текста относится к последней главе
pub fn chapter_index_at(chapters: &[Chapter], position: usize) -> Option<usize> {
    if chapters.is_empty() {
        return None;
    }
    chapters
        .iter()
        .position(|chapter| chapter.contains(position))
        .or_else(|| {
            // Позиция между главами (на разделителе) или за концом текста
            let index = chapters.partition_point(|chapter| chapter.start_offset <= position);
            Some(index.saturating_sub(1))
        })
}

/// Доступные парсеры
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parser {
    PlainText,
    Epub,
}

impl Parser {
    /// Выбрать парсер по типу документа
    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Plain => Self::PlainText,
            DocumentKind::StructuredMarkup => Self::Epub,
        }
    }

    /// Разобрать байты документа
    pub fn parse(&self, bytes: &[u8], name: &str) -> Result<ParsedDocument> {
        match self {
            Self::PlainText => plain::parse_plain_text(bytes, name),
            Self::Epub => {
                let document = epub::read_epub(bytes, name)?;
                structured::segment_structured(&document)
            }
        }
    }
}

/// Разобрать документ из источника байтов.
///
/// `name` используется только как запасной источник заголовка книги.
pub fn segment<R: Read>(mut source: R, kind: DocumentKind, name: &str) -> Result<ParsedDocument> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;

    let parsed = Parser::for_kind(kind).parse(&bytes, name)?;
    if !parsed.is_complete() {
        log::warn!(
            "Parsed '{}' with {} skipped entries",
            parsed.metadata.title,
            parsed.skipped.len()
        );
    }
    log::info!(
        "Segmented '{}': {} chapters, {} characters",
        parsed.metadata.title,
        parsed.chapters.len(),
        parsed.total_characters()
    );
    Ok(parsed)
}

/// Заголовок книги из имени файла (без расширения)
pub fn title_from_name(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.trim().is_empty())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::error::ReaderError;

    fn chapter(start: usize, end: usize) -> Chapter {
        Chapter {
            title: format!("{}", start),
            start_offset: start,
            end_offset: end,
            text: String::new(),
        }
    }

    #[test]
    fn test_parser_selection_is_by_kind() {
        assert_eq!(Parser::for_kind(DocumentKind::Plain), Parser::PlainText);
        assert_eq!(Parser::for_kind(DocumentKind::StructuredMarkup), Parser::Epub);
    }

    #[test]
    fn test_segment_plain_from_reader() {
        let source = Cursor::new("Chapter 1\nfoo\nChapter 2\nbar".as_bytes().to_vec());
        let parsed = segment(source, DocumentKind::Plain, "books/tale.txt").unwrap();
        assert_eq!(parsed.metadata.title, "tale");
        assert_eq!(parsed.metadata.author, "Unknown");
        assert_eq!(parsed.chapters.len(), 2);
        assert!(parsed.is_complete());
    }

    #[test]
    fn test_segment_rejects_garbage_archive() {
        let source = Cursor::new(b"definitely not a zip".to_vec());
        let result = segment(source, DocumentKind::StructuredMarkup, "broken.epub");
        assert!(matches!(result, Err(ReaderError::Archive(_))));
    }

    #[test]
    fn test_chapter_lookup_handles_separators() {
        let chapters = vec![chapter(0, 10), chapter(12, 20)];
        assert_eq!(chapter_index_at(&chapters, 0), Some(0));
        assert_eq!(chapter_index_at(&chapters, 11), Some(0));
        assert_eq!(chapter_index_at(&chapters, 12), Some(1));
        assert_eq!(chapter_index_at(&chapters, 500), Some(1));
        assert_eq!(chapter_index_at(&[], 3), None);
    }

    #[test]
    fn test_title_from_name() {
        assert_eq!(title_from_name("/tmp/Moby Dick.epub"), "Moby Dick");
        assert_eq!(title_from_name("notes"), "notes");
    }
}
