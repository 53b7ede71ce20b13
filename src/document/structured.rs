//! Сборка глав из структурированного документа (порядок чтения + оглавление)

use std::collections::HashMap;
use rayon::prelude::*;
use crate::document::markup::{embedded_title, strip_markup};
use crate::document::{BookMetadata, Chapter, ParsedDocument, SkippedEntry, CHAPTER_SEPARATOR};
use crate::error::{ReaderError, Result};

/// Содержимое элемента порядка чтения
#[derive(Debug, Clone)]
pub enum EntryContent {
    /// Разметка ресурса
    Markup(String),
    /// Ресурс не удалось получить
    Unavailable(String),
}

/// Элемент порядка чтения (spine)
#[derive(Debug, Clone)]
pub struct SpineEntry {
    /// Путь ресурса внутри документа
    pub href: String,
    pub content: EntryContent,
}

/// Структурированный документ, готовый к разбиению на главы
#[derive(Debug, Clone)]
pub struct StructuredDocument {
    pub metadata: BookMetadata,
    /// Оглавление: путь ресурса -> заголовок
    pub toc: HashMap<String, String>,
    /// Ресурсы в порядке чтения
    pub spine: Vec<SpineEntry>,
}

/// Разбить структурированный документ на главы.
///
/// Пустые элементы пропускаются молча, недоступные попадают в `skipped`.
/// Между главами в полном тексте вставляется двухсимвольный разделитель.
pub fn segment_structured(document: &StructuredDocument) -> Result<ParsedDocument> {
    // Очистка разметки не зависит от соседних элементов
    let extracted: Vec<std::result::Result<(String, Option<String>), String>> = document
        .spine
        .par_iter()
        .map(|entry| match &entry.content {
            EntryContent::Markup(html) => Ok((strip_markup(html), embedded_title(html))),
            EntryContent::Unavailable(reason) => Err(reason.clone()),
        })
        .collect();

    let separator_len = CHAPTER_SEPARATOR.chars().count();
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut skipped = Vec::new();
    let mut full_text = String::new();
    let mut position = 0;

    for (entry, result) in document.spine.iter().zip(extracted) {
        let (text, title) = match result {
            Ok(extracted) => extracted,
            Err(reason) => {
                log::error!("Error parsing chapter {}: {}", entry.href, reason);
                skipped.push(SkippedEntry {
                    href: entry.href.clone(),
                    reason,
                });
                continue;
            }
        };

        if text.trim().is_empty() {
            log::debug!("Skipping blank spine entry {}", entry.href);
            continue;
        }

        if !chapters.is_empty() {
            full_text.push_str(CHAPTER_SEPARATOR);
            position += separator_len;
        }

        let title = document
            .toc
            .get(&entry.href)
            .cloned()
            .or(title)
            .unwrap_or_else(|| format!("Chapter {}", chapters.len() + 1));
        let length = text.chars().count();

        chapters.push(Chapter {
            title,
            start_offset: position,
            end_offset: position + length,
            text: text.clone(),
        });

        full_text.push_str(&text);
        position += length;
    }

    if full_text.is_empty() {
        return Err(ReaderError::EmptyContent(format!(
            "No text content found in '{}'",
            document.metadata.title
        )));
    }

    Ok(ParsedDocument {
        metadata: document.metadata.clone(),
        chapters,
        full_text,
        skipped,
    })
}
