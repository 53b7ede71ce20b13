//! Разбор простого текста на главы по эвристическим шаблонам

use once_cell::sync::Lazy;
use regex::Regex;
use crate::document::{BookMetadata, Chapter, ParsedDocument};
use crate::error::{ReaderError, Result};

/// Шаблоны заголовков глав в порядке приоритета
static CHAPTER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // "Chapter 12 ..."
        r"(?mi)^Chapter[ \t]+\d+.*$",
        // "12. ..."
        r"(?m)^\d+\.[ \t]+.*$",
        // "XII. ..."
        r"(?m)^[IVXLCDM]+\.[ \t]+.*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid chapter pattern"))
    .collect()
});

const UTF8_BOM: char = '\u{feff}';

/// Разобрать простой текст
pub fn parse_plain_text(bytes: &[u8], name: &str) -> Result<ParsedDocument> {
    let decoded = String::from_utf8_lossy(bytes);
    let text = decoded.strip_prefix(UTF8_BOM).unwrap_or(&*decoded).to_string();

    if text.trim().is_empty() {
        return Err(ReaderError::EmptyContent(format!("File is empty: {}", name)));
    }

    let chapters = detect_chapters(&text);

    Ok(ParsedDocument {
        metadata: BookMetadata::from_name(name),
        chapters,
        full_text: text,
        skipped: Vec::new(),
    })
}

/// Найти главы в тексте.
///
/// Используется первый шаблон, давший больше одного совпадения. Текст перед
/// первым заголовком относится к первой главе. Если ни один шаблон не подошёл,
/// весь текст становится одной главой "Full Text".
pub fn detect_chapters(text: &str) -> Vec<Chapter> {
    for pattern in CHAPTER_PATTERNS.iter() {
        let matches: Vec<regex::Match> = pattern.find_iter(text).collect();
        if matches.len() < 2 {
            continue;
        }

        log::debug!("Chapter pattern '{}' matched {} times", pattern.as_str(), matches.len());

        // Границы глав в байтах; первая глава начинается с начала текста
        let mut starts: Vec<usize> = matches.iter().map(|m| m.start()).collect();
        starts[0] = 0;

        let mut chapters = Vec::with_capacity(matches.len());
        let mut char_offset = 0;
        let mut byte_offset = 0;

        for (i, found) in matches.iter().enumerate() {
            let start_byte = starts[i];
            let end_byte = starts.get(i + 1).copied().unwrap_or(text.len());

            char_offset += text[byte_offset..start_byte].chars().count();
            byte_offset = start_byte;

            let body = &text[start_byte..end_byte];
            let length = body.chars().count();

            chapters.push(Chapter {
                title: found.as_str().trim().to_string(),
                start_offset: char_offset,
                end_offset: char_offset + length,
                text: body.to_string(),
            });
        }

        return chapters;
    }

    vec![Chapter {
        title: "Full Text".to_string(),
        start_offset: 0,
        end_offset: text.chars().count(),
        text: text.to_string(),
    }]
}
