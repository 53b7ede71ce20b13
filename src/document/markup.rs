//! Преобразование HTML/XHTML разметки в простой текст

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid script regex"));
static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid style regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&(nbsp|amp|lt|gt|quot);").expect("valid entity regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

/// Декодировать пять основных HTML-сущностей за один проход
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            match caps[1].to_ascii_lowercase().as_str() {
                "nbsp" => " ",
                "amp" => "&",
                "lt" => "<",
                "gt" => ">",
                _ => "\"",
            }
            .to_string()
        })
        .into_owned()
}

/// Извлечь простой текст из разметки.
///
/// Блоки `<script>` и `<style>` удаляются целиком, остальные теги заменяются
/// пробелом, после декодирования сущностей пробелы схлопываются.
pub fn strip_markup(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, "");
    let text = STYLE_BLOCK.replace_all(&text, "");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Заголовок из элемента `<title>`, если он не пустой
pub fn embedded_title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .map(|caps| strip_markup(&caps[1]))
        .filter(|title| !title.is_empty())
}
