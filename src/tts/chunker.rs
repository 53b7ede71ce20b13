//! Разбиение текста на фрагменты для синтеза речи
//!
//! Движки синтеза принимают ограниченный по длине текст, поэтому книга
//! озвучивается последовательностью фрагментов. Фрагмент по возможности
//! заканчивается на границе предложения.

/// Символы, завершающие предложение
const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Разбить текст на фрагменты длиной не более `max_len` символов.
///
/// От предварительной границы `cursor + max_len` выполняется поиск назад
/// ближайшего `.`, `!` или `?`. Если такого символа нет, фрагмент режется
/// ровно по `max_len` (возможно посередине слова). Каждый фрагмент обрезается
/// по краям; пустые после обрезки куски не выдаются.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut chunks = Vec::new();
    let mut cursor = 0;

    while cursor < len {
        let mut end = (cursor + max_len).min(len);

        if end < len {
            // Терминатор должен стоять строго после курсора
            if let Some(pos) = (cursor + 1..end)
                .rev()
                .find(|&i| SENTENCE_TERMINATORS.contains(&chars[i]))
            {
                end = pos + 1;
            }
        }

        let piece: String = chars[cursor..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        cursor = end;
    }

    log::debug!("Split {} characters into {} chunks (max {})", len, chunks.len(), max_len);
    chunks
}
