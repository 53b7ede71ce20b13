//! Модуль обработки ошибок библиотеки tts-reader
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при разборе книг,
//! воспроизведении и сохранении прогресса.

use thiserror::Error;

/// Ошибки библиотеки tts-reader
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка чтения zip-архива (EPUB контейнер)
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Ошибка разбора XML (OPF пакет, container.xml)
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// В документе не найдено текста
    #[error("Empty content: {0}")]
    EmptyContent(String),

    /// Неверный формат документа
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Неподдерживаемый тип файла
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Движок синтеза речи не инициализирован
    #[error("TTS not initialized")]
    EngineNotReady,

    /// Нет загруженного текста для воспроизведения
    #[error("No content to play")]
    NoContent,

    /// Движок отказался принять фрагмент
    #[error("Failed to speak chunk {index}")]
    Dispatch { index: usize },

    /// Недопустимая скорость воспроизведения
    #[error("Invalid playback speed: {0}")]
    InvalidSpeed(f32),

    /// Главы с таким индексом нет
    #[error("Chapter not found: {0}")]
    ChapterNotFound(usize),

    /// Книга не найдена в хранилище
    #[error("Book not found: {0}")]
    BookNotFound(i64),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Фоновая задача завершилась аварийно
    #[error("Background task failed: {0}")]
    Task(String),

    /// Другая ошибка
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tokio::task::JoinError> for ReaderError {
    fn from(err: tokio::task::JoinError) -> Self {
        ReaderError::Task(err.to_string())
    }
}

/// Тип Result для библиотеки tts-reader
pub type Result<T> = std::result::Result<T, ReaderError>;
