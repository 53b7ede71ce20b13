//! Основной файл библиотеки tts-reader
//!
//! Библиотека озвучивает электронные книги через внешний движок синтеза речи:
//! разбивает документ на главы, режет текст на фрагменты, управляет
//! воспроизведением и сохраняет прогресс чтения.

pub mod config;
pub mod document;
pub mod error;
pub mod library;
pub mod player;
pub mod progress;
pub mod store;
pub mod tts;

use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub use crate::config::{AdvanceMode, ReaderConfig};
pub use crate::document::{segment, Chapter, DocumentKind, ParsedDocument};
pub use crate::error::{ReaderError, Result};
pub use crate::player::{BookRef, PlaybackSpeed, PlaybackState, PlayerSession, PlayerStatus};
pub use crate::progress::{ProgressSnapshot, ProgressTracker};
pub use crate::store::{BookRecord, BookStore, JsonFileBookStore, MemoryBookStore};
pub use crate::tts::{chunk_text, SynthesisEngine, SynthesisEvent};

/// Основная структура для работы с библиотекой.
///
/// Владеет сессией плеера, задачей обработки событий движка и хранилищем.
pub struct Narrator {
    /// Конфигурация библиотеки
    config: ReaderConfig,
    player: Arc<PlayerSession>,
    store: Arc<dyn BookStore>,
    event_loop: JoinHandle<()>,
}

impl Narrator {
    /// Создать экземпляр; должен вызываться внутри runtime Tokio
    pub fn new(engine: Arc<dyn SynthesisEngine>, store: Arc<dyn BookStore>, config: ReaderConfig) -> Result<Self> {
        config.validate()?;

        let player = Arc::new(PlayerSession::new(engine, config.clone()));
        let event_loop = player.spawn_event_loop();

        Ok(Self {
            config,
            player,
            store,
            event_loop,
        })
    }

    /// Инициализировать движок синтеза речи
    pub async fn initialize(&self) -> Result<()> {
        if self.player.initialize().await {
            Ok(())
        } else {
            Err(ReaderError::EngineNotReady)
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Сессия плеера для управления воспроизведением
    pub fn player(&self) -> &Arc<PlayerSession> {
        &self.player
    }

    pub fn store(&self) -> &Arc<dyn BookStore> {
        &self.store
    }

    /// Добавить книгу из файла в библиотеку
    pub async fn import(&self, path: impl AsRef<Path>) -> Result<BookRecord> {
        library::import_book(self.store.as_ref(), path).await
    }

    /// Открыть книгу: загрузить текст в плеер и начать отслеживать прогресс.
    ///
    /// Незаконченная книга продолжается с сохранённой позиции.
    pub async fn open_book(&self, book_id: i64) -> Result<BookSession> {
        let record = self
            .store
            .load(book_id)
            .await?
            .ok_or(ReaderError::BookNotFound(book_id))?;
        log::info!("Opening book '{}' (id {})", record.title, record.id);

        let document = Arc::new(library::extract_book(&record).await?);

        // Разбиение на фрагменты выполняется в пуле блокирующих задач
        let player = self.player.clone();
        let loaded = document.clone();
        let book = record.book_ref();
        tokio::task::spawn_blocking(move || player.load_document(book, &loaded)).await?;

        if record.current_position > 0 && !record.is_completed {
            log::debug!("Resuming '{}' at position {}", record.title, record.current_position);
            self.player.seek_to(record.current_position as usize)?;
        }

        let tracker = ProgressTracker::spawn(
            self.player.subscribe(),
            self.store.clone(),
            self.config.progress_interval(),
        );

        Ok(BookSession {
            record,
            document,
            tracker,
        })
    }

    /// Освободить движок; воспроизведение снова доступно после `initialize`
    pub fn shutdown(&self) {
        self.player.shutdown();
    }
}

impl Drop for Narrator {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

/// Открытая книга
pub struct BookSession {
    record: BookRecord,
    document: Arc<ParsedDocument>,
    tracker: ProgressTracker,
}

impl BookSession {
    /// Запись о книге на момент открытия
    pub fn record(&self) -> &BookRecord {
        &self.record
    }

    pub fn document(&self) -> &ParsedDocument {
        &self.document
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.document.chapters
    }

    /// Закрыть сессию, сохранив итоговый прогресс
    pub async fn close(self) -> Result<()> {
        self.tracker.flush().await?;
        log::info!("Closed book '{}'", self.record.title);
        Ok(())
    }
}
