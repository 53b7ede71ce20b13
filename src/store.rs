//! Хранилище книг и прогресса чтения
//!
//! Плеер и трекер прогресса обращаются к хранилищу только через
//! [`BookStore::update_progress`]. Реализации: [`MemoryBookStore`] для тестов
//! и встраивания, [`JsonFileBookStore`] для простого хранения на диске.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use crate::document::DocumentKind;
use crate::error::{ReaderError, Result};
use crate::player::BookRef;
use crate::progress::ProgressSnapshot;

/// Запись о книге в библиотеке
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookRecord {
    /// Идентификатор; 0 для ещё не сохранённой записи
    pub id: i64,
    pub title: String,
    pub author: String,
    pub file_path: PathBuf,
    pub kind: DocumentKind,
    /// Количество глав
    pub total_pages: usize,
    /// Глава, на которой остановилось чтение
    pub current_page: usize,
    /// Позиция в символах полного текста
    pub current_position: u64,
    /// Длина полного текста в символах
    pub duration: u64,
    pub last_read: Option<DateTime<Utc>>,
    pub date_added: DateTime<Utc>,
    pub is_completed: bool,
}

impl BookRecord {
    /// Создать новую запись без прогресса
    pub fn new(title: impl Into<String>, author: impl Into<String>, file_path: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self {
            id: 0,
            title: title.into(),
            author: author.into(),
            file_path: file_path.into(),
            kind,
            total_pages: 0,
            current_page: 0,
            current_position: 0,
            duration: 0,
            last_read: None,
            date_added: Utc::now(),
            is_completed: false,
        }
    }

    /// Доля прочитанного (0.0 - 1.0)
    pub fn progress(&self) -> f32 {
        if self.duration == 0 {
            return 0.0;
        }
        (self.current_position as f32 / self.duration as f32).clamp(0.0, 1.0)
    }

    /// Ссылка на книгу для плеера
    pub fn book_ref(&self) -> BookRef {
        BookRef {
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
        }
    }

    fn apply_progress(&mut self, position: u64, page: usize, timestamp: DateTime<Utc>) {
        self.current_position = position;
        self.current_page = page;
        self.last_read = Some(timestamp);
        self.is_completed = self.duration > 0 && position >= self.duration;
    }
}

/// Хранилище книг
#[async_trait::async_trait]
pub trait BookStore: Send + Sync {
    /// Загрузить запись по идентификатору
    async fn load(&self, id: i64) -> Result<Option<BookRecord>>;

    /// Сохранить запись; запись с `id == 0` получает новый идентификатор
    async fn save(&self, record: BookRecord) -> Result<i64>;

    /// Обновить прогресс чтения
    async fn update_progress(&self, id: i64, position: u64, page: usize, timestamp: DateTime<Utc>) -> Result<()>;
}

/// Хранилище в памяти, запоминающее историю обновлений прогресса
pub struct MemoryBookStore {
    books: RwLock<HashMap<i64, BookRecord>>,
    history: Mutex<Vec<ProgressSnapshot>>,
    next_id: AtomicI64,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// История вызовов `update_progress` в порядке поступления
    pub fn history(&self) -> Vec<ProgressSnapshot> {
        self.history.lock().clone()
    }

    /// Все записи, отсортированные по идентификатору
    pub fn books(&self) -> Vec<BookRecord> {
        let mut books: Vec<BookRecord> = self.books.read().values().cloned().collect();
        books.sort_by_key(|book| book.id);
        books
    }
}

impl Default for MemoryBookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BookStore for MemoryBookStore {
    async fn load(&self, id: i64) -> Result<Option<BookRecord>> {
        Ok(self.books.read().get(&id).cloned())
    }

    async fn save(&self, mut record: BookRecord) -> Result<i64> {
        if record.id == 0 {
            record.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        } else {
            self.next_id.fetch_max(record.id + 1, Ordering::SeqCst);
        }
        let id = record.id;
        self.books.write().insert(id, record);
        Ok(id)
    }

    async fn update_progress(&self, id: i64, position: u64, page: usize, timestamp: DateTime<Utc>) -> Result<()> {
        let mut books = self.books.write();
        let book = books.get_mut(&id).ok_or(ReaderError::BookNotFound(id))?;
        book.apply_progress(position, page, timestamp);
        drop(books);

        self.history.lock().push(ProgressSnapshot {
            book_id: id,
            position,
            page,
            timestamp,
        });
        log::debug!("Progress updated for book {}: position={}, page={}", id, position, page);
        Ok(())
    }
}

/// Хранилище в одном JSON файле.
///
/// Файл перезаписывается целиком при каждом изменении.
pub struct JsonFileBookStore {
    path: PathBuf,
    books: tokio::sync::Mutex<HashMap<i64, BookRecord>>,
}

impl JsonFileBookStore {
    /// Открыть хранилище; отсутствующий файл означает пустую библиотеку
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let books = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<BookRecord> = serde_json::from_slice(&bytes)?;
                records.into_iter().map(|record| (record.id, record)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        log::info!("Opened book store {} ({} books)", path.display(), books.len());

        Ok(Self {
            path,
            books: tokio::sync::Mutex::new(books),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, books: &HashMap<i64, BookRecord>) -> Result<()> {
        let mut records: Vec<&BookRecord> = books.values().collect();
        records.sort_by_key(|record| record.id);
        let json = serde_json::to_vec_pretty(&records)?;

        // Запись во временный файл и переименование, чтобы не оставить обрезанный JSON
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BookStore for JsonFileBookStore {
    async fn load(&self, id: i64) -> Result<Option<BookRecord>> {
        Ok(self.books.lock().await.get(&id).cloned())
    }

    async fn save(&self, mut record: BookRecord) -> Result<i64> {
        let mut books = self.books.lock().await;
        if record.id == 0 {
            record.id = books.keys().max().copied().unwrap_or(0) + 1;
        }
        let id = record.id;
        books.insert(id, record);
        self.persist(&books).await?;
        Ok(id)
    }

    async fn update_progress(&self, id: i64, position: u64, page: usize, timestamp: DateTime<Utc>) -> Result<()> {
        let mut books = self.books.lock().await;
        books
            .get_mut(&id)
            .ok_or(ReaderError::BookNotFound(id))?
            .apply_progress(position, page, timestamp);
        self.persist(&books).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> BookRecord {
        let mut record = BookRecord::new(title, "Author", format!("/books/{}.txt", title), DocumentKind::Plain);
        record.duration = 1000;
        record.total_pages = 4;
        record
    }

    #[test]
    fn test_memory_store_assigns_ids() {
        let store = MemoryBookStore::new();
        let first = tokio_test::block_on(store.save(record("one"))).unwrap();
        let second = tokio_test::block_on(store.save(record("two"))).unwrap();
        assert_eq!((first, second), (1, 2));

        let loaded = tokio_test::block_on(store.load(2)).unwrap().unwrap();
        assert_eq!(loaded.title, "two");
        assert!(tokio_test::block_on(store.load(42)).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_progress_and_completion() {
        let store = MemoryBookStore::new();
        let id = tokio_test::block_on(store.save(record("book"))).unwrap();
        let now = Utc::now();

        tokio_test::block_on(store.update_progress(id, 250, 1, now)).unwrap();
        let book = tokio_test::block_on(store.load(id)).unwrap().unwrap();
        assert_eq!(book.current_position, 250);
        assert_eq!(book.current_page, 1);
        assert_eq!(book.last_read, Some(now));
        assert!((book.progress() - 0.25).abs() < f32::EPSILON);
        assert!(!book.is_completed);

        tokio_test::block_on(store.update_progress(id, 1000, 3, now)).unwrap();
        assert!(tokio_test::block_on(store.load(id)).unwrap().unwrap().is_completed);
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn test_progress_for_unknown_book_fails() {
        let store = MemoryBookStore::new();
        let result = tokio_test::block_on(store.update_progress(7, 1, 0, Utc::now()));
        assert!(matches!(result, Err(ReaderError::BookNotFound(7))));
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");

        let store = JsonFileBookStore::open(&path).await.unwrap();
        let id = store.save(record("persisted")).await.unwrap();
        store.update_progress(id, 500, 2, Utc::now()).await.unwrap();
        drop(store);

        let reopened = JsonFileBookStore::open(&path).await.unwrap();
        let book = reopened.load(id).await.unwrap().unwrap();
        assert_eq!(book.title, "persisted");
        assert_eq!(book.current_position, 500);
        assert_eq!(book.current_page, 2);

        let next = reopened.save(record("another")).await.unwrap();
        assert_eq!(next, id + 1);
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        assert!(matches!(JsonFileBookStore::open(&path).await, Err(ReaderError::Json(_))));
    }
}
