//! Импорт книг в библиотеку и извлечение их текста

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use crate::document::{segment, title_from_name, DocumentKind, ParsedDocument};
use crate::error::{ReaderError, Result};
use crate::store::{BookRecord, BookStore};

/// Определить тип документа по расширению файла
pub fn classify_path(path: &Path) -> Result<DocumentKind> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" => Ok(DocumentKind::Plain),
        "epub" => Ok(DocumentKind::StructuredMarkup),
        other => Err(ReaderError::UnsupportedFormat(format!(
            "Unsupported file type: {}",
            if other.is_empty() { "<none>" } else { other }
        ))),
    }
}

/// Прочитать и разобрать файл книги (блокирующая операция)
pub fn read_document(path: &Path, kind: DocumentKind) -> Result<ParsedDocument> {
    let file = File::open(path)?;
    let name = path.to_string_lossy();
    segment(BufReader::new(file), kind, &name)
}

async fn read_document_blocking(path: PathBuf, kind: DocumentKind) -> Result<ParsedDocument> {
    tokio::task::spawn_blocking(move || read_document(&path, kind)).await?
}

/// Добавить книгу в библиотеку.
///
/// Если файл не удаётся разобрать, запись всё равно создаётся с заголовком
/// из имени файла и без сведений о главах.
pub async fn import_book(store: &dyn BookStore, path: impl AsRef<Path>) -> Result<BookRecord> {
    let path = path.as_ref().to_path_buf();
    let kind = classify_path(&path)?;

    if !tokio::fs::try_exists(&path).await? {
        return Err(ReaderError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }

    let mut record = match read_document_blocking(path.clone(), kind).await {
        Ok(document) => {
            let mut record = BookRecord::new(
                document.metadata.title.clone(),
                document.metadata.author.clone(),
                path.clone(),
                kind,
            );
            record.total_pages = document.chapters.len();
            record.duration = document.total_characters() as u64;
            record
        }
        Err(e) => {
            log::warn!("Failed to parse {}, adding with basic info: {}", path.display(), e);
            BookRecord::new(title_from_name(&path.to_string_lossy()), "Unknown", path.clone(), kind)
        }
    };

    record.id = store.save(record.clone()).await?;
    log::info!("Book added: {} (id {})", record.title, record.id);
    Ok(record)
}

/// Извлечь текст и главы книги из её файла
pub async fn extract_book(record: &BookRecord) -> Result<ParsedDocument> {
    log::debug!("Extracting text of '{}' from {}", record.title, record.file_path.display());
    read_document_blocking(record.file_path.clone(), record.kind).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBookStore;

    #[test]
    fn test_classify_path() {
        assert_eq!(classify_path(Path::new("a/b/Book.TXT")).unwrap(), DocumentKind::Plain);
        assert_eq!(classify_path(Path::new("novel.epub")).unwrap(), DocumentKind::StructuredMarkup);
        assert!(matches!(classify_path(Path::new("scan.pdf")), Err(ReaderError::UnsupportedFormat(_))));
        assert!(matches!(classify_path(Path::new("README")), Err(ReaderError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_import_plain_text_book() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sea Story.txt");
        std::fs::write(&path, "Chapter 1\nWaves.\nChapter 2\nMore waves.").unwrap();

        let store = MemoryBookStore::new();
        let record = import_book(&store, &path).await.unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.title, "Sea Story");
        assert_eq!(record.author, "Unknown");
        assert_eq!(record.total_pages, 2);
        assert_eq!(record.duration, 38);

        let document = extract_book(&record).await.unwrap();
        assert_eq!(document.chapters.len(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_book_is_still_added() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.epub");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let store = MemoryBookStore::new();
        let record = import_book(&store, &path).await.unwrap();
        assert_eq!(record.title, "broken");
        assert_eq!(record.author, "Unknown");
        assert_eq!(record.total_pages, 0);
        assert_eq!(store.books().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let store = MemoryBookStore::new();
        let result = import_book(&store, "/definitely/not/here.txt").await;
        assert!(matches!(result, Err(ReaderError::Io(_))));
        assert!(store.books().is_empty());
    }
}
