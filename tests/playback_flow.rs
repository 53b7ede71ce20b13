use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tts_reader::{
    AdvanceMode, BookRecord, BookRef, BookStore, DocumentKind, MemoryBookStore, Narrator, PlaybackState,
    PlayerSession, PlayerStatus, ReaderConfig, ReaderError, SynthesisEngine, SynthesisEvent,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Движок, который сразу сообщает о завершении каждого высказывания
struct ScriptedEngine {
    events: broadcast::Sender<SynthesisEvent>,
    spoken: Mutex<Vec<String>>,
    auto_complete: bool,
}

impl ScriptedEngine {
    fn new(auto_complete: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            spoken: Mutex::new(Vec::new()),
            auto_complete,
        })
    }
}

#[async_trait::async_trait]
impl SynthesisEngine for ScriptedEngine {
    async fn initialize(&self) -> bool {
        true
    }

    fn speak(&self, text: &str, utterance_id: &str) -> bool {
        self.spoken.lock().push(text.to_string());
        if self.auto_complete {
            let _ = self.events.send(SynthesisEvent::Started(utterance_id.to_string()));
            let _ = self.events.send(SynthesisEvent::Completed(utterance_id.to_string()));
        }
        true
    }

    fn stop(&self) {}

    fn set_rate(&self, _rate: f32) {}

    fn is_busy(&self) -> bool {
        false
    }

    fn events(&self) -> broadcast::Receiver<SynthesisEvent> {
        self.events.subscribe()
    }
}

const BOOK: &str = "Chapter 1\nThe ship left the harbour. The sea was calm.\n\
Chapter 2\nA storm came at night! Nobody slept.\n\
Chapter 3\nMorning brought the island. Was it real?";

fn config(mode: AdvanceMode) -> ReaderConfig {
    ReaderConfig {
        max_chunk_len: 40,
        advance_mode: mode,
        progress_interval_secs: 1,
        ..ReaderConfig::default()
    }
}

fn write_book(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents).unwrap();
    path
}

async fn wait_for_status(rx: &mut watch::Receiver<PlaybackState>, status: PlayerStatus) -> PlaybackState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if rx.borrow_and_update().status == status {
                return rx.borrow().clone();
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("player did not reach expected status")
}

async fn play_book_to_end(mode: AdvanceMode) {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = write_book(&dir, "voyage.txt", BOOK.as_bytes());

    let engine = ScriptedEngine::new(true);
    let store = Arc::new(MemoryBookStore::new());
    let narrator = Narrator::new(engine.clone(), store.clone(), config(mode)).unwrap();
    narrator.initialize().await.unwrap();

    let record = narrator.import(&path).await.unwrap();
    assert_eq!(record.total_pages, 3);

    let session = narrator.open_book(record.id).await.unwrap();
    assert_eq!(session.chapters().len(), 3);

    let mut rx = narrator.player().subscribe();
    narrator.player().play().unwrap();
    let finished = wait_for_status(&mut rx, PlayerStatus::Finished).await;

    assert!(!finished.is_playing);
    assert_eq!(finished.current_position, finished.total_characters);
    assert_eq!(finished.current_chunk_index, finished.chunk_count);
    assert_eq!(finished.current_chapter, Some(2));
    assert_eq!(engine.spoken.lock().len(), finished.chunk_count);

    session.close().await.unwrap();
    let stored = store.load(record.id).await.unwrap().unwrap();
    assert!(stored.is_completed);
    assert_eq!(stored.current_page, 2);
    assert_eq!(stored.current_position, stored.duration);
}

#[tokio::test]
async fn test_book_plays_to_end_on_completion_events() {
    play_book_to_end(AdvanceMode::OnCompletion).await;
}

#[tokio::test]
async fn test_book_plays_to_end_in_dispatch_mode() {
    play_book_to_end(AdvanceMode::OnDispatch).await;
}

#[tokio::test]
async fn test_open_book_resumes_saved_position() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = write_book(&dir, "voyage.txt", BOOK.as_bytes());

    let store = Arc::new(MemoryBookStore::new());
    let mut record = BookRecord::new("Voyage", "Unknown", path, DocumentKind::Plain);
    record.duration = BOOK.chars().count() as u64;
    record.current_position = 100;
    let id = store.save(record).await.unwrap();

    let narrator = Narrator::new(ScriptedEngine::new(false), store.clone(), config(AdvanceMode::OnCompletion)).unwrap();
    let session = narrator.open_book(id).await.unwrap();

    let state = narrator.player().state();
    assert_eq!(state.current_position, 100);
    assert_eq!(state.current_book.as_ref().map(|book| book.id), Some(id));
    assert_eq!(state.current_chapter, session.document().chapter_index_at(100));
}

#[tokio::test]
async fn test_open_unknown_book_fails() {
    let narrator = Narrator::new(
        ScriptedEngine::new(false),
        Arc::new(MemoryBookStore::new()),
        ReaderConfig::default(),
    )
    .unwrap();
    assert!(matches!(narrator.open_book(99).await, Err(ReaderError::BookNotFound(99))));
}

#[tokio::test]
async fn test_epub_book_end_to_end() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let files = [
        ("mimetype", "application/epub+zip"),
        (
            "META-INF/container.xml",
            r#"<container><rootfiles><rootfile full-path="OPS/book.opf"/></rootfiles></container>"#,
        ),
        (
            "OPS/book.opf",
            r#"<package><metadata><dc:title>Island</dc:title><dc:creator>R. L.</dc:creator></metadata>
               <manifest>
                 <item id="toc" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
                 <item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
                 <item id="b" href="b.xhtml" media-type="application/xhtml+xml"/>
               </manifest>
               <spine toc="toc"><itemref idref="a"/><itemref idref="b"/></spine></package>"#,
        ),
        (
            "OPS/toc.ncx",
            r#"<ncx><navMap><navPoint><navLabel><text>Arrival</text></navLabel><content src="a.xhtml"/></navPoint></navMap></ncx>"#,
        ),
        ("OPS/a.xhtml", "<html><body><p>We landed.</p></body></html>"),
        ("OPS/b.xhtml", "<html><head><title>Departure</title></head><body><p>We left.</p></body></html>"),
    ];
    for (name, contents) in files {
        zip.start_file(name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    let bytes = zip.finish().unwrap().into_inner();
    let path = write_book(&dir, "island.epub", &bytes);

    let store = Arc::new(MemoryBookStore::new());
    let narrator = Narrator::new(ScriptedEngine::new(false), store, ReaderConfig::default()).unwrap();
    let record = narrator.import(&path).await.unwrap();
    assert_eq!(record.title, "Island");
    assert_eq!(record.author, "R. L.");
    assert_eq!(record.kind, DocumentKind::StructuredMarkup);

    let session = narrator.open_book(record.id).await.unwrap();
    let titles: Vec<&str> = session.chapters().iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Arrival", "Departure"]);
    assert_eq!(session.chapters()[1].start_offset, session.chapters()[0].end_offset + 2);
}

#[tokio::test]
async fn test_play_with_nothing_loaded_is_no_content() {
    let session = PlayerSession::new(ScriptedEngine::new(false), ReaderConfig::default());
    assert!(session.initialize().await);

    assert!(matches!(session.play(), Err(ReaderError::NoContent)));
    assert!(!session.state().is_playing);
}

#[tokio::test]
async fn test_stop_always_wins_over_seek() {
    let session = PlayerSession::new(ScriptedEngine::new(false), config(AdvanceMode::OnCompletion));
    assert!(session.initialize().await);
    let book = BookRef {
        id: 1,
        title: "Voyage".to_string(),
        author: "Unknown".to_string(),
    };
    session.load(book, BOOK);
    let total = session.state().total_characters;

    for position in [0, 1, 37, total / 2, total, total * 3] {
        session.play().unwrap();
        session.seek_to(position).unwrap();
        session.stop();
        let state = session.state();
        assert_eq!(state.current_position, 0, "seek to {} survived stop", position);
        assert_eq!(state.current_chunk_index, 0);
        assert!(!state.is_playing);
    }
}

#[tokio::test]
async fn test_pause_twice_equals_pause_once() {
    let session = PlayerSession::new(ScriptedEngine::new(false), config(AdvanceMode::OnDispatch));
    assert!(session.initialize().await);
    let book = BookRef {
        id: 1,
        title: "Voyage".to_string(),
        author: "Unknown".to_string(),
    };
    session.load(book, BOOK);
    session.play().unwrap();

    session.pause();
    let once = session.state();
    session.pause();
    assert_eq!(session.state(), once);
}

#[tokio::test]
async fn test_late_subscriber_sees_latest_state_only() {
    let session = PlayerSession::new(ScriptedEngine::new(false), config(AdvanceMode::OnCompletion));
    assert!(session.initialize().await);
    let book = BookRef {
        id: 5,
        title: "Voyage".to_string(),
        author: "Unknown".to_string(),
    };
    session.load(book, BOOK);
    session.set_speed(1.25).unwrap();
    session.seek_to(50).unwrap();

    let rx = session.subscribe();
    let latest = rx.borrow().clone();
    assert_eq!(latest.current_position, 50);
    assert_eq!(latest.speed, 1.25);
}
