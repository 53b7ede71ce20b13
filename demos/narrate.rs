//! Пример озвучивания книги в консоли
//!
//! Вместо настоящего синтеза речи фрагменты печатаются в терминал, а
//! "длительность" высказывания эмулируется паузой.
//!
//! ```text
//! cargo run --example narrate -- path/to/book.epub [config.json]
//! ```

use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tts_reader::{
    BookStore, JsonFileBookStore, Narrator, PlaybackSpeed, PlayerStatus, ReaderConfig, SynthesisEngine,
    SynthesisEvent,
};

/// Движок, печатающий текст вместо озвучивания
struct ConsoleEngine {
    events: broadcast::Sender<SynthesisEvent>,
    rate: Mutex<f32>,
}

impl ConsoleEngine {
    fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            rate: Mutex::new(1.0),
        }
    }
}

#[async_trait::async_trait]
impl SynthesisEngine for ConsoleEngine {
    async fn initialize(&self) -> bool {
        true
    }

    fn speak(&self, text: &str, utterance_id: &str) -> bool {
        println!("\n[{}] {}", utterance_id, text);

        let events = self.events.clone();
        let id = utterance_id.to_string();
        // Примерно 15 символов в секунду при обычной скорости
        let millis = (text.chars().count() as f32 * 1000.0 / 15.0 / *self.rate.lock()) as u64;
        let _ = events.send(SynthesisEvent::Started(id.clone()));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(millis.min(3000))).await;
            let _ = events.send(SynthesisEvent::Completed(id));
        });
        true
    }

    fn stop(&self) {}

    fn set_rate(&self, rate: f32) {
        *self.rate.lock() = rate;
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn events(&self) -> broadcast::Receiver<SynthesisEvent> {
        self.events.subscribe()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Инициализируем логирование
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let book_path = args.next().context("usage: narrate <book.txt|book.epub> [config.json]")?;
    let config = match args.next() {
        Some(path) => ReaderConfig::from_file(&path).with_context(|| format!("Failed to load config {}", path))?,
        None => ReaderConfig::default(),
    };

    let library = std::env::temp_dir().join("tts-reader-library.json");
    let store: Arc<dyn BookStore> = Arc::new(JsonFileBookStore::open(&library).await?);

    let narrator = Narrator::new(Arc::new(ConsoleEngine::new()), store, config)?;
    narrator.initialize().await?;

    let record = narrator.import(&book_path).await?;
    println!("Книга: {} ({}), глав: {}", record.title, record.author, record.total_pages);

    let session = narrator.open_book(record.id).await?;
    for (index, chapter) in session.chapters().iter().enumerate() {
        println!("  {:>3}. {} [{}..{}]", index + 1, chapter.title, chapter.start_offset, chapter.end_offset);
    }

    narrator.player().set_speed(PlaybackSpeed::Fast.value())?;
    let mut state_rx = narrator.player().subscribe();
    narrator.player().play()?;

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if let Some(error) = &state.error {
                    eprintln!("Ошибка воспроизведения: {}", error);
                    break;
                }
                if state.status == PlayerStatus::Finished {
                    println!("\nГотово: {:.0}%", state.progress() * 100.0);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                narrator.player().pause();
                println!("\nПауза на позиции {}", narrator.player().state().current_position);
                break;
            }
        }
    }

    session.close().await?;
    narrator.shutdown();
    Ok(())
}
