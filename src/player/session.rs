//! Сессия воспроизведения одной книги
//!
//! [`PlayerSession`] владеет фрагментами загруженного текста и состоянием
//! плеера. Команды сериализуются мьютексом, каждое изменение состояния
//! публикуется в `watch` канал, так что подписчик всегда видит последнее
//! состояние.
//!
//! Продвижение по фрагментам зависит от [`AdvanceMode`]:
//! - `OnDispatch`: индекс увеличивается сразу после передачи фрагмента движку,
//!   следующий фрагмент отправляется по событию `Completed`;
//! - `OnCompletion`: индекс увеличивается только по событию `Completed`.

use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, OnceCell};
use tokio::task::JoinHandle;
use uuid::Uuid;
use crate::config::{AdvanceMode, ReaderConfig};
use crate::document::{chapter_index_at, Chapter, ParsedDocument};
use crate::error::{ReaderError, Result};
use crate::player::state::{BookRef, PlaybackState, PlayerStatus};
use crate::tts::chunker::chunk_text;
use crate::tts::engine::{utterance_id, SynthesisEngine, SynthesisEvent};

/// Высказывание, переданное движку и ещё не завершённое
#[derive(Debug, Clone)]
struct Utterance {
    id: String,
    index: usize,
}

struct Inner {
    chunks: Vec<String>,
    chapters: Vec<Chapter>,
    state: PlaybackState,
    /// Поколение загрузки; входит в идентификаторы высказываний
    generation: Uuid,
    pending: Option<Utterance>,
    released: bool,
}

impl Inner {
    fn chars_per_chunk(&self) -> usize {
        if self.chunks.is_empty() {
            return 1;
        }
        (self.state.total_characters / self.chunks.len()).max(1)
    }

    /// Выставить индекс фрагмента и пересчитать позицию
    fn set_index(&mut self, index: usize) {
        self.state.current_chunk_index = index;
        self.state.current_position = index * self.chars_per_chunk();
        self.update_chapter();
    }

    fn update_chapter(&mut self) {
        self.state.current_chapter = chapter_index_at(&self.chapters, self.state.current_position);
    }

    fn finish(&mut self) {
        self.state.is_playing = false;
        self.state.is_paused = false;
        self.state.status = PlayerStatus::Finished;
        self.state.current_chunk_index = self.chunks.len();
        self.state.current_position = self.state.total_characters;
        self.update_chapter();
    }

    /// Перейти к следующему фрагменту или завершить воспроизведение
    fn advance(&mut self) {
        let next = self.state.current_chunk_index + 1;
        if next >= self.chunks.len() {
            log::info!("Reached end of text after {} chunks", self.chunks.len());
            self.finish();
        } else {
            self.set_index(next);
        }
    }

    /// Остановка из-за ошибки движка; индекс указывает на проблемный фрагмент.
    ///
    /// Это не пауза: `is_paused` не меняется, статус возвращается в `Loaded`,
    /// и `play` повторяет тот же фрагмент.
    fn fail(&mut self, index: usize, message: String) {
        log::error!("{}", message);
        self.pending = None;
        self.state.error = Some(message);
        self.state.is_playing = false;
        self.state.status = PlayerStatus::Loaded;
        self.set_index(index.min(self.chunks.len().saturating_sub(1)));
    }
}

/// Сессия воспроизведения
pub struct PlayerSession {
    engine: Arc<dyn SynthesisEngine>,
    config: ReaderConfig,
    /// Результат инициализации движка; заменяется новой ячейкой при `shutdown`
    ready: Mutex<Arc<OnceCell<bool>>>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<PlaybackState>,
}

impl PlayerSession {
    /// Создать сессию поверх движка синтеза
    pub fn new(engine: Arc<dyn SynthesisEngine>, config: ReaderConfig) -> Self {
        let state = PlaybackState {
            speed: config.default_speed,
            ..PlaybackState::default()
        };
        let (state_tx, _) = watch::channel(state.clone());

        Self {
            engine,
            config,
            ready: Mutex::new(Arc::new(OnceCell::new())),
            inner: Mutex::new(Inner {
                chunks: Vec::new(),
                chapters: Vec::new(),
                state,
                generation: Uuid::new_v4(),
                pending: None,
                released: false,
            }),
            state_tx,
        }
    }

    /// Однократно инициализировать движок.
    ///
    /// Повторные вызовы возвращают результат первой инициализации. После
    /// [`shutdown`](Self::shutdown) движок инициализируется заново.
    pub async fn initialize(&self) -> bool {
        let cell = self.ready.lock().clone();
        let ready = *cell
            .get_or_init(|| async {
                log::info!("Initializing speech engine");
                let ok = self.engine.initialize().await;
                if ok {
                    log::info!("Speech engine initialized");
                } else {
                    log::error!("TTS initialization failed");
                }
                ok
            })
            .await;
        if !ready {
            return false;
        }

        let mut inner = self.inner.lock();
        // shutdown во время инициализации делает её результат недействительным
        if !Arc::ptr_eq(&cell, &*self.ready.lock()) {
            log::warn!("Speech engine was released during initialization");
            return false;
        }
        inner.released = false;
        self.engine.set_rate(inner.state.speed);
        true
    }

    /// Загрузить текст книги без разметки глав
    pub fn load(&self, book: BookRef, text: &str) {
        self.load_with_chapters(book, text, Vec::new());
    }

    /// Загрузить разобранный документ вместе с главами
    pub fn load_document(&self, book: BookRef, document: &ParsedDocument) {
        self.load_with_chapters(book, &document.full_text, document.chapters.clone());
    }

    fn load_with_chapters(&self, book: BookRef, text: &str, chapters: Vec<Chapter>) {
        let chunks = chunk_text(text, self.config.max_chunk_len);
        let mut inner = self.inner.lock();

        if inner.state.is_playing && !inner.released {
            self.engine.stop();
        }

        log::info!("Loaded '{}' ({} chunks)", book.title, chunks.len());

        let speed = inner.state.speed;
        inner.generation = Uuid::new_v4();
        inner.pending = None;
        inner.state = PlaybackState {
            status: PlayerStatus::Loaded,
            chunk_count: chunks.len(),
            total_characters: text.chars().count(),
            speed,
            current_book: Some(book),
            ..PlaybackState::default()
        };
        inner.chunks = chunks;
        inner.chapters = chapters;
        inner.update_chapter();

        self.publish(&inner);
    }

    /// Начать или продолжить воспроизведение с текущего фрагмента
    pub fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.ensure_ready(&inner)?;

        if inner.chunks.is_empty() {
            return Err(ReaderError::NoContent);
        }
        if inner.state.is_playing {
            return Ok(());
        }
        if inner.state.status == PlayerStatus::Finished {
            // Повторное воспроизведение с начала
            inner.set_index(0);
        }

        inner.state.is_playing = true;
        inner.state.is_paused = false;
        inner.state.error = None;
        inner.state.status = PlayerStatus::Playing;

        let result = self.dispatch_current(&mut inner);
        self.publish(&inner);
        result
    }

    /// Приостановить воспроизведение; индекс фрагмента сохраняется.
    ///
    /// Флаги выставляются всегда, статус `Paused` только из `Playing` или `Paused`.
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if !inner.released {
            self.engine.stop();
        }

        inner.pending = None;
        inner.state.is_playing = false;
        inner.state.is_paused = true;
        if inner.state.status == PlayerStatus::Playing {
            inner.state.status = PlayerStatus::Paused;
        }
        self.publish(&inner);
    }

    /// Остановить воспроизведение и вернуться в начало текста
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if !inner.released {
            self.engine.stop();
        }

        inner.pending = None;
        inner.state.is_playing = false;
        inner.state.is_paused = false;
        if inner.state.status != PlayerStatus::Idle {
            inner.state.status = PlayerStatus::Loaded;
        }
        inner.set_index(0);
        self.publish(&inner);
    }

    /// Перейти к позиции (в символах полного текста)
    pub fn seek_to(&self, position: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let result = self.seek_locked(&mut inner, position);
        self.publish(&inner);
        result
    }

    /// Перейти к началу главы
    pub fn seek_to_chapter(&self, chapter: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let start = inner
            .chapters
            .get(chapter)
            .map(|c| c.start_offset)
            .ok_or(ReaderError::ChapterNotFound(chapter))?;
        let result = self.seek_locked(&mut inner, start);
        self.publish(&inner);
        result
    }

    fn seek_locked(&self, inner: &mut Inner, position: usize) -> Result<()> {
        if inner.chunks.is_empty() {
            return Err(ReaderError::NoContent);
        }

        let position = position.min(inner.state.total_characters);
        let index = (position / inner.chars_per_chunk()).min(inner.chunks.len() - 1);
        log::debug!("Seeking to position {} (chunk {})", position, index);

        inner.state.current_chunk_index = index;
        inner.state.current_position = position;
        inner.update_chapter();
        if inner.state.status == PlayerStatus::Finished {
            inner.state.status = PlayerStatus::Loaded;
        }

        if inner.state.is_playing {
            self.ensure_ready(inner)?;
            self.engine.stop();
            inner.pending = None;
            return self.dispatch_current(inner);
        }
        Ok(())
    }

    /// Установить скорость речи; применяется к следующему фрагменту
    pub fn set_speed(&self, speed: f32) -> Result<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(ReaderError::InvalidSpeed(speed));
        }

        let mut inner = self.inner.lock();
        inner.state.speed = speed;
        if !inner.released && self.is_ready() {
            self.engine.set_rate(speed);
        }
        self.publish(&inner);
        Ok(())
    }

    /// Освободить движок и вернуться в исходное состояние.
    ///
    /// Для повторного использования сессии нужно снова вызвать `initialize`.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if !inner.released {
            self.engine.stop();
            self.engine.release();
            log::info!("Speech engine released");
        }

        inner.released = true;
        *self.ready.lock() = Arc::new(OnceCell::new());
        inner.pending = None;
        inner.chunks.clear();
        inner.chapters.clear();
        inner.state = PlaybackState::default();
        self.publish(&inner);
    }

    /// Обработать событие движка.
    ///
    /// События для высказываний, которые сейчас не ожидаются (после `stop`,
    /// `seek` или перезагрузки текста), игнорируются.
    pub fn handle_event(&self, event: SynthesisEvent) {
        let mut inner = self.inner.lock();

        let utterance = match &inner.pending {
            Some(pending) if pending.id == event.utterance_id() => pending.clone(),
            _ => {
                log::debug!("Ignoring stale engine event for {}", event.utterance_id());
                return;
            }
        };

        match event {
            SynthesisEvent::Started(_) => {
                log::debug!("Utterance {} started", utterance.id);
                return;
            }
            SynthesisEvent::Completed(_) => {
                log::debug!("Utterance {} completed", utterance.id);
                inner.pending = None;
                if inner.state.status == PlayerStatus::Playing {
                    if self.config.advance_mode == AdvanceMode::OnCompletion {
                        inner.advance();
                    }
                    if inner.state.status == PlayerStatus::Playing {
                        if let Err(e) = self.dispatch_current(&mut inner) {
                            log::warn!("Playback stopped: {}", e);
                        }
                    }
                }
            }
            SynthesisEvent::Failed { reason, .. } => {
                inner.fail(
                    utterance.index,
                    format!("Speech failed for chunk {}: {}", utterance.index, reason),
                );
            }
        }

        self.publish(&inner);
    }

    /// Запустить обработку событий движка в фоне.
    ///
    /// Задача держит слабую ссылку на сессию и завершается вместе с ней.
    pub fn spawn_event_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.engine.events();
        let session = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match session.upgrade() {
                        Some(session) => session.handle_event(event),
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Player lagged behind engine events, skipped {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        log::debug!("Engine event channel closed");
                        break;
                    }
                }
            }
        })
    }

    /// Подписаться на изменения состояния
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    /// Текущее состояние
    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state.clone()
    }

    pub fn chapters(&self) -> Vec<Chapter> {
        self.inner.lock().chapters.clone()
    }

    /// Говорит ли движок прямо сейчас
    pub fn is_speaking(&self) -> bool {
        let inner = self.inner.lock();
        !inner.released && self.is_ready() && self.engine.is_busy()
    }

    fn is_ready(&self) -> bool {
        self.ready.lock().get() == Some(&true)
    }

    fn ensure_ready(&self, inner: &Inner) -> Result<()> {
        if inner.released || !self.is_ready() {
            return Err(ReaderError::EngineNotReady);
        }
        Ok(())
    }

    /// Передать движку текущий фрагмент
    fn dispatch_current(&self, inner: &mut Inner) -> Result<()> {
        let index = inner.state.current_chunk_index;
        let id = utterance_id(&inner.generation, index);

        if self.engine.speak(&inner.chunks[index], &id) {
            log::debug!("Dispatched chunk {}/{}", index + 1, inner.chunks.len());
            inner.pending = Some(Utterance { id, index });
            if self.config.advance_mode == AdvanceMode::OnDispatch {
                inner.advance();
            }
            Ok(())
        } else {
            inner.fail(index, format!("Failed to speak chunk {}", index));
            Err(ReaderError::Dispatch { index })
        }
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.state.clone());
    }
}
