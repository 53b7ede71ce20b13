//! Модуль для отслеживания прогресса чтения
//!
//! [`ProgressTracker`] наблюдает за состоянием плеера через `watch` канал и
//! записывает позицию в хранилище: периодически во время воспроизведения и
//! при каждой смене статуса. Записи передаются через очередь одной задаче,
//! которая выполняет их строго по порядку и не блокирует команды плеера.

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use crate::error::{ReaderError, Result};
use crate::player::{PlaybackState, PlayerStatus};
use crate::store::BookStore;

/// Снимок прогресса чтения
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub book_id: i64,
    /// Позиция в символах полного текста
    pub position: u64,
    /// Индекс главы, содержащей позицию
    pub page: usize,
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Снимок текущего состояния; `None`, если книга не загружена
    pub fn from_state(state: &PlaybackState) -> Option<Self> {
        let book = state.current_book.as_ref()?;
        Some(Self {
            book_id: book.id,
            position: state.current_position as u64,
            page: state.current_chapter.unwrap_or(0),
            timestamp: Utc::now(),
        })
    }
}

/// Команда задаче записи
enum WriteCommand {
    Save(ProgressSnapshot),
    /// Записать снимок (если есть) и сообщить результат после всех
    /// предыдущих записей
    Flush {
        snapshot: Option<ProgressSnapshot>,
        done: oneshot::Sender<Result<()>>,
    },
}

async fn write_snapshot(store: &dyn BookStore, snapshot: &ProgressSnapshot) -> Result<()> {
    store
        .update_progress(snapshot.book_id, snapshot.position, snapshot.page, snapshot.timestamp)
        .await
}

/// Задача записи: единственный писатель в хранилище для трекера.
///
/// Завершается, когда закрыты все отправители очереди, выполнив оставшиеся
/// записи.
async fn run_writer(store: Arc<dyn BookStore>, mut commands: mpsc::UnboundedReceiver<WriteCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            WriteCommand::Save(snapshot) => {
                if let Err(e) = write_snapshot(store.as_ref(), &snapshot).await {
                    log::error!("Failed to update progress for book {}: {}", snapshot.book_id, e);
                }
            }
            WriteCommand::Flush { snapshot, done } => {
                let result = match snapshot {
                    Some(snapshot) => write_snapshot(store.as_ref(), &snapshot).await.map(|()| {
                        log::debug!("Flushed progress for book {}: position={}", snapshot.book_id, snapshot.position);
                    }),
                    None => Ok(()),
                };
                let _ = done.send(result);
            }
        }
    }
    log::debug!("Progress writer stopped");
}

/// Поставить снимок состояния в очередь записи
fn record(writes: &mpsc::UnboundedSender<WriteCommand>, state: &PlaybackState) {
    if let Some(snapshot) = ProgressSnapshot::from_state(state) {
        if writes.send(WriteCommand::Save(snapshot)).is_err() {
            log::warn!("Progress writer is gone, snapshot dropped");
        }
    }
}

/// Трекер прогресса одной сессии чтения
pub struct ProgressTracker {
    state_rx: watch::Receiver<PlaybackState>,
    writes: mpsc::UnboundedSender<WriteCommand>,
    task: JoinHandle<()>,
}

impl ProgressTracker {
    /// Запустить трекер; должен вызываться внутри runtime Tokio
    pub fn spawn(state_rx: watch::Receiver<PlaybackState>, store: Arc<dyn BookStore>, interval: Duration) -> Self {
        let (writes, commands) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, commands));
        let task = tokio::spawn(run(writes.clone(), state_rx.clone(), interval));
        Self { state_rx, writes, task }
    }

    /// Дождаться поставленных в очередь записей и сохранить текущее состояние
    pub async fn flush(&self) -> Result<()> {
        let snapshot = ProgressSnapshot::from_state(&self.state_rx.borrow());
        let (done, result) = oneshot::channel();
        self.writes
            .send(WriteCommand::Flush { snapshot, done })
            .map_err(|_| ReaderError::Task("Progress writer stopped".to_string()))?;
        result
            .await
            .map_err(|_| ReaderError::Task("Progress writer dropped flush request".to_string()))?
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        // Задача записи завершится сама после закрытия очереди
        self.task.abort();
    }
}

async fn run(writes: mpsc::UnboundedSender<WriteCommand>, mut state_rx: watch::Receiver<PlaybackState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Первый тик срабатывает сразу
    ticker.tick().await;

    let mut last_status: PlayerStatus = state_rx.borrow_and_update().status;

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    log::debug!("Player state channel closed, progress tracker stopped");
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if state.status != last_status {
                    log::debug!("Player status {:?} -> {:?}", last_status, state.status);
                    last_status = state.status;
                    record(&writes, &state);
                }
            }
            _ = ticker.tick() => {
                let state = state_rx.borrow().clone();
                if state.is_playing {
                    record(&writes, &state);
                }
            }
        }
    }
}
