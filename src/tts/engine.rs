//! Интерфейс внешнего движка синтеза речи
//!
//! Плеер не знает, какой движок озвучивает текст: он работает через трейт
//! [`SynthesisEngine`] и получает уведомления о высказываниях через канал событий.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Событие движка, относящееся к одному высказыванию
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynthesisEvent {
    /// Движок начал произносить высказывание
    Started(String),
    /// Высказывание произнесено полностью
    Completed(String),
    /// Высказывание завершилось ошибкой
    Failed {
        /// Идентификатор высказывания
        id: String,
        /// Причина ошибки
        reason: String,
    },
}

impl SynthesisEvent {
    /// Идентификатор высказывания, к которому относится событие
    pub fn utterance_id(&self) -> &str {
        match self {
            Self::Started(id) | Self::Completed(id) => id,
            Self::Failed { id, .. } => id,
        }
    }
}

/// Трейт, который должен реализовать любой движок синтеза речи
#[async_trait::async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Однократная асинхронная инициализация движка
    async fn initialize(&self) -> bool;

    /// Поставить текст в очередь на произнесение
    fn speak(&self, text: &str, utterance_id: &str) -> bool;

    /// Остановить вывод речи
    fn stop(&self);

    /// Установить скорость речи
    fn set_rate(&self, rate: f32);

    /// Говорит ли движок в данный момент
    fn is_busy(&self) -> bool;

    /// Подписаться на события высказываний
    fn events(&self) -> broadcast::Receiver<SynthesisEvent>;

    /// Освободить ресурсы движка
    fn release(&self) {}
}

/// Собрать идентификатор высказывания для фрагмента
pub fn utterance_id(generation: &uuid::Uuid, chunk_index: usize) -> String {
    format!("{}:chunk_{}", generation.simple(), chunk_index)
}
