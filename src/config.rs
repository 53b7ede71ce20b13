//! Модуль конфигурации библиотеки tts-reader
//!
//! Этот модуль содержит структуры и перечисления для настройки разбиения текста,
//! воспроизведения и сохранения прогресса.

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{ReaderError, Result};

/// Лимит длины одного высказывания у типичного движка синтеза
pub const ENGINE_TEXT_LIMIT: usize = 4000;

/// Размер фрагмента по умолчанию (с запасом относительно лимита движка)
pub const DEFAULT_CHUNK_LEN: usize = 3500;

/// Момент, когда плеер считает фрагмент пройденным
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMode {
    /// Сразу после успешной передачи фрагмента движку
    OnDispatch,
    /// Только после события Completed от движка
    OnCompletion,
}

impl Default for AdvanceMode {
    fn default() -> Self {
        Self::OnCompletion
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Максимальная длина фрагмента в символах
    pub max_chunk_len: usize,
    /// Жёсткий лимит движка на одно высказывание
    pub engine_text_limit: usize,
    /// Интервал сохранения прогресса во время воспроизведения (секунды)
    pub progress_interval_secs: u64,
    /// Скорость воспроизведения по умолчанию
    pub default_speed: f32,
    /// Режим продвижения по фрагментам
    pub advance_mode: AdvanceMode,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: DEFAULT_CHUNK_LEN,
            engine_text_limit: ENGINE_TEXT_LIMIT,
            progress_interval_secs: 5,
            default_speed: 1.0,
            advance_mode: AdvanceMode::default(),
        }
    }
}

impl ReaderConfig {
    /// Загрузить конфигурацию из JSON файла
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: ReaderConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded reader config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Проверить согласованность значений
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_len == 0 {
            return Err(ReaderError::Configuration("max_chunk_len must be positive".to_string()));
        }
        if self.max_chunk_len > self.engine_text_limit {
            return Err(ReaderError::Configuration(format!(
                "max_chunk_len {} exceeds engine limit {}",
                self.max_chunk_len, self.engine_text_limit
            )));
        }
        if self.progress_interval_secs == 0 {
            return Err(ReaderError::Configuration("progress_interval_secs must be positive".to_string()));
        }
        if !(self.default_speed.is_finite() && self.default_speed > 0.0) {
            return Err(ReaderError::InvalidSpeed(self.default_speed));
        }
        Ok(())
    }

    /// Интервал сохранения прогресса
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}
