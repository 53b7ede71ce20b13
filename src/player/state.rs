//! Состояние воспроизведения, публикуемое плеером

use serde::{Deserialize, Serialize};

/// Этап жизненного цикла плеера
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    /// Ничего не загружено
    #[default]
    Idle,
    /// Текст загружен, воспроизведение не идёт
    Loaded,
    Playing,
    Paused,
    /// Все фрагменты пройдены
    Finished,
}

/// Ссылка на книгу текущей сессии
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookRef {
    pub id: i64,
    pub title: String,
    pub author: String,
}

/// Снимок состояния плеера
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub is_paused: bool,
    pub status: PlayerStatus,
    /// Индекс текущего фрагмента; равен `chunk_count` после окончания
    pub current_chunk_index: usize,
    pub chunk_count: usize,
    /// Позиция в символах полного текста
    pub current_position: usize,
    pub total_characters: usize,
    pub speed: f32,
    pub current_book: Option<BookRef>,
    /// Глава, содержащая текущую позицию
    pub current_chapter: Option<usize>,
    pub error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            is_paused: false,
            status: PlayerStatus::Idle,
            current_chunk_index: 0,
            chunk_count: 0,
            current_position: 0,
            total_characters: 0,
            speed: 1.0,
            current_book: None,
            current_chapter: None,
            error: None,
        }
    }
}

impl PlaybackState {
    /// Доля прочитанного текста (0.0 - 1.0)
    pub fn progress(&self) -> f32 {
        if self.total_characters == 0 {
            return 0.0;
        }
        (self.current_position as f32 / self.total_characters as f32).clamp(0.0, 1.0)
    }

    /// Воспроизведение дошло до конца
    pub fn is_finished(&self) -> bool {
        self.status == PlayerStatus::Finished
    }
}

/// Предустановленные скорости воспроизведения
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PlaybackSpeed {
    Slow,
    Slower,
    Normal,
    Faster,
    Fast,
    VeryFast,
}

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 6] = [
        Self::Slow,
        Self::Slower,
        Self::Normal,
        Self::Faster,
        Self::Fast,
        Self::VeryFast,
    ];

    /// Множитель скорости речи
    pub fn value(&self) -> f32 {
        match self {
            Self::Slow => 0.5,
            Self::Slower => 0.75,
            Self::Normal => 1.0,
            Self::Faster => 1.25,
            Self::Fast => 1.5,
            Self::VeryFast => 2.0,
        }
    }

    /// Подпись для интерфейса
    pub fn label(&self) -> &'static str {
        match self {
            Self::Slow => "0.5x",
            Self::Slower => "0.75x",
            Self::Normal => "1.0x",
            Self::Faster => "1.25x",
            Self::Fast => "1.5x",
            Self::VeryFast => "2.0x",
        }
    }

    /// Ближайшая предустановка к произвольной скорости
    pub fn from_speed(speed: f32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .min_by(|a, b| {
                let da = (a.value() - speed).abs();
                let db = (b.value() - speed).abs();
                da.total_cmp(&db)
            })
            .unwrap_or(Self::Normal)
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        Self::Normal
    }
}
