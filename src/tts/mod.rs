//! Модуль для работы с TTS
//!
//! Этот модуль содержит разбиение текста на фрагменты и интерфейс движка синтеза речи.

pub mod chunker;
pub mod engine;

pub use chunker::chunk_text;
pub use engine::{SynthesisEngine, SynthesisEvent};
