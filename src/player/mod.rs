//! Модуль воспроизведения
//!
//! Конечный автомат плеера и публикуемое им состояние.

pub mod session;
pub mod state;

pub use session::PlayerSession;
pub use state::{BookRef, PlaybackSpeed, PlaybackState, PlayerStatus};
