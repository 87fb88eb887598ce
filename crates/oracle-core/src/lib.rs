pub mod cache;
pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod esport;
pub mod models;
pub mod playback;
pub mod selector;

pub use error::{AppError, Result};
pub use models::{Artist, Category, Channel, ChannelVideo, Content, Ranking, Video};
