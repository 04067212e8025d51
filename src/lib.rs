pub mod types;
pub mod error;
pub mod config;
pub mod objects;
pub mod canvas;
pub mod assets;
pub mod session;
pub mod selection;
pub mod shapes;
pub mod surface;
pub mod fonts;
pub mod render;
pub mod export;
pub mod io;
pub mod commands;
pub mod engine;

pub use canvas::{AddOutcome, Canvas, MainImage, Target};
pub use config::EngineConfig;
pub use engine::StudioEngine;
pub use error::{ResourceError, Result, StudioError};
pub use objects::*;
pub use types::*;
