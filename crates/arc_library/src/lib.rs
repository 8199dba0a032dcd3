pub mod error;
pub mod event;
pub mod midi;
pub mod mode;
pub mod model;
pub mod runtime;
pub mod services;
pub mod settings;
pub mod shared;
pub mod sink;
pub mod styles;

pub use error::{ArcError, Result};
pub use event::InputEvent;
pub use mode::Mode;
pub use model::Model;
pub use runtime::{Runtime, Sinks};
pub use settings::Settings;
pub use shared::SharedModel;
