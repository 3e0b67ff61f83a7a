pub mod config;
pub mod document;
pub mod view;

pub use config::*;
pub use document::*;
pub use view::*;
