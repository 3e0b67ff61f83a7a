pub mod cli;
pub mod host;
pub mod io;
pub mod model;
pub mod parse;
pub mod sync;
