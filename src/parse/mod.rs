pub mod block_locator;
pub mod span;

pub use block_locator::{Markers, folding_ranges, locate, locate_lines};
pub use span::BlockRange;
