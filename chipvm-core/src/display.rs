use std::io;

use crate::state::Display;

/// Something that can show the pixel grid. Called by the run loop whenever
/// the engine has flagged a redraw; the grid passed in is always complete.
pub trait Chip8Display {
    fn present(&mut self, display: &Display) -> io::Result<()>;
}
