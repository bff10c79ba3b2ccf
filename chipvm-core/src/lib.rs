mod display;
mod error;
pub mod font;
mod interpreter;
mod keyboard;
mod opcode;
mod state;

pub use display::Chip8Display;
pub use error::{Chip8Error, Result};
pub use interpreter::{Chip8Interpreter, PcUpdate};
pub use keyboard::{key_for_char, Chip8Keyboard};
pub use opcode::Opcode;
pub use state::{
    Chip8State, Display, DISPLAY_HEIGHT, DISPLAY_WIDTH, KEY_COUNT, MAX_PROGRAM_SIZE,
    PROGRAM_START, RAM_SIZE, STACK_DEPTH,
};
