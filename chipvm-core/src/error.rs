use std::{io, path::PathBuf};

use thiserror::Error;

/// Everything that can stop a run. None of these are retried: they are either
/// a malformed program image or a failing host environment.
#[derive(Debug, Error)]
pub enum Chip8Error {
    #[error("program image is too large ({size} bytes), at most {max_size} bytes fit in RAM")]
    ImageTooLarge { size: usize, max_size: usize },

    #[error("could not read program image {}", .path.display())]
    ImageReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown instruction {opcode:#06X} at {address:#05X}")]
    UnknownOpcode { opcode: u16, address: u16 },

    #[error("random source unavailable")]
    RandomSourceFailure(#[source] rand::Error),

    #[error("call stack overflow at {address:#05X}")]
    StackOverflow { address: u16 },

    #[error("return with empty call stack at {address:#05X}")]
    StackUnderflow { address: u16 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Chip8Error>;
