use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
};

use crate::{
    font::{self, FONT_ADDRESS, GLYPH_SIZE},
    Chip8Error, Result,
};

pub const RAM_SIZE: usize = 4096;
pub const PROGRAM_START: u16 = 0x200;
pub const MAX_PROGRAM_SIZE: usize = RAM_SIZE - PROGRAM_START as usize;

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;
pub const STACK_DEPTH: usize = 16;
pub const KEY_COUNT: usize = 16;

/// Row-major pixel grid, `display[y][x]`.
pub type Display = [[bool; DISPLAY_WIDTH]; DISPLAY_HEIGHT];

/// The whole machine. Owned by the host for one run and only mutated by
/// [`Chip8State::cycle`], apart from `keys` (written by the host) and
/// `redraw_pending` (cleared by the host).
#[derive(Debug, Clone)]
pub struct Chip8State {
    pub data_registers: [u8; 16],
    /// Carry, borrow and collision output. Not an alias of `data_registers[0xF]`.
    pub flag_register: u16,
    pub index_register: u16,
    pub program_counter: u16,
    pub stack_pointer: u8,
    pub ram: [u8; RAM_SIZE],
    pub stack: [u16; STACK_DEPTH],
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub display: Display,
    pub redraw_pending: bool,
    pub keys: [bool; KEY_COUNT],
    pub cycle_count: u64,
}

impl Default for Chip8State {
    fn default() -> Self {
        let mut state = Self {
            data_registers: [0; 16],
            flag_register: 0,
            index_register: 0,
            program_counter: PROGRAM_START,
            stack_pointer: 0,
            ram: [0; RAM_SIZE],
            stack: [0; STACK_DEPTH],
            delay_timer: 0,
            sound_timer: 0,
            display: [[false; DISPLAY_WIDTH]; DISPLAY_HEIGHT],
            // present the blank screen straight away
            redraw_pending: true,
            keys: [false; KEY_COUNT],
            cycle_count: 0,
        };
        state.load_font_data();
        state
    }
}

impl Chip8State {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_font_data(&mut self) {
        let size = GLYPH_SIZE as usize;
        for digit in 0..16u8 {
            let start = FONT_ADDRESS + digit as usize * size;
            self.ram[start..start + size].copy_from_slice(font::glyph(digit));
        }
    }

    /// Copies a program image to 0x200. Images that do not fit below the end
    /// of RAM are rejected without touching memory.
    pub fn load_program(&mut self, program: &[u8]) -> Result<()> {
        if program.len() > MAX_PROGRAM_SIZE {
            return Err(Chip8Error::ImageTooLarge {
                size: program.len(),
                max_size: MAX_PROGRAM_SIZE,
            });
        }

        let start = PROGRAM_START as usize;
        self.ram[start..start + program.len()].copy_from_slice(program);
        log::debug!("loaded {} byte program at {:#05X}", program.len(), start);
        Ok(())
    }

    /// Loads an image from disk. The file size is checked before anything is
    /// read, and at most one byte past the limit is ever buffered.
    pub fn load_program_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let read_failure = |source| Chip8Error::ImageReadFailure {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(read_failure)?;
        let size = file.metadata().map_err(read_failure)?.len();
        if size > MAX_PROGRAM_SIZE as u64 {
            return Err(Chip8Error::ImageTooLarge {
                size: usize::try_from(size).unwrap_or(usize::MAX),
                max_size: MAX_PROGRAM_SIZE,
            });
        }

        let mut program = Vec::with_capacity(size as usize);
        file.take(MAX_PROGRAM_SIZE as u64 + 1)
            .read_to_end(&mut program)
            .map_err(read_failure)?;
        self.load_program(&program)
    }

    pub fn register(&self, register_index: u8) -> u8 {
        self.data_registers[register_index as usize]
    }

    pub fn register_mut(&mut self, register_index: u8) -> &mut u8 {
        &mut self.data_registers[register_index as usize]
    }

    pub fn set_flag(&mut self, flag: bool) {
        self.flag_register = flag as u16;
    }

    /// Memory byte at `address`, wrapping at the end of RAM.
    pub fn read_byte(&self, address: u16) -> u8 {
        self.ram[address as usize % RAM_SIZE]
    }

    pub fn write_byte(&mut self, address: u16, byte: u8) {
        self.ram[address as usize % RAM_SIZE] = byte;
    }

    pub fn is_key_down(&self, key: u8) -> bool {
        self.keys[(key & 0xF) as usize]
    }

    /// Hex dump of RAM, 16 bytes a row. Stops before the last non-zero byte.
    pub fn dump_memory<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let last = self.ram.iter().rposition(|&byte| byte != 0).unwrap_or(0);
        let width = 16;

        for (i, byte) in self.ram[..last].iter().enumerate() {
            if i % width == 0 {
                if i > 0 {
                    writeln!(out)?;
                }
                write!(out, "{:04X}: ", i)?;
            }
            write!(out, "{:02X} ", byte)?;
        }
        writeln!(out)
    }
}
