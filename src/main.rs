use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use chipvm_core::{Chip8Interpreter, Chip8State};
use clap::Parser;

mod terminal;

use terminal::{TerminalDisplay, TerminalKeyboard};

#[derive(Parser, Debug)]
#[command(name = "chipvm", about = "Runs a CHIP-8 program image in the terminal.")]
struct Args {
    /// Program image, loaded at 0x200.
    rom: PathBuf,

    /// Cycles per second. Timers tick once per cycle, so this sets their rate too.
    #[arg(long, default_value_t = 700, value_parser = clap::value_parser!(u32).range(1..))]
    speed: u32,

    /// Stop after this many cycles.
    #[arg(long, value_name = "N")]
    max_cycles: Option<u64>,

    /// Print a hex dump of memory after loading and exit.
    #[arg(long, default_value_t = false)]
    dump_memory: bool,

    /// How long a key counts as held after the terminal reports a press.
    #[arg(long, value_name = "MS", default_value_t = 100)]
    key_hold_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let mut state = Chip8State::new();
    state.load_program_file(&args.rom)?;

    if args.dump_memory {
        let mut stdout = io::stdout().lock();
        state.dump_memory(&mut stdout)?;
        stdout.flush()?;
        return Ok(());
    }

    let display = TerminalDisplay::new()?;
    let keyboard = TerminalKeyboard::new(Duration::from_millis(args.key_hold_ms));

    let mut interpreter = Chip8Interpreter::new(args.speed, display, keyboard);
    interpreter.max_cycles = args.max_cycles;

    // the terminal is restored once the interpreter is dropped
    let state = interpreter.run_state(state)?;
    log::info!(
        "finished after {} cycles at {:#05X}",
        state.cycle_count,
        state.program_counter
    );

    Ok(())
}
