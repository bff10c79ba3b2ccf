use std::{
    io::{self, stdout, Stdout, Write},
    time::{Duration, Instant},
};

use chipvm_core::{key_for_char, Chip8Display, Chip8Keyboard, Display, KEY_COUNT};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{self, Stylize},
    terminal,
};

/// Draws the grid on an alternate screen, two characters per pixel so the
/// aspect ratio is roughly right. The terminal is restored on drop.
pub struct TerminalDisplay {
    stdout: Stdout,
}

impl TerminalDisplay {
    pub fn new() -> io::Result<Self> {
        let mut stdout = stdout();
        terminal::enable_raw_mode()?;
        execute!(
            stdout,
            terminal::EnterAlternateScreen,
            terminal::Clear(terminal::ClearType::All),
            cursor::Hide
        )?;
        Ok(Self { stdout })
    }
}

impl Chip8Display for TerminalDisplay {
    fn present(&mut self, display: &Display) -> io::Result<()> {
        for (row, line) in display.iter().enumerate() {
            queue!(self.stdout, cursor::MoveTo(0, row as u16))?;
            for &pixel in line {
                if pixel {
                    queue!(self.stdout, style::PrintStyledContent("██".yellow()))?
                } else {
                    queue!(self.stdout, style::PrintStyledContent("  ".black()))?
                }
            }
        }
        self.stdout.flush()
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        let _ = execute!(self.stdout, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Most terminals only report presses, so a key counts as held for
/// `hold` after its last press (or until a release, where one is reported).
pub struct TerminalKeyboard {
    hold: Duration,
    pressed_at: [Option<Instant>; KEY_COUNT],
    quit: bool,
}

impl TerminalKeyboard {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            pressed_at: [None; KEY_COUNT],
            quit: false,
        }
    }

    fn handle_key(&mut self, event: KeyEvent, now: Instant) {
        match event.code {
            KeyCode::Esc => self.quit = true,
            KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quit = true
            }
            KeyCode::Char(c) => {
                if let Some(key) = key_for_char(c) {
                    self.pressed_at[key as usize] = match event.kind {
                        KeyEventKind::Release => None,
                        KeyEventKind::Press | KeyEventKind::Repeat => Some(now),
                    };
                }
            }
            _ => {}
        }
    }

    fn release_expired(&mut self, now: Instant) {
        for pressed_at in &mut self.pressed_at {
            if pressed_at.is_some_and(|at| now.duration_since(at) >= self.hold) {
                *pressed_at = None;
            }
        }
    }
}

impl Chip8Keyboard for TerminalKeyboard {
    fn update_keystates(&mut self, max_duration_microseconds: u64) -> io::Result<()> {
        let deadline = Instant::now() + Duration::from_micros(max_duration_microseconds);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !event::poll(remaining)? {
                break;
            }
            if let Event::Key(key_event) = event::read()? {
                self.handle_key(key_event, Instant::now());
            }
        }

        self.release_expired(Instant::now());
        Ok(())
    }

    fn is_key_down(&self, key: u8) -> bool {
        self.pressed_at[(key & 0xF) as usize].is_some()
    }

    fn quit_requested(&self) -> bool {
        self.quit
    }
}
