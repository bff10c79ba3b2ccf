use std::io;

/// Host input, polled by the run loop between cycles.
pub trait Chip8Keyboard {
    /// Collects input events, blocking for at most the given time.
    fn update_keystates(&mut self, max_duration_microseconds: u64) -> io::Result<()>;
    fn is_key_down(&self, key: u8) -> bool;
    fn quit_requested(&self) -> bool;
}

/// Maps the 4x4 block of a QWERTY keyboard onto the hex pad:
///
/// ```text
/// 1 2 3 4      1 2 3 C
/// Q W E R  ->  4 5 6 D
/// A S D F      7 8 9 E
/// Z X C V      A 0 B F
/// ```
pub fn key_for_char(c: char) -> Option<u8> {
    let key = match c.to_ascii_lowercase() {
        '1' => 0x1,
        '2' => 0x2,
        '3' => 0x3,
        '4' => 0xC,
        'q' => 0x4,
        'w' => 0x5,
        'e' => 0x6,
        'r' => 0xD,
        'a' => 0x7,
        's' => 0x8,
        'd' => 0x9,
        'f' => 0xE,
        'z' => 0xA,
        'x' => 0x0,
        'c' => 0xB,
        'v' => 0xF,
        _ => return None,
    };
    Some(key)
}
