use std::{
    io,
    path::Path,
    time::{Duration, Instant},
};

use rand::{rngs::OsRng, RngCore};

use crate::{
    font::GLYPH_SIZE,
    state::{DISPLAY_HEIGHT, DISPLAY_WIDTH, KEY_COUNT, STACK_DEPTH},
    Chip8Display, Chip8Error, Chip8Keyboard, Chip8State, Opcode, Result,
};

/// What happens to the program counter once an instruction body has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcUpdate {
    /// Move on to the next instruction.
    Advance,
    /// Step over the next instruction.
    Skip,
    /// Leave the program counter alone. Used by jumps, which already set it,
    /// and by the key wait, which retries the same instruction next cycle.
    Hold,
}

impl Chip8State {
    /// Runs one fetch-decode-execute step, drawing random bytes from the OS.
    pub fn cycle(&mut self) -> Result<PcUpdate> {
        self.cycle_with_rng(&mut OsRng)
    }

    pub fn cycle_with_rng<R: RngCore>(&mut self, rng: &mut R) -> Result<PcUpdate> {
        //fetch
        let pc = self.program_counter;
        let op = Opcode::decode(self.read_byte(pc), self.read_byte(pc.wrapping_add(1)));

        self.cycle_count += 1;
        log::trace!(
            "{}, PC: {:#06X}, SP: {:#05X}, full: {:#06X}, addr: {:#05X}, nibble: {:#X}, x: {:#04X}, y: {:#04X}, kk: {:#04X}",
            self.cycle_count,
            pc,
            self.stack_pointer,
            op.full,
            op.address,
            op.nibble,
            op.x,
            op.y,
            op.immediate
        );

        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);

        let update = self.execute(op, rng)?;

        match update {
            PcUpdate::Advance => self.program_counter = self.program_counter.wrapping_add(2),
            PcUpdate::Skip => self.program_counter = self.program_counter.wrapping_add(4),
            PcUpdate::Hold => {}
        }

        Ok(update)
    }

    fn execute<R: RngCore>(&mut self, op: Opcode, rng: &mut R) -> Result<PcUpdate> {
        let Opcode {
            address,
            nibble,
            x: vx,
            y: vy,
            immediate,
            ..
        } = op;

        let skip_if = |condition: bool| {
            if condition {
                PcUpdate::Skip
            } else {
                PcUpdate::Advance
            }
        };

        let nibbles = [(op.full >> 12) as u8, vx, vy, nibble];

        let update = match nibbles {
            //clear display
            [0x0, 0x0, 0xE, 0x0] => {
                self.display = [[false; DISPLAY_WIDTH]; DISPLAY_HEIGHT];
                self.redraw_pending = true;
                PcUpdate::Advance
            }
            //return
            [0x0, 0x0, 0xE, 0xE] => {
                if self.stack_pointer == 0 {
                    return Err(Chip8Error::StackUnderflow {
                        address: self.program_counter,
                    });
                }
                self.program_counter = self.stack[self.stack_pointer as usize];
                self.stack_pointer -= 1;
                log::debug!("return to {:#05X}", self.program_counter);
                PcUpdate::Advance
            }
            //jump to address
            [0x1, _, _, _] => {
                self.program_counter = address;
                PcUpdate::Hold
            }
            //call subroutine
            [0x2, _, _, _] => {
                if self.stack_pointer as usize + 1 >= STACK_DEPTH {
                    return Err(Chip8Error::StackOverflow {
                        address: self.program_counter,
                    });
                }
                self.stack_pointer += 1;
                self.stack[self.stack_pointer as usize] = self.program_counter;
                log::debug!("call {:#05X} from {:#05X}", address, self.program_counter);
                self.program_counter = address;
                PcUpdate::Hold
            }
            //skip if Vx == NN
            [0x3, _, _, _] => skip_if(self.register(vx) == immediate),
            //skip if Vx != NN
            [0x4, _, _, _] => skip_if(self.register(vx) != immediate),
            //skip if Vx == Vy
            [0x5, _, _, 0x0] => skip_if(self.register(vx) == self.register(vy)),
            //Vx = value
            [0x6, _, _, _] => {
                *self.register_mut(vx) = immediate;
                PcUpdate::Advance
            }
            //Vx += value
            [0x7, _, _, _] => {
                *self.register_mut(vx) = self.register(vx).wrapping_add(immediate);
                PcUpdate::Advance
            }
            [0x8, _, _, 0x0 | 0x1 | 0x2 | 0x3 | 0x4 | 0x5 | 0x6 | 0x7 | 0xE] => {
                self.arithmetic(vx, vy, nibble);
                PcUpdate::Advance
            }
            // Vx is compared with itself, so this never skips
            #[allow(clippy::eq_op)]
            [0x9, _, _, 0x0] => skip_if(self.register(vx) != self.register(vx)),
            //I = address
            [0xA, _, _, _] => {
                self.index_register = address;
                PcUpdate::Advance
            }
            // Jump to V0 + low byte of address, truncated to a byte
            [0xB, _, _, _] => {
                self.program_counter = self.register(0x0).wrapping_add(address as u8) as u16;
                PcUpdate::Hold
            }
            // Vx = random byte
            [0xC, _, _, _] => {
                let mut byte = [0u8];
                rng.try_fill_bytes(&mut byte)
                    .map_err(Chip8Error::RandomSourceFailure)?;
                *self.register_mut(vx) = byte[0];
                PcUpdate::Advance
            }
            //Display sprite
            [0xD, _, _, _] => {
                self.draw_sprite(self.register(vx), self.register(vy), nibble);
                PcUpdate::Advance
            }
            // skip if key()
            [0xE, _, 0x9, 0xE] => skip_if(self.is_key_down(self.register(vx))),
            // skip if !key()
            [0xE, _, 0xA, 0x1] => skip_if(!self.is_key_down(self.register(vx))),
            // Vx = delay timer
            [0xF, _, 0x0, 0x7] => {
                *self.register_mut(vx) = self.delay_timer;
                PcUpdate::Advance
            }
            // Vx = get_key()
            [0xF, _, 0x0, 0xA] => match self.keys.iter().rposition(|&pressed| pressed) {
                Some(key) => {
                    log::debug!("key {:X} pressed", key);
                    *self.register_mut(vx) = key as u8;
                    PcUpdate::Advance
                }
                None => PcUpdate::Hold,
            },
            // Set delay timer to vx
            [0xF, _, 0x1, 0x5] => {
                self.delay_timer = self.register(vx);
                PcUpdate::Advance
            }
            // Set sound timer to vx
            [0xF, _, 0x1, 0x8] => {
                self.sound_timer = self.register(vx);
                PcUpdate::Advance
            }
            // I += Vx
            [0xF, _, 0x1, 0xE] => {
                self.index_register = self.index_register.wrapping_add(self.register(vx) as u16);
                PcUpdate::Advance
            }
            // I = glyph of the register *index*, not its value
            [0xF, _, 0x2, 0x9] => {
                self.index_register = vx as u16 * GLYPH_SIZE;
                PcUpdate::Advance
            }
            // Convert and store Vx to decimal
            [0xF, _, 0x3, 0x3] => {
                let value = self.register(vx);
                let i = self.index_register;
                self.write_byte(i, value / 100);
                self.write_byte(i.wrapping_add(1), value / 10 % 10);
                self.write_byte(i.wrapping_add(2), value % 10);
                PcUpdate::Advance
            }
            // Store V0 up to, but not including, Vx
            [0xF, _, 0x5, 0x5] => {
                for i in 0..vx {
                    self.write_byte(self.index_register.wrapping_add(i as u16), self.register(i));
                }
                PcUpdate::Advance
            }
            // Load V0 up to and including Vx
            [0xF, _, 0x6, 0x5] => {
                for i in 0..=vx {
                    *self.register_mut(i) = self.read_byte(self.index_register.wrapping_add(i as u16));
                }
                PcUpdate::Advance
            }
            _ => {
                return Err(Chip8Error::UnknownOpcode {
                    opcode: op.full,
                    address: self.program_counter,
                })
            }
        };

        Ok(update)
    }

    fn arithmetic(&mut self, vx: u8, vy: u8, operation: u8) {
        let x = self.register(vx);
        let y = self.register(vy);

        match operation {
            //Vx = Vy
            0x0 => *self.register_mut(vx) = y,
            //Vx |= Vy
            0x1 => *self.register_mut(vx) |= y,
            //Vx &= Vy
            0x2 => *self.register_mut(vx) &= y,
            //Vx ^= Vy
            0x3 => *self.register_mut(vx) ^= y,
            //Vx += Vy
            0x4 => {
                let sum = x as u16 + y as u16;
                self.set_flag(sum > 0xFF);
                *self.register_mut(vx) = sum as u8;
            }
            //Vx -= Vy, flag set only when Vx is strictly greater
            0x5 => {
                self.set_flag(x > y);
                *self.register_mut(vx) = x.wrapping_sub(y);
            }
            //Vx >>= 1
            0x6 => {
                self.set_flag(x & 0x01 == 1);
                *self.register_mut(vx) = x >> 1;
            }
            //Vx = Vy - Vx
            0x7 => {
                self.set_flag(y > x);
                *self.register_mut(vx) = y.wrapping_sub(x);
            }
            //Vx <<= 1
            0xE => {
                self.set_flag(x & 0x80 == 0x80);
                *self.register_mut(vx) = x << 1;
            }
            _ => unreachable!("filtered by the dispatch pattern"),
        }
    }

    /// XORs `rows` bytes from I onto the screen at (x, y), wrapping at both
    /// edges. A lit pixel that gets switched off sets the flag; the flag is
    /// never cleared here.
    fn draw_sprite(&mut self, x: u8, y: u8, rows: u8) {
        for row in 0..rows {
            let line = self.read_byte(self.index_register.wrapping_add(row as u16));
            let yy = (y as usize + row as usize) % DISPLAY_HEIGHT;

            for col in 0..8 {
                if line & (0x80 >> col) == 0 {
                    continue;
                }
                let xx = (x as usize + col) % DISPLAY_WIDTH;
                let pixel = &mut self.display[yy][xx];
                if *pixel {
                    *pixel = false;
                    self.flag_register = 1;
                } else {
                    *pixel = true;
                }
            }
        }

        self.redraw_pending = true;
    }
}

struct Timer {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl Timer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// The first call always ticks. A timer that has fallen more than one
    /// interval behind restarts from now instead of catching up.
    fn tick(&mut self) -> bool {
        match self.last_tick {
            None => {
                self.last_tick = Some(Instant::now());
                true
            }
            Some(last_tick) if last_tick.elapsed() >= self.interval => {
                self.last_tick = Some(if last_tick.elapsed() >= 2 * self.interval {
                    Instant::now()
                } else {
                    last_tick + self.interval
                });
                true
            }
            Some(_) => false,
        }
    }
}

/// Paces the engine against wall-clock time and wires it to a display and a
/// keyboard. Timers still count cycles, so `max_clock_speed` also sets how
/// fast they run.
pub struct Chip8Interpreter<D: Chip8Display, K: Chip8Keyboard> {
    pub max_clock_speed: u32,
    pub max_cycles: Option<u64>,
    pub display: D,
    pub keyboard: K,
}

impl<D: Chip8Display, K: Chip8Keyboard> Chip8Interpreter<D, K> {
    pub fn new(max_clock_speed: u32, display: D, keyboard: K) -> Self {
        Self {
            max_clock_speed,
            max_cycles: None,
            display,
            keyboard,
        }
    }

    pub fn run<P: AsRef<Path>>(self, path: P) -> Result<Chip8State> {
        let mut state = Chip8State::new();
        state.load_program_file(path)?;
        self.run_state(state)
    }

    pub fn run_program(self, program: &[u8]) -> Result<Chip8State> {
        let mut state = Chip8State::new();
        state.load_program(program)?;
        self.run_state(state)
    }

    /// Cycles `state` until the keyboard asks to quit, `max_cycles` is
    /// reached or the engine fails. Returns the final machine state.
    pub fn run_state(mut self, mut state: Chip8State) -> Result<Chip8State> {
        let cpu_frame_time_micros = 1_000_000 / self.max_clock_speed.max(1) as u64;
        let cpu_frame_time = Duration::from_micros(cpu_frame_time_micros);
        let mut next_cpu_frame = Instant::now() + cpu_frame_time;
        let mut frame_timer = Timer::new(Duration::from_secs_f32(1. / 60.));

        let mut rng = OsRng;

        loop {
            if self
                .max_cycles
                .is_some_and(|max_cycles| state.cycle_count >= max_cycles)
            {
                log::info!("stopping after {} cycles", state.cycle_count);
                break;
            }

            state.cycle_with_rng(&mut rng)?;

            if state.redraw_pending && frame_timer.tick() {
                self.present(&mut state)?;
            }

            let time_left = next_cpu_frame.saturating_duration_since(Instant::now());
            next_cpu_frame += cpu_frame_time;

            self.keyboard
                .update_keystates(time_left.as_micros() as u64)?;
            if self.keyboard.quit_requested() {
                log::info!("quit requested after {} cycles", state.cycle_count);
                break;
            }
            for key in 0..KEY_COUNT {
                state.keys[key] = self.keyboard.is_key_down(key as u8);
            }
        }

        if state.redraw_pending {
            self.present(&mut state)?;
        }

        Ok(state)
    }

    fn present(&mut self, state: &mut Chip8State) -> io::Result<()> {
        self.display.present(&state.display)?;
        state.redraw_pending = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::font;

    fn state_with(program: &[u8]) -> Chip8State {
        let mut state = Chip8State::new();
        state.load_program(program).unwrap();
        state
    }

    fn step(state: &mut Chip8State) -> PcUpdate {
        state.cycle_with_rng(&mut StdRng::seed_from_u64(8)).unwrap()
    }

    fn run_op(state: &mut Chip8State, op: u16) -> PcUpdate {
        let pc = state.program_counter;
        let [high, low] = op.to_be_bytes();
        state.write_byte(pc, high);
        state.write_byte(pc + 1, low);
        step(state)
    }

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            unimplemented!()
        }

        fn next_u64(&mut self) -> u64 {
            unimplemented!()
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            unimplemented!()
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            Err(rand::Error::new("no entropy"))
        }
    }

    #[test]
    fn load_immediate() {
        let mut state = state_with(&[0x60, 0x0A]);
        assert_eq!(step(&mut state), PcUpdate::Advance);
        assert_eq!(state.register(0), 0x0A);
        assert_eq!(state.program_counter, 0x202);
        assert_eq!(state.cycle_count, 1);
    }

    #[test]
    fn self_jump() {
        let mut state = state_with(&[0x12, 0x00]);
        assert_eq!(step(&mut state), PcUpdate::Hold);
        assert_eq!(state.program_counter, 0x200);
    }

    #[test]
    fn jump_uses_eleven_bit_address() {
        let mut state = Chip8State::new();
        run_op(&mut state, 0x1ABC);
        assert_eq!(state.program_counter, 0x2BC);
    }

    #[test]
    fn call_pushes_current_address() {
        let mut state = state_with(&[0x22, 0x10]);
        step(&mut state);
        assert_eq!(state.stack_pointer, 1);
        assert_eq!(state.stack[1], 0x200);
        assert_eq!(state.program_counter, 0x210);
    }

    #[test]
    fn call_then_return() {
        let mut state = state_with(&[0x22, 0x10]);
        state.write_byte(0x210, 0x00);
        state.write_byte(0x211, 0xEE);

        step(&mut state);
        step(&mut state);

        assert_eq!(state.program_counter, 0x202);
        assert_eq!(state.stack_pointer, 0);
    }

    #[test]
    fn return_on_empty_stack_fails() {
        let mut state = state_with(&[0x00, 0xEE]);
        let err = state.cycle().unwrap_err();
        assert!(matches!(err, Chip8Error::StackUnderflow { address: 0x200 }));
    }

    #[test]
    fn call_depth_is_bounded() {
        // 0x200: call 0x200, forever
        let mut state = state_with(&[0x22, 0x00]);
        for depth in 1..STACK_DEPTH {
            step(&mut state);
            assert_eq!(state.stack_pointer as usize, depth);
        }
        let err = state.cycle().unwrap_err();
        assert!(matches!(err, Chip8Error::StackOverflow { .. }));
    }

    #[test]
    fn unknown_opcode() {
        let mut state = state_with(&[0x01, 0x23]);
        let err = state.cycle().unwrap_err();
        assert!(matches!(
            err,
            Chip8Error::UnknownOpcode {
                opcode: 0x0123,
                address: 0x200
            }
        ));

        for op in [0x5121, 0x8128, 0x912F, 0xE19F, 0xF1FF] {
            let mut state = Chip8State::new();
            let [high, low] = u16::to_be_bytes(op);
            state.load_program(&[high, low]).unwrap();
            assert!(matches!(
                state.cycle(),
                Err(Chip8Error::UnknownOpcode { .. })
            ));
        }
    }

    #[test]
    fn skips() {
        let mut state = Chip8State::new();
        *state.register_mut(3) = 0x42;
        *state.register_mut(4) = 0x42;

        assert_eq!(run_op(&mut state, 0x3342), PcUpdate::Skip);
        assert_eq!(state.program_counter, 0x204);
        assert_eq!(run_op(&mut state, 0x3343), PcUpdate::Advance);
        assert_eq!(run_op(&mut state, 0x4343), PcUpdate::Skip);
        assert_eq!(run_op(&mut state, 0x4342), PcUpdate::Advance);
        assert_eq!(run_op(&mut state, 0x5340), PcUpdate::Skip);
        assert_eq!(run_op(&mut state, 0x5350), PcUpdate::Advance);
        assert_eq!(state.program_counter, 0x210);
    }

    #[test]
    fn skip_if_not_equal_never_skips() {
        let mut state = Chip8State::new();
        *state.register_mut(0) = 1;
        *state.register_mut(1) = 2;
        assert_eq!(run_op(&mut state, 0x9010), PcUpdate::Advance);
        assert_eq!(state.program_counter, 0x202);
    }

    #[test]
    fn add_immediate_wraps_without_flag() {
        let mut state = Chip8State::new();
        *state.register_mut(2) = 0xFF;
        run_op(&mut state, 0x7202);
        assert_eq!(state.register(2), 0x01);
        assert_eq!(state.flag_register, 0);
    }

    #[test]
    fn logic_ops() {
        let mut state = Chip8State::new();
        *state.register_mut(1) = 0b1100;
        *state.register_mut(2) = 0b1010;

        run_op(&mut state, 0x8121);
        assert_eq!(state.register(1), 0b1110);
        run_op(&mut state, 0x8122);
        assert_eq!(state.register(1), 0b1010);
        run_op(&mut state, 0x8123);
        assert_eq!(state.register(1), 0);
        run_op(&mut state, 0x8120);
        assert_eq!(state.register(1), 0b1010);
    }

    #[test]
    fn add_sets_carry_for_every_pair() {
        let mut state = Chip8State::new();
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                state.program_counter = 0x200;
                *state.register_mut(0) = a;
                *state.register_mut(1) = b;
                run_op(&mut state, 0x8014);
                assert_eq!(state.register(0), a.wrapping_add(b));
                assert_eq!(state.flag_register, (a as u16 + b as u16 > 255) as u16);
            }
        }
    }

    #[test]
    fn subtract_flag_is_strictly_greater() {
        let mut state = Chip8State::new();

        *state.register_mut(0) = 5;
        *state.register_mut(1) = 5;
        run_op(&mut state, 0x8015);
        assert_eq!(state.register(0), 0);
        assert_eq!(state.flag_register, 0);

        *state.register_mut(0) = 6;
        run_op(&mut state, 0x8015);
        assert_eq!(state.register(0), 1);
        assert_eq!(state.flag_register, 1);

        *state.register_mut(0) = 1;
        *state.register_mut(1) = 3;
        run_op(&mut state, 0x8015);
        assert_eq!(state.register(0), 0xFE);
        assert_eq!(state.flag_register, 0);
    }

    #[test]
    fn reverse_subtract() {
        let mut state = Chip8State::new();

        *state.register_mut(0) = 3;
        *state.register_mut(1) = 10;
        run_op(&mut state, 0x8017);
        assert_eq!(state.register(0), 7);
        assert_eq!(state.flag_register, 1);

        *state.register_mut(0) = 10;
        *state.register_mut(1) = 10;
        run_op(&mut state, 0x8017);
        assert_eq!(state.register(0), 0);
        assert_eq!(state.flag_register, 0);
    }

    #[test]
    fn shifts() {
        let mut state = Chip8State::new();

        *state.register_mut(4) = 0b1000_0011;
        run_op(&mut state, 0x8406);
        assert_eq!(state.register(4), 0b0100_0001);
        assert_eq!(state.flag_register, 1);

        run_op(&mut state, 0x840E);
        assert_eq!(state.register(4), 0b1000_0010);
        assert_eq!(state.flag_register, 0);

        run_op(&mut state, 0x840E);
        assert_eq!(state.register(4), 0b0000_0100);
        assert_eq!(state.flag_register, 1);
    }

    #[test]
    fn arithmetic_leaves_vf_alone() {
        let mut state = Chip8State::new();
        *state.register_mut(0xF) = 0x77;
        *state.register_mut(0) = 0xFF;
        *state.register_mut(1) = 0x01;
        run_op(&mut state, 0x8014);
        assert_eq!(state.flag_register, 1);
        assert_eq!(state.register(0xF), 0x77);
    }

    #[test]
    fn index_register_ops() {
        let mut state = Chip8State::new();
        run_op(&mut state, 0xAFFF);
        assert_eq!(state.index_register, 0x7FF);

        *state.register_mut(5) = 0x10;
        run_op(&mut state, 0xF51E);
        assert_eq!(state.index_register, 0x80F);
        assert_eq!(state.flag_register, 0);
    }

    #[test]
    fn jump_with_offset_truncates_to_a_byte() {
        let mut state = Chip8State::new();
        *state.register_mut(0) = 0xF0;
        assert_eq!(run_op(&mut state, 0xB220), PcUpdate::Hold);
        assert_eq!(state.program_counter, 0x10);
    }

    #[test]
    fn random_byte() {
        let mut state = state_with(&[0xC3, 0x00]);
        state.cycle_with_rng(&mut StdRng::seed_from_u64(1)).unwrap();
        let expected = {
            let mut byte = [0u8];
            StdRng::seed_from_u64(1).fill_bytes(&mut byte);
            byte[0]
        };
        assert_eq!(state.register(3), expected);
        assert_eq!(state.program_counter, 0x202);
    }

    #[test]
    fn random_source_failure() {
        let mut state = state_with(&[0xC3, 0xFF]);
        let err = state.cycle_with_rng(&mut BrokenRng).unwrap_err();
        assert!(matches!(err, Chip8Error::RandomSourceFailure(_)));
    }

    #[test]
    fn draw_twice_collides_and_clears() {
        let mut state = Chip8State::new();
        state.redraw_pending = false;
        *state.register_mut(0) = 10;
        *state.register_mut(1) = 4;
        run_op(&mut state, 0xF029); // glyph of register index 0
        assert_eq!(state.index_register, 0);

        run_op(&mut state, 0xD015);
        assert!(state.redraw_pending);
        assert_eq!(state.flag_register, 0);
        for (row, bits) in font::glyph(0).iter().enumerate() {
            for col in 0..8 {
                assert_eq!(state.display[4 + row][10 + col], bits & (0x80 >> col) != 0);
            }
        }

        run_op(&mut state, 0xD015);
        assert_eq!(state.flag_register, 1);
        assert!(state.display.iter().flatten().all(|&pixel| !pixel));
    }

    #[test]
    fn draw_wraps_around_edges() {
        let mut state = Chip8State::new();
        state.write_byte(0x300, 0xFF);
        state.write_byte(0x301, 0xFF);
        *state.register_mut(0) = 60 + 64;
        *state.register_mut(1) = 31;
        run_op(&mut state, 0xA300);
        run_op(&mut state, 0xD012);

        assert!(state.display[31][60..64].iter().all(|&pixel| pixel));
        assert!(state.display[31][0..4].iter().all(|&pixel| pixel));
        assert!(state.display[0][60..64].iter().all(|&pixel| pixel));
        assert!(state.display[0][0..4].iter().all(|&pixel| pixel));
        assert!(!state.display[0][4]);
        assert!(!state.display[1][0]);
    }

    #[test]
    fn draw_keeps_previous_collision_flag() {
        let mut state = Chip8State::new();
        state.flag_register = 1;
        run_op(&mut state, 0xD015);
        assert_eq!(state.flag_register, 1);
    }

    #[test]
    fn clear_screen() {
        let mut state = Chip8State::new();
        state.display[3][3] = true;
        state.redraw_pending = false;
        run_op(&mut state, 0x00E0);
        assert!(!state.display[3][3]);
        assert!(state.redraw_pending);
    }

    #[test]
    fn key_skips() {
        let mut state = Chip8State::new();
        *state.register_mut(2) = 0xA;
        assert_eq!(run_op(&mut state, 0xE29E), PcUpdate::Advance);
        assert_eq!(run_op(&mut state, 0xE2A1), PcUpdate::Skip);

        state.keys[0xA] = true;
        assert_eq!(run_op(&mut state, 0xE29E), PcUpdate::Skip);
        assert_eq!(run_op(&mut state, 0xE2A1), PcUpdate::Advance);
    }

    #[test]
    fn key_wait_holds_until_pressed() {
        let mut state = state_with(&[0xF5, 0x0A]);
        for _ in 0..5 {
            assert_eq!(step(&mut state), PcUpdate::Hold);
            assert_eq!(state.program_counter, 0x200);
        }

        state.keys[0x2] = true;
        state.keys[0x9] = true;
        assert_eq!(step(&mut state), PcUpdate::Advance);
        assert_eq!(state.program_counter, 0x202);
        assert_eq!(state.register(5), 0x9);
    }

    #[test]
    fn timers_decay_once_per_cycle() {
        let mut state = state_with(&[0x12, 0x00]);
        state.delay_timer = 3;
        state.sound_timer = 1;

        step(&mut state);
        assert_eq!((state.delay_timer, state.sound_timer), (2, 0));
        step(&mut state);
        assert_eq!((state.delay_timer, state.sound_timer), (1, 0));
        step(&mut state);
        step(&mut state);
        step(&mut state);
        assert_eq!((state.delay_timer, state.sound_timer), (0, 0));
    }

    #[test]
    fn timer_registers() {
        let mut state = Chip8State::new();
        *state.register_mut(1) = 10;
        run_op(&mut state, 0xF115);
        assert_eq!(state.delay_timer, 10);
        run_op(&mut state, 0xF118);
        assert_eq!((state.delay_timer, state.sound_timer), (9, 10));

        // the read happens after this cycle's decrement
        run_op(&mut state, 0xF207);
        assert_eq!(state.register(2), 8);
    }

    #[test]
    fn bcd() {
        let mut state = Chip8State::new();
        *state.register_mut(7) = 254;
        run_op(&mut state, 0xA400);
        run_op(&mut state, 0xF733);
        assert_eq!(&state.ram[0x400..0x403], &[2, 5, 4]);
    }

    #[test]
    fn store_excludes_vx() {
        let mut state = Chip8State::new();
        state.data_registers = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        run_op(&mut state, 0xA400);
        run_op(&mut state, 0xF355);
        assert_eq!(&state.ram[0x400..0x404], &[1, 2, 3, 0]);
        assert_eq!(state.index_register, 0x400);
    }

    #[test]
    fn load_includes_vx() {
        let mut state = Chip8State::new();
        state.ram[0x400..0x405].copy_from_slice(&[9, 8, 7, 6, 5]);
        run_op(&mut state, 0xA400);
        run_op(&mut state, 0xF365);
        assert_eq!(&state.data_registers[..5], &[9, 8, 7, 6, 0]);
        assert_eq!(state.index_register, 0x400);
    }

    #[test]
    fn font_address_uses_register_index() {
        let mut state = Chip8State::new();
        *state.register_mut(0xB) = 0x2;
        run_op(&mut state, 0xFB29);
        assert_eq!(state.index_register, 0xB * 5);
        assert_eq!(
            &state.ram[state.index_register as usize..][..5],
            font::glyph(0xB)
        );
    }

    #[test]
    fn fetch_wraps_at_end_of_ram() {
        let mut state = Chip8State::new();
        state.program_counter = 0xFFF;
        state.ram[0xFFF] = 0x60;
        state.ram[0x000] = 0x0A;
        step(&mut state);
        assert_eq!(state.register(0), 0x0A);
        assert_eq!(state.program_counter, 0x1001);
    }

    #[test]
    fn timer_ticks_immediately_then_waits() {
        let mut timer = Timer::new(Duration::from_secs(3600));
        assert!(timer.tick());
        assert!(!timer.tick());
    }

    #[test]
    fn timer_ticks_once_after_idle_stretch() {
        let mut timer = Timer::new(Duration::from_millis(100));
        assert!(timer.tick());

        std::thread::sleep(Duration::from_millis(350));

        let start = Instant::now();
        let mut ticks = 0;
        while start.elapsed() < Duration::from_millis(20) {
            if timer.tick() {
                ticks += 1;
            }
        }
        assert_eq!(ticks, 1);
    }
}
