//! Delta modulation channel

use super::osc::OscState;
use crate::blip::BlipSynth;
use crate::output::OutputBuffers;

/// Callback that fetches one sample byte from CPU address space.
pub type DmcReader = Box<dyn FnMut(u16) -> u8 + Send>;

/// Rate timer periods, NTSC then PAL.
const PERIOD_TABLE: [[i64; 16]; 2] = [
    [428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54],
    [398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50],
];

const LOOP_FLAG: u8 = 0x40;

#[derive(Debug, Clone)]
pub(crate) struct Dmc {
    pub osc: OscState,
    /// Offset from $8000 of the next byte to fetch
    pub address: u16,
    pub period: i64,
    pub buf: u8,
    pub bits_remain: i32,
    pub bits: u8,
    pub buf_full: bool,
    pub silence: bool,
    pub irq_flag: bool,
    pub irq_enabled: bool,
    /// 7-bit output level
    pub dac: i32,
    pub pal: bool,
}

impl Default for Dmc {
    fn default() -> Self {
        Self {
            osc: OscState::default(),
            address: 0,
            period: PERIOD_TABLE[0][0],
            buf: 0,
            bits_remain: 1,
            bits: 0,
            buf_full: false,
            silence: true,
            irq_flag: false,
            irq_enabled: false,
            dac: 0,
            pal: false,
        }
    }
}

impl Dmc {
    pub fn reset(&mut self) {
        let pal = self.pal;
        *self = Self {
            pal,
            period: PERIOD_TABLE[usize::from(pal)][0],
            ..Self::default()
        };
    }

    /// Bytes left in the current sample.
    pub fn remaining(&self) -> u32 {
        self.osc.length_counter
    }

    pub fn write_register(&mut self, reg: usize, data: u8) {
        match reg {
            0 => {
                self.period = PERIOD_TABLE[usize::from(self.pal)][usize::from(data & 15)];
                // IRQ only when looping is off
                self.irq_enabled = data & 0xC0 == 0x80;
                self.irq_flag &= self.irq_enabled;
            }
            1 => self.dac = i32::from(data & 0x7F),
            _ => {}
        }
    }

    fn reload_sample(&mut self) {
        self.address = 0x4000 + u16::from(self.osc.regs[2]) * 0x40;
        self.osc.length_counter = u32::from(self.osc.regs[3]) * 0x10 + 1;
    }

    pub fn start(&mut self, reader: &mut dyn FnMut(u16) -> u8) {
        self.reload_sample();
        self.fill_buffer(reader);
    }

    fn fill_buffer(&mut self, reader: &mut dyn FnMut(u16) -> u8) {
        if self.buf_full || self.osc.length_counter == 0 {
            return;
        }
        self.buf = reader(0x8000 | self.address);
        self.address = (self.address + 1) & 0x7FFF;
        self.buf_full = true;

        self.osc.length_counter -= 1;
        if self.osc.length_counter == 0 {
            if self.osc.regs[0] & LOOP_FLAG != 0 {
                self.reload_sample();
            } else {
                self.irq_flag = self.irq_enabled;
            }
        }
    }

    pub fn run(
        &mut self,
        mut time: i64,
        end_time: i64,
        synth: &BlipSynth,
        out: &mut OutputBuffers,
        reader: &mut dyn FnMut(u16) -> u8,
    ) {
        let delta = self.osc.update_amp(self.dac);
        let mut buf = out.get_mut(self.osc.route);
        match buf.as_deref_mut() {
            None => self.silence = true,
            Some(b) if delta != 0 => synth.offset(time, delta, b),
            Some(_) => {}
        }

        time += self.osc.delay;
        if time < end_time {
            let mut bits_remain = self.bits_remain;
            if self.silence && !self.buf_full {
                let count = (end_time - time + self.period - 1) / self.period;
                bits_remain = ((i64::from(bits_remain) - 1 + 8 - (count % 8)) % 8 + 1) as i32;
                time += count * self.period;
            } else {
                let mut bits = self.bits;
                let mut dac = self.dac;
                loop {
                    if !self.silence {
                        let step = i32::from(bits & 1) * 4 - 2;
                        bits >>= 1;
                        if (0..=0x7F).contains(&(dac + step)) {
                            dac += step;
                            if let Some(b) = buf.as_deref_mut() {
                                synth.offset(time, step, b);
                            }
                        }
                    }

                    time += self.period;

                    bits_remain -= 1;
                    if bits_remain == 0 {
                        bits_remain = 8;
                        if !self.buf_full {
                            self.silence = true;
                        } else {
                            self.silence = buf.is_none();
                            bits = self.buf;
                            self.buf_full = false;
                            self.fill_buffer(reader);
                        }
                    }

                    if time >= end_time {
                        break;
                    }
                }
                self.dac = dac;
                self.osc.last_amp = dac;
                self.bits = bits;
            }
            self.bits_remain = bits_remain;
        }

        self.osc.delay = time - end_time;
    }
}
