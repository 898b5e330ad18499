//! Runs init/play through the CPU core for a fixed number of frames,
//! tracking cycle statistics and deriving calls-per-frame from CIA timer
//! writes (§4.C).

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::{EmulationConfig, PRE_ANALYSIS_FRAMES};
use crate::cpu::Cpu;
use crate::trace::{TraceEvent, TraceSink};

const MIN_CALLS_PER_FRAME: u32 = 1;
const MAX_CALLS_PER_FRAME: u32 = 16;

/// Entry points the driver needs to run a tune.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub load: u16,
    pub init: u16,
    pub play: u16,
}

/// Per-frame cycle statistics gathered during the measured pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub min: u64,
    pub max: u64,
    pub mean: u64,
}

/// Result of a completed emulation run.
#[derive(Debug, Clone, Copy)]
pub struct EmulationReport {
    pub calls_per_frame: u32,
    pub cycle_stats: CycleStats,
    pub frames_executed: u32,
}

/// Observes CIA timer-latch writes to derive calls-per-frame when the
/// caller didn't pin one down explicitly.
#[derive(Default)]
struct CiaTimerObserver {
    dc04: Option<u8>,
    dc05: Option<u8>,
}

impl CiaTimerObserver {
    fn record(&mut self, addr: u16, value: u8) {
        match addr {
            0xDC04 => self.dc04 = Some(value),
            0xDC05 => self.dc05 = Some(value),
            _ => {}
        }
    }

    fn timer_value(&self) -> Option<u16> {
        match (self.dc04, self.dc05) {
            (None, None) => None,
            (lo, hi) => Some(u16::from_le_bytes([lo.unwrap_or(0), hi.unwrap_or(0)])),
        }
    }
}

/// Runs the fixed init/play protocol and reports cycle statistics. Driving
/// the CPU is the only job here: memory analysis happens afterwards, over
/// whatever access map and byte store this leaves behind.
pub struct EmulationDriver;

impl EmulationDriver {
    /// Derives calls-per-frame from the CIA timer writes observed during
    /// `init`, falling back to the speed word's set-bit count (§4.C).
    fn derive_calls_per_frame(timer: Option<u16>, speed_word: u16, config: &EmulationConfig) -> u32 {
        if let Some(override_k) = config.calls_per_frame {
            return override_k.clamp(MIN_CALLS_PER_FRAME, MAX_CALLS_PER_FRAME);
        }
        match timer {
            Some(0) | None => {
                let bits = speed_word.count_ones().max(1);
                bits.clamp(MIN_CALLS_PER_FRAME, MAX_CALLS_PER_FRAME)
            }
            Some(timer) => {
                let cycles_per_frame = config.region.cycles_per_frame();
                let k = (cycles_per_frame as f64 / timer as f64).round() as u32;
                k.clamp(MIN_CALLS_PER_FRAME, MAX_CALLS_PER_FRAME)
            }
        }
    }

    /// Runs the protocol against `cpu`, which must already have the program
    /// image loaded at its load address via
    /// [`crate::memory::Memory::poke_slice`].
    ///
    /// `speed_word` is the song's speed flag word, used only as a
    /// calls-per-frame fallback when no CIA timer write is observed. When
    /// `trace` is given, every SID/CIA write and frame-end marker observed
    /// over the whole run (pre-analysis and measured passes alike) is
    /// handed to it in order once the run completes.
    pub fn run(
        cpu: &mut Cpu,
        entry: EntryPoints,
        speed_word: u16,
        config: &EmulationConfig,
        trace: Option<&mut dyn TraceSink>,
    ) -> Option<EmulationReport> {
        log::debug!(
            "emulation driver: init=${:04X} play=${:04X} frames={}",
            entry.init,
            entry.play,
            config.frames
        );

        // Relocation is purely an emitter-stage concern; the driver itself
        // always runs at the image's original load address.
        cpu.mem.snapshot();

        let timer = Rc::new(RefCell::new(CiaTimerObserver::default()));
        let events: Rc<RefCell<Vec<TraceEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let tracing = trace.is_some();

        {
            let timer = timer.clone();
            let events = events.clone();
            cpu.callbacks.on_cia_write = Some(Box::new(move |addr, value| {
                timer.borrow_mut().record(addr, value);
                events.borrow_mut().push(TraceEvent::Cia(addr, value));
            }));
        }
        if tracing {
            let events = events.clone();
            cpu.callbacks.on_sid_write = Some(Box::new(move |addr, value| {
                events.borrow_mut().push(TraceEvent::Sid(addr, value));
            }));
        }

        let flush = |events: &Rc<RefCell<Vec<TraceEvent>>>, trace: Option<&mut dyn TraceSink>| {
            if let Some(sink) = trace {
                for event in events.borrow().iter() {
                    sink.record(*event);
                }
            }
        };

        macro_rules! fail {
            ($trace:expr) => {{
                cpu.callbacks.on_cia_write = None;
                cpu.callbacks.on_sid_write = None;
                cpu.mem.restore();
                flush(&events, $trace);
                return None;
            }};
        }

        cpu.reset_registers_and_flags();
        if !cpu.run_subroutine(entry.init) {
            fail!(trace);
        }

        let calls_per_frame = {
            let observed = timer.borrow().timer_value();
            Self::derive_calls_per_frame(observed, speed_word, config)
        };

        let mut trace = trace;
        let mut frame_number = 0u32;

        // Pre-analysis pass: exposes memory copies that only happen on the
        // first few play calls, not during init itself. Each frame is
        // followed by a trace frame marker.
        for _ in 0..PRE_ANALYSIS_FRAMES {
            for _ in 0..calls_per_frame {
                cpu.reset_registers_and_flags();
                if !cpu.run_subroutine(entry.play) {
                    fail!(trace.take());
                }
            }
            if tracing {
                events.borrow_mut().push(TraceEvent::FrameEnd(frame_number));
            }
            frame_number += 1;
        }

        // Re-seed: init runs once more so the measured pass starts from a
        // clean player state rather than wherever the pre-analysis pass
        // left the tune.
        cpu.reset_registers_and_flags();
        if !cpu.run_subroutine(entry.init) {
            fail!(trace.take());
        }

        let mut min = u64::MAX;
        let mut max = 0u64;
        let mut total = 0u64;
        let mut frames_executed = 0u32;
        let mut last_cycles = cpu.cycles;

        for _ in 0..config.frames {
            for _ in 0..calls_per_frame {
                cpu.reset_registers_and_flags();
                if !cpu.run_subroutine(entry.play) {
                    fail!(trace.take());
                }
            }
            if tracing {
                events.borrow_mut().push(TraceEvent::FrameEnd(frame_number));
            }
            frame_number += 1;
            let current = cpu.cycles;
            let frame_cycles = current - last_cycles;
            last_cycles = current;
            min = min.min(frame_cycles);
            max = max.max(frame_cycles);
            total += frame_cycles;
            frames_executed += 1;
        }

        let mean = if frames_executed > 0 { total / frames_executed as u64 } else { 0 };
        if min == u64::MAX {
            min = 0;
        }

        log::debug!(
            "emulation driver: complete, mean cycles/frame={} max={}",
            mean,
            max
        );

        cpu.callbacks.on_cia_write = None;
        cpu.callbacks.on_sid_write = None;
        cpu.mem.restore();
        flush(&events, trace.take());

        Some(EmulationReport {
            calls_per_frame,
            cycle_stats: CycleStats { min, max, mean },
            frames_executed,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Region;

    fn config(frames: u32) -> EmulationConfig {
        EmulationConfig { frames, calls_per_frame: Some(1), region: Region::Pal, relocate_base: None }
    }

    #[test]
    fn bare_init_and_play_rts_complete_all_frames() {
        let mut cpu = Cpu::new();
        cpu.mem.poke_slice(0x1000, &[0x60]); // init: RTS
        cpu.mem.poke_slice(0x1003, &[0x60]); // play: RTS
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1003 };
        let report = EmulationDriver::run(&mut cpu, entry, 0, &config(10), None).unwrap();
        assert_eq!(report.frames_executed, 10);
        assert_eq!(report.calls_per_frame, 1);
    }

    #[test]
    fn calls_per_frame_falls_back_to_speed_word_bit_count() {
        let mut cpu = Cpu::new();
        cpu.mem.poke_slice(0x1000, &[0x60]);
        cpu.mem.poke_slice(0x1003, &[0x60]);
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1003 };
        let mut cfg = config(1);
        cfg.calls_per_frame = None;
        let report = EmulationDriver::run(&mut cpu, entry, 0b0000_0111, &cfg, None).unwrap();
        assert_eq!(report.calls_per_frame, 3);
    }

    #[test]
    fn init_failure_yields_no_report() {
        let mut cpu = Cpu::new();
        // init loops forever: no RTS ever reached.
        cpu.mem.poke_slice(0x1000, &[0x4C, 0x00, 0x10]);
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1000 };
        let report = EmulationDriver::run(&mut cpu, entry, 0, &config(1), None);
        assert!(report.is_none());
    }

    #[test]
    fn memory_is_restored_after_a_run() {
        let mut cpu = Cpu::new();
        cpu.mem.poke(0x4000, 0xAA);
        // init stores a different value then returns; play just returns.
        cpu.mem.poke_slice(0x1000, &[0xA9, 0xBB, 0x8D, 0x00, 0x40, 0x60]);
        cpu.mem.poke_slice(0x1010, &[0x60]);
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1010 };
        EmulationDriver::run(&mut cpu, entry, 0, &config(5), None).unwrap();
        assert_eq!(cpu.mem.peek(0x4000), 0xAA);
    }

    #[test]
    fn trace_sink_receives_sid_writes_and_frame_markers() {
        use crate::trace::{TextTraceSink, TraceSink};

        let mut cpu = Cpu::new();
        cpu.mem.poke_slice(0x1000, &[0x60]); // init: RTS
        cpu.mem.poke_slice(0x1003, &[0xA9, 0x42, 0x8D, 0x00, 0xD4, 0x60]); // play: LDA #$42; STA $D400; RTS
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1003 };
        let mut buf = Vec::new();
        let mut sink = TextTraceSink::new(&mut buf);
        let trace: &mut dyn TraceSink = &mut sink;
        EmulationDriver::run(&mut cpu, entry, 0, &config(2), Some(trace)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("sid D400 42"));
        assert!(text.contains("frame "));
    }
}
