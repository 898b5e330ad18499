use thiserror::Error;

/// Failures that can be reported with a payload, as opposed to the
/// subroutine-run contract's plain `bool` (see [`crate::cpu::Cpu::run_subroutine`]).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A program image larger than the entire 64 KiB address space: even
    /// with the wraparound §6 allows for a normal load, there is nowhere
    /// left to put the remaining bytes.
    #[error("program image of {size} bytes does not fit below $10000 when loaded at ${base:04X}")]
    ImageTooLarge { base: u16, size: usize },

    /// A requested relocation base would make the image wrap around the
    /// 64 KiB boundary. Wrapping is acceptable for the original load (§6)
    /// but would scatter a relocated image across zero page and the stack,
    /// so the emitter's relocation path rejects it outright.
    #[error("base address ${base:04X} plus size {size} overflows the 16-bit address space")]
    BaseSizeOverflow { base: u16, size: usize },

    #[error("frame count must be nonzero")]
    ZeroFrameCount,
}

/// PAL/NTSC timing, used to derive cycles-per-frame when auto-computing
/// calls-per-frame from CIA timer writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Pal,
    Ntsc,
}

impl Region {
    /// Cycles the video chip takes to produce one frame.
    pub fn cycles_per_frame(self) -> u32 {
        match self {
            Region::Pal => 63 * 312,
            Region::Ntsc => 65 * 263,
        }
    }
}
