//! Memory analysis and relocation core for PSID/RSID music files: a
//! cycle-accurate 6510 emulator, the driver protocol that runs a tune's
//! init/play routines, the analyzer that classifies the resulting memory
//! image, and the emitter that turns that classification into relocatable
//! assembly.

pub mod analyzer;
pub mod config;
pub mod cpu;
pub mod driver;
pub mod emit;
pub mod error;
pub mod memory;
pub mod relocate;
pub mod trace;

pub use config::EmulationConfig;
pub use error::{CoreError, Region};

use cpu::Cpu;
use driver::{EmulationDriver, EmulationReport, EntryPoints};
use trace::TraceSink;

/// A program image as extracted from a PSID/RSID container by the
/// collaborator that parses those headers (§6): a load address and the
/// bytes that go there. Construction is the only point that validates the
/// image actually fits in the 64 KiB address space.
#[derive(Debug, Clone)]
pub struct ProgramImage {
    pub load: u16,
    pub bytes: Vec<u8>,
}

impl ProgramImage {
    /// Rejects images bigger than the entire address space outright; a
    /// smaller-than-64KiB image that runs past `$FFFF` from its load
    /// address is still accepted and wraps per §6.
    pub fn new(load: u16, bytes: Vec<u8>) -> Result<ProgramImage, CoreError> {
        if bytes.len() > 0x10000 {
            return Err(CoreError::ImageTooLarge { base: load, size: bytes.len() });
        }
        Ok(ProgramImage { load, bytes })
    }

    /// Places the image's bytes into `mem` at `self.load`, bypassing access
    /// tracking (§4.A's `poke` path), wrapping at the 64 KiB boundary if
    /// the image runs past `$FFFF`.
    pub fn place_into(&self, mem: &mut memory::Memory) {
        mem.poke_slice(self.load, &self.bytes);
    }
}

/// Output of a complete run: driver cycle stats plus the emitted assembly.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: EmulationReport,
    pub emit: emit::EmitResult,
}

/// Runs the whole pipeline described in §2's data-flow diagram: load the
/// image, drive init/play through the CPU core, classify the resulting
/// memory image, and emit relocatable assembly. Returns `Ok(None)` when the
/// emulation itself did not complete (init or play never reached a
/// matching `RTS` within budget) — that is not an error in the `CoreError`
/// sense, just an unusable run, matching the subroutine-run contract's own
/// boolean-not-`Result` shape (§7, §10.B).
pub fn run_pipeline(
    image: &ProgramImage,
    entry: EntryPoints,
    speed_word: u16,
    config: &EmulationConfig,
    trace: Option<&mut dyn TraceSink>,
) -> Result<Option<PipelineOutput>, CoreError> {
    config.validate()?;
    config.validate_relocation(image.bytes.len())?;

    let mut cpu = Cpu::new();
    image.place_into(&mut cpu.mem);

    let report = match EmulationDriver::run(&mut cpu, entry, speed_word, config, trace) {
        Some(report) => report,
        None => return Ok(None),
    };

    let analyzer = analyzer::MemoryAnalyzer::analyze(&cpu.mem, image.load, image.bytes.len());
    let mut emitted = emit::emit(&cpu.mem, &analyzer, image.load, image.bytes.len());

    // The new load address, if relocating, otherwise the image's own —
    // everything past this point in the assembly is purely label-based, so
    // relocation is just a different `.org` over the same text (§4.E).
    let org_base = config.relocate_base.unwrap_or(image.load);
    emitted.assembly = format!("    .org ${:04X}\n{}", org_base, emitted.assembly);

    Ok(Some(PipelineOutput { report, emit: emitted }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn oversized_image_is_rejected_at_construction() {
        let err = ProgramImage::new(0x1000, vec![0u8; 0x10001]).unwrap_err();
        assert_eq!(err, CoreError::ImageTooLarge { base: 0x1000, size: 0x10001 });
    }

    #[test]
    fn pipeline_runs_end_to_end_and_emits_org_directive() {
        let image = ProgramImage::new(0x1000, vec![0xA9, 0x42, 0x8D, 0x00, 0xD4, 0x60]).unwrap();
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1000 };
        let config = EmulationConfig { frames: 5, calls_per_frame: Some(1), ..EmulationConfig::default() };
        let output = run_pipeline(&image, entry, 0, &config, None).unwrap().unwrap();
        assert!(output.emit.assembly.starts_with("    .org $1000\n"));
        assert!(output.emit.assembly.contains("rts"));
        assert_eq!(output.report.frames_executed, 5);
    }

    #[test]
    fn pipeline_relocates_to_an_alternate_org() {
        let image = ProgramImage::new(0x1000, vec![0x60]).unwrap();
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1000 };
        let config = EmulationConfig {
            frames: 1,
            calls_per_frame: Some(1),
            relocate_base: Some(0x2000),
            ..EmulationConfig::default()
        };
        let output = run_pipeline(&image, entry, 0, &config, None).unwrap().unwrap();
        assert!(output.emit.assembly.starts_with("    .org $2000\n"));
    }

    #[test]
    fn pipeline_rejects_relocation_that_would_wrap() {
        let image = ProgramImage::new(0x1000, vec![0u8; 0x200]).unwrap();
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1000 };
        let config = EmulationConfig { relocate_base: Some(0xFF00), ..EmulationConfig::default() };
        let err = run_pipeline(&image, entry, 0, &config, None).unwrap_err();
        assert_eq!(err, CoreError::BaseSizeOverflow { base: 0xFF00, size: 0x200 });
    }

    #[test]
    fn pipeline_reports_no_output_when_init_never_returns() {
        let image = ProgramImage::new(0x1000, vec![0x4C, 0x00, 0x10]).unwrap(); // JMP $1000
        let entry = EntryPoints { load: 0x1000, init: 0x1000, play: 0x1000 };
        let config = EmulationConfig { frames: 1, calls_per_frame: Some(1), ..EmulationConfig::default() };
        assert!(run_pipeline(&image, entry, 0, &config, None).unwrap().is_none());
    }
}
