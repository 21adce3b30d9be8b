//! Textual dump of the machine state at the end of a run

use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use crate::memory::segment::SegmentKind;
use crate::pipelined::Simulation;

const SEGMENTS: [(SegmentKind, &str); 4] = [
    (SegmentKind::Text, "Text segment"),
    (SegmentKind::Data, "Data segment"),
    (SegmentKind::Heap, "Heap"),
    (SegmentKind::Stack, "Stack"),
];

/// Writes the checkpoint for `sim` to `out`
pub fn write_checkpoint(out: &mut impl Write, sim: &Simulation) -> io::Result<()> {
    let cpu = &sim.cpu;
    writeln!(
        out,
        "Machine state checkpoint after {} cycles:",
        sim.history.cycle_count
    )?;

    writeln!(out, "\tProcessor state:")?;
    writeln!(out, "\t\tProgram Counter: {:x}", cpu.pc.read())?;
    writeln!(out, "\t\tStack Pointer: {:x}", cpu.regs.sp())?;
    writeln!(out, "\t\tCondition Flags: {}", cpu.nzcv)?;
    writeln!(out, "\t\tGeneral Purpose Register File state:")?;
    for (i, value) in cpu.regs.gpr().iter().enumerate() {
        writeln!(out, "\t\t\tRegister X{i}: {value:x}")?;
    }
    writeln!(out, "\t\tStatus: {}", cpu.status)?;

    // Dirty lines are newer than the backing store
    let mmu = sim.port.coherent_mmu();
    let words: Vec<(u64, u64)> = mmu.populated_words().collect();

    writeln!(out, "\tMemory state:")?;
    for (kind, title) in SEGMENTS {
        writeln!(out, "\t\t{title}:")?;
        let mut in_segment: Vec<_> = words
            .iter()
            .filter(|(address, _)| {
                sim.port.segments.find(*address).map(|s| s.kind) == Some(kind)
            })
            .collect();
        // The stack grows down, so it is listed from the top
        if kind == SegmentKind::Stack {
            in_segment.reverse();
        }
        for (address, value) in in_segment {
            writeln!(out, "\t\t\tAddress {address:#x}: {value:#x}")?;
        }
    }

    if let Some(history) = sim.port.cache_history() {
        writeln!(out, "\tCache state:")?;
        writeln!(
            out,
            "\t\tNumber of cache hits, misses: {}, {}",
            history.num_hit, history.num_miss
        )?;
        writeln!(
            out,
            "\t\tNumber of dirty, clean evictions: {}, {}",
            history.num_dirty_evict, history.num_clean_evict
        )?;
    }
    writeln!(out)
}

/// Writes the checkpoint for `sim` to the file at `path`
pub fn save_checkpoint(path: &Path, sim: &Simulation) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_checkpoint(&mut out, sim)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CPUPolicy;
    use crate::memory::cache::CachePolicy;
    use crate::memory::mmu::MMU;
    use crate::memory::segment::SegmentMap;
    use crate::memory::segment::DATA_START;
    use crate::memory::segment::STACK_TOP;
    use crate::memory::segment::TEXT_START;
    use crate::memory::AccessType;
    use crate::memory::DataPort;

    fn render(sim: &Simulation) -> String {
        let mut out = Vec::new();
        write_checkpoint(&mut out, sim).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_power_on_checkpoint() {
        let mut mmu = MMU::make();
        mmu.set64(TEXT_START, 0xD440_0000);
        let port = DataPort::new(mmu, SegmentMap::default(), None);
        let sim = Simulation::make(TEXT_START, port, CPUPolicy::default());
        let text = render(&sim);

        assert!(text.starts_with("Machine state checkpoint after 0 cycles:\n"));
        assert!(text.contains("\t\tProgram Counter: 400000\n"));
        assert!(text.contains("\t\tStack Pointer: 7fffffff8\n"));
        assert!(text.contains("\t\tCondition Flags: [N,Z,C,V] = [0, 1, 0, 0]\n"));
        assert!(text.contains("\t\t\tRegister X0: 0\n"));
        assert!(text.contains("\t\t\tRegister X30: deadbeef0000\n"));
        assert!(text.contains("\t\tStatus: AOK\n"));
        assert!(text.contains("\t\tText segment:\n\t\t\tAddress 0x400000: 0xd4400000\n"));
        assert!(!text.contains("Cache state"));
    }

    #[test]
    fn test_stack_listed_from_top() {
        let mut mmu = MMU::make();
        mmu.set64(STACK_TOP - 8, 1);
        mmu.set64(STACK_TOP - 16, 2);
        mmu.set64(STACK_TOP - 0x2000, 3);
        mmu.set64(DATA_START, 4);
        mmu.set64(DATA_START + 8, 5);
        let port = DataPort::new(mmu, SegmentMap::default(), None);
        let sim = Simulation::make(TEXT_START, port, CPUPolicy::default());

        let text = render(&sim);
        assert!(text.contains(
            "\t\tStack:\n\t\t\tAddress 0x7fffffff8: 0x1\n\t\t\tAddress 0x7fffffff0: 0x2\n\t\t\tAddress 0x7ffffe000: 0x3\n"
        ));
        assert!(text.contains(
            "\t\tData segment:\n\t\t\tAddress 0x800000: 0x4\n\t\t\tAddress 0x800008: 0x5\n"
        ));
    }

    #[test]
    fn test_checkpoint_sees_dirty_lines() {
        let policy = CachePolicy::make(1, 8, 64, 0).unwrap();
        let port = DataPort::new(MMU::make(), SegmentMap::default(), Some(policy));
        let mut sim = Simulation::make(TEXT_START, port, CPUPolicy::default());
        sim.port.access(DATA_START, AccessType::Write, 5).unwrap();
        assert_eq!(sim.port.mmu.get64(DATA_START), 0);

        let text = render(&sim);
        assert!(text.contains("\t\tData segment:\n\t\t\tAddress 0x800000: 0x5\n"));
        assert!(text.contains("\t\tNumber of cache hits, misses: 0, 1\n"));
        assert!(text.contains("\t\tNumber of dirty, clean evictions: 0, 0\n"));
    }
}
