mod common;

use std::io::Write;
use std::path::PathBuf;

use common::*;
use sim_lib::checkpoint;
use sim_lib::cpu::CPUPolicy;
use sim_lib::cpu::Implementation;
use sim_lib::cpu::Status;
use sim_lib::error::ElfError;
use sim_lib::error::SimulatorError;
use sim_lib::memory::segment::SegmentKind;
use sim_lib::memory::segment::DATA_START;
use sim_lib::memory::segment::HEAP_START;
use sim_lib::memory::segment::TEXT_START;
use sim_lib::run_wrapper;
use tempfile::NamedTempFile;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const EM_AARCH64: u16 = 183;

struct LoadSegment {
    vaddr: u64,
    flags: u32,
    bytes: Vec<u8>,
    memsz: u64,
}

/// Lays out a little-endian ELF64 executable with one PT_LOAD per segment
fn build_elf(machine: u16, entry_index: usize, segments: &[LoadSegment]) -> Vec<u8> {
    let headers = EHDR_SIZE + PHDR_SIZE * segments.len();
    let mut offsets = Vec::new();
    let mut offset = headers;
    for segment in segments {
        offsets.push(offset);
        offset += segment.bytes.len();
    }

    let mut elf = Vec::new();
    elf.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]);
    elf.extend_from_slice(&[0; 8]);
    elf.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    elf.extend_from_slice(&machine.to_le_bytes());
    elf.extend_from_slice(&1u32.to_le_bytes());
    let entry = segments[entry_index].vaddr;
    elf.extend_from_slice(&entry.to_le_bytes());
    elf.extend_from_slice(&(EHDR_SIZE as u64).to_le_bytes()); // e_phoff
    elf.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    elf.extend_from_slice(&0u32.to_le_bytes());
    elf.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    elf.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    elf.extend_from_slice(&(segments.len() as u16).to_le_bytes());
    elf.extend_from_slice(&64u16.to_le_bytes());
    elf.extend_from_slice(&0u16.to_le_bytes());
    elf.extend_from_slice(&0u16.to_le_bytes());
    assert_eq!(elf.len(), EHDR_SIZE);

    for (segment, offset) in segments.iter().zip(&offsets) {
        elf.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        elf.extend_from_slice(&segment.flags.to_le_bytes());
        elf.extend_from_slice(&(*offset as u64).to_le_bytes());
        elf.extend_from_slice(&segment.vaddr.to_le_bytes());
        elf.extend_from_slice(&segment.vaddr.to_le_bytes());
        elf.extend_from_slice(&(segment.bytes.len() as u64).to_le_bytes());
        elf.extend_from_slice(&segment.memsz.to_le_bytes());
        elf.extend_from_slice(&0x1000u64.to_le_bytes());
    }
    assert_eq!(elf.len(), headers);

    for segment in segments {
        elf.extend_from_slice(&segment.bytes);
    }
    elf
}

fn text(program: &[u32]) -> LoadSegment {
    let bytes: Vec<u8> = program.iter().flat_map(|i| i.to_le_bytes()).collect();
    LoadSegment { vaddr: TEXT_START, flags: 0b101, memsz: bytes.len() as u64, bytes }
}

fn data(words: &[u64], memsz: u64) -> LoadSegment {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    LoadSegment { vaddr: DATA_START, flags: 0b110, memsz, bytes }
}

fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file
}

fn program() -> Vec<u32> {
    vec![
        movz(2, 0x80, 16),
        ldur(1, 2, 0),
        add_ri(1, 1, 1),
        stur(1, 2, 8),
        HLT,
    ]
}

#[test]
fn test_run_elf() {
    let elf = build_elf(EM_AARCH64, 0, &[text(&program()), data(&[41], 16)]);
    let file = write_temp(&elf);

    for implementation in [Implementation::Serial, Implementation::Parallel] {
        let policy = CPUPolicy { implementation, ..CPUPolicy::default() };
        let sim = run_wrapper::run(file.path(), policy).unwrap();
        assert_eq!(sim.cpu.status, Status::Hlt);
        assert_eq!(sim.cpu.regs.read(1), 42);
        assert_eq!(sim.port.mmu.get64(DATA_START + 8), 42);
    }
}

#[test]
fn test_segments_follow_program_headers() {
    let code = program();
    let elf = build_elf(EM_AARCH64, 0, &[text(&code), data(&[41], 16)]);
    let file = write_temp(&elf);

    let sim = run_wrapper::prepare(file.path(), CPUPolicy::default()).unwrap();
    let text = sim.port.segments.get(SegmentKind::Text).unwrap();
    assert_eq!(text.range, TEXT_START..TEXT_START + 4 * code.len() as u64);
    assert!(text.perms.exec && !text.perms.write);
    let data = sim.port.segments.get(SegmentKind::Data).unwrap();
    assert_eq!(data.range, DATA_START..HEAP_START);
    assert!(data.perms.write && !data.perms.exec);

    assert_eq!(sim.cpu.pc.read(), TEXT_START);
    assert_eq!(sim.port.mmu.get32(TEXT_START), code[0]);
    assert_eq!(sim.port.mmu.get64(DATA_START), 41);
}

#[test]
fn test_store_into_text_after_load_faults() {
    // The text segment is read-only even though the file is writable
    let code = vec![movz(2, 0x40, 16), stur(XZR, 2, 0), HLT];
    let elf = build_elf(EM_AARCH64, 0, &[text(&code)]);
    let file = write_temp(&elf);

    let sim = run_wrapper::run(file.path(), CPUPolicy::default()).unwrap();
    assert_eq!(sim.cpu.status, Status::Adr);
}

#[test]
fn test_checkpoint_file() {
    let elf = build_elf(EM_AARCH64, 0, &[text(&program()), data(&[41], 16)]);
    let file = write_temp(&elf);
    let sim = run_wrapper::run(file.path(), CPUPolicy::default()).unwrap();

    let out = NamedTempFile::new().unwrap();
    checkpoint::save_checkpoint(out.path(), &sim).unwrap();
    let dump = std::fs::read_to_string(out.path()).unwrap();
    assert!(dump.contains("\t\t\tRegister X1: 2a\n"));
    assert!(dump.contains("\t\tStatus: HLT\n"));
    assert!(dump.contains("\t\t\tAddress 0x800008: 0x2a\n"));
}

#[test]
fn test_rejects_other_machines() {
    let elf = build_elf(62, 0, &[text(&program())]);
    let file = write_temp(&elf);
    assert!(matches!(
        run_wrapper::run(file.path(), CPUPolicy::default()),
        Err(SimulatorError::ElfLoadError(ElfError::InvalidMachine(62)))
    ));
}

#[test]
fn test_rejects_bad_files() {
    let missing = PathBuf::from("/nonexistent/program.elf");
    assert!(matches!(
        run_wrapper::run(&missing, CPUPolicy::default()),
        Err(SimulatorError::ElfLoadError(ElfError::FileReadError(..)))
    ));

    let garbage = write_temp(b"not an elf file at all");
    assert!(matches!(
        run_wrapper::run(garbage.path(), CPUPolicy::default()),
        Err(SimulatorError::ElfLoadError(ElfError::ParseError(..)))
    ));
}
