//! Utility functions for preparing memory for execution

use log::debug;
use log::info;
use object::elf;
use object::read::elf::ProgramHeader;

use crate::elf_helper::*;
use crate::error::ElfError;
use crate::error::SimulatorResult;
use crate::memory::mmu::MMU;
use crate::memory::segment::Permissions;
use crate::memory::segment::SegmentKind;
use crate::memory::segment::SegmentMap;
use crate::memory::segment::HEAP_START;

/// Protections encoded in a program header's `p_flags`
pub fn get_permissions(flags: u32) -> Permissions {
    Permissions {
        read: flags & elf::PF_R != 0,
        write: flags & elf::PF_W != 0,
        exec: flags & elf::PF_X != 0,
    }
}

/// Loads an ELF file into memory, narrows the text and data segments
/// to what the file describes and returns the entry point
pub fn load_elf(
    mem: &mut MMU,
    segments: &mut SegmentMap,
    elf_reader: &ELFReaderType,
    elf_data: &[u8],
) -> SimulatorResult<u64> {
    let endian = get_elf_endian(elf_reader)?;
    let entry = get_elf_entry(elf_reader)?;
    info!("Initial PC: {entry:#x}");

    for segment in get_elf_segments(elf_reader, elf_data)? {
        if segment.p_type(endian) != elf::PT_LOAD {
            continue;
        }

        let virtual_address = segment.p_vaddr(endian);
        let memory_size = segment.p_memsz(endian);
        let file_size = segment.p_filesz(endian);
        let file_offset = segment.p_offset(endian);
        let perms = get_permissions(segment.p_flags(endian));

        let end = virtual_address
            .checked_add(memory_size)
            .ok_or(ElfError::AddressOutOfBounds(virtual_address))?;
        if file_size > memory_size {
            return Err(ElfError::InvalidFormat(format!(
                "segment at {virtual_address:#x} has file size {file_size:#x} \
                 larger than memory size {memory_size:#x}"
            ))
            .into());
        }
        let bytes = usize::try_from(file_offset)
            .ok()
            .zip(usize::try_from(file_size).ok())
            .and_then(|(start, len)| elf_data.get(start..start.checked_add(len)?))
            .ok_or_else(|| {
                ElfError::InvalidFormat(format!(
                    "segment at {virtual_address:#x} lies outside the file"
                ))
            })?;

        debug!(
            "loading segment {virtual_address:#x}..{end:#x} ({perms}), \
             {file_size:#x} bytes from file"
        );

        mem.write_block(virtual_address, bytes);
        for address in virtual_address + file_size..end {
            mem.set8(address, 0);
        }

        if perms.exec {
            segments.set(SegmentKind::Text, virtual_address..end, perms);
        } else if perms.write {
            // Data runs up to the heap unless the file says otherwise
            segments.set(
                SegmentKind::Data,
                virtual_address..end.max(HEAP_START),
                perms,
            );
        }
    }

    Ok(entry)
}
