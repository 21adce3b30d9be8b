//! Helper functions for parsing ELF files

use std::fs;
use std::path::Path;

use object::elf;
use object::read::elf::FileHeader;

use crate::error::ElfError;

pub type ELFReaderType = elf::FileHeader64<object::Endianness>;
pub type Segment = elf::ProgramHeader64<object::Endianness>;

/// Returns the program entry address
pub fn get_elf_entry(elf_reader: &ELFReaderType) -> Result<u64, ElfError> {
    let endian = get_elf_endian(elf_reader)?;
    Ok(elf_reader.e_entry(endian))
}

/// Returns the pair (ELF reader, binary data)
pub fn parse_elf_file(
    file_path: &Path,
) -> Result<(ELFReaderType, Vec<u8>), ElfError> {
    let data = fs::read(file_path)
        .map_err(|e| ElfError::FileReadError(file_path.into(), e))?;
    let elf = ELFReaderType::parse(&*data)
        .map_err(|e| ElfError::ParseError(file_path.into(), e.to_string()))?;
    let elf = *elf;

    let machine = get_elf_machine(&elf)?;
    if machine != elf::EM_AARCH64 {
        return Err(ElfError::InvalidMachine(machine));
    }
    Ok((elf, data))
}

/// Returns the endianness
pub fn get_elf_endian(
    elf_reader: &ELFReaderType,
) -> Result<object::Endianness, ElfError> {
    elf_reader
        .endian()
        .map_err(|e| ElfError::InvalidFormat(e.to_string()))
}

/// Returns the machine type
pub fn get_elf_machine(elf_reader: &ELFReaderType) -> Result<u16, ElfError> {
    Ok(elf_reader.e_machine(get_elf_endian(elf_reader)?))
}

/// Returns the program headers as an owned vector
pub fn get_elf_segments(
    elf_reader: &ELFReaderType,
    elf_data: &[u8],
) -> Result<Vec<Segment>, ElfError> {
    let endian = get_elf_endian(elf_reader)?;
    let headers = elf_reader
        .program_headers(endian, elf_data)
        .map_err(|e| ElfError::InvalidFormat(e.to_string()))?;
    Ok(headers.to_vec())
}
