//! Address-space layout and the access checks built on it

use std::fmt;
use std::ops::Range;

use super::AccessType;
use crate::error::MemoryError;
use crate::error::MemoryErrorKind;

pub const TEXT_START: u64 = 0x40_0000;
pub const DATA_START: u64 = 0x80_0000;
pub const HEAP_START: u64 = 0x1000_0000;
pub const STACK_START: u64 = 0x4_0000_0000;
pub const STACK_TOP: u64 = 0x8_0000_0000;

/// Memory-mapped range that skips segment and alignment checks
pub const SPECIAL_START: u64 = 0x1_0000_0000_0000;
pub const SPECIAL_SIZE: u64 = 0x1000;

const INSN_ALIGN: u64 = 4;
const WORD_ALIGN: u64 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

impl Permissions {
    pub const RX: Self = Self { read: true, write: false, exec: true };
    pub const RW: Self = Self { read: true, write: true, exec: false };

    pub fn allows(&self, access_type: AccessType) -> bool {
        match access_type {
            AccessType::Read => self.read,
            AccessType::Write => self.write,
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.read, 'r'),
            flag(self.write, 'w'),
            flag(self.exec, 'x')
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Text,
    Data,
    Heap,
    Stack,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub range: Range<u64>,
    pub perms: Permissions,
}

/// The four segments a program runs with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentMap {
    segments: Vec<Segment>,
    special: Range<u64>,
}

impl Default for SegmentMap {
    fn default() -> Self {
        use SegmentKind::*;
        let segment = |kind, start, end, perms| Segment {
            kind,
            range: start..end,
            perms,
        };
        Self {
            segments: vec![
                segment(Text, TEXT_START, DATA_START, Permissions::RX),
                segment(Data, DATA_START, HEAP_START, Permissions::RW),
                segment(Heap, HEAP_START, STACK_START, Permissions::RW),
                segment(Stack, STACK_START, STACK_TOP, Permissions::RW),
            ],
            special: SPECIAL_START..SPECIAL_START + SPECIAL_SIZE,
        }
    }
}

impl SegmentMap {
    /// Replaces the bounds and protections of one segment
    pub fn set(&mut self, kind: SegmentKind, range: Range<u64>, perms: Permissions) {
        match self.segments.iter_mut().find(|s| s.kind == kind) {
            Some(segment) => {
                segment.range = range;
                segment.perms = perms;
            }
            None => self.segments.push(Segment { kind, range, perms }),
        }
    }

    pub fn get(&self, kind: SegmentKind) -> Option<&Segment> {
        self.segments.iter().find(|s| s.kind == kind)
    }

    /// The segment containing `address`, if any
    pub fn find(&self, address: u64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.range.contains(&address))
    }

    pub fn is_special(&self, address: u64) -> bool {
        self.special.contains(&address)
    }

    /// One past the highest stack address
    pub fn stack_top(&self) -> u64 {
        self.get(SegmentKind::Stack).map_or(STACK_TOP, |s| s.range.end)
    }

    /// Instruction fetch: executable segment, 4-byte aligned
    pub fn check_imem(&self, address: u64) -> Result<(), MemoryError> {
        if address % INSN_ALIGN != 0 {
            return Err(MemoryError::AlignmentError(address, INSN_ALIGN));
        }
        match self.find(address) {
            Some(segment) if segment.perms.exec => Ok(()),
            _ => Err(MemoryError::AccessError {
                address,
                kind: MemoryErrorKind::NotExecutable,
            }),
        }
    }

    /// Data access: readable or writable segment, 8-byte aligned,
    /// unless the address is in the special range
    pub fn check_dmem(
        &self,
        address: u64,
        access_type: AccessType,
    ) -> Result<(), MemoryError> {
        if self.is_special(address) {
            return Ok(());
        }
        if address % WORD_ALIGN != 0 {
            return Err(MemoryError::AlignmentError(address, WORD_ALIGN));
        }
        match self.find(address) {
            Some(segment) if segment.perms.allows(access_type) => Ok(()),
            _ => Err(MemoryError::AccessError {
                address,
                kind: match access_type {
                    AccessType::Read => MemoryErrorKind::NotReadable,
                    AccessType::Write => MemoryErrorKind::NotWritable,
                },
            }),
        }
    }
}
