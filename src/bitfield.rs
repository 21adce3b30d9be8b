//! Bitfield extraction helpers
//!
//! Every field of an instruction encoding is pulled out through these
//! functions, so the stage logic never does its own shift-and-mask.

/// Returns the `width`-bit unsigned field of `src` starting at bit `frompos`
pub fn extract(src: u64, frompos: u32, width: u32) -> u64 {
    debug_assert!(frompos < 64 && width <= 64);
    if width == 0 {
        return 0;
    }
    let shifted = src >> frompos;
    if width >= 64 {
        shifted
    } else {
        shifted & ((1u64 << width) - 1)
    }
}

/// Same as [`extract`], but sign-extends from bit `width - 1` of the field
pub fn extract_signed(src: u64, frompos: u32, width: u32) -> i64 {
    if width == 0 {
        return 0;
    }
    let field = extract(src, frompos, width);
    let unused = 64 - width.min(64);
    ((field << unused) as i64) >> unused
}

/// Unsigned field of a 32-bit instruction word
pub fn insn_u(insnbits: u32, frompos: u32, width: u32) -> u32 {
    extract(insnbits as u64, frompos, width) as u32
}

/// Signed field of a 32-bit instruction word
pub fn insn_s(insnbits: u32, frompos: u32, width: u32) -> i64 {
    extract_signed(insnbits as u64, frompos, width)
}

pub fn is_pow_2(value: u64) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Floor of log2; zero maps to zero
pub fn get_log_2(value: u64) -> u32 {
    if value == 0 {
        0
    } else {
        63 - value.leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract() {
        assert_eq!(extract(0xABCD, 4, 8), 0xBC);
        assert_eq!(extract(0xFFFF_FFFF_FFFF_FFFF, 0, 64), u64::MAX);
        assert_eq!(extract(0x8000_0000_0000_0000, 63, 1), 1);
        assert_eq!(extract(0x1234, 0, 0), 0);
    }

    #[test]
    fn test_extract_signed() {
        // 9-bit field holding -8
        let raw = (0x1F8u64) << 12;
        assert_eq!(extract_signed(raw, 12, 9), -8);
        // positive field stays positive
        assert_eq!(extract_signed(0x0F0, 4, 8), 0x0F);
        // 26-bit branch offset of -1
        assert_eq!(insn_s(0x17FF_FFFF, 0, 26), -1);
    }

    #[test]
    fn test_insn_fields() {
        // ADD X1, X2, #5 -> 0x91001441
        let insn = 0x9100_1441;
        assert_eq!(insn_u(insn, 0, 5), 1);
        assert_eq!(insn_u(insn, 5, 5), 2);
        assert_eq!(insn_u(insn, 10, 12), 5);
        assert_eq!(insn_u(insn, 21, 11), 0x488);
    }

    #[test]
    fn test_get_log_2() {
        for n in 1..100_000u64 {
            let expected = {
                let mut count = 0;
                let mut t = n;
                while t > 1 {
                    count += 1;
                    t >>= 1;
                }
                count
            };
            assert_eq!(expected, get_log_2(n));
        }
    }

    #[test]
    fn test_is_pow_2() {
        assert!(is_pow_2(1));
        assert!(is_pow_2(64));
        assert!(!is_pow_2(0));
        assert!(!is_pow_2(24));
    }
}
