//! JVM opcodes the reference scan cares about, and operand lengths.

pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const INVOKESTATIC: u8 = 0xb8;
pub const NEW: u8 = 0xbb;
pub const ANEWARRAY: u8 = 0xbd;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IINC: u8 = 0x84;

/// Number of fixed operand bytes following `opcode`.
///
/// Returns `None` for the variable-length instructions `tableswitch`,
/// `lookupswitch` and `wide`. Unassigned opcodes have no operands.
pub fn operand_length(opcode: u8) -> Option<usize> {
    let len = match opcode {
        0x10 => 1,                // bipush
        0x11 => 2,                // sipush
        LDC => 1,
        LDC_W | 0x14 => 2,        // ldc_w, ldc2_w
        0x15..=0x19 => 1,         // iload .. aload
        0x36..=0x3a => 1,         // istore .. astore
        IINC => 2,
        0x99..=0xa8 => 2,         // if<cond>, goto, jsr
        0xa9 => 1,                // ret
        TABLESWITCH | LOOKUPSWITCH | WIDE => return None,
        0xb2..=0xb8 => 2,         // field access, invokevirtual/special/static
        0xb9 | 0xba => 4,         // invokeinterface, invokedynamic
        NEW => 2,
        0xbc => 1,                // newarray
        ANEWARRAY | CHECKCAST | INSTANCEOF => 2,
        MULTIANEWARRAY => 3,
        0xc6 | 0xc7 => 2,         // ifnull, ifnonnull
        0xc8 | 0xc9 => 4,         // goto_w, jsr_w
        _ => 0,
    };
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_lengths() {
        assert_eq!(operand_length(0x00), Some(0));
        assert_eq!(operand_length(LDC), Some(1));
        assert_eq!(operand_length(INVOKESTATIC), Some(2));
        assert_eq!(operand_length(0xb9), Some(4));
        assert_eq!(operand_length(MULTIANEWARRAY), Some(3));
        assert_eq!(operand_length(TABLESWITCH), None);
        assert_eq!(operand_length(WIDE), None);
        assert_eq!(operand_length(0xb1), Some(0));
    }
}
