//! Opcode constants and a length-aware walker over a `Code` array.

#![allow(unused)]

pub const NOP: u8 = 0x00;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const ILOAD: u8 = 0x15;
pub const ALOAD: u8 = 0x19;
pub const ISTORE: u8 = 0x36;
pub const ASTORE: u8 = 0x3a;
pub const IINC: u8 = 0x84;
pub const IFEQ: u8 = 0x99;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const RETURN: u8 = 0xb1;
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const MONITORENTER: u8 = 0xc2;
pub const MONITOREXIT: u8 = 0xc3;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;
pub const BREAKPOINT: u8 = 0xca;
pub const IMPDEP1: u8 = 0xfe;
pub const IMPDEP2: u8 = 0xff;

#[derive(Debug, Clone, Copy)]
pub struct Instruction<'a> {
    pub pc: usize,
    pub opcode: u8,
    pub operands: &'a [u8],
}

impl Instruction<'_> {
    pub fn u8_operand(&self) -> u8 {
        self.operands[0]
    }

    /// First two operand bytes as a big-endian index.
    pub fn u16_operand(&self) -> u16 {
        u16::from_be_bytes([self.operands[0], self.operands[1]])
    }
}

pub struct Instructions<'a> {
    code: &'a [u8],
    pc: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Instructions {
            code,
            pc: 0,
            failed: false,
        }
    }

    fn read_i32(&self, at: usize) -> Result<i32, String> {
        self.code
            .get(at..at + 4)
            .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| format!("switch table truncated at {at}"))
    }

    fn length(&self, opcode: u8) -> Result<usize, String> {
        let pc = self.pc;
        let length = match opcode {
            0x00..=0x0f => 1,
            BIPUSH | LDC => 2,
            SIPUSH | LDC_W | LDC2_W => 3,
            0x15..=0x19 => 2,
            0x1a..=0x35 => 1,
            0x36..=0x3a => 2,
            0x3b..=0x83 => 1,
            IINC => 3,
            0x85..=0x98 => 1,
            0x99..=0xa8 => 3,
            RET => 2,
            TABLESWITCH => {
                let base = pc + 1 + (3 - pc % 4);
                let low = self.read_i32(base + 4)?;
                let high = self.read_i32(base + 8)?;
                if high < low {
                    return Err(format!("tableswitch at {pc} has high < low"));
                }
                let entries = (high as i64 - low as i64 + 1) as usize;
                base + 12 + entries * 4 - pc
            }
            LOOKUPSWITCH => {
                let base = pc + 1 + (3 - pc % 4);
                let pairs = self.read_i32(base + 4)?;
                if pairs < 0 {
                    return Err(format!("lookupswitch at {pc} has negative size"));
                }
                base + 8 + pairs as usize * 8 - pc
            }
            0xac..=0xb1 => 1,
            GETSTATIC..=INVOKESTATIC => 3,
            INVOKEINTERFACE | INVOKEDYNAMIC => 5,
            NEW => 3,
            NEWARRAY => 2,
            ANEWARRAY => 3,
            ARRAYLENGTH | ATHROW => 1,
            CHECKCAST | INSTANCEOF => 3,
            MONITORENTER | MONITOREXIT => 1,
            WIDE => match self.code.get(pc + 1) {
                Some(&IINC) => 6,
                Some(_) => 4,
                None => return Err(format!("wide at {pc} has no operand")),
            },
            MULTIANEWARRAY => 4,
            IFNULL | IFNONNULL => 3,
            GOTO_W | JSR_W => 5,
            BREAKPOINT | IMPDEP1 | IMPDEP2 => 1,
            _ => return Err(format!("unknown opcode 0x{opcode:02x} at {pc}")),
        };
        Ok(length)
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.code.len() {
            return None;
        }
        let opcode = self.code[self.pc];
        let length = match self.length(opcode) {
            Ok(length) => length,
            Err(reason) => {
                self.failed = true;
                return Some(Err(reason));
            }
        };
        let Some(bytes) = self.code.get(self.pc..self.pc + length) else {
            self.failed = true;
            return Some(Err(format!("instruction at {} runs past the end of code", self.pc)));
        };
        let instruction = Instruction {
            pc: self.pc,
            opcode,
            operands: match opcode {
                // switch operands start after alignment padding
                TABLESWITCH | LOOKUPSWITCH => &bytes[1 + (3 - self.pc % 4)..],
                _ => &bytes[1..],
            },
        };
        self.pc += length;
        Some(Ok(instruction))
    }
}
