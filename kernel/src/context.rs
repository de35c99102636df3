//! Saved processor context
//!
//! The context is the 32-bit register snapshot pushed on a process's stack
//! when it traps into the kernel. It lives at the process's saved stack top
//! as little-endian words and is the only record of where to resume.
//!
//! # Layout
//!
//! Fields are ordered the way they are pushed: segment registers first,
//! then the general-purpose block, then the interrupt return frame
//! (`eip`, `cs`, `eflags`). Do not reorder without updating
//! [`Context::words`].

use static_assertions::assert_eq_size;

/// Saved register snapshot
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    // Segment registers
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,

    // General purpose registers
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,

    // Interrupt return frame
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

/// Words in a saved context
const WORDS: usize = 15;

/// Bytes occupied by a saved context on a process stack
pub const CONTEXT_SIZE: usize = core::mem::size_of::<Context>();

assert_eq_size!(Context, [u32; WORDS]);

impl Context {
    /// Kernel data segment selector
    pub const DATA_SEGMENT: u32 = 0x10;

    /// Kernel code segment selector
    pub const CODE_SEGMENT: u32 = 0x08;

    /// Interrupts enabled, reserved bit 1 set
    pub const INITIAL_EFLAGS: u32 = 0x202;

    /// Context a freshly loaded process starts from.
    ///
    /// # Arguments
    /// * `entry` - first instruction to execute
    /// * `stack_base` - lowest address of the process stack
    /// * `stack_top` - address the saved context is stored at
    pub fn initial(entry: u32, stack_base: u32, stack_top: u32) -> Self {
        Self {
            gs: Self::DATA_SEGMENT,
            fs: Self::DATA_SEGMENT,
            es: Self::DATA_SEGMENT,
            ds: Self::DATA_SEGMENT,
            ebp: stack_base,
            esp: stack_top,
            eip: entry,
            cs: Self::CODE_SEGMENT,
            eflags: Self::INITIAL_EFLAGS,
            ..Self::default()
        }
    }

    fn words(&self) -> [u32; WORDS] {
        [
            self.gs, self.fs, self.es, self.ds, self.edi, self.esi, self.ebp, self.esp, self.ebx,
            self.edx, self.ecx, self.eax, self.eip, self.cs, self.eflags,
        ]
    }

    fn from_words(w: [u32; WORDS]) -> Self {
        Self {
            gs: w[0],
            fs: w[1],
            es: w[2],
            ds: w[3],
            edi: w[4],
            esi: w[5],
            ebp: w[6],
            esp: w[7],
            ebx: w[8],
            edx: w[9],
            ecx: w[10],
            eax: w[11],
            eip: w[12],
            cs: w[13],
            eflags: w[14],
        }
    }

    /// Store the context into `bytes`, which must hold [`CONTEXT_SIZE`] bytes.
    pub fn write_to(&self, bytes: &mut [u8]) {
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    /// Load a context previously stored with [`Context::write_to`].
    pub fn read_from(bytes: &[u8]) -> Self {
        let mut words = [0u32; WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(chunk);
            *word = u32::from_le_bytes(raw);
        }
        Self::from_words(words)
    }
}
