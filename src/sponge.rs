use core::ops::{Deref, DerefMut};

use zeroize::Zeroize;

/// The number of words in the Keccak-f[1600] state.
const STATE_SIZE_U64: usize = 25;
/// The number of bytes in the Keccak-f[1600] state.
const STATE_SIZE_U8: usize = STATE_SIZE_U64 * 8;

/// The sponge rate for KMAC128, leaving a capacity of 256 bits.
pub const RATE128: usize = 168;
/// The sponge rate for KMAC256, leaving a capacity of 512 bits.
pub const RATE256: usize = 136;

/// A buffer of bytes which is aligned, so that we can apply the permutation
/// to it.
///
/// The sponge wants to absorb and squeeze individual bytes, whereas the
/// permutation wants 64 bit words. An aligned byte buffer can be viewed as
/// either without copying.
#[derive(Clone, Zeroize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[repr(align(8))]
struct AlignedState([u8; STATE_SIZE_U8]);

impl AlignedState {
    /// Apply Keccak-f[1600] to this state.
    fn permute(&mut self) {
        // SAFETY: the struct is 8 byte aligned, so viewing its 200 bytes
        // as 25 words is sound.
        let words = unsafe { &mut *(self as *mut Self as *mut [u64; STATE_SIZE_U64]) };
        // Bytes fill the lanes in little-endian order. On a big-endian
        // host the words have to be swapped around the permutation.
        for word in words.iter_mut() {
            *word = u64::from_le(*word);
        }
        keccak::f1600(words);
        for word in words.iter_mut() {
            *word = u64::to_le(*word);
        }
    }
}

impl Deref for AlignedState {
    type Target = [u8; STATE_SIZE_U8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AlignedState {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// A raw Keccak XOF with the cSHAKE domain separation bits.
///
/// This is the engine under KMAC: callers absorb input that is already
/// encoded per SP 800-185 (header block, key block, message, length
/// trailer) and then squeeze as many bytes as they want. Keccak's pad10*1
/// combined with the two-bit cSHAKE suffix shows up as the 0x04 below.
#[derive(Clone, Zeroize)]
pub struct CshakeXof {
    state: AlignedState,
    rate: usize,
    pos: usize,
    squeezing: bool,
}

impl CshakeXof {
    pub fn new(rate: usize) -> Self {
        Self {
            state: AlignedState([0; STATE_SIZE_U8]),
            rate,
            pos: 0,
            squeezing: false,
        }
    }

    /// The rate in bytes, which doubles as the block size w of SP 800-185.
    pub fn block_size(&self) -> usize {
        self.rate
    }

    /// Forget all absorbed input and start over at the same rate.
    pub fn reset(&mut self) {
        self.state.zeroize();
        self.pos = 0;
        self.squeezing = false;
    }

    /// Absorb bytes into the sponge, permuting at each rate boundary.
    pub fn absorb(&mut self, data: &[u8]) {
        debug_assert!(!self.squeezing, "absorb after squeeze");
        for &b in data {
            self.state[self.pos] ^= b;
            self.pos += 1;
            if self.pos == self.rate {
                self.state.permute();
                self.pos = 0;
            }
        }
    }

    /// Close the absorb phase and squeeze `out.len()` bytes. Repeated
    /// calls continue the output stream where the previous call stopped.
    pub fn squeeze(&mut self, out: &mut [u8]) {
        if !self.squeezing {
            self.pad();
        }
        for b in out {
            if self.pos == self.rate {
                self.state.permute();
                self.pos = 0;
            }
            *b = self.state[self.pos];
            self.pos += 1;
        }
    }

    fn pad(&mut self) {
        self.state[self.pos] ^= 0x04;
        self.state[self.rate - 1] ^= 0x80;
        self.state.permute();
        self.pos = 0;
        self.squeezing = true;
    }
}
