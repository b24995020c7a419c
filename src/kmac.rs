//! The keyed sponge MACs of NIST SP 800-185.
//!
//! KMAC128 and KMAC256 feed a Keccak sponge three framed inputs: a header
//! naming the function and the customization string, the encoded key, and
//! the message followed by a length trailer. The trailer is what makes
//! plain KMAC bind its output length; KMACXOF encodes zero there instead,
//! so one absorbed state can be squeezed to any length.

use zeroize::Zeroize;

use crate::encode;
use crate::error::Error;
use crate::sponge::{CshakeXof, RATE128, RATE256};

/// encode_string("KMAC"), absorbed at the front of every context.
const ENCODED_NAME: [u8; 6] = [0x01, 0x20, 0x4B, 0x4D, 0x41, 0x43];

/// Keys shorter than this are rejected. SP 800-185 itself sets no
/// minimum; four bytes is kept for compatibility with deployments that
/// enforce it.
const MIN_KEY: usize = 4;
/// The longest key whose bit length encodes in two bytes: 2040 bits.
const MAX_KEY: usize = 255;
/// The longest customization string, sized so the header block of a
/// KMAC256 context stays within two sponge blocks.
const MAX_CUSTOM: usize = 127;
/// encode_string adds at most a three-byte length prefix here.
const MAX_CUSTOM_ENCODED: usize = MAX_CUSTOM + 3;
/// bytepad(encode_string(K), w) never outgrows two blocks of the larger
/// rate.
const MAX_KEY_ENCODED: usize = 2 * RATE128;
/// The largest output request whose bit count still fits in a usize.
const MAX_OUTPUT: usize = usize::MAX / 8;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Created or finalized; parameters may be set, data may not flow.
    Idle,
    /// init ran; message bytes are being absorbed.
    Absorbing,
}

/// A KMAC128 or KMAC256 context.
///
/// A context is configured, initialized, fed message bytes, and
/// finalized:
///
/// ```text
/// new128() -> set_key(..) -> init() -> update(..)* -> finalize(..)
/// ```
///
/// The key and customization string are stored in their encoded form and
/// consumed by `init`, so setting them later only affects the next
/// `init`. The output size and the XOF toggle only matter at `finalize`
/// and may change any time before it.
#[derive(Clone)]
pub struct Kmac {
    sponge: CshakeXof,
    /// bytepad(encode_string(K), w), ready to absorb. Empty until a key
    /// is set.
    key: [u8; MAX_KEY_ENCODED],
    key_len: usize,
    /// encode_string(S). Defaults to encode_string("").
    custom: [u8; MAX_CUSTOM_ENCODED],
    custom_len: usize,
    out_len: usize,
    xof: bool,
    stage: Stage,
}

impl Kmac {
    /// A KMAC128 context: 168-byte sponge blocks, 32 bytes of output by
    /// default.
    pub fn new128() -> Self {
        Self::new(RATE128, 32)
    }

    /// A KMAC256 context: 136-byte sponge blocks, 64 bytes of output by
    /// default.
    pub fn new256() -> Self {
        Self::new(RATE256, 64)
    }

    fn new(rate: usize, out_len: usize) -> Self {
        let mut custom = [0; MAX_CUSTOM_ENCODED];
        let custom_len = encode::encode_string(&mut custom, b"");
        Kmac {
            sponge: CshakeXof::new(rate),
            key: [0; MAX_KEY_ENCODED],
            key_len: 0,
            custom,
            custom_len,
            out_len,
            xof: false,
            stage: Stage::Idle,
        }
    }

    /// The number of bytes `finalize` will produce.
    pub fn output_size(&self) -> usize {
        self.out_len
    }

    /// Set the MAC key, 4 to 255 bytes.
    ///
    /// The key is stored as bytepad(encode_string(K), w) and absorbed by
    /// the next `init`.
    pub fn set_key(&mut self, key: &[u8]) -> Result<(), Error> {
        if key.len() < MIN_KEY || key.len() > MAX_KEY {
            return Err(Error::InvalidKeyLength);
        }
        let w = self.sponge.block_size();
        self.key_len = encode::bytepad(&mut self.key, w, |buf| encode::encode_string(buf, key));
        Ok(())
    }

    /// Set the customization string S, at most 127 bytes. Absorbed by the
    /// next `init`.
    pub fn set_custom(&mut self, custom: &[u8]) -> Result<(), Error> {
        if custom.len() > MAX_CUSTOM {
            return Err(Error::InvalidCustomLength);
        }
        self.custom_len = encode::encode_string(&mut self.custom, custom);
        Ok(())
    }

    /// Request `n` bytes of output from `finalize`.
    ///
    /// For plain KMAC the length is encoded into the absorbed data, so
    /// two requests of different lengths give unrelated digests. In XOF
    /// mode it only decides how much of the stream is cut off.
    pub fn set_output_size(&mut self, n: usize) -> Result<(), Error> {
        if n == 0 || n > MAX_OUTPUT {
            return Err(Error::InvalidOutputSize);
        }
        self.out_len = n;
        Ok(())
    }

    /// Switch between KMAC (false) and KMACXOF (true).
    pub fn set_xof(&mut self, xof: bool) {
        self.xof = xof;
    }

    /// Start absorbing: a fresh sponge takes the padded header block,
    /// then the encoded key. Fails if no key has been set. Calling `init`
    /// again restarts the context with the current parameters.
    pub fn init(&mut self) -> Result<(), Error> {
        if self.key_len == 0 {
            return Err(Error::MissingKey);
        }
        self.sponge.reset();
        let w = self.sponge.block_size();
        // bytepad(encode_string("KMAC") || encode_string(S), w). Two
        // KMAC256 blocks bound the header even for the longest S.
        let mut header = [0; 2 * RATE256];
        let len = encode::bytepad(&mut header, w, |buf| {
            buf[..ENCODED_NAME.len()].copy_from_slice(&ENCODED_NAME);
            let end = ENCODED_NAME.len() + self.custom_len;
            buf[ENCODED_NAME.len()..end].copy_from_slice(&self.custom[..self.custom_len]);
            end
        });
        self.sponge.absorb(&header[..len]);
        self.sponge.absorb(&self.key[..self.key_len]);
        self.stage = Stage::Absorbing;
        Ok(())
    }

    /// Absorb message bytes. Callable any number of times between `init`
    /// and `finalize`.
    pub fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.stage != Stage::Absorbing {
            return Err(Error::NotInitialized);
        }
        self.sponge.absorb(data);
        Ok(())
    }

    /// Absorb the length trailer, then squeeze the digest into `out`.
    ///
    /// Writes `output_size()` bytes and returns that count. The context
    /// goes idle afterwards; a new `init` starts it over.
    pub fn finalize(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        if self.stage != Stage::Absorbing {
            return Err(Error::NotInitialized);
        }
        if out.len() < self.out_len {
            return Err(Error::OutputTooSmall);
        }
        let bits = if self.xof { 0 } else { self.out_len * 8 };
        let mut trailer = [0; encode::MAX_INT_ENCODED];
        let len = encode::right_encode(&mut trailer, bits);
        self.sponge.absorb(&trailer[..len]);
        self.sponge.squeeze(&mut out[..self.out_len]);
        self.stage = Stage::Idle;
        Ok(self.out_len)
    }
}

impl Drop for Kmac {
    fn drop(&mut self) {
        self.key.zeroize();
        self.custom.zeroize();
        self.sponge.zeroize();
    }
}
