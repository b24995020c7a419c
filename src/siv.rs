//! Deterministic authenticated encryption in SIV mode, per RFC 5297.
//!
//! SIV derives its IV from the key, the associated data, and the message
//! itself, so the same inputs always produce the same output, and nothing
//! is lost if a caller repeats a nonce. The price is shape: a context
//! absorbs any number of associated data segments, then performs exactly
//! one encryption or decryption.

use aes::Aes128;
use cipher::generic_array::typenum::U16;
use cipher::generic_array::GenericArray;
use cipher::{BlockCipher, BlockEncrypt, BlockSizeUser, Key, KeyInit, KeyIvInit, StreamCipher};
use cmac::{Cmac, Mac};
use ctr::Ctr128BE;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::block::{Block, BLOCK_SIZE};
use crate::error::Error;

/// The recorded outcome of a context's single crypto operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// No operation has completed yet.
    Undecided,
    /// The operation ran to completion. For a decryption this means the
    /// tag matched.
    Succeeded,
    /// A decryption saw a tag that does not match its data.
    Failed,
}

/// An SIV context over a 128-bit block cipher, AES-128 by default.
///
/// The caller supplies a double-length key `K1 || K2`: K1 keys the CMAC
/// used by S2V, K2 keys the CTR layer. A context lives through one
/// message:
///
/// ```text
/// new(key) -> aad(..)* -> encrypt(..) | decrypt(..)
/// ```
///
/// Decryption needs the tag first, via [`Siv128::set_tag`].
#[derive(Clone)]
pub struct Siv128<C = Aes128>
where
    C: BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + KeyInit + Clone,
{
    /// The S2V accumulator, D in RFC 5297.
    d: Block,
    tag: Block,
    /// CMAC keyed with K1. Every S2V stage works on a clone, so the
    /// template itself never absorbs anything.
    mac: Cmac<C>,
    /// K2, used to key a fresh CTR instance for the one operation.
    ctr_key: Key<C>,
    /// One encryption or decryption per lifetime. Only reset re-arms it.
    armed: bool,
    final_ret: Status,
}

impl<C> Siv128<C>
where
    C: BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + KeyInit + Clone,
{
    /// Create a context from a double-length key `K1 || K2`.
    ///
    /// The key must be exactly twice the cipher's key size, 32 bytes for
    /// AES-128.
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        if key.len() != 2 * C::key_size() {
            return Err(Error::InvalidKeyLength);
        }
        let (k1, k2) = key.split_at(key.len() / 2);
        let mac = <Cmac<C> as Mac>::new_from_slice(k1).map_err(|_| Error::InvalidKeyLength)?;
        let mut ctx = Siv128 {
            d: Block::ZERO,
            tag: Block::ZERO,
            mac,
            ctr_key: Key::<C>::clone_from_slice(k2),
            armed: true,
            final_ret: Status::Undecided,
        };
        ctx.reset();
        Ok(ctx)
    }

    /// Re-arm a keyed context for another message: fresh accumulator,
    /// cleared tag, budget restored. The keys stay.
    pub fn reset(&mut self) {
        self.d = self.cmac(&[0; BLOCK_SIZE]);
        self.tag.zeroize();
        self.armed = true;
        self.final_ret = Status::Undecided;
    }

    /// Absorb one segment of associated data.
    ///
    /// Per RFC 5297 the nonce is simply the last associated data segment;
    /// the mode does not treat it specially. Fails once the single crypto
    /// operation has run.
    pub fn aad(&mut self, aad: &[u8]) -> Result<(), Error> {
        if !self.armed {
            return Err(Error::AlreadyUsed);
        }
        self.d.dbl();
        let t = self.cmac(aad);
        self.d.xor_in(&t.0);
        Ok(())
    }

    /// Encrypt a message under the absorbed associated data.
    ///
    /// Writes `plaintext.len()` bytes of ciphertext into `ciphertext` and
    /// records the tag, readable through [`Siv128::get_tag`]. Returns the
    /// number of bytes written.
    pub fn encrypt(&mut self, plaintext: &[u8], ciphertext: &mut [u8]) -> Result<usize, Error> {
        if !self.armed {
            return Err(Error::AlreadyUsed);
        }
        if ciphertext.len() < plaintext.len() {
            return Err(Error::OutputTooSmall);
        }
        self.armed = false;

        let q = self.s2v(plaintext);
        self.tag = q;
        let out = &mut ciphertext[..plaintext.len()];
        out.copy_from_slice(plaintext);
        self.ctr_apply(&q, out);
        self.final_ret = Status::Succeeded;
        Ok(out.len())
    }

    /// Decrypt a message and authenticate it against the tag supplied
    /// through [`Siv128::set_tag`].
    ///
    /// On a tag mismatch the candidate plaintext is wiped before the
    /// error returns, so no unauthenticated bytes escape.
    pub fn decrypt(&mut self, ciphertext: &[u8], plaintext: &mut [u8]) -> Result<usize, Error> {
        if !self.armed {
            return Err(Error::AlreadyUsed);
        }
        if plaintext.len() < ciphertext.len() {
            return Err(Error::OutputTooSmall);
        }
        self.armed = false;

        let q = self.tag;
        let out = &mut plaintext[..ciphertext.len()];
        out.copy_from_slice(ciphertext);
        self.ctr_apply(&q, out);
        let t = self.s2v(out);
        if bool::from(t.0.ct_eq(&q.0)) {
            self.final_ret = Status::Succeeded;
            Ok(out.len())
        } else {
            out.zeroize();
            self.final_ret = Status::Failed;
            Err(Error::InvalidTag)
        }
    }

    /// Store a 16-byte tag for a coming decryption.
    pub fn set_tag(&mut self, tag: &[u8]) -> Result<(), Error> {
        if tag.len() != BLOCK_SIZE {
            return Err(Error::InvalidTagLength);
        }
        self.tag.0.copy_from_slice(tag);
        Ok(())
    }

    /// Copy the computed tag into a 16-byte buffer.
    pub fn get_tag(&self, tag: &mut [u8]) -> Result<(), Error> {
        if tag.len() != BLOCK_SIZE {
            return Err(Error::InvalidTagLength);
        }
        tag.copy_from_slice(&self.tag.0);
        Ok(())
    }

    /// The recorded result of the single crypto operation.
    pub fn finish(&self) -> Status {
        self.final_ret
    }

    /// CMAC under K1, on a fresh clone of the keyed template.
    fn cmac(&self, data: &[u8]) -> Block {
        let mut mac = self.mac.clone();
        mac.update(data);
        Block(mac.finalize().into_bytes().into())
    }

    /// S2V over the accumulated D and the final input, RFC 5297 2.4.
    fn s2v(&mut self, data: &[u8]) -> Block {
        let mut mac = self.mac.clone();
        if data.len() >= BLOCK_SIZE {
            // xorend: D folds into the last 16 bytes, the head passes
            // through untouched.
            let (head, last) = data.split_at(data.len() - BLOCK_SIZE);
            mac.update(head);
            let mut t = Block::ZERO;
            t.0.copy_from_slice(last);
            t.xor_in(&self.d.0);
            mac.update(&t.0);
        } else {
            // Short input: pad with 10*, double D one more time, then mix.
            let mut t = Block::ZERO;
            t.0[..data.len()].copy_from_slice(data);
            t.0[data.len()] = 0x80;
            self.d.dbl();
            t.xor_in(&self.d.0);
            mac.update(&t.0);
        }
        Block(mac.finalize().into_bytes().into())
    }

    /// Run the CTR layer over `buf`, starting from the synthetic IV with
    /// its two reserved bits cleared (RFC 5297 2.6).
    fn ctr_apply(&self, q: &Block, buf: &mut [u8]) {
        let mut iv = q.0;
        iv[8] &= 0x7f;
        iv[12] &= 0x7f;
        let mut ctr = Ctr128BE::<C>::new(&self.ctr_key, GenericArray::from_slice(&iv));
        ctr.apply_keystream(buf);
    }
}

impl<C> Drop for Siv128<C>
where
    C: BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + KeyInit + Clone,
{
    fn drop(&mut self) {
        self.d.zeroize();
        self.tag.zeroize();
        self.ctr_key.as_mut_slice().zeroize();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    // RFC 5297 A.1, deterministic authenticated encryption.
    const KEY_A1: [u8; 32] =
        hex!("fffefdfcfbfaf9f8f7f6f5f4f3f2f1f0 f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff");
    const AAD_A1: [u8; 24] = hex!("101112131415161718191a1b1c1d1e1f2021222324252627");
    const PLAINTEXT_A1: [u8; 14] = hex!("112233445566778899aabbccddee");
    const TAG_A1: [u8; 16] = hex!("85632d07c6e8f37f950acd320a2ecc93");
    const CIPHERTEXT_A1: [u8; 14] = hex!("40c02b9690c4dc04daef7f6afe5c");

    #[test]
    fn test_rfc5297_a1_encrypt() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        ctx.aad(&AAD_A1).unwrap();
        let mut ciphertext = [0; 14];
        let written = ctx.encrypt(&PLAINTEXT_A1, &mut ciphertext).unwrap();
        assert_eq!(written, 14);
        assert_eq!(ciphertext, CIPHERTEXT_A1);
        let mut tag = [0; 16];
        ctx.get_tag(&mut tag).unwrap();
        assert_eq!(tag, TAG_A1);
        assert_eq!(ctx.finish(), Status::Succeeded);
    }

    #[test]
    fn test_rfc5297_a1_decrypt() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        ctx.aad(&AAD_A1).unwrap();
        ctx.set_tag(&TAG_A1).unwrap();
        let mut plaintext = [0; 14];
        ctx.decrypt(&CIPHERTEXT_A1, &mut plaintext).unwrap();
        assert_eq!(plaintext, PLAINTEXT_A1);
        assert_eq!(ctx.finish(), Status::Succeeded);
    }

    // RFC 5297 A.2, nonce-based authenticated encryption: two associated
    // data segments, then the nonce as the final segment.
    #[test]
    fn test_rfc5297_a2_round_trip() {
        let key: [u8; 32] =
            hex!("7f7e7d7c7b7a79787776757473727170 404142434445464748494a4b4c4d4e4f");
        let ad1 = hex!(
            "00112233445566778899aabbccddeeffdeaddadadeaddadaffeeddcc"
            "bbaa99887766554433221100"
        );
        let ad2 = hex!("102030405060708090a0");
        let nonce = hex!("09f911029d74e35bd84156c5635688c0");
        let plaintext = hex!(
            "7468697320697320736f6d6520706c61696e7465787420746f20656e"
            "6372797074207573696e67205349562d414553"
        );
        let expected_tag = hex!("7bdb6e3b432667eb06f4d14bff2fbd0f");
        let expected_ct = hex!(
            "cb900f2fddbe404326601965c889bf17dba77ceb094fa663b7a3f748"
            "ba8af829ea64ad544a272e9c485b62a3fd5c0d"
        );

        let mut ctx = Siv128::<Aes128>::new(&key).unwrap();
        ctx.aad(&ad1).unwrap();
        ctx.aad(&ad2).unwrap();
        ctx.aad(&nonce).unwrap();
        let mut ciphertext = [0; 47];
        ctx.encrypt(&plaintext, &mut ciphertext).unwrap();
        let mut tag = [0; 16];
        ctx.get_tag(&mut tag).unwrap();
        assert_eq!(tag, expected_tag);
        assert_eq!(ciphertext, expected_ct);

        let mut ctx = Siv128::<Aes128>::new(&key).unwrap();
        ctx.aad(&ad1).unwrap();
        ctx.aad(&ad2).unwrap();
        ctx.aad(&nonce).unwrap();
        ctx.set_tag(&tag).unwrap();
        let mut recovered = [0; 47];
        ctx.decrypt(&ciphertext, &mut recovered).unwrap();
        assert_eq!(recovered, plaintext);
    }

    // With no associated data and an empty message, the tag is the CMAC
    // of the padded empty block mixed with the doubled initial
    // accumulator. Rebuilding that from the CMAC primitive directly pins
    // down both the doubling step and the padding rule.
    #[test]
    fn test_empty_aad_empty_message() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        let mut ciphertext = [0; 0];
        assert_eq!(ctx.encrypt(&[], &mut ciphertext).unwrap(), 0);
        let mut tag = [0; 16];
        ctx.get_tag(&mut tag).unwrap();

        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(&KEY_A1[..16]).unwrap();
        mac.update(&[0; 16]);
        let mut d = Block(mac.finalize().into_bytes().into());
        d.dbl();
        let mut padded = Block::ZERO;
        padded.0[0] = 0x80;
        padded.xor_in(&d.0);
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(&KEY_A1[..16]).unwrap();
        mac.update(&padded.0);
        let expected: [u8; 16] = mac.finalize().into_bytes().into();
        assert_eq!(tag, expected);
    }

    #[test]
    fn test_second_crypto_op_fails() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        let mut ciphertext = [0; 14];
        ctx.encrypt(&PLAINTEXT_A1, &mut ciphertext).unwrap();
        assert_eq!(
            ctx.encrypt(&PLAINTEXT_A1, &mut ciphertext),
            Err(Error::AlreadyUsed)
        );
        assert_eq!(ctx.decrypt(&ciphertext, &mut [0; 14]), Err(Error::AlreadyUsed));
    }

    #[test]
    fn test_aad_after_crypto_op_fails() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        let mut ciphertext = [0; 14];
        ctx.encrypt(&PLAINTEXT_A1, &mut ciphertext).unwrap();
        assert_eq!(ctx.aad(&AAD_A1), Err(Error::AlreadyUsed));
    }

    #[test]
    fn test_reset_re_arms() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        ctx.aad(&AAD_A1).unwrap();
        let mut first = [0; 14];
        ctx.encrypt(&PLAINTEXT_A1, &mut first).unwrap();

        ctx.reset();
        assert_eq!(ctx.finish(), Status::Undecided);
        ctx.aad(&AAD_A1).unwrap();
        let mut second = [0; 14];
        ctx.encrypt(&PLAINTEXT_A1, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_tampered_tag_wipes_output() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        ctx.aad(&AAD_A1).unwrap();
        let mut bad_tag = TAG_A1;
        bad_tag[0] ^= 0x01;
        ctx.set_tag(&bad_tag).unwrap();
        let mut plaintext = [0xFF; 14];
        assert_eq!(
            ctx.decrypt(&CIPHERTEXT_A1, &mut plaintext),
            Err(Error::InvalidTag)
        );
        assert_eq!(plaintext, [0; 14]);
        assert_eq!(ctx.finish(), Status::Failed);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        ctx.aad(&AAD_A1).unwrap();
        ctx.set_tag(&TAG_A1).unwrap();
        let mut mangled = CIPHERTEXT_A1;
        mangled[3] ^= 0x80;
        let mut plaintext = [0; 14];
        assert_eq!(ctx.decrypt(&mangled, &mut plaintext), Err(Error::InvalidTag));
    }

    #[test]
    fn test_missing_aad_fails_auth() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        ctx.set_tag(&TAG_A1).unwrap();
        let mut plaintext = [0; 14];
        assert_eq!(
            ctx.decrypt(&CIPHERTEXT_A1, &mut plaintext),
            Err(Error::InvalidTag)
        );
    }

    #[test]
    fn test_key_length_must_be_double() {
        assert!(Siv128::<Aes128>::new(&KEY_A1[..16]).is_err());
        assert!(Siv128::<Aes128>::new(&[0; 33]).is_err());
        assert!(Siv128::<Aes128>::new(&[]).is_err());
    }

    #[test]
    fn test_tag_buffers_must_be_16_bytes() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        assert_eq!(ctx.set_tag(&[0; 15]), Err(Error::InvalidTagLength));
        assert_eq!(ctx.set_tag(&[0; 17]), Err(Error::InvalidTagLength));
        let mut short = [0; 15];
        assert_eq!(ctx.get_tag(&mut short), Err(Error::InvalidTagLength));
    }

    #[test]
    fn test_output_buffer_too_small() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        let mut ciphertext = [0; 13];
        assert_eq!(
            ctx.encrypt(&PLAINTEXT_A1, &mut ciphertext),
            Err(Error::OutputTooSmall)
        );
        // The failed call must not consume the budget.
        let mut ciphertext = [0; 14];
        assert!(ctx.encrypt(&PLAINTEXT_A1, &mut ciphertext).is_ok());
    }

    #[test]
    fn test_clone_is_an_independent_fork() {
        let mut ctx = Siv128::<Aes128>::new(&KEY_A1).unwrap();
        ctx.aad(&AAD_A1).unwrap();
        let mut forked = ctx.clone();

        let mut ct0 = [0; 14];
        ctx.encrypt(&PLAINTEXT_A1, &mut ct0).unwrap();
        // The fork still accepts associated data and diverges.
        forked.aad(b"more").unwrap();
        let mut ct1 = [0; 14];
        forked.encrypt(&PLAINTEXT_A1, &mut ct1).unwrap();
        assert_eq!(ct0, CIPHERTEXT_A1);
        assert_ne!(ct0, ct1);
    }
}
