//! DER to JOSE conversion for ECDSA signatures
//!
//! ECDSA signers emit `SEQUENCE { INTEGER r, INTEGER s }` in DER. JWS (RFC 7518
//! section 3.4) wants the fixed-width concatenation `r || s`, each component
//! left-padded to the curve's byte length.

use thiserror::Error;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;

/// Byte length of one P-256 signature component
pub const P256_COMPONENT_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerError {
    #[error("DER input truncated")]
    Truncated,
    #[error("unexpected DER tag 0x{found:02x}, expected 0x{expected:02x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("unsupported DER length encoding")]
    InvalidLength,
    #[error("negative INTEGER in signature")]
    NegativeInteger,
    #[error("INTEGER of {len} bytes does not fit in {max} bytes")]
    IntegerTooLarge { len: usize, max: usize },
    #[error("{0} trailing bytes after signature")]
    TrailingBytes(usize),
}

/// Convert a DER ECDSA signature into the raw `r || s` form.
///
/// Accepts both short-form and long-form DER lengths.
pub fn der_to_raw(der: &[u8], component_len: usize) -> Result<Vec<u8>, DerError> {
    let mut reader = DerReader::new(der);

    let body = reader.read_tlv(TAG_SEQUENCE)?;
    if !reader.is_empty() {
        return Err(DerError::TrailingBytes(reader.remaining()));
    }

    let mut seq = DerReader::new(body);
    let r = seq.read_tlv(TAG_INTEGER)?;
    let s = seq.read_tlv(TAG_INTEGER)?;
    if !seq.is_empty() {
        return Err(DerError::TrailingBytes(seq.remaining()));
    }

    let mut raw = Vec::with_capacity(component_len * 2);
    append_fixed_width(&mut raw, r, component_len)?;
    append_fixed_width(&mut raw, s, component_len)?;
    Ok(raw)
}

/// Strip sign/zero padding from an unsigned INTEGER and left-pad it to `width`
fn append_fixed_width(out: &mut Vec<u8>, integer: &[u8], width: usize) -> Result<(), DerError> {
    match integer.first() {
        None => return Err(DerError::Truncated),
        Some(b) if b & 0x80 != 0 => return Err(DerError::NegativeInteger),
        Some(_) => {}
    }

    let first_significant = integer
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(integer.len());
    let magnitude = &integer[first_significant..];

    if magnitude.len() > width {
        return Err(DerError::IntegerTooLarge {
            len: magnitude.len(),
            max: width,
        });
    }

    out.extend(std::iter::repeat_n(0u8, width - magnitude.len()));
    out.extend_from_slice(magnitude);
    Ok(())
}

struct DerReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.pos)
    }

    fn read_byte(&mut self) -> Result<u8, DerError> {
        let byte = *self.input.get(self.pos).ok_or(DerError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Short form: one byte < 0x80. Long form: 0x80 | n followed by n
    /// big-endian length bytes. Indefinite length (0x80) is not DER.
    fn read_length(&mut self) -> Result<usize, DerError> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }

        let count = (first & 0x7f) as usize;
        if count == 0 || count > std::mem::size_of::<u32>() {
            return Err(DerError::InvalidLength);
        }

        let mut length = 0usize;
        for _ in 0..count {
            length = (length << 8) | self.read_byte()? as usize;
        }
        Ok(length)
    }

    fn read_tlv(&mut self, expected: u8) -> Result<&'a [u8], DerError> {
        let tag = self.read_byte()?;
        if tag != expected {
            return Err(DerError::UnexpectedTag {
                expected,
                found: tag,
            });
        }

        let len = self.read_length()?;
        let end = self.pos.checked_add(len).ok_or(DerError::InvalidLength)?;
        let value = self.input.get(self.pos..end).ok_or(DerError::Truncated)?;
        self.pos = end;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{
        DerSignature, Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    };
    use rand::rngs::OsRng;

    fn integer(bytes: &[u8]) -> Vec<u8> {
        let mut out = vec![TAG_INTEGER, bytes.len() as u8];
        out.extend_from_slice(bytes);
        out
    }

    fn sequence(body: &[u8]) -> Vec<u8> {
        let mut out = vec![TAG_SEQUENCE, body.len() as u8];
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_sign_byte_is_stripped() {
        let mut r = vec![0x00, 0x80];
        r.extend([0x11; 31]);
        let s = [0x22; 32];
        let der = sequence(&[integer(&r), integer(&s)].concat());

        let raw = der_to_raw(&der, 32).unwrap();
        assert_eq!(raw.len(), 64);
        assert_eq!(raw[0], 0x80);
        assert_eq!(&raw[1..32], &[0x11; 31]);
        assert_eq!(&raw[32..], &[0x22; 32]);
    }

    #[test]
    fn test_short_components_are_left_padded() {
        let r = [0x7f; 30];
        let s = [0x01];
        let der = sequence(&[integer(&r), integer(&s)].concat());

        let raw = der_to_raw(&der, 32).unwrap();
        assert_eq!(raw.len(), 64);
        assert_eq!(&raw[..2], &[0, 0]);
        assert_eq!(&raw[2..32], &[0x7f; 30]);
        assert_eq!(&raw[32..63], &[0u8; 31]);
        assert_eq!(raw[63], 0x01);
    }

    #[test]
    fn test_long_form_lengths() {
        let r = [0x33; 32];
        let s = [0x44; 32];
        // INTEGER lengths and the SEQUENCE length in long form (0x81 nn)
        let mut body = vec![TAG_INTEGER, 0x81, 32];
        body.extend_from_slice(&r);
        body.extend([TAG_INTEGER, 0x81, 32]);
        body.extend_from_slice(&s);
        let mut der = vec![TAG_SEQUENCE, 0x81, body.len() as u8];
        der.extend_from_slice(&body);

        let raw = der_to_raw(&der, 32).unwrap();
        assert_eq!(&raw[..32], &r);
        assert_eq!(&raw[32..], &s);

        // Two length bytes
        let mut der2 = vec![TAG_SEQUENCE, 0x82, 0x00, body.len() as u8];
        der2.extend_from_slice(&body);
        assert_eq!(der_to_raw(&der2, 32).unwrap(), raw);
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        assert_eq!(der_to_raw(&[], 32), Err(DerError::Truncated));
        assert_eq!(
            der_to_raw(&[0x31, 0x00], 32),
            Err(DerError::UnexpectedTag {
                expected: TAG_SEQUENCE,
                found: 0x31
            })
        );
        assert_eq!(der_to_raw(&[TAG_SEQUENCE, 0x80], 32), Err(DerError::InvalidLength));
        assert_eq!(der_to_raw(&[TAG_SEQUENCE, 0x05, 0x02], 32), Err(DerError::Truncated));

        let oversized = sequence(&[integer(&[0x01; 33]), integer(&[0x01])].concat());
        assert_eq!(
            der_to_raw(&oversized, 32),
            Err(DerError::IntegerTooLarge { len: 33, max: 32 })
        );

        let negative = sequence(&[integer(&[0x80; 32]), integer(&[0x01])].concat());
        assert_eq!(der_to_raw(&negative, 32), Err(DerError::NegativeInteger));

        let mut trailing = sequence(&[integer(&[0x01]), integer(&[0x01])].concat());
        trailing.push(0x00);
        assert_eq!(der_to_raw(&trailing, 32), Err(DerError::TrailingBytes(1)));
    }

    /// Lengths of the r and s INTEGER values inside a DER signature
    fn component_lengths(der: &[u8]) -> (usize, usize) {
        let r_len = der[3] as usize;
        let s_len = der[4 + r_len + 1] as usize;
        (r_len, s_len)
    }

    #[test]
    fn test_real_signatures_convert_and_verify() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);

        let mut saw_sign_byte = false;
        let mut saw_padding = false;

        for i in 0..4096u32 {
            let message = format!("signing-input-{i}");
            let der: DerSignature = signing_key.sign(message.as_bytes());
            let der_bytes = der.as_bytes();

            let raw = der_to_raw(der_bytes, P256_COMPONENT_LEN).unwrap();
            assert_eq!(raw.len(), 64);

            let expected = Signature::from_der(der_bytes).unwrap();
            assert_eq!(raw.as_slice(), expected.to_bytes().as_slice());

            let signature = Signature::from_slice(&raw).unwrap();
            assert!(verifying_key.verify(message.as_bytes(), &signature).is_ok());

            let (r_len, s_len) = component_lengths(der_bytes);
            saw_sign_byte |= r_len == 33 || s_len == 33;
            saw_padding |= r_len < 32 || s_len < 32;

            if saw_sign_byte && saw_padding && i >= 64 {
                break;
            }
        }

        assert!(saw_sign_byte, "no signature with a DER sign byte was produced");
        assert!(saw_padding, "no signature needing left padding was produced");
    }
}
