//! Minimal DER encoder.
//!
//! Only the production rules X.509 needs: definite lengths (short form under
//! 128, long form otherwise), minimal two's-complement INTEGERs, and the
//! string/time types used in names and validity windows. Everything returns
//! an owned encoding; composites take their children's encodings.

/// Universal tag numbers (and the constructed bit where it applies).
pub mod tag {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    pub const UTF8_STRING: u8 = 0x0c;
    pub const PRINTABLE_STRING: u8 = 0x13;
    pub const IA5_STRING: u8 = 0x16;
    pub const UTC_TIME: u8 = 0x17;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
}

/// Encode one TLV.
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    push_length(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

/// Definite length: short form below 128, long form otherwise.
fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 128 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

/// SEQUENCE of already-encoded children.
pub fn sequence(children: &[Vec<u8>]) -> Vec<u8> {
    tlv(tag::SEQUENCE, &children.concat())
}

/// SET OF already-encoded children. DER requires the element encodings in
/// ascending byte order.
pub fn set_of(children: &[Vec<u8>]) -> Vec<u8> {
    let mut sorted = children.to_vec();
    sorted.sort();
    tlv(tag::SET, &sorted.concat())
}

/// INTEGER from an unsigned big-endian magnitude, re-encoded minimally.
pub fn integer_unsigned(magnitude: &[u8]) -> Vec<u8> {
    let skip = magnitude.iter().take_while(|&&b| b == 0).count();
    let trimmed = &magnitude[skip..];
    let mut content = Vec::with_capacity(trimmed.len() + 1);
    match trimmed.first() {
        None => content.push(0),
        Some(&first) => {
            if first & 0x80 != 0 {
                // Keep the value positive.
                content.push(0);
            }
            content.extend_from_slice(trimmed);
        }
    }
    tlv(tag::INTEGER, &content)
}

/// INTEGER from a small non-negative value.
pub fn integer_u64(value: u64) -> Vec<u8> {
    integer_unsigned(&value.to_be_bytes())
}

/// BIT STRING with an explicit unused-bit count.
pub fn bit_string(unused_bits: u8, data: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(data.len() + 1);
    content.push(unused_bits);
    content.extend_from_slice(data);
    tlv(tag::BIT_STRING, &content)
}

/// OCTET STRING.
pub fn octet_string(data: &[u8]) -> Vec<u8> {
    tlv(tag::OCTET_STRING, data)
}

/// NULL.
pub fn null() -> Vec<u8> {
    tlv(tag::NULL, &[])
}

/// BOOLEAN; DER mandates 0xFF for TRUE.
pub fn boolean(value: bool) -> Vec<u8> {
    tlv(tag::BOOLEAN, &[if value { 0xff } else { 0x00 }])
}

/// OBJECT IDENTIFIER from its arc values.
pub fn oid(arcs: &[u64]) -> Vec<u8> {
    debug_assert!(arcs.len() >= 2, "an OID has at least two arcs");
    let mut content = Vec::new();
    content.push((arcs[0] * 40 + arcs[1]) as u8);
    for &arc in &arcs[2..] {
        push_base128(&mut content, arc);
    }
    tlv(tag::OBJECT_IDENTIFIER, &content)
}

fn push_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut stack = [0u8; 10];
    let mut i = 0;
    loop {
        stack[i] = (value & 0x7f) as u8;
        value >>= 7;
        i += 1;
        if value == 0 {
            break;
        }
    }
    while i > 1 {
        i -= 1;
        out.push(stack[i] | 0x80);
    }
    out.push(stack[0]);
}

/// UTCTime (`YYMMDDHHMMSSZ`). Valid for dates before 2050 per X.509.
pub fn utc_time(dt: chrono::DateTime<chrono::Utc>) -> Vec<u8> {
    let text = dt.format("%y%m%d%H%M%SZ").to_string();
    tlv(tag::UTC_TIME, text.as_bytes())
}

/// UTF8String.
pub fn utf8_string(s: &str) -> Vec<u8> {
    tlv(tag::UTF8_STRING, s.as_bytes())
}

/// PrintableString. The caller is responsible for using it only where the
/// restricted alphabet holds (country codes here).
pub fn printable_string(s: &str) -> Vec<u8> {
    tlv(tag::PRINTABLE_STRING, s.as_bytes())
}

/// IA5String (ASCII); SAN dNSName entries use this.
pub fn ia5_string(s: &str) -> Vec<u8> {
    tlv(tag::IA5_STRING, s.as_bytes())
}

/// Context-specific constructed tag `[n]` (EXPLICIT wrapping).
pub fn context_explicit(n: u8, inner: &[u8]) -> Vec<u8> {
    tlv(0xa0 | n, inner)
}

/// Context-specific primitive tag `[n]` (IMPLICIT re-tagging of content).
pub fn context_implicit(n: u8, content: &[u8]) -> Vec<u8> {
    tlv(0x80 | n, content)
}
