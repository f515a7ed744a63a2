//! Captive-portal DNS: every `A` question is answered with the portal address

use thiserror_no_std::Error;

const HEADER_LEN: usize = 12;
const ANSWER_LEN: usize = 16;
const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;
/// Seconds; short so clients re-resolve once they leave the portal network.
const ANSWER_TTL: u32 = 60;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsError {
    #[error("query shorter than its header or question")]
    Truncated,
    #[error("not a standard query")]
    NotAQuery,
    #[error("response buffer too small")]
    BufferTooSmall,
}

/// Build the answer to `query` in `out` and return its length.
///
/// Only the first question is answered. Questions other than `IN A` get an
/// empty answer section so the client falls back without waiting.
pub fn answer_query(query: &[u8], address: [u8; 4], out: &mut [u8]) -> Result<usize, DnsError> {
    if query.len() < HEADER_LEN {
        return Err(DnsError::Truncated);
    }
    let flags = u16::from_be_bytes([query[2], query[3]]);
    let question_count = u16::from_be_bytes([query[4], query[5]]);
    // QR set means a response; a non-zero opcode is not a standard query.
    if flags & 0x8000 != 0 || flags & 0x7800 != 0 || question_count == 0 {
        return Err(DnsError::NotAQuery);
    }

    let name_end = name_end(query, HEADER_LEN)?;
    let question_end = name_end + 4;
    let question = query
        .get(HEADER_LEN..question_end)
        .ok_or(DnsError::Truncated)?;
    let qtype = u16::from_be_bytes([query[name_end], query[name_end + 1]]);
    let qclass = u16::from_be_bytes([query[name_end + 2], query[name_end + 3]]);
    let answered = qtype == TYPE_A && qclass == CLASS_IN;

    let len = question_end + if answered { ANSWER_LEN } else { 0 };
    if out.len() < len {
        return Err(DnsError::BufferTooSmall);
    }

    out[0..2].copy_from_slice(&query[0..2]);
    // Response, authoritative, recursion desired copied, recursion available.
    let response_flags = 0x8400 | (flags & 0x0100) | 0x0080;
    out[2..4].copy_from_slice(&response_flags.to_be_bytes());
    out[4..6].copy_from_slice(&1u16.to_be_bytes());
    out[6..8].copy_from_slice(&u16::from(answered).to_be_bytes());
    out[8..12].fill(0);
    out[HEADER_LEN..question_end].copy_from_slice(question);

    if answered {
        let answer = &mut out[question_end..len];
        // Compressed name pointing back at the question.
        answer[0..2].copy_from_slice(&[0xC0, HEADER_LEN as u8]);
        answer[2..4].copy_from_slice(&TYPE_A.to_be_bytes());
        answer[4..6].copy_from_slice(&CLASS_IN.to_be_bytes());
        answer[6..10].copy_from_slice(&ANSWER_TTL.to_be_bytes());
        answer[10..12].copy_from_slice(&4u16.to_be_bytes());
        answer[12..16].copy_from_slice(&address);
    }

    Ok(len)
}

/// Offset just past the uncompressed name starting at `offset`.
fn name_end(packet: &[u8], mut offset: usize) -> Result<usize, DnsError> {
    loop {
        let label = *packet.get(offset).ok_or(DnsError::Truncated)? as usize;
        if label == 0 {
            return Ok(offset + 1);
        }
        // Questions never use compression pointers.
        if label & 0xC0 != 0 {
            return Err(DnsError::NotAQuery);
        }
        offset += 1 + label;
    }
}
