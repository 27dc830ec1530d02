/*!

Driver for the Stunts / 4-D Sports Driving resource container.

The container has no magic bytes. A resource is either a single pass or a
chain of two passes, where the output of the first pass is the compressed
input of the second. Every pass is prefixed by a type byte (1 run-length,
2 Huffman) and a 24-bit little-endian output length.

Files written by Brøderbund Stunts 1.0 store the Huffman bit stream with
reversed bytes. Nothing in the header says which dialect a file uses, so
decoding starts with the 1.1 bit order and retries a Huffman pass with the
1.0 order when the result fails validation.

*/

use byteorder::{ByteOrder, LittleEndian};

use crate::context::{Buffer, Context};
use crate::{huff, rle, Error, Format, StuntsVersion};

const SIZE_MIN: usize = 0x10;
const SIZE_MAX: usize = 0xFF_FFFF;
const PASSES_MASK: u8 = 0x7F;
const PASSES_RECUR: u8 = 0x80;

pub(crate) const TYPE_RLE: u8 = 0x01;
pub(crate) const TYPE_HUFF: u8 = 0x02;

/// Peek at a 24-bit little-endian length field.
pub(crate) fn peek_len(data: &[u8], offset: usize) -> usize {
    LittleEndian::read_u24(&data[offset..offset + 3]) as usize
}

/// Read a 24-bit little-endian length field and advance the cursor.
pub(crate) fn read_len(buf: &mut Buffer) -> Result<usize, Error> {
    if buf.remaining() < 3 {
        return Err(Error::TruncatedHeader);
    }
    let len = peek_len(&buf.data, buf.offset);
    buf.offset += 3;
    Ok(len)
}

/// Check whether the buffer holds legal combinations of container header
/// values. There is no identifier to match, so this is what format
/// detection has to go on.
pub(crate) fn is_valid(src: &Buffer) -> bool {
    let data = &src.data;
    if data.len() < SIZE_MIN || data.len() > SIZE_MAX {
        return false;
    }

    let total_len = peek_len(data, 2);
    if total_len < SIZE_MIN.max(data.len() - SIZE_MIN) {
        return false;
    }

    if data[0] & PASSES_RECUR != 0 {
        // A sane multi-pass file has two passes, a total length beyond the
        // first pass' length, and a first pass with a plausible sub-header.
        let passes = data[0] & PASSES_MASK;
        let pass_len = peek_len(data, 5);
        passes == 2
            && total_len > pass_len
            && pass_len > SIZE_MIN.max(data.len() - SIZE_MIN)
            && (rle::is_valid(data, 4) || huff::is_valid(data, 4))
    } else {
        rle::is_valid(data, 0) || huff::is_valid(data, 0)
    }
}

/// Decompress every pass of the container in the context's source buffer.
pub(crate) fn decompress(ctx: &mut Context) -> Result<(), Error> {
    let (configured_version, max_passes) = match ctx.format {
        Format::Stunts {
            version,
            max_passes,
        } => (version, max_passes),
        _ => (StuntsVersion::Auto, 0),
    };
    ctx.diag(|| format!("version    {}", configured_version));

    let mut passes = *ctx.src.data.get(ctx.src.offset).ok_or(Error::TruncatedHeader)?;
    if passes & PASSES_RECUR != 0 {
        ctx.src.offset += 1;
        passes &= PASSES_MASK;
        let final_len = read_len(&mut ctx.src)?;
        let src_len = ctx.src.len();
        ctx.diag(|| format!("passes     {}", passes));
        ctx.diag(|| format!("final len  {}", final_len));
        ctx.diag(|| format!("source len {}", src_len));
        ctx.diag(|| format!("ratio      {:.2}", final_len as f32 / src_len as f32));
    } else {
        passes = 1;
    }

    for i in 0..passes {
        let pass_type = ctx.src.next().ok_or(Error::TruncatedHeader)?;
        let dst_len = read_len(&mut ctx.src)?;
        ctx.diag(|| format!("pass output length {}", dst_len));
        ctx.dst = Buffer::alloc(dst_len);

        let result = match pass_type {
            TYPE_RLE => {
                ctx.info(|| format!("pass {}/{}: run-length encoding", i + 1, passes));
                rle::decompress(ctx)
            }
            TYPE_HUFF => {
                ctx.info(|| format!("pass {}/{}: Huffman coding", i + 1, passes));
                let pass_start = ctx.src.offset;
                let mut result = huff::decompress(ctx, configured_version);

                // With the dialect on auto, judge whether this was really a
                // Stunts 1.0 bit stream: the pass failed outright, or it
                // finished the last pass with source bytes to spare, or the
                // next pass' input does not start with a run-length header.
                let retry = configured_version == StuntsVersion::Auto
                    && (match &result {
                        Err(Error::DataLeft(_)) => i == passes - 1,
                        Err(_) => true,
                        Ok(()) => false,
                    } || (i < passes - 1 && !looks_like_rle(&ctx.dst)));
                if retry {
                    ctx.warn(|| {
                        "Huffman decoding with the Stunts 1.1 bit stream format failed, \
                         retrying with the Stunts 1.0 format"
                            .to_string()
                    });
                    ctx.src.offset = pass_start;
                    ctx.dst.offset = 0;
                    result = huff::decompress(ctx, StuntsVersion::V1_0);
                }

                // Leftover source bytes feed the dialect heuristic above but
                // are not an error: SDTITL.PVS from Stunts 1.1 carries 95
                // bytes of trailing random data.
                if let Err(Error::DataLeft(_)) = result {
                    result = Ok(());
                }
                result
            }
            other => Err(Error::BadPassType(other)),
        };
        result?;

        if i + 1 == max_passes && passes != max_passes {
            ctx.info(|| format!("stopping after {} decompression pass(es)", max_passes));
            return Ok(());
        }

        // Destination buffer is source for the next pass.
        if i < passes - 1 {
            ctx.promote_dst();
        }
    }

    Ok(())
}

/// Whether a decoded buffer plausibly starts with a run-length pass
/// header for the following pass.
fn looks_like_rle(buf: &Buffer) -> bool {
    buf.data.first() == Some(&TYPE_RLE) && buf.data.get(7) == Some(&0)
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::context::Event;
    use crate::{Context, Error, Format, StuntsVersion};

    fn write_len(out: &mut Vec<u8>, len: usize) {
        out.push((len & 0xFF) as u8);
        out.push(((len >> 8) & 0xFF) as u8);
        out.push(((len >> 16) & 0xFF) as u8);
    }

    // Huffman sub-header and bit stream over a fixed five-symbol alphabet
    // of three-bit codes, optionally with reversed stream bytes as written
    // by Stunts 1.0.
    fn huff_pass(payload: &[u8], reverse: bool) -> Vec<u8> {
        let alphabet = [0x00, 0x41, 0x01, 0x05, 0x80];
        let mut stream = Vec::new();
        let mut cur = 0u8;
        let mut used = 0u8;
        for &byte in payload {
            let code = alphabet.iter().position(|&s| s == byte).unwrap() as u8;
            for i in (0..3).rev() {
                cur = (cur << 1) | ((code >> i) & 1);
                used += 1;
                if used == 8 {
                    stream.push(cur);
                    cur = 0;
                    used = 0;
                }
            }
        }
        if used > 0 {
            stream.push(cur << (8 - used));
        }
        if reverse {
            for byte in stream.iter_mut() {
                *byte = byte.reverse_bits();
            }
        }

        let mut pass = vec![0x03, 0, 0, 5];
        pass.extend_from_slice(&alphabet);
        pass.extend_from_slice(&stream);
        pass
    }

    // Second-pass input: a run-length pass header plus a payload with no
    // escape codes. Uses only bytes covered by the huff_pass alphabet.
    fn rle_blob() -> Vec<u8> {
        let mut blob = vec![TYPE_RLE];
        write_len(&mut blob, 5);
        write_len(&mut blob, 5);
        blob.push(0x00);
        blob.push(0x80);
        blob.extend_from_slice(&[0x41; 5]);
        blob
    }

    fn two_pass_container(reverse: bool) -> Vec<u8> {
        let blob = rle_blob();
        let pass1 = huff_pass(&blob, reverse);
        let mut data = vec![0x82];
        write_len(&mut data, 5);
        data.push(TYPE_HUFF);
        write_len(&mut data, blob.len());
        data.extend_from_slice(&pass1);
        data
    }

    fn context_with_log(format: Format) -> (Context, Rc<RefCell<Vec<Event>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let tap = Rc::clone(&log);
        let ctx = Context::new(
            format,
            1,
            Some(Box::new(move |event| tap.borrow_mut().push(event))),
        );
        (ctx, log)
    }

    fn has_retry_warning(log: &[Event]) -> bool {
        log.iter()
            .any(|event| matches!(event, Event::Warn(msg) if msg.contains("retrying")))
    }

    #[test]
    fn detects_rpck() {
        let data = vec![
            b'R', b'P', b'c', b'k', 0, 0, 0, 5, 0, 0, 0, 2, 0xFE, b'A', b'B', 0x02, b'Z',
        ];
        let mut ctx = Context::new(Format::Auto, 0, None);
        ctx.set_source(data);
        assert_eq!(ctx.detect_format(), Format::Rpck);
    }

    #[test]
    fn detects_eac() {
        let mut ctx = Context::new(Format::Auto, 0, None);
        ctx.set_source(vec![0x10, 0xFB, 0, 0]);
        assert_eq!(ctx.detect_format(), Format::Eac);
        assert_eq!(ctx.decompress(), Err(Error::UnknownFormat));
    }

    #[test]
    fn detects_multi_pass_container() {
        // Two passes, total length beyond the pass length, and a valid
        // run-length sub-header at offset 4.
        let mut data = vec![0x82, 0x00, 0x00, 0x00];
        data.push(TYPE_RLE);
        write_len(&mut data, 100);
        write_len(&mut data, 90);
        data.push(0x00); // reserved
        data.push(0x02); // escape count
        data.extend_from_slice(&[0; 11]);
        let mut ctx = Context::new(Format::Auto, 0, None);
        ctx.set_source(data);
        assert_eq!(ctx.detect_format(), Format::stunts());
    }

    #[test]
    fn rejects_three_pass_container() {
        let mut data = vec![0x83, 0x00, 0x00, 0x00];
        data.push(TYPE_RLE);
        write_len(&mut data, 100);
        write_len(&mut data, 90);
        data.push(0x00);
        data.push(0x02);
        data.extend_from_slice(&[0; 11]);
        let mut ctx = Context::new(Format::Auto, 0, None);
        ctx.set_source(data);
        assert_eq!(ctx.detect_format(), Format::Unknown);
    }

    #[test]
    fn rejects_short_buffer() {
        let mut ctx = Context::new(Format::Auto, 0, None);
        ctx.set_source(vec![0x01; 8]);
        assert_eq!(ctx.detect_format(), Format::Unknown);
    }

    #[test]
    fn two_pass_decode() {
        let (mut ctx, log) = context_with_log(Format::stunts());
        ctx.set_source(two_pass_container(false));
        ctx.decompress().unwrap();
        assert_eq!(ctx.output(), &[0x41; 5]);
        assert!(!has_retry_warning(&log.borrow()));
    }

    #[test]
    fn dialect_fallback_retries_with_reversed_bits() {
        let (mut ctx, log) = context_with_log(Format::stunts());
        ctx.set_source(two_pass_container(true));
        ctx.decompress().unwrap();
        assert_eq!(ctx.output(), &[0x41; 5]);
        assert!(has_retry_warning(&log.borrow()));
    }

    #[test]
    fn pinned_dialect_decodes_without_retry() {
        let (mut ctx, log) = context_with_log(Format::Stunts {
            version: StuntsVersion::V1_0,
            max_passes: 0,
        });
        ctx.set_source(two_pass_container(true));
        ctx.decompress().unwrap();
        assert_eq!(ctx.output(), &[0x41; 5]);
        assert!(!has_retry_warning(&log.borrow()));
    }

    #[test]
    fn max_passes_stops_early() {
        let mut ctx = Context::new(
            Format::Stunts {
                version: StuntsVersion::Auto,
                max_passes: 1,
            },
            0,
            None,
        );
        ctx.set_source(two_pass_container(false));
        ctx.decompress().unwrap();
        // The intermediate buffer is the compressed input of the skipped
        // second pass.
        assert_eq!(ctx.take_output(), rle_blob());
    }

    #[test]
    fn trailing_bytes_demoted_to_success() {
        let mut pass1 = huff_pass(&[0x41], false);
        pass1.extend_from_slice(&[0xEE, 0xEE]);
        let mut data = vec![TYPE_HUFF];
        write_len(&mut data, 1);
        data.extend_from_slice(&pass1);

        let (mut ctx, log) = context_with_log(Format::Stunts {
            version: StuntsVersion::V1_1,
            max_passes: 0,
        });
        ctx.set_source(data);
        ctx.decompress().unwrap();
        assert_eq!(ctx.output(), &[0x41]);
        assert!(log
            .borrow()
            .iter()
            .any(|event| matches!(event, Event::Warn(msg) if msg.contains("left in source"))));
    }

    #[test]
    fn bad_pass_type_is_fatal() {
        let mut data = vec![0x03];
        write_len(&mut data, 1);
        data.extend_from_slice(&[0; 4]);
        let mut ctx = Context::new(Format::stunts(), 0, None);
        ctx.set_source(data);
        assert_eq!(ctx.decompress(), Err(Error::BadPassType(0x03)));
    }

    #[test]
    fn truncated_header_is_fatal() {
        let mut ctx = Context::new(Format::stunts(), 0, None);
        ctx.set_source(vec![0x82, 0x05]);
        assert_eq!(ctx.decompress(), Err(Error::TruncatedHeader));
    }
}
