/*!

Run-length decoding of a Stunts container pass.

A pass payload nests two encodings that share one escape-code vocabulary
from the pass header. Sequence runs repeat a multi-byte pattern: the
pattern is bracketed by two occurrences of the sequence escape and
followed by a repetition count. Single-byte runs repeat one byte, with
the escape code's position in the header table selecting how the count is
stored (one byte, two bytes little-endian, or the position itself).

The sequence stage writes into a scratch buffer which then becomes the
input of the single-byte stage.

*/

use byteorder::{ByteOrder, LittleEndian};

use crate::context::{Buffer, Context};
use crate::{stunts, Error};

const ESC_LEN_MASK: u8 = 0x7F;
const ESC_LEN_MAX: u8 = 0x0A;
const NO_SEQUENCES: u8 = 0x80;

/// Position of the sequence escape in the escape-code table.
const SEQ_ESCAPE_INDEX: usize = 1;

/// Check if data at the given offset is a likely run-length header:
/// run-length type byte, zeroed reserved byte, and an escape-code count
/// between 1 and 10.
pub(crate) fn is_valid(data: &[u8], offset: usize) -> bool {
    let esc_count = match data.get(offset + 8) {
        Some(&ctrl) => ctrl & ESC_LEN_MASK,
        None => return false,
    };
    data.get(offset) == Some(&stunts::TYPE_RLE)
        && data.get(offset + 7) == Some(&0)
        && (1..=ESC_LEN_MAX).contains(&esc_count)
}

/// Decompress one run-length pass into the context's destination buffer.
pub(crate) fn decompress(ctx: &mut Context) -> Result<(), Error> {
    let src_len = stunts::read_len(&mut ctx.src)?;
    ctx.diag(|| format!("payload length {}", src_len));

    let reserved = ctx.src.next().ok_or(Error::TruncatedHeader)?;
    if reserved != 0 {
        ctx.warn(|| {
            format!(
                "reserved run-length header byte is {:#04X}, expected 0",
                reserved
            )
        });
    }

    let esc_ctrl = ctx.src.next().ok_or(Error::TruncatedHeader)?;
    let esc_count = esc_ctrl & ESC_LEN_MASK;
    let sequences = esc_ctrl & NO_SEQUENCES == 0;
    ctx.diag(|| format!("escape codes {} (sequences: {})", esc_count, sequences));
    if esc_count > ESC_LEN_MAX {
        return Err(Error::EscapeTableTooLong(esc_count));
    }

    let mut escapes = [0u8; ESC_LEN_MAX as usize];
    for slot in escapes.iter_mut().take(esc_count as usize) {
        *slot = ctx.src.next().ok_or(Error::TruncatedHeader)?;
    }
    ctx.diag(|| format!("escape table {:02X?}", &escapes[..esc_count as usize]));

    // Index by byte value; nonzero entries give the escape's one-based
    // position in the table.
    let mut lookup = [0u8; 256];
    for (i, &escape) in escapes.iter().take(esc_count as usize).enumerate() {
        lookup[escape as usize] = i as u8 + 1;
    }

    if sequences {
        if (esc_count as usize) <= SEQ_ESCAPE_INDEX {
            return Err(Error::TruncatedHeader);
        }
        decode_sequences(ctx, escapes[SEQ_ESCAPE_INDEX])?;

        // The sequence stage's output is the input of the single-byte
        // stage; the fresh destination keeps the declared pass length.
        let dst_len = ctx.dst.len();
        ctx.promote_dst();
        ctx.dst = Buffer::alloc(dst_len);
    }

    decode_runs(ctx, &lookup)
}

/// Expand sequence runs. The output length of this stage is discovered,
/// not declared; it may not exceed the pass output length.
fn decode_sequences(ctx: &mut Context, seq_escape: u8) -> Result<(), Error> {
    ctx.diag(|| "decoding sequence runs".to_string());
    let mut ticks = 0u8;

    while ctx.src.offset < ctx.src.len() {
        let cur = ctx.src.data[ctx.src.offset];
        ctx.src.offset += 1;

        if cur == seq_escape {
            let body_start = ctx.src.offset;
            loop {
                let byte = ctx
                    .src
                    .next()
                    .ok_or(Error::UnterminatedSequence(seq_escape))?;
                if byte == seq_escape {
                    break;
                }
                if ctx.src.offset >= ctx.src.len() {
                    return Err(Error::UnterminatedSequence(seq_escape));
                }
                ctx.dst.put(byte)?;
            }
            let body_end = ctx.src.offset - 1;
            let count = ctx.src.next().ok_or(Error::SourceOverrun)?;
            let (src_at, dst_at) = (ctx.src.offset, ctx.dst.offset);
            ctx.trace(|| {
                format!(
                    "{:6} {:6} sequence of {} byte(s) x {}",
                    src_at,
                    dst_at,
                    body_end - body_start,
                    count
                )
            });

            // The body was already written once while scanning for the
            // closing escape. A zero count wraps around to a huge repeat
            // count and runs the destination full.
            if body_end > body_start {
                let extra = u32::from(count).wrapping_sub(1);
                for _ in 0..extra {
                    for k in body_start..body_end {
                        let byte = ctx.src.data[k];
                        ctx.dst.put(byte)?;
                    }
                }
            }
        } else {
            ctx.dst.put(cur)?;
            let (src_at, dst_at) = (ctx.src.offset, ctx.dst.offset);
            ctx.trace(|| format!("{:6} {:6} {:02X}", src_at, dst_at, cur));
        }

        if ctx.src.offset * 100 / ctx.src.len() >= usize::from(ticks) * 25 {
            ctx.progress(ticks * 25);
            ticks += 1;
        }
    }

    Ok(())
}

/// Expand single-byte runs until the destination holds the declared pass
/// output length.
fn decode_runs(ctx: &mut Context, lookup: &[u8; 256]) -> Result<(), Error> {
    ctx.diag(|| "decoding single-byte runs".to_string());
    let mut ticks = 0u8;

    while ctx.dst.offset < ctx.dst.len() {
        let cur = ctx.src.next().ok_or(Error::SourceOverrun)?;

        match lookup[cur as usize] {
            0 => {
                ctx.dst.put(cur)?;
                let (src_at, dst_at) = (ctx.src.offset, ctx.dst.offset);
                ctx.trace(|| format!("{:6} {:6} {:02X}", src_at, dst_at, cur));
            }
            // One-byte repetition counter.
            1 => {
                let count = ctx.src.next().ok_or(Error::SourceOverrun)?;
                let value = ctx.src.next().ok_or(Error::SourceOverrun)?;
                repeat_byte(ctx, value, usize::from(count))?;
            }
            // Two-byte repetition counter.
            3 => {
                if ctx.src.remaining() < 3 {
                    return Err(Error::SourceOverrun);
                }
                let count = LittleEndian::read_u16(&ctx.src.data[ctx.src.offset..]);
                let value = ctx.src.data[ctx.src.offset + 2];
                ctx.src.offset += 3;
                repeat_byte(ctx, value, usize::from(count))?;
            }
            // Position n encodes n - 1 repetitions. Position 2 is the
            // sequence escape, which has no meaning in this stage and
            // falls through here.
            position => {
                let value = ctx.src.next().ok_or(Error::SourceOverrun)?;
                repeat_byte(ctx, value, usize::from(position) - 1)?;
            }
        }

        if ctx.src.offset * 100 / ctx.src.len() >= usize::from(ticks) * 25 {
            ctx.progress(ticks * 25);
            ticks += 1;
        }
    }

    let left = ctx.src.len().saturating_sub(ctx.src.offset);
    if left > 0 {
        ctx.warn(|| {
            format!(
                "run-length decoding finished with {} byte(s) left in source buffer",
                left
            )
        });
    }

    Ok(())
}

fn repeat_byte(ctx: &mut Context, value: u8, count: usize) -> Result<(), Error> {
    let (src_at, dst_at) = (ctx.src.offset, ctx.dst.offset);
    ctx.trace(|| format!("{:6} {:6} {:02X} x {}", src_at, dst_at, value, count));
    for _ in 0..count {
        ctx.dst.put(value)?;
    }
    Ok(())
}
