/*!

Decoding of the Amiga `RPck` archive format, used for the 3-d shape files
of 4-D Sports Driving.

The header is four magic bytes and two 32-bit big-endian lengths (final
and saved); the payload is a chain of signed control bytes. A negative
control copies that many literal bytes; a non-negative control repeats
the following byte `control + 1` times.

*/

use byteorder::{BigEndian, ByteOrder};

use crate::context::{Buffer, Context};
use crate::Error;

const MAGIC: [u8; 4] = *b"RPck";
const SIZE_MIN: usize = 14;

/// Check whether the buffer is an RPck archive: magic bytes present and
/// the length fields consistent with the buffer size.
pub(crate) fn is_valid(src: &Buffer) -> bool {
    let data = &src.data;
    if data.len() < SIZE_MIN || data[..4] != MAGIC {
        return false;
    }
    let final_len = BigEndian::read_u32(&data[4..8]);
    let saved_len = BigEndian::read_u32(&data[8..12]);
    final_len.wrapping_sub(saved_len).wrapping_add(SIZE_MIN as u32) as usize == data.len()
}

/// Decompress an RPck archive into the context's destination buffer.
pub(crate) fn decompress(ctx: &mut Context) -> Result<(), Error> {
    if ctx.src.len() < SIZE_MIN {
        return Err(Error::TruncatedHeader);
    }
    if ctx.src.data[..4] != MAGIC {
        return Err(Error::BadMagic);
    }
    ctx.src.offset += 4;

    let final_len = BigEndian::read_u32(&ctx.src.data[ctx.src.offset..]) as usize;
    ctx.src.offset += 4;
    let saved_len = BigEndian::read_u32(&ctx.src.data[ctx.src.offset..]) as usize;
    ctx.src.offset += 4;
    let src_len = ctx.src.len();
    ctx.diag(|| format!("final length  {}", final_len));
    ctx.diag(|| format!("saved length  {}", saved_len));
    ctx.diag(|| format!("source length {}", src_len));

    ctx.dst = Buffer::alloc(final_len);

    while ctx.src.offset < ctx.src.len() {
        let ctrl = ctx.src.data[ctx.src.offset] as i8;
        ctx.src.offset += 1;

        if ctrl < 0 {
            let count = usize::from(ctrl.unsigned_abs());
            if ctx.src.offset + count > ctx.src.len() {
                return Err(Error::SourceOverrun);
            }
            if ctx.dst.offset + count > ctx.dst.len() {
                return Err(Error::DestinationOverrun);
            }
            let from = ctx.src.offset;
            ctx.dst.data[ctx.dst.offset..ctx.dst.offset + count]
                .copy_from_slice(&ctx.src.data[from..from + count]);
            ctx.src.offset += count;
            ctx.dst.offset += count;
        } else {
            let value = ctx.src.next().ok_or(Error::SourceOverrun)?;
            let count = usize::from(ctrl as u8) + 1;
            if ctx.dst.offset + count > ctx.dst.len() {
                return Err(Error::DestinationOverrun);
            }
            ctx.dst.data[ctx.dst.offset..ctx.dst.offset + count].fill(value);
            ctx.dst.offset += count;
        }
    }

    Ok(())
}
