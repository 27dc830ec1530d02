/*!

Decoder context and buffer management.

A decode run owns at most two allocations: the current source and the
current destination. Between container passes the destination buffer is
promoted to be the next source (a move of the owned `Vec`), and the old
source allocation is dropped at that moment.

*/

use crate::{rpck, stunts, Error, Format, StuntsVersion};

/// A contiguous byte region with an advancing read/write cursor.
///
/// Used both as the source (read-only during a pass) and the destination
/// (write-only during a pass) of a decoder. The cursor never runs ahead
/// of the data, except for the Huffman bit reader which is allowed to
/// step one byte past the end (see [`Buffer::next_or_zero`]).
#[derive(Debug, Default)]
pub struct Buffer {
    pub(crate) data: Vec<u8>,
    pub(crate) offset: usize,
}

impl Buffer {
    pub(crate) fn from_vec(data: Vec<u8>) -> Buffer {
        Buffer { data, offset: 0 }
    }

    /// A zero-filled buffer of the given length with the cursor at zero.
    pub(crate) fn alloc(len: usize) -> Buffer {
        Buffer {
            data: vec![0; len],
            offset: 0,
        }
    }

    /// Length of the underlying byte region.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// Read one byte and advance, or `None` at the end of the region.
    pub(crate) fn next(&mut self) -> Option<u8> {
        let byte = self.data.get(self.offset).copied();
        if byte.is_some() {
            self.offset += 1;
        }
        byte
    }

    /// Read one byte and advance unconditionally. Past the end this
    /// yields zero while the cursor keeps moving; the Huffman decoder
    /// faults only if output is still due after such a read.
    pub(crate) fn next_or_zero(&mut self) -> u8 {
        let byte = self.data.get(self.offset).copied().unwrap_or(0);
        self.offset += 1;
        byte
    }

    /// Append one byte at the cursor.
    pub(crate) fn put(&mut self, byte: u8) -> Result<(), Error> {
        if self.offset < self.data.len() {
            self.data[self.offset] = byte;
            self.offset += 1;
            Ok(())
        } else {
            Err(Error::DestinationOverrun)
        }
    }
}

/// A structured diagnostic event delivered to the context's sink.
///
/// The verbosity level of the context decides which events are emitted;
/// see [`Context::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Informational message (pass announcements, header diagnostics,
    /// per-symbol traces).
    Info(String),
    /// Recoverable oddity in the input; decoding continues.
    Warn(String),
    /// Fatal diagnostic. Also reported through the `Err` return value of
    /// [`Context::decompress`].
    Error(String),
    /// Coarse completion ticker for the running decode stage.
    Progress {
        /// Completion of the stage, 0–100.
        percent: u8,
    },
}

/// Sink receiving [`Event`]s from a decode run.
pub type EventSink = Box<dyn FnMut(Event)>;

/// A decompression run over one source buffer.
///
/// The context owns the source and destination buffers for the whole
/// run. Both allocations are released when the context is dropped.
pub struct Context {
    pub(crate) src: Buffer,
    pub(crate) dst: Buffer,
    pub(crate) format: Format,
    verbosity: u8,
    sink: Option<EventSink>,
}

impl Context {
    /// Create a context for the given format selection.
    ///
    /// Verbosity gates the events delivered to `sink`: 0 is silent, 1
    /// adds progress and warnings, 2 adds per-pass diagnostics, 3 adds
    /// per-symbol traces (and drops the progress ticker).
    pub fn new(format: Format, verbosity: u8, sink: Option<EventSink>) -> Context {
        Context {
            src: Buffer::default(),
            dst: Buffer::default(),
            format,
            verbosity,
            sink,
        }
    }

    /// Hand the compressed bytes to the context, which owns them from
    /// here on.
    pub fn set_source(&mut self, data: Vec<u8>) {
        self.src = Buffer::from_vec(data);
    }

    /// Classify the source buffer.
    ///
    /// Only an `Auto` format selection is refined; the answer is cached
    /// in the context, so later calls (and [`Context::decompress`]) see
    /// the same decision. Stunts has no magic bytes, so classification
    /// validates header fields rather than matching an identifier.
    pub fn detect_format(&mut self) -> Format {
        if let Format::Auto = self.format {
            self.format = if rpck::is_valid(&self.src) {
                Format::Rpck
            } else if self.src.data.get(1) == Some(&0xFB) {
                Format::Eac
            } else if stunts::is_valid(&self.src) {
                Format::Stunts {
                    version: StuntsVersion::Auto,
                    max_passes: 0,
                }
            } else {
                Format::Unknown
            };
        }
        self.format
    }

    /// Decode the source buffer into a freshly allocated output buffer.
    ///
    /// On success the decoded bytes are available through
    /// [`Context::output`] or [`Context::take_output`].
    pub fn decompress(&mut self) -> Result<(), Error> {
        let result = match self.detect_format() {
            Format::Stunts { .. } => stunts::decompress(self),
            Format::Rpck => rpck::decompress(self),
            Format::Auto | Format::Eac | Format::Unknown => Err(Error::UnknownFormat),
        };
        if let Err(err) = &result {
            let line = err.to_string();
            self.error(|| line);
        }
        result
    }

    /// The decoded bytes. Valid after a successful
    /// [`Context::decompress`].
    pub fn output(&self) -> &[u8] {
        &self.dst.data
    }

    /// Move the decoded bytes out of the context.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.dst).data
    }

    /// Make the destination the source for the next stage, dropping the
    /// old source allocation. The promoted buffer is trimmed to the
    /// bytes actually written and both cursors restart at zero.
    pub(crate) fn promote_dst(&mut self) {
        self.dst.data.truncate(self.dst.offset);
        self.src = std::mem::take(&mut self.dst);
        self.src.offset = 0;
    }

    pub(crate) fn info(&mut self, message: impl FnOnce() -> String) {
        if self.verbosity >= 1 {
            self.emit(Event::Info(message()));
        }
    }

    pub(crate) fn warn(&mut self, message: impl FnOnce() -> String) {
        if self.verbosity >= 1 {
            self.emit(Event::Warn(message()));
        }
    }

    pub(crate) fn error(&mut self, message: impl FnOnce() -> String) {
        if self.verbosity >= 1 {
            self.emit(Event::Error(message()));
        }
    }

    /// Per-pass diagnostics (header fields, code tables).
    pub(crate) fn diag(&mut self, message: impl FnOnce() -> String) {
        if self.verbosity >= 2 {
            self.emit(Event::Info(message()));
        }
    }

    /// Per-symbol trace output.
    pub(crate) fn trace(&mut self, message: impl FnOnce() -> String) {
        if self.verbosity >= 3 {
            self.emit(Event::Info(message()));
        }
    }

    /// Progress ticker; suppressed at trace verbosity, where the traces
    /// themselves show the offsets.
    pub(crate) fn progress(&mut self, percent: u8) {
        if self.verbosity == 1 || self.verbosity == 2 {
            self.emit(Event::Progress { percent });
        }
    }

    fn emit(&mut self, event: Event) {
        if let Some(sink) = self.sink.as_mut() {
            sink(event);
        }
    }
}
