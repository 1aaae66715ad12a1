//! Inbound HDLC decoding.
//!
//! A [`Decoder`] turns the byte stream of one pipe into payload segments.
//! Bytes arrive in whatever pieces the transport hands over, so every
//! piece of a frame (start byte, header, payload, end byte) may be split
//! across calls. Payloads longer than [`MAX_RX_SIZE`] are cut into
//! segments of at most that size; only the last segment of a frame has
//! `last` set.

use std::mem;

use crate::error::DecodeError;
use crate::format::{Format, ProtocolVersion};
use crate::header::{END_BYTE, Header, MAX_HEADER_LEN, START_BYTE};

/// Largest receive buffer allocated for one segment.
pub const MAX_RX_SIZE: usize = 4096 - 512;

/// One piece of a decoded frame's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub data: Vec<u8>,
    /// First segment of its frame.
    pub first: bool,
    /// Final segment of its frame.
    pub last: bool,
}

#[derive(Default)]
enum State {
    /// Waiting for a start byte.
    #[default]
    Idle,
    /// Staging header bytes.
    Header {
        bytes: [u8; MAX_HEADER_LEN],
        have: usize,
    },
    /// Copying payload; `remaining == 0` means the end byte is next.
    Payload {
        header: Header,
        remaining: usize,
        /// Current receive buffer and the length at which it is handed off.
        chunk: Option<(Vec<u8>, usize)>,
        first: bool,
    },
}

/// Reassembly context for one inbound stream.
pub struct Decoder {
    format: Format,
    header_len: usize,
    version: ProtocolVersion,
    state: State,
}

impl Decoder {
    pub fn new(format: Format, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let header_len = Header::size_of(format).ok_or(DecodeError::Unframed(format))?;
        Ok(Self {
            format,
            header_len,
            version,
            state: State::Idle,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// True between a frame's start byte and its end byte.
    pub fn in_frame(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Feed `input`, handing every completed segment to `deliver`.
    ///
    /// On error the in-progress frame is dropped and the decoder waits for
    /// the next start byte; the rest of `input` is not examined.
    pub fn decode(
        &mut self,
        mut input: &[u8],
        mut deliver: impl FnMut(Segment),
    ) -> Result<(), DecodeError> {
        while !input.is_empty() {
            // Taking the state means any early return leaves us Idle.
            self.state = match mem::take(&mut self.state) {
                State::Idle => {
                    let byte = input[0];
                    if byte != START_BYTE {
                        return Err(DecodeError::Framing {
                            expected: START_BYTE,
                            found: byte,
                        });
                    }
                    input = &input[1..];
                    State::Header {
                        bytes: [0; MAX_HEADER_LEN],
                        have: 0,
                    }
                }
                State::Header {
                    mut bytes,
                    mut have,
                } => {
                    let n = (self.header_len - have).min(input.len());
                    bytes[have..have + n].copy_from_slice(&input[..n]);
                    have += n;
                    input = &input[n..];
                    if have < self.header_len {
                        State::Header { bytes, have }
                    } else {
                        self.begin_payload(&bytes)?
                    }
                }
                State::Payload {
                    header,
                    remaining: 0,
                    chunk,
                    first,
                } => {
                    let byte = input[0];
                    if byte != END_BYTE {
                        warn!(
                            format = ?self.format,
                            found = byte,
                            "frame terminator missing"
                        );
                        return Err(DecodeError::Framing {
                            expected: END_BYTE,
                            found: byte,
                        });
                    }
                    input = &input[1..];
                    trace!(format = ?self.format, len = header.declared_len(), "frame complete");
                    deliver(Segment {
                        header,
                        data: chunk.map(|(data, _)| data).unwrap_or_default(),
                        first,
                        last: true,
                    });
                    State::Idle
                }
                State::Payload {
                    header,
                    mut remaining,
                    chunk,
                    mut first,
                } => {
                    let (mut chunk, cap) = match chunk {
                        Some(chunk) => chunk,
                        None => {
                            let cap = remaining.min(MAX_RX_SIZE);
                            (alloc_chunk(cap)?, cap)
                        }
                    };
                    let n = (cap - chunk.len()).min(remaining).min(input.len());
                    chunk.extend_from_slice(&input[..n]);
                    remaining -= n;
                    input = &input[n..];

                    if remaining > 0 && chunk.len() == cap {
                        trace!(
                            format = ?self.format,
                            len = chunk.len(),
                            remaining,
                            "delivering partial segment"
                        );
                        deliver(Segment {
                            header,
                            data: chunk,
                            first,
                            last: false,
                        });
                        first = false;
                        State::Payload {
                            header,
                            remaining,
                            chunk: None,
                            first,
                        }
                    } else {
                        State::Payload {
                            header,
                            remaining,
                            chunk: Some((chunk, cap)),
                            first,
                        }
                    }
                }
            };
        }
        Ok(())
    }

    fn begin_payload(&self, bytes: &[u8]) -> Result<State, DecodeError> {
        let header = Header::parse(self.format, bytes, self.version)
            .ok_or(DecodeError::Unframed(self.format))?;
        let remaining = header.payload_len().ok_or(DecodeError::BadLength {
            declared: header.declared_len(),
            header: self.header_len,
        })?;
        trace!(format = ?self.format, ?header, remaining, "header decoded");
        Ok(State::Payload {
            header,
            remaining,
            chunk: None,
            first: true,
        })
    }
}

/// Allocate a receive buffer for `cap` bytes, failing instead of aborting.
fn alloc_chunk(cap: usize) -> Result<Vec<u8>, DecodeError> {
    let mut chunk = Vec::new();
    chunk
        .try_reserve_exact(cap)
        .map_err(|_| DecodeError::OutOfMemory)?;
    Ok(chunk)
}
