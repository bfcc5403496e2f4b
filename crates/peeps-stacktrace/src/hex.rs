use std::error::Error;
use std::fmt;
use std::num::ParseIntError;

use crate::{MAX_FRAMES, StackTrace};

/// Width of one rendered address: `0x` plus two hex digits per pointer byte.
pub const HEX_FIELD_WIDTH: usize = 2 + 2 * std::mem::size_of::<usize>();

/// Buffer size that holds any trace rendered by [`StackTrace::to_hex`],
/// separators and terminator included.
pub const HEX_BUFFER_LEN: usize = MAX_FRAMES * (HEX_FIELD_WIDTH + 1) + 1;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug)]
pub enum ParseHexError {
    MissingPrefix { token: String },
    InvalidDigits { token: String, source: ParseIntError },
    TooManyFrames { count: usize },
}

impl fmt::Display for ParseHexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrefix { token } => {
                write!(f, "frame address {token:?} is missing the 0x prefix")
            }
            Self::InvalidDigits { token, source } => {
                write!(f, "frame address {token:?} is not valid hex: {source}")
            }
            Self::TooManyFrames { count } => write!(
                f,
                "hex trace has {count} frames; at most {MAX_FRAMES} fit in a stack trace"
            ),
        }
    }
}

impl Error for ParseHexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDigits { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn write_hex_field(value: usize, out: &mut [u8]) {
    out[0] = b'0';
    out[1] = b'x';
    let digits = &mut out[2..HEX_FIELD_WIDTH];
    let mut remaining = value;
    for slot in digits.iter_mut().rev() {
        *slot = HEX_DIGITS[remaining & 0xf];
        remaining >>= 4;
    }
}

impl StackTrace {
    /// Renders the frames as space-separated, fixed-width hex addresses and
    /// NUL-terminates the result.
    ///
    /// Frames that do not fit are dropped; the buffer is never overrun.
    /// Returns the number of bytes written before the terminator. An empty
    /// buffer is left untouched. Allocation-free.
    pub fn to_hex(&self, buf: &mut [u8]) -> usize {
        let Some(capacity) = buf.len().checked_sub(1) else {
            return 0;
        };

        let mut written = 0;
        for (i, &frame) in self.frames().iter().enumerate() {
            let separator = usize::from(i != 0);
            if written + separator + HEX_FIELD_WIDTH > capacity {
                break;
            }
            if separator == 1 {
                buf[written] = b' ';
                written += 1;
            }
            write_hex_field(frame, &mut buf[written..written + HEX_FIELD_WIDTH]);
            written += HEX_FIELD_WIDTH;
        }

        buf[written] = 0;
        written
    }

    pub fn to_hex_string(&self) -> String {
        let mut buf = [0u8; HEX_BUFFER_LEN];
        let len = self.to_hex(&mut buf);
        buf[..len].iter().map(|&b| char::from(b)).collect()
    }

    /// Parses the output of [`StackTrace::to_hex_string`].
    pub fn from_hex(text: &str) -> Result<Self, ParseHexError> {
        let tokens: Vec<&str> = text.split_ascii_whitespace().collect();
        if tokens.len() > MAX_FRAMES {
            return Err(ParseHexError::TooManyFrames {
                count: tokens.len(),
            });
        }

        let mut frames = Vec::with_capacity(tokens.len());
        for token in tokens {
            let digits = token
                .strip_prefix("0x")
                .ok_or_else(|| ParseHexError::MissingPrefix {
                    token: token.to_owned(),
                })?;
            let frame = usize::from_str_radix(digits, 16).map_err(|source| {
                ParseHexError::InvalidDigits {
                    token: token.to_owned(),
                    source,
                }
            })?;
            frames.push(frame);
        }

        Ok(Self::from_frames(&frames))
    }
}
