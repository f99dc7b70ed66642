//! Fixed-footprint record of chained error messages.
//!
//! Every [`Context`](crate::Context) embeds one [`ErrorChain`]. Each push appends
//! a formatted message to a shared text arena and records its span on a
//! fixed-depth stack, so the chain never allocates. When either bound runs out
//! the head is replaced by a terminal meta-message and earlier entries stay
//! untouched.

use std::fmt::{self, Write};

/// Bytes shared by all messages of one chain.
pub const ERROR_TEXT_CAPACITY: usize = 256;
/// Maximum number of messages one chain records.
pub const ERROR_STACK_DEPTH: usize = 16;

const NO_ROOM_FOR_MESSAGE: &str = "error chain found no room for message";
const NO_ROOM_FOR_ERRORS: &str = "error chain found no room for more errors";

/// Returned by [`ErrorChain::push`] once either bound is used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainExhausted;

pub struct ErrorChain {
    text: [u8; ERROR_TEXT_CAPACITY],
    text_len: usize,
    spans: [(u16, u16); ERROR_STACK_DEPTH],
    depth: usize,
    exhausted: Option<&'static str>,
}

impl ErrorChain {
    pub const fn new() -> Self {
        Self {
            text: [0; ERROR_TEXT_CAPACITY],
            text_len: 0,
            spans: [(0, 0); ERROR_STACK_DEPTH],
            depth: 0,
            exhausted: None,
        }
    }

    /// Appends a message. A message longer than the remaining arena is cut at a
    /// char boundary and fills it, so the push after it reports exhaustion.
    pub fn push(&mut self, message: fmt::Arguments<'_>) -> Result<(), ChainExhausted> {
        if self.text_len >= ERROR_TEXT_CAPACITY {
            self.exhausted = Some(NO_ROOM_FOR_MESSAGE);
            return Err(ChainExhausted);
        }
        if self.depth >= ERROR_STACK_DEPTH {
            self.exhausted = Some(NO_ROOM_FOR_ERRORS);
            return Err(ChainExhausted);
        }

        let start = self.text_len;
        let mut writer = ArenaWriter {
            buf: &mut self.text[start..],
            written: 0,
            truncated: false,
        };
        // ArenaWriter never reports an error; it truncates instead.
        let _ = writer.write_fmt(message);
        let (written, truncated) = (writer.written, writer.truncated);

        self.spans[self.depth] = (start as u16, (start + written) as u16);
        self.depth += 1;
        // One separator byte per message, like the NUL the arena used to carry.
        self.text_len = if truncated {
            ERROR_TEXT_CAPACITY
        } else {
            (start + written + 1).min(ERROR_TEXT_CAPACITY)
        };
        Ok(())
    }

    /// The most recent message, or the terminal meta-message once exhausted.
    pub fn head(&self) -> Option<&str> {
        if let Some(meta) = self.exhausted {
            return Some(meta);
        }
        self.depth.checked_sub(1).map(|last| self.entry(last))
    }

    /// Recorded messages, most recent first. Reverse it to walk from the deepest
    /// cause outwards.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator + '_ {
        (0..self.depth).rev().map(move |i| self.entry(i))
    }

    pub fn len(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.depth == 0 && self.exhausted.is_none()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.is_some()
    }

    pub fn clear(&mut self) {
        self.text_len = 0;
        self.depth = 0;
        self.exhausted = None;
    }

    fn entry(&self, index: usize) -> &str {
        let (start, end) = self.spans[index];
        // Spans always end on a char boundary, see ArenaWriter.
        std::str::from_utf8(&self.text[start as usize..end as usize]).unwrap_or_default()
    }
}

impl Default for ErrorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChain")
            .field("head", &self.head())
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

struct ArenaWriter<'a> {
    buf: &'a mut [u8],
    written: usize,
    truncated: bool,
}

impl Write for ArenaWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        let room = self.buf.len() - self.written;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.written..self.written + take].copy_from_slice(&s.as_bytes()[..take]);
        self.written += take;
        if take < s.len() {
            self.truncated = true;
        }
        Ok(())
    }
}
