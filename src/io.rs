//! Coalesced buffered raw-mode I/O.
//!
//! Owns a fixed-capacity read buffer and write buffer over two descriptors.
//! The read buffer exposes speculative lookahead to the [`crate::automaton`]:
//! bytes pulled during a trie walk are counted in `pending`, not `used`, so a
//! caller can commit or discard them depending on whether the walk matched.

use std::io::{Read, Write};

use log::trace;

use crate::automaton::ByteSource;
use crate::terminfo::{OutputCap, TerminfoDatabase};

/// Size of both the read and write buffers.
pub const BUF_SIZE: usize = 4096;
const EOT: u8 = 0x04;

/// Buffered, preload-aware I/O over a read source and a write sink.
///
/// Generic over `R: Read` and `W: Write` so tests can drive the full read/
/// classify/render loop against in-memory byte sources (SPEC_FULL.md §10.4)
/// without a real tty.
pub struct BufferedIo<R, W> {
    read: R,
    write: W,

    rd_buf: [u8; BUF_SIZE],
    rd_count: usize,
    rd_used: usize,
    rd_pending: usize,

    wr_buf: [u8; BUF_SIZE],
    wr_count: usize,

    preload: Option<Vec<u8>>,
    preload_pos: usize,

    echo: bool,
}

impl<R: Read, W: Write> BufferedIo<R, W> {
    /// Bind descriptors and reset all cursors. `preload`, if set, is
    /// consumed exactly once, ahead of any real read.
    pub fn new(read: R, write: W, preload: Option<Vec<u8>>) -> Self {
        BufferedIo {
            read,
            write,
            rd_buf: [0; BUF_SIZE],
            rd_count: 0,
            rd_used: 0,
            rd_pending: 0,
            wr_buf: [0; BUF_SIZE],
            wr_count: 0,
            preload,
            preload_pos: 0,
            echo: true,
        }
    }

    /// Enable or disable automatic echo of writes (used by OBSCURED/OFF echo
    /// modes, where the session draws the line itself instead).
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Pull the next byte for the automaton, refilling from the descriptor
    /// (or the preload) as needed. Returns [`EOT`] on a closed/errored
    /// descriptor, matching the original C contract (P1 buffer discipline
    /// is maintained across every branch here).
    pub fn next_byte(&mut self) -> u8 {
        if self.rd_used == self.rd_count {
            let n = self.read_wrapper(0, BUF_SIZE);
            match n {
                Some(0) | None => return EOT,
                Some(n) => {
                    self.rd_count = n;
                    self.rd_used = 0;
                    self.rd_pending = 0;
                }
            }
        } else if self.rd_used + self.rd_pending == self.rd_count {
            // Lookahead ran off the end: compact the unconsumed pending tail
            // to offset 0 and top up the buffer.
            let tail_start = self.rd_used;
            let tail_len = self.rd_pending;
            self.rd_buf.copy_within(tail_start..tail_start + tail_len, 0);
            self.rd_count = tail_len;
            self.rd_used = 0;

            if let Some(n) = self.read_wrapper(self.rd_count, BUF_SIZE - self.rd_count) {
                self.rd_count += n;
            }
        }

        let byte = self.rd_buf[self.rd_used + self.rd_pending];
        self.rd_pending += 1;
        byte
    }

    /// Commit the bytes consumed speculatively since the last commit/discard
    /// (an automaton match).
    pub fn commit(&mut self) {
        self.rd_used += self.rd_pending;
        self.rd_pending = 0;
    }

    /// Discard the bytes consumed speculatively (an automaton no-match),
    /// then advance `used` by exactly one ordinary byte and return it.
    ///
    /// An empty trie pulls nothing at all before reporting no-match (see
    /// [`crate::automaton::Automaton::parse`]), so `rd_pending` can be zero
    /// here with no byte yet staged; that case pulls one fresh byte itself
    /// instead of reading stale buffer contents.
    pub fn discard_and_take_one(&mut self) -> u8 {
        if self.rd_pending == 0 {
            let byte = self.next_byte();
            self.commit();
            return byte;
        }
        self.rd_pending = 0;
        let byte = self.rd_buf[self.rd_used];
        self.rd_used += 1;
        byte
    }

    /// Serve a read request from the preload if one remains, else from the
    /// real descriptor. Returns `None` on a read error.
    fn read_wrapper(&mut self, dest_offset: usize, max: usize) -> Option<usize> {
        if let Some(preload) = &self.preload {
            let remaining = &preload[self.preload_pos..];
            if remaining.is_empty() {
                self.preload = None;
            } else {
                let take = remaining.len().min(max);
                self.rd_buf[dest_offset..dest_offset + take]
                    .copy_from_slice(&remaining[..take]);
                self.preload_pos += take;
                if self.preload_pos >= preload.len() {
                    self.preload = None;
                }
                return Some(take);
            }
        }

        match self.read.read(&mut self.rd_buf[dest_offset..dest_offset + max]) {
            Ok(n) => Some(n),
            Err(_) => None,
        }
    }

    /// Buffer `data` for output, flushing first if it would overflow, and
    /// bypassing the buffer entirely for payloads bigger than its capacity.
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        if !self.echo {
            return Ok(());
        }
        if self.wr_count + data.len() > BUF_SIZE {
            self.flush()?;
        }
        if data.len() > BUF_SIZE {
            self.write.write_all(data)?;
            return Ok(());
        }
        self.wr_buf[self.wr_count..self.wr_count + data.len()].copy_from_slice(data);
        self.wr_count += data.len();
        Ok(())
    }

    /// Write an output capability's escape sequence, or silently do nothing
    /// if the terminal lacks it.
    pub fn write_escape(&mut self, db: &TerminfoDatabase, id: OutputCap) -> std::io::Result<()> {
        if let Some(seq) = db.lookup_output(id) {
            let seq = seq.to_vec();
            self.write(&seq)?;
        }
        Ok(())
    }

    /// Flush the write buffer to the echo descriptor. Idempotent when empty.
    pub fn flush(&mut self) -> std::io::Result<()> {
        if self.wr_count == 0 {
            return Ok(());
        }
        trace!("flushing {} buffered bytes", self.wr_count);
        self.write.write_all(&self.wr_buf[..self.wr_count])?;
        self.wr_count = 0;
        Ok(())
    }

    /// Zero both buffers in place (secret hygiene for OBSCURED/OFF modes).
    pub fn wipe_buffers(&mut self) {
        self.rd_buf.fill(0);
        self.wr_buf.fill(0);
    }
}

impl<R: Read, W: Write> ByteSource for BufferedIo<R, W> {
    fn next_byte(&mut self) -> u8 {
        BufferedIo::next_byte(self)
    }
}
