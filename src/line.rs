//! In-memory line state and its six editing primitives.

use std::io::{Read, Write};

use crate::io::BufferedIo;
use crate::terminfo::{InputCap, OutputCap, TerminfoDatabase};

/// The line being edited: a byte buffer, a logical cursor, and a render
/// cursor tracking the terminal's physical column offset.
#[derive(Debug, Default)]
pub struct Line {
    pub buffer: Vec<u8>,
    pub cursor: usize,
    pub render_cursor: usize,
    pub dirty: bool,
}

impl Line {
    /// Start a line, empty at first: a non-empty `preload` does not go
    /// straight into `buffer` here. Per SPEC_FULL.md §4.5, preload bytes are
    /// fed through the buffered-I/O input path ahead of any real read, and
    /// flow into the buffer the ordinary way, one `insert_ascii` at a time,
    /// as the main loop classifies them. Only the initial `dirty` flag is
    /// set up front, matching the "surfaces on first editing action" note:
    /// the preload does not force an immediate render before the loop has
    /// even read its first byte.
    pub fn new(preload: Option<&[u8]>) -> Self {
        Line {
            dirty: preload.is_some_and(|p| !p.is_empty()),
            ..Line::default()
        }
    }

    /// Splice `bytes` in at the cursor and advance it.
    pub fn insert_ascii(&mut self, bytes: &[u8]) {
        self.buffer.splice(self.cursor..self.cursor, bytes.iter().copied());
        self.cursor += bytes.len();
        self.dirty = true;
    }

    /// Dispatch a matched escape identifier to its editing primitive.
    /// Unknown ids (there are none today, but future capability growth may
    /// add them) are silently ignored.
    pub fn apply_escape<R: Read, W: Write>(
        &mut self,
        id: InputCap,
        io: &mut BufferedIo<R, W>,
        db: &TerminfoDatabase,
    ) -> std::io::Result<()> {
        match id {
            InputCap::KeyLeft => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.render_cursor -= 1;
                    io.write_escape(db, OutputCap::CursorLeft)?;
                }
            }
            InputCap::KeyRight => {
                if self.cursor < self.buffer.len() {
                    self.cursor += 1;
                    self.render_cursor += 1;
                    io.write_escape(db, OutputCap::CursorRight)?;
                }
            }
            InputCap::KeyBackspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.delete_under_cursor();
                }
            }
            InputCap::KeyDelete => {
                self.delete_under_cursor();
            }
            InputCap::KeyHome => {
                for _ in 0..self.cursor {
                    io.write_escape(db, OutputCap::CursorLeft)?;
                }
                self.cursor = 0;
                self.render_cursor = 0;
            }
            InputCap::KeyEnd => {
                for _ in self.cursor..self.buffer.len() {
                    io.write_escape(db, OutputCap::CursorRight)?;
                }
                self.cursor = self.buffer.len();
                self.render_cursor = self.buffer.len();
            }
        }
        Ok(())
    }

    fn delete_under_cursor(&mut self) {
        if self.cursor < self.buffer.len() {
            self.buffer.remove(self.cursor);
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn harness() -> (BufferedIo<Cursor<Vec<u8>>, Vec<u8>>, TerminfoDatabase) {
        let io = BufferedIo::new(Cursor::new(Vec::new()), Vec::new(), None);
        let db = TerminfoDatabase::new();
        (io, db)
    }

    #[test]
    fn insert_ascii_splices_at_cursor_and_marks_dirty() {
        let mut line = Line::default();
        line.insert_ascii(b"ac");
        line.cursor = 1;
        line.insert_ascii(b"b");
        assert_eq!(line.buffer, b"abc");
        assert_eq!(line.cursor, 2);
        assert!(line.dirty);
    }

    #[test]
    fn preload_marks_initial_dirty_flag_only() {
        // The buffer itself starts empty; preload content arrives through
        // the I/O layer's interposition and is inserted the ordinary way.
        let line = Line::new(Some(b"hello"));
        assert_eq!(line.buffer, Vec::<u8>::new());
        assert_eq!(line.cursor, 0);
        assert!(line.dirty);
    }

    #[test]
    fn empty_preload_is_not_dirty() {
        let line = Line::new(Some(b""));
        assert!(!line.dirty);
        assert_eq!(line.buffer, Vec::<u8>::new());
    }

    #[test]
    fn key_left_right_move_cursor_at_bounds() {
        let (mut io, db) = harness();
        let mut line = Line::default();
        line.insert_ascii(b"ab");

        line.cursor = 0;
        line.render_cursor = 0;
        line.apply_escape(InputCap::KeyLeft, &mut io, &db).unwrap();
        assert_eq!(line.cursor, 0); // already at start: no-op

        line.apply_escape(InputCap::KeyRight, &mut io, &db).unwrap();
        assert_eq!(line.cursor, 1);
        line.apply_escape(InputCap::KeyRight, &mut io, &db).unwrap();
        assert_eq!(line.cursor, 2);
        line.apply_escape(InputCap::KeyRight, &mut io, &db).unwrap();
        assert_eq!(line.cursor, 2); // already at end: no-op
    }

    #[test]
    fn backspace_deletes_byte_before_cursor() {
        let (mut io, db) = harness();
        let mut line = Line::default();
        line.insert_ascii(b"abc");
        line.apply_escape(InputCap::KeyBackspace, &mut io, &db).unwrap();
        assert_eq!(line.buffer, b"ab");
        assert_eq!(line.cursor, 2);
    }

    #[test]
    fn backspace_scenario_2_matches_spec() {
        // stdin = "ab" + KEY_BACKSPACE + "c" -> final buffer "ac"
        let (mut io, db) = harness();
        let mut line = Line::default();
        line.insert_ascii(b"ab");
        line.apply_escape(InputCap::KeyBackspace, &mut io, &db).unwrap();
        line.insert_ascii(b"c");
        assert_eq!(line.buffer, b"ac");
    }

    #[test]
    fn delete_removes_byte_under_cursor_only_if_present() {
        let (mut io, db) = harness();
        let mut line = Line::default();
        line.insert_ascii(b"abc");
        line.cursor = 1;
        line.apply_escape(InputCap::KeyDelete, &mut io, &db).unwrap();
        assert_eq!(line.buffer, b"ac");

        line.cursor = line.buffer.len();
        line.apply_escape(InputCap::KeyDelete, &mut io, &db).unwrap();
        assert_eq!(line.buffer, b"ac"); // cursor at end: no-op
    }

    #[test]
    fn home_and_end_move_cursor_to_bounds() {
        let (mut io, db) = harness();
        let mut line = Line::default();
        line.insert_ascii(b"abcd");
        line.cursor = 2;
        line.render_cursor = 2;

        line.apply_escape(InputCap::KeyHome, &mut io, &db).unwrap();
        assert_eq!(line.cursor, 0);
        assert_eq!(line.render_cursor, 0);

        line.apply_escape(InputCap::KeyEnd, &mut io, &db).unwrap();
        assert_eq!(line.cursor, 4);
        assert_eq!(line.render_cursor, 4);
    }
}
