//! Terminfo database discovery and byte-exact binary parsing.
//!
//! Reference: `term(5)`. Only the handful of capability strings the editor
//! needs are extracted; the rest of the compiled entry is skipped over.

use std::env;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::error::SystemError;
use crate::fastpath;

/// Terminfo input capabilities the editor recognizes, in a fixed order
/// matching the `input_seq_indices` column table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum InputCap {
    KeyLeft = 0,
    KeyRight = 1,
    KeyBackspace = 2,
    KeyHome = 3,
    KeyEnd = 4,
    KeyDelete = 5,
}

impl InputCap {
    pub(crate) const ALL: [InputCap; 6] = [
        InputCap::KeyLeft,
        InputCap::KeyRight,
        InputCap::KeyBackspace,
        InputCap::KeyHome,
        InputCap::KeyEnd,
        InputCap::KeyDelete,
    ];
}

/// Terminfo output capabilities the editor emits, in a fixed order matching
/// the `output_seq_indices` column table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum OutputCap {
    CursorLeft = 0,
    CursorRight = 1,
    KeypadLocal = 2,
    KeypadXmit = 3,
}

/// Count of [`InputCap`] variants.
pub const INPUT_COUNT: usize = 6;
/// Count of [`OutputCap`] variants.
pub const OUTPUT_COUNT: usize = 4;

/// Column indices into the terminfo "strings" table, lifted from the ncurses
/// `include/Caps` table. Order matches [`InputCap`].
const INPUT_SEQ_INDICES: [u16; INPUT_COUNT] = [79, 83, 55, 76, 164, 59];
/// Column indices into the terminfo "strings" table. Order matches [`OutputCap`].
const OUTPUT_SEQ_INDICES: [u16; OUTPUT_COUNT] = [14, 17, 88, 89];

const MAGIC_INT16: u16 = 0o432;
const MAGIC_INT32: u16 = 0o1036;

/// Compile-time system terminfo search locations, tried in order after
/// `$TERMINFO`, `$HOME/.terminfo`, and `$TERMINFO_DIRS`.
const SYSTEM_DB_PATHS: [&str; 5] = [
    "/etc/terminfo",
    "/lib/terminfo",
    "/usr/share/etc/terminfo",
    "/usr/share/misc/terminfo",
    "/usr/share/terminfo",
];

/// A loaded terminfo capability table.
///
/// Per the REDESIGN notes, this is an owned value rather than a set of
/// process-wide statics: caching is local to the database instance, so two
/// independently constructed databases never race over the same cache.
#[derive(Debug, Default)]
pub struct TerminfoDatabase {
    attempted: bool,
    loaded: bool,
    inputs: [Option<Vec<u8>>; INPUT_COUNT],
    outputs: [Option<Vec<u8>>; OUTPUT_COUNT],
}

impl TerminfoDatabase {
    /// Construct an empty, unloaded database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `$TERM` and load its capability strings. Idempotent: only the
    /// first call performs discovery and parsing (P6).
    pub fn load(&mut self) -> Result<(), SystemError> {
        if self.attempted {
            return if self.loaded {
                Ok(())
            } else {
                Err(SystemError::Terminfo)
            };
        }
        self.attempted = true;

        let term = match env::var("TERM") {
            Ok(t) if !t.is_empty() => t,
            _ => {
                warn!("TERM is unset or empty; terminfo load failed");
                return Err(SystemError::Terminfo);
            }
        };

        if term.contains("xterm") {
            debug!("xterm fastpath installed for TERM={term}");
            fastpath::install_xterm(&mut self.inputs, &mut self.outputs);
        }

        let path = match find_entry(&term) {
            Some(p) => p,
            None => {
                debug!("no terminfo entry found for TERM={term}");
                return Err(SystemError::Terminfo);
            }
        };

        let file = File::open(&path)?;
        match parse(file, &mut self.inputs, &mut self.outputs) {
            Ok(()) => {
                self.loaded = true;
                debug!("terminfo loaded from {}", path.display());
                Ok(())
            }
            Err(e) => {
                warn!("terminfo parse failed for {}: {e}", path.display());
                Err(SystemError::Terminfo)
            }
        }
    }

    /// Look up an input capability's raw byte sequence.
    ///
    /// Returns `None` before a successful [`Self::load`], or if the terminal
    /// has no such capability.
    pub fn lookup_input(&self, id: InputCap) -> Option<&[u8]> {
        self.inputs[id as usize].as_deref()
    }

    /// Look up an output capability's raw byte sequence.
    pub fn lookup_output(&self, id: OutputCap) -> Option<&[u8]> {
        self.outputs[id as usize].as_deref()
    }

    /// Construct an already-"loaded" database from explicit capability
    /// strings, bypassing discovery and parsing. Only exposed to tests in
    /// this crate, so other modules (the automaton, buffered I/O) can be
    /// exercised without a real terminfo database or `$TERM` on the test
    /// machine.
    #[cfg(test)]
    pub(crate) fn from_parts(
        inputs: [Option<Vec<u8>>; INPUT_COUNT],
        outputs: [Option<Vec<u8>>; OUTPUT_COUNT],
    ) -> Self {
        TerminfoDatabase {
            attempted: true,
            loaded: true,
            inputs,
            outputs,
        }
    }
}

/// Walk the discovery order in §4.1, returning the first path that exists.
fn find_entry(term: &str) -> Option<PathBuf> {
    let first_letter = term.chars().next()?;

    if let Ok(dir) = env::var("TERMINFO") {
        if let Some(p) = try_path(&dir, first_letter, term) {
            return Some(p);
        }
    }

    if let Ok(home) = env::var("HOME") {
        let dir = format!("{home}/.terminfo");
        if let Some(p) = try_path(&dir, first_letter, term) {
            return Some(p);
        }
    }

    if let Ok(dirs) = env::var("TERMINFO_DIRS") {
        for dir in dirs.split(':') {
            if dir.is_empty() {
                continue;
            }
            if let Some(p) = try_path(dir, first_letter, term) {
                return Some(p);
            }
        }
    }

    for dir in SYSTEM_DB_PATHS {
        if let Some(p) = try_path(dir, first_letter, term) {
            return Some(p);
        }
    }

    None
}

fn try_path(dir: &str, first_letter: char, term: &str) -> Option<PathBuf> {
    let path = Path::new(dir).join(first_letter.to_string()).join(term);
    trace!("probing terminfo path {}", path.display());
    if path.is_file() {
        Some(path)
    } else {
        None
    }
}

/// Parse a compiled terminfo entry, filling only the columns this crate
/// cares about. Byte-exact per `term(5)`; see SPEC_FULL.md §4.1.
fn parse(
    mut r: impl Read + Seek,
    inputs: &mut [Option<Vec<u8>>; INPUT_COUNT],
    outputs: &mut [Option<Vec<u8>>; OUTPUT_COUNT],
) -> io::Result<()> {
    let mut header = [0u8; 12];
    r.read_exact(&mut header)?;
    let words: Vec<u16> = header
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let (magic, names_size, bools_size, numbers_count, strings_count, table_size) =
        (words[0], words[1], words[2], words[3], words[4], words[5]);

    let number_size: u64 = match magic {
        MAGIC_INT16 => 2,
        MAGIC_INT32 => 4,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unrecognized terminfo magic",
            ))
        }
    };

    let mut string_start = u64::from(names_size) + u64::from(bools_size);
    if string_start % 2 == 1 {
        string_start += 1;
    }
    string_start += number_size * u64::from(numbers_count);

    r.seek(SeekFrom::Current(string_start as i64))?;

    let mut offset_bytes = vec![0u8; 2 * strings_count as usize];
    r.read_exact(&mut offset_bytes)?;
    let offsets: Vec<i16> = offset_bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    let mut table = vec![0u8; table_size as usize];
    r.read_exact(&mut table)?;

    // A capability this entry doesn't define leaves `slot` untouched, so a
    // fastpath default installed before this call survives (SPEC_FULL.md
    // "Fastpath": "a subsequent successful parse overrides any unset slots").
    for (slot, &col) in inputs.iter_mut().zip(INPUT_SEQ_INDICES.iter()) {
        if let Some(seq) = extract(&offsets, &table, col) {
            *slot = Some(seq);
        }
    }
    for (slot, &col) in outputs.iter_mut().zip(OUTPUT_SEQ_INDICES.iter()) {
        if let Some(seq) = extract(&offsets, &table, col) {
            *slot = Some(seq);
        }
    }

    Ok(())
}

/// Pull the null-terminated string at `offsets[col]` out of `table`, if any.
fn extract(offsets: &[i16], table: &[u8], col: u16) -> Option<Vec<u8>> {
    let offset = *offsets.get(col as usize)?;
    if offset < 0 {
        return None;
    }
    let start = offset as usize;
    if start >= table.len() {
        return None;
    }
    let end = table[start..].iter().position(|&b| b == 0)? + start;
    if end == start {
        return None;
    }
    Some(table[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_entry(magic: u16, names_size: u16, bools_size: u16, numbers: &[u8], strings_offsets: &[i16], table: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&magic.to_le_bytes());
        buf.extend_from_slice(&names_size.to_le_bytes());
        buf.extend_from_slice(&bools_size.to_le_bytes());
        let numbers_count = (numbers.len() / 2) as u16;
        buf.extend_from_slice(&numbers_count.to_le_bytes());
        buf.extend_from_slice(&(strings_offsets.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(table.len() as u16).to_le_bytes());

        buf.extend_from_slice(&vec![0u8; names_size as usize]);
        buf.extend_from_slice(&vec![0u8; bools_size as usize]);
        if (names_size + bools_size) % 2 == 1 {
            buf.push(0);
        }
        buf.extend_from_slice(numbers);
        for off in strings_offsets {
            buf.extend_from_slice(&off.to_le_bytes());
        }
        buf.extend_from_slice(table);
        buf
    }

    #[test]
    fn l1_header_recognizes_16bit_magic() {
        let header: [u8; 12] = [
            0x1A, 0x01, 0x02, 0x00, 0x02, 0x00, 0x04, 0x00, 0x01, 0x00, 0x03, 0x00,
        ];
        let words: Vec<u16> = header
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(words[0], MAGIC_INT16);
        assert_eq!(words[3], 2); // numbers_count, for completeness of the fixture
    }

    #[test]
    fn l2_bad_magic_fails() {
        let entry = build_entry(0xBEEF, 0, 0, &[], &[0], b"x\0");
        let mut inputs: [Option<Vec<u8>>; INPUT_COUNT] = Default::default();
        let mut outputs: [Option<Vec<u8>>; OUTPUT_COUNT] = Default::default();
        let result = parse(Cursor::new(entry), &mut inputs, &mut outputs);
        assert!(result.is_err());
    }

    #[test]
    fn l3_odd_names_bools_adds_padding() {
        // names_size=1, bools_size=0 => sum is odd => one pad byte expected.
        // We verify by building an entry where the string table begins right
        // after: if padding were skipped, the offset table read would
        // consume the pad byte and corrupt later bytes.
        let numbers: [u8; 2] = [7, 0];
        let entry = build_entry(MAGIC_INT16, 1, 0, &numbers, &[0, -1], b"ok\0pad\0");
        let mut inputs: [Option<Vec<u8>>; INPUT_COUNT] = Default::default();
        let mut outputs: [Option<Vec<u8>>; OUTPUT_COUNT] = Default::default();
        // Columns 0 and 1 map into our 2-entry offsets table via a direct
        // parse() call bypassing the real INPUT/OUTPUT index tables: we
        // exercise extract() directly instead for this boundary law.
        let result = parse(Cursor::new(entry), &mut inputs, &mut outputs);
        assert!(result.is_ok());
    }

    #[test]
    fn extract_negative_offset_is_absent() {
        let offsets = [-1i16, 0];
        let table = b"hi\0";
        assert_eq!(extract(&offsets, table, 0), None);
        assert_eq!(extract(&offsets, table, 1), Some(b"hi".to_vec()));
    }

    #[test]
    fn extract_empty_string_is_absent() {
        let offsets = [0i16];
        let table = b"\0";
        assert_eq!(extract(&offsets, table, 0), None);
    }

    #[test]
    fn extract_out_of_range_column_is_absent() {
        let offsets = [0i16];
        let table = b"hi\0";
        assert_eq!(extract(&offsets, table, 5), None);
    }

    #[test]
    fn full_parse_round_trip() {
        // Build a minimal entry whose only registered capability column (0)
        // points at "left", exercising the end-to-end extraction path used
        // by `TerminfoDatabase::load`.
        let numbers: [u8; 2] = [0, 0];
        let mut offsets = vec![-1i16; 165];
        offsets[79] = 0; // key_left
        offsets[14] = 5; // cursor_left
        let table = b"left\0back\0";
        let entry = build_entry(MAGIC_INT16, 0, 0, &numbers, &offsets, table);

        let mut inputs: [Option<Vec<u8>>; INPUT_COUNT] = Default::default();
        let mut outputs: [Option<Vec<u8>>; OUTPUT_COUNT] = Default::default();
        parse(Cursor::new(entry), &mut inputs, &mut outputs).unwrap();

        assert_eq!(inputs[InputCap::KeyLeft as usize].as_deref(), Some(&b"left"[..]));
        assert_eq!(outputs[OutputCap::CursorLeft as usize].as_deref(), Some(&b"back"[..]));
        assert_eq!(inputs[InputCap::KeyRight as usize], None);
    }

    #[test]
    fn idempotent_load_without_term_env() {
        let _ = env_logger::try_init();
        let mut db = TerminfoDatabase::new();
        // Don't touch TERM here: whatever the ambient test environment has,
        // a second call must not re-attempt discovery (P6). We only assert
        // on the repeated-call contract, not on success/failure.
        let first = db.load();
        let second = db.load();
        assert_eq!(first.is_ok(), second.is_ok());
    }
}
