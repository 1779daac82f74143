//! Built-in capability table for `xterm`-family terminals.
//!
//! Installed before the real terminfo parse when `$TERM` contains the
//! substring `xterm`, avoiding a disk read in the common case. A subsequent
//! successful parse overrides any slot this leaves unset; a failed parse
//! leaves these entries intact.

use crate::terminfo::{INPUT_COUNT, OUTPUT_COUNT};

const XTERM_INPUTS: [&[u8]; INPUT_COUNT] = [
    b"\x1bOD",   // key_left
    b"\x1bOC",   // key_right
    b"\x7f",     // key_backspace
    b"\x1bOH",   // key_home
    b"\x1bOF",   // key_end
    b"\x1b[3~",  // key_dc
];

const XTERM_OUTPUTS: [&[u8]; OUTPUT_COUNT] = [
    b"\x08",         // cursor_left
    b"\x1b[C",       // cursor_right
    b"\x1b[?1l\x1b>", // keypad_local
    b"\x1b[?1h\x1b=", // keypad_xmit
];

pub(crate) fn install_xterm(
    inputs: &mut [Option<Vec<u8>>; INPUT_COUNT],
    outputs: &mut [Option<Vec<u8>>; OUTPUT_COUNT],
) {
    for (slot, seq) in inputs.iter_mut().zip(XTERM_INPUTS.iter()) {
        *slot = Some(seq.to_vec());
    }
    for (slot, seq) in outputs.iter_mut().zip(XTERM_OUTPUTS.iter()) {
        *slot = Some(seq.to_vec());
    }
}
