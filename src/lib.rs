//! A minimal interactive line-editing library for POSIX terminals.
//!
//! [`edit`] presents an optional prompt, reads one line from a character
//! device in raw mode, supports in-line cursor movement and erasure via
//! terminal-specific key sequences, and optionally echoes the input
//! (plainly, obscured, or not at all).
//!
//! ```no_run
//! match nanorl::readline("enter something: ") {
//!     Ok(Some(line)) => println!("you typed: {}", String::from_utf8_lossy(&line)),
//!     Ok(None) => println!("no input"),
//!     Err(e) => eprintln!("nanorl: {e}"),
//! }
//! ```
//!
//! The engineering weight of this crate lives in four collaborating pieces:
//! a byte-exact [`terminfo`] database parser, a prefix-matching [`automaton`]
//! over the discovered escape sequences, a coalesced, speculative-lookahead
//! [`io`] layer, and the [`session`] control loop that ties setup, signal
//! capture, input classification, and re-rendering into one scoped call.
//!
//! Unicode/multibyte editing, history, completion, and concurrent use of a
//! single in-flight [`edit`] call are explicitly out of scope; see the
//! project's `SPEC_FULL.md` for the full rationale.

mod automaton;
mod error;
mod fastpath;
mod io;
mod line;
mod session;
mod terminfo;

pub use error::{Error, Signal, SystemError};
pub use session::{edit, readline, Config, ConfigBuilder, EchoMode};
pub use terminfo::TerminfoDatabase;

/// Convenience alias kept for callers migrating off GNU readline, mirroring
/// the original library's `#define readline nrl_readline` binding. This is
/// the thin external-collaborator wrapper described in SPEC_FULL.md §1/§10.5,
/// not part of the terminal-interaction core.
pub fn readline_alias(prompt: impl Into<Vec<u8>>) -> Result<Option<Vec<u8>>, Error> {
    readline(prompt)
}

/// Convenience wrapper returning a lossily-decoded `String` instead of raw
/// bytes, for callers that don't need to handle non-UTF-8 input themselves.
pub fn readline_str(prompt: impl Into<Vec<u8>>) -> Result<Option<String>, Error> {
    Ok(readline(prompt)?.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec() {
        let config = Config::default();
        assert_eq!(config.echo_mode, EchoMode::On);
        assert!(!config.assume_smkx);
        assert!(config.prompt.is_none());
        assert!(config.preload.is_none());
    }
}
