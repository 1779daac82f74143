//! Error taxonomy for the line editor.
//!
//! `OK` from the original C enum is represented by `Result::Ok` rather than a
//! variant; everything else below is a reason the caller did *not* get a
//! normal `Ok` back.

use thiserror::Error;

/// Signal number captured during a session, attached to [`Error::Interrupt`].
pub type Signal = libc::c_int;

/// Failure classification for [`crate::edit`] and [`crate::readline`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration was rejected before any side effect occurred.
    #[error("invalid configuration: {0}")]
    Arg(&'static str),

    /// A syscall or the terminfo load step failed.
    #[error("system error")]
    System(#[source] SystemError),

    /// The input descriptor reached end-of-file with no data collected.
    #[error("end of file with no input")]
    Eof,

    /// A line was collected, but a signal interrupted the session.
    ///
    /// The partially (or fully) edited line is still returned to the caller
    /// alongside the signal number, mirroring the original library's
    /// "data returned" contract for this case.
    #[error("interrupted by signal {signal}")]
    Interrupt {
        /// The line collected up to the point of interruption.
        line: Vec<u8>,
        /// The signal number that ended the session.
        signal: Signal,
    },
}

/// The underlying cause of an [`Error::System`].
#[derive(Debug, Error)]
pub enum SystemError {
    /// Failure locating or parsing the terminfo database.
    #[error("terminfo load failed")]
    Terminfo,

    /// A plain I/O failure (read/write/flush on the tty descriptors).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A termios or signal-disposition syscall failed.
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl From<SystemError> for Error {
    fn from(e: SystemError) -> Self {
        Error::System(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Io(e))
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        Error::System(SystemError::Nix(e))
    }
}
