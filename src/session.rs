//! Public entry point: configuration, raw-mode/signal scoped guards, and the
//! read/classify/mutate/render control loop.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use log::{debug, trace};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal as NixSignal};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use nix::unistd::isatty;

use crate::automaton::Automaton;
use crate::error::{Error, Signal, SystemError};
use crate::io::BufferedIo;
use crate::line::Line;
use crate::terminfo::{OutputCap, TerminfoDatabase};

/// How typed characters are reflected back to the echo descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoMode {
    /// Nothing is echoed; the caller draws its own UI, if any.
    Off,
    /// Characters are echoed as typed.
    #[default]
    On,
    /// A `*` is echoed for every character, hiding the real content.
    Obscured,
}

/// Session configuration. Construct with [`Config::builder`] or
/// [`Config::default`].
#[derive(Debug, Clone)]
pub struct Config {
    pub read_fd: RawFd,
    pub echo_fd: RawFd,
    pub prompt: Option<Vec<u8>>,
    pub preload: Option<Vec<u8>>,
    pub assume_smkx: bool,
    pub echo_mode: EchoMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            read_fd: io::stdin().as_raw_fd(),
            echo_fd: io::stdout().as_raw_fd(),
            prompt: None,
            preload: None,
            assume_smkx: false,
            echo_mode: EchoMode::On,
        }
    }
}

impl Config {
    /// Start a fluent builder seeded with the defaults above.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Config::default())
    }

    fn validate(&self) -> Result<(), Error> {
        if self.read_fd < 0 {
            return Err(Error::Arg("read_fd must be non-negative"));
        }
        if self.echo_fd < 0 {
            return Err(Error::Arg("echo_fd must be non-negative"));
        }
        Ok(())
    }
}

/// Method-chaining builder for [`Config`]; validates at [`Self::build`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn read_fd(mut self, fd: RawFd) -> Self {
        self.0.read_fd = fd;
        self
    }

    pub fn echo_fd(mut self, fd: RawFd) -> Self {
        self.0.echo_fd = fd;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<Vec<u8>>) -> Self {
        self.0.prompt = Some(prompt.into());
        self
    }

    pub fn preload(mut self, preload: impl Into<Vec<u8>>) -> Self {
        self.0.preload = Some(preload.into());
        self
    }

    pub fn assume_smkx(mut self, assume: bool) -> Self {
        self.0.assume_smkx = assume;
        self
    }

    pub fn echo_mode(mut self, mode: EchoMode) -> Self {
        self.0.echo_mode = mode;
        self
    }

    pub fn build(self) -> Result<Config, Error> {
        self.0.validate()?;
        Ok(self.0)
    }
}

/// Process-wide: signal disposition save/restore has no per-instance
/// scoping in POSIX, so two sessions installing handlers at once is
/// serialized rather than made instance-local (SPEC_FULL.md §5).
static SIGNAL_LOCK: Mutex<()> = Mutex::new(());
static CAPTURED_SIGNAL: AtomicI32 = AtomicI32::new(0);

const HANDLED_SIGNALS: [NixSignal; 4] = [
    NixSignal::SIGHUP,
    NixSignal::SIGINT,
    NixSignal::SIGTERM,
    NixSignal::SIGQUIT,
];

extern "C" fn record_signal(sig: i32) {
    CAPTURED_SIGNAL.store(sig, Ordering::SeqCst);
}

/// Scoped guard installing handlers for HUP/INT/TERM/QUIT on construction
/// and restoring the previous dispositions on drop, unconditionally.
struct SignalGuard {
    previous: Vec<(NixSignal, SigAction)>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl SignalGuard {
    fn install() -> Result<Self, SystemError> {
        let lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        CAPTURED_SIGNAL.store(0, Ordering::SeqCst);

        // No SA_RESTART: a captured signal must interrupt the blocking read
        // inside the loop rather than silently resuming it.
        let action = SigAction::new(
            SigHandler::Handler(record_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );

        let mut previous = Vec::with_capacity(HANDLED_SIGNALS.len());
        for &sig in HANDLED_SIGNALS.iter() {
            // SAFETY: `record_signal` only stores an integer; it performs no
            // allocation, locking, or I/O, so it is signal-safe.
            let old = unsafe { signal::sigaction(sig, &action) }?;
            previous.push((sig, old));
        }

        Ok(SignalGuard {
            previous,
            _lock: lock,
        })
    }

    /// The signal number captured during the session, if any.
    fn captured() -> Option<Signal> {
        match CAPTURED_SIGNAL.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for (sig, action) in self.previous.drain(..) {
            // SAFETY: restoring a previously-saved disposition.
            let _ = unsafe { signal::sigaction(sig, &action) };
        }
    }
}

/// Scoped guard snapshotting termios on construction (if the descriptor is a
/// tty) and restoring it on drop, unconditionally.
struct RawModeGuard {
    fd: RawFd,
    original: Option<Termios>,
}

impl RawModeGuard {
    fn install(fd: RawFd) -> Result<Self, SystemError> {
        if !isatty(fd)? {
            return Ok(RawModeGuard { fd, original: None });
        }

        let original = termios::tcgetattr(fd)?;
        let mut raw = original.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        termios::tcsetattr(fd, SetArg::TCSAFLUSH, &raw)?;

        Ok(RawModeGuard {
            fd,
            original: Some(original),
        })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(original) = &self.original {
            let _ = termios::tcsetattr(self.fd, SetArg::TCSAFLUSH, original);
        }
    }
}

/// Thin adapter reading/writing a raw descriptor without taking ownership of
/// it, so [`crate::io::BufferedIo`] can be generic over `Read`/`Write`
/// without depending on `std::fs::File`'s close-on-drop semantics.
struct FdIo(RawFd);

fn nix_to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

impl Read for FdIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(self.0, buf).map_err(nix_to_io)
    }
}

impl Write for FdIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        nix::unistd::write(self.0, buf).map_err(nix_to_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read one line of input under the given configuration. See the module and
/// crate docs for the full protocol.
pub fn edit(config: Config) -> Result<Option<Vec<u8>>, Error> {
    config.validate()?;

    let mut db = TerminfoDatabase::new();
    db.load()?;
    let automaton = Automaton::build(&db);

    let raw_mode = RawModeGuard::install(config.read_fd)?;
    let signals = SignalGuard::install()?;

    let read_io = FdIo(config.read_fd);
    let write_io = FdIo(config.echo_fd);
    let mut io = BufferedIo::new(read_io, write_io, config.preload.clone());

    let result = run_loop(&mut io, &db, &automaton, &config);

    // Exit sequence, in order, regardless of how `run_loop` concluded.
    drop(raw_mode);
    let signal = SignalGuard::captured();
    drop(signals);

    if config.echo_mode != EchoMode::On {
        io.wipe_buffers();
    }
    io.set_echo(true);
    let _ = io.write(b"\n");
    if !config.assume_smkx {
        let _ = io.write_escape(&db, OutputCap::KeypadLocal);
    }
    let _ = io.flush();

    let (line, eof) = result?;

    if eof && line.is_empty() {
        return Err(Error::Eof);
    }

    match signal {
        Some(sig) => Err(Error::Interrupt { line, signal: sig }),
        None => Ok(Some(line)),
    }
}

/// Convenience variant taking only a prompt, with every other option
/// defaulted.
pub fn readline(prompt: impl Into<Vec<u8>>) -> Result<Option<Vec<u8>>, Error> {
    let config = Config::builder().prompt(prompt).build()?;
    edit(config)
}

/// Drives setup steps 5-9 and the main loop (SPEC_FULL.md §4.5) over an
/// already-bound [`BufferedIo`]. Returns the collected line and whether an
/// EOF token ended the loop.
fn run_loop<R: Read, W: Write>(
    io: &mut BufferedIo<R, W>,
    db: &TerminfoDatabase,
    automaton: &Automaton,
    config: &Config,
) -> Result<(Vec<u8>, bool), Error> {
    if !config.assume_smkx {
        io.write_escape(db, OutputCap::KeypadXmit)?;
    }
    if let Some(prompt) = &config.prompt {
        io.write(prompt)?;
    }
    io.set_echo(config.echo_mode != EchoMode::Off);
    io.flush()?;

    let mut line = Line::new(config.preload.as_deref());
    let mut eof = false;

    loop {
        let rendered_count = line.buffer.len();

        enum Token {
            Ascii(Vec<u8>),
            Escape(crate::terminfo::InputCap),
            Stop { eof: bool },
        }

        let token = if let Some(accept) = automaton.parse(io) {
            io.commit();
            Token::Escape(accept)
        } else {
            let byte = io.discard_and_take_one();
            if byte == b'\n' {
                Token::Stop { eof: false }
            } else if byte == 0x04 {
                Token::Stop { eof: true }
            } else if byte < 0x20 {
                // Caret-notation rendering is computed for documentation
                // parity with the original source but, per the unresolved
                // design question in SPEC_FULL.md §9, is never written to
                // the line buffer: the raw control byte is inserted as-is.
                let _caret = [b'^', byte + 0x40];
                Token::Ascii(vec![byte])
            } else {
                // UTF-8 multibyte handling is reserved; any non-ASCII byte
                // falls through this same path, inserted verbatim.
                Token::Ascii(vec![byte])
            }
        };

        match token {
            Token::Ascii(bytes) => line.insert_ascii(&bytes),
            Token::Escape(id) => line.apply_escape(id, io, db)?,
            Token::Stop { eof: was_eof } => {
                eof = was_eof;
                break;
            }
        }

        if line.dirty {
            render(io, db, &mut line, rendered_count, config.echo_mode)?;
        }
        io.flush()?;

        if SignalGuard::captured().is_some() {
            break;
        }
    }

    Ok((line.buffer, eof))
}

fn render<R: Read, W: Write>(
    io: &mut BufferedIo<R, W>,
    db: &TerminfoDatabase,
    line: &mut Line,
    rendered_count: usize,
    echo_mode: EchoMode,
) -> Result<(), Error> {
    for _ in 0..line.render_cursor {
        io.write_escape(db, OutputCap::CursorLeft)?;
    }

    let mut advanced = match echo_mode {
        EchoMode::Obscured => {
            let stars = vec![b'*'; line.buffer.len()];
            io.write(&stars)?;
            stars.len()
        }
        _ => {
            io.write(&line.buffer)?;
            line.buffer.len()
        }
    };

    if rendered_count > line.buffer.len() {
        let erase = vec![b' '; rendered_count - line.buffer.len()];
        io.write(&erase)?;
        advanced += erase.len();
    }

    for _ in 0..advanced.saturating_sub(line.cursor) {
        io.write_escape(db, OutputCap::CursorLeft)?;
    }

    line.dirty = false;
    line.render_cursor = line.cursor;
    debug!("re-rendered line, cursor at {}", line.cursor);
    trace!("line contents: {:?}", line.buffer);
    Ok(())
}
