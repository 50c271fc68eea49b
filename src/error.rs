use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigError,
    CorruptHeader,
    DivideByZero,
    EmptyStack,
    FileError,
    FrameUnderflow,
    IllegalMemoryAccess,
    Interpreter,
    Interrupted,
    InvalidAbbreviation,
    InvalidAddress,
    InvalidFilename,
    InvalidInstruction,
    InvalidLocalVariable,
    InvalidObjectAttribute,
    InvalidObjectProperty,
    InvalidObjectPropertySize,
    InvalidObjectTree,
    InvalidOutputStream,
    InvalidShift,
    Quetzal,
    Restore,
    ReturnNoCaller,
    Save,
    Stream3Table,
    System,
    Transcript,
    UndoNoState,
    UnimplementedInstruction,
    UnsupportedVersion,
}

/// A fault raised anywhere in the machine.  Recoverable faults can be
/// reported and skipped over; fatal ones halt execution.
pub struct RuntimeError {
    recoverable: bool,
    code: ErrorCode,
    message: String,
}

impl RuntimeError {
    pub fn recoverable(code: ErrorCode, message: String) -> RuntimeError {
        RuntimeError { recoverable: true, code, message }
    }

    pub fn fatal(code: ErrorCode, message: String) -> RuntimeError {
        RuntimeError { recoverable: false, code, message }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// An interrupted blocking read is the pause/abort rewind path, not a
    /// reportable failure.
    pub fn is_interrupt(&self) -> bool {
        self.code == ErrorCode::Interrupted
    }

    fn severity(&self) -> &'static str {
        if self.recoverable {
            "Recoverable"
        } else {
            "Fatal"
        }
    }
}

#[macro_export]
macro_rules! fatal_error {
    ($code:expr, $($fmt:tt)+) => {
        Err($crate::error::RuntimeError::fatal($code, format!($($fmt)+)))
    };
}

#[macro_export]
macro_rules! recoverable_error {
    ($code:expr, $($fmt:tt)+) => {
        Err($crate::error::RuntimeError::recoverable($code, format!($($fmt)+)))
    };
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} error - [{:?}]: {}", self.severity(), self.code, self.message)
    }
}

impl fmt::Debug for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
