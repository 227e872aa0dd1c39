use super::BoxError;
use std::{backtrace::Backtrace, fmt};

#[derive(Debug)]
pub(super) struct ErrorWithBacktrace {
    source: BoxError,
    backtrace: Backtrace,
}

impl ErrorWithBacktrace {
    pub(super) fn new(source: BoxError) -> Self {
        Self {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

impl fmt::Display for ErrorWithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !f.alternate() {
            return write!(f, "{}", self.source);
        }

        writeln!(f, "{}", self.source)?;
        writeln!(f, "Backtrace:")?;
        writeln!(f, "{}", self.backtrace)?;

        Ok(())
    }
}

impl std::error::Error for ErrorWithBacktrace {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
