use thiserror::Error;

use crate::metadata::token::Token;

/// Builds an [`Error::Malformed`] carrying the raising site.
///
/// ```rust, ignore
/// return Err(malformed_error!("Invalid element type - 0x{:02x}", tag));
/// ```
macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Builds an [`Error::OutOfBounds`] carrying the raising site.
macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The error type of this crate.
///
/// Two families exist. Structural failures ([`Error::Malformed`], [`Error::OutOfBounds`],
/// [`Error::NotSupported`], [`Error::RecursionLimit`]) abort the current decode and never
/// leave a partially filled node behind. A reference that cannot be resolved is *not* an
/// error: the resolver reports it as `Ok(None)` so callers can tell "not found" from
/// "corrupt".
///
/// # Examples
///
/// ```rust
/// use dotmeta::{Error, metadata::token::Token, metadata::reader::MetadataReader};
///
/// let reader = MetadataReader::empty("Empty.dll");
/// match reader.lookup_token(Token::new(0x0200_0001)) {
///     Ok(item) => assert!(item.is_none()),
///     Err(Error::Malformed { message, file, line }) => eprintln!("{file}:{line}: {message}"),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The metadata violates the ECMA-335 grammar.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// What was wrong
        message: String,
        /// Source file that raised the error
        file: &'static str,
        /// Source line that raised the error
        line: u32,
    },

    /// A read would have run past the end of its buffer.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// Source file that raised the error
        file: &'static str,
        /// Source line that raised the error
        line: u32,
    },

    /// The input uses a construct this reader does not handle in that position.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// Signature nesting exceeded the configured limit.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// A member was inserted into a second owner.
    #[error("Member is already attached to another type - {0}")]
    MemberAlreadyAttached(Token),

    /// A lazily materialized collection was requested again by its own materializer.
    #[error("Re-entrant materialization of {0}")]
    ReentrantMaterialization(Token),

    /// A synchronization primitive was poisoned.
    #[error("Failed to lock target")]
    LockError,
}
