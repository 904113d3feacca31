//! Minimal command-line flag parser.
//!
//! Arguments are registered up front with one or more spellings, an optional typed
//! destination owned by the caller, and a help string. [`Parser::parse`] then walks argv once,
//! left to right:
//! - `--flag=value` and `--flag value` both supply a value;
//! - boolean destinations never consume the following token;
//! - unknown flags are logged and skipped, never fatal.
//!
//! ```
//! use cmdline_args::{Destination, Parser};
//!
//! let mut verbose = false;
//! let mut rate = 44_100u32;
//! {
//!     let mut parser = Parser::new("capture tool");
//!     parser
//!         .register(["-v", "--verbose"], Some(Destination::flag(&mut verbose)), "Chatty output")
//!         .register(["--rate"], Some(Destination::number(&mut rate)), "Sample rate in Hz");
//!     parser.parse(["prog", "--rate=48000", "-v"]).unwrap();
//! }
//! assert!(verbose);
//! assert_eq!(rate, 48_000);
//! ```

mod destination;
mod error;
mod help;
mod parser;

pub use destination::{Destination, NumericValue};
pub use error::ParseError;
pub use help::{HELP_GUTTER, HELP_WRAP_WIDTH};
pub use parser::{Match, ParseReport, Parser};
