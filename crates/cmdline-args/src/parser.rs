//! Argument registration and the argv scan.

use crate::{Destination, ParseError};

/// One recognized argument: its spellings, optional destination, and help text.
pub(crate) struct Argument<'a> {
    pub(crate) aliases: Vec<String>,
    pub(crate) destination: Option<Destination<'a>>,
    pub(crate) help: String,
}

impl Argument<'_> {
    fn matches(&self, flag: &str) -> bool {
        self.aliases.iter().any(|a| a == flag)
    }
}

/// A registered argument that was found in argv.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    /// Every spelling of the matched argument.
    pub aliases: Vec<String>,
    /// The spelling actually used on the command line.
    pub spelled: String,
}

/// Outcome of a successful [`Parser::parse`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Matched arguments in order of appearance (repeats included).
    pub matched: Vec<Match>,
    /// Flags that matched nothing and were skipped.
    pub unknown: Vec<String>,
}

impl ParseReport {
    /// Whether the argument that `flag` spells was present, under any of its aliases.
    pub fn is_present(&self, flag: &str) -> bool {
        self.matched
            .iter()
            .any(|m| m.aliases.iter().any(|a| a == flag))
    }
}

/// Flag parser borrowing its destinations for the lifetime `'a`.
///
/// Destinations are written during [`Parser::parse`]; drop the parser to read them back.
pub struct Parser<'a> {
    pub(crate) description: String,
    pub(crate) arguments: Vec<Argument<'a>>,
}

impl<'a> Parser<'a> {
    /// Create a parser; `description` heads the help output.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            arguments: Vec::new(),
        }
    }

    /// Register an argument.
    ///
    /// - `aliases`: every accepted spelling, e.g. `["-l", "--list-devices"]`. The first one is
    ///   listed first in help output.
    /// - `destination`: `None` makes a presence-only switch (see [`ParseReport::is_present`]).
    pub fn register<I, S>(
        &mut self,
        aliases: I,
        destination: Option<Destination<'a>>,
        help: impl Into<String>,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.push(Argument {
            aliases: aliases.into_iter().map(Into::into).collect(),
            destination,
            help: help.into(),
        });
        self
    }

    /// Scan `argv` (including the program name at index 0, which is skipped).
    ///
    /// Each token is split on its first `=` into flag and value. When a flag with a non-boolean
    /// destination has no `=value`, the following token is consumed as its value.
    ///
    /// Errors stop the scan; destinations already written keep their new values.
    pub fn parse<I, S>(&mut self, argv: I) -> Result<ParseReport, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens: Vec<S> = argv.into_iter().collect();
        let mut report = ParseReport::default();

        let mut i = 1;
        while i < tokens.len() {
            let token = tokens[i].as_ref();
            let (flag, inline_value) = match token.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (token, None),
            };
            i += 1;

            let Some(argument) = self.arguments.iter_mut().find(|a| a.matches(flag)) else {
                tracing::warn!(flag, "ignoring unknown command line argument");
                report.unknown.push(flag.to_string());
                continue;
            };

            report.matched.push(Match {
                aliases: argument.aliases.clone(),
                spelled: flag.to_string(),
            });

            let Some(destination) = argument.destination.as_mut() else {
                continue;
            };

            let value = match inline_value {
                Some(v) => Some(v),
                None if destination.takes_value() => {
                    let next = tokens.get(i).map(|t| t.as_ref());
                    if next.is_some() {
                        i += 1;
                    }
                    next
                }
                None => None,
            };
            destination.store(flag, value)?;
        }

        Ok(report)
    }
}
