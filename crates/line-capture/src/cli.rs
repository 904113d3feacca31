//! Command-line interface definitions.
//!
//! This module contains the `clap`-powered CLI surface area (args + defaults).
//! It intentionally has no audio logic so the rest of the crate can stay reusable.

use std::ffi::OsString;

use clap::Parser;
use clap::error::{ContextKind, ContextValue, ErrorKind};

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(
    name = "line-capture",
    version,
    about = "Capture raw s16le PCM from a line-in (or default) input device to stdout"
)]
pub struct Args {
    /// Frames per blocking read (block size)
    #[arg(default_value_t = 4096)]
    pub frames_per_buffer: u32,

    /// Channels to capture (reduced to the device maximum if higher)
    #[arg(default_value_t = 2)]
    pub channels: u16,

    /// Sample rate in Hz
    #[arg(default_value_t = 44_100.0)]
    pub sample_rate: f64,

    /// List audio devices and exit
    #[arg(short = 'l', long)]
    pub list_devices: bool,

    /// Capture from a specific device index (see --list-devices)
    #[arg(long, allow_negative_numbers = true)]
    pub device: Option<i64>,
}

/// Parse argv, dropping unknown flags and surplus positionals with a warning.
///
/// Every other clap error (bad value, `--help`, `--version`) is returned unchanged.
pub fn parse_lenient<I, T>(argv: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    loop {
        let err = match Args::try_parse_from(&argv) {
            Ok(args) => return Ok(args),
            Err(err) => err,
        };
        if err.kind() != ErrorKind::UnknownArgument {
            return Err(err);
        }
        let Some(ContextValue::String(offending)) = err.get(ContextKind::InvalidArg) else {
            return Err(err);
        };
        if !drop_unknown(&mut argv, offending) {
            return Err(err);
        }
    }
}

/// Remove what clap reported as unknown from `argv`.
///
/// A long flag (`--flag` or `--flag=value`) or a lone positional loses its whole token. An unknown
/// short flag inside a cluster only loses its own letter, so `-xl` keeps `-l`.
fn drop_unknown(argv: &mut Vec<OsString>, offending: &str) -> bool {
    if let Some(pos) = find_token(argv, offending) {
        tracing::warn!(
            argument = ?argv[pos],
            "ignoring unknown command line argument"
        );
        argv.remove(pos);
        return true;
    }
    let Some((pos, rest)) = find_in_cluster(argv, offending) else {
        return false;
    };
    tracing::warn!(
        argument = offending,
        cluster = ?argv[pos],
        "ignoring unknown command line argument"
    );
    if rest == "-" {
        argv.remove(pos);
    } else {
        argv[pos] = OsString::from(rest);
    }
    true
}

fn utf8_tokens(argv: &[OsString]) -> impl Iterator<Item = (usize, &str)> {
    argv.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, a)| a.to_str().map(|s| (i, s)))
}

/// Locate the argv token clap reported as unknown (`--flag`, `--flag=value`, or a positional).
fn find_token(argv: &[OsString], offending: &str) -> Option<usize> {
    utf8_tokens(argv)
        .find(|(_, s)| {
            *s == offending
                || s
                    .strip_prefix(offending)
                    .is_some_and(|rest| rest.starts_with('='))
        })
        .map(|(i, _)| i)
}

/// Find a short-flag cluster holding the unknown `-x` and return it with that letter removed.
fn find_in_cluster(argv: &[OsString], offending: &str) -> Option<(usize, String)> {
    let letter = offending.strip_prefix('-')?;
    let mut chars = letter.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    utf8_tokens(argv)
        .take_while(|(_, s)| *s != "--")
        .find_map(|(i, s)| {
            let flags = s.strip_prefix('-').filter(|f| !f.starts_with('-'))?;
            let at = flags.find(c)?;
            let mut rest = String::from("-");
            rest.push_str(&flags[..at]);
            rest.push_str(&flags[at + c.len_utf8()..]);
            Some((i, rest))
        })
}
