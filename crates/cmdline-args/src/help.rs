//! Help rendering: aliases in an aligned column, help text word-wrapped beside it.

use std::io::{self, Write};

use crate::Parser;

/// Maximum width of one line of help text (excluding the alias column and gutter).
pub const HELP_WRAP_WIDTH: usize = 60;

/// Spaces between the alias column and the help column.
pub const HELP_GUTTER: usize = 2;

impl Parser<'_> {
    /// Width of the alias column: the longest comma-joined alias list.
    pub fn alias_column_width(&self) -> usize {
        self.arguments
            .iter()
            .map(|a| a.aliases.join(", ").chars().count())
            .max()
            .unwrap_or(0)
    }

    /// Render the full help text (description line, then one block per argument).
    pub fn help_text(&self) -> String {
        let width = self.alias_column_width();
        let indent = " ".repeat(width + HELP_GUTTER);
        let gutter = " ".repeat(HELP_GUTTER);

        let mut out = String::new();
        if !self.description.is_empty() {
            out.push_str(&self.description);
            out.push('\n');
        }

        for argument in &self.arguments {
            let aliases = argument.aliases.join(", ");
            let lines = wrap_words(&argument.help, HELP_WRAP_WIDTH);
            let mut lines = lines.iter();

            match lines.next() {
                Some(first) => out.push_str(&format!("{aliases:<width$}{gutter}{first}\n")),
                None => {
                    out.push_str(&aliases);
                    out.push('\n');
                }
            }
            for line in lines {
                out.push_str(&indent);
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Write [`Parser::help_text`] to `out`.
    pub fn print_help(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(self.help_text().as_bytes())?;
        out.flush()
    }
}

/// Greedy word wrap. Words longer than `width` get a line of their own, unbroken.
fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if line_len > 0 && line_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line.push_str(word);
        line_len += word_len;
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
