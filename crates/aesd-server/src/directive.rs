//! Classifying lines received from a peer
//!
//! A line is either a seek directive, `AESDCHAR_IOCSEEKTO:<command>,<offset>`,
//! or a literal command to append. Anything that does not parse as a
//! well-formed directive is appended as-is.

/// Prefix that marks a seek directive
pub const SEEK_DIRECTIVE_PREFIX: &str = "AESDCHAR_IOCSEEKTO:";

/// What a received line asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// Reposition to `intra_offset` bytes into the `command_index`-th command
    Seek {
        /// Command index (0 = oldest retained)
        command_index: u32,
        /// Offset inside that command
        intra_offset: u32,
    },
    /// Append the line to the history
    Append(&'a [u8]),
}

/// Classify a received line (delimiter included)
pub fn parse_line<'a>(line: &'a [u8], prefix: &str) -> Request<'a> {
    parse_seek(line, prefix).unwrap_or(Request::Append(line))
}

fn parse_seek<'a>(line: &[u8], prefix: &str) -> Option<Request<'a>> {
    let rest = line.strip_prefix(prefix.as_bytes())?;
    let rest = std::str::from_utf8(rest).ok()?;
    let (command, offset) = rest.trim_end_matches(['\n', '\r']).split_once(',')?;
    Some(Request::Seek {
        command_index: command.trim().parse().ok()?,
        intra_offset: offset.trim().parse().ok()?,
    })
}

/// Render a seek directive line, newline included
pub fn format_seek(prefix: &str, command_index: u32, intra_offset: u32) -> String {
    format!("{prefix}{command_index},{intra_offset}\n")
}
