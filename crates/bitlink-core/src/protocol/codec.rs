//! Line codec for the debug-link serial protocol.
//!
//! Wire format (UTF-8 text):
//! ```text
//! <tag>[|<arg>]*\n
//! ```
//! Fields are `|`-delimited and every record is terminated by a single `\n`.
//!
//! The serial transport delivers bytes in arbitrary chunks: a single chunk may
//! hold less than one record, or several records plus a trailing fragment.
//! [`LineBuffer`] accumulates chunks and yields complete lines one at a time,
//! keeping any not-yet-terminated partial line buffered for the next chunk.

// ── Outgoing encoding ─────────────────────────────────────────────────────────

/// Encodes an outgoing command as `command|arg1|arg2...` plus the terminating
/// newline.
///
/// A command with no arguments encodes as just `command\n`.
///
/// # Examples
///
/// ```rust
/// use bitlink_core::protocol::codec::encode_command;
///
/// assert_eq!(encode_command("identify", &[]), "identify\n");
/// assert_eq!(encode_command("show_image", &["00000:00000"]), "show_image|00000:00000\n");
/// ```
pub fn encode_command(command: &str, args: &[&str]) -> String {
    let extra: usize = args.iter().map(|a| a.len() + 1).sum();
    let mut line = String::with_capacity(command.len() + extra + 1);
    line.push_str(command);
    for arg in args {
        line.push('|');
        line.push_str(arg);
    }
    line.push('\n');
    line
}

// ── Incoming line reassembly ──────────────────────────────────────────────────

/// Accumulating receive buffer that reassembles newline-terminated records
/// from a chunked byte stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line completed by it, in arrival
    /// order, without their terminating newlines.
    ///
    /// Any trailing partial line stays buffered until a later chunk supplies
    /// its newline.
    pub fn push_chunk(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(break_index) = self.partial.find('\n') {
            let rest = self.partial.split_off(break_index + 1);
            let mut line = std::mem::replace(&mut self.partial, rest);
            line.pop(); // terminating '\n'
            lines.push(line);
        }
        lines
    }

    /// The buffered not-yet-terminated fragment.
    pub fn pending(&self) -> &str {
        &self.partial
    }

    /// Discards any buffered fragment.
    pub fn clear(&mut self) {
        self.partial.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
