//! Shared terminal output for the session and the event router.

use std::io::Write;
use std::sync::{Arc, Mutex};

pub const INPUT_PROMPT: &str = "You: ";
pub const USERNAME_PROMPT: &str = "Enter your username: ";

/// Line-oriented writer shared between tasks.
///
/// Each call writes and flushes under the lock, so lines from the router
/// never interleave mid-line with the session's prompts.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    fn write(&self, text: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            tracing::debug!("console write failed: {e}");
        }
    }

    /// Print `text` followed by a newline.
    pub fn line(&self, text: &str) {
        self.write(&format!("{text}\n"));
    }

    /// Print `text` without a newline (cursor stays on the line).
    pub fn prompt(&self, text: &str) {
        self.write(text);
    }

    /// Print an asynchronous notice on its own line, then restore the input prompt.
    pub fn notice(&self, text: &str) {
        self.write(&format!("\n{text}\n{INPUT_PROMPT}"));
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Captured;
    use super::*;

    #[test]
    fn notice_restores_prompt() {
        let (console, captured) = Captured::console();
        console.prompt(INPUT_PROMPT);
        console.notice("🟢 bob joined the chat");
        assert_eq!(captured.text(), "You: \n🟢 bob joined the chat\nYou: ");
    }

    #[test]
    fn line_appends_newline() {
        let (console, captured) = Captured::console();
        console.line("hello");
        console.line("world");
        assert_eq!(captured.text(), "hello\nworld\n");
    }
}
