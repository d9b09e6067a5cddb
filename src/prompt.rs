//! Secret input from the operator.

use std::cell::Cell;
use std::io;
use std::rc::Rc;

/// Reads a secret line from the operator.
pub trait SecretPrompt {
    /// Shows `prompt` and returns the entered line without its newline.
    fn read_secret(&self, prompt: &str) -> io::Result<String>;
}

/// Reads from the controlling terminal with echo disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl SecretPrompt for TerminalPrompt {
    fn read_secret(&self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt)
    }
}

/// Answers every prompt with a fixed value.
///
/// Used for scripted runs (`NDCT_PASSPHRASE`) and tests.
#[derive(Debug, Clone)]
pub struct FixedPrompt {
    secret: String,
    calls: Rc<Cell<usize>>,
}

impl FixedPrompt {
    /// Creates a prompt that always returns `secret`.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Number of times the prompt has been answered.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Shared call counter, still readable after the prompt is boxed away.
    #[must_use]
    pub fn counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }
}

impl SecretPrompt for FixedPrompt {
    fn read_secret(&self, _prompt: &str) -> io::Result<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.secret.clone())
    }
}
