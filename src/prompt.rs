//! Operator prompts used by the authentication flow.

use crate::auth::AuthError;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{ColorMode, Editor, Helper};
use std::borrow::Cow;
use zeroize::Zeroizing;

/// Interaction seam between the auth gate and whoever is at the keyboard
pub trait Prompter {
    /// Read a secret without echoing it. `None` means the operator cancelled.
    fn secret(&mut self, prompt: &str) -> Result<Option<Zeroizing<String>>, AuthError>;

    /// Show a message to the operator
    fn say(&mut self, message: &str);
}

/// Renders every typed character as `*`
struct MaskingHelper;

impl Highlighter for MaskingHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Owned("*".repeat(line.chars().count()))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

impl Completer for MaskingHelper {
    type Candidate = String;
}

impl Hinter for MaskingHelper {
    type Hint = String;
}

impl Validator for MaskingHelper {}

impl Helper for MaskingHelper {}

/// Prompter backed by the terminal. Secrets never enter line history.
pub struct TerminalPrompter {
    editor: Editor<MaskingHelper, DefaultHistory>,
}

impl TerminalPrompter {
    pub fn new() -> anyhow::Result<Self> {
        let config = rustyline::Config::builder()
            .auto_add_history(false)
            .color_mode(ColorMode::Forced)
            .build();
        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(MaskingHelper));
        Ok(Self { editor })
    }
}

impl Prompter for TerminalPrompter {
    fn secret(&mut self, prompt: &str) -> Result<Option<Zeroizing<String>>, AuthError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(Zeroizing::new(line))),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(e) => Err(AuthError::Prompt(e.to_string())),
        }
    }

    fn say(&mut self, message: &str) {
        println!("{}", message);
    }
}

#[cfg(test)]
pub use scripted::ScriptedPrompter;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_hides_every_character() {
        let helper = MaskingHelper;
        assert_eq!(helper.highlight("abc123", 6), "******");
        assert_eq!(helper.highlight("pässwörd", 0), "********");
        assert_eq!(helper.highlight("", 0), "");
    }

    #[test]
    fn test_scripted_prompter_replays_and_cancels() {
        let mut prompter = ScriptedPrompter::new(&["one"]).then_cancel();
        assert_eq!(prompter.secret("a: ").unwrap().as_deref().map(String::as_str), Some("one"));
        assert!(prompter.secret("b: ").unwrap().is_none());
        assert!(prompter.secret("c: ").unwrap().is_none());
        assert_eq!(prompter.prompts, vec!["a: ", "b: ", "c: "]);
    }
}
