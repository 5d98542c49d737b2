//! Operator interaction
//!
//! Prompts are a capability like any other host tool: the configuration
//! resolver and the restore engine only see the [`Prompter`] trait, so
//! non-interactive runs and tests never touch a terminal.

use std::io::{self, BufRead, IsTerminal, Write};

use crate::error::{HostkeepError, HostkeepResult};

/// Asks the operator for values and confirmations
pub trait Prompter {
    /// Whether prompts can be answered at all
    fn is_interactive(&self) -> bool;

    /// Ask for a value. `None` means the operator gave no answer.
    fn ask(&self, key: &str, description: &str, default: Option<&str>)
        -> HostkeepResult<Option<String>>;

    /// Ask a yes/no question, defaulting to "no".
    fn confirm(&self, question: &str) -> HostkeepResult<bool>;
}

/// Prompts on stdin/stdout
pub struct TerminalPrompter;

impl TerminalPrompter {
    /// A terminal prompter when stdin is a TTY, otherwise a non-interactive one
    pub fn detect(non_interactive: bool) -> Box<dyn Prompter> {
        if non_interactive || !io::stdin().is_terminal() {
            Box::new(NonInteractive)
        } else {
            Box::new(TerminalPrompter)
        }
    }
}

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        true
    }

    fn ask(
        &self,
        key: &str,
        description: &str,
        default: Option<&str>,
    ) -> HostkeepResult<Option<String>> {
        let prompt = match default {
            Some(d) => format!("{} ({}) [{}]: ", description, key, d),
            None => format!("{} ({}): ", description, key),
        };
        let answer = prompt_string(&prompt)?;
        if answer.is_empty() {
            Ok(default.map(str::to_string))
        } else {
            Ok(Some(answer))
        }
    }

    fn confirm(&self, question: &str) -> HostkeepResult<bool> {
        let answer = prompt_string(&format!("{} (yes/no) [no]: ", question))?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Never prompts; confirmations are implied by the operator choosing
/// non-interactive mode
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    fn ask(&self, _key: &str, _description: &str, _default: Option<&str>)
        -> HostkeepResult<Option<String>> {
        Ok(None)
    }

    fn confirm(&self, _question: &str) -> HostkeepResult<bool> {
        Ok(true)
    }
}

/// Prompt for a string input
fn prompt_string(prompt: &str) -> HostkeepResult<String> {
    print!("{}", prompt);
    io::stdout()
        .flush()
        .map_err(|e| HostkeepError::Io(e.to_string()))?;

    let mut input = String::new();
    io::stdin()
        .lock()
        .read_line(&mut input)
        .map_err(|e| HostkeepError::Io(e.to_string()))?;

    Ok(input.trim().to_string())
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// Scripted answers for tests
    #[derive(Default)]
    pub struct ScriptedPrompter {
        pub answers: HashMap<String, String>,
        pub confirm_answer: bool,
        pub asked: RefCell<Vec<String>>,
    }

    impl Prompter for ScriptedPrompter {
        fn is_interactive(&self) -> bool {
            true
        }

        fn ask(&self, key: &str, _description: &str, default: Option<&str>)
            -> HostkeepResult<Option<String>> {
            self.asked.borrow_mut().push(key.to_string());
            Ok(self
                .answers
                .get(key)
                .cloned()
                .or_else(|| default.map(str::to_string)))
        }

        fn confirm(&self, question: &str) -> HostkeepResult<bool> {
            self.asked.borrow_mut().push(question.to_string());
            Ok(self.confirm_answer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_interactive_never_answers() {
        let prompter = NonInteractive;
        assert!(!prompter.is_interactive());
        assert_eq!(prompter.ask("DOMAIN", "Domain", Some("x")).unwrap(), None);
        assert!(prompter.confirm("Proceed?").unwrap());
    }

    #[test]
    fn test_detect_honours_flag() {
        let prompter = TerminalPrompter::detect(true);
        assert!(!prompter.is_interactive());
    }
}
