//! Operator confirmation before destructive steps.
//!
//! Either `--yes` was given, or the operator answers `y` on a terminal. A run
//! without a terminal and without `--yes` is refused before anything changes.

use std::io::{BufRead, Write};

use anyhow::{bail, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    AssumeYes,
    Interactive,
}

impl Confirmation {
    pub fn from_flag(yes: bool) -> Self {
        if yes {
            Confirmation::AssumeYes
        } else {
            Confirmation::Interactive
        }
    }

    /// Ask to go ahead with `action`. Returns an error when declined.
    pub fn confirm(self, action: &str) -> Result<()> {
        match self {
            Confirmation::AssumeYes => Ok(()),
            Confirmation::Interactive => {
                if !atty::is(atty::Stream::Stdin) {
                    bail!("{}: stdin is not a terminal, pass --yes to proceed", action);
                }
                let mut stderr = std::io::stderr().lock();
                write!(stderr, "{}. Continue? [y/N] ", action)?;
                stderr.flush()?;

                let mut answer = String::new();
                std::io::stdin().lock().read_line(&mut answer)?;
                if is_yes(&answer) {
                    Ok(())
                } else {
                    bail!("Aborted: {}", action)
                }
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assume_yes_never_prompts() {
        assert!(Confirmation::from_flag(true).confirm("drop everything").is_ok());
    }

    #[test]
    fn answers() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yeah"));
    }
}
