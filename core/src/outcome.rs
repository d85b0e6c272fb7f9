use ansi_term::{
    Color::{Green, Red, Yellow},
    Style,
};
use anyhow::{Error, anyhow};
use heck::ToKebabCase;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// How a spawned command ended.
#[derive(Clone, Copy, Debug, EnumIter, Eq, PartialEq)]
pub enum Outcome {
    /// The command exited with a non-zero status or was signaled.
    Failed,
    /// The watchdog killed the command.
    TimedOut,
    /// The command exited with status zero.
    Passed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_kebab_case())
    }
}

impl FromStr for Outcome {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Outcome::iter()
            .find(|outcome| outcome.to_string() == s)
            .ok_or_else(|| anyhow!("Unknown outcome `{s}`"))
    }
}

impl Outcome {
    #[must_use]
    pub fn style(self) -> Style {
        match self {
            Outcome::Failed => Red.normal(),
            Outcome::TimedOut => Yellow.normal(),
            Outcome::Passed => Green.normal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Outcome;

    #[test]
    fn display_round_trips() {
        assert_eq!(Outcome::TimedOut.to_string(), "timed-out");
        assert_eq!("timed-out".parse::<Outcome>().unwrap(), Outcome::TimedOut);
        assert!("unknown".parse::<Outcome>().is_err());
    }
}
