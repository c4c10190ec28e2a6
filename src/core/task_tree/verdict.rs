use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a task, ordered from best to worst.
///
/// Verdicts are folded up the tree with [`Verdict::merge`], so a parent is
/// never reported better than the worst child it ran.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Verdict {
    #[default]
    NotSet,
    Pass,
    Inconclusive,
    Fail,
    Error,
}

impl Verdict {
    pub const ALL: [Verdict; 5] = [
        Verdict::NotSet,
        Verdict::Pass,
        Verdict::Inconclusive,
        Verdict::Fail,
        Verdict::Error,
    ];

    /// Worst of the two verdicts.
    pub fn merge(self, other: Verdict) -> Verdict {
        std::cmp::max(self, other)
    }

    /// Fold any number of verdicts, starting from `NotSet`.
    pub fn fold<I>(verdicts: I) -> Verdict
    where
        I: IntoIterator<Item = Verdict>,
    {
        verdicts.into_iter().fold(Verdict::NotSet, Verdict::merge)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::NotSet => "NotSet",
            Verdict::Pass => "Pass",
            Verdict::Inconclusive => "Inconclusive",
            Verdict::Fail => "Fail",
            Verdict::Error => "Error",
        }
    }

    /// True for verdicts that should make a run exit unsuccessfully.
    pub fn is_failure(&self) -> bool {
        *self >= Verdict::Fail
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Verdict::ALL
            .iter()
            .copied()
            .find(|verdict| verdict.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "unknown verdict '{}'; expected one of NotSet, Pass, Inconclusive, Fail, Error",
                    value
                )
            })
    }
}
