//! Verdict returned to the client

use std::fmt;

/// Outcome of scoring one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the vote count reached the pass score
    pub passed: bool,
    /// Number of votes collected before the decision was made
    pub score: u32,
}

impl Verdict {
    pub fn new(passed: bool, score: u32) -> Self {
        Self { passed, score }
    }

    /// Wire form: `0,<score>` when passed, `1,<score>` otherwise.
    /// No trailing newline; the connection close ends the message.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse the wire form, as a client would
    pub fn parse(line: &str) -> Option<Self> {
        let (flag, score) = line.trim().split_once(',')?;
        let passed = match flag {
            "0" => true,
            "1" => false,
            _ => return None,
        };
        let score = score.parse().ok()?;
        Some(Self { passed, score })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = if self.passed { '0' } else { '1' };
        write!(f, "{},{}", flag, self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(Verdict::new(true, 2).encode(), "0,2");
        assert_eq!(Verdict::new(false, 0).encode(), "1,0");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Verdict::parse("0,3"), Some(Verdict::new(true, 3)));
        assert_eq!(Verdict::parse("1,1\n"), Some(Verdict::new(false, 1)));
        assert_eq!(Verdict::parse("2,1"), None);
        assert_eq!(Verdict::parse("0"), None);
        assert_eq!(Verdict::parse("0,-1"), None);
    }
}
