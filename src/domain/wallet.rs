use std::fmt;

use serde::{Deserialize, Serialize};

/// A lowercase-hex wallet identifier. The system forbids mixed-case
/// comparisons anywhere (spec §3 "Wallet") — normalising on construction
/// instead of at every call site is the whole point of this newtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wallet(String);

impl Wallet {
    pub fn normalize(raw: &str) -> Self {
        Wallet(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Wallet {
    fn from(s: &str) -> Self {
        Wallet::normalize(s)
    }
}

impl From<String> for Wallet {
    fn from(s: String) -> Self {
        Wallet::normalize(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let a = Wallet::from(" 0xABCDEF ");
        let b = Wallet::from("0xabcdef");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef");
    }
}
