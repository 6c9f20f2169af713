//! Identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one logical execution (UUID v4 newtype).
///
/// Every event an engine emits is tagged with the token of the run that
/// produced it, so a consumer can tell a superseded run's late messages apart
/// from the current run's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunToken(pub Uuid);

impl RunToken {
    pub fn new() -> Self {
        RunToken(Uuid::new_v4())
    }
}

impl Default for RunToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_distinct() {
        assert_ne!(RunToken::new(), RunToken::new());
    }

    #[test]
    fn display_is_the_uuid() {
        let token = RunToken::new();
        assert_eq!(token.to_string(), token.0.to_string());
    }
}
