use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Operator credentials loaded once at startup, username -> password
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    /// Load credentials from a line-oriented file, one `username,password` per line
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credential file {}", path.display()))?;

        let store = Self::parse(&content);
        if store.is_empty() {
            warn!(path = %path.display(), "Credential file contains no valid entries");
        }

        Ok(store)
    }

    /// Parse credential lines. A line counts only when it splits into exactly
    /// two comma-separated fields; anything else is skipped. Fields are not
    /// trimmed. Duplicate usernames keep the last occurrence.
    pub fn parse(content: &str) -> Self {
        let mut users = HashMap::new();

        for line in content.lines() {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 2 {
                continue;
            }
            users.insert(fields[0].to_string(), fields[1].to_string());
        }

        Self { users }
    }

    /// Check a username/password pair against the store
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|expected| expected == password)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
