//! Kernel command line reader.

use crate::error::{Error, Result};
use std::path::Path;
use tracing::debug;

/// The kernel boot-parameter line, split into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelCmdline {
    raw: String,
    tokens: Vec<String>,
}

impl KernelCmdline {
    /// Read the boot-parameter source once.
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Parse(format!("cannot read {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Read kernel command line");
        Ok(Self::parse(&raw))
    }

    /// Split a raw command line into tokens.
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.trim().to_string(),
            tokens: raw.split_ascii_whitespace().map(str::to_string).collect(),
        }
    }

    /// The command line as read, without surrounding whitespace.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// All tokens in order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Value of a `key=value` token. The last occurrence wins, as in the
    /// kernel.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tokens.iter().rev().find_map(|token| {
            token
                .split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }

    /// Value of the `root=` token.
    pub fn root_device(&self) -> Result<&str> {
        match self.get("root") {
            Some("") => Err(Error::Parse("root= token has an empty value".to_string())),
            Some(value) => Ok(value),
            None => Err(Error::Parse("no root= token on kernel command line".to_string())),
        }
    }
}
