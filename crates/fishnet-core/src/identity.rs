//! Client identification, used both as the HTTP `User-Agent` and embedded in every
//! outgoing request envelope (acquire/analysis/move/abort).

use serde::{Deserialize, Serialize};

/// Name, version, and platform triple identifying this client build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Binary name, e.g. `fishnet`.
    pub name: String,
    /// Crate version (`CARGO_PKG_VERSION`).
    pub version: String,
    /// `std::env::consts::OS` at build time.
    pub os: String,
    /// `std::env::consts::ARCH` at build time.
    pub arch: String,
}

impl ClientIdentity {
    /// Identity for the binary actually running.
    pub fn current() -> Self {
        Self {
            name: "fishnet".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Value for the `User-Agent` HTTP header.
    pub fn user_agent(&self) -> String {
        format!("{}-{}-{}/{}", self.name, self.os, self.arch, self.version)
    }
}
