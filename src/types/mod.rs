use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SUPPORTED_VERSIONS;
use crate::error::{Error, CODE_PLUGIN_BASE};

/// CNI error code for missing or invalid environment variables.
pub const CODE_INVALID_ENV: u32 = 4;
/// CNI error code for an I/O failure.
pub const CODE_IO_FAILURE: u32 = 5;

/// CNI command arguments
#[derive(Debug, Clone)]
pub struct CmdArgs {
    /// Container ID
    pub container_id: String,
    /// Network namespace path
    pub netns: String,
    /// Interface name
    pub ifname: String,
    /// Arguments
    pub args: HashMap<String, String>,
    /// Path
    pub path: String,
    /// Standard input data
    pub stdin_data: Vec<u8>,
}

/// Error reply written when a command fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    /// CNI specification version
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    /// Well-known or plugin-specific error code
    pub code: u32,
    /// Short error message
    pub msg: String,
    /// Full error chain
    #[serde(default)]
    pub details: String,
}

impl ErrorReply {
    pub fn new(cni_version: &str, code: u32, msg: impl Into<String>) -> Self {
        Self {
            cni_version: cni_version.to_string(),
            code,
            msg: msg.into(),
            details: String::new(),
        }
    }

    /// Build a reply from an error chain, using the code of the first
    /// [`Error`] found in it.
    pub fn from_anyhow(cni_version: &str, err: &anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<Error>())
            .map_or(CODE_PLUGIN_BASE, Error::code);
        Self {
            cni_version: cni_version.to_string(),
            code,
            msg: err.to_string(),
            details: format!("{err:#}"),
        }
    }

    /// Full chain when known, else the short message
    pub fn details_or_msg(&self) -> &str {
        if self.details.is_empty() {
            &self.msg
        } else {
            &self.details
        }
    }

    /// Print reply as JSON
    pub fn print(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        println!("{}", json);
        Ok(())
    }
}

/// Reply to the VERSION command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionReply {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    #[serde(rename = "supportedVersions")]
    pub supported_versions: Vec<String>,
}

impl VersionReply {
    pub fn current() -> Self {
        Self {
            cni_version: crate::config::DEFAULT_CNI_VERSION.to_string(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Print reply as JSON
    pub fn print(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string(self)?;
        println!("{}", json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn error_reply_uses_cni_field_names() {
        let reply = ErrorReply::new("1.0.0", CODE_INVALID_ENV, "CNI_NETNS not found");
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["cniVersion"], "1.0.0");
        assert_eq!(value["code"], 4);
        assert_eq!(value["msg"], "CNI_NETNS not found");
    }

    #[test]
    fn error_reply_finds_code_under_context() {
        let err = Err::<(), _>(Error::Input("bridgeName is required".into()))
            .context("ADD failed")
            .unwrap_err();
        let reply = ErrorReply::from_anyhow("0.4.0", &err);
        assert_eq!(reply.code, 7);
        assert_eq!(reply.msg, "ADD failed");
        assert!(reply.details.contains("bridgeName is required"));
        assert_eq!(reply.details_or_msg(), reply.details);
        assert_eq!(ErrorReply::new("1.0.0", 4, "short").details_or_msg(), "short");
    }

    #[test]
    fn unknown_errors_get_generic_code() {
        let reply = ErrorReply::from_anyhow("1.0.0", &anyhow::anyhow!("boom"));
        assert_eq!(reply.code, 100);
    }

    #[test]
    fn version_reply_lists_supported_versions() {
        let value = serde_json::to_value(VersionReply::current()).unwrap();
        assert_eq!(value["supportedVersions"][3], "1.0.0");
    }
}
