use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::io::{self, Read};

use crate::config::{NetConf, DEFAULT_CNI_VERSION};
use crate::plugin::BridgePlugin;
use crate::runtime::PinnedRuntime;
use crate::types::{CmdArgs, ErrorReply, VersionReply, CODE_INVALID_ENV, CODE_IO_FAILURE};

/// Parse command arguments from environment
pub fn parse_args() -> Result<CmdArgs> {
    // Get required environment variables
    let container_id = env::var("CNI_CONTAINERID")
        .context("CNI_CONTAINERID not found in environment")?;

    let netns = env::var("CNI_NETNS")
        .context("CNI_NETNS not found in environment")?;

    let ifname = env::var("CNI_IFNAME")
        .context("CNI_IFNAME not found in environment")?;

    let path = env::var("CNI_PATH").unwrap_or_default();

    // Get args (if any)
    let args_str = env::var("CNI_ARGS").unwrap_or_default();
    let args = parse_cni_args(&args_str);

    // Read stdin data
    let mut stdin_data = Vec::new();
    io::stdin().read_to_end(&mut stdin_data)
        .context("Failed to read from stdin")?;

    Ok(CmdArgs {
        container_id,
        netns,
        ifname,
        args,
        path,
        stdin_data,
    })
}

/// Parse CNI_ARGS string into key-value pairs
pub fn parse_cni_args(args_str: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();

    if !args_str.is_empty() {
        for pair in args_str.split(';') {
            if let Some(idx) = pair.find('=') {
                let key = pair[..idx].to_string();
                let value = pair[idx+1..].to_string();
                args.insert(key, value);
            }
        }
    }

    args
}

/// cniVersion of the stdin document, for stamping replies
fn cni_version_of(stdin_data: &[u8]) -> String {
    NetConf::parse(stdin_data)
        .map(|conf| conf.cni_version)
        .unwrap_or_else(|_| DEFAULT_CNI_VERSION.to_string())
}

/// Execute the add command
pub fn cmd_add(runtime: &PinnedRuntime, args: CmdArgs) -> Result<()> {
    let conf = NetConf::parse(&args.stdin_data)?;
    let plugin = BridgePlugin::new(conf, args);
    runtime.block_on(plugin.add_network())
        .context("ADD failed")?;
    Ok(())
}

/// Execute the delete command
pub fn cmd_del(runtime: &PinnedRuntime, args: CmdArgs) -> Result<()> {
    let conf = NetConf::parse(&args.stdin_data)?;
    let plugin = BridgePlugin::new(conf, args);
    runtime.block_on(plugin.del_network())
        .context("DEL failed")?;
    Ok(())
}

/// Execute the check command
pub fn cmd_check(runtime: &PinnedRuntime, args: CmdArgs) -> Result<()> {
    let conf = NetConf::parse(&args.stdin_data).unwrap_or_default();
    let plugin = BridgePlugin::new(conf, args);
    runtime.block_on(plugin.check_network())?;
    Ok(())
}

/// Main entry point for the CNI plugin
pub fn run_cni(runtime: &PinnedRuntime) -> std::result::Result<(), ErrorReply> {
    // Get command from environment
    let cmd = env::var("CNI_COMMAND").map_err(|_| {
        ErrorReply::new(DEFAULT_CNI_VERSION, CODE_INVALID_ENV, "CNI_COMMAND not found in environment")
    })?;

    if cmd == "VERSION" {
        return VersionReply::current()
            .print()
            .map_err(|e| ErrorReply::new(DEFAULT_CNI_VERSION, CODE_IO_FAILURE, e.to_string()));
    }

    let args = parse_args()
        .map_err(|e| ErrorReply::new(DEFAULT_CNI_VERSION, CODE_INVALID_ENV, format!("{e:#}")))?;
    let version = cni_version_of(&args.stdin_data);

    // Execute the appropriate command
    let result = match cmd.as_str() {
        "ADD" => cmd_add(runtime, args),
        "DEL" => cmd_del(runtime, args),
        "CHECK" => cmd_check(runtime, args),
        _ => {
            return Err(ErrorReply::new(
                &version,
                CODE_INVALID_ENV,
                format!("Unknown CNI command: {}", cmd),
            ))
        }
    };

    result.map_err(|e| ErrorReply::from_anyhow(&version, &e))
}
