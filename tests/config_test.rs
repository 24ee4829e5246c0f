use std::collections::HashMap;

use sbcni::config::{NetConf, PLUGIN_TYPE};
use sbcni::error::Error;
use sbcni::types::CmdArgs;
use sbcni::{BridgePlugin, PinnedRuntime};

fn test_args(conf: &NetConf, netns: &str, ifname: &str) -> Result<CmdArgs, Box<dyn std::error::Error>> {
    Ok(CmdArgs {
        container_id: "test-container".to_string(),
        netns: netns.to_string(),
        ifname: ifname.to_string(),
        args: HashMap::new(),
        path: "/opt/cni/bin".to_string(),
        stdin_data: serde_json::to_vec(conf)?,
    })
}

#[test]
fn test_net_conf_creation() -> Result<(), Box<dyn std::error::Error>> {
    let conf = NetConf::new_default("test-bridge", "br-test", Some("192.168.1.10/24"));

    assert_eq!(conf.cni_version, "1.0.0");
    assert_eq!(conf.name.as_deref(), Some("test-bridge"));
    assert_eq!(conf.plugin_type.as_deref(), Some(PLUGIN_TYPE));
    assert_eq!(conf.bridge_name.as_deref(), Some("br-test"));

    let spec = conf.attachment()?;
    assert_eq!(spec.bridge_name, "br-test");
    assert_eq!(spec.address.to_string(), "192.168.1.10/24");
    assert_eq!(spec.address.prefix(), 24);

    Ok(())
}

#[test]
fn test_net_conf_from_stdin_json() -> Result<(), Box<dyn std::error::Error>> {
    let stdin = br#"{
        "cniVersion": "0.4.0",
        "name": "pods",
        "type": "sbcni",
        "bridgeName": "br-test",
        "ip": "fd00::5/64",
        "ipam": {}
    }"#;
    let conf = NetConf::parse(stdin)?;
    let spec = conf.attachment()?;

    assert_eq!(conf.cni_version, "0.4.0");
    assert_eq!(spec.address.to_string(), "fd00::5/64");
    assert!(spec.address.ip().is_ipv6());

    Ok(())
}

#[test]
fn test_cmd_args_creation() -> Result<(), Box<dyn std::error::Error>> {
    let conf = NetConf::new_default("test-bridge", "br-test", Some("192.168.1.10/24"));
    let args = test_args(&conf, "/var/run/netns/test", "eth0")?;

    assert_eq!(args.container_id, "test-container");
    assert_eq!(args.netns, "/var/run/netns/test");
    assert_eq!(args.ifname, "eth0");
    assert!(args.args.is_empty());

    let round: NetConf = NetConf::parse(&args.stdin_data)?;
    assert_eq!(round.bridge_name.as_deref(), Some("br-test"));

    Ok(())
}

fn add_error(conf: NetConf, netns: &str, ifname: &str) -> Result<Error, Box<dyn std::error::Error>> {
    let runtime = PinnedRuntime::new()?;
    let args = test_args(&conf, netns, ifname)?;
    let plugin = BridgePlugin::new(conf, args);
    match runtime.block_on(plugin.add_network()) {
        Ok(()) => Err("add_network unexpectedly succeeded".into()),
        Err(e) => Ok(e),
    }
}

#[test]
fn test_add_rejects_empty_bridge_name() -> Result<(), Box<dyn std::error::Error>> {
    let conf = NetConf::new_default("test-bridge", "", Some("10.0.0.5/24"));
    let err = add_error(conf, "/nonexistent/netns", "eth0")?;
    assert!(matches!(err, Error::Input(_)), "got {err:?}");
    assert_eq!(err.code(), 7);
    Ok(())
}

#[test]
fn test_add_rejects_malformed_cidr() -> Result<(), Box<dyn std::error::Error>> {
    for ip in ["10.0.0.5", "10.0.0.5/33", "not-an-ip/24", ""] {
        let conf = NetConf::new_default("test-bridge", "br-test", Some(ip));
        let err = add_error(conf, "/nonexistent/netns", "eth0")?;
        assert!(matches!(err, Error::Input(_)), "{ip:?} gave {err:?}");
    }
    Ok(())
}

#[test]
fn test_add_rejects_missing_ip() -> Result<(), Box<dyn std::error::Error>> {
    let conf = NetConf::new_default("test-bridge", "br-test", None);
    let err = add_error(conf, "/nonexistent/netns", "eth0")?;
    assert!(matches!(err, Error::Input(_)), "got {err:?}");
    Ok(())
}

#[test]
fn test_add_rejects_bad_ifname() -> Result<(), Box<dyn std::error::Error>> {
    let conf = NetConf::new_default("test-bridge", "br-test", Some("10.0.0.5/24"));
    let err = add_error(conf, "/nonexistent/netns", "a-very-long-ifname")?;
    assert!(matches!(err, Error::Input(_)), "got {err:?}");
    Ok(())
}

#[test]
fn test_del_with_missing_namespace_is_namespace_error() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = PinnedRuntime::new()?;
    let conf = NetConf::new_default("test-bridge", "br-test", None);
    let args = test_args(&conf, "/nonexistent/netns", "eth0")?;
    let plugin = BridgePlugin::new(conf, args);

    let err = match runtime.block_on(plugin.del_network()) {
        Ok(()) => return Err("del_network unexpectedly succeeded".into()),
        Err(e) => e,
    };
    assert!(matches!(err, Error::Namespace { .. }), "got {err:?}");
    assert_eq!(err.code(), 101);
    Ok(())
}

#[test]
fn test_check_always_succeeds() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = PinnedRuntime::new()?;
    let conf = NetConf::default();
    let args = test_args(&conf, "", "")?;
    runtime.block_on(BridgePlugin::new(conf, args).check_network())?;
    Ok(())
}
