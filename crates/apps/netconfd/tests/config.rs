use netconf_daemon::config::AgentConfig;

#[test]
fn defaults_are_stable() {
    let config = AgentConfig::default();
    assert_eq!(config.bind, "127.0.0.1:8300");
    assert!(config.store_path.is_none());
    assert!(config.extra_capabilities.is_empty());
}

#[test]
fn parses_full_config() {
    let input = r#"
bind = "0.0.0.0:9300"
store_path = "/var/lib/netconfd"
extra_capabilities = ["urn:ietf:params:xml:ns:yang:ietf-system"]
"#;
    let config = AgentConfig::from_toml(input).expect("parse");
    assert_eq!(config.bind, "0.0.0.0:9300");
    assert_eq!(config.store_path.as_deref(), Some("/var/lib/netconfd"));
    assert_eq!(
        config.extra_capabilities,
        vec!["urn:ietf:params:xml:ns:yang:ietf-system".to_string()]
    );
}

#[test]
fn partial_config_falls_back_to_defaults() {
    let config = AgentConfig::from_toml("bind = \"127.0.0.1:1830\"").expect("parse");
    assert_eq!(config.bind, "127.0.0.1:1830");
    assert!(config.store_path.is_none());
}

#[test]
fn example_toml_round_trips() {
    let example = AgentConfig::example_toml();
    let config = AgentConfig::from_toml(&example).expect("parse example");
    assert_eq!(config, AgentConfig::default());
}

#[test]
fn loads_from_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("netconfd.toml");
    std::fs::write(&path, "bind = \"127.0.0.1:0\"\n").expect("write");
    let config = AgentConfig::load_from_path(&path).expect("load");
    assert_eq!(config.bind, "127.0.0.1:0");

    assert!(AgentConfig::load_from_path(&dir.path().join("missing.toml")).is_err());
}
