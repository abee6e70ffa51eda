#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use peermail_gateway::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
smtp:
  listen: "127.0.0.1:2525"
peers:
  ack_timeout: 5000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.smtp.listen, "127.0.0.1:2525");
    assert_eq!(cfg.pop3.listen, "127.0.0.1:1110");
    assert!(cfg.peers.listen.is_none());
    assert_eq!(cfg.peers.ack_timeout(), Duration::from_secs(30));
    assert_eq!(cfg.smtp.max_message_bytes, 10 * 1024 * 1024);
}

#[test]
fn full_config_round_trip() {
    let room = "0f".repeat(32);
    let yaml = format!(
        r#"
version: 1
smtp:
  listen: "0.0.0.0:25"
  hostname: "mx.example"
  max_message_bytes: 4096
pop3:
  listen: "0.0.0.0:110"
peers:
  listen: "0.0.0.0:7400"
  ack_timeout_ms: 2000
  dial:
    - room: "{room}"
      addr: "10.0.0.2:7400"
gate:
  rules_path: "/var/lib/peermail/rules.json"
  whitelist_path: "/var/lib/peermail/whitelist.json"
"#
    );
    let cfg = config::load_from_str(&yaml).expect("must parse");
    assert_eq!(cfg.smtp.hostname, "mx.example");
    assert_eq!(cfg.smtp.max_message_bytes, 4096);
    assert_eq!(cfg.peers.ack_timeout(), Duration::from_millis(2000));
    assert_eq!(cfg.peers.dial.len(), 1);
    assert_eq!(cfg.peers.dial[0].addr, "10.0.0.2:7400");
    assert_eq!(cfg.smtp.listen_addr().unwrap().port(), 25);
}

#[test]
fn rejects_bad_values() {
    for bad in [
        "version: 2\n",
        "version: 1\nsmtp:\n  listen: \"nope\"\n",
        "version: 1\nsmtp:\n  max_message_bytes: 0\n",
        "version: 1\npeers:\n  ack_timeout_ms: 10\n",
        "version: 1\npeers:\n  dial:\n    - room: \"short\"\n      addr: \"h:1\"\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.code().as_str(), "CONFIG", "{bad}");
    }
}
