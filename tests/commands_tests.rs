mod common;

use std::thread;
use std::time::Duration;

use keystone_kv::redis::config::RedisConfig;

use common::{connect, encode_command, roundtrip, start_server};

#[test]
fn ping_and_echo() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    assert_eq!(roundtrip(&mut client, &encode_command(&["PING"])), b"+PONG\r\n");
    assert_eq!(
        roundtrip(&mut client, &encode_command(&["ECHO", "hello"])),
        b"$5\r\nhello\r\n"
    );
}

#[test]
fn set_and_get_round_trip() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    assert_eq!(
        roundtrip(&mut client, &encode_command(&["SET", "foo", "bar"])),
        b"+OK\r\n"
    );
    assert_eq!(
        roundtrip(&mut client, &encode_command(&["GET", "foo"])),
        b"$3\r\nbar\r\n"
    );
    assert_eq!(
        roundtrip(&mut client, &encode_command(&["GET", "missing"])),
        b"$-1\r\n"
    );
}

#[test]
fn set_with_px_expires_and_is_lazily_removed() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    roundtrip(&mut client, &encode_command(&["SET", "k", "v", "PX", "50"]));
    assert_eq!(roundtrip(&mut client, &encode_command(&["GET", "k"])), b"$1\r\nv\r\n");

    thread::sleep(Duration::from_millis(100));
    assert_eq!(roundtrip(&mut client, &encode_command(&["GET", "k"])), b"$-1\r\n");
    assert_eq!(
        roundtrip(&mut client, &encode_command(&["TYPE", "k"])),
        b"+none\r\n"
    );
}

#[test]
fn incr_from_absent_then_present_then_non_integer() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    assert_eq!(roundtrip(&mut client, &encode_command(&["INCR", "n"])), b":1\r\n");
    assert_eq!(roundtrip(&mut client, &encode_command(&["INCR", "n"])), b":2\r\n");

    roundtrip(&mut client, &encode_command(&["SET", "n", "abc"]));
    let reply = roundtrip(&mut client, &encode_command(&["INCR", "n"]));
    assert_eq!(reply, b"-ERR value is not an integer or out of range\r\n");
}

#[test]
fn a_key_holding_a_stream_is_not_readable_or_incrable_as_a_string() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    roundtrip(&mut client, &encode_command(&["XADD", "s", "1-1", "f", "v"]));

    let wrongtype = b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n";
    assert_eq!(roundtrip(&mut client, &encode_command(&["GET", "s"])), wrongtype);
    assert_eq!(roundtrip(&mut client, &encode_command(&["INCR", "s"])), wrongtype);
}

#[test]
fn type_reports_string_stream_or_none() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    assert_eq!(roundtrip(&mut client, &encode_command(&["TYPE", "nope"])), b"+none\r\n");
    roundtrip(&mut client, &encode_command(&["SET", "s", "v"]));
    assert_eq!(roundtrip(&mut client, &encode_command(&["TYPE", "s"])), b"+string\r\n");
    roundtrip(
        &mut client,
        &encode_command(&["XADD", "st", "1-1", "f", "v"]),
    );
    assert_eq!(roundtrip(&mut client, &encode_command(&["TYPE", "st"])), b"+stream\r\n");
}

#[test]
fn keys_returns_all_current_keys_in_a_single_array() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    roundtrip(&mut client, &encode_command(&["SET", "a", "1"]));
    roundtrip(&mut client, &encode_command(&["SET", "b", "2"]));
    let reply = roundtrip(&mut client, &encode_command(&["KEYS", "*"]));
    let text = String::from_utf8_lossy(&reply);
    assert!(text.starts_with("*2\r\n"));
    assert!(text.contains("a"));
    assert!(text.contains("b"));
}

#[test]
fn config_get_reports_dir_and_dbfilename() {
    let mut config = RedisConfig::default();
    config.dir = "/tmp".to_string();
    config.dbfilename = "dump.rdb".to_string();
    let (_redis, addr) = start_server(config);
    let mut client = connect(addr);

    let reply = roundtrip(&mut client, &encode_command(&["CONFIG", "GET", "dir"]));
    assert_eq!(reply, b"*2\r\n$3\r\ndir\r\n$4\r\n/tmp\r\n");
}

#[test]
fn info_replication_reports_master_role_when_unreplicated() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    let reply = roundtrip(&mut client, &encode_command(&["INFO", "replication"]));
    let text = String::from_utf8_lossy(&reply);
    assert!(text.contains("role:master"));
}

#[test]
fn exec_without_multi_and_discard_without_multi_error() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    assert_eq!(
        roundtrip(&mut client, &encode_command(&["EXEC"])),
        b"-ERR EXEC without MULTI\r\n"
    );
    assert_eq!(
        roundtrip(&mut client, &encode_command(&["DISCARD"])),
        b"-ERR DISCARD without MULTI\r\n"
    );
}
