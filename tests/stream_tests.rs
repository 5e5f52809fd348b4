mod common;

use std::thread;
use std::time::Duration;

use keystone_kv::redis::config::RedisConfig;

use common::{connect, encode_command, roundtrip, start_server};

#[test]
fn xadd_returns_the_assigned_id() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    let reply = roundtrip(&mut client, &encode_command(&["XADD", "s", "1-1", "f", "v"]));
    assert_eq!(reply, b"$3\r\n1-1\r\n");
}

#[test]
fn xadd_rejects_an_id_not_greater_than_the_last_one() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    roundtrip(&mut client, &encode_command(&["XADD", "s", "5-5", "f", "v"]));
    let reply = roundtrip(&mut client, &encode_command(&["XADD", "s", "5-5", "f", "v"]));
    assert_eq!(
        reply,
        b"-ERR The ID specified in XADD is equal or smaller than the target stream top item\r\n"
    );
}

#[test]
fn xrange_returns_entries_within_the_inclusive_bounds() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    roundtrip(&mut client, &encode_command(&["XADD", "s", "1-1", "a", "1"]));
    roundtrip(&mut client, &encode_command(&["XADD", "s", "2-1", "b", "2"]));
    roundtrip(&mut client, &encode_command(&["XADD", "s", "3-1", "c", "3"]));

    let reply = roundtrip(&mut client, &encode_command(&["XRANGE", "s", "2-1", "3-1"]));
    let expected = b"*2\r\n\
*2\r\n$3\r\n2-1\r\n*2\r\n$1\r\nb\r\n$1\r\n2\r\n\
*2\r\n$3\r\n3-1\r\n*2\r\n$1\r\nc\r\n$1\r\n3\r\n";
    assert_eq!(reply, expected);
}

#[test]
fn xrange_on_a_missing_stream_is_an_empty_array() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    let reply = roundtrip(&mut client, &encode_command(&["XRANGE", "nope", "-", "+"]));
    assert_eq!(reply, b"*0\r\n");
}

#[test]
fn xread_without_block_returns_entries_after_the_given_id() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    roundtrip(&mut client, &encode_command(&["XADD", "s", "1-1", "a", "1"]));
    roundtrip(&mut client, &encode_command(&["XADD", "s", "2-1", "b", "2"]));

    let reply = roundtrip(
        &mut client,
        &encode_command(&["XREAD", "STREAMS", "s", "1-1"]),
    );
    let text = String::from_utf8_lossy(&reply);
    assert!(text.contains("2-1"));
    assert!(!text.contains("1-1"));
}

#[test]
fn xread_with_dollar_sign_waits_for_a_new_entry_only() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);
    let mut other = connect(addr);

    roundtrip(&mut client, &encode_command(&["XADD", "s", "1-1", "a", "1"]));

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        roundtrip(&mut other, &encode_command(&["XADD", "s", "2-1", "b", "2"]));
    });

    let reply = roundtrip(
        &mut client,
        &encode_command(&["XREAD", "BLOCK", "2000", "STREAMS", "s", "$"]),
    );
    let text = String::from_utf8_lossy(&reply);
    assert!(text.contains("2-1"));
    assert!(!text.contains("1-1"));
}

#[test]
fn blocking_xread_times_out_with_a_null_array_when_nothing_arrives() {
    let (_redis, addr) = start_server(RedisConfig::default());
    let mut client = connect(addr);

    let reply = roundtrip(
        &mut client,
        &encode_command(&["XREAD", "BLOCK", "100", "STREAMS", "s", "$"]),
    );
    assert_eq!(reply, b"*-1\r\n");
}
