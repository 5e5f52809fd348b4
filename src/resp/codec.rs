use bytes::{Buf, BytesMut};

/// A command decoded off the wire: its bulk-string arguments, plus the exact
/// original bytes it was framed in (needed for byte-identical replication
/// propagation and for replica ack-offset accounting).
pub struct DecodedCommand {
    pub args: Vec<Vec<u8>>,
    pub raw: Vec<u8>,
}

/// Attempts to decode one command from the front of `buf`. Returns `Ok(None)`
/// if the buffer holds an incomplete frame (the caller should read more bytes
/// and retry), `Ok(Some(_))` on a complete frame (consumed bytes are removed
/// from `buf`), and `Err(())` on malformed framing — the connection must be
/// closed in that case.
pub fn decode_command(buf: &mut BytesMut) -> Result<Option<DecodedCommand>, ()> {
    match try_decode(&buf[..])? {
        Some((args, consumed)) => {
            let raw = buf[..consumed].to_vec();
            buf.advance(consumed);
            Ok(Some(DecodedCommand { args, raw }))
        }
        None => Ok(None),
    }
}

fn find_crlf(buf: &[u8], start: usize) -> Option<usize> {
    buf[start..].windows(2).position(|w| w == b"\r\n").map(|i| start + i)
}

fn try_decode(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, ()> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] == b'*' {
        decode_array(buf)
    } else {
        decode_inline(buf)
    }
}

fn decode_array(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, ()> {
    let header_end = match find_crlf(buf, 0) {
        Some(i) => i,
        None => return Ok(None),
    };
    let count: i64 = std::str::from_utf8(&buf[1..header_end])
        .map_err(|_| ())?
        .parse()
        .map_err(|_| ())?;
    if count < 0 {
        return Ok(Some((Vec::new(), header_end + 2)));
    }

    let mut pos = header_end + 2;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if pos >= buf.len() {
            return Ok(None);
        }
        if buf[pos] != b'$' {
            return Err(());
        }
        let len_end = match find_crlf(buf, pos) {
            Some(i) => i,
            None => return Ok(None),
        };
        let len: i64 = std::str::from_utf8(&buf[pos + 1..len_end])
            .map_err(|_| ())?
            .parse()
            .map_err(|_| ())?;
        if len < 0 {
            items.push(Vec::new());
            pos = len_end + 2;
            continue;
        }
        let data_start = len_end + 2;
        let data_end = data_start + len as usize;
        if buf.len() < data_end + 2 {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Err(());
        }
        items.push(buf[data_start..data_end].to_vec());
        pos = data_end + 2;
    }
    Ok(Some((items, pos)))
}

/// Plain-text fallback for clients (e.g. `nc`, `telnet`) that don't speak
/// RESP: a line of space-separated tokens.
fn decode_inline(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, ()> {
    let line_end = match find_crlf(buf, 0) {
        Some(i) => i,
        None => return Ok(None),
    };
    let line = std::str::from_utf8(&buf[..line_end]).map_err(|_| ())?;
    let items: Vec<Vec<u8>> = line.split_whitespace().map(|s| s.as_bytes().to_vec()).collect();
    if items.is_empty() {
        return Err(());
    }
    Ok(Some((items, line_end + 2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Vec<Vec<u8>>> {
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(cmd) = decode_command(&mut buf).unwrap() {
            out.push(cmd.args);
        }
        out
    }

    #[test]
    fn decodes_single_command() {
        let cmds = decode_all(b"*1\r\n$4\r\nPING\r\n");
        assert_eq!(cmds, vec![vec![b"PING".to_vec()]]);
    }

    #[test]
    fn decodes_set_with_three_args() {
        let cmds = decode_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(
            cmds,
            vec![vec![b"SET".to_vec(), b"foo".to_vec(), b"bar".to_vec()]]
        );
    }

    #[test]
    fn needs_more_bytes_on_partial_frame() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nfo"[..]);
        assert!(decode_command(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn handles_command_spanning_multiple_reads() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"*1\r\n$4\r\nPI");
        assert!(decode_command(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"NG\r\n");
        let cmd = decode_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.args, vec![b"PING".to_vec()]);
    }

    #[test]
    fn decodes_two_commands_from_one_buffer() {
        let cmds = decode_all(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n");
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn raw_bytes_match_original_encoding() {
        let mut buf = BytesMut::from(&b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"[..]);
        let cmd = decode_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.raw, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n".to_vec());
    }

    #[test]
    fn malformed_framing_is_rejected() {
        let mut buf = BytesMut::from(&b"*1\r\n+notbulk\r\n"[..]);
        assert!(decode_command(&mut buf).is_err());
    }

    #[test]
    fn inline_command_is_tolerated() {
        let mut buf = BytesMut::from(&b"PING\r\n"[..]);
        let cmd = decode_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.args, vec![b"PING".to_vec()]);
    }
}
