/// A RESP value as sent back to a client (or propagated to a replica when we
/// choose to re-encode rather than forward the original bytes verbatim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    NullBulk,
    NullArray,
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::Simple("OK".to_string())
    }

    pub fn bulk(s: impl Into<Vec<u8>>) -> Self {
        RespValue::Bulk(s.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        RespValue::Error(msg.into())
    }

    pub fn array_of_bulks<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        RespValue::Array(items.into_iter().map(RespValue::bulk).collect())
    }

    /// Encodes this value as the exact bytes written to the wire.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RespValue::Simple(s) => format!("+{}\r\n", s).into_bytes(),
            RespValue::Error(s) => format!("-{}\r\n", s).into_bytes(),
            RespValue::Integer(i) => format!(":{}\r\n", i).into_bytes(),
            RespValue::Bulk(bytes) => {
                let mut out = format!("${}\r\n", bytes.len()).into_bytes();
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
                out
            }
            RespValue::NullBulk => b"$-1\r\n".to_vec(),
            RespValue::NullArray => b"*-1\r\n".to_vec(),
            RespValue::Array(items) => {
                let mut out = format!("*{}\r\n", items.len()).into_bytes();
                for item in items {
                    out.extend(item.encode());
                }
                out
            }
        }
    }
}

/// Encodes a command (array of bulk strings) the way a client or replica
/// would send it. Used for re-encoding propagated commands whose original
/// bytes weren't retained (e.g. synthetic GETACK broadcasts).
pub fn encode_command(parts: &[&[u8]]) -> Vec<u8> {
    RespValue::Array(parts.iter().map(|p| RespValue::Bulk(p.to_vec())).collect()).encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_simple_and_bulk_and_array() {
        assert_eq!(RespValue::ok().encode(), b"+OK\r\n");
        assert_eq!(RespValue::bulk("hi").encode(), b"$2\r\nhi\r\n");
        assert_eq!(RespValue::NullBulk.encode(), b"$-1\r\n");
        assert_eq!(
            RespValue::array_of_bulks(["a", "b"]).encode(),
            b"*2\r\n$1\r\na\r\n$1\r\nb\r\n"
        );
    }

    #[test]
    fn encode_command_matches_getack() {
        let bytes = encode_command(&[b"REPLCONF", b"GETACK", b"*"]);
        assert_eq!(bytes, b"*3\r\n$8\r\nREPLCONF\r\n$6\r\nGETACK\r\n$1\r\n*\r\n");
    }
}
