use thiserror::Error;

/// Failures while loading an RDB snapshot. Fatal to the load call only — the
/// caller always falls back to an empty keyspace rather than aborting startup.
#[derive(Debug, Error)]
pub enum RdbError {
    #[error("failed to open RDB file: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a valid RDB file: bad magic header")]
    BadMagic,
    #[error("unexpected end of RDB file while reading {0}")]
    Truncated(&'static str),
    #[error("unsupported RDB value type {0}")]
    UnsupportedValueType(u8),
    #[error("unsupported RDB length/string encoding")]
    UnsupportedEncoding,
}

/// Failures while parsing CLI arguments into a `RedisConfig`. Fatal to
/// startup; reported on stderr before the process exits.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("option '{0}' requires an argument")]
    MissingValue(&'static str),
}
