use crate::error::ConfigError;

/// Server configuration, built once at startup from CLI arguments and held
/// for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub port: String,
    pub addr: String,
    pub replicaof_host: Option<String>,
    pub replicaof_port: Option<String>,
    pub dir: String,
    pub dbfilename: String,
}

impl RedisConfig {
    pub fn new() -> Self {
        RedisConfig {
            port: "6379".to_string(),
            addr: "0.0.0.0".to_string(),
            replicaof_host: None,
            replicaof_port: None,
            dir: ".".to_string(),
            dbfilename: "dump.rdb".to_string(),
        }
    }

    pub fn is_replica(&self) -> bool {
        self.replicaof_host.is_some()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `--dir <d> --dbfilename <f> --port <p> --replicaof "<host> <port>"`
/// style arguments (as handed to us via `std::env::args()`, element 0 being
/// the binary name) into a populated `RedisConfig`.
pub fn parse_args(args: &[String]) -> Result<RedisConfig, ConfigError> {
    let mut config = RedisConfig::new();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" => {
                config.dir = next_value(args, i, "--dir")?;
                i += 2;
            }
            "--dbfilename" => {
                config.dbfilename = next_value(args, i, "--dbfilename")?;
                i += 2;
            }
            "--port" => {
                config.port = next_value(args, i, "--port")?;
                i += 2;
            }
            "--replicaof" => {
                let value = next_value(args, i, "--replicaof")?;
                let mut parts = value.splitn(2, ' ');
                let host = parts.next().unwrap_or_default().to_string();
                let port = parts.next().unwrap_or("6379").to_string();
                config.replicaof_host = Some(host);
                config.replicaof_port = Some(port);
                i += 2;
            }
            other => return Err(ConfigError::UnknownOption(other.to_string())),
        }
    }
    Ok(config)
}

fn next_value(args: &[String], i: usize, flag: &'static str) -> Result<String, ConfigError> {
    args.get(i + 1)
        .cloned()
        .ok_or(ConfigError::MissingValue(flag))
}
