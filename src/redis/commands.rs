/// A fully parsed client command, ready for dispatch. Arguments are owned so
/// a parsed command can be queued by MULTI and replayed later without
/// borrowing from the connection's decode buffer.
#[derive(Debug, Clone)]
pub enum RedisCommand {
    Ping,
    Echo(String),
    Get(String),
    Set {
        key: String,
        value: String,
        px_ms: Option<u64>,
    },
    Incr(String),
    Type(String),
    Keys(String),
    Config { subcommand: String, parameter: String },
    Info(String),
    Multi,
    Exec,
    Discard,
    XAdd {
        key: String,
        id_spec: String,
        fields: Vec<(String, String)>,
    },
    XRange { key: String, start: String, end: String },
    XRead {
        keys: Vec<String>,
        ids: Vec<String>,
        block_ms: Option<u64>,
        count: Option<usize>,
    },
    ReplconfListeningPort(String),
    ReplconfCapa,
    ReplconfAck(u64),
    ReplconfGetAck,
    Psync,
    Wait { num_replicas: i64, timeout_ms: i64 },
}

fn s(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn wrong_args(cmd: &str) -> String {
    format!("ERR wrong number of arguments for '{}' command", cmd.to_lowercase())
}

/// Parses a decoded command's arguments into a `RedisCommand`. The first
/// argument is the command name; everything else is positional.
pub fn parse(args: &[Vec<u8>]) -> Result<RedisCommand, String> {
    let name = s(&args[0]).to_uppercase();
    let rest: Vec<String> = args[1..].iter().map(|a| s(a)).collect();

    match name.as_str() {
        "PING" => Ok(RedisCommand::Ping),
        "ECHO" => rest
            .into_iter()
            .next()
            .map(RedisCommand::Echo)
            .ok_or_else(|| wrong_args("echo")),
        "SET" => parse_set(&rest),
        "GET" => rest
            .into_iter()
            .next()
            .map(RedisCommand::Get)
            .ok_or_else(|| wrong_args("get")),
        "INCR" => rest
            .into_iter()
            .next()
            .map(RedisCommand::Incr)
            .ok_or_else(|| wrong_args("incr")),
        "TYPE" => rest
            .into_iter()
            .next()
            .map(RedisCommand::Type)
            .ok_or_else(|| wrong_args("type")),
        "KEYS" => rest
            .into_iter()
            .next()
            .map(RedisCommand::Keys)
            .ok_or_else(|| wrong_args("keys")),
        "CONFIG" => {
            if rest.len() < 2 {
                return Err(wrong_args("config"));
            }
            Ok(RedisCommand::Config {
                subcommand: rest[0].to_uppercase(),
                parameter: rest[1].clone(),
            })
        }
        "INFO" => Ok(RedisCommand::Info(rest.into_iter().next().unwrap_or_default())),
        "MULTI" => Ok(RedisCommand::Multi),
        "EXEC" => Ok(RedisCommand::Exec),
        "DISCARD" => Ok(RedisCommand::Discard),
        "XADD" => parse_xadd(&rest),
        "XRANGE" => {
            if rest.len() != 3 {
                return Err(wrong_args("xrange"));
            }
            Ok(RedisCommand::XRange {
                key: rest[0].clone(),
                start: rest[1].clone(),
                end: rest[2].clone(),
            })
        }
        "XREAD" => parse_xread(&rest),
        "REPLCONF" => parse_replconf(&rest),
        "PSYNC" => Ok(RedisCommand::Psync),
        "WAIT" => {
            if rest.len() != 2 {
                return Err(wrong_args("wait"));
            }
            let num_replicas = rest[0]
                .parse()
                .map_err(|_| "ERR value is not an integer or out of range".to_string())?;
            let timeout_ms = rest[1]
                .parse()
                .map_err(|_| "ERR value is not an integer or out of range".to_string())?;
            Ok(RedisCommand::Wait { num_replicas, timeout_ms })
        }
        other => Err(format!("ERR unknown command '{}'", other)),
    }
}

fn parse_set(rest: &[String]) -> Result<RedisCommand, String> {
    if rest.len() < 2 {
        return Err(wrong_args("set"));
    }
    let key = rest[0].clone();
    let value = rest[1].clone();
    let mut px_ms = None;
    if rest.len() >= 4 {
        let opt = rest[2].to_uppercase();
        let n: u64 = rest[3]
            .parse()
            .map_err(|_| "ERR value is not an integer or out of range".to_string())?;
        match opt.as_str() {
            "PX" => px_ms = Some(n),
            "EX" => px_ms = Some(n * 1000),
            _ => return Err("ERR syntax error".to_string()),
        }
    } else if rest.len() == 3 {
        return Err("ERR syntax error".to_string());
    }
    Ok(RedisCommand::Set { key, value, px_ms })
}

fn parse_xadd(rest: &[String]) -> Result<RedisCommand, String> {
    if rest.len() < 4 || (rest.len() - 2) % 2 != 0 {
        return Err(wrong_args("xadd"));
    }
    let key = rest[0].clone();
    let id_spec = rest[1].clone();
    let mut fields = Vec::new();
    let mut i = 2;
    while i + 1 < rest.len() {
        fields.push((rest[i].clone(), rest[i + 1].clone()));
        i += 2;
    }
    Ok(RedisCommand::XAdd { key, id_spec, fields })
}

fn parse_xread(rest: &[String]) -> Result<RedisCommand, String> {
    let mut i = 0;
    let mut block_ms = None;
    let mut count = None;

    loop {
        match rest.get(i).map(|s| s.to_uppercase()) {
            Some(ref o) if o == "BLOCK" => {
                let ms: u64 = rest
                    .get(i + 1)
                    .ok_or_else(|| wrong_args("xread"))?
                    .parse()
                    .map_err(|_| "ERR timeout is not an integer or out of range".to_string())?;
                block_ms = Some(ms);
                i += 2;
            }
            Some(ref o) if o == "COUNT" => {
                let n: usize = rest
                    .get(i + 1)
                    .ok_or_else(|| wrong_args("xread"))?
                    .parse()
                    .map_err(|_| "ERR value is not an integer or out of range".to_string())?;
                count = Some(n);
                i += 2;
            }
            _ => break,
        }
    }

    if rest.get(i).map(|s| s.to_uppercase()).as_deref() != Some("STREAMS") {
        return Err(wrong_args("xread"));
    }
    i += 1;

    let remaining = &rest[i..];
    if remaining.is_empty() || remaining.len() % 2 != 0 {
        return Err(wrong_args("xread"));
    }
    let half = remaining.len() / 2;
    let keys = remaining[..half].to_vec();
    let ids = remaining[half..].to_vec();
    Ok(RedisCommand::XRead { keys, ids, block_ms, count })
}

fn parse_replconf(rest: &[String]) -> Result<RedisCommand, String> {
    if rest.is_empty() {
        return Err(wrong_args("replconf"));
    }
    match rest[0].to_uppercase().as_str() {
        "LISTENING-PORT" => rest
            .get(1)
            .cloned()
            .map(RedisCommand::ReplconfListeningPort)
            .ok_or_else(|| wrong_args("replconf")),
        "CAPA" => Ok(RedisCommand::ReplconfCapa),
        "GETACK" => Ok(RedisCommand::ReplconfGetAck),
        "ACK" => {
            let offset = rest
                .get(1)
                .ok_or_else(|| wrong_args("replconf"))?
                .parse()
                .map_err(|_| "ERR value is not an integer or out of range".to_string())?;
            Ok(RedisCommand::ReplconfAck(offset))
        }
        other => Err(format!("ERR unknown REPLCONF subcommand '{}'", other)),
    }
}
