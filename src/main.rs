use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use anyhow::Context;

use keystone_kv::client_handler::ClientHandler;
use keystone_kv::redis::config;
use keystone_kv::redis::core::Redis;
use keystone_kv::replica_client;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = config::parse_args(&args).context("failed to parse command-line arguments")?;

    let addr = format!("{}:{}", config.addr, config.port);
    let is_replica = config.is_replica();

    let redis = Arc::new(Redis::new(config));

    if is_replica {
        let redis = Arc::clone(&redis);
        thread::spawn(move || replica_client::run(redis));
    }

    let listener = TcpListener::bind(&addr).with_context(|| format!("failed to bind {}", addr))?;
    println!("keystone-kv listening on {}", addr);

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let redis = Arc::clone(&redis);
                thread::spawn(move || {
                    ClientHandler::new(Box::new(stream), redis).run();
                });
            }
            Err(e) => eprintln!("keystone-kv: accept error: {}", e),
        }
    }

    Ok(())
}
