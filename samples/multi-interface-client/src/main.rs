// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! This client shows how to reach two devices that answer on the same address, each through its
//! own network card. It will:
//!
//! 1. List the interface addresses of this host
//! 2. Connect to the first endpoint from the first local address
//! 3. Connect to the second endpoint from the second local address
//! 4. Read a node from each, the server's current time by default, and disconnect
use std::{str::FromStr, time::Duration};

use opcua_multihomed::{
    client::{ClientBuilder, IdentityToken, Session},
    net,
    types::{DateTime, NodeId, StatusCode},
};

struct Args {
    help: bool,
    url_a: String,
    local_a: String,
    url_b: String,
    local_b: String,
    node: NodeId,
    timeout: u64,
}

impl Args {
    pub fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
        let mut args = pico_args::Arguments::from_env();
        Ok(Args {
            help: args.contains(["-h", "--help"]),
            url_a: args
                .opt_value_from_str("--url-a")?
                .unwrap_or_else(|| String::from(DEFAULT_URL)),
            local_a: args
                .opt_value_from_str("--local-a")?
                .unwrap_or_else(|| String::from(DEFAULT_LOCAL_A)),
            url_b: args
                .opt_value_from_str("--url-b")?
                .unwrap_or_else(|| String::from(DEFAULT_URL)),
            local_b: args
                .opt_value_from_str("--local-b")?
                .unwrap_or_else(|| String::from(DEFAULT_LOCAL_B)),
            node: args
                .opt_value_from_fn("--node", NodeId::from_str)?
                .map_or_else(|| NodeId::from_str(DEFAULT_NODE), Ok)?,
            timeout: args.opt_value_from_str("--timeout")?.unwrap_or(10),
        })
    }

    pub fn usage() {
        println!(
            r#"Multi Interface Client
Usage:
  -h, --help           Show help
  --url-a [url]        Url of the first device (default: {url})
  --local-a [address]  Local address to reach the first device from (default: {a})
  --url-b [url]        Url of the second device (default: {url})
  --local-b [address]  Local address to reach the second device from (default: {b})
  --node [node id]     Node to read, e.g. "ns=2;s=Temperature" (default: {node})
  --timeout [secs]     Seconds to wait for each connection (default: 10)

A local address is "ip:port", use port 0 for any port. An empty address lets the
operating system choose."#,
            url = DEFAULT_URL,
            a = DEFAULT_LOCAL_A,
            b = DEFAULT_LOCAL_B,
            node = DEFAULT_NODE,
        );
    }
}

const DEFAULT_URL: &str = "opc.tcp://192.168.100.1:4840";
const DEFAULT_LOCAL_A: &str = "192.168.100.10:0";
const DEFAULT_LOCAL_B: &str = "192.168.100.20:0";
// Server_ServerStatus_CurrentTime
const DEFAULT_NODE: &str = "i=2258";

#[tokio::main]
async fn main() -> Result<(), ()> {
    let args = Args::parse_args().map_err(|_| Args::usage())?;
    if args.help {
        Args::usage();
        return Ok(());
    }

    // Optional - enable OPC UA logging
    opcua_multihomed::console_logging::init();

    match net::interfaces() {
        Ok(interfaces) => {
            println!("Interface addresses:");
            for i in interfaces.iter().filter(|i| !i.is_loopback) {
                println!("  {:<12} {}", i.name, i.ip);
            }
        }
        Err(e) => println!("Cannot list interfaces: {}", e),
    }

    let client = ClientBuilder::new()
        .application_name("Multi Interface Client")
        .application_uri("urn:MultiInterfaceClient")
        .product_uri("urn:MultiInterfaceClient")
        .auto_reconnect(true)
        .reconnect_interval(Duration::from_secs(5))
        .session_retry_limit(3)
        .client()
        .ok_or(())?;

    let timeout = Duration::from_secs(args.timeout);
    let mut sessions = Vec::new();
    for (name, url, local) in [
        ("A", &args.url_a, &args.local_a),
        ("B", &args.url_b, &args.local_b),
    ] {
        println!("Connecting to device {} at {} from \"{}\"", name, url, local);
        match client
            .connect(url, local, IdentityToken::Anonymous, timeout)
            .await
        {
            Ok((session, handle)) => {
                if let Err(e) = read_value(name, &session, &args.node).await {
                    println!("Device {}: read failed, {}", name, e);
                }
                sessions.push((name, session, handle));
            }
            Err(e) => println!("Device {}: cannot connect, {}", name, e),
        }
    }

    for (name, session, handle) in sessions {
        if let Err(e) = session.disconnect().await {
            println!("Device {}: disconnect failed, {}", name, e);
        }
        let _ = handle.await;
    }
    Ok(())
}

async fn read_value(name: &str, session: &Session, node_id: &NodeId) -> Result<(), StatusCode> {
    // Read with a max age of 2s, asking for both timestamps
    let value = session.read_node(node_id).await?;
    let status = value.status();
    if status.is_bad() {
        println!("Device {}: {} has status {}", name, node_id, status);
        return Ok(());
    }
    match &value.value {
        Some(v) => println!("Device {}: {} = {} ({:?})", name, node_id, v, v.type_id()),
        None => println!("Device {}: {} has no value", name, node_id),
    }
    println!(
        "Device {}: server timestamp {}, source timestamp {}",
        name,
        timestamp(value.server_timestamp),
        timestamp(value.source_timestamp)
    );
    Ok(())
}

fn timestamp(t: Option<DateTime>) -> String {
    t.map_or_else(|| "-".to_string(), |t| t.to_string())
}
