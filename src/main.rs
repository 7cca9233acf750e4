//! Socket Bridge demo CLI.
//!
//! Drives either platform adapter against its loopback library: registers
//! an echo listener, delivers one event as the remote peer would, answers
//! its acknowledgment, and prints what went over the wire.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use mlua::Lua;
use socket_bridge::json::{JsonArg, JsonSocket, LoopbackConnector};
use socket_bridge::lua::{LoopbackLuaConnector, LuaMarshal};
use socket_bridge::{Args, Marshal, SocketClient, SocketConfig, Value};

/// Native library to run against.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Platform {
    Json,
    Lua,
}

#[derive(Parser, Debug)]
#[command(name = "socket-bridge")]
#[command(version)]
#[command(about = "Echo an event through a loopback socket with an acknowledgment")]
struct Cli {
    /// Native platform
    #[arg(long, value_enum, default_value_t = Platform::Json)]
    platform: Platform,

    /// Server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Event name
    #[arg(long, default_value = "echo")]
    event: String,

    /// JSON payload delivered with the event
    #[arg(long, default_value = r#"{"message":"hello"}"#)]
    payload: String,

    /// Optional JSON client configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let payload: Value = serde_json::from_str(&cli.payload).context("Payload is not valid JSON")?;
    let config = cli
        .config
        .as_deref()
        .map(SocketConfig::load)
        .transpose()?;

    match cli.platform {
        Platform::Json => run_json(&cli, payload, config),
        Platform::Lua => run_lua(&cli, payload, config),
    }
}

/// Register a listener that logs the payload and answers its ack with it.
fn echo_listener<C: SocketClient>(client: &C, event: &str) -> Result<()> {
    client.on(
        event,
        Box::new(|args: Args| {
            log::info!("Received {:?}", args.values());
            let (values, ack) = args.into_parts();
            if let Some(ack) = ack {
                if let Err(e) = ack.send(values) {
                    log::warn!("Failed to answer acknowledgment: {}", e);
                }
            }
        }),
    )
    .map_err(|e| anyhow!("Failed to register '{event}' listener: {e}"))?;
    Ok(())
}

/// Emit `payload` and collect the acknowledgment once it arrives.
fn emit_collecting<C: SocketClient>(
    client: &C,
    event: &str,
    payload: Value,
) -> Result<Arc<Mutex<Option<Vec<Value>>>>> {
    let answer = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&answer);
    client.emit(
        event,
        payload,
        Some(Box::new(move |reply| {
            *sink.lock().expect("Answer mutex poisoned") = Some(reply);
        })),
    )
    .map_err(|e| anyhow!("Failed to emit '{event}': {e}"))?;
    Ok(answer)
}

fn run_json(cli: &Cli, payload: Value, config: Option<SocketConfig>) -> Result<()> {
    let connector = LoopbackConnector::new();
    let client = socket_bridge::json::io(&cli.url, config, &connector)
        .map_err(|e| anyhow!("Failed to create json client: {e}"))?;
    echo_listener(&client, &cli.event)?;

    let socket = connector.manager().namespace(client.url().path());
    let replies = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&replies);
    let peer_ack = socket_bridge::json::JsonAck::new(move |args| {
        sink.lock().expect("Replies mutex poisoned").extend(args);
    });
    socket.deliver(
        &cli.event,
        vec![JsonArg::Value(payload.to_json()), JsonArg::Ack(peer_ack)],
    );
    println!("peer got ack: {:?}", replies.lock().expect("Replies mutex poisoned"));

    let answer = emit_collecting(&client, &cli.event, payload)?;
    for emitted in socket.take_emitted() {
        println!("emitted '{}' with {} native arg(s)", emitted.event, emitted.args.len());
        if let Some(JsonArg::Ack(ack)) = emitted.args.last() {
            ack.call(vec![serde_json::json!("ok")]);
        }
    }
    println!("client got ack: {:?}", answer.lock().expect("Answer mutex poisoned"));

    client.disconnect();
    log::info!("Connected after disconnect: {}", JsonSocket::connected(&*socket));
    Ok(())
}

fn run_lua(cli: &Cli, payload: Value, config: Option<SocketConfig>) -> Result<()> {
    let lua = Lua::new();
    let marshal = LuaMarshal::new(lua.clone());
    let connector = LoopbackLuaConnector::new();
    let client = socket_bridge::lua::io(&lua, &cli.url, config, &connector)
        .map_err(|e| anyhow!("Failed to create lua client: {e}"))?;
    echo_listener(&client, &cli.event)?;

    let socket = connector
        .last_manager()
        .context("Lua connector did not create a manager")?
        .namespace(socket_bridge::lua::loopback::DEFAULT_NAMESPACE);
    let peer_ack = lua.create_function(|_, reply: mlua::MultiValue| {
        println!("peer got ack with {} value(s)", reply.len());
        Ok(())
    })
    .map_err(|e| anyhow!("Failed to create peer ack: {e}"))?;
    socket
        .deliver(
            &cli.event,
            vec![marshal.serialize(&payload), mlua::Value::Function(peer_ack)],
        )
        .map_err(|e| anyhow!("Failed to deliver '{}': {e}", cli.event))?;

    let answer = emit_collecting(&client, &cli.event, payload)?;
    for emitted in socket.take_emitted() {
        println!("emitted '{}' with {} item(s)", emitted.event, emitted.items.len());
        if let Some(ack) = emitted.ack {
            ack.call::<()>("ok")
                .map_err(|e| anyhow!("Failed to answer emit: {e}"))?;
        }
    }
    println!("client got ack: {:?}", answer.lock().expect("Answer mutex poisoned"));

    client.disconnect();
    log::info!("Status after disconnect: {}", client.status());
    Ok(())
}
