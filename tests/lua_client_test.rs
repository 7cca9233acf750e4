//! Integration tests for the lua platform adapter.
//!
//! Every test drives a `LuaSocketClient` against the loopback library and
//! plays the remote peer through `LoopbackLuaSocket::deliver`. Peer-side
//! handlers are plain Lua chunks so the tests exercise real Lua values.

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use mlua::{Function, Lua, Value as LuaValue};
use serde_json::json;
use socket_bridge::lua::{
    self, LoopbackLuaConnector, LoopbackLuaSocket, LuaMarshal, LuaSocket, LuaSocketClient,
    SocketStatus,
};
use socket_bridge::{
    Args, EventCallback, Marshal, Query, SocketClient, SocketConfig, SocketError, Value,
};

const URL: &str = "http://localhost:3000";

/// Helper to create a connected client and its root loopback socket
fn connected_client(lua: &Lua) -> (LuaSocketClient, Rc<LoopbackLuaSocket>, LoopbackLuaConnector) {
    let connector = LoopbackLuaConnector::new();
    let client = lua::io(lua, URL, None, &connector).unwrap();
    let socket = connector.last_manager().unwrap().namespace("/");
    (client, socket, connector)
}

/// Listener recording every payload it sees and whether an ack came along.
fn recorder() -> (Arc<Mutex<Vec<(Vec<Value>, bool)>>>, EventCallback) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: EventCallback = Box::new(move |args: Args| {
        let has_ack = args.has_ack();
        sink.lock().unwrap().push((args.values().to_vec(), has_ack));
    });
    (seen, callback)
}

fn eval(lua: &Lua, chunk: &str) -> LuaValue {
    lua.load(chunk).eval().unwrap()
}

#[test]
fn test_io_connects_immediately() {
    let lua = Lua::new();
    let (client, socket, connector) = connected_client(&lua);

    assert!(client.connected());
    assert_eq!(socket.status(), SocketStatus::Connected);
    assert!(socket.connect_payload().is_none());

    let (url, options) = connector.last_opened().unwrap();
    assert_eq!(url.as_str(), "http://localhost:3000/");
    assert!(!options.log);
}

#[test]
fn test_new_does_not_connect() {
    let lua = Lua::new();
    let connector = LoopbackLuaConnector::new();
    let client = LuaSocketClient::new(&lua, URL, None, &connector).unwrap();

    assert!(client.disconnected());
    assert_eq!(client.status(), SocketStatus::NotConnected);
}

#[test]
fn test_listener_without_ack() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (seen, callback) = recorder();
    client.on("chat", callback).unwrap();

    let payload = eval(&lua, r#"return { text = "hi", tags = { "a", "b" } }"#);
    socket.deliver("chat", vec![payload]).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].0,
        vec![Value::from(json!({ "text": "hi", "tags": ["a", "b"] }))]
    );
    assert!(!seen[0].1);
}

#[test]
fn test_listener_with_ack_answers_peer() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    client
        .on(
            "question",
            Box::new(|mut args: Args| {
                if let Some(ack) = args.take_ack() {
                    let reply = Value::from_iter([("echo", args.values().to_vec())]);
                    ack.send(vec![reply, Value::Null]).unwrap();
                }
            }),
        )
        .unwrap();

    lua.globals().set("NULL", LuaValue::NULL).unwrap();
    let peer = eval(
        &lua,
        r#"return function(reply, extra)
            answer = reply.echo[1]
            extra_is_null = extra == NULL
        end"#,
    );
    let question = LuaValue::String(lua.create_string("why").unwrap());
    socket.deliver("question", vec![question, peer]).unwrap();

    assert_eq!(lua.globals().get::<String>("answer").unwrap(), "why");
    assert!(lua.globals().get::<bool>("extra_is_null").unwrap());
}

#[test]
fn test_callable_table_is_payload_not_ack() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (seen, callback) = recorder();
    client.on("pair", callback).unwrap();

    let callable = eval(&lua, r#"return setmetatable({ n = 1 }, { __call = function() end })"#);
    socket
        .deliver("pair", vec![LuaValue::Integer(7), callable])
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0],
        (vec![Value::from(7), Value::from(json!({ "n": 1 }))], false)
    );
}

#[test]
fn test_function_in_middle_is_undefined() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (seen, callback) = recorder();
    client.on("mixed", callback).unwrap();

    let func = eval(&lua, "return function() end");
    socket
        .deliver("mixed", vec![func, LuaValue::Boolean(true)])
        .unwrap();

    assert_eq!(
        seen.lock().unwrap()[0],
        (vec![Value::Undefined, Value::Bool(true)], false)
    );
}

#[test]
fn test_self_referencing_payload_is_delivered() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (seen, callback) = recorder();
    client.on("loop", callback).unwrap();

    let payload = eval(&lua, "local t = { name = 'x' }; t.self = t; return t");
    assert_eq!(socket.deliver("loop", vec![payload]).unwrap(), 1);

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0].0,
        vec![Value::from_iter([
            ("name", Value::from("x")),
            ("self", Value::Undefined),
        ])]
    );
}

#[test]
fn test_emit_without_ack_sends_one_item() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let marshal = LuaMarshal::new(lua.clone());

    client
        .emit("log", Value::from(json!({ "level": "info", "lines": [1, 2] })), None)
        .unwrap();

    let emitted = socket.take_emitted();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].event, "log");
    assert!(emitted[0].ack.is_none());
    assert_eq!(emitted[0].items.len(), 1);
    assert_eq!(
        marshal.deserialize(&emitted[0].items[0]),
        Value::from(json!({ "level": "info", "lines": [1, 2] }))
    );
}

#[test]
fn test_emit_with_ack_receives_answer_once() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let replies = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&replies);

    client
        .emit(
            "save",
            Value::from("doc"),
            Some(Box::new(move |reply| sink.lock().unwrap().push(reply))),
        )
        .unwrap();

    let mut emitted = socket.take_emitted();
    let ack: Function = emitted.remove(0).ack.unwrap();
    let answer = eval(&lua, r#"return { saved = true }"#);
    ack.call::<()>(answer).unwrap();
    ack.call::<()>("again").unwrap();

    let replies = replies.lock().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0], vec![Value::from(json!({ "saved": true }))]);
}

#[test]
fn test_empty_event_rejected_before_native_call() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (_seen, callback) = recorder();

    let err = client.emit("", Value::Null, None).unwrap_err();
    assert!(matches!(err, SocketError::InvalidArgument(_)));
    assert!(socket.take_emitted().is_empty());

    assert!(client.once("", callback).is_err());
    assert_eq!(socket.handler_count(""), 0);
}

#[test]
fn test_unsubscribe_is_idempotent_and_targeted() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (first_seen, first) = recorder();
    let (second_seen, second) = recorder();

    let sub = client.on("tick", first).unwrap();
    client.on("tick", second).unwrap();

    sub.unsubscribe();
    sub.unsubscribe();
    assert_eq!(sub.event(), "tick");
    assert_eq!(socket.handler_count("tick"), 1);

    socket.deliver("tick", vec![LuaValue::Integer(1)]).unwrap();
    assert!(first_seen.lock().unwrap().is_empty());
    assert_eq!(second_seen.lock().unwrap().len(), 1);
}

#[test]
fn test_once_fires_a_single_time() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (seen, callback) = recorder();
    client.once("ready", callback).unwrap();

    assert_eq!(socket.deliver("ready", vec![]).unwrap(), 1);
    assert_eq!(socket.deliver("ready", vec![]).unwrap(), 0);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_off_removes_every_listener_of_event() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (_first_seen, first) = recorder();
    let (_second_seen, second) = recorder();
    let (kept_seen, kept) = recorder();
    client.on("news", first).unwrap();
    client.on("news", second).unwrap();
    client.on("weather", kept).unwrap();

    client.off("news");

    assert_eq!(socket.deliver("news", vec![]).unwrap(), 0);
    assert_eq!(socket.deliver("weather", vec![]).unwrap(), 1);
    assert_eq!(kept_seen.lock().unwrap().len(), 1);
}

#[test]
fn test_namespace_joins_only_when_parent_connected() {
    let lua = Lua::new();
    let connector = LoopbackLuaConnector::new();
    let config = SocketConfig::default().with_auth(json!({ "token": "t" }));
    let client = LuaSocketClient::new(&lua, URL, Some(config), &connector).unwrap();
    let manager = connector.last_manager().unwrap();

    let lobby = client.of("/lobby").unwrap();
    assert!(!lobby.connected());

    client.connect();
    let admin = client.of("/admin").unwrap();
    assert!(admin.connected());

    let marshal = LuaMarshal::new(lua.clone());
    let payload = manager.namespace("/admin").connect_payload().unwrap();
    assert_eq!(marshal.deserialize(&payload), Value::from(json!({ "token": "t" })));

    admin.emit("kick", Value::from("bob"), None).unwrap();
    assert_eq!(manager.namespace("/admin").take_emitted().len(), 1);
    assert!(manager.namespace("/").take_emitted().is_empty());
}

#[test]
fn test_disconnect_fires_disconnect_listener() {
    let lua = Lua::new();
    let (client, socket, _connector) = connected_client(&lua);
    let (seen, callback) = recorder();
    client.on("disconnect", callback).unwrap();

    client.disconnect();

    assert!(client.disconnected());
    assert_eq!(socket.status(), SocketStatus::Disconnected);
    assert_eq!(
        seen.lock().unwrap()[0].0,
        vec![Value::from("io client disconnect")]
    );
}

#[test]
fn test_config_is_translated_for_connector() {
    let lua = Lua::new();
    let connector = LoopbackLuaConnector::new();
    let config = SocketConfig {
        cookie: vec!["sid=1; Path=/chat; Secure".into()],
        debug: true,
        ..SocketConfig::default()
    }
    .with_query(Query::Text("?room=main".into()))
    .with_transports(["websocket"]);

    lua::io(&lua, "http://localhost:3000/?v=4", Some(config), &connector).unwrap();

    let (_url, options) = connector.last_opened().unwrap();
    assert_eq!(options.connect_params.get("room").map(String::as_str), Some("main"));
    assert_eq!(options.connect_params.get("v").map(String::as_str), Some("4"));
    assert_eq!(options.cookies.len(), 1);
    assert_eq!(options.cookies[0].path, "/chat");
    assert!(options.cookies[0].secure);
    assert!(options.force_websockets);
    assert!(options.log);
}
