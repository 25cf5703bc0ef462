use pedal_host::client::RpcClient;
use pedal_host::config::{DisplayNames, PresetTable};
use pedal_host::hardware::HardwareBridge;
use pedal_host::session::Session;
use pedal_host::transport::RpcTransport;
use pedal_protocol::StatusFrame;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Default)]
struct EngineState {
    params: HashMap<String, Value>,
    notifications: Vec<(String, Vec<Value>)>,
}

impl EngineState {
    fn seeded() -> Self {
        let mut params = HashMap::new();
        params.insert("system.current_bank".to_string(), json!("FOO"));
        params.insert("system.current_preset".to_string(), json!("p1"));
        params.insert("wah.freq".to_string(), json!(50));
        params.insert("amp.drive".to_string(), json!(0.5));
        params.insert("vol.gain".to_string(), json!(0));
        Self {
            params,
            notifications: Vec::new(),
        }
    }
}

fn banks_result() -> Value {
    json!([
        {"name": "FOO", "presets": ["p1", "p2"]},
        {"name": "BAR", "presets": ["q1"]},
    ])
}

fn parameter_list_result(state: &EngineState) -> Value {
    let mut ids: Vec<&String> = state.params.keys().collect();
    ids.sort();
    let mut entries = Vec::new();
    for id in ids {
        let mut descriptor = json!({ "id": id });
        if id.starts_with("system.") {
            descriptor["non_preset"] = json!("1");
        }
        entries.push(json!("Float"));
        entries.push(json!({ "Parameter": descriptor }));
    }
    Value::Array(entries)
}

fn handle_request(state: &mut EngineState, request: &Value) -> Option<Value> {
    let method = request["method"].as_str().unwrap_or_default();
    let params: Vec<Value> = request["params"].as_array().cloned().unwrap_or_default();

    if request.get("id").is_none() {
        state
            .notifications
            .push((method.to_string(), params.clone()));
    }

    match method {
        "banks" => Some(banks_result()),
        "parameterlist" => Some(parameter_list_result(state)),
        "get" => {
            let id = params.first().and_then(Value::as_str).unwrap_or_default();
            let value = state.params.get(id).cloned().unwrap_or(json!(0));
            Some(json!({ id: value }))
        }
        "set" => {
            let id = params.first().and_then(Value::as_str).unwrap_or_default();
            let value = params.get(1).cloned().unwrap_or(Value::Null);
            state.params.insert(id.to_string(), value);
            None
        }
        "setpreset" => {
            if let (Some(bank), Some(preset)) = (
                params.first().and_then(Value::as_str),
                params.get(1).and_then(Value::as_str),
            ) {
                state
                    .params
                    .insert("system.current_bank".to_string(), json!(bank));
                state
                    .params
                    .insert("system.current_preset".to_string(), json!(preset));
            }
            None
        }
        other => panic!("mock engine got unexpected method {other}"),
    }
}

/// Serves the engine dialect to exactly one client, then returns.
fn spawn_engine() -> (SocketAddr, Arc<Mutex<EngineState>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock engine");
    let addr = listener.local_addr().expect("local addr");
    let state = Arc::new(Mutex::new(EngineState::seeded()));
    let state_for_thread = Arc::clone(&state);

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept host");
        let mut buf: Vec<u8> = Vec::new();
        loop {
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let request: Value =
                    serde_json::from_slice(&line[..line.len() - 1]).expect("valid request json");
                let reply = {
                    let mut state = state_for_thread.lock().expect("engine state lock");
                    handle_request(&mut state, &request)
                };
                if let Some(result) = reply {
                    if request.get("id").is_some() {
                        let mut out =
                            serde_json::to_vec(&json!({"id": request["id"], "result": result}))
                                .expect("encode reply");
                        out.push(b'\n');
                        stream.write_all(&out).expect("write reply");
                    }
                }
            }
            let mut chunk = [0u8; 4096];
            match stream.read(&mut chunk) {
                Ok(0) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::ConnectionReset => return,
                Err(e) => panic!("mock engine read failed: {e}"),
            }
        }
    });

    (addr, state, handle)
}

fn connect_client(addr: SocketAddr) -> RpcClient<TcpStream> {
    let stream = TcpStream::connect(addr).expect("connect mock engine");
    stream.set_nodelay(true).expect("nodelay");
    RpcClient::new(RpcTransport::new(stream))
}

fn preset_table() -> PresetTable {
    serde_json::from_str(
        r#"{
            "banks": {
                "FOO": {
                    "p1": {"switches": ["wah.freq", "", "amp.drive"]}
                }
            },
            "default": {"switches": ["vol.gain"]}
        }"#,
    )
    .expect("preset table json")
}

fn display_names() -> DisplayNames {
    serde_json::from_str(r#"{"wah.freq": "Wah Freq"}"#).expect("display names json")
}

#[test]
fn banks_current_preset_and_set_get_cycle() {
    let (addr, state, handle) = spawn_engine();
    let mut client = connect_client(addr);

    let banks = client.banks().expect("banks");
    assert_eq!(banks.len(), 2);
    assert_eq!(banks[0].name, "FOO");
    assert_eq!(banks[0].presets, vec!["p1", "p2"]);
    assert_eq!(banks[1].name, "BAR");

    let (bank, preset) = client.current_preset().expect("current preset");
    assert_eq!((bank.as_str(), preset.as_str()), ("FOO", "p1"));

    client.set("wah.freq", json!(75)).expect("set");
    let result = client.get("wah.freq").expect("get");
    assert_eq!(result, json!({"wah.freq": 75}));

    let ids = client.parameter_list().expect("parameter list");
    assert!(ids.contains(&"wah.freq".to_string()));
    assert!(ids.contains(&"system.current_bank".to_string()));

    drop(client);
    handle.join().expect("engine thread");
    let state = state.lock().expect("state lock");
    assert_eq!(
        state.notifications,
        vec![("set".to_string(), vec![json!("wah.freq"), json!(75)])]
    );
}

#[test]
fn session_bridges_one_frame_end_to_end() {
    let (addr, state, handle) = spawn_engine();
    let client = connect_client(addr);

    // Loopback socket pair standing in for the serial link.
    let hw_listener = TcpListener::bind("127.0.0.1:0").expect("bind hw peer");
    let hw_addr = hw_listener.local_addr().expect("hw addr");
    let host_side = TcpStream::connect(hw_addr).expect("connect hw");
    host_side
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("hw timeout");
    let (mut controller_side, _) = hw_listener.accept().expect("accept hw");

    let mut session =
        Session::start(client, preset_table(), display_names()).expect("session start");
    let mut bridge = HardwareBridge::new(host_side);

    // The controller pushes one frame: three pedals plus a next-bank tap.
    controller_side
        .write_all(b"{\"pedals\": [10, 99, 20], \"ui_action\": \"nxbk\"}\n")
        .expect("write frame");

    session.step(&mut bridge).expect("step");

    // The status frame comes back on the same link and reflects the preset
    // that was active when the frame was read.
    let mut reader = std::io::BufReader::new(&mut controller_side);
    let mut line = String::new();
    std::io::BufRead::read_line(&mut reader, &mut line).expect("read status");
    let status: StatusFrame = serde_json::from_str(&line).expect("status json");
    assert_eq!(status.bank, "FOO");
    assert_eq!(status.preset, "p1");
    assert_eq!(status.pedals_onoff.len(), 3);
    assert_eq!(status.pedals_onoff[0].name, "Wah Freq");
    assert_eq!(status.pedals_onoff[0].value, json!(10.0));
    assert_eq!(status.pedals_onoff[1].name, "NO_DAT");
    assert_eq!(status.pedals_onoff[2].name, "amp.drive");
    assert_eq!(status.pedals_onoff[2].value, json!(20.0));

    drop(session);
    handle.join().expect("engine thread");
    let state = state.lock().expect("state lock");

    // Pedal values landed in the engine.
    assert_eq!(state.params["wah.freq"], json!(10.0));
    assert_eq!(state.params["amp.drive"], json!(20.0));

    // Startup announced bank FOO; the nxbk tap then moved on to BAR.
    assert_eq!(
        state.notifications,
        vec![
            ("setpreset".to_string(), vec![json!("FOO"), json!("p1")]),
            ("set".to_string(), vec![json!("wah.freq"), json!(10.0)]),
            ("set".to_string(), vec![json!("amp.drive"), json!(20.0)]),
            ("setpreset".to_string(), vec![json!("BAR"), json!("q1")]),
        ]
    );
    assert_eq!(state.params["system.current_bank"], json!("BAR"));
    assert_eq!(state.params["system.current_preset"], json!("q1"));
}
