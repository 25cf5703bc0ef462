//! Stand-in effects engine speaking the line-delimited JSON-RPC dialect.
//! Lets the host run without real hardware or a real engine.

use pedal_protocol::Bank;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const DEFAULT_ADDR: &str = "127.0.0.1:0";

struct MockEngine {
    banks: Vec<Bank>,
    params: HashMap<String, Value>,
    subscribed: bool,
}

impl MockEngine {
    fn new() -> Self {
        let banks = vec![
            Bank {
                name: "FOO".to_string(),
                presets: vec!["p1".to_string(), "p2".to_string()],
            },
            Bank {
                name: "BAR".to_string(),
                presets: vec!["q1".to_string()],
            },
        ];
        let mut params = HashMap::new();
        params.insert("system.current_bank".to_string(), json!("FOO"));
        params.insert("system.current_preset".to_string(), json!("p1"));
        params.insert("wah.freq".to_string(), json!(50));
        params.insert("amp.drive".to_string(), json!(0.5));
        params.insert("vol.gain".to_string(), json!(0));
        Self {
            banks,
            params,
            subscribed: false,
        }
    }

    /// Handles one decoded request. Returns the result payload for calls and
    /// any notification to push to the peer.
    fn handle(&mut self, method: &str, params: &[Value]) -> (Option<Value>, Option<Value>) {
        match method {
            "banks" => (
                Some(serde_json::to_value(&self.banks).unwrap_or(Value::Null)),
                None,
            ),
            "get" => {
                let id = params.first().and_then(Value::as_str).unwrap_or_default();
                let value = self.params.get(id).cloned().unwrap_or(json!(0));
                (Some(json!({ id: value })), None)
            }
            "set" => {
                let id = params.first().and_then(Value::as_str).unwrap_or_default();
                let value = params.get(1).cloned().unwrap_or(Value::Null);
                self.apply_set(id, value.clone());
                let echo = self
                    .subscribed
                    .then(|| json!({"method": "set", "params": [id, value]}));
                (None, echo)
            }
            "setpreset" => {
                if let (Some(bank), Some(preset)) = (
                    params.first().and_then(Value::as_str),
                    params.get(1).and_then(Value::as_str),
                ) {
                    self.params
                        .insert("system.current_bank".to_string(), json!(bank));
                    self.params
                        .insert("system.current_preset".to_string(), json!(preset));
                }
                (None, None)
            }
            "parameterlist" => (Some(self.parameter_list()), None),
            "listen" => {
                self.subscribed = true;
                (None, None)
            }
            _ => {
                eprintln!("mock_engine: unhandled method {method}");
                (Some(Value::Null), None)
            }
        }
    }

    fn apply_set(&mut self, id: &str, value: Value) {
        match id {
            "engine.next_preset" => self.move_preset(1),
            "engine.previus_preset" => self.move_preset(-1),
            _ => {
                self.params.insert(id.to_string(), value);
            }
        }
    }

    fn move_preset(&mut self, step: i64) {
        let bank_name = self
            .params
            .get("system.current_bank")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(bank) = self.banks.iter().find(|b| b.name == bank_name) else {
            return;
        };
        if bank.presets.is_empty() {
            return;
        }
        let current = self
            .params
            .get("system.current_preset")
            .and_then(Value::as_str)
            .and_then(|p| bank.presets.iter().position(|x| x == p))
            .unwrap_or(0) as i64;
        let n = bank.presets.len() as i64;
        let next = (current + step).rem_euclid(n) as usize;
        self.params.insert(
            "system.current_preset".to_string(),
            json!(bank.presets[next]),
        );
    }

    fn parameter_list(&self) -> Value {
        let mut entries = Vec::new();
        let mut ids: Vec<&String> = self.params.keys().collect();
        ids.sort();
        for id in ids {
            let non_preset = id.starts_with("system.");
            let mut descriptor = json!({ "id": id });
            if non_preset {
                descriptor["non_preset"] = json!("1");
            }
            entries.push(json!("Float"));
            entries.push(json!({ "Parameter": descriptor }));
        }
        Value::Array(entries)
    }
}

fn serve_client(engine: &mut MockEngine, mut stream: TcpStream, deadline: Option<Instant>) {
    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
    let mut buf: Vec<u8> = Vec::new();

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return;
        }

        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            let Ok(request) = serde_json::from_slice::<Value>(&line[..line.len() - 1]) else {
                eprintln!(
                    "mock_engine: undecodable line {}",
                    String::from_utf8_lossy(&line)
                );
                continue;
            };
            let method = request["method"].as_str().unwrap_or_default().to_string();
            let params: Vec<Value> = request["params"].as_array().cloned().unwrap_or_default();
            let (result, push) = engine.handle(&method, &params);

            if let Some(result) = result {
                if request.get("id").is_some() {
                    let reply = json!({"id": request["id"], "result": result});
                    if write_line(&mut stream, &reply).is_err() {
                        return;
                    }
                }
            }
            if let Some(push) = push {
                if write_line(&mut stream, &push).is_err() {
                    return;
                }
            }
        }

        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                eprintln!("mock_engine: read failed: {e}");
                return;
            }
        }
    }
}

fn write_line(stream: &mut TcpStream, value: &Value) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    stream.write_all(&line)
}

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr").unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);

    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("mock_engine: bind failed on {addr}: {e}");
            std::process::exit(1);
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("mock_engine: local_addr failed: {e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &addr_file {
        let _ = fs::write(path, local_addr.to_string());
    }

    println!("mock_engine listening on {local_addr}");

    let deadline = run_for_ms.map(|d| Instant::now() + d);
    let mut engine = MockEngine::new();

    // One client at a time; the host is the only expected peer.
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => serve_client(&mut engine, stream, deadline),
            Err(e) => eprintln!("mock_engine: accept failed: {e}"),
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }
}
