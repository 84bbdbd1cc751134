#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};

use serde_json::Value;

const BIN: &str = env!("CARGO_BIN_EXE_hostbridge");

struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn cli() -> Command {
    let mut command = Command::new(BIN);
    command
        .env_remove("HOSTBRIDGE_HOST")
        .env_remove("HOSTBRIDGE_PORT")
        .env_remove("HOSTBRIDGE_TIMEOUT")
        .env_remove("HOSTBRIDGE_LOG")
        .args(["--log-level", "error", "--format", "json"]);
    command
}

fn start_server(extra: &[&str]) -> Server {
    let mut child = cli()
        .args(["serve", "--port", "0"])
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    let stdout = child.stdout.take().expect("stdout should be piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("serve should announce its address");
    let event: Value = serde_json::from_str(&line).expect("listening line should be JSON");
    assert_eq!(event["event"], "listening");
    let addr: SocketAddr = event["addr"]
        .as_str()
        .expect("addr should be a string")
        .parse()
        .expect("addr should parse");

    Server {
        child,
        port: addr.port(),
    }
}

fn call(server_port: u16, args: &[&str]) -> Output {
    cli()
        .arg("call")
        .args(args)
        .args(["--port", &server_port.to_string()])
        .output()
        .expect("call should run")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "hostbridge-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[test]
fn echo_round_trip_prints_result() {
    let server = start_server(&[]);
    let output = call(server.port, &["echo", "--params", r#"{"x":1}"#]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out = stdout_json(&output);
    assert_eq!(out["method"], "echo");
    assert_eq!(out["result"], serde_json::json!({"x": 1}));
}

#[test]
fn parameters_persist_on_the_host() {
    let server = start_server(&[]);

    let set = call(
        server.port,
        &["set_parameter", "--params", r#"{"name":"Width","value":42}"#],
    );
    assert!(set.status.success());

    let get = call(server.port, &["get_parameter", "--params", r#"{"name":"Width"}"#]);
    assert!(get.status.success());
    assert_eq!(stdout_json(&get)["result"], 42);

    let list = call(server.port, &["list_parameters"]);
    assert_eq!(stdout_json(&list)["result"], serde_json::json!({"Width": 42}));
}

#[test]
fn ping_runs_on_host_thread() {
    let server = start_server(&[]);
    let output = call(server.port, &["ping"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["result"]["thread"], "hostbridge-host");
}

#[test]
fn remote_errors_exit_70() {
    let server = start_server(&[]);

    let missing = call(server.port, &["get_parameter", "--params", r#"{"name":"Depth"}"#]);
    assert_eq!(missing.status.code(), Some(70));
    let stderr = String::from_utf8_lossy(&missing.stderr);
    assert!(stderr.contains("parameter not found: Depth"), "stderr: {stderr}");
    assert!(stderr.contains("-32001"), "stderr: {stderr}");

    let unknown = call(server.port, &["delete_everything"]);
    assert_eq!(unknown.status.code(), Some(70));
    let stderr = String::from_utf8_lossy(&unknown.stderr);
    assert!(stderr.contains("Unknown method: delete_everything"), "stderr: {stderr}");
}

#[test]
fn timeout_exits_124() {
    let server = start_server(&[]);
    let output = call(
        server.port,
        &["sleep", "--params", r#"{"ms":3000}"#, "--timeout", "200ms"],
    );
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn notification_returns_without_output() {
    let server = start_server(&[]);
    let notify = call(
        server.port,
        &["set_parameter", "--notify", "--params", r#"{"name":"N","value":"v"}"#],
    );
    assert!(notify.status.success());
    assert!(notify.stdout.is_empty());

    let get = call(server.port, &["get_parameter", "--params", r#"{"name":"N"}"#]);
    assert_eq!(stdout_json(&get)["result"], "v");
}

#[test]
fn schema_directory_rejects_bad_params() {
    let dir = unique_temp_dir("schemas");
    std::fs::write(
        dir.join("set_parameter.schema.json"),
        r#"{
            "type": "object",
            "properties": {
                "name": { "type": "string", "minLength": 1 },
                "value": { "type": "number" }
            },
            "required": ["name", "value"]
        }"#,
    )
    .expect("schema should be writable");

    let server = start_server(&["--schemas", dir.to_str().expect("utf-8 temp path")]);

    let bad = call(
        server.port,
        &["set_parameter", "--params", r#"{"name":"W","value":"wide"}"#],
    );
    assert_eq!(bad.status.code(), Some(70));
    assert!(String::from_utf8_lossy(&bad.stderr).contains("-32602"));

    let extra = call(
        server.port,
        &["set_parameter", "--params", r#"{"name":"W","value":1,"unit":"mm"}"#],
    );
    assert_eq!(extra.status.code(), Some(70));

    let good = call(server.port, &["set_parameter", "--params", r#"{"name":"W","value":1}"#]);
    assert!(good.status.success());

    drop(server);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_params_json_exits_64() {
    let output = call(8080, &["echo", "--params", "{nope"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn refused_connection_exits_3() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral port");
        listener.local_addr().expect("local addr").port()
    };
    let output = call(port, &["ping", "--connect-timeout", "2s"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(BIN).arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("hostbridge {}", env!("CARGO_PKG_VERSION")));
}
