use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    method: &'a str,
    result: &'a Value,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct ListeningOutput {
    event: &'static str,
    addr: String,
}

pub fn print_result(method: &str, result: &Value, elapsed: Duration, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                method,
                result,
                elapsed_ms: elapsed.as_millis() as u64,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            println!("{}", result_table(result));
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
            );
        }
        OutputFormat::Raw => {
            print_raw(result.to_string().as_bytes());
        }
    }
}

pub fn print_listening(addr: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                addr: addr.to_string(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => println!("listening on {addr}"),
        OutputFormat::Raw => println!("{addr}"),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn result_table(result: &Value) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    match result {
        Value::Object(map) => {
            table.set_header(vec!["KEY", "VALUE"]);
            for (key, value) in map {
                table.add_row(vec![key.clone(), cell(value)]);
            }
        }
        Value::Array(items) => {
            table.set_header(vec!["#", "VALUE"]);
            for (index, value) in items.iter().enumerate() {
                table.add_row(vec![index.to_string(), cell(value)]);
            }
        }
        scalar => {
            table.set_header(vec!["RESULT"]);
            table.add_row(vec![cell(scalar)]);
        }
    }
    table
}

/// Strings print bare; everything else as compact JSON.
fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn object_results_render_as_key_value_rows() {
        let table = result_table(&json!({"name": "W", "value": {"mm": 2}})).to_string();
        assert!(table.contains("KEY"));
        assert!(table.contains("name"));
        assert!(table.contains("{\"mm\":2}"));
    }

    #[test]
    fn scalar_results_render_single_cell() {
        let table = result_table(&json!("pong")).to_string();
        assert!(table.contains("RESULT"));
        assert!(table.contains("pong"));
        assert!(!table.contains("\"pong\""));
    }
}
