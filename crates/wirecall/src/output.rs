use std::io::{IsTerminal, Write};
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

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
struct ReplyOutput<'a> {
    target: &'a str,
    elapsed_ms: u128,
    reply: &'a serde_json::Value,
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    network: &'a str,
    addr: &'a str,
    services: &'a [String],
}

pub fn print_reply(target: &str, reply: &serde_json::Value, elapsed: Duration, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                target,
                elapsed_ms: elapsed.as_millis(),
                reply,
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TARGET", "ELAPSED", "REPLY"])
                .add_row(vec![
                    target.to_string(),
                    format!("{}ms", elapsed.as_millis()),
                    reply.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let body = serde_json::to_string_pretty(reply).unwrap_or_else(|_| reply.to_string());
            println!("{target} ({}ms)\n{body}", elapsed.as_millis());
        }
        OutputFormat::Raw => {
            let mut body = reply.to_string().into_bytes();
            body.push(b'\n');
            print_raw(&body);
        }
    }
}

/// Announce the bound address once the server is ready to accept.
pub fn print_listening(network: &str, addr: &str, services: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                network,
                addr,
                services,
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NETWORK", "ADDRESS", "SERVICES"])
                .add_row(vec![network.to_string(), addr.to_string(), services.join(", ")]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("listening on {network} {addr} ({})", services.join(", "));
        }
    }
    let _ = std::io::stdout().flush();
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json_line<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
