#![forbid(unsafe_code)]

use std::io::Write as _;

use hushroom_client_core::{ChatClient, ClientConfig};
use hushroom_protocol::QUIT_SENTINEL;
use hushroom_util::endpoint::DEFAULT_PORT;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: hushroom_client [--connect tcp://host:port]\n\
\n\
Options:\n\
\t--connect   Server endpoint (alias: --endpoint) (default: tcp://127.0.0.1:{DEFAULT_PORT})\n\
\t--help      Show this help\n\
\n\
Lines typed on stdin are sent to the current room. Commands:\n\
\t!room         list rooms\n\
\t!room <name>  switch room\n\
\t!quit         leave\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,hushroom_client_core=info".to_string());
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

fn parse_args() -> ClientConfig {
	let mut endpoint = format!("tcp://127.0.0.1:{DEFAULT_PORT}");

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--connect" | "--endpoint" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--connect must be non-empty (expected tcp://host:port)");
					usage_and_exit();
				}
				endpoint = v;
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	ClientConfig::from_tcp_endpoint(&endpoint).unwrap_or_else(|e| {
		eprintln!("Invalid --connect value: {endpoint}\n{e}");
		usage_and_exit();
	})
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let cfg = parse_args();

	info!(server = %format!("{}:{}", cfg.server_host, cfg.server_port), "connecting");
	let client = ChatClient::connect(cfg).await?;
	info!(local = %client.local_addr(), remote = %client.peer_addr(), "session established");

	let (mut sender, mut receiver) = client.split();

	let printer = tokio::spawn(async move {
		let result = receiver
			.run_loop(|text| {
				// Server lines already carry their own trailing newline.
				print!("{text}");
			})
			.await;
		let _ = std::io::stdout().flush();
		if let Err(e) = result {
			warn!(error = %e, "receive loop ended");
		}
	});

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	while let Some(line) = lines.next_line().await? {
		if line.trim_end() == QUIT_SENTINEL {
			sender.quit().await?;
			let _ = printer.await;
			return Ok(());
		}
		sender.send_text(&format!("{line}\n")).await?;
	}

	sender.quit().await?;
	let _ = printer.await;
	Ok(())
}
