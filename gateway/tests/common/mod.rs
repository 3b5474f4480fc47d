#![allow(dead_code)]

use std::net::SocketAddr;
use std::process::Stdio;

use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn gateway_path() -> String {
    std::env::var("NEXTEST_BIN_EXE_gateway").unwrap_or_else(|_| env!("CARGO_BIN_EXE_gateway").to_string())
}

/// Spawns the compiled gateway binary bound to a random loopback port, using whatever
/// `DATABASE_URL` the test process inherits, and waits for its startup log line.
pub async fn start_gateway_on_random_port() -> ChildData {
    let mut builder = Command::new(gateway_path());
    builder
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .args(["--bind-address", "127.0.0.1:0"])
        .kill_on_drop(true);

    let mut child = builder.spawn().expect("failed to spawn gateway binary");
    let mut stdout = tokio::io::BufReader::new(child.stdout.take().expect("piped stdout")).lines();

    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok(Some(line)) = stdout.next_line().await {
            println!("{line}");
            let _ = line_tx.send(line);
        }
    });

    let mut listening_line = None;
    let mut output = Vec::new();
    while let Some(line) = line_rx.recv().await {
        if line.contains("\"bind_address\":\"127.0.0.1:") {
            listening_line = Some(line.clone());
            output.push(line);
            break;
        }
        output.push(line);
    }

    let port = listening_line
        .expect("gateway exited before logging its bind address")
        .split_once("\"bind_address\":\"127.0.0.1:")
        .expect("startup log did not contain bind_address field")
        .1
        .split('"')
        .next()
        .expect("malformed bind_address field")
        .parse::<u16>()
        .expect("bind_address port was not a number");

    ChildData {
        addr: format!("127.0.0.1:{port}").parse().expect("valid socket address"),
        output,
        stdout: line_rx,
        child,
    }
}

pub struct ChildData {
    pub addr: SocketAddr,
    pub output: Vec<String>,
    pub stdout: UnboundedReceiver<String>,
    // Killed on drop.
    pub child: Child,
}

impl ChildData {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}
