//! SSH command construction

use crate::config::TunnelOptions;
use std::process::Stdio;
use tokio::process::Command;

/// Program started for the tunnel, looked up on `PATH`
pub const SSH_PROGRAM: &str = "ssh";

/// Arguments for dynamic forwarding from `127.0.0.1:<port>` through `host`
pub fn ssh_args(host: &str, port: u16, opts: &TunnelOptions) -> Vec<String> {
    vec![
        "-N".to_string(),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        format!("ServerAliveInterval={}", opts.server_alive_interval),
        "-o".to_string(),
        format!("ServerAliveCountMax={}", opts.server_alive_count_max),
        "-D".to_string(),
        port.to_string(),
        host.to_string(),
    ]
}

/// Build the SSH command providing the SOCKS5 proxy
///
/// Output is piped so it can be logged; stdin is closed so SSH never waits
/// on an interactive prompt.
pub fn create_ssh_command(host: &str, port: u16, opts: &TunnelOptions) -> Command {
    let mut cmd = Command::new(SSH_PROGRAM);
    cmd.args(ssh_args(host, port, opts))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}
