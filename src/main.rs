//! bmctl - Out-of-band datacenter device management via the BMC interface
//!
//! This is the main entry point for the bmctl command-line tool.

use anyhow::{anyhow, Result};
use bmctl::bmc::Client;
use bmctl::config::{load_config, ClientConfig, Config, TunnelOptions};
use bmctl::logging::{Context, Logger};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, Level};
use url::Url;

/// bmctl - Out-of-band datacenter device management via the BMC interface
#[derive(Parser, Debug)]
#[command(name = "bmctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Show debug logs
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable JSON logging format
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot a machine from an image via BMC virtual media
    Boot(BootArgs),
    /// Print the version
    Version,
}

#[derive(clap::Args, Debug)]
struct BootArgs {
    /// BMC Endpoint (FQDN or IP)
    #[arg(short, long)]
    endpoint: Option<Url>,

    /// BMC User
    #[arg(short, long, requires = "password")]
    user: Option<String>,

    /// BMC Password
    #[arg(short, long, requires = "user")]
    password: Option<String>,

    /// Ignore validity of BMC TLS Cert
    #[arg(short = 'k', long)]
    insecure: bool,

    /// BMC SSH Proxy
    #[arg(short = 'J', long)]
    ssh_proxy: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image to boot from
    image: String,
}

impl BootArgs {
    /// Merge flags over the optional configuration file
    fn resolve(&self) -> Result<(ClientConfig, TunnelOptions)> {
        let file = match &self.config {
            Some(path) => Some(load_config(path)?),
            None => None,
        };
        self.merge(file)
    }

    fn merge(&self, file: Option<Config>) -> Result<(ClientConfig, TunnelOptions)> {
        let (mut client, tunnel) = match file {
            Some(config) => (config.client, config.tunnel),
            None => {
                let endpoint = self
                    .endpoint
                    .clone()
                    .ok_or_else(|| anyhow!("required flag \"endpoint\" not set"))?;
                (ClientConfig::new(endpoint, "", ""), TunnelOptions::default())
            }
        };

        if let Some(endpoint) = &self.endpoint {
            client.endpoint = endpoint.clone();
        }
        if let Some(user) = &self.user {
            client.user = user.clone();
        }
        if let Some(password) = &self.password {
            client.password = password.clone();
        }
        if let Some(ssh_proxy) = &self.ssh_proxy {
            client.ssh_proxy = ssh_proxy.clone();
        }
        client.insecure |= self.insecure;

        if client.user.is_empty() {
            return Err(anyhow!("required flag \"user\" not set"));
        }
        client.validate().map_err(|e| anyhow!(e))?;
        tunnel.validate().map_err(|e| anyhow!(e))?;

        Ok((client, tunnel))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    let logger = Logger::new(level, args.json_log);
    // Code without a context at hand logs through the same subscriber
    let _ = tracing::dispatcher::set_global_default(logger.dispatch().clone());

    let ctx = Context::new(logger);
    spawn_signal_handler(ctx.clone());

    match run(&ctx, args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ctx.logger().in_scope(|| error!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Version => {
            println!("{} v{}", bmctl::NAME, bmctl::VERSION);
            Ok(())
        }
        Command::Boot(boot_args) => boot(ctx, &boot_args).await,
    }
}

async fn boot(ctx: &Context, args: &BootArgs) -> Result<()> {
    let (config, tunnel) = args.resolve()?;
    debug!("Connecting to {:?}", config);

    let client = Client::connect_with_options(ctx, &config, &tunnel).await?;
    let result = client.boot(ctx, &args.image).await;
    client.close().await;

    result
}

/// Cancel the root context on Ctrl+C or SIGTERM
fn spawn_signal_handler(ctx: Context) {
    let logger = ctx.logger().clone();
    tokio::spawn(logger.bind(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            info!("Received Ctrl+C, shutting down...");
                        }
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM, shutting down...");
                        }
                    }
                }
                Err(e) => {
                    debug!("Failed to setup SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl+C, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            // On Windows, only handle Ctrl+C
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        ctx.cancel();
    }));
}
