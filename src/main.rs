mod command;
mod connection;
mod device;
mod feedback;
mod transport;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use beacon_shared::security::DeviceKey;
use beacon_shared::{defaults, ColorState};
use clap::Parser;
use command::CommandRouter;
use connection::{heartbeat, HeartbeatConfig, Supervisor, SupervisorConfig};
use device::{Device, StateLogger};
use feedback::FeedbackPublisher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use transport::{Subscriber, WebsocketConfig, WebsocketSubscriber};
use url::Url;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base url of the beacon api (http://hostname:port)
    #[arg(long, default_value = "http://0.0.0.0:12345")]
    api: Url,

    /// Amount of commands (and feedback items) allowed to queue
    #[arg(long, default_value_t = defaults::COMMAND_BUFFER)]
    command_buffer: usize,

    /// Seconds between heartbeat pings
    #[arg(long, default_value_t = defaults::HEARTBEAT_DELAY_SECS)]
    heartbeat_delay: u64,

    /// Ping attempts per heartbeat before the heartbeat gives up
    #[arg(long, default_value_t = defaults::HEARTBEAT_MAX_ATTEMPTS)]
    heartbeat_attempts: u32,

    /// Seconds to wait before each reconnection attempt
    #[arg(long, default_value_t = defaults::RETRY_DELAY_SECS)]
    retry_delay: u64,

    /// Consecutive failed reads tolerated before shutting down
    #[arg(long, default_value_t = defaults::MAX_RETRIES)]
    max_retries: u32,

    /// PEM file holding the device's RSA private key
    #[arg(long, default_value = ".keys/private.pem")]
    private_key: PathBuf,

    /// If provided, reserve this name with the api before connecting
    #[arg(long)]
    device_name: Option<String>,

    /// Log at debug level (including the shared secret)
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let key = DeviceKey::from_file(&args.private_key)
        .with_context(|| format!("Invalid private key file {}", args.private_key.display()))?;
    let shared_secret = key.shared_secret()?;
    debug!("Shared secret: {}", shared_secret);

    let device: Arc<dyn Device> = Arc::new(StateLogger);

    info!("Beacon client starting, api: {}", args.api);

    let subscriber = Arc::new(WebsocketSubscriber::new(WebsocketConfig {
        api_home: args.api.clone(),
        secret: shared_secret,
    }));

    if let Some(name) = &args.device_name {
        subscriber
            .preregister(name)
            .await
            .with_context(|| format!("Unable to register name \"{}\" with api", name))?;
    }

    subscriber
        .connect()
        .await
        .with_context(|| format!("Unable to open api subscription ({})", args.api))?;

    let buffer = args.command_buffer.max(1);
    let (command_tx, command_rx) = mpsc::channel(buffer);
    let (feedback_tx, feedback_rx) = mpsc::channel(buffer);

    let router = CommandRouter::new(device.clone(), Arc::new(key), feedback_tx.clone());
    let router_task = tokio::spawn(router.run(command_rx));

    let publisher = FeedbackPublisher::new(&args.api);
    let publisher_task = tokio::spawn(publisher.run(feedback_rx));

    let heartbeat = heartbeat::start(
        subscriber.clone(),
        HeartbeatConfig {
            delay: Duration::from_secs(args.heartbeat_delay),
            max_attempts: args.heartbeat_attempts,
        },
    );

    let supervisor = Supervisor::new(
        subscriber.clone(),
        SupervisorConfig {
            max_retries: args.max_retries,
            retry_delay: Duration::from_secs(args.retry_delay),
            device_name: args.device_name.clone(),
        },
        command_tx,
        feedback_tx,
    );

    // Runs until retries are exhausted; closes both queues on the way out
    let retries = supervisor.run().await;

    heartbeat.stop();

    if let Err(e) = router_task.await {
        error!("Command router failed: {}", e);
    }
    if let Err(e) = publisher_task.await {
        error!("Feedback publisher failed: {}", e);
    }
    debug!("Heartbeat ended: {:?}", heartbeat.join().await);

    if let Err(e) = subscriber.close().await {
        warn!("Error closing subscription: {}", e);
    }

    if let Err(e) = device.set_state(ColorState::off()).await {
        warn!("Unable to turn device off: {}", e);
    }
    device.close().await;

    warn!("Connection loop terminated after {} retries", retries);
    Ok(())
}
