use crate::Config;
use crate::LineBuffer;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Link state changes reported to the owner of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The TCP connect completed.
    Connected,
    /// The link dropped; a reconnect is scheduled.
    Closed { had_error: bool },
}

/// A line-protocol connection to one C-Gate port.
///
/// The connection stays open for the lifetime of the process: the background
/// task reconnects with the configured backoff and the channels below
/// survive every reconnect. Commands sent while the link is down are dropped
/// with a warning rather than queued, so stale commands never replay onto a
/// fresh session.
pub struct CGateConnection {
    /// Complete lines read from the socket, in arrival order.
    pub lines: mpsc::UnboundedReceiver<String>,

    /// Newline-terminated command strings to write to the socket.
    pub commands: mpsc::UnboundedSender<String>,

    /// Connect/close notifications.
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl CGateConnection {
    /// Open the link described by `config` and keep it open.
    pub fn new(config: &Config) -> CGateConnection {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(connection_loop(
            config.clone(),
            line_tx,
            command_rx,
            event_tx,
        ));

        CGateConnection {
            lines: line_rx,
            commands: command_tx,
            events: event_rx,
        }
    }
}

/// Why one served session ended.
enum SessionEnd {
    /// The socket dropped; reconnect.
    Closed { had_error: bool },
    /// The owner hung up; stop for good.
    Shutdown,
}

async fn connection_loop(
    config: Config,
    line_tx: mpsc::UnboundedSender<String>,
    mut command_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut failed_attempts: u32 = 0;
    let mut first_attempt = true;

    loop {
        if !first_attempt {
            let delay = config.reconnect.delay_before(failed_attempts.max(1));
            info!(
                "C-Gate {} link: reconnecting to {}:{} in {delay:?}",
                config.kind, config.host, config.port
            );
            if !pause_dropping_commands(&config, &mut command_rx, delay).await {
                return;
            }
        }
        first_attempt = false;

        match TcpStream::connect((config.host.as_str(), config.port)).await {
            Ok(stream) => {
                info!(
                    "C-Gate {} link: connected to {}:{}",
                    config.kind, config.host, config.port
                );
                failed_attempts = 0;
                if event_tx.send(LinkEvent::Connected).is_err() {
                    return;
                }

                match serve(stream, &config, &line_tx, &mut command_rx).await {
                    SessionEnd::Closed { had_error } => {
                        if event_tx.send(LinkEvent::Closed { had_error }).is_err() {
                            return;
                        }
                    }
                    SessionEnd::Shutdown => return,
                }
            }
            Err(err) => {
                failed_attempts = failed_attempts.saturating_add(1);
                warn!(
                    "C-Gate {} link: failed to connect to {}:{}: {err}",
                    config.kind, config.host, config.port
                );
            }
        }
    }
}

async fn serve(
    stream: TcpStream,
    config: &Config,
    line_tx: &mpsc::UnboundedSender<String>,
    command_rx: &mut mpsc::UnboundedReceiver<String>,
) -> SessionEnd {
    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; 4096];

    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => match read {
                Ok(0) => {
                    info!("C-Gate {} link: connection closed by peer", config.kind);
                    return SessionEnd::Closed { had_error: false };
                }
                Ok(n) => {
                    buffer.append(&chunk[..n]);
                    if let Err(err) = buffer.drain_with(|line| line_tx.send(line.to_string())) {
                        debug!("C-Gate {} link: receiver hung up: {err}", config.kind);
                        return SessionEnd::Shutdown;
                    }
                }
                Err(err) => {
                    error!("C-Gate {} link: read failed: {err}", config.kind);
                    return SessionEnd::Closed { had_error: true };
                }
            },

            command = command_rx.recv() => match command {
                None => return SessionEnd::Shutdown,
                Some(data) => {
                    if let Err(err) = writer.write_all(data.as_bytes()).await {
                        // The socket is destroyed on a fatal write error and
                        // the close drives the reconnect.
                        error!("C-Gate {} link: write failed: {err}", config.kind);
                        return SessionEnd::Closed { had_error: true };
                    }
                }
            },
        }
    }
}

/// Sleep out a reconnect delay, dropping (with a warning) any command sent
/// while the link is down. Returns `false` once the owner hangs up.
async fn pause_dropping_commands(
    config: &Config,
    command_rx: &mut mpsc::UnboundedReceiver<String>,
    delay: std::time::Duration,
) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => return true,
            command = command_rx.recv() => match command {
                None => return false,
                Some(data) => warn!(
                    "C-Gate {} link: not connected, dropping command {:?}",
                    config.kind,
                    data.trim_end()
                ),
            },
        }
    }
}
