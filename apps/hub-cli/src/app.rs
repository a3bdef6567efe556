//! Runs the client: logs hub events and forwards stdin lines.
//!
//! A plain line is sent with `send`; a line starting with `/notify ` is
//! sent with `notify`.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use hubwire_client::{ConnectionState, RealtimeClient};

use crate::config::Config;

/// What to do with one line of input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Send(&'a str),
    Notify(&'a str),
    Skip,
}

fn parse_line(line: &str) -> Command<'_> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.strip_prefix("/notify ") {
        Command::Notify(rest)
    } else if line.trim().is_empty() {
        Command::Skip
    } else {
        Command::Send(line)
    }
}

/// Runs until stdin closes or Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let client = RealtimeClient::with_config(
        &config.navigation(),
        Some(&config.cookies),
        config.connection.to_connection_config(),
    )?;
    subscribe_logging(&client);

    let mut states = client.subscribe_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state {
                ConnectionState::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "connection lost, reconnecting");
                }
                other => tracing::info!(state = ?other, "connection state changed"),
            }
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("SIGINT received, shutting down");
                cancel.cancel();
            }
        })
    };

    if let Err(e) = client.start(Some(&cancel)).await {
        client.dispose().await;
        ctrl_c.abort();
        if e.is_cancellation() {
            return Ok(());
        }
        return Err(e.into());
    }
    tracing::info!(url = %client.url(), "connected, type a line to send it");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("stdin closed");
            break;
        };

        let result = match parse_line(&line) {
            Command::Send(message) => client.send(message).await,
            Command::Notify(message) => client.notify(message).await,
            Command::Skip => continue,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "hub invocation failed");
        }
    }

    client.dispose().await;
    ctrl_c.abort();
    Ok(())
}

fn subscribe_logging(client: &RealtimeClient) {
    let events = client.events();
    events.login.subscribe(|change| {
        tracing::info!(connection = %change.connection_id, user = %change.user_name, "login");
    });
    events.logout.subscribe(|change| {
        tracing::info!(connection = %change.connection_id, user = %change.user_name, "logout");
    });
    events.job_started.subscribe(|message| {
        tracing::info!(%message, "job started");
    });
    events.job_completed.subscribe(|message| {
        tracing::info!(%message, "job completed");
    });
    events.notification_received.subscribe(|message| {
        tracing::info!(%message, "notification");
    });
    events.message_received.subscribe(|received| {
        tracing::info!(from = %received.sender_id, message = %received.message, "message");
    });
}
