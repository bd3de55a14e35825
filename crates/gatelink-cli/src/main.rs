//! # gatelink
//!
//! Command-line front end: `gatelink request` performs one rate-limited REST
//! call, `gatelink listen` keeps a control-plane session open and logs what
//! it sees until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::Notify;

use gatelink_core::logging::init_subscriber_with_format;
use gatelink_gateway::{ConnectMode, ControlProtocol, GatewaySession, SessionConfig, SessionEvent};
use gatelink_rest::{CallOptions, Method, RequestBody, RestClient, RestError, RestOptions};
use gatelink_settings::GatelinkSettings;

/// gatelink client.
#[derive(Parser, Debug)]
#[command(name = "gatelink", about = "REST and real-time session client", version)]
struct Cli {
    /// Settings file (defaults to `~/.gatelink/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Perform one REST call and print the parsed response.
    Request {
        /// HTTP method.
        method: String,
        /// Route, relative to the configured base URL.
        route: String,
        /// JSON request body.
        #[arg(long, conflicts_with = "form")]
        json: Option<String>,
        /// Form-encoded request body.
        #[arg(long)]
        form: Option<String>,
        /// Audit log reason.
        #[arg(long)]
        reason: Option<String>,
    },
    /// Connect the control-plane session and log every event until Ctrl-C.
    Listen {
        /// Capability flags (overrides settings).
        #[arg(long)]
        intents: Option<u64>,
    },
}

fn load_settings(path: Option<&PathBuf>) -> Result<GatelinkSettings> {
    match path {
        Some(path) => gatelink_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => gatelink_settings::load_settings().context("Failed to load settings"),
    }
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {method}"))
}

fn parse_body(json: Option<&str>, form: Option<&str>) -> Result<RequestBody> {
    match (json, form) {
        (Some(json), _) => {
            let value: Value = serde_json::from_str(json).context("Request body is not valid JSON")?;
            Ok(RequestBody::Json(value))
        }
        (None, Some(form)) => Ok(RequestBody::Form(form.to_string())),
        (None, None) => Ok(RequestBody::None),
    }
}

/// Identify takes the bare token; the REST header carries a `Bot ` prefix.
fn identify_token(authorization: &str) -> &str {
    authorization.strip_prefix("Bot ").unwrap_or(authorization)
}

async fn request(
    settings: &GatelinkSettings,
    method: &str,
    route: &str,
    body: RequestBody,
    reason: Option<String>,
) -> Result<()> {
    let method = parse_method(method)?;
    let options = RestOptions::from_settings(&settings.rest).with_observer(|event| {
        tracing::info!(
            route = %event.route,
            attempt = event.attempt,
            retry_after = event.payload.retry_after,
            global = event.payload.global,
            "rate limited"
        );
    });
    let client = RestClient::new(options);
    let call = CallOptions { audit_reason: reason };

    match client.execute_with::<Value>(method, route, body, &call).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(RestError::Http { status, body }) => {
            if let Some(body) = body {
                eprintln!("{}", serde_json::to_string_pretty(&body)?);
            }
            bail!("Request failed with HTTP {status}")
        }
        Err(e) => Err(e).context("Request failed"),
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::State { from, to } => tracing::info!(%from, %to, "state"),
        SessionEvent::Dispatch { name, data } => tracing::info!(event = %name, %data, "dispatch"),
        SessionEvent::Ready { .. } => tracing::info!("ready"),
        SessionEvent::Resumed => tracing::info!("resumed"),
        SessionEvent::Warn { message } => tracing::warn!(%message, "session warning"),
        SessionEvent::Error { message } => tracing::warn!(%message, "socket error"),
        SessionEvent::Fatal(failure) => {
            tracing::error!(category = failure.category, code = ?failure.code, message = %failure.message, "session failed");
        }
        SessionEvent::Close { code, reason, class } => tracing::info!(code, %reason, %class, "closed"),
        SessionEvent::Raw(_) => {}
    }
}

async fn listen(settings: &GatelinkSettings, intents: Option<u64>) -> Result<()> {
    let authorization = settings
        .rest
        .authorization
        .as_deref()
        .context("No credentials: set GATELINK_TOKEN or rest.authorization")?;

    let mut gateway = settings.gateway.clone();
    if let Some(intents) = intents {
        gateway.intents = intents;
    }

    let session = GatewaySession::new(
        ControlProtocol::from_settings(identify_token(authorization), &gateway),
        SessionConfig::from_gateway(&gateway),
    );
    let stopped = Arc::new(Notify::new());
    let notify = Arc::clone(&stopped);
    let _ = session.events().on_any(log_event);
    let _ = session.events().on("fatal", move |_| notify.notify_one());

    let _ = session.connect(ConnectMode::Fresh);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutting down...");
            session.disconnect(None).await;
            Ok(())
        }
        () = stopped.notified() => {
            session.disconnect(None).await;
            bail!("Session stopped")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.settings.as_ref())?;
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    init_subscriber_with_format(level, settings.logging.format);

    match cli.command {
        Command::Request {
            method,
            route,
            json,
            form,
            reason,
        } => {
            let body = parse_body(json.as_deref(), form.as_deref())?;
            request(&settings, &method, &route, body, reason).await
        }
        Command::Listen { intents } => listen(&settings, intents).await,
    }
}
