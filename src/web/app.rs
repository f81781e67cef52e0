use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::middleware;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::config::{expand_home, load_profile, Options};
use crate::session::{SessionParams, TitleTemplate};

use super::auth;
use super::shutdown::ShutdownCoordinator;
use super::url;
use super::{assets, websocket};

/// The server: configuration resolved at startup plus the acceptor
/// state shared by all request handlers.
pub struct App {
    pub command: Vec<String>,
    pub options: Options,
    title_template: TitleTemplate,
    preferences: Value,
    pub shutdown: ShutdownCoordinator,
    session_accepted: AtomicBool,
}

impl App {
    pub fn new(command: Vec<String>, options: Options) -> Result<Self> {
        if command.is_empty() {
            bail!("No command given");
        }
        let title_template = TitleTemplate::parse(&options.title_format)?;

        let explicit = options.profile_file != Options::default().profile_file;
        let mut preferences = load_profile(&options.profile_file, explicit)?;
        if options.enable_reconnect {
            // Browser-side hint; the server restarts a fresh session on
            // each connect either way.
            if let Value::Object(map) = &mut preferences {
                map.insert("enable_reconnect".to_string(), Value::Bool(true));
                map.insert("reconnect_time".to_string(), options.reconnect_time.into());
            }
        }

        Ok(Self {
            command,
            options,
            title_template,
            preferences,
            shutdown: ShutdownCoordinator::new(),
            session_accepted: AtomicBool::new(false),
        })
    }

    pub(super) fn session_params(&self) -> SessionParams {
        SessionParams {
            command: self.command.clone(),
            permit_write: self.options.permit_write,
            title_template: self.title_template.clone(),
            preferences: self.preferences.clone(),
        }
    }

    /// In once mode the first upgrade takes the only session slot.
    pub(super) fn claim_once_slot(&self) -> bool {
        !self.session_accepted.swap(true, Ordering::SeqCst)
    }

    /// Begin graceful shutdown. Returns true only for the call that
    /// initiated the drain.
    pub fn exit(&self) -> bool {
        self.shutdown.trigger()
    }

    pub async fn run(self) -> Result<()> {
        let app = Arc::new(self);

        if app.options.permit_write {
            tracing::info!("Permitting clients to write input to the PTY");
        }
        if app.options.once {
            tracing::info!("Once option is provided, accepting only one client");
        }

        let prefix = if app.options.enable_random_url {
            url::random_url_prefix(app.options.random_url_length)
        } else {
            String::new()
        };

        let router = build_router(app.clone(), &prefix);

        let host = if app.options.address.is_empty() {
            "0.0.0.0"
        } else {
            app.options.address.as_str()
        };
        let listener = tokio::net::TcpListener::bind((host, app.options.port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", host, app.options.port))?;

        let scheme = if app.options.enable_tls { "https" } else { "http" };
        tracing::info!(command = %app.command.join(" "), "Server is starting");
        for url in url::access_urls(scheme, &app.options.address, app.options.port, &prefix) {
            tracing::info!(url = %url, "Listening");
        }

        spawn_signal_watcher(app.clone());

        let service = router.into_make_service_with_connect_info::<SocketAddr>();
        if app.options.enable_tls {
            let crt = expand_home(&app.options.tls_crt_file);
            let key = expand_home(&app.options.tls_key_file);
            let config = RustlsConfig::from_pem_file(&crt, &key)
                .await
                .with_context(|| format!("Failed to load TLS certificate ({}, {})", crt, key))?;
            let handle = axum_server::Handle::new();
            {
                let handle = handle.clone();
                let shutdown = app.shutdown.clone();
                tokio::spawn(async move {
                    shutdown.wait().await;
                    handle.graceful_shutdown(None);
                });
            }
            axum_server::from_tcp_rustls(listener.into_std()?, config)
                .handle(handle)
                .serve(service)
                .await
                .context("Server error")?;
        } else {
            let shutdown = app.shutdown.clone();
            axum::serve(listener, service)
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await
                .context("Server error")?;
        }

        tracing::info!("Exiting");
        Ok(())
    }
}

fn build_router(app: Arc<App>, prefix: &str) -> Router {
    let site = Router::new()
        .merge(websocket::ws_routes())
        .merge(assets::asset_routes());
    let site = if prefix.is_empty() {
        site
    } else {
        Router::new().nest(prefix, site)
    };

    let mut router = site.with_state(app.clone());
    if app.options.enable_basic_auth {
        tracing::info!("Using basic authentication");
        router = router.layer(middleware::from_fn_with_state(app, auth::basic_auth));
    }
    router.layer(TraceLayer::new_for_http())
}

fn spawn_signal_watcher(app: Arc<App>) {
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to install SIGTERM handler");
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        if app.exit() {
            tracing::info!("Received exit signal, waiting for active sessions to close");
        }
    });
}
