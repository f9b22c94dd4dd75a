//! Listeners, connection handling and request routing

pub mod http;
pub mod ws;

use anyhow::{Context, Result};
use async_net::TcpListener;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use log_follower::LocalLauncher;
use log_registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use self::http::{Request, Response, Route, Router};
use crate::assets;
use crate::config::Config;
use crate::session::{FollowerLimit, SessionSettings};

const WS_GREETING: &str = "Welcome to the tailon websocket endpoint.\n";

/// State shared by every connection of a server
pub struct ServerState {
    /// Effective configuration
    pub config: Config,
    /// Routes below the relative root
    pub router: Router,
    /// Log sources
    pub registry: Arc<Registry>,
    /// Starts follower processes
    pub launcher: Arc<LocalLauncher>,
    /// Session knobs
    pub settings: Arc<SessionSettings>,
    /// Server-wide follower cap
    pub limit: FollowerLimit,
}

impl ServerState {
    /// Validate `config` and build the shared state from it
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let registry = Registry::new(config.file_specs()?);
        let settings = SessionSettings {
            template: config.tail_template()?,
            handover_grace: config.handover_grace(),
            stop_timeout: config.stop_timeout(),
        };

        Ok(Self {
            router: Router::new(&config.relative_root),
            registry: Arc::new(registry),
            launcher: Arc::new(LocalLauncher),
            settings: Arc::new(settings),
            limit: FollowerLimit::new(config.max_followers),
            config,
        })
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(async_net::unix::UnixListener, std::path::PathBuf),
}

/// A bound server, ready to accept connections
pub struct Server {
    state: Arc<ServerState>,
    listeners: Vec<Listener>,
}

impl Server {
    /// Bind every configured listen address.
    ///
    /// Addresses containing `:` are TCP, anything else is a Unix socket path.
    pub async fn bind(config: Config) -> Result<Self> {
        let state = Arc::new(ServerState::new(config)?);
        let mut listeners = Vec::new();

        for addr in &state.config.listen_addr {
            listeners.push(bind_one(addr).await?);
        }

        Ok(Self { state, listeners })
    }

    /// Shared state
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Bound addresses, with the actual port for `:0` binds
    pub fn local_addrs(&self) -> Vec<String> {
        self.listeners
            .iter()
            .map(|listener| match listener {
                Listener::Tcp(tcp) => tcp
                    .local_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|_| "tcp".to_string()),
                #[cfg(unix)]
                Listener::Unix(_, path) => path.display().to_string(),
            })
            .collect()
    }

    /// Accept connections until the process exits
    pub async fn run(self) -> Result<()> {
        let root = self.state.router.root().to_string();
        for addr in self.local_addrs() {
            info!(%addr, %root, "Listening");
        }

        let tasks: Vec<smol::Task<()>> = self
            .listeners
            .into_iter()
            .map(|listener| smol::spawn(accept_loop(listener, self.state.clone())))
            .collect();

        futures::future::join_all(tasks).await;
        Ok(())
    }
}

async fn bind_one(addr: &str) -> Result<Listener> {
    if addr.contains(':') {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;
        return Ok(Listener::Tcp(listener));
    }
    bind_unix(addr)
}

#[cfg(unix)]
fn bind_unix(addr: &str) -> Result<Listener> {
    let path = std::path::PathBuf::from(addr);
    if path.exists() {
        debug!(path = %path.display(), "Removing stale socket");
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
    }
    let listener = async_net::unix::UnixListener::bind(&path)
        .with_context(|| format!("Failed to bind to {}", path.display()))?;
    Ok(Listener::Unix(listener, path))
}

#[cfg(not(unix))]
fn bind_unix(addr: &str) -> Result<Listener> {
    anyhow::bail!("Unix socket listen address '{addr}' is not supported on this platform")
}

async fn accept_loop(listener: Listener, state: Arc<ServerState>) {
    loop {
        let accepted = match &listener {
            Listener::Tcp(tcp) => tcp.accept().await.map(|(stream, peer)| {
                spawn_connection(stream, peer.to_string(), state.clone());
            }),
            #[cfg(unix)]
            Listener::Unix(unix, path) => unix.accept().await.map(|(stream, _)| {
                spawn_connection(stream, path.display().to_string(), state.clone());
            }),
        };

        if let Err(e) = accepted {
            error!("Failed to accept connection: {}", e);
            // Back off, e.g. when out of file descriptors.
            smol::Timer::after(Duration::from_millis(100)).await;
        }
    }
}

fn spawn_connection<S>(stream: S, peer: String, state: Arc<ServerState>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    smol::spawn(async move {
        if let Err(e) = handle_connection(stream, peer.clone(), state).await {
            debug!(%peer, error = %e, "Connection failed");
        }
    })
    .detach();
}

/// Serve one request, or one WebSocket session, on a fresh connection
pub async fn handle_connection<S>(mut stream: S, peer: String, state: Arc<ServerState>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (request, leftover) = match http::read_request(&mut stream).await {
        Ok(Some(parsed)) => parsed,
        Ok(None) => return Ok(()),
        Err(e) => {
            Response::bad_request("Bad Request").write_to(&mut stream).await?;
            return Err(e);
        }
    };

    if request.method != "GET" {
        let response = Response::method_not_allowed();
        log_request(&request, response.status(), &peer);
        return Ok(response.write_to(&mut stream).await?);
    }

    let response = match state.router.route(&request.path) {
        Route::WebSocket if request.is_websocket_upgrade() => {
            let key = request.header("sec-websocket-key").unwrap_or_default();
            stream.write_all(http::upgrade_head(key).as_bytes()).await?;
            stream.flush().await?;
            log_request(&request, 101, &peer);
            ws::serve(stream, leftover, peer, state).await;
            return Ok(());
        }
        Route::WebSocket => Response::text(200, "OK", WS_GREETING),
        Route::Index => Response::html(assets::render_index(&state.config)),
        Route::Asset(name) => match assets::asset(&name) {
            Some(asset) => Response::new(200, "OK", asset.content_type, asset.body),
            None => Response::not_found(),
        },
        Route::Download => {
            let status = serve_download(&mut stream, &request, &state).await?;
            log_request(&request, status, &peer);
            return Ok(());
        }
        Route::NotFound => Response::not_found(),
    };

    log_request(&request, response.status(), &peer);
    response.write_to(&mut stream).await?;
    Ok(())
}

/// Stream a registry-known file to the client, returning the status sent
async fn serve_download<S>(stream: &mut S, request: &Request, state: &ServerState) -> Result<u16>
where
    S: AsyncWrite + Unpin,
{
    if !state.config.allow_download {
        Response::forbidden().write_to(stream).await?;
        return Ok(403);
    }

    let Some(path) = request.query_param("path") else {
        Response::bad_request("Missing path parameter").write_to(stream).await?;
        return Ok(400);
    };

    let registry = state.registry.clone();
    let wanted = path.clone();
    let known = smol::unblock(move || registry.lookup(&wanted)).await;
    if !known.is_some_and(|entry| entry.exists) {
        warn!(%path, "Download of unknown file refused");
        Response::not_found().write_to(stream).await?;
        return Ok(404);
    }

    let file = match async_fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(%path, error = %e, "Failed to open download");
            Response::not_found().write_to(stream).await?;
            return Ok(404);
        }
    };
    let len = file.metadata().await?.len();

    let file_name = std::path::Path::new(&path)
        .file_name()
        .map(|name| name.to_string_lossy().replace('"', ""))
        .unwrap_or_else(|| "download".to_string());
    let headers = [
        (
            "Content-Type",
            mime_guess::from_path(&path).first_or_octet_stream().to_string(),
        ),
        ("Content-Disposition", format!("attachment; filename=\"{file_name}\"")),
    ];

    let head = http::response_head(200, "OK", &headers, len);
    stream.write_all(head.as_bytes()).await?;
    // The file may grow while it is sent; never send more than announced.
    futures::io::copy(file.take(len), stream).await?;
    stream.flush().await?;
    Ok(200)
}

fn log_request(request: &Request, status: u16, peer: &str) {
    info!(method = %request.method, path = %request.path, status, %peer, "Request");
}
