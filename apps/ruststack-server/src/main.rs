//! `pxobj` - a Kubernetes-native, S3-compatible object daemon.
//!
//! Two listeners run side by side: the public S3 API (SigV4-authenticated)
//! and the admin/replication API (bearer-token-authenticated, optionally
//! mTLS-gated for peer-to-peer traffic). Configuration is read once from
//! the environment at startup; see [`ruststack_core::Config`].
//!
//! # Environment Variables
//!
//! See `ruststack_core::config` for the full `PXOBJ_*`/`POD_*` list.

mod auth;
mod http;
mod state;
mod tls;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use ruststack_cluster::{Cluster, ClusterConfig};
use ruststack_core::{Config, init_tracing};
use ruststack_store::Store;
use rustls::pki_types::CertificateDer;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::state::AppState;

/// Server version reported in startup logs.
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: {err:?}");
            std::process::exit(1);
        }
    };

    init_tracing("info").context("failed to initialize tracing")?;

    info!(
        version = VERSION,
        s3_port = config.s3_port,
        admin_port = config.admin_port,
        replicas = config.replicas,
        tls_enabled = config.tls.enabled,
        "starting pxobj",
    );

    let store = Arc::new(Store::open(&config.data_dir).context("failed to open data directory")?);
    let cluster_config = ClusterConfig::from_core_config(&config);
    let cluster = Arc::new(Cluster::new(cluster_config).context("failed to build cluster client")?);
    let config = Arc::new(config);
    let state = AppState::new(store, cluster, config.clone());

    let (s3_tls, admin_tls) = if config.tls.enabled {
        let s3_config = tls::load_s3_server_config(&config.tls).context("failed to load S3 TLS material")?;
        let admin_config =
            tls::load_admin_server_config(&config.tls).context("failed to load admin TLS material")?;
        (Some(TlsAcceptor::from(s3_config)), Some(TlsAcceptor::from(admin_config)))
    } else {
        (None, None)
    };

    let s3_listener = TcpListener::bind(("0.0.0.0", config.s3_port))
        .await
        .with_context(|| format!("failed to bind S3 listener on port {}", config.s3_port))?;
    let admin_listener = TcpListener::bind(("0.0.0.0", config.admin_port))
        .await
        .with_context(|| format!("failed to bind admin listener on port {}", config.admin_port))?;

    info!(port = config.s3_port, "S3 listener ready");
    info!(port = config.admin_port, "admin listener ready");

    let s3_task = tokio::spawn(serve_s3(s3_listener, s3_tls, state.clone()));
    let admin_task = tokio::spawn(serve_admin(admin_listener, admin_tls, state));

    let (s3_result, admin_result) = tokio::join!(s3_task, admin_task);
    s3_result.context("S3 listener task panicked")??;
    admin_result.context("admin listener task panicked")??;

    Ok(())
}

async fn serve_s3(listener: TcpListener, tls_acceptor: Option<TlsAcceptor>, state: AppState) -> Result<()> {
    let graceful = Arc::new(GracefulShutdown::new());
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining S3 connections");
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, "failed to accept S3 connection");
                        continue;
                    }
                };

                let state = state.clone();
                let tls_acceptor = tls_acceptor.clone();
                let http = http.clone();
                let graceful = graceful.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                        let state = state.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = crate::http::read_body(body).await.unwrap_or_default();
                            let response = crate::http::s3::handle(&state, parts, body).await;
                            Ok::<_, Infallible>(response)
                        }
                    });

                    let result = if let Some(acceptor) = tls_acceptor {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                let conn = http.serve_connection(TokioIo::new(tls_stream), service);
                                graceful.watch(conn.into_owned()).await
                            }
                            Err(err) => {
                                warn!(%peer_addr, error = %err, "S3 TLS handshake failed");
                                return;
                            }
                        }
                    } else {
                        let conn = http.serve_connection(TokioIo::new(stream), service);
                        graceful.watch(conn.into_owned()).await
                    };

                    if let Err(err) = result {
                        error!(%peer_addr, error = %err, "S3 connection error");
                    }
                });
            }

            () = &mut shutdown => {
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("S3 listener drained, exiting");
    Ok(())
}

async fn serve_admin(listener: TcpListener, tls_acceptor: Option<TlsAcceptor>, state: AppState) -> Result<()> {
    let graceful = Arc::new(GracefulShutdown::new());
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining admin connections");
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, "failed to accept admin connection");
                        continue;
                    }
                };

                let state = state.clone();
                let tls_acceptor = tls_acceptor.clone();
                let http = http.clone();
                let graceful = graceful.clone();

                tokio::spawn(async move {
                    let result = if let Some(acceptor) = tls_acceptor {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                let peer_certs = tls::peer_certificates(&tls_stream);
                                let service = admin_service(state, peer_certs);
                                let conn = http.serve_connection(TokioIo::new(tls_stream), service);
                                graceful.watch(conn.into_owned()).await
                            }
                            Err(err) => {
                                warn!(%peer_addr, error = %err, "admin TLS handshake failed");
                                return;
                            }
                        }
                    } else {
                        let service = admin_service(state, None);
                        let conn = http.serve_connection(TokioIo::new(stream), service);
                        graceful.watch(conn.into_owned()).await
                    };

                    if let Err(err) = result {
                        error!(%peer_addr, error = %err, "admin connection error");
                    }
                });
            }

            () = &mut shutdown => {
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("admin listener drained, exiting");
    Ok(())
}

/// Build the admin-listener service, routing `/_cluster/*` to the
/// replication handler and everything else to the admin handler.
fn admin_service(
    state: AppState,
    peer_certs: Option<Vec<CertificateDer<'static>>>,
) -> impl hyper::service::Service<
    hyper::Request<hyper::body::Incoming>,
    Response = hyper::Response<crate::http::response::BoxBody>,
    Error = Infallible,
> + Clone {
    service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
        let state = state.clone();
        let peer_certs = peer_certs.clone();
        async move {
            let (parts, body) = req.into_parts();
            let body = crate::http::read_body(body).await.unwrap_or_default();
            let response = if parts.uri.path().starts_with("/_cluster/") {
                crate::http::replication::handle(&state, peer_certs.as_deref(), parts, body).await
            } else {
                crate::http::admin::handle(&state, parts, body).await
            };
            Ok::<_, Infallible>(response)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_report_a_version_string() {
        assert!(!VERSION.is_empty());
    }
}
