//! # fleetctl: Fleet Operations Control Plane
//!
//! `fleetctl` is the control-plane core of a fleet-operations service: it
//! dispatches shell-style commands to remote probe agents, mediates human
//! approval for risky commands, and orchestrates responses back to multiple
//! caller surfaces (an HTTP API and an MCP tool surface).
//!
//! ## Overview
//!
//! Operators and automations ask for commands to run on probes, the small
//! agents installed on managed hosts. Not every command should run
//! unattended: restarting a service is routine, reformatting a disk is not,
//! and even routine commands are worth holding back when the observability
//! stack that would show their effects is degraded. `fleetctl` sits between
//! callers and the probe fleet and answers one question per request: run it
//! now, park it for a human, or refuse it.
//!
//! ### Request Flow
//!
//! A command request is decoded, evaluated against capacity policy
//! ([`policy`]), and then either dispatched immediately ([`dispatch`]),
//! submitted to the approval queue to wait for an operator ([`approvals`]),
//! or rejected with a structured rationale. Whatever happens, the outcome is
//! folded into one transport-neutral envelope ([`surface`]) and rendered
//! identically on the HTTP and MCP surfaces.
//!
//! ### Core Components
//!
//! The **approval queue** ([`approvals`]) is a bounded, time-bounded,
//! in-memory queue of pending decisions with a background reaper; decisions
//! are terminal and observable through polling waits. The **policy engine**
//! ([`policy`]) combines a pure command risk classifier with live capacity
//! signals from an observability source. The **dispatch service**
//! ([`dispatch`]) tracks each in-flight request in a capacity-1 result slot
//! and races the probe's response against a timeout and caller cancellation.
//! The **fleet store** ([`fleet`]) tracks probes, their capability policies,
//! and their outbound channels.
//!
//! Background services run alongside the HTTP server: the approval queue
//! reaper and the command tracker sweeper, both driven by a shared
//! cancellation token for graceful shutdown.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use fleetctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = fleetctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     fleetctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod approvals;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod fleet;
pub mod mcp;
mod openapi;
pub mod policy;
pub mod surface;
pub mod telemetry;
pub mod types;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::approvals::hooks::AuditLogHook;
use crate::approvals::queue::ApprovalQueue;
use crate::approvals::service::ApprovalPolicyService;
use crate::dispatch::sender::CommandSender;
use crate::dispatch::service::DispatchService;
use crate::dispatch::tracker::CommandTracker;
use crate::fleet::store::{ChannelSender, FleetStore};
use crate::fleet::templates::PolicyTemplateStore;
use crate::openapi::ApiDoc;
use crate::policy::engine::CommandPolicyEngine;
use crate::policy::grafana::{GrafanaProviderConfig, GrafanaSignalProvider};
use crate::policy::signals::{CapacitySignalProvider, StaticSignalProvider};

pub use config::Config;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub fleet: Arc<FleetStore>,
    pub engine: Arc<CommandPolicyEngine>,
    pub dispatch: Arc<DispatchService>,
    pub approvals: Arc<ApprovalPolicyService>,
    pub signals: Arc<dyn CapacitySignalProvider>,
    pub sender: Arc<dyn CommandSender>,
}

impl AppState {
    /// Wire up every component from configuration.
    pub fn from_config(config: Config) -> Self {
        let queue = Arc::new(ApprovalQueue::new(config.approvals.queue_config()));
        let tracker = Arc::new(CommandTracker::new());
        let fleet = Arc::new(FleetStore::new());
        let templates = Arc::new(PolicyTemplateStore::seeded(config.policy_templates.clone()));

        let signals: Arc<dyn CapacitySignalProvider> = match &config.capacity.grafana {
            Some(grafana) => Arc::new(
                GrafanaSignalProvider::new(GrafanaProviderConfig {
                    base_url: grafana.base_url.clone(),
                    api_token: grafana.api_token.clone(),
                    snapshot_path: grafana.snapshot_path.clone(),
                    timeout: grafana.timeout,
                    source: grafana.source.clone(),
                })
                .expect("Failed to create capacity signal HTTP client"),
            ),
            None => match &config.capacity.static_signals {
                Some(static_signals) => {
                    Arc::new(StaticSignalProvider::with_signals(static_signals.clone()))
                }
                None => Arc::new(StaticSignalProvider::empty()),
            },
        };

        let engine = Arc::new(CommandPolicyEngine::new(
            signals.clone(),
            config.capacity.thresholds,
        ));
        let sender: Arc<dyn CommandSender> = Arc::new(ChannelSender::new(fleet.clone()));
        let dispatch = Arc::new(DispatchService::new(tracker, sender.clone()));
        let approvals = Arc::new(ApprovalPolicyService::new(
            queue,
            fleet.clone(),
            templates,
            vec![Arc::new(AuditLogHook)],
        ));

        Self {
            config,
            fleet,
            engine,
            dispatch,
            approvals,
            signals,
            sender,
        }
    }
}

/// The running application: state plus the HTTP server lifecycle.
pub struct Application {
    state: AppState,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            state: AppState::from_config(config),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the full HTTP router for the given state.
    pub fn build_router(state: AppState) -> Router {
        let api_routes = Router::new()
            .route("/probes", post(api::handlers::probes::register_probe))
            .route("/probes", get(api::handlers::probes::list_probes))
            .route("/probes/{probe_id}", get(api::handlers::probes::get_probe))
            .route(
                "/probes/{probe_id}/commands",
                post(api::handlers::commands::invoke_command),
            )
            .route(
                "/probes/{probe_id}/results",
                post(api::handlers::probes::ingest_result),
            )
            .route(
                "/probes/{probe_id}/policy",
                post(api::handlers::probes::apply_policy),
            )
            .route("/approvals", get(api::handlers::approvals::list_approvals))
            .route(
                "/approvals/pending",
                get(api::handlers::approvals::list_pending_approvals),
            )
            .route("/approvals/{id}", get(api::handlers::approvals::get_approval))
            .route(
                "/approvals/{id}/decision",
                get(api::handlers::approvals::wait_for_decision)
                    .post(api::handlers::approvals::decide_approval),
            )
            .route("/policy/preview", post(api::handlers::policy::preview_policy))
            .route("/grafana/status", get(api::handlers::grafana::grafana_status))
            .route(
                "/grafana/snapshot",
                get(api::handlers::grafana::grafana_snapshot),
            );

        Router::new()
            .nest("/api/v1", api_routes)
            .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
            .route(
                "/api/v1/openapi.json",
                get(|| async { axum::Json(ApiDoc::openapi()) }),
            )
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            )
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Spawn the background services and run the HTTP server until the
    /// shutdown future resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let state = self.state.clone();
        let background = CancellationToken::new();

        let queue = state.approvals.queue().clone();
        let reaper_interval = state.config.approvals.reaper_interval;
        let reaper_token = background.clone();
        tokio::spawn(async move {
            queue.run_reaper(reaper_interval, reaper_token).await;
        });

        let tracker = state.dispatch.tracker().clone();
        let sweep_interval = state.config.dispatch.sweep_interval;
        let tracker_ttl = state.config.dispatch.tracker_ttl;
        let sweeper_token = background.clone();
        tokio::spawn(async move {
            tracker.run_sweeper(sweep_interval, tracker_ttl, sweeper_token).await;
        });

        let addr = format!("{}:{}", state.config.host, state.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        tracing::info!(addr = %addr, "fleetctl listening");

        let router = Self::build_router(state);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error")?;

        background.cancel();
        tracing::info!("fleetctl shut down");
        Ok(())
    }
}
