use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::Extensions;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use log::{info, warn};
use reqwest::Client;
use tower::ServiceExt;

use crate::admission::AdmissionController;
use crate::cluster::ClusterApi;
use crate::config::{ADMISSION_THRESHOLD, MAX_FILE_SIZE, MULTIPART_OVERHEAD, UPSTREAM_TIMEOUT};
use crate::provision::{ProvisionConfig, Provisioner};
use crate::registry::{normalize_session_id, SessionRegistry};
use crate::CatGateError;

mod proxy;

pub use proxy::forward;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
  pub provision: ProvisionConfig,
  /// CPU / memory usage percentage at which local serving stops
  pub threshold: f64,
  pub upstream_timeout: Duration,
  /// Largest request body relayed to a compute unit
  pub max_body: usize,
}

/// Where the traffic of one request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
  Local,
  Unit(String),
}

/// Routes session-scoped requests to the local backend or to the session's compute unit
pub struct Gateway {
  admission: AdmissionController,
  registry: SessionRegistry,
  client: Client,
  local: Router,
  max_body: usize,
}

impl Default for GatewayConfig {
  fn default() -> Self {
    GatewayConfig {
      provision: ProvisionConfig::default(),
      threshold: ADMISSION_THRESHOLD,
      upstream_timeout: UPSTREAM_TIMEOUT,
      max_body: MAX_FILE_SIZE + MULTIPART_OVERHEAD,
    }
  }
}

impl Gateway {
  pub fn new(api: Arc<dyn ClusterApi>, local: Router, config: GatewayConfig) -> Result<Self, CatGateError> {
    let client = Client::builder().timeout(config.upstream_timeout).build()?;
    Ok(Gateway {
      admission: AdmissionController::new(api.clone(), config.threshold),
      registry: SessionRegistry::new(Provisioner::new(api, config.provision)),
      client,
      local,
      max_body: config.max_body,
    })
  }

  pub fn registry(&self) -> &SessionRegistry {
    &self.registry
  }

  /// A session bound to a unit keeps using it. Otherwise ask the admission
  /// controller, and provision when local serving is denied.
  pub async fn resolve(&self, session_id: &str) -> Result<Route, CatGateError> {
    let session_id = normalize_session_id(session_id)?;

    if let Some(session) = self.registry.get(&session_id).await {
      return Ok(Route::Unit(session.unit_address));
    }

    if self.admission.decide().await.is_local() {
      return Ok(Route::Local);
    }

    match self.registry.get_or_create(&session_id).await {
      Some(session) => Ok(Route::Unit(session.unit_address)),
      None => {
        warn!("No compute unit for session {}, serve locally", session_id);
        Ok(Route::Local)
      }
    }
  }

  pub async fn dispatch(&self, route: Route, request: Request) -> Result<Response, CatGateError> {
    match route {
      Route::Local => {
        // Path params matched here would stack onto the ones the runtime router extracts
        let (mut parts, body) = request.into_parts();
        parts.extensions = Extensions::new();
        let request = Request::from_parts(parts, body);
        let response: Result<Response, Infallible> = self.local.clone().oneshot(request).await;
        Ok(response.into_response())
      }
      Route::Unit(address) => proxy::forward(&self.client, &address, request, self.max_body).await,
    }
  }
}

async fn route_request(
  State(gateway): State<Arc<Gateway>>,
  Path(params): Path<HashMap<String, String>>,
  request: Request,
) -> Result<Response, CatGateError> {
  let session = params
    .get("session")
    .ok_or_else(|| CatGateError::validation("Missing session id"))?;
  let route = gateway.resolve(session).await?;
  info!("{} {} -> {:?}", request.method(), request.uri().path(), route);
  gateway.dispatch(route, request).await
}

/// Public surface of the gateway, same paths as the runtime
pub fn router(gateway: Arc<Gateway>) -> Router {
  Router::new()
    .route("/:session/processes", get(route_request))
    .route("/:session/process/kill/:pid", post(route_request))
    .route("/:session/files/upload", post(route_request))
    .route("/:session/files/download/:name", get(route_request))
    .route("/:session/files/delete/:name", delete(route_request))
    .route("/:session/exec/python", post(route_request))
    .route("/:session/exec/nodejs", post(route_request))
    .layer(DefaultBodyLimit::disable())
    .with_state(gateway)
}
