//! Runtime wiring: credential store, event source, projection worker and the
//! auth gateway.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Mutex;

use authreplica_auth::{AuthGateway, BcryptPasswords, Hs256JwtValidator, JwtValidator, TokenIssuer};
use authreplica_core::CredentialStore;
use authreplica_events::{Delivery, EventBus, InMemoryEventBus};
use authreplica_infra::projections::IdentityProjector;
use authreplica_infra::store::{InMemoryCredentialStore, PostgresCredentialStore};
use authreplica_infra::workers::{ProjectionHandler, ProjectionWorker, WorkerHandle};

use crate::config::AppConfig;

const WORKER_NAME: &str = "identity-projection";

pub type Gateway = AuthGateway<Arc<dyn CredentialStore>, BcryptPasswords>;

pub struct AppServices {
    pub gateway: Gateway,
    pub validator: Arc<dyn JwtValidator>,
    pub request_timeout: Duration,
    /// Set when events arrive over the in-process bus rather than Redis.
    bus: Option<Arc<InMemoryEventBus<Delivery>>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    /// Services with no event source attached.
    pub fn new(gateway: Gateway, validator: Arc<dyn JwtValidator>, request_timeout: Duration) -> Self {
        Self {
            gateway,
            validator,
            request_timeout,
            bus: None,
            worker: Mutex::new(None),
        }
    }

    fn with_source(mut self, (bus, worker): Source) -> Self {
        self.bus = bus;
        self.worker = Mutex::new(Some(worker));
        self
    }

    /// The in-process bus feeding the projection, if that transport is in use.
    pub fn event_bus(&self) -> Option<Arc<InMemoryEventBus<Delivery>>> {
        self.bus.clone()
    }

    /// Stop the projection worker. Safe to call more than once.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            worker.shutdown().await;
            tracing::info!("projection worker stopped");
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<Arc<AppServices>> {
    let store: Arc<dyn CredentialStore> = match &config.database {
        Some(db) => {
            let store = PostgresCredentialStore::connect(&db.url, db.max_connections)
                .await
                .context("connecting to postgres")?;
            store
                .ensure_schema()
                .await
                .context("creating credential schema")?;
            tracing::info!("using postgres credential store");
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory credential store");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let handler = ProjectionHandler::new(
        config.events_topic.clone(),
        IdentityProjector::new(Arc::clone(&store)),
    );

    let source = match &config.redis_url {
        Some(url) => redis_source(config, url, handler).await?,
        None => in_memory_source(config, handler),
    };

    let issuer = TokenIssuer::new(&config.jwt_secret, config.token_lifetimes)
        .context("building token issuer")?;
    let gateway = AuthGateway::new(store, BcryptPasswords::default(), issuer, config.login_policy);
    let validator: Arc<dyn JwtValidator> = Arc::new(Hs256JwtValidator::new(&config.jwt_secret));

    Ok(Arc::new(
        AppServices::new(gateway, validator, config.request_timeout).with_source(source),
    ))
}

type Handler = ProjectionHandler<IdentityProjector<Arc<dyn CredentialStore>>>;
type Source = (Option<Arc<InMemoryEventBus<Delivery>>>, WorkerHandle);

fn in_memory_source(config: &AppConfig, handler: Handler) -> Source {
    let bus = Arc::new(InMemoryEventBus::<Delivery>::new());
    let worker = ProjectionWorker::spawn(WORKER_NAME, bus.subscribe(), handler);
    tracing::info!(topic = %config.events_topic, "consuming events from in-memory bus");
    (Some(bus), worker)
}

#[cfg(feature = "redis")]
async fn redis_source(
    config: &AppConfig,
    url: &str,
    handler: Handler,
) -> anyhow::Result<Source> {
    use authreplica_infra::event_bus::{RedisStreamsConfig, RedisStreamsSource};

    let consumer = format!("auth-{}", uuid::Uuid::now_v7());
    let source = RedisStreamsSource::new(
        url,
        RedisStreamsConfig::new(&config.events_topic, &config.consumer_group, consumer),
    )
    .context("opening redis client")?;
    source
        .ensure_consumer_group()
        .await
        .context("creating redis consumer group")?;

    tracing::info!(
        stream_key = %config.events_topic,
        group = %config.consumer_group,
        "consuming events from redis streams"
    );
    Ok((None, source.spawn(WORKER_NAME, handler)))
}

#[cfg(not(feature = "redis"))]
async fn redis_source(
    config: &AppConfig,
    _url: &str,
    handler: Handler,
) -> anyhow::Result<Source> {
    tracing::warn!("REDIS_URL is set but this build lacks the `redis` feature; using in-memory bus");
    Ok(in_memory_source(config, handler))
}
