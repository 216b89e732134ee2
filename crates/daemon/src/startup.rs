// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: open the datastore, connect the broker, wire every
//! component, and spawn the background loops.
//!
//! Recovery order matters: the datastore first (everything persists through
//! it), then the broker (optional), then the catalog (restored from the
//! datastore snapshot when the git sidecar has not populated the disk yet),
//! and finally the watchers and tickers.

use mm_broker::{Broker, EventBus, JobQueue};
use mm_catalog::{CatalogError, CatalogStore, SnapshotSink};
use mm_core::{CatalogModel, Config};
use mm_discovery::{Discovery, HfClient, ModelCache, SyncQueries, SyncService, VllmCatalog};
use mm_engine::{AutomationLoop, AutomationSettings, Engine, EngineSettings, Worker};
use mm_kube::{ActivationController, StatusProjector};
use mm_store::Store;
use mm_weights::WeightStore;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::downloader::HfCliDownloader;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("datastore: {0}")]
    Store(#[from] mm_store::StoreError),

    #[error("broker: {0}")]
    Broker(#[from] mm_broker::BrokerError),
}

/// Everything the HTTP facade needs.
pub struct App {
    pub config: Config,
    pub store: Store,
    pub bus: EventBus,
    pub catalog: CatalogStore,
    pub engine: Engine,
    pub weights: WeightStore,
    pub discovery: Discovery,
    pub queue: Option<JobQueue>,
    pub projector: Option<StatusProjector>,
    pub controller: Option<Arc<ActivationController>>,
}

/// Adapts the datastore to the catalog's write-through seam.
struct StoreSnapshotSink(Store);

#[async_trait::async_trait]
impl SnapshotSink for StoreSnapshotSink {
    async fn save_snapshot(&self, models: &[CatalogModel]) {
        if let Err(e) = self.0.save_catalog_snapshot(models).await {
            tracing::warn!(error = %e, "catalog snapshot write failed");
        }
    }
}

/// Bring the control plane up. Background loops run until `cancel` fires.
pub async fn startup(config: Config, cancel: CancellationToken) -> Result<Arc<App>, StartupError> {
    let store = Store::open(&config.datastore_dsn).await?;
    tracing::info!(driver = %config.datastore_driver, "datastore ready");

    let broker = match config.redis_url() {
        Some(url) => {
            let broker =
                Broker::connect(&url, config.events_channel.clone(), config.job_stream.clone())
                    .await?;
            tracing::info!("broker connected");
            Some(broker)
        }
        None => {
            tracing::info!("no broker configured, running in-process");
            None
        }
    };

    let bus = EventBus::with_broker(broker.clone());
    {
        let bus = bus.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move { bus.run_broker_reader(cancel).await });
    }

    let weights = WeightStore::new(
        &config.weights_storage_path,
        Arc::new(HfCliDownloader::new(
            config.hf_token.clone(),
            config.weights_storage_path.join(".hf-cache"),
        )),
    );

    let queue = broker.clone().map(|b| {
        let consumer = format!(
            "{}-{}",
            std::env::var("HOSTNAME").unwrap_or_else(|_| "mmd".to_string()),
            std::process::id()
        );
        JobQueue::new(b, "mm-workers", consumer)
    });

    let engine = Engine::new(
        store.clone(),
        bus.clone(),
        queue.clone(),
        Arc::new(weights.clone()),
        EngineSettings {
            install_timeout: config.weights_install_timeout,
            pvc_name: config.weights_pvc_name.clone(),
            inference_model_root: config.inference_model_root.clone(),
        },
        cancel.clone(),
    );

    if let Some(queue) = queue.clone() {
        let worker = Worker::new(engine.clone(), queue);
        let cancel = cancel.child_token();
        tokio::spawn(async move { worker.run(cancel).await });
    }

    // Catalog: disk first, datastore snapshot when the sidecar is cold.
    let catalog = CatalogStore::new(
        config.models_dir(),
        Some(Arc::new(StoreSnapshotSink(store.clone()))),
    );
    match catalog.load().await {
        Ok(count) => tracing::info!(count, "catalog loaded from disk"),
        Err(CatalogError::DirMissing(dir)) => {
            tracing::info!(dir = %dir.display(), "catalog dir missing, trying snapshot");
            match store.load_catalog_snapshot().await {
                Ok(Some((models, at))) => {
                    tracing::info!(count = models.len(), snapshot_at = %at, "restoring catalog");
                    catalog.restore(models).await;
                }
                Ok(None) => tracing::warn!("no catalog snapshot yet, serving empty catalog"),
                Err(e) => tracing::warn!(error = %e, "catalog snapshot load failed"),
            }
        }
        Err(e) => tracing::warn!(error = %e, "catalog load failed"),
    }
    {
        // Periodic reload picks up git-sidecar syncs.
        let catalog = catalog.clone();
        let interval = config.catalog_refresh_interval;
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = catalog.reload().await {
                    tracing::debug!(error = %e, "catalog reload skipped");
                }
            }
        });
    }

    let discovery = Discovery::new(
        HfClient::new(config.hf_token.clone()),
        VllmCatalog::new(config.github_token.clone(), config.vllm_cache_ttl),
        ModelCache::new(config.hf_cache_ttl, broker.clone()),
        Some(Arc::new(store.clone())),
    );
    {
        let sync = SyncService::new(
            discovery.clone(),
            bus.clone(),
            config.catalog_refresh_interval,
            SyncQueries::default(),
        );
        let cancel = cancel.child_token();
        tokio::spawn(async move { sync.run(cancel).await });
    }

    {
        let automation = AutomationLoop::new(
            store.clone(),
            weights.clone(),
            AutomationSettings {
                interval: std::time::Duration::from_secs(60),
                job_ttl: config.automation_job_ttl,
                history_ttl: config.automation_history_ttl,
                weight_ttl: config.automation_weight_ttl,
            },
        );
        let cancel = cancel.child_token();
        tokio::spawn(async move { automation.run(cancel).await });
    }

    // Kubernetes is optional at startup so the daemon can serve weights and
    // jobs outside a cluster; activation endpoints report upstream-unavailable
    // until a client connects.
    let (projector, controller) = match kube::Client::try_default().await {
        Ok(client) => {
            let projector = StatusProjector::new(
                client.clone(),
                config.namespace.clone(),
                config.inference_service_name.clone(),
                bus.clone(),
            );
            {
                let projector = projector.clone();
                let cancel = cancel.clone();
                let child = cancel.child_token();
                tokio::spawn(async move {
                    if let Err(e) = projector.run(child).await {
                        // Cache sync failure is fatal to the component.
                        tracing::error!(error = %e, "status projector failed, shutting down");
                        cancel.cancel();
                    }
                });
            }
            let controller = Arc::new(ActivationController::new(
                client,
                config.namespace.clone(),
                config.inference_service_name.clone(),
                bus.clone(),
                Arc::new(projector.clone()),
                Some(store.clone()),
            ));
            (Some(projector), Some(controller))
        }
        Err(e) => {
            tracing::warn!(error = %e, "no kubernetes client, activation disabled");
            (None, None)
        }
    };

    Ok(Arc::new(App {
        config,
        store,
        bus,
        catalog,
        engine,
        weights,
        discovery,
        queue,
        projector,
        controller,
    }))
}
