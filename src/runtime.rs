//! Runtime for chat instances
//!
//! Each instance runs in its own task and handles its operations in arrival
//! order. Instances run concurrently and share the knowledge base. All
//! outbound operations are funneled into a single channel.

use crate::config::{AppConfig, BotKind};
use crate::instance::{ChatInstance, InstanceError, SyncKind};
use crate::knowledge::{Knowledge, LoadError};
use crate::protocol::{
    Envelope, Inbound, MetaOutbound, MetaRequest, MetaSnapshot, Outbound, Request, Target,
    BASE_INSTANCE,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Instance {0} not found")]
    UnknownInstance(String),
    #[error("Instance {0} already exists")]
    DuplicateInstance(String),
    #[error("Instance {0} stopped")]
    Stopped(String),
    #[error(transparent)]
    Instance(#[from] InstanceError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Work item for an instance task
#[derive(Debug)]
enum Command {
    Operation(Inbound),
    Save {
        dir: PathBuf,
        done: oneshot::Sender<Result<PathBuf, InstanceError>>,
    },
}

/// Handle to interact with a running instance
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    tx: mpsc::Sender<Command>,
    kind: BotKind,
}

/// Manager for all chat instances
pub struct RuntimeManager {
    knowledge: Knowledge,
    config: AppConfig,
    runtimes: RwLock<HashMap<String, InstanceHandle>>,
    outbound_tx: mpsc::Sender<Envelope>,
}

impl RuntimeManager {
    pub fn new(
        knowledge: Knowledge,
        config: AppConfig,
        outbound_tx: mpsc::Sender<Envelope>,
    ) -> Self {
        Self {
            knowledge,
            config,
            runtimes: RwLock::new(HashMap::new()),
            outbound_tx,
        }
    }

    /// Restore saved instances, make sure `base` exists and announce them
    pub async fn start(&self) -> Result<(), RuntimeError> {
        if let Some(dir) = self.config.snapshot_dir.clone().filter(|dir| dir.is_dir()) {
            for snapshot in ChatInstance::load_snapshots(&dir)? {
                tracing::info!(instance = %snapshot.name, "Restoring instance");
                let instance =
                    ChatInstance::restore(snapshot, &self.knowledge, self.config.page_size);
                self.spawn(instance, SyncKind::Refresh).await?;
            }
        }
        if !self.runtimes.read().await.contains_key(BASE_INSTANCE) {
            self.create(BASE_INSTANCE, self.config.bot, &Map::new())
                .await?;
        }
        self.sync_meta().await;
        Ok(())
    }

    /// Start a new instance driven by `kind`
    pub async fn create(
        &self,
        name: &str,
        kind: BotKind,
        data: &Map<String, Value>,
    ) -> Result<(), RuntimeError> {
        let instance =
            ChatInstance::start(name, kind, &self.knowledge, self.config.page_size, data);
        self.spawn(instance, SyncKind::Init).await
    }

    async fn spawn(&self, mut instance: ChatInstance, sync: SyncKind) -> Result<(), RuntimeError> {
        let name = instance.name().to_string();
        let kind = instance.kind();
        let mut runtimes = self.runtimes.write().await;
        if runtimes.contains_key(&name) {
            return Err(RuntimeError::DuplicateInstance(name));
        }

        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let outbound_tx = self.outbound_tx.clone();
        let initial = match sync {
            SyncKind::Init => instance.init(),
            SyncKind::Refresh => instance.receive(Inbound::Refresh),
        };

        tokio::spawn(async move {
            let name = instance.name().to_string();
            for payload in initial {
                if outbound_tx.send(Envelope::chat(&name, payload)).await.is_err() {
                    return;
                }
            }
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Operation(operation) => {
                        for payload in instance.receive(operation) {
                            if outbound_tx.send(Envelope::chat(&name, payload)).await.is_err() {
                                tracing::debug!(instance = %name, "Outbound channel closed");
                                return;
                            }
                        }
                    }
                    Command::Save { dir, done } => {
                        let _ = done.send(instance.save(&dir));
                    }
                }
            }
            tracing::info!(instance = %name, "Instance stopped");
        });

        runtimes.insert(name, InstanceHandle { tx, kind });
        Ok(())
    }

    /// Route one parsed request
    pub async fn dispatch(&self, request: Request) {
        match request {
            Request::Meta(meta) => self.dispatch_meta(meta).await,
            Request::Chat { target, operation } => {
                let command = operation.operation();
                if let Err(e) = self.route(target, operation).await {
                    self.report_error(command, &e.to_string()).await;
                }
            }
        }
    }

    async fn route(&self, target: Target, operation: Inbound) -> Result<(), RuntimeError> {
        let handles: Vec<(String, InstanceHandle)> = {
            let runtimes = self.runtimes.read().await;
            match target {
                Target::All => runtimes
                    .iter()
                    .map(|(name, handle)| (name.clone(), handle.clone()))
                    .collect(),
                Target::Instance(name) => {
                    let handle = runtimes
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| RuntimeError::UnknownInstance(name.clone()))?;
                    vec![(name, handle)]
                }
            }
        };
        for (name, handle) in handles {
            handle
                .tx
                .send(Command::Operation(operation.clone()))
                .await
                .map_err(|_| RuntimeError::Stopped(name))?;
        }
        Ok(())
    }

    async fn dispatch_meta(&self, request: MetaRequest) {
        let (command, result) = match request {
            MetaRequest::NewInstance { name, mode, data } => {
                let kind = mode.unwrap_or(self.config.bot);
                ("new-instance", self.create(&name, kind, &data).await)
            }
            MetaRequest::Refresh => {
                tracing::info!("Reloading knowledge base");
                ("refresh", self.knowledge.reload().map_err(RuntimeError::from))
            }
            MetaRequest::RemoveInstance { name } => {
                let removed = self.runtimes.write().await.remove(&name);
                // Dropping the handle closes the channel and ends the task
                let result = match removed {
                    Some(_) => {
                        tracing::info!(instance = %name, "Instance removed");
                        Ok(())
                    }
                    None => Err(RuntimeError::UnknownInstance(name)),
                };
                ("remove-instance", result)
            }
            MetaRequest::SaveInstances => ("save-instances", self.save_all().await.map(|_| ())),
        };
        match result {
            Ok(()) => self.sync_meta().await,
            Err(e) => {
                tracing::warn!(command, error = %e, "Meta operation failed");
                self.send(Envelope::meta(MetaOutbound::Error {
                    command: command.to_string(),
                    message: e.to_string(),
                }))
                .await;
            }
        }
    }

    /// Save every instance to the snapshot directory, if one is configured
    pub async fn save_all(&self) -> Result<Vec<PathBuf>, RuntimeError> {
        let Some(dir) = self.config.snapshot_dir.clone() else {
            return Ok(Vec::new());
        };
        let handles: Vec<(String, InstanceHandle)> = self
            .runtimes
            .read()
            .await
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        let mut paths = Vec::new();
        for (name, handle) in handles {
            let (done, saved) = oneshot::channel();
            handle
                .tx
                .send(Command::Save {
                    dir: dir.clone(),
                    done,
                })
                .await
                .map_err(|_| RuntimeError::Stopped(name.clone()))?;
            let path = saved.await.map_err(|_| RuntimeError::Stopped(name))??;
            tracing::info!(path = %path.display(), "Instance saved");
            paths.push(path);
        }
        Ok(paths)
    }

    /// Announce bot kinds and live instances
    pub async fn sync_meta(&self) {
        let instances = self
            .runtimes
            .read()
            .await
            .iter()
            .map(|(name, handle)| (name.clone(), handle.kind))
            .collect();
        let loaders = BotKind::all()
            .into_iter()
            .map(|kind| (kind.name(), kind.config_fields()))
            .collect();
        self.send(Envelope::meta(MetaOutbound::SyncMeta(MetaSnapshot {
            loaders,
            instances,
        })))
        .await;
    }

    /// Report a failed operation through the `base` instance
    pub async fn report_error(&self, command: &str, message: &str) {
        tracing::warn!(command, error = message, "Operation failed");
        self.send(Envelope::chat(
            BASE_INSTANCE,
            Outbound::Error {
                command: command.to_string(),
                message: message.to_string(),
            },
        ))
        .await;
    }

    async fn send(&self, envelope: Envelope) {
        if self.outbound_tx.send(envelope).await.is_err() {
            tracing::debug!("Outbound channel closed");
        }
    }
}
