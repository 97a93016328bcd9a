use crate::error::EdaPartsError;
use crate::service::store_worker::StoreWorker;
use crate::types::StoreTask;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Accepts store tasks for background execution.
pub trait StoreQueue: Send + Sync {
    fn enqueue(&self, task: StoreTask) -> Result<(), EdaPartsError>;
}

/// Messages handled by the store actor.
#[derive(Debug)]
pub enum StoreActorMessage {
    /// Queue a task behind any other task writing the same target file.
    Store(StoreTask),
    /// Number of tasks queued or running.
    Pending(RpcReplyPort<usize>),

    // Internal messages (sent by spawned workers)
    /// The running task for this target finished; start the next one.
    Completed { target: PathBuf },
}

/// Handle for interacting with the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    actor: ActorRef<StoreActorMessage>,
}

impl StoreHandle {
    pub async fn pending(&self) -> Result<usize, EdaPartsError> {
        ractor::call!(self.actor, StoreActorMessage::Pending)
            .map_err(|e| EdaPartsError::RactorError(format!("Pending RPC failed: {e}")))
    }

    /// Stop the actor; tasks already running finish on their own.
    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

impl StoreQueue for StoreHandle {
    fn enqueue(&self, task: StoreTask) -> Result<(), EdaPartsError> {
        ractor::cast!(self.actor, StoreActorMessage::Store(task))
            .map_err(|e| EdaPartsError::RactorError(format!("Store cast failed: {e}")))
    }
}

struct StoreActorState {
    worker: StoreWorker,
    /// Front of each queue is the running task.
    queues: HashMap<PathBuf, VecDeque<StoreTask>>,
}

impl StoreActorState {
    fn pending(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}

struct StoreActor;

impl StoreActor {
    fn start(&self, myself: &ActorRef<StoreActorMessage>, worker: &StoreWorker, target: PathBuf, task: StoreTask) {
        let worker = worker.clone();
        let myself = myself.clone();
        tokio::spawn(async move {
            worker.run(task).await;
            let _ = ractor::cast!(myself, StoreActorMessage::Completed { target });
        });
    }
}

#[ractor::async_trait]
impl Actor for StoreActor {
    type Msg = StoreActorMessage;
    type State = StoreActorState;
    type Arguments = StoreWorker;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        worker: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!("StoreActor started");
        Ok(StoreActorState {
            worker,
            queues: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            StoreActorMessage::Store(task) => {
                let target = state.worker.target_of(&task);
                let queue = state.queues.entry(target.clone()).or_default();
                queue.push_back(task.clone());
                if queue.len() == 1 {
                    self.start(&myself, &state.worker, target, task);
                } else {
                    debug!(
                        "Store of {} {} waits behind {} task(s) for {}",
                        task.file_type,
                        task.model_id,
                        queue.len() - 1,
                        target.display()
                    );
                }
            }
            StoreActorMessage::Pending(rp) => {
                let _ = rp.send(state.pending());
            }
            StoreActorMessage::Completed { target } => {
                let Some(queue) = state.queues.get_mut(&target) else {
                    warn!("Completion for unknown target {}", target.display());
                    return Ok(());
                };
                queue.pop_front();
                match queue.front().cloned() {
                    Some(next) => self.start(&myself, &state.worker, target, next),
                    None => {
                        state.queues.remove(&target);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Start a store actor executing tasks with `worker`.
pub async fn spawn(worker: StoreWorker) -> Result<StoreHandle, EdaPartsError> {
    let (actor, _jh) = Actor::spawn(None, StoreActor, worker)
        .await
        .map_err(|e| EdaPartsError::RactorError(format!("StoreActor spawn failed: {e}")))?;
    Ok(StoreHandle { actor })
}
