// SPDX-License-Identifier: GPL-3.0-only

//! Mount Orchestrator
//!
//! Entry point for user actions on devices. Every device id gets its own
//! lane, an unbounded queue drained by a single task, so completions for one
//! device arrive in request order while different devices proceed in
//! parallel. Actions that change what is mounted are exclusive per device:
//! a second one submitted while the first is still queued or running is
//! rejected at once with `AlreadyInProgress`. A lane retires once its queue
//! is empty and the next request for that device opens a new one.

mod action;
mod flows;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use storage_contracts::{DeviceBus, NetworkMounter, PromptProvider, RequestId};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};

pub use action::{
    Action, ActionOutcome, ActionPhase, DEFAULT_FORMAT_FS, OrchestratorErrorKind,
    OrchestratorEvent,
};
use action::Failure;

use crate::registry::DeviceRegistry;

const EVENT_CAPACITY: usize = 256;

pub(crate) struct Request {
    id: RequestId,
    device_id: String,
    action: Action,
    /// In-flight key held by an exclusive action
    claim: Option<String>,
}

struct Job {
    request: Request,
    reply: oneshot::Sender<ActionOutcome>,
}

pub(crate) struct Inner {
    registry: Arc<DeviceRegistry>,
    bus: Arc<dyn DeviceBus>,
    mounter: Arc<dyn NetworkMounter>,
    prompts: Arc<dyn PromptProvider>,
    runtime: Handle,
    lanes: Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>,
    in_flight: Mutex<HashSet<String>>,
    events: broadcast::Sender<OrchestratorEvent>,
}

/// Completion handle for one request
pub struct Ticket {
    request_id: RequestId,
    device_id: String,
    action: Action,
    receiver: oneshot::Receiver<ActionOutcome>,
}

impl Ticket {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub async fn wait(self) -> ActionOutcome {
        let Ticket {
            request_id,
            device_id,
            action,
            receiver,
        } = self;
        receiver
            .await
            .unwrap_or_else(|_| dropped(request_id, &device_id, action))
    }

    /// For callers outside the runtime. Must not be called from async code.
    pub fn blocking_wait(self) -> ActionOutcome {
        let Ticket {
            request_id,
            device_id,
            action,
            receiver,
        } = self;
        receiver
            .blocking_recv()
            .unwrap_or_else(|_| dropped(request_id, &device_id, action))
    }
}

fn dropped(request_id: RequestId, device_id: &str, action: Action) -> ActionOutcome {
    ActionOutcome::new(
        request_id,
        device_id,
        action,
        Err(Failure::new(
            OrchestratorErrorKind::Cancelled,
            "Request was dropped before completing",
        )),
    )
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Must be called from within a Tokio runtime; lanes are spawned on it.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        bus: Arc<dyn DeviceBus>,
        mounter: Arc<dyn NetworkMounter>,
        prompts: Arc<dyn PromptProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registry,
                bus,
                mounter,
                prompts,
                runtime: Handle::current(),
                lanes: Mutex::default(),
                in_flight: Mutex::default(),
                events,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    /// Queue `action` on the device's lane
    pub fn submit(&self, device_id: &str, action: Action) -> Ticket {
        let claim = action.is_exclusive().then(|| self.inner.claim_key(device_id));
        let request = Request {
            id: RequestId::new(),
            device_id: device_id.to_string(),
            action,
            claim,
        };
        let (reply, receiver) = oneshot::channel();
        let ticket = Ticket {
            request_id: request.id,
            device_id: request.device_id.clone(),
            action: request.action.clone(),
            receiver,
        };

        if let Some(key) = &request.claim
            && !self.inner.claim(key)
        {
            tracing::info!("{} on {device_id} rejected, another action is in flight", request.action);
            let outcome = ActionOutcome::new(
                request.id,
                device_id,
                request.action,
                Err(Failure::new(
                    OrchestratorErrorKind::AlreadyInProgress,
                    format!("{device_id} is busy with another operation"),
                )),
            );
            self.inner.publish(OrchestratorEvent::Completed(outcome.clone()));
            let _ = reply.send(outcome);
            return ticket;
        }

        self.inner.phase(&request, ActionPhase::Requested);
        Inner::enqueue(&self.inner, Job { request, reply });
        ticket
    }

    /// Number of devices with queued or running work
    pub fn active_lanes(&self) -> usize {
        lock(&self.inner.lanes).len()
    }

    /// Submit and wait for the outcome
    pub async fn run(&self, device_id: &str, action: Action) -> ActionOutcome {
        self.submit(device_id, action).wait().await
    }
}

impl Inner {
    fn enqueue(this: &Arc<Self>, job: Job) {
        let mut lanes = lock(&this.lanes);

        let job = match lanes.get(&job.request.device_id) {
            Some(lane) => match lane.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (lane, receiver) = mpsc::unbounded_channel();
        let device_id = job.request.device_id.clone();
        // The receiver is alive, so this cannot fail.
        let _ = lane.send(job);
        lanes.insert(device_id.clone(), lane);
        this.runtime.spawn(Arc::clone(this).drain(device_id, receiver));
    }

    async fn drain(self: Arc<Self>, device_id: String, mut receiver: mpsc::UnboundedReceiver<Job>) {
        loop {
            let job = match receiver.try_recv() {
                Ok(job) => job,
                Err(_) => {
                    // Senders only push under the lanes lock, so an empty
                    // queue seen here stays empty until the entry is gone.
                    let mut lanes = lock(&self.lanes);
                    match receiver.try_recv() {
                        Ok(job) => job,
                        Err(_) => {
                            lanes.remove(&device_id);
                            tracing::trace!("lane for {device_id} retired");
                            return;
                        }
                    }
                }
            };
            self.process(job).await;
        }
    }

    async fn process(&self, job: Job) {
        let Job { request, reply } = job;
        self.phase(&request, ActionPhase::Executing);
        tracing::debug!("{} on {} started", request.action, request.device_id);

        let result = self.execute(&request).await;

        if let Some(key) = &request.claim {
            self.release(key);
        }

        let phase = match &result {
            Ok(_) => ActionPhase::Succeeded,
            Err(failure) => {
                tracing::warn!(
                    "{} on {} failed: {}",
                    request.action,
                    request.device_id,
                    failure.message
                );
                if failure.kind != OrchestratorErrorKind::Cancelled {
                    self.prompts
                        .show_error(&format!("Could not {}", request.action), &failure.message)
                        .await;
                }
                ActionPhase::Failed
            }
        };
        self.phase(&request, phase);

        let outcome = ActionOutcome::new(request.id, &request.device_id, request.action, result);
        self.publish(OrchestratorEvent::Completed(outcome.clone()));
        // The caller may have dropped its ticket.
        let _ = reply.send(outcome);
    }

    /// A cleartext device and its encrypted shell are one unit for
    /// exclusivity, keyed by the shell id.
    fn claim_key(&self, device_id: &str) -> String {
        self.registry
            .get_device(device_id)
            .and_then(|device| device.crypto_backing_id)
            .unwrap_or_else(|| device_id.to_string())
    }

    fn claim(&self, key: &str) -> bool {
        lock(&self.in_flight).insert(key.to_string())
    }

    fn release(&self, key: &str) {
        lock(&self.in_flight).remove(key);
    }

    fn phase(&self, request: &Request, phase: ActionPhase) {
        self.publish(OrchestratorEvent::Phase {
            request_id: request.id,
            device_id: request.device_id.clone(),
            phase,
        });
    }

    fn publish(&self, event: OrchestratorEvent) {
        let _ = self.events.send(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
