//! In-process lock-step bus used by tests and the demo binary.
//!
//! One [`LoopbackBus`] hosts a federation; each participant holds a
//! [`LoopbackHandle`]. Time advances when every executing federate has a
//! pending request: all are granted the minimum requested time together.
//! That reproduces the external transport's observable behavior for these
//! federates: a federate requesting the end-of-simulation sentinel is woken
//! at every globally granted step until only sentinel requests remain.
//!
//! Declared time-step granularity is logged at join; grant quantization is
//! the real transport's concern, not the loopback's.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use log::{debug, trace};

use super::{Bus, BusError, PublicationId, SubscriptionId};

#[derive(Default)]
struct Topic {
    payload: Option<String>,
    version: u64,
    owner: Option<String>,
}

struct FedEntry {
    name: String,
    entered: bool,
    executing: bool,
    granted: f64,
    pending: Option<f64>,
}

struct Core {
    quorum: usize,
    entered: usize,
    topics: BTreeMap<String, Topic>,
    feds: Vec<FedEntry>,
}

impl Core {
    /// Grants the minimum pending time to every executing federate once all
    /// of them are waiting. Returns true when a grant happened.
    fn try_grant(&mut self) -> bool {
        let mut grant = f64::INFINITY;
        let mut waiting = 0;
        let mut active = 0;
        for fed in &self.feds {
            if !fed.executing {
                continue;
            }
            active += 1;
            match fed.pending {
                Some(t) => {
                    waiting += 1;
                    grant = grant.min(t);
                }
                None => return false,
            }
        }
        if active == 0 || waiting < active {
            return false;
        }
        for fed in &mut self.feds {
            if fed.executing && fed.pending.take().is_some() {
                fed.granted = grant;
            }
        }
        trace!("loopback grant: {grant}");
        true
    }
}

struct Shared {
    core: Mutex<Core>,
    cv: Condvar,
}

/// Factory for one in-process federation.
pub struct LoopbackBus {
    shared: Arc<Shared>,
}

impl LoopbackBus {
    /// Creates a federation expecting `quorum` participants. Execution
    /// entry blocks until that many handles have entered.
    pub fn new(quorum: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    quorum,
                    entered: 0,
                    topics: BTreeMap::new(),
                    feds: Vec::new(),
                }),
                cv: Condvar::new(),
            }),
        }
    }

    /// Connects a participant, declaring its name and time-step granularity.
    pub fn join(&self, name: &str, time_delta: f64) -> LoopbackHandle {
        let mut core = self.lock();
        let index = core.feds.len();
        core.feds.push(FedEntry {
            name: name.to_string(),
            entered: false,
            executing: false,
            granted: 0.0,
            pending: None,
        });
        debug!("loopback: \"{name}\" joined (delta {time_delta})");
        LoopbackHandle {
            shared: Arc::clone(&self.shared),
            index,
            name: name.to_string(),
            subs: Vec::new(),
            pubs: Vec::new(),
            closed: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct SubEntry {
    topic: String,
    last_seen: u64,
}

/// One federate's connection to a [`LoopbackBus`].
pub struct LoopbackHandle {
    shared: Arc<Shared>,
    index: usize,
    name: String,
    subs: Vec<SubEntry>,
    pubs: Vec<String>,
    closed: bool,
}

impl LoopbackHandle {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Bus for LoopbackHandle {
    fn register_subscription(
        &mut self,
        topic: &str,
        _units: &str,
    ) -> Result<SubscriptionId, BusError> {
        self.ensure_open()?;
        let mut core = self.lock();
        core.topics.entry(topic.to_string()).or_default();
        drop(core);
        let id = SubscriptionId(self.subs.len());
        self.subs.push(SubEntry {
            topic: topic.to_string(),
            last_seen: 0,
        });
        Ok(id)
    }

    fn register_publication(&mut self, topic: &str) -> Result<PublicationId, BusError> {
        self.ensure_open()?;
        let mut core = self.lock();
        let entry = core.topics.entry(topic.to_string()).or_default();
        match &entry.owner {
            Some(owner) if owner != &self.name => {
                return Err(BusError::TopicOwned(topic.to_string()));
            }
            _ => entry.owner = Some(self.name.clone()),
        }
        drop(core);
        let id = PublicationId(self.pubs.len());
        self.pubs.push(topic.to_string());
        Ok(id)
    }

    fn enter_executing(&mut self) -> Result<(), BusError> {
        self.ensure_open()?;
        let mut core = self.lock();
        if !core.feds[self.index].entered {
            core.feds[self.index].entered = true;
            core.feds[self.index].executing = true;
            core.entered += 1;
        }
        self.shared.cv.notify_all();
        while core.entered < core.quorum {
            core = self
                .shared
                .cv
                .wait(core)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        Ok(())
    }

    fn request_time(&mut self, requested: f64) -> Result<f64, BusError> {
        self.ensure_open()?;
        let mut core = self.lock();
        let floor = core.feds[self.index].granted;
        core.feds[self.index].pending = Some(requested.max(floor));
        if core.try_grant() {
            self.shared.cv.notify_all();
        }
        while core.feds[self.index].pending.is_some() {
            core = self
                .shared
                .cv
                .wait(core)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if core.try_grant() {
                self.shared.cv.notify_all();
            }
        }
        Ok(core.feds[self.index].granted)
    }

    fn latest(&mut self, subscription: SubscriptionId) -> Result<Option<String>, BusError> {
        self.ensure_open()?;
        let entry = self
            .subs
            .get_mut(subscription.0)
            .ok_or(BusError::UnknownSubscription)?;
        let core = self
            .shared
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let topic = core
            .topics
            .get(&entry.topic)
            .ok_or(BusError::UnknownSubscription)?;
        entry.last_seen = topic.version;
        Ok(topic.payload.clone())
    }

    fn is_updated(&self, subscription: SubscriptionId) -> Result<bool, BusError> {
        self.ensure_open()?;
        let entry = self
            .subs
            .get(subscription.0)
            .ok_or(BusError::UnknownSubscription)?;
        let core = self.lock();
        let topic = core
            .topics
            .get(&entry.topic)
            .ok_or(BusError::UnknownSubscription)?;
        Ok(topic.version > entry.last_seen)
    }

    fn publish(&mut self, publication: PublicationId, payload: &str) -> Result<(), BusError> {
        self.ensure_open()?;
        let topic = self
            .pubs
            .get(publication.0)
            .ok_or(BusError::UnknownPublication)?;
        let mut core = self.lock();
        let entry = core
            .topics
            .get_mut(topic)
            .ok_or(BusError::UnknownPublication)?;
        entry.payload = Some(payload.to_string());
        entry.version += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut core = self.lock();
        if !core.feds[self.index].entered {
            // Never reached the execution barrier; shrink the quorum so the
            // remaining participants are not stranded.
            core.quorum = core.quorum.saturating_sub(1);
        }
        core.feds[self.index].executing = false;
        core.feds[self.index].pending = None;
        for topic in &self.pubs {
            if let Some(entry) = core.topics.get_mut(topic) {
                entry.owner = None;
            }
        }
        let name = core.feds[self.index].name.clone();
        core.try_grant();
        self.shared.cv.notify_all();
        debug!("loopback: \"{name}\" disconnected");
        Ok(())
    }
}

impl Drop for LoopbackHandle {
    fn drop(&mut self) {
        // A handle abandoned without disconnect would strand the quorum.
        let _ = self.disconnect();
    }
}
