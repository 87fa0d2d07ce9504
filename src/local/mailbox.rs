//! Message matching between the threads of a local universe

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::local::Aborted;
use crate::{Rank, Tag};

/// Identifies a message queue: messages with equal envelopes are matched in order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Envelope {
    /// 0 for the world, a fresh value for each graph communicator
    pub context: u64,
    pub source: Rank,
    pub destination: Rank,
    pub tag: Tag,
}

#[derive(Default)]
struct State {
    queues: HashMap<Envelope, VecDeque<Vec<u8>>>,
    sent: u64,
    finished: HashSet<Rank>,
    poisoned: bool,
    aborted: Option<Aborted>,
}

#[derive(Default)]
pub(crate) struct Mailbox {
    state: Mutex<State>,
    arrived: Condvar,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deposits a message; sends never block.
    pub(crate) fn post(&self, envelope: Envelope, payload: Vec<u8>) -> Result<()> {
        let mut state = self.lock();
        if state.poisoned {
            return Err(Error::Aborted);
        }
        state.queues.entry(envelope).or_default().push_back(payload);
        state.sent += 1;
        drop(state);
        self.arrived.notify_all();
        Ok(())
    }

    /// Waits for the oldest message with `envelope`.
    ///
    /// Fails once nothing can arrive anymore: the universe is poisoned or the source finished
    /// without sending.
    pub(crate) fn take(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let mut state = self.lock();
        loop {
            if let Some(payload) = state
                .queues
                .get_mut(envelope)
                .and_then(VecDeque::pop_front)
            {
                return Ok(payload);
            }
            if state.poisoned || state.finished.contains(&envelope.source) {
                return Err(Error::Aborted);
            }
            state = self
                .arrived
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// `rank` will not send any more messages.
    pub(crate) fn finish(&self, rank: Rank) {
        self.lock().finished.insert(rank);
        self.arrived.notify_all();
    }

    /// Wakes up every waiting receiver and fails all further communication.
    pub(crate) fn poison(&self) {
        self.lock().poisoned = true;
        self.arrived.notify_all();
    }

    /// Records the first abort of the universe and poisons it.
    pub(crate) fn abort(&self, rank: Rank, message: String) {
        {
            let mut state = self.lock();
            if state.aborted.is_none() {
                let messages_sent = state.sent;
                state.aborted = Some(Aborted {
                    rank,
                    message,
                    messages_sent,
                });
            }
        }
        self.poison();
    }

    pub(crate) fn aborted(&self) -> Option<Aborted> {
        self.lock().aborted.clone()
    }

    pub(crate) fn messages_sent(&self) -> u64 {
        self.lock().sent
    }
}
