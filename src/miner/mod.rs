//! Background mining worker.
//!
//! All appends are funnelled through a single dedicated thread, which makes
//! it the only writer of the shared chain. Mining itself runs without any
//! lock held; the write lock is taken only to commit the sealed block, so
//! readers are never blocked for the duration of a Proof-of-Work search.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Instant;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use uuid::Uuid;

use crate::blockchain::{Block, BlockRecord, Blockchain};
use crate::error::MinerError;

/// Progress of a submitted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Mined { index: usize, block: BlockRecord },
}

/// Pending handle returned by [`MiningService::submit`].
#[derive(Debug)]
pub struct MiningTicket {
    pub job_id: String,
    pub sealed: oneshot::Receiver<BlockRecord>,
}

struct MiningJob {
    id: String,
    payload: String,
    reply: oneshot::Sender<BlockRecord>,
}

/// Finished jobs remembered for status lookups; older ones are forgotten.
pub const JOB_RETENTION: usize = 1024;

/// Job statuses. Pending jobs are always kept; only the most recent
/// `keep` finished jobs are.
struct JobBook {
    statuses: HashMap<String, JobStatus>,
    finished: VecDeque<String>,
    keep: usize,
}

impl JobBook {
    fn new(keep: usize) -> Self {
        Self {
            statuses: HashMap::new(),
            finished: VecDeque::new(),
            keep: keep.max(1),
        }
    }

    fn pending(&mut self, id: &str) {
        self.statuses.insert(id.to_string(), JobStatus::Pending);
    }

    fn finish(&mut self, id: &str, status: JobStatus) {
        self.statuses.insert(id.to_string(), status);
        self.finished.push_back(id.to_string());
        while self.finished.len() > self.keep {
            if let Some(oldest) = self.finished.pop_front() {
                self.statuses.remove(&oldest);
            }
        }
    }

    fn forget(&mut self, id: &str) {
        self.statuses.remove(id);
    }

    fn get(&self, id: &str) -> Option<JobStatus> {
        self.statuses.get(id).cloned()
    }
}

type JobTable = Arc<Mutex<JobBook>>;

/// Cloneable front end to the mining worker.
#[derive(Clone)]
pub struct MiningService {
    queue: mpsc::Sender<MiningJob>,
    jobs: JobTable,
}

impl MiningService {
    /// Start the worker thread. Every sealed block is also pushed to
    /// `announce`, if given, so that it can be broadcast to peers.
    pub fn spawn(
        chain: Arc<RwLock<Blockchain>>,
        announce: Option<UnboundedSender<BlockRecord>>,
    ) -> Self {
        Self::with_retention(chain, announce, JOB_RETENTION)
    }

    /// Like [`MiningService::spawn`], remembering at most `keep` finished jobs.
    pub fn with_retention(
        chain: Arc<RwLock<Blockchain>>,
        announce: Option<UnboundedSender<BlockRecord>>,
        keep: usize,
    ) -> Self {
        let (queue, inbox) = mpsc::channel::<MiningJob>();
        let jobs: JobTable = Arc::new(Mutex::new(JobBook::new(keep)));
        let worker_jobs = jobs.clone();

        thread::Builder::new()
            .name("miner".into())
            .spawn(move || run_worker(chain, inbox, worker_jobs, announce))
            .expect("failed to spawn mining thread");

        Self { queue, jobs }
    }

    /// Queue `payload` for mining and return immediately.
    pub fn submit(&self, payload: impl Into<String>) -> Result<MiningTicket, MinerError> {
        let job_id = Uuid::new_v4().to_string();
        let (reply, sealed) = oneshot::channel();

        self.jobs.lock().expect("mutex poisoned").pending(&job_id);

        let job = MiningJob {
            id: job_id.clone(),
            payload: payload.into(),
            reply,
        };
        if self.queue.send(job).is_err() {
            self.jobs.lock().expect("mutex poisoned").forget(&job_id);
            return Err(MinerError::WorkerStopped);
        }

        debug!("MINER - queued job {job_id}");
        Ok(MiningTicket { job_id, sealed })
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.lock().expect("mutex poisoned").get(job_id)
    }
}

fn run_worker(
    chain: Arc<RwLock<Blockchain>>,
    inbox: mpsc::Receiver<MiningJob>,
    jobs: JobTable,
    announce: Option<UnboundedSender<BlockRecord>>,
) {
    // Exits once every MiningService handle has been dropped
    for job in inbox {
        let t0 = Instant::now();
        let MiningJob { id, payload, reply } = job;

        let block = mine_on_tip(&chain, &id, payload);
        let Some((index, record)) = settle(&chain, &jobs, &id, block, reply) else {
            continue;
        };

        info!(
            "MINER - sealed block #{} (digest={}, nonce={}, {} ms)",
            index,
            record.digest,
            record.nonce,
            t0.elapsed().as_millis()
        );

        if let Some(tx) = &announce {
            if tx.send(record).is_err() {
                warn!("MINER - broadcast channel closed; block #{index} not announced");
            }
        }
    }
    debug!("MINER - queue closed, worker exiting");
}

/// Build a candidate on the current tip and mine it with no lock held.
fn mine_on_tip(chain: &RwLock<Blockchain>, job_id: &str, payload: String) -> Block {
    let (mut block, difficulty) = {
        let bc = chain.read().expect("rwlock poisoned");
        (bc.next_candidate(payload), bc.difficulty())
    };
    debug!("MINER - job {job_id} mining at difficulty {difficulty}");
    block.mine(difficulty);
    block
}

/// Commit a mined block and resolve its job. A block the chain rejects
/// drops the job: its ticket resolves as closed and its status is removed.
fn settle(
    chain: &RwLock<Blockchain>,
    jobs: &Mutex<JobBook>,
    job_id: &str,
    block: Block,
    reply: oneshot::Sender<BlockRecord>,
) -> Option<(usize, BlockRecord)> {
    let (index, record) = {
        let mut bc = chain.write().expect("rwlock poisoned");
        match bc.commit(block) {
            Ok(sealed) => {
                let record = sealed.to_record();
                (bc.len() - 1, record)
            }
            Err(e) => {
                // Only reachable if something other than this worker wrote to the chain
                error!("MINER - job {job_id} rejected at commit: {e}");
                jobs.lock().expect("mutex poisoned").forget(job_id);
                return None;
            }
        }
    };

    jobs.lock().expect("mutex poisoned").finish(
        job_id,
        JobStatus::Mined {
            index,
            block: record.clone(),
        },
    );

    // Submitter may have stopped waiting; the job table still has the result
    let _ = reply.send(record.clone());
    Some((index, record))
}

#[cfg(test)]
mod tests {
    use super::{JobBook, JobStatus, MiningService, mine_on_tip, settle};
    use crate::blockchain::Blockchain;
    use std::sync::{Arc, Mutex, RwLock};
    use tokio::sync::{mpsc, oneshot};

    #[tokio::test]
    async fn submitted_payload_is_mined_and_committed() {
        let chain = Arc::new(RwLock::new(Blockchain::new(1)));
        let miner = MiningService::spawn(chain.clone(), None);

        let ticket = miner.submit("hello").unwrap();
        let record = ticket.sealed.await.unwrap();

        assert_eq!(record.payload, "hello");
        assert!(record.digest.starts_with('0'));

        let bc = chain.read().unwrap();
        assert_eq!(bc.len(), 2);
        assert_eq!(bc.last_block().digest(), record.digest);
        assert!(bc.is_valid());
        drop(bc);

        match miner.status(&ticket.job_id) {
            Some(JobStatus::Mined { index, block }) => {
                assert_eq!(index, 1);
                assert_eq!(block, record);
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn jobs_are_applied_in_submission_order() {
        let chain = Arc::new(RwLock::new(Blockchain::new(1)));
        let miner = MiningService::spawn(chain.clone(), None);

        let a = miner.submit("A").unwrap();
        let b = miner.submit("B").unwrap();
        let c = miner.submit("C").unwrap();
        c.sealed.await.unwrap();
        a.sealed.await.unwrap();
        b.sealed.await.unwrap();

        let bc = chain.read().unwrap();
        let payloads: Vec<_> = bc.blocks().iter().map(|b| b.payload()).collect();
        assert_eq!(payloads, vec!["Genesis Block", "A", "B", "C"]);
        assert!(bc.is_valid());
    }

    #[tokio::test]
    async fn sealed_blocks_are_announced() {
        let chain = Arc::new(RwLock::new(Blockchain::new(0)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let miner = MiningService::spawn(chain, Some(tx));

        let ticket = miner.submit("news").unwrap();
        let sealed = ticket.sealed.await.unwrap();
        let announced = rx.recv().await.unwrap();
        assert_eq!(announced, sealed);
    }

    #[test]
    fn unknown_job_has_no_status() {
        let miner = MiningService::spawn(Arc::new(RwLock::new(Blockchain::new(0))), None);
        assert_eq!(miner.status("nope"), None);
    }

    #[tokio::test]
    async fn only_recent_finished_jobs_are_remembered() {
        let chain = Arc::new(RwLock::new(Blockchain::new(0)));
        let miner = MiningService::with_retention(chain, None, 2);

        let first = miner.submit("first").unwrap();
        let second = miner.submit("second").unwrap();
        let third = miner.submit("third").unwrap();
        let (first_id, second_id, third_id) =
            (first.job_id.clone(), second.job_id.clone(), third.job_id.clone());
        first.sealed.await.unwrap();
        second.sealed.await.unwrap();
        third.sealed.await.unwrap();

        assert_eq!(miner.status(&first_id), None);
        assert!(matches!(miner.status(&second_id), Some(JobStatus::Mined { index: 2, .. })));
        assert!(matches!(miner.status(&third_id), Some(JobStatus::Mined { index: 3, .. })));
    }

    #[test]
    fn pending_jobs_survive_eviction() {
        let mut book = JobBook::new(1);
        book.pending("waiting");
        book.finish("a", JobStatus::Pending);
        book.finish("b", JobStatus::Pending);
        assert_eq!(book.get("waiting"), Some(JobStatus::Pending));
        assert_eq!(book.get("a"), None);
        assert!(book.get("b").is_some());
    }

    #[tokio::test]
    async fn block_rejected_at_commit_drops_the_job() {
        let chain = RwLock::new(Blockchain::new(0));
        let jobs = Mutex::new(JobBook::new(8));
        jobs.lock().unwrap().pending("late");
        let (reply, sealed) = oneshot::channel();

        let block = mine_on_tip(&chain, "late", "late".to_string());
        // Another writer moves the tip while the block is being mined
        chain.write().unwrap().append("sneaked in");

        assert_eq!(settle(&chain, &jobs, "late", block, reply), None);
        assert!(sealed.await.is_err());
        assert_eq!(jobs.lock().unwrap().get("late"), None);

        let bc = chain.read().unwrap();
        assert_eq!(bc.len(), 2);
        assert_eq!(bc.last_block().payload(), "sneaked in");
        assert!(bc.is_valid());
    }

    #[tokio::test]
    async fn settled_block_resolves_ticket_and_status() {
        let chain = RwLock::new(Blockchain::new(1));
        let jobs = Mutex::new(JobBook::new(8));
        jobs.lock().unwrap().pending("job");
        let (reply, sealed) = oneshot::channel();

        let block = mine_on_tip(&chain, "job", "payload".to_string());
        let (index, record) = settle(&chain, &jobs, "job", block, reply).unwrap();

        assert_eq!(index, 1);
        assert_eq!(sealed.await.unwrap(), record);
        assert_eq!(
            jobs.lock().unwrap().get("job"),
            Some(JobStatus::Mined { index: 1, block: record })
        );
    }
}
