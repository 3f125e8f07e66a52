mod math;
mod similarity;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tracing::{instrument, Span};

pub use rerank_eval_backend_core::Backend as CoreBackend;
pub use rerank_eval_backend_core::{BackendError, ScoreBatch, Scores};
pub use similarity::SimilarityBackend;

/// Handle to a pool of scoring replicas.
///
/// Each replica owns an independent model instance and runs on its own
/// blocking worker thread. Replicas pull work from a shared channel, so
/// several batches may be in flight at once; callers collect responses
/// through per-command oneshot channels and results do not depend on which
/// replica served which batch.
#[derive(Debug, Clone)]
pub struct Backend {
    /// Channel shared by all replica worker threads
    backend_sender: async_channel::Sender<BackendCommand>,
    /// Health status
    health_receiver: watch::Receiver<bool>,
    _backend_threads: Arc<BackendThreads>,
    pub max_batch_size: Option<usize>,
}

impl Backend {
    pub fn new(replicas: Vec<Box<dyn CoreBackend + Send>>) -> Result<Self, BackendError> {
        if replicas.is_empty() {
            return Err(BackendError::NoBackend);
        }

        // The pool honors the most restrictive replica
        let max_batch_size = replicas.iter().filter_map(|r| r.max_batch_size()).min();

        tracing::info!("Starting {} scoring replica(s)", replicas.len());

        let (backend_sender, backend_receiver) = async_channel::bounded(replicas.len() * 2);
        let (health_sender, health_receiver) = watch::channel(false);
        let health_sender = Arc::new(health_sender);

        let handles = replicas
            .into_iter()
            .map(|replica| {
                let receiver = backend_receiver.clone();
                let health = health_sender.clone();
                std::thread::spawn(move || replica_worker(replica, receiver, health))
            })
            .collect();

        Ok(Self {
            backend_sender,
            health_receiver,
            _backend_threads: Arc::new(BackendThreads(handles)),
            max_batch_size,
        })
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<(), BackendError> {
        let (sender, receiver) = oneshot::channel();
        self.backend_sender
            .send(BackendCommand::Health(Span::current(), sender))
            .await
            .expect("No backend receiver. This is a bug.");
        receiver.await.expect(
            "Backend worker thread dropped the sender without sending a response. This is a bug.",
        )
    }

    #[instrument(skip(self))]
    pub fn health_watcher(&self) -> watch::Receiver<bool> {
        self.health_receiver.clone()
    }

    /// Queue a batch without waiting for its result.
    ///
    /// The returned channel resolves once a replica has scored the batch.
    /// Submitting several batches before awaiting any of them keeps all
    /// replicas busy.
    #[instrument(skip_all)]
    pub async fn submit(&self, batch: ScoreBatch) -> ScoreReceiver {
        let (sender, receiver) = oneshot::channel();
        self.backend_sender
            .send(BackendCommand::Score(batch, Span::current(), sender))
            .await
            .expect("No backend receiver. This is a bug.");
        receiver
    }

    #[instrument(skip_all)]
    pub async fn score(&self, batch: ScoreBatch) -> Result<(Scores, Duration), BackendError> {
        self.submit(batch).await.await.expect(
            "Backend worker thread dropped the sender without sending a response. This is a bug.",
        )
    }
}

pub type ScoreReceiver = oneshot::Receiver<Result<(Scores, Duration), BackendError>>;

fn replica_worker(
    backend: Box<dyn CoreBackend + Send>,
    receiver: async_channel::Receiver<BackendCommand>,
    health_sender: Arc<watch::Sender<bool>>,
) {
    while let Ok(cmd) = receiver.recv_blocking() {
        let start = Instant::now();
        let mut healthy = false;
        match cmd {
            BackendCommand::Health(span, sender) => {
                let _span = span.entered();
                let _ = sender.send(backend.health().map(|_| healthy = true));
            }
            BackendCommand::Score(batch, span, sender) => {
                let _span = span.entered();
                let _ = sender.send(backend.score(batch).map(|s| {
                    healthy = true;
                    (s, start.elapsed())
                }));
            }
        };
        let _ = health_sender.send(healthy);
    }
}

#[derive(Debug)]
struct BackendThreads(Vec<JoinHandle<()>>);

impl Drop for BackendThreads {
    fn drop(&mut self) {
        for handle in self.0.drain(..) {
            handle.join().unwrap();
        }
    }
}

enum BackendCommand {
    Health(Span, oneshot::Sender<Result<(), BackendError>>),
    Score(
        ScoreBatch,
        Span,
        oneshot::Sender<Result<(Scores, Duration), BackendError>>,
    ),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_batch(queries: Vec<Vec<f32>>, candidates: Vec<Vec<Vec<f32>>>) -> ScoreBatch {
        let dim = queries[0].len();
        let mut cumulative = vec![0u32];
        let mut candidate_features = Vec::new();
        for set in &candidates {
            for row in set {
                candidate_features.extend_from_slice(row);
            }
            cumulative.push(cumulative.last().unwrap() + set.len() as u32);
        }
        ScoreBatch {
            query_features: queries.into_iter().flatten().collect(),
            candidate_features,
            cumulative_candidates: cumulative,
            dim,
        }
    }

    #[tokio::test]
    async fn test_replica_pool_scores_batches() {
        let replicas: Vec<Box<dyn CoreBackend + Send>> = vec![
            Box::new(SimilarityBackend::new()),
            Box::new(SimilarityBackend::new()),
        ];
        let backend = Backend::new(replicas).unwrap();

        let batch = unit_batch(
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                vec![vec![0.0, 2.0]],
            ],
        );

        let (scores, _) = backend.score(batch).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[&0].len(), 2);
        assert!((scores[&0][0] - 1.0).abs() < 1e-5);
        assert!(scores[&0][1].abs() < 1e-5);
        assert_eq!(scores[&1].len(), 1);
        assert!((scores[&1][0] - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_replica_set_is_rejected() {
        assert!(matches!(
            Backend::new(vec![]),
            Err(BackendError::NoBackend)
        ));
    }

    #[tokio::test]
    async fn test_health() {
        let backend =
            Backend::new(vec![Box::new(SimilarityBackend::new()) as _]).unwrap();
        let mut watcher = backend.health_watcher();
        backend.health().await.unwrap();
        watcher.wait_for(|healthy| *healthy).await.unwrap();
    }
}
