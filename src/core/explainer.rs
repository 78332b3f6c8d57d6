//! Asynchronous local explanation protocol.
//!
//! Every explainer hands back an [`ExplanationHandle`] immediately and runs
//! its search on a dedicated Tokio task. Partial results flow through an
//! [`IntermediateSink`] from inside that task, so deliveries for one run are
//! totally ordered and always precede the handle's resolution.

use crate::domain::{Prediction, PredictionInput, PredictionOutput, PredictionProvider};
use crate::utils::error::{ExplainError, Result};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Receives partial explanations while a run is in progress.
pub type IntermediateSink<T> = Box<dyn FnMut(T) + Send + 'static>;

/// A sink that drops every intermediate result.
pub fn discard<T>() -> IntermediateSink<T> {
    Box::new(|_| {})
}

/// A local, model-agnostic explanation algorithm.
///
/// Both methods must be called from within a Tokio runtime; they never
/// block and return a pending handle.
pub trait LocalExplainer: Send + Sync {
    type Explanation: Send + 'static;

    fn explain_async(
        &self,
        prediction: &Prediction,
        model: Arc<dyn PredictionProvider>,
    ) -> ExplanationHandle<Self::Explanation> {
        self.explain_async_with(prediction, model, discard())
    }

    fn explain_async_with(
        &self,
        prediction: &Prediction,
        model: Arc<dyn PredictionProvider>,
        sink: IntermediateSink<Self::Explanation>,
    ) -> ExplanationHandle<Self::Explanation>;
}

enum HandleState<T> {
    Running(JoinHandle<Result<T>>),
    Ready(Option<Result<T>>),
}

/// Pending result of one explanation run.
///
/// Resolves exactly once. A handle cancelled before it resolves always
/// yields [`ExplainError::Cancelled`], even if the run had already produced
/// a value.
pub struct ExplanationHandle<T> {
    run_id: Uuid,
    token: CancellationToken,
    state: HandleState<T>,
}

// The handle never pins its contents in place.
impl<T> Unpin for ExplanationHandle<T> {}

impl<T> ExplanationHandle<T> {
    /// A handle that fails without running, used for encoding-time rejections.
    pub fn failed(error: ExplainError) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            token: CancellationToken::new(),
            state: HandleState::Ready(Some(Err(error))),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cancellation. The run stops at its next iteration boundary or
    /// model call and delivers nothing further.
    pub fn cancel(&self) {
        tracing::debug!(run_id = %self.run_id, "cancellation requested");
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Running(join) => join.is_finished(),
            HandleState::Ready(_) => true,
        }
    }

    /// Await the result, cancelling the run if it does not finish within `deadline`.
    pub async fn wait_timeout(mut self, deadline: Duration) -> Result<T> {
        match tokio::time::timeout(deadline, &mut self).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    run_id = %self.run_id,
                    timeout_ms = deadline.as_millis() as u64,
                    "explanation run timed out, cancelling"
                );
                self.cancel();
                (&mut self).await
            }
        }
    }
}

impl<T> Future for ExplanationHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = match &mut this.state {
            HandleState::Running(join) => match Pin::new(join).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(result)) => result,
                Poll::Ready(Err(join_error)) if join_error.is_cancelled() => {
                    Err(ExplainError::Cancelled)
                }
                Poll::Ready(Err(join_error)) => Err(ExplainError::internal(format!(
                    "explanation task panicked: {}",
                    join_error
                ))),
            },
            HandleState::Ready(slot) => slot.take().unwrap_or_else(|| {
                Err(ExplainError::internal(
                    "explanation handle polled after completion",
                ))
            }),
        };
        this.state = HandleState::Ready(None);

        if this.token.is_cancelled() {
            return Poll::Ready(Err(ExplainError::Cancelled));
        }
        Poll::Ready(result)
    }
}

impl<T> Drop for ExplanationHandle<T> {
    fn drop(&mut self) {
        // 放棄等待的結果，不讓背景任務繼續消耗模型呼叫
        if let HandleState::Running(join) = &self.state {
            if !join.is_finished() {
                self.token.cancel();
            }
        }
    }
}

/// Per-run state handed to an explainer's search loop.
pub struct RunContext<T> {
    run_id: Uuid,
    model: Arc<dyn PredictionProvider>,
    token: CancellationToken,
    sink: IntermediateSink<T>,
    delivered: usize,
}

impl<T> RunContext<T> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of intermediate results delivered so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Iteration boundary: fails with `Cancelled` once the handle is cancelled.
    pub fn checkpoint(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(ExplainError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Score a batch on the model.
    ///
    /// The returned future does not borrow the context, so a run can keep
    /// mutating its own state while a batch is in flight.
    pub fn score(
        &self,
        inputs: Vec<PredictionInput>,
    ) -> impl Future<Output = Result<Vec<PredictionOutput>>> + Send + 'static {
        let model = Arc::clone(&self.model);
        let token = self.token.clone();
        let run_id = self.run_id;

        async move {
            if token.is_cancelled() {
                return Err(ExplainError::Cancelled);
            }
            let expected = inputs.len();
            let outputs = model.predict(inputs).await.map_err(|err| match err {
                ExplainError::ModelFailure { .. }
                | ExplainError::MalformedModelOutput { .. }
                | ExplainError::Cancelled => err,
                other => ExplainError::model(other.to_string()),
            });
            let outputs = match outputs {
                Ok(outputs) => outputs,
                Err(err) => {
                    tracing::error!(%run_id, error = %err, "model scoring failed");
                    return Err(err);
                }
            };
            if outputs.len() != expected {
                tracing::error!(
                    %run_id,
                    expected,
                    actual = outputs.len(),
                    "model returned a malformed batch"
                );
                return Err(ExplainError::MalformedModelOutput {
                    expected,
                    actual: outputs.len(),
                });
            }
            if token.is_cancelled() {
                return Err(ExplainError::Cancelled);
            }
            Ok(outputs)
        }
    }

    /// Deliver a partial explanation. Skipped once cancelled; a panicking
    /// sink is logged and the run continues.
    pub fn report(&mut self, explanation: T) {
        if self.token.is_cancelled() {
            return;
        }
        let sink = &mut self.sink;
        match catch_unwind(AssertUnwindSafe(|| sink(explanation))) {
            Ok(()) => {
                self.delivered += 1;
                tracing::debug!(
                    run_id = %self.run_id,
                    delivered = self.delivered,
                    "intermediate result delivered"
                );
            }
            Err(_) => {
                tracing::warn!(run_id = %self.run_id, "intermediate sink panicked, ignoring");
            }
        }
    }
}

/// Spawn one explanation run on the Tokio runtime.
///
/// `run` builds the search future from its [`RunContext`]. Cancellation
/// races that future, so a run blocked on a model call is dropped as soon
/// as the handle is cancelled.
pub fn spawn_run<T, F, Fut>(
    model: Arc<dyn PredictionProvider>,
    sink: IntermediateSink<T>,
    run: F,
) -> ExplanationHandle<T>
where
    T: Send + 'static,
    F: FnOnce(RunContext<T>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let run_id = Uuid::new_v4();
    let token = CancellationToken::new();
    let search = run(RunContext {
        run_id,
        model,
        token: token.clone(),
        sink,
        delivered: 0,
    });

    let task_token = token.clone();
    let join = tokio::spawn(async move {
        tracing::debug!(%run_id, "explanation run started");
        let result = tokio::select! {
            biased;
            _ = task_token.cancelled() => Err(ExplainError::Cancelled),
            result = search => {
                if task_token.is_cancelled() {
                    Err(ExplainError::Cancelled)
                } else {
                    result
                }
            }
        };
        match &result {
            Ok(_) => tracing::info!(%run_id, "explanation run finished"),
            Err(err) if err.is_cancelled() => tracing::info!(%run_id, "explanation run cancelled"),
            Err(err) => tracing::warn!(%run_id, error = %err, "explanation run failed"),
        }
        result
    });

    ExplanationHandle {
        run_id,
        token,
        state: HandleState::Running(join),
    }
}
