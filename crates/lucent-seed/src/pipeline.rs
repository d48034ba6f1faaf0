//! Sequential step orchestrator
//!
//! A [`Pipeline`] owns an ordered list of named async steps and threads one
//! value through them. The first failing step stops the run; nothing is
//! retried here.
//!
//! Progress lines are logged under [`TARGET`] and recorded directly into the
//! injected [`LogSink`], so a sink layer on the global subscriber should
//! exclude that target.

use futures::future::BoxFuture;
use lucent_common::{LogEntry, LogSink};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Tracing target of every orchestrator log line
pub const TARGET: &str = "lucent_seed::pipeline";

type StepAction<T> = Box<dyn FnOnce(T) -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// A named unit of work
pub struct PipelineStep<T> {
    name: String,
    action: StepAction<T>,
}

impl<T> PipelineStep<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct Pipeline<T> {
    name: String,
    run_id: Uuid,
    steps: Vec<PipelineStep<T>>,
    sink: Option<Arc<dyn LogSink>>,
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_id: Uuid::new_v4(),
            steps: Vec::new(),
            sink: None,
        }
    }

    /// Also record progress lines into `sink`
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Identifier of this run, used to tag persisted log lines
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn steps(&self) -> &[PipelineStep<T>] {
        &self.steps
    }

    /// Append a step; steps run in the order they are added
    pub fn add_step<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.steps.push(PipelineStep {
            name: name.into(),
            action: Box::new(move |input| Box::pin(action(input))),
        });
        self
    }

    /// Run every step in order, feeding each the previous step's output
    ///
    /// Returns the last step's output, or the first error unchanged. The
    /// failing step's name goes to the log and the sink.
    pub async fn run(self, initial: T) -> anyhow::Result<T> {
        let Pipeline {
            name,
            run_id,
            steps,
            sink,
        } = self;
        let log = RunLog { sink, pipeline: &name };

        let start = Instant::now();
        let total = steps.len();
        info!(target: TARGET, pipeline = %name, run_id = %run_id, steps = total, "Starting pipeline");
        log.record("INFO", format!("Starting pipeline '{}' with {} steps", name, total));

        let mut value = initial;
        for (index, step) in steps.into_iter().enumerate() {
            let position = index + 1;
            info!(target: TARGET, pipeline = %name, step = %step.name, position, total, "Starting step");
            log.record("INFO", format!("Starting step {}/{}: {}", position, total, step.name));

            let step_start = Instant::now();
            match (step.action)(value).await {
                Ok(output) => {
                    let elapsed = step_start.elapsed().as_secs_f64();
                    info!(
                        target: TARGET,
                        pipeline = %name,
                        step = %step.name,
                        duration_secs = elapsed,
                        "Completed step"
                    );
                    log.record("INFO", format!("Completed step '{}' in {:.2}s", step.name, elapsed));
                    value = output;
                },
                Err(e) => {
                    let cause = format!("{:#}", e);
                    error!(target: TARGET, pipeline = %name, step = %step.name, error = %cause, "Step failed");
                    log.record("ERROR", format!("Step '{}' failed: {}", step.name, cause));
                    return Err(e);
                },
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            target: TARGET,
            pipeline = %name,
            run_id = %run_id,
            steps = total,
            duration_secs = elapsed,
            "Pipeline completed"
        );
        log.record(
            "INFO",
            format!("Pipeline '{}' completed {} steps in {:.2}s", name, total, elapsed),
        );

        Ok(value)
    }
}

struct RunLog<'a> {
    sink: Option<Arc<dyn LogSink>>,
    pipeline: &'a str,
}

impl RunLog<'_> {
    fn record(&self, level: &str, message: String) {
        if let Some(sink) = &self.sink {
            sink.record(LogEntry::new(level, message).with_file_name(self.pipeline));
        }
    }
}
