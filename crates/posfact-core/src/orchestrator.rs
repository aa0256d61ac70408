use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::runner::{FactTaskRunner, TaskResult};
use crate::transform::{all_transforms, FactTransform};

/// A registered fact table: its name, transform and ledger location.
#[derive(Clone)]
pub struct FactTask {
    pub fact_name: String,
    pub transform: Arc<dyn FactTransform>,
    pub ledger_key: String,
}

impl std::fmt::Debug for FactTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactTask")
            .field("fact_name", &self.fact_name)
            .field("transform", &self.transform.code_identifier())
            .field("ledger_key", &self.ledger_key)
            .finish()
    }
}

impl FactTask {
    pub fn new(
        fact_name: impl Into<String>,
        transform: Arc<dyn FactTransform>,
        ledger_key: impl Into<String>,
    ) -> Self {
        Self {
            fact_name: fact_name.into(),
            transform,
            ledger_key: ledger_key.into(),
        }
    }
}

pub fn ledger_key_for(fact_name: &str) -> String {
    format!("logs/processed_{fact_name}_log.csv")
}

/// Every built-in fact, in registration order.
pub fn default_fact_tasks() -> Vec<FactTask> {
    all_transforms()
        .iter()
        .map(|transform| {
            let fact_name = transform.schema().fact_name;
            FactTask::new(fact_name, Arc::new(*transform), ledger_key_for(fact_name))
        })
        .collect()
}

/// Keeps the tasks named in `filter`, in filter order. `None` keeps all.
pub fn select_tasks(tasks: Vec<FactTask>, filter: Option<&[String]>) -> Vec<FactTask> {
    let Some(filter) = filter else {
        return tasks;
    };
    filter
        .iter()
        .filter_map(|name| tasks.iter().find(|task| &task.fact_name == name).cloned())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded_tasks: usize,
    pub failed_tasks: usize,
    pub tasks: Vec<TaskResult>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed_tasks == 0
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    runner: FactTaskRunner,
    tasks: Vec<FactTask>,
}

impl Orchestrator {
    pub fn new(runner: FactTaskRunner, tasks: Vec<FactTask>) -> Self {
        Self { runner, tasks }
    }

    pub fn tasks(&self) -> &[FactTask] {
        &self.tasks
    }

    /// Runs every task in order. A failing task never stops the ones after it.
    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        for task in &self.tasks {
            let result = self
                .runner
                .run(&task.fact_name, task.transform.as_ref(), &task.ledger_key)
                .await;
            if result.succeeded {
                summary.succeeded_tasks += 1;
            } else {
                summary.failed_tasks += 1;
            }
            summary.tasks.push(result);
        }

        info!(
            succeeded_tasks = summary.succeeded_tasks,
            failed_tasks = summary.failed_tasks,
            "{} succeeded, {} failed",
            summary.succeeded_tasks,
            summary.failed_tasks
        );
        summary
    }
}
