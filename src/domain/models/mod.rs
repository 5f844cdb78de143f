pub mod bottleneck;
pub mod config;
pub mod metrics;
pub mod queue;
pub mod result;
pub mod task;
pub mod workflow_plan;

pub use bottleneck::{sort_reports, BottleneckReport, BottleneckSeverity};
pub use config::{
    BottleneckThresholds, BusConfig, Config, DatabaseConfig, LoggingConfig, MonitorConfig,
    OrchestratorConfig, QueueThreshold,
};
pub use metrics::{AgentMetrics, SampleWindow, DEFAULT_SAMPLE_WINDOW};
pub use queue::{QueueKey, TopicQueue};
pub use result::{ResultStatus, TaskResult};
pub use task::{
    agent_type_of, topic_for, validate_agent_type, Task, TaskPriority, DEFAULT_TASK_TIMEOUT_SECS,
    TOPIC_PREFIX,
};
pub use workflow_plan::{
    DurationEstimates, ExecutionBatch, PlannedTask, WorkflowPlan, WorkflowReceipt, WorkflowTaskDef,
};
