//! Plan and step models driving the plan-act flow

use serde::{Deserialize, Serialize};

/// Execution state shared by plans and steps
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// One unit of work inside a plan
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Step {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A plan produced by the planner agent
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Plan {
    pub title: String,
    pub goal: String,
    /// Planner's response to the user, surfaced as an assistant message
    #[serde(default)]
    pub message: String,
    /// Working language for every natural-language output of the task
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub status: ExecutionStatus,
}

impl Plan {
    /// Next step awaiting execution, in declaration order
    pub fn next_step(&mut self) -> Option<&mut Step> {
        self.steps
            .iter_mut()
            .find(|step| step.status == ExecutionStatus::Pending)
    }

    /// Replace the uncompleted tail with re-planned steps, keeping completed
    /// steps untouched.
    pub fn merge_updated_steps(&mut self, updated: Vec<Step>) {
        let keep = self
            .steps
            .iter()
            .take_while(|step| {
                matches!(
                    step.status,
                    ExecutionStatus::Completed | ExecutionStatus::Failed
                )
            })
            .count();
        self.steps.truncate(keep);
        self.steps.extend(updated.into_iter().map(|mut step| {
            step.status = ExecutionStatus::Pending;
            step
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, status: ExecutionStatus) -> Step {
        Step {
            id: id.to_string(),
            description: format!("step {id}"),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_next_step_skips_finished() {
        let mut plan = Plan {
            steps: vec![
                step("1", ExecutionStatus::Completed),
                step("2", ExecutionStatus::Pending),
                step("3", ExecutionStatus::Pending),
            ],
            ..Default::default()
        };
        assert_eq!(plan.next_step().unwrap().id, "2");
    }

    #[test]
    fn test_merge_preserves_completed_prefix() {
        let mut plan = Plan {
            steps: vec![
                step("1", ExecutionStatus::Completed),
                step("2", ExecutionStatus::Pending),
                step("3", ExecutionStatus::Pending),
            ],
            ..Default::default()
        };
        plan.merge_updated_steps(vec![step("2", ExecutionStatus::Pending)]);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].id, "1");
        assert_eq!(plan.steps[0].status, ExecutionStatus::Completed);
        assert_eq!(plan.steps[1].id, "2");
    }

    #[test]
    fn test_merge_with_empty_update_drops_tail() {
        let mut plan = Plan {
            steps: vec![
                step("1", ExecutionStatus::Completed),
                step("2", ExecutionStatus::Pending),
            ],
            ..Default::default()
        };
        plan.merge_updated_steps(vec![]);
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.next_step().is_none());
    }
}
