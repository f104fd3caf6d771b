//! In-memory simulated control plane.
//!
//! Backs `create --noop` runs and the engine's tests. Mutations enter an
//! in-progress status and settle after a fixed number of status polls, the
//! way a real control plane finishes asynchronously.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::connector::StackConnector;
use crate::error::ConnectorError;
use crate::remote::{KeyValue, RemoteStack, StackEvent, status};

const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

/// One recorded call against the simulated control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorCall {
    DescribeStack(String),
    DescribeEvents(String),
    Create {
        stack: String,
        parameters: Vec<(String, String)>,
    },
    Delete(String),
    Validate,
    DescribeResource {
        stack: String,
        logical_id: String,
    },
}

#[derive(Debug)]
struct Transition {
    target: &'static str,
    polls_left: u32,
}

#[derive(Debug)]
struct SimulatedStack {
    status: String,
    outputs: Vec<KeyValue>,
    parameters: Vec<KeyValue>,
    /// logical id -> physical id
    resources: BTreeMap<String, String>,
    /// Newest first.
    events: Vec<StackEvent>,
    pending: Option<Transition>,
}

#[derive(Debug, Default)]
struct MemoryState {
    stacks: BTreeMap<String, SimulatedStack>,
    seeded_outputs: HashMap<String, Vec<KeyValue>>,
    failing_creates: HashSet<String>,
    failing_deletes: HashSet<String>,
    calls: Vec<ConnectorCall>,
    next_event_id: u64,
}

impl MemoryState {
    fn push_event(
        &mut self,
        stack: &str,
        logical_id: &str,
        resource_type: &str,
        resource_status: &str,
        reason: Option<&str>,
    ) {
        self.next_event_id += 1;
        let event = StackEvent {
            event_id: format!("{stack}-{:06}", self.next_event_id),
            timestamp: Utc::now(),
            logical_resource_id: logical_id.to_string(),
            physical_resource_id: None,
            resource_type: resource_type.to_string(),
            resource_status: resource_status.to_string(),
            status_reason: reason.map(str::to_string),
        };
        if let Some(sim) = self.stacks.get_mut(stack) {
            sim.events.insert(0, event);
        }
    }

    /// Advance a pending transition by one status poll. Returns false when the
    /// stack disappeared as a result (deletion completed).
    fn tick(&mut self, stack: &str) -> bool {
        let Some(sim) = self.stacks.get_mut(stack) else {
            return false;
        };
        let Some(transition) = sim.pending.as_mut() else {
            return true;
        };
        if transition.polls_left > 0 {
            transition.polls_left -= 1;
            return true;
        }
        let target = transition.target;
        sim.pending = None;
        sim.status = target.to_string();
        let resources: Vec<String> = sim.resources.keys().cloned().collect();

        match target {
            status::CREATE_COMPLETE => {
                for logical_id in &resources {
                    self.push_event(stack, logical_id, "Resource", status::CREATE_COMPLETE, None);
                }
                if let Some(outputs) = self.seeded_outputs.get(stack).cloned() {
                    if let Some(sim) = self.stacks.get_mut(stack) {
                        sim.outputs = outputs;
                    }
                }
                self.push_event(stack, stack, STACK_RESOURCE_TYPE, target, None);
            }
            status::DELETE_COMPLETE => {
                tracing::debug!("simulated stack {stack} deleted");
                self.stacks.remove(stack);
                return false;
            }
            _ => {
                self.push_event(
                    stack,
                    stack,
                    STACK_RESOURCE_TYPE,
                    target,
                    Some("simulated failure"),
                );
            }
        }
        true
    }
}

/// Simulated control plane. Cheap to construct, safe to share across threads.
#[derive(Debug)]
pub struct MemoryConnector {
    state: Mutex<MemoryState>,
    settle_after: u32,
}

impl MemoryConnector {
    /// Mutations settle on the second status poll after they were issued.
    pub fn new() -> Self {
        Self::with_settle_after(1)
    }

    /// `polls` status polls observe the in-progress status before the next one
    /// observes the settled status.
    pub fn with_settle_after(polls: u32) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            settle_after: polls,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an already-deployed stack.
    pub fn insert_stack(&self, stack: RemoteStack) {
        let mut state = self.lock();
        state.stacks.insert(
            stack.name.clone(),
            SimulatedStack {
                status: stack.status.clone(),
                outputs: stack.outputs,
                parameters: stack.parameters,
                resources: BTreeMap::new(),
                events: Vec::new(),
                pending: None,
            },
        );
        state.push_event(
            &stack.name,
            &stack.name,
            STACK_RESOURCE_TYPE,
            &stack.status,
            None,
        );
    }

    /// Register a physical id for a resource of an existing stack.
    pub fn insert_resource(&self, stack: &str, logical_id: &str, physical_id: &str) {
        if let Some(sim) = self.lock().stacks.get_mut(stack) {
            sim.resources
                .insert(logical_id.to_string(), physical_id.to_string());
        }
    }

    /// Outputs a stack exposes once its creation completes.
    pub fn seed_outputs(&self, stack: &str, outputs: Vec<KeyValue>) {
        self.lock().seeded_outputs.insert(stack.to_string(), outputs);
    }

    /// Creation of `stack` settles into `ROLLBACK_COMPLETE`.
    pub fn fail_creation(&self, stack: &str) {
        self.lock().failing_creates.insert(stack.to_string());
    }

    /// Deletion of `stack` settles into `DELETE_FAILED`.
    pub fn fail_deletion(&self, stack: &str) {
        self.lock().failing_deletes.insert(stack.to_string());
    }

    pub fn calls(&self) -> Vec<ConnectorCall> {
        self.lock().calls.clone()
    }

    /// Names passed to `create_stack`, in call order.
    pub fn created_stacks(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ConnectorCall::Create { stack, .. } => Some(stack.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names passed to `delete_stack`, in call order.
    pub fn deleted_stacks(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ConnectorCall::Delete(stack) => Some(stack.clone()),
                _ => None,
            })
            .collect()
    }

    /// Current status without counting as a poll.
    pub fn status_of(&self, stack: &str) -> Option<String> {
        self.lock().stacks.get(stack).map(|s| s.status.clone())
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn template_resources(template_body: &str) -> Result<Vec<String>, String> {
    let doc: serde_json::Value =
        serde_json::from_str(template_body).map_err(|e| format!("template is not JSON: {e}"))?;
    let resources = doc
        .get("Resources")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| "template has no Resources section".to_string())?;
    if resources.is_empty() {
        return Err("template has no resources".to_string());
    }
    Ok(resources.keys().cloned().collect())
}

impl StackConnector for MemoryConnector {
    fn describe_stack(&self, stack: &str) -> Result<RemoteStack, ConnectorError> {
        let mut state = self.lock();
        state
            .calls
            .push(ConnectorCall::DescribeStack(stack.to_string()));
        if !state.tick(stack) {
            return Err(ConnectorError::not_found(stack));
        }
        let sim = state
            .stacks
            .get(stack)
            .ok_or_else(|| ConnectorError::not_found(stack))?;
        Ok(RemoteStack {
            name: stack.to_string(),
            status: sim.status.clone(),
            outputs: sim.outputs.clone(),
            parameters: sim.parameters.clone(),
        })
    }

    fn describe_events(&self, stack: &str) -> Result<Vec<StackEvent>, ConnectorError> {
        let mut state = self.lock();
        state
            .calls
            .push(ConnectorCall::DescribeEvents(stack.to_string()));
        state
            .stacks
            .get(stack)
            .map(|s| s.events.clone())
            .ok_or_else(|| ConnectorError::not_found(stack))
    }

    fn create_stack(
        &self,
        stack: &str,
        template_body: &str,
        parameters: &[(String, String)],
        _capabilities: &[String],
    ) -> Result<(), ConnectorError> {
        let mut state = self.lock();
        state.calls.push(ConnectorCall::Create {
            stack: stack.to_string(),
            parameters: parameters.to_vec(),
        });
        if state.stacks.contains_key(stack) {
            return Err(ConnectorError::remote(
                "create-stack",
                format!("Stack [{stack}] already exists"),
            ));
        }
        let logical_ids = template_resources(template_body)
            .map_err(|detail| ConnectorError::remote("create-stack", detail))?;
        let target = if state.failing_creates.contains(stack) {
            status::ROLLBACK_COMPLETE
        } else {
            status::CREATE_COMPLETE
        };
        state.stacks.insert(
            stack.to_string(),
            SimulatedStack {
                status: status::CREATE_IN_PROGRESS.to_string(),
                outputs: Vec::new(),
                parameters: parameters
                    .iter()
                    .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
                    .collect(),
                resources: logical_ids
                    .iter()
                    .map(|id| (id.clone(), format!("{stack}-{id}")))
                    .collect(),
                events: Vec::new(),
                pending: Some(Transition {
                    target,
                    polls_left: self.settle_after,
                }),
            },
        );
        state.push_event(
            stack,
            stack,
            STACK_RESOURCE_TYPE,
            status::CREATE_IN_PROGRESS,
            Some("User Initiated"),
        );
        for logical_id in &logical_ids {
            state.push_event(stack, logical_id, "Resource", status::CREATE_IN_PROGRESS, None);
        }
        tracing::debug!("simulated create of {stack} with {} resources", logical_ids.len());
        Ok(())
    }

    fn delete_stack(&self, stack: &str) -> Result<(), ConnectorError> {
        let mut state = self.lock();
        state.calls.push(ConnectorCall::Delete(stack.to_string()));
        let target = if state.failing_deletes.contains(stack) {
            status::DELETE_FAILED
        } else {
            status::DELETE_COMPLETE
        };
        let settle_after = self.settle_after;
        let Some(sim) = state.stacks.get_mut(stack) else {
            // Deleting an absent stack is accepted silently.
            return Ok(());
        };
        sim.status = status::DELETE_IN_PROGRESS.to_string();
        sim.pending = Some(Transition {
            target,
            polls_left: settle_after,
        });
        state.push_event(
            stack,
            stack,
            STACK_RESOURCE_TYPE,
            status::DELETE_IN_PROGRESS,
            Some("User Initiated"),
        );
        Ok(())
    }

    fn validate_template(&self, template_body: &str) -> Result<(), ConnectorError> {
        let mut state = self.lock();
        state.calls.push(ConnectorCall::Validate);
        template_resources(template_body)
            .map(|_| ())
            .map_err(|detail| ConnectorError::remote("validate-template", detail))
    }

    fn describe_resource(
        &self,
        stack: &str,
        logical_id: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let mut state = self.lock();
        state.calls.push(ConnectorCall::DescribeResource {
            stack: stack.to_string(),
            logical_id: logical_id.to_string(),
        });
        let sim = state
            .stacks
            .get(stack)
            .ok_or_else(|| ConnectorError::not_found(stack))?;
        Ok(sim.resources.get(logical_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"AWSTemplateFormatVersion":"2010-09-09","Resources":{"Vpc":{"Type":"AWS::EC2::VPC"}}}"#;

    #[test]
    fn create_settles_after_configured_polls() {
        let conn = MemoryConnector::with_settle_after(2);
        conn.create_stack("vpc", BODY, &[], &[]).expect("create");
        let statuses: Vec<String> = (0..3)
            .map(|_| conn.describe_stack("vpc").expect("describe").status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                status::CREATE_IN_PROGRESS,
                status::CREATE_IN_PROGRESS,
                status::CREATE_COMPLETE
            ]
        );
    }

    #[test]
    fn events_are_newest_first() {
        let conn = MemoryConnector::with_settle_after(0);
        conn.create_stack("vpc", BODY, &[], &[]).expect("create");
        conn.describe_stack("vpc").expect("describe");
        let events = conn.describe_events("vpc").expect("events");
        assert_eq!(events[0].resource_status, status::CREATE_COMPLETE);
        assert_eq!(events[0].logical_resource_id, "vpc");
        assert_eq!(
            events.last().map(|e| e.resource_status.as_str()),
            Some(status::CREATE_IN_PROGRESS)
        );
        assert!(events.windows(2).all(|w| w[0].event_id > w[1].event_id));
    }

    #[test]
    fn inserted_stack_history_reflects_its_status() {
        let conn = MemoryConnector::new();
        conn.insert_stack(RemoteStack {
            name: "queue".into(),
            status: status::ROLLBACK_COMPLETE.into(),
            outputs: Vec::new(),
            parameters: Vec::new(),
        });
        let events = conn.describe_events("queue").expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_status, status::ROLLBACK_COMPLETE);
        assert_eq!(events[0].logical_resource_id, "queue");
    }

    #[test]
    fn seeded_outputs_appear_on_completion() {
        let conn = MemoryConnector::with_settle_after(0);
        conn.seed_outputs("vpc", vec![KeyValue::new("VpcId", "vpc-1")]);
        conn.create_stack("vpc", BODY, &[], &[]).expect("create");
        let stack = conn.describe_stack("vpc").expect("describe");
        assert_eq!(stack.output("VpcId"), Some("vpc-1"));
    }

    #[test]
    fn resources_get_physical_ids() {
        let conn = MemoryConnector::new();
        conn.create_stack("vpc", BODY, &[], &[]).expect("create");
        assert_eq!(
            conn.describe_resource("vpc", "Vpc").expect("describe"),
            Some("vpc-Vpc".to_string())
        );
        assert_eq!(conn.describe_resource("vpc", "Subnet").expect("describe"), None);
        assert!(
            conn.describe_resource("other", "Vpc")
                .expect_err("missing stack")
                .is_not_found()
        );
    }

    #[test]
    fn failed_creation_settles_into_rollback() {
        let conn = MemoryConnector::with_settle_after(0);
        conn.fail_creation("vpc");
        conn.create_stack("vpc", BODY, &[], &[]).expect("create");
        assert_eq!(
            conn.describe_stack("vpc").expect("describe").status,
            status::ROLLBACK_COMPLETE
        );
    }

    #[test]
    fn completed_deletion_removes_the_stack() {
        let conn = MemoryConnector::with_settle_after(0);
        conn.create_stack("vpc", BODY, &[], &[]).expect("create");
        conn.describe_stack("vpc").expect("settle create");
        conn.delete_stack("vpc").expect("delete");
        assert!(conn.describe_stack("vpc").expect_err("gone").is_not_found());
        assert_eq!(conn.status_of("vpc"), None);
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let conn = MemoryConnector::new();
        conn.create_stack("vpc", BODY, &[], &[]).expect("create");
        let err = conn
            .create_stack("vpc", BODY, &[], &[])
            .expect_err("duplicate");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn validate_rejects_bodies_without_resources() {
        let conn = MemoryConnector::new();
        assert!(conn.validate_template(BODY).is_ok());
        assert!(conn.validate_template(r#"{"Resources":{}}"#).is_err());
        assert!(conn.validate_template("not json").is_err());
    }

    #[test]
    fn calls_are_recorded_in_order() {
        let conn = MemoryConnector::new();
        conn.validate_template(BODY).expect("validate");
        conn.create_stack("vpc", BODY, &[("A".into(), "1".into())], &[])
            .expect("create");
        conn.delete_stack("vpc").expect("delete");
        assert_eq!(
            conn.calls(),
            vec![
                ConnectorCall::Validate,
                ConnectorCall::Create {
                    stack: "vpc".into(),
                    parameters: vec![("A".into(), "1".into())],
                },
                ConnectorCall::Delete("vpc".into()),
            ]
        );
        assert_eq!(conn.created_stacks(), vec!["vpc"]);
        assert_eq!(conn.deleted_stacks(), vec!["vpc"]);
    }
}
