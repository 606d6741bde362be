//! External workflow graph and status mapping.
//!
//! The tracker enforces its own workflow: moving an issue between two
//! states may require intermediate hops, each performed by a named
//! transition. The bridge plans the shortest hop sequence through a
//! configured description of that graph, then executes the hops one by one.

use std::collections::{HashMap, HashSet, VecDeque};

use incident::{Priority, Status};

use crate::error::SyncError;

/// One directed edge in the external workflow.
#[derive(Debug, Clone)]
pub struct WorkflowEdge {
    /// State the transition leaves
    pub from: String,
    /// Transition name as the tracker exposes it
    pub transition: String,
    /// State the transition lands in
    pub to: String,
}

/// Description of the external tracker's workflow graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    #[must_use]
    pub fn new(edges: Vec<WorkflowEdge>) -> Self {
        Self { edges }
    }

    /// The default Jira-style incident workflow.
    #[must_use]
    pub fn standard() -> Self {
        let edge = |from: &str, transition: &str, to: &str| WorkflowEdge {
            from: from.to_string(),
            transition: transition.to_string(),
            to: to.to_string(),
        };
        Self::new(vec![
            edge("Open", "Start progress", "In Progress"),
            edge("In Progress", "Pending resolution", "Pending"),
            edge("Pending", "Back in progress", "In Progress"),
            edge("Pending", "Resolve", "Reporter validation"),
            edge("In Progress", "Resolve", "Reporter validation"),
            edge("Reporter validation", "Close", "Closed"),
            edge("Open", "Close", "Closed"),
            edge("Closed", "Reopen", "In Progress"),
        ])
    }

    /// Shortest ordered sequence of transition names from one external
    /// state to another. Breadth-first; the empty path means "already
    /// there".
    pub fn shortest_path(&self, from: &str, to: &str) -> Result<Vec<String>, SyncError> {
        if from == to {
            return Ok(Vec::new());
        }

        let mut adjacency: HashMap<&str, Vec<&WorkflowEdge>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(edge.from.as_str()).or_default().push(edge);
        }

        let mut visited: HashSet<&str> = HashSet::from([from]);
        let mut queue: VecDeque<(&str, Vec<String>)> = VecDeque::from([(from, Vec::new())]);

        while let Some((state, path)) = queue.pop_front() {
            for edge in adjacency.get(state).into_iter().flatten() {
                if !visited.insert(edge.to.as_str()) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(edge.transition.clone());
                if edge.to == to {
                    return Ok(next_path);
                }
                queue.push_back((edge.to.as_str(), next_path));
            }
        }

        Err(SyncError::NoPath {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Fixed internal-to-external status mapping.
///
/// `Mitigated` maps to the closed-equivalent "Reporter validation" state
/// only when the incident does not require a report; with a report
/// mandated, the external ticket stays open until internal `Closed`.
#[must_use]
pub fn external_target(status: Status, requires_report: bool) -> Option<&'static str> {
    match status {
        Status::Open => Some("Open"),
        Status::Investigating => Some("In Progress"),
        Status::Mitigating => Some("Pending"),
        Status::Mitigated => {
            if requires_report {
                None
            } else {
                Some("Reporter validation")
            }
        }
        // Post-mortem has no tracker-side equivalent; the ticket moves
        // again on internal close.
        Status::PostMortem => None,
        Status::Closed => Some("Closed"),
    }
}

/// Inbound mapping from external state names to internal statuses.
///
/// Unknown names return `None` and are ignored by the inbound leg.
#[must_use]
pub fn internal_target(external_status: &str) -> Option<Status> {
    match external_status {
        "Open" => Some(Status::Open),
        "In Progress" => Some(Status::Investigating),
        "Pending" => Some(Status::Mitigating),
        "Reporter validation" => Some(Status::Mitigated),
        "Closed" => Some(Status::Closed),
        _ => None,
    }
}

/// Internal priority on the tracker's own scale.
#[must_use]
pub const fn tracker_priority(priority: Priority) -> &'static str {
    match priority {
        Priority::P1 => "Highest",
        Priority::P2 => "High",
        Priority::P3 => "Medium",
        Priority::P4 => "Low",
        Priority::P5 => "Lowest",
    }
}

/// Inbound mapping from the tracker priority scale.
#[must_use]
pub fn internal_priority(name: &str) -> Option<Priority> {
    match name {
        "Highest" => Some(Priority::P1),
        "High" => Some(Priority::P2),
        "Medium" => Some(Priority::P3),
        "Low" => Some(Priority::P4),
        "Lowest" => Some(Priority::P5),
        _ => None,
    }
}
