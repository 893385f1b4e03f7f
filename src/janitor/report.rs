//! Deterministic JSON report and the exit signal derived from it.
//!
//! Object keys are emitted in lexicographic order and nested with four
//! spaces, so two runs over the same resources produce byte-identical
//! reports that can be diffed by alerting jobs.

use chrono::SecondsFormat;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::ser::PrettyFormatter;
use thiserror::Error;

use crate::resource::CloudResource;

use super::lister::TrackedResource;
use super::plan::ActionPlan;

const INDENT: &[u8] = b"    ";

/// Errors raised while rendering a report.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReportError {
    /// Raised when serialisation fails.
    #[error("failed to serialise report: {message}")]
    Serialize {
        /// Serializer error message.
        message: String,
    },
}

/// Process outcome derived from a set of plans.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitSignal {
    /// Nothing needed destroying.
    Clean,
    /// At least one resource was planned for destruction.
    LeaksFound,
}

impl ExitSignal {
    /// Process exit code for this signal.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::LeaksFound => 1,
        }
    }
}

/// Node of the report tree.
#[derive(Clone, Copy, Debug)]
pub enum ReportNode<'a> {
    /// One kind's plan.
    Plan(&'a ActionPlan),
    /// One resource inside a plan list.
    Resource(&'a CloudResource),
}

impl Serialize for ReportNode<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Plan(plan) => serialize_plan(plan, serializer),
            Self::Resource(resource) => serialize_resource(resource, serializer),
        }
    }
}

fn resource_nodes(resources: &[TrackedResource]) -> Vec<ReportNode<'_>> {
    resources
        .iter()
        .map(|tracked| ReportNode::Resource(&tracked.resource))
        .collect()
}

fn serialize_plan<S: Serializer>(plan: &ActionPlan, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(3))?;
    map.serialize_entry("destroy", &resource_nodes(&plan.destroy))?;
    map.serialize_entry("keep", &resource_nodes(&plan.keep))?;
    map.serialize_entry("kind", plan.kind.plural())?;
    map.end()
}

fn serialize_resource<S: Serializer>(
    resource: &CloudResource,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let creation_time = resource
        .creation_time
        .map(|created| created.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    let mut map = serializer.serialize_map(Some(5))?;
    map.serialize_entry("creation_time", &creation_time)?;
    map.serialize_entry("id", &resource.id)?;
    map.serialize_entry("name", &resource.name)?;
    map.serialize_entry("provider", &resource.provider)?;
    map.serialize_entry("region", &resource.region)?;
    map.end()
}

/// Renders plans and derives the exit signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reporter;

impl Reporter {
    /// Renders `plans` as an indented JSON array, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialize`] when serialisation fails.
    pub fn render(plans: &[ActionPlan]) -> Result<String, ReportError> {
        let nodes = plans.iter().map(ReportNode::Plan).collect::<Vec<_>>();
        let mut buffer = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(INDENT));
        nodes
            .serialize(&mut serializer)
            .map_err(|err| ReportError::Serialize {
                message: err.to_string(),
            })?;
        String::from_utf8(buffer).map_err(|err| ReportError::Serialize {
            message: err.to_string(),
        })
    }

    /// Signals leaks when any plan has something to destroy.
    #[must_use]
    pub fn exit_signal(plans: &[ActionPlan]) -> ExitSignal {
        if plans.iter().all(ActionPlan::is_clean) {
            ExitSignal::Clean
        } else {
            ExitSignal::LeaksFound
        }
    }
}
