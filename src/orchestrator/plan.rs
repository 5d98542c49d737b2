//! Phase plan loading and step ordering
//!
//! A phase plan is a YAML document listing the keys the run requires and
//! the steps it consists of:
//!
//! ```yaml
//! required: [DOMAIN, ADMIN_EMAIL]
//! steps:
//!   - id: packages
//!     artifact:
//!       location: steps/packages.sh
//!       sha256: 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//!   - id: firewall
//!     artifact: { location: steps/firewall.sh, sha256: "..." }
//!     after: [packages]
//!     when: { key: FIREWALL }
//!     on_failure: warn-continue
//!   - id: reboot-notice
//!     artifact: { location: steps/notice.sh, sha256: "...", signature: steps/notice.sh.asc }
//!     category: must-run-last
//! ```
//!
//! The order is resolved completely before anything executes.
//!
//! ## Algorithm
//!
//! DFS with three-color marking over the `after` edges. Normal steps are
//! visited first in declaration order, then must-run-last steps, so
//! independent steps keep the order they were declared in.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HostkeepError, HostkeepResult};
use crate::fetch::source::resolve_location;
use crate::fetch::{ExpectedArtifact, VerifiedSet};

use super::step::{
    FailurePolicy, InstallationStep, RunWhen, ScriptStep, StepCategory, StepDescriptor,
};

/// Where a step's script comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub location: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// One step entry of a phase plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub id: String,
    pub artifact: ArtifactRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<RunWhen>,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub category: StepCategory,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl PlannedStep {
    pub fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            id: self.id.clone(),
            when: self.when.clone(),
            category: self.category,
            after: self.after.clone(),
            on_failure: self.on_failure,
        }
    }
}

/// A declarative installation plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePlan {
    /// Keys that must resolve before any step runs
    #[serde(default)]
    pub required: Vec<String>,
    pub steps: Vec<PlannedStep>,
    /// Where the plan was read from; relative artifact locations resolve
    /// against it
    #[serde(skip)]
    pub origin: String,
}

impl PhasePlan {
    pub fn from_yaml(text: &str, origin: impl Into<String>) -> HostkeepResult<Self> {
        let mut plan: PhasePlan = serde_yaml::from_str(text)?;
        plan.origin = origin.into();
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: &Path) -> HostkeepResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            HostkeepError::Io(format!("Failed to read plan {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text, path.to_string_lossy())
    }

    fn validate(&self) -> HostkeepResult<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(HostkeepError::Plan("step with empty id".into()));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(HostkeepError::Plan(format!("duplicate step id '{}'", step.id)));
            }
        }
        Ok(())
    }

    pub fn descriptors(&self) -> Vec<StepDescriptor> {
        self.steps.iter().map(PlannedStep::descriptor).collect()
    }

    /// Artifacts the fetcher must verify, one per step
    pub fn to_manifest(&self) -> Vec<ExpectedArtifact> {
        self.steps
            .iter()
            .map(|step| ExpectedArtifact {
                name: step.id.clone(),
                location: resolve_location(&self.origin, &step.artifact.location),
                sha256: step.artifact.sha256.clone(),
                signature: step
                    .artifact
                    .signature
                    .as_deref()
                    .map(|sig| resolve_location(&self.origin, sig)),
            })
            .collect()
    }

    /// Bind each step to its verified script
    pub fn build_steps(
        &self,
        verified: &VerifiedSet,
    ) -> HostkeepResult<Vec<Box<dyn InstallationStep>>> {
        self.steps
            .iter()
            .map(|step| {
                let artifact = verified
                    .get(&step.id)
                    .ok_or_else(|| HostkeepError::step_not_found(&step.id))?;
                Ok(Box::new(ScriptStep::new(step.descriptor(), artifact.path.clone()))
                    as Box<dyn InstallationStep>)
            })
            .collect()
    }
}

/// Context for ordering
struct OrderContext<'a> {
    index: HashMap<&'a str, usize>,
    descriptors: &'a [&'a StepDescriptor],
    /// BLACK
    visited: HashSet<usize>,
    /// GRAY, plus the current path for error messages
    path: Vec<usize>,
    result: Vec<usize>,
}

/// Compute execution order as indices into `descriptors`
///
/// # Errors
///
/// Returns [`HostkeepError::Plan`] for an unknown dependency, a cycle, or
/// a normal step that depends on a must-run-last step.
pub fn order(descriptors: &[&StepDescriptor]) -> HostkeepResult<Vec<usize>> {
    let mut index = HashMap::new();
    for (i, d) in descriptors.iter().enumerate() {
        if index.insert(d.id.as_str(), i).is_some() {
            return Err(HostkeepError::Plan(format!("duplicate step id '{}'", d.id)));
        }
    }

    for d in descriptors {
        for dep in &d.after {
            let Some(&j) = index.get(dep.as_str()) else {
                return Err(HostkeepError::Plan(format!(
                    "step '{}' depends on unknown step '{}'",
                    d.id, dep
                )));
            };
            if d.category == StepCategory::Normal
                && descriptors[j].category == StepCategory::MustRunLast
            {
                return Err(HostkeepError::Plan(format!(
                    "step '{}' cannot depend on must-run-last step '{}'",
                    d.id, dep
                )));
            }
        }
    }

    let mut ctx = OrderContext {
        index,
        descriptors,
        visited: HashSet::new(),
        path: Vec::new(),
        result: Vec::with_capacity(descriptors.len()),
    };

    for category in [StepCategory::Normal, StepCategory::MustRunLast] {
        for (i, d) in descriptors.iter().enumerate() {
            if d.category == category {
                visit(&mut ctx, i)?;
            }
        }
    }

    Ok(ctx.result)
}

fn visit(ctx: &mut OrderContext, node: usize) -> HostkeepResult<()> {
    if ctx.visited.contains(&node) {
        return Ok(());
    }
    if let Some(pos) = ctx.path.iter().position(|&n| n == node) {
        let mut chain: Vec<&str> = ctx.path[pos..]
            .iter()
            .map(|&n| ctx.descriptors[n].id.as_str())
            .collect();
        chain.push(ctx.descriptors[node].id.as_str());
        return Err(HostkeepError::Plan(format!(
            "dependency cycle: {}",
            chain.join(" -> ")
        )));
    }

    ctx.path.push(node);
    let deps: Vec<usize> = ctx.descriptors[node]
        .after
        .iter()
        .filter_map(|dep| ctx.index.get(dep.as_str()).copied())
        .collect();
    for dep in deps {
        visit(ctx, dep)?;
    }
    ctx.path.pop();

    ctx.visited.insert(node);
    ctx.result.push(node);
    Ok(())
}

/// Reorder steps into execution order
pub fn order_steps(
    steps: Vec<Box<dyn InstallationStep>>,
) -> HostkeepResult<Vec<Box<dyn InstallationStep>>> {
    let positions = {
        let descriptors: Vec<&StepDescriptor> = steps.iter().map(|s| s.descriptor()).collect();
        order(&descriptors)?
    };

    let mut slots: Vec<Option<Box<dyn InstallationStep>>> = steps.into_iter().map(Some).collect();
    Ok(positions
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(descriptors: &[StepDescriptor]) -> HostkeepResult<Vec<String>> {
        let refs: Vec<&StepDescriptor> = descriptors.iter().collect();
        Ok(order(&refs)?
            .into_iter()
            .map(|i| descriptors[i].id.clone())
            .collect())
    }

    #[test]
    fn test_declaration_order_kept_for_independent_steps() {
        let steps = vec![
            StepDescriptor::new("c"),
            StepDescriptor::new("a"),
            StepDescriptor::new("b"),
        ];
        assert_eq!(ids(&steps).unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_dependencies_first() {
        let steps = vec![
            StepDescriptor::new("web").after("db").after("tls"),
            StepDescriptor::new("db").after("packages"),
            StepDescriptor::new("tls"),
            StepDescriptor::new("packages"),
        ];
        assert_eq!(ids(&steps).unwrap(), vec!["packages", "db", "tls", "web"]);
    }

    #[test]
    fn test_must_run_last_goes_after_everything() {
        let steps = vec![
            StepDescriptor::new("notice").must_run_last(),
            StepDescriptor::new("cleanup").must_run_last().after("notice"),
            StepDescriptor::new("packages"),
            StepDescriptor::new("ssh").after("packages"),
        ];
        let order = ids(&steps).unwrap();
        assert_eq!(order, vec!["packages", "ssh", "notice", "cleanup"]);
    }

    #[test]
    fn test_must_run_last_may_depend_on_normal() {
        let steps = vec![
            StepDescriptor::new("final").must_run_last().after("late"),
            StepDescriptor::new("early"),
            StepDescriptor::new("late"),
        ];
        assert_eq!(ids(&steps).unwrap(), vec!["early", "late", "final"]);
    }

    #[test]
    fn test_normal_depending_on_last_rejected() {
        let steps = vec![
            StepDescriptor::new("final").must_run_last(),
            StepDescriptor::new("ssh").after("final"),
        ];
        let err = ids(&steps).unwrap_err();
        assert!(err.to_string().contains("must-run-last"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let steps = vec![StepDescriptor::new("ssh").after("packages")];
        let err = ids(&steps).unwrap_err();
        assert!(matches!(err, HostkeepError::Plan(_)));
        assert!(err.to_string().contains("packages"));
    }

    #[test]
    fn test_cycle_rejected() {
        let steps = vec![
            StepDescriptor::new("a").after("c"),
            StepDescriptor::new("b").after("a"),
            StepDescriptor::new("c").after("b"),
        ];
        let err = ids(&steps).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_plan_yaml() {
        let yaml = r#"
required: [DOMAIN]
steps:
  - id: packages
    artifact: { location: steps/packages.sh, sha256: "AA" }
  - id: notice
    artifact:
      location: https://cdn.example.org/notice.sh
      sha256: "bb"
      signature: notice.sh.asc
    category: must-run-last
    on_failure: warn-continue
    when: { key: NOTIFY, equals: "mail" }
"#;
        let plan = PhasePlan::from_yaml(yaml, "/srv/plans/plan.yaml").unwrap();
        assert_eq!(plan.required, vec!["DOMAIN"]);

        let notice = &plan.descriptors()[1];
        assert_eq!(notice.category, StepCategory::MustRunLast);
        assert_eq!(notice.on_failure, FailurePolicy::WarnContinue);
        assert_eq!(notice.when.as_ref().unwrap().equals.as_deref(), Some("mail"));

        let manifest = plan.to_manifest();
        assert_eq!(manifest[0].location, "/srv/plans/steps/packages.sh");
        assert_eq!(manifest[1].location, "https://cdn.example.org/notice.sh");
        assert_eq!(
            manifest[1].signature.as_deref(),
            Some("/srv/plans/notice.sh.asc")
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = r#"
steps:
  - id: a
    artifact: { location: a.sh, sha256: "00" }
  - id: a
    artifact: { location: b.sh, sha256: "00" }
"#;
        let err = PhasePlan::from_yaml(yaml, "plan.yaml").unwrap_err();
        assert!(matches!(err, HostkeepError::Plan(_)));
    }
}
