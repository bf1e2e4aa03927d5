// SPDX-License-Identifier: MIT
//! Workflow validation (§4.6): every referenced job must exist, volumes and
//! runtimes must be known, the dependency graph must be acyclic. All
//! defects are collected into a single composite error rather than
//! failing on the first one.

use crate::expr;
use crate::model::{RequireEntry, Workflow};
use joblet_core::error::JobletError;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Color {
    #[default]
    White,
    Gray,
    Black,
}

pub fn validate_workflow(
    workflow: &Workflow,
    known_volumes: &HashSet<String>,
    known_runtimes: &HashSet<String>,
) -> Result<(), JobletError> {
    let mut defects = Vec::new();
    let mut graph: HashMap<String, Vec<String>> = HashMap::new();

    for (name, spec) in &workflow.jobs {
        if !known_runtimes.contains(&spec.runtime) {
            defects.push(format!("job '{name}' references unknown runtime '{}'", spec.runtime));
        }
        for volume in &spec.volumes {
            if !known_volumes.contains(volume) {
                defects.push(format!("job '{name}' references unknown volume '{volume}'"));
            }
        }

        let mut deps = Vec::new();
        for requirement in &spec.requires {
            match requirement {
                RequireEntry::OtherJob { job, .. } => {
                    if !workflow.jobs.contains_key(job) {
                        defects.push(format!("job '{name}' requires unknown job '{job}'"));
                    } else {
                        deps.push(job.clone());
                    }
                }
                RequireEntry::Expression { expression } => match expr::parse(expression) {
                    Ok(parsed) => {
                        let mut refs = Vec::new();
                        parsed.referenced_jobs(&mut refs);
                        for job in refs {
                            if !workflow.jobs.contains_key(&job) {
                                defects.push(format!(
                                    "job '{name}' expression references unknown job '{job}'"
                                ));
                            } else {
                                deps.push(job);
                            }
                        }
                    }
                    Err(e) => defects.push(format!("job '{name}' has an invalid expression: {e}")),
                },
            }
        }
        graph.insert(name.clone(), deps);
    }

    if let Some(cycle_node) = find_cycle(&graph) {
        defects.push(format!("circular dependency detected involving job '{cycle_node}'"));
    }

    if defects.is_empty() {
        Ok(())
    } else {
        Err(JobletError::validation("workflow", defects.join("; ")))
    }
}

fn find_cycle(graph: &HashMap<String, Vec<String>>) -> Option<String> {
    let mut colors: HashMap<&str, Color> = graph.keys().map(|k| (k.as_str(), Color::White)).collect();

    fn visit<'a>(
        node: &'a str,
        graph: &'a HashMap<String, Vec<String>>,
        colors: &mut HashMap<&'a str, Color>,
    ) -> Option<String> {
        colors.insert(node, Color::Gray);
        if let Some(deps) = graph.get(node) {
            for dep in deps {
                match colors.get(dep.as_str()).copied().unwrap_or_default() {
                    Color::Gray => return Some(dep.clone()),
                    Color::White => {
                        if let Some(cycle) = visit(dep.as_str(), graph, colors) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }
        colors.insert(node, Color::Black);
        None
    }

    for node in graph.keys() {
        if colors.get(node.as_str()).copied().unwrap_or_default() == Color::White {
            if let Some(cycle) = visit(node, graph, &mut colors) {
                return Some(cycle);
            }
        }
    }
    None
}
