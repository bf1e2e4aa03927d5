// SPDX-License-Identifier: MIT
//! Evaluator for the dependency expression AST (§4.6): short-circuit
//! boolean evaluation against a job-state snapshot. A job absent from the
//! snapshot is "unset" — every predicate about it (equality, inequality,
//! membership, and its negation) evaluates `false`, since nothing can yet
//! be affirmed about a job that hasn't reported any status.

use super::parser::Expr;
use joblet_core::job::JobStatus;
use std::collections::HashMap;

pub fn eval(expr: &Expr, snapshot: &HashMap<String, JobStatus>) -> bool {
    match expr {
        Expr::Or(a, b) => eval(a, snapshot) || eval(b, snapshot),
        Expr::And(a, b) => eval(a, snapshot) && eval(b, snapshot),
        Expr::Not(a) => !eval(a, snapshot),
        Expr::Eq(job, status) => snapshot.get(job) == Some(status),
        Expr::Ne(job, status) => matches!(snapshot.get(job), Some(s) if s != status),
        Expr::In(job, statuses) => snapshot.get(job).is_some_and(|s| statuses.contains(s)),
        Expr::NotIn(job, statuses) => matches!(snapshot.get(job), Some(s) if !statuses.contains(s)),
    }
}
