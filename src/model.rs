//! Abstract MILP model exchanged with solver engines.
//!
//! This is the request side of the solver boundary: variable domains, a linear
//! objective with its sense, and a flat list of linear constraints tagged with the
//! family that produced them. Variables are addressed by dense [`VarId`]s.

use crate::error::ConstraintFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dense index of a variable in [`MilpModel::variables`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(pub usize);

/// Domain of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    Binary,
    Continuous { lower: f64, upper: Option<f64> },
}

impl Domain {
    /// `[0, +inf)`.
    pub fn non_negative() -> Self {
        Domain::Continuous { lower: 0.0, upper: None }
    }

    /// `[0, upper]`.
    pub fn bounded(upper: f64) -> Self {
        Domain::Continuous { lower: 0.0, upper: Some(upper) }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Domain::Binary)
    }

    pub fn lower(&self) -> f64 {
        match self {
            Domain::Binary => 0.0,
            Domain::Continuous { lower, .. } => *lower,
        }
    }

    pub fn upper(&self) -> Option<f64> {
        match self {
            Domain::Binary => Some(1.0),
            Domain::Continuous { upper, .. } => *upper,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    pub domain: Domain,
}

/// `coef * var`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub var: VarId,
    pub coef: f64,
}

impl Term {
    pub fn new(var: VarId, coef: f64) -> Self {
        Term { var, coef }
    }
}

/// Evaluate `Σ coef * value[var]`.
pub fn evaluate_terms(terms: &[Term], values: &[f64]) -> f64 {
    terms.iter().map(|t| t.coef * values.get(t.var.0).copied().unwrap_or(0.0)).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub terms: Vec<Term>,
    pub sense: Sense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Relation::Le => "<=",
            Relation::Ge => ">=",
            Relation::Eq => "==",
        })
    }
}

/// `Σ terms  relation  rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub name: String,
    pub family: ConstraintFamily,
    pub terms: Vec<Term>,
    pub relation: Relation,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Amount by which `values` break the constraint (0 when satisfied).
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = evaluate_terms(&self.terms, values);
        match self.relation {
            Relation::Le => (lhs - self.rhs).max(0.0),
            Relation::Ge => (self.rhs - lhs).max(0.0),
            Relation::Eq => (lhs - self.rhs).abs(),
        }
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        self.violation(values) <= tolerance
    }
}

/// A complete MILP ready to be handed to an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilpModel {
    pub name: String,
    pub variables: Vec<VariableDef>,
    pub objective: Objective,
    pub constraints: Vec<LinearConstraint>,
}

impl MilpModel {
    pub fn new(name: &str, sense: Sense) -> Self {
        MilpModel {
            name: name.to_string(),
            variables: Vec::new(),
            objective: Objective { terms: Vec::new(), sense },
            constraints: Vec::new(),
        }
    }

    pub fn add_variable(&mut self, name: String, domain: Domain) -> VarId {
        self.variables.push(VariableDef { name, domain });
        VarId(self.variables.len() - 1)
    }

    /// Add `coef * var` to the objective.
    pub fn add_objective_term(&mut self, var: VarId, coef: f64) {
        self.objective.terms.push(Term::new(var, coef));
    }

    pub fn add_constraint(
        &mut self,
        name: String,
        family: ConstraintFamily,
        terms: Vec<Term>,
        relation: Relation,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint { name, family, terms, relation, rhs });
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_binaries(&self) -> usize {
        self.variables.iter().filter(|v| v.domain.is_integer()).count()
    }

    pub fn variable_name(&self, var: VarId) -> &str {
        &self.variables[var.0].name
    }

    /// Objective value of a dense assignment.
    pub fn evaluate_objective(&self, values: &[f64]) -> f64 {
        evaluate_terms(&self.objective.terms, values)
    }

    /// Number of constraints per family.
    pub fn family_counts(&self) -> BTreeMap<ConstraintFamily, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.constraints {
            *counts.entry(c.family).or_insert(0) += 1;
        }
        counts
    }

    /// Constraints of one family.
    pub fn constraints_of(&self, family: ConstraintFamily) -> impl Iterator<Item = &LinearConstraint> {
        self.constraints.iter().filter(move |c| c.family == family)
    }

    /// Constraints broken by `values` beyond `tolerance`.
    pub fn violated_constraints(&self, values: &[f64], tolerance: f64) -> Vec<&LinearConstraint> {
        self.constraints.iter().filter(|c| !c.is_satisfied(values, tolerance)).collect()
    }
}

/// Dense variable assignment returned by an engine, indexed by [`VarId`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment {
    values: Vec<f64>,
}

impl Assignment {
    pub fn new(values: Vec<f64>) -> Self {
        Assignment { values }
    }

    pub fn empty() -> Self {
        Assignment { values: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Value of a variable; 0 for variables outside the assignment.
    #[inline]
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `variable name -> value`, the wire form of the solver response.
    pub fn named(&self, model: &MilpModel) -> BTreeMap<String, f64> {
        model
            .variables
            .iter()
            .zip(&self.values)
            .map(|(def, &v)| (def.name.clone(), v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> (MilpModel, VarId, VarId) {
        let mut model = MilpModel::new("tiny", Sense::Minimize);
        let x = model.add_variable("x".to_string(), Domain::Binary);
        let y = model.add_variable("y".to_string(), Domain::bounded(5.0));
        model.add_objective_term(x, 2.0);
        model.add_objective_term(y, 1.0);
        model.add_constraint(
            "cover".to_string(),
            ConstraintFamily::VisitOnce,
            vec![Term::new(x, 1.0), Term::new(y, 1.0)],
            Relation::Ge,
            1.0,
        );
        (model, x, y)
    }

    #[test]
    fn test_violation_and_objective() {
        let (model, _, _) = tiny_model();
        assert_eq!(model.evaluate_objective(&[1.0, 0.5]), 2.5);
        assert!(model.violated_constraints(&[0.0, 1.0], 1e-9).is_empty());
        assert_eq!(model.violated_constraints(&[0.0, 0.25], 1e-9).len(), 1);
        assert!((model.constraints[0].violation(&[0.0, 0.25]) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_named_assignment() {
        let (model, x, y) = tiny_model();
        let assignment = Assignment::new(vec![1.0, 0.0]);
        let named = assignment.named(&model);
        assert_eq!(named.get("x"), Some(&1.0));
        assert_eq!(named.get("y"), Some(&0.0));
        assert_eq!(assignment.value(x), 1.0);
        assert_eq!(assignment.value(y), 0.0);
        assert_eq!(assignment.value(VarId(99)), 0.0);
    }

    #[test]
    fn test_wire_format() {
        let (model, _, _) = tiny_model();
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["variables"][0]["domain"]["kind"], "binary");
        assert_eq!(json["constraints"][0]["relation"], ">=");
        assert_eq!(json["objective"]["sense"], "Minimize");
        assert_eq!(json["objective"]["terms"][1]["var"], 1);
    }
}
