//! Utility spaces: dense utility tables over an ordered scope of variables.
//!
//! A [`UtilitySpace`] maps every joint assignment of its scope to a
//! [`Utility`]. Entries are stored row-major, with the last scope variable
//! varying fastest. Every operation that inspects entries records the
//! number of entries it touched as constraint checks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{DcopError, Result};
use crate::nccc::ConstraintChecks;
use crate::utility::{Optimization, Utility};
use crate::variable::Value;

/// A joint assignment of values to variables, keyed by variable name.
pub type Assignment = BTreeMap<String, Value>;

/// A utility function over an ordered scope of variables.
///
/// # Examples
///
/// ```
/// use dcopforge_core::{ConstraintChecks, Optimization, Utility, UtilitySpace};
///
/// let x_ne_y = UtilitySpace::from_fn(
///     vec!["x".into(), "y".into()],
///     vec![vec![1, 2], vec![1, 2]],
///     |v| Utility::of(if v[0] != v[1] { 1.0 } else { 0.0 }),
/// ).unwrap();
///
/// let mut checks = ConstraintChecks::new();
/// let over_x = x_ne_y.project("y", Optimization::Maximize, &mut checks).unwrap();
/// assert_eq!(over_x.scope(), &["x".to_string()]);
/// assert_eq!(over_x.utility(&[1]), Some(Utility::of(1.0)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSpace", into = "RawSpace")]
pub struct UtilitySpace {
    scope: Vec<String>,
    domains: Vec<Vec<Value>>,
    utilities: Vec<Utility>,
}

#[derive(Clone, Serialize, Deserialize)]
struct RawSpace {
    scope: Vec<String>,
    domains: Vec<Vec<Value>>,
    utilities: Vec<Utility>,
}

impl TryFrom<RawSpace> for UtilitySpace {
    type Error = DcopError;

    fn try_from(raw: RawSpace) -> Result<Self> {
        UtilitySpace::new(raw.scope, raw.domains, raw.utilities)
    }
}

impl From<UtilitySpace> for RawSpace {
    fn from(space: UtilitySpace) -> Self {
        RawSpace {
            scope: space.scope,
            domains: space.domains,
            utilities: space.utilities,
        }
    }
}

impl UtilitySpace {
    /// Creates a space from row-major utilities.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the scope has duplicates, a domain
    /// is empty, or the number of utilities does not match the domains.
    pub fn new(scope: Vec<String>, domains: Vec<Vec<Value>>, utilities: Vec<Utility>) -> Result<Self> {
        if scope.len() != domains.len() {
            return Err(DcopError::Configuration(format!(
                "space scope has {} variables but {} domains",
                scope.len(),
                domains.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for (var, domain) in scope.iter().zip(&domains) {
            if !seen.insert(var.as_str()) {
                return Err(DcopError::Configuration(format!(
                    "variable '{var}' appears twice in a space scope"
                )));
            }
            if domain.is_empty() {
                return Err(DcopError::Configuration(format!(
                    "variable '{var}' has an empty domain"
                )));
            }
        }
        let expected = entry_count(&domains)?;
        if utilities.len() != expected {
            return Err(DcopError::Configuration(format!(
                "space over {:?} needs {} utilities, got {}",
                scope,
                expected,
                utilities.len()
            )));
        }
        Ok(UtilitySpace {
            scope,
            domains,
            utilities,
        })
    }

    /// A space with an empty scope holding a single utility.
    pub fn scalar(utility: Utility) -> Self {
        UtilitySpace {
            scope: Vec::new(),
            domains: Vec::new(),
            utilities: vec![utility],
        }
    }

    /// A space assigning the same utility everywhere.
    pub fn constant(scope: Vec<String>, domains: Vec<Vec<Value>>, utility: Utility) -> Result<Self> {
        let count = entry_count(&domains)?;
        UtilitySpace::new(scope, domains, vec![utility; count])
    }

    /// Builds a space by evaluating `f` on every joint assignment, given as
    /// values in scope order.
    pub fn from_fn<F>(scope: Vec<String>, domains: Vec<Vec<Value>>, mut f: F) -> Result<Self>
    where
        F: FnMut(&[Value]) -> Utility,
    {
        let count = entry_count(&domains)?;
        let dims: Vec<usize> = domains.iter().map(Vec::len).collect();
        let mut utilities = Vec::with_capacity(count);
        let mut indices = vec![0; dims.len()];
        let mut values: Vec<Value> = Vec::with_capacity(dims.len());
        if dims.iter().all(|&d| d > 0) {
            loop {
                values.clear();
                values.extend(indices.iter().zip(&domains).map(|(&i, d)| d[i]));
                utilities.push(f(&values));
                if !advance(&mut indices, &dims) {
                    break;
                }
            }
        }
        UtilitySpace::new(scope, domains, utilities)
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    pub fn domains(&self) -> &[Vec<Value>] {
        &self.domains
    }

    pub fn utilities(&self) -> &[Utility] {
        &self.utilities
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.utilities.len()
    }

    pub fn position(&self, var: &str) -> Option<usize> {
        self.scope.iter().position(|v| v == var)
    }

    pub fn contains(&self, var: &str) -> bool {
        self.position(var).is_some()
    }

    pub fn domain_of(&self, var: &str) -> Option<&[Value]> {
        self.position(var).map(|p| self.domains[p].as_slice())
    }

    /// The single utility of an empty-scope space.
    pub fn scalar_value(&self) -> Option<Utility> {
        if self.scope.is_empty() {
            self.utilities.first().copied()
        } else {
            None
        }
    }

    /// Looks up the utility for values given in scope order.
    pub fn utility(&self, values: &[Value]) -> Option<Utility> {
        if values.len() != self.scope.len() {
            return None;
        }
        let mut flat = 0;
        for (k, &value) in values.iter().enumerate() {
            let index = self.domains[k].iter().position(|&v| v == value)?;
            flat = flat * self.domains[k].len() + index;
        }
        self.utilities.get(flat).copied()
    }

    /// Looks up the utility for an assignment covering at least the scope.
    pub fn utility_for(&self, assignment: &Assignment) -> Option<Utility> {
        let values = self
            .scope
            .iter()
            .map(|var| assignment.get(var).copied())
            .collect::<Option<Vec<_>>>()?;
        self.utility(&values)
    }

    /// The best utility over all entries.
    pub fn optimum(&self, optimization: Optimization) -> Utility {
        self.utilities
            .iter()
            .copied()
            .fold(optimization.infeasible(), |best, u| optimization.best(best, u))
    }

    /// Combines two spaces over the union of their scopes by adding
    /// utilities. Shared variables keep the values common to both domains,
    /// in this space's order.
    pub fn join(&self, other: &UtilitySpace, checks: &mut ConstraintChecks) -> Result<UtilitySpace> {
        let mut scope = self.scope.clone();
        let mut domains = self.domains.clone();
        for (var, domain) in other.scope.iter().zip(&other.domains) {
            match scope.iter().position(|v| v == var) {
                Some(p) => {
                    domains[p].retain(|value| domain.contains(value));
                    if domains[p].is_empty() {
                        return Err(DcopError::Inconsistent(format!(
                            "domains of '{var}' do not intersect"
                        )));
                    }
                }
                None => {
                    scope.push(var.clone());
                    domains.push(domain.clone());
                }
            }
        }

        let left = Lookup::new(self, &scope, &domains);
        let right = Lookup::new(other, &scope, &domains);
        let dims: Vec<usize> = domains.iter().map(Vec::len).collect();
        let count = entry_count(&domains)?;
        let mut utilities = Vec::with_capacity(count);
        let mut indices = vec![0; dims.len()];
        loop {
            let u = self.utilities[left.flat(&indices)] + other.utilities[right.flat(&indices)];
            utilities.push(u);
            if !advance(&mut indices, &dims) {
                break;
            }
        }
        checks.add(count as u64);
        UtilitySpace::new(scope, domains, utilities)
    }

    /// Eliminates `var` by optimizing over its domain. The result is a
    /// space over the remaining scope, in the same order.
    pub fn project(
        &self,
        var: &str,
        optimization: Optimization,
        checks: &mut ConstraintChecks,
    ) -> Result<UtilitySpace> {
        let p = self.position(var).ok_or_else(|| {
            DcopError::Inconsistent(format!("cannot project '{var}' out of {:?}", self.scope))
        })?;
        let strides = strides(&self.domains);
        let mut scope = self.scope.clone();
        let mut domains = self.domains.clone();
        scope.remove(p);
        domains.remove(p);
        let mut remaining_strides = strides.clone();
        remaining_strides.remove(p);

        let dims: Vec<usize> = domains.iter().map(Vec::len).collect();
        let mut utilities = Vec::with_capacity(entry_count(&domains)?);
        let mut indices = vec![0; dims.len()];
        loop {
            let base: usize = indices
                .iter()
                .zip(&remaining_strides)
                .map(|(i, s)| i * s)
                .sum();
            let best = (0..self.domains[p].len())
                .map(|j| self.utilities[base + j * strides[p]])
                .fold(optimization.infeasible(), |best, u| optimization.best(best, u));
            utilities.push(best);
            if !advance(&mut indices, &dims) {
                break;
            }
        }
        checks.add(self.size() as u64);
        UtilitySpace::new(scope, domains, utilities)
    }

    /// Fixes the scope variables present in `assignment`; variables outside
    /// the scope are ignored.
    pub fn slice(&self, assignment: &Assignment) -> Result<UtilitySpace> {
        let strides = strides(&self.domains);
        let mut base = 0;
        let mut scope = Vec::new();
        let mut domains = Vec::new();
        let mut free_strides = Vec::new();
        for (k, var) in self.scope.iter().enumerate() {
            match assignment.get(var) {
                Some(&value) => {
                    let index = self.domains[k].iter().position(|&v| v == value).ok_or_else(|| {
                        DcopError::Inconsistent(format!("value {value} not in the domain of '{var}'"))
                    })?;
                    base += index * strides[k];
                }
                None => {
                    scope.push(var.clone());
                    domains.push(self.domains[k].clone());
                    free_strides.push(strides[k]);
                }
            }
        }
        let dims: Vec<usize> = domains.iter().map(Vec::len).collect();
        let mut utilities = Vec::with_capacity(entry_count(&domains)?);
        let mut indices = vec![0; dims.len()];
        loop {
            let flat: usize = base
                + indices
                    .iter()
                    .zip(&free_strides)
                    .map(|(i, s)| i * s)
                    .sum::<usize>();
            utilities.push(self.utilities[flat]);
            if !advance(&mut indices, &dims) {
                break;
            }
        }
        UtilitySpace::new(scope, domains, utilities)
    }

    /// Chooses the value of `var` that is optimal given values for every
    /// other scope variable. Ties go to the earliest value in the domain.
    ///
    /// # Errors
    ///
    /// Returns an inconsistency error if `var` is not in scope or `context`
    /// lacks a matching entry for another scope variable.
    pub fn argopt(
        &self,
        var: &str,
        context: &Assignment,
        optimization: Optimization,
        checks: &mut ConstraintChecks,
    ) -> Result<(Value, Utility)> {
        let p = self.position(var).ok_or_else(|| {
            DcopError::Inconsistent(format!("'{var}' is not in the scope {:?}", self.scope))
        })?;
        let strides = strides(&self.domains);
        let mut base = 0;
        for (k, other) in self.scope.iter().enumerate() {
            if k == p {
                continue;
            }
            let value = context.get(other).ok_or_else(|| {
                DcopError::Inconsistent(format!("no value for separator variable '{other}'"))
            })?;
            let index = self.domains[k].iter().position(|v| v == value).ok_or_else(|| {
                DcopError::Inconsistent(format!("no entry for {other} = {value}"))
            })?;
            base += index * strides[k];
        }

        let domain = &self.domains[p];
        let mut best_value = domain[0];
        let mut best = self.utilities[base];
        for (j, &value) in domain.iter().enumerate().skip(1) {
            let u = self.utilities[base + j * strides[p]];
            if optimization.is_better(u, best) {
                best = u;
                best_value = value;
            }
        }
        checks.add(domain.len() as u64);
        Ok((best_value, best))
    }

    /// Returns true if both spaces have the same variables and domains and
    /// agree on every assignment within `tolerance`, whatever their scope
    /// order.
    pub fn equivalent(&self, other: &UtilitySpace, tolerance: f64) -> bool {
        if self.scope.len() != other.scope.len() {
            return false;
        }
        for (var, domain) in self.scope.iter().zip(&self.domains) {
            match other.domain_of(var) {
                Some(d) => {
                    let mine: BTreeSet<_> = domain.iter().collect();
                    let theirs: BTreeSet<_> = d.iter().collect();
                    if mine != theirs {
                        return false;
                    }
                }
                None => return false,
            }
        }
        let dims: Vec<usize> = self.domains.iter().map(Vec::len).collect();
        let mut indices = vec![0; dims.len()];
        let mut flat = 0;
        loop {
            let assignment: Assignment = self
                .scope
                .iter()
                .zip(&indices)
                .enumerate()
                .map(|(k, (var, &i))| (var.clone(), self.domains[k][i]))
                .collect();
            match other.utility_for(&assignment) {
                Some(u) if u.approx_eq(self.utilities[flat], tolerance) => {}
                _ => return false,
            }
            flat += 1;
            if !advance(&mut indices, &dims) {
                break;
            }
        }
        true
    }
}

/// Maps indices over a joined scope to flat indices of one operand.
struct Lookup {
    // (position in joined scope, joined index -> operand index, operand stride)
    axes: Vec<(usize, Vec<usize>, usize)>,
}

impl Lookup {
    fn new(space: &UtilitySpace, scope: &[String], domains: &[Vec<Value>]) -> Self {
        let strides = strides(&space.domains);
        let axes = space
            .scope
            .iter()
            .enumerate()
            .filter_map(|(k, var)| {
                let p = scope.iter().position(|v| v == var)?;
                let map = domains[p]
                    .iter()
                    .map(|value| space.domains[k].iter().position(|v| v == value).unwrap_or(0))
                    .collect();
                Some((p, map, strides[k]))
            })
            .collect();
        Lookup { axes }
    }

    fn flat(&self, indices: &[usize]) -> usize {
        self.axes
            .iter()
            .map(|(p, map, stride)| map[indices[*p]] * stride)
            .sum()
    }
}

fn entry_count(domains: &[Vec<Value>]) -> Result<usize> {
    domains.iter().try_fold(1usize, |acc, d| {
        acc.checked_mul(d.len())
            .ok_or_else(|| DcopError::Configuration("utility space is too large".to_string()))
    })
}

fn strides(domains: &[Vec<Value>]) -> Vec<usize> {
    let mut strides = vec![1; domains.len()];
    for k in (0..domains.len().saturating_sub(1)).rev() {
        strides[k] = strides[k + 1] * domains[k + 1].len();
    }
    strides
}

// Odometer step, last axis fastest. Returns false after the last index.
fn advance(indices: &mut [usize], dims: &[usize]) -> bool {
    for k in (0..indices.len()).rev() {
        indices[k] += 1;
        if indices[k] < dims[k] {
            return true;
        }
        indices[k] = 0;
    }
    false
}

#[cfg(test)]
mod tests;
