//! Bootstrap plan: a fixed launch order over service units.

use crate::error::{Error, Result};
use crate::unit::ServiceUnit;
use std::collections::{BTreeSet, HashMap};

/// Units in the order they will be launched.
///
/// The order respects every `depends_on` edge; among units whose
/// dependencies are satisfied, declaration order decides.
#[derive(Debug, Clone)]
pub struct BootstrapPlan {
    units: Vec<ServiceUnit>,
}

impl BootstrapPlan {
    /// Validate the units and compute the launch order.
    pub fn new(units: Vec<ServiceUnit>) -> Result<Self> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, unit) in units.iter().enumerate() {
            if index.insert(unit.name.as_str(), i).is_some() {
                return Err(Error::DuplicateUnit(unit.name.clone()));
            }
        }

        let mut in_degree = vec![0usize; units.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];

        for (i, unit) in units.iter().enumerate() {
            for dep in &unit.depends_on {
                let &j = index.get(dep.as_str()).ok_or_else(|| Error::DependencyError {
                    unit: unit.name.clone(),
                    dependency: dep.clone(),
                    reason: "unknown unit".to_string(),
                })?;
                dependents[j].push(i);
                in_degree[i] += 1;
            }
        }

        drop(index);

        // Kahn's algorithm, always taking the earliest declared ready unit
        let mut ready: BTreeSet<usize> = (0..units.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(units.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != units.len() {
            let cycle = units
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, u)| u.name.clone())
                .collect();
            return Err(Error::CircularDependency(cycle));
        }

        let mut slots: Vec<Option<ServiceUnit>> = units.into_iter().map(Some).collect();
        let units = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        Ok(Self { units })
    }

    /// Units in launch order.
    pub fn units(&self) -> &[ServiceUnit] {
        &self.units
    }

    /// Unit names in launch order.
    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
