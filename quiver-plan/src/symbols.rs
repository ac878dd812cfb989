//! Symbol table: every plan node writes one output variable and reads the
//! variables of its inputs. The optimizer leans on the `read_by` edges to
//! prove a rewrite does not break a dataset some other node consumes.

use std::collections::{HashMap, HashSet};

use crate::plan::PlanNodeId;

#[derive(Debug, Clone, Default)]
pub struct Variable {
    pub name: String,
    pub col_names: Vec<String>,
    pub read_by: HashSet<PlanNodeId>,
    pub written_by: HashSet<PlanNodeId>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: HashMap<String, Variable>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_var(&mut self, name: impl Into<String>) -> &mut Variable {
        let name = name.into();
        self.vars.entry(name.clone()).or_insert_with(|| Variable {
            name,
            ..Default::default()
        })
    }

    pub fn get_var(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn get_var_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.vars.get_mut(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn read_by(&mut self, var: &str, node: PlanNodeId) {
        if let Some(v) = self.vars.get_mut(var) {
            v.read_by.insert(node);
        }
    }

    pub fn written_by(&mut self, var: &str, node: PlanNodeId) {
        if let Some(v) = self.vars.get_mut(var) {
            v.written_by.insert(node);
        }
    }

    pub fn delete_read_by(&mut self, var: &str, node: PlanNodeId) {
        if let Some(v) = self.vars.get_mut(var) {
            v.read_by.remove(&node);
        }
    }

    pub fn delete_written_by(&mut self, var: &str, node: PlanNodeId) {
        if let Some(v) = self.vars.get_mut(var) {
            v.written_by.remove(&node);
        }
    }
}
