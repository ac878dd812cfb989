//! Per-query context: the plan-node arena, the symbol table, and the
//! metadata catalog handle. Plan nodes live here for the whole query;
//! groups in the optimizer only borrow them by id.

use std::sync::Arc;

use crate::meta::{MetaCatalog, SpaceId};
use crate::plan::{NodeDetail, PlanKind, PlanNode, PlanNodeId, ProjectDetail, YieldColumn};
use crate::symbols::SymbolTable;

const ANON_VAR_PREFIX: &str = "__UNAMED_VAR_";

/// Whether a variable name was minted by the anonymous generator.
pub fn is_anon_var(name: &str) -> bool {
    name.starts_with(ANON_VAR_PREFIX) || name.starts_with("__")
}

pub struct QueryContext {
    nodes: Vec<PlanNode>,
    symbols: SymbolTable,
    space: SpaceId,
    meta: Arc<dyn MetaCatalog>,
    anon_counter: u64,
}

fn dep_arity(kind: PlanKind) -> usize {
    match kind {
        PlanKind::Start | PlanKind::Argument => 0,
        PlanKind::HashInnerJoin | PlanKind::HashLeftJoin | PlanKind::CrossJoin => 2,
        _ => 1,
    }
}

fn input_arity(kind: PlanKind) -> usize {
    match kind {
        PlanKind::Start | PlanKind::Argument | PlanKind::ValueTable => 0,
        PlanKind::HashInnerJoin | PlanKind::HashLeftJoin | PlanKind::CrossJoin => 2,
        _ => 1,
    }
}

/// Relative unit cost per node kind. Leaf estimation proper belongs to the
/// planner; this table only has to order candidate realizations sensibly
/// (prefix scan < range scan < full scan, pushed-down shapes < original).
fn kind_weight(kind: PlanKind) -> f64 {
    match kind {
        PlanKind::Unknown => 0.0,
        PlanKind::Start | PlanKind::Argument | PlanKind::ValueTable => 0.0,
        PlanKind::Limit | PlanKind::Sample => 1.0,
        PlanKind::Project | PlanKind::Dedup | PlanKind::DataCollect | PlanKind::Select => 2.0,
        PlanKind::Filter | PlanKind::TopN => 3.0,
        PlanKind::Loop => 4.0,
        PlanKind::Sort => 6.0,
        PlanKind::HashInnerJoin | PlanKind::HashLeftJoin | PlanKind::CrossJoin => 8.0,
        PlanKind::GetVertices
        | PlanKind::GetEdges
        | PlanKind::GetDstBySrc
        | PlanKind::AppendVertices => 8.0,
        PlanKind::GetNeighbors | PlanKind::ExpandAll => 10.0,
        PlanKind::Traverse | PlanKind::BfsShortest => 12.0,
        PlanKind::MultiShortestPath => 14.0,
        PlanKind::AllPaths => 15.0,
        PlanKind::ScanVertices | PlanKind::ScanEdges => 20.0,
        PlanKind::IndexScan => 8.0,
        PlanKind::TagIndexPrefixScan | PlanKind::EdgeIndexPrefixScan => 5.0,
        PlanKind::TagIndexRangeScan | PlanKind::EdgeIndexRangeScan => 7.0,
        PlanKind::TagIndexFullScan | PlanKind::EdgeIndexFullScan => 15.0,
        PlanKind::FulltextIndexScan | PlanKind::VectorIndexScan => 8.0,
    }
}

impl QueryContext {
    pub fn new(space: SpaceId, meta: Arc<dyn MetaCatalog>) -> Self {
        QueryContext {
            nodes: Vec::new(),
            symbols: SymbolTable::new(),
            space,
            meta,
            anon_counter: 0,
        }
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn meta(&self) -> &Arc<dyn MetaCatalog> {
        &self.meta
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn plan_node(&self, id: PlanNodeId) -> &PlanNode {
        &self.nodes[id.0 as usize]
    }

    pub fn plan_node_mut(&mut self, id: PlanNodeId) -> &mut PlanNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn num_plan_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn anon_var(&mut self) -> String {
        self.anon_counter += 1;
        format!("{}{}", ANON_VAR_PREFIX, self.anon_counter)
    }

    /// Create a node of `kind`. Unwired input slots stay `None` until a
    /// caller fills them; column names default to the first input's.
    pub fn make_node(
        &mut self,
        kind: PlanKind,
        detail: NodeDetail,
        inputs: &[Option<PlanNodeId>],
    ) -> PlanNodeId {
        debug_assert_eq!(inputs.len(), dep_arity(kind), "bad input count for {kind}");
        let id = PlanNodeId(self.nodes.len() as i64);
        let output_var = format!("__{}_{}", kind, id.0);

        let n_inputs = input_arity(kind);
        let mut input_vars = vec![String::new(); n_inputs];
        let mut cost = kind_weight(kind);
        for (i, input) in inputs.iter().enumerate() {
            if let Some(dep) = input {
                let dep_node = self.plan_node(*dep);
                cost += dep_node.cost();
                if i < n_inputs {
                    input_vars[i] = dep_node.output_var().to_owned();
                }
            }
        }

        let col_names = input_vars
            .first()
            .filter(|v| !v.is_empty())
            .and_then(|v| self.symbols.get_var(v))
            .map(|v| v.col_names.clone())
            .unwrap_or_default();

        let node = PlanNode {
            id,
            kind,
            detail,
            deps: inputs.to_vec(),
            input_vars,
            output_var: output_var.clone(),
            cost,
        };
        self.nodes.push(node);

        let var = self.symbols.new_var(output_var.clone());
        var.col_names = col_names;
        self.symbols.written_by(&output_var, id);
        self.update_symbols(id);
        id
    }

    /// Fresh copy of a node: new id, new output variable (column names
    /// copied). Call [`set_output_var`](Self::set_output_var) afterwards to
    /// reclaim the original variable.
    pub fn clone_plan_node(&mut self, src: PlanNodeId) -> PlanNodeId {
        let src_node = self.plan_node(src).clone();
        let id = PlanNodeId(self.nodes.len() as i64);
        let output_var = format!("__{}_{}", src_node.kind(), id.0);

        let col_names = self
            .symbols
            .get_var(src_node.output_var())
            .map(|v| v.col_names.clone())
            .unwrap_or_default();

        let node = PlanNode {
            id,
            output_var: output_var.clone(),
            ..src_node
        };
        self.nodes.push(node);

        let var = self.symbols.new_var(output_var.clone());
        var.col_names = col_names;
        self.symbols.written_by(&output_var, id);
        self.update_symbols(id);
        id
    }

    /// Clone a node into a different kind of the same payload family,
    /// e.g. specializing a full index scan into a prefix scan.
    pub fn clone_plan_node_with_kind(&mut self, src: PlanNodeId, kind: PlanKind) -> PlanNodeId {
        let id = self.clone_plan_node(src);
        self.plan_node_mut(id).kind = kind;
        id
    }

    pub fn col_names(&self, id: PlanNodeId) -> &[String] {
        self.symbols
            .get_var(self.plan_node(id).output_var())
            .map(|v| v.col_names.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_col_names(&mut self, id: PlanNodeId, names: Vec<String>) {
        let var = self.plan_node(id).output_var().to_owned();
        if let Some(v) = self.symbols.get_var_mut(&var) {
            v.col_names = names;
        }
    }

    pub fn var_col_names(&self, var: &str) -> &[String] {
        self.symbols
            .get_var(var)
            .map(|v| v.col_names.as_slice())
            .unwrap_or(&[])
    }

    /// Point the node's output at an existing variable.
    pub fn set_output_var(&mut self, id: PlanNodeId, var: &str) {
        let old = self.plan_node(id).output_var().to_owned();
        if old == var {
            return;
        }
        self.symbols.delete_written_by(&old, id);
        self.symbols.new_var(var.to_owned());
        self.symbols.written_by(var, id);
        self.plan_node_mut(id).output_var = var.to_owned();
    }

    pub fn set_input_var_at(&mut self, id: PlanNodeId, i: usize, var: &str) {
        let old = self.plan_node(id).input_var(i).unwrap_or("").to_owned();
        if !old.is_empty() {
            self.symbols.delete_read_by(&old, id);
        }
        self.symbols.read_by(var, id);
        self.plan_node_mut(id).input_vars[i] = var.to_owned();
    }

    pub fn set_input_var(&mut self, id: PlanNodeId, var: &str) {
        self.set_input_var_at(id, 0, var);
    }

    /// Register this node as a reader of all its input variables.
    pub fn update_symbols(&mut self, id: PlanNodeId) {
        let input_vars = self.plan_node(id).input_vars().to_vec();
        for var in input_vars {
            if !var.is_empty() {
                self.symbols.read_by(&var, id);
            }
        }
    }

    /// Drop this node's symbol edges; called when a memo candidate is
    /// released.
    pub fn release_symbols(&mut self, id: PlanNodeId) {
        let node = self.plan_node(id);
        let output = node.output_var().to_owned();
        let input_vars = node.input_vars().to_vec();
        for var in input_vars {
            if !var.is_empty() {
                self.symbols.delete_read_by(&var, id);
            }
        }
        self.symbols.delete_written_by(&output, id);
    }

    // Convenience constructors for the node shapes rules build from
    // scratch; everything else goes through `clone_plan_node`.

    pub fn make_start(&mut self) -> PlanNodeId {
        self.make_node(PlanKind::Start, NodeDetail::Start, &[])
    }

    pub fn make_argument(&mut self) -> PlanNodeId {
        self.make_node(PlanKind::Argument, NodeDetail::Argument, &[])
    }

    pub fn make_value_table(
        &mut self,
        input: Option<PlanNodeId>,
        col_names: Vec<String>,
    ) -> PlanNodeId {
        let id = self.make_node(
            PlanKind::ValueTable,
            NodeDetail::ValueTable { rows: vec![] },
            &[input],
        );
        self.set_col_names(id, col_names);
        id
    }

    pub fn make_filter(
        &mut self,
        input: Option<PlanNodeId>,
        condition: crate::expr::ExprRef,
    ) -> PlanNodeId {
        self.make_node(
            PlanKind::Filter,
            NodeDetail::Filter(crate::plan::FilterDetail {
                condition,
                always_false: false,
            }),
            &[input],
        )
    }

    pub fn make_project(
        &mut self,
        input: Option<PlanNodeId>,
        columns: Vec<YieldColumn>,
    ) -> PlanNodeId {
        let col_names: Vec<String> = columns.iter().map(|c| c.alias.clone()).collect();
        let id = self.make_node(
            PlanKind::Project,
            NodeDetail::Project(ProjectDetail { columns }),
            &[input],
        );
        self.set_col_names(id, col_names);
        id
    }

    pub fn make_limit(
        &mut self,
        input: Option<PlanNodeId>,
        offset: i64,
        count: i64,
    ) -> PlanNodeId {
        self.make_node(PlanKind::Limit, NodeDetail::Limit { offset, count }, &[input])
    }

    pub fn make_topn(
        &mut self,
        input: Option<PlanNodeId>,
        factors: Vec<crate::plan::SortFactor>,
        offset: i64,
        count: i64,
    ) -> PlanNodeId {
        self.make_node(
            PlanKind::TopN,
            NodeDetail::TopN {
                factors,
                offset,
                count,
            },
            &[input],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::meta::MemoryCatalog;
    use pretty_assertions::assert_eq;

    fn qctx() -> QueryContext {
        QueryContext::new(1, Arc::new(MemoryCatalog::new()))
    }

    #[test]
    fn make_node_wires_symbols() {
        let mut q = qctx();
        let start = q.make_start();
        let filter = q.make_filter(Some(start), Expr::constant(true));

        let filter_node = q.plan_node(filter);
        assert_eq!(filter_node.input_var(0), Some(q.plan_node(start).output_var()));
        let start_var = q.symbols().get_var(q.plan_node(start).output_var()).unwrap();
        assert!(start_var.read_by.contains(&filter));
    }

    #[test]
    fn clone_gets_fresh_output_var() {
        let mut q = qctx();
        let start = q.make_start();
        let filter = q.make_filter(Some(start), Expr::constant(true));
        q.set_col_names(filter, vec!["a".into(), "b".into()]);

        let cloned = q.clone_plan_node(filter);
        assert_ne!(q.plan_node(cloned).output_var(), q.plan_node(filter).output_var());
        assert_eq!(q.col_names(cloned), q.col_names(filter));

        q.set_output_var(cloned, &q.plan_node(filter).output_var().to_owned());
        assert_eq!(q.plan_node(cloned).output_var(), q.plan_node(filter).output_var());
    }

    #[test]
    fn project_col_names_follow_aliases() {
        let mut q = qctx();
        let start = q.make_start();
        let proj = q.make_project(
            Some(start),
            vec![
                YieldColumn::new(Expr::input_prop("x"), "a"),
                YieldColumn::new(Expr::input_prop("y"), "b"),
            ],
        );
        assert_eq!(q.col_names(proj), ["a", "b"]);
    }
}
