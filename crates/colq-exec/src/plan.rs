//! EXPLAIN plan trees for operator factories.
//!
//! Each factory describes itself into a [`PlanSink`]: a node type, a list of
//! `name: value` attributes and its children, optionally labeled. The result
//! is a [`PlanNode`] tree that renders as indented text, flattens into
//! id/parent rows, or serializes as JSON.
//!
//! Text layout: attributes two spaces under their node, children four; a
//! labeled child prints its label at the child indent and its subtree four
//! further in.

use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::cursor::RecordCursorFactory;

// ---------------------------------------------------------------------------
// Plan tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanAttr {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanChild {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub node: PlanNode,
}

/// One operator in an EXPLAIN tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<PlanAttr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanChild>,
}

impl PlanNode {
    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Child node by label.
    pub fn labeled_child(&self, label: &str) -> Option<&Self> {
        self.children
            .iter()
            .find(|c| c.label.as_deref() == Some(label))
            .map(|c| &c.node)
    }

    /// Indented text form.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        let _ = writeln!(out, "{:indent$}{}", "", self.node_type);
        for attr in &self.attrs {
            let _ = writeln!(out, "{:width$}{}: {}", "", attr.name, attr.value, width = indent + 2);
        }
        for child in &self.children {
            match &child.label {
                Some(label) => {
                    let _ = writeln!(out, "{:width$}{label}", "", width = indent + 4);
                    child.node.render_into(out, indent + 8);
                }
                None => child.node.render_into(out, indent + 4),
            }
        }
    }

    /// Flatten into id/parent rows, depth first. Ids start at 1; roots have
    /// parent 0. A labeled child gets a row of its own for the label.
    #[must_use]
    pub fn to_rows(&self) -> Vec<PlanRow> {
        let mut rows = Vec::new();
        let mut next_id = 1_i32;
        self.push_rows(&mut rows, &mut next_id, 0);
        rows
    }

    fn push_rows(&self, rows: &mut Vec<PlanRow>, next_id: &mut i32, parent: i32) {
        let id = *next_id;
        *next_id += 1;
        let mut detail = self.node_type.clone();
        if !self.attrs.is_empty() {
            detail.push_str(" (");
            for (i, attr) in self.attrs.iter().enumerate() {
                if i > 0 {
                    detail.push_str(", ");
                }
                let _ = write!(detail, "{}: {}", attr.name, attr.value);
            }
            detail.push(')');
        }
        rows.push(PlanRow { id, parent, detail });

        for child in &self.children {
            match &child.label {
                Some(label) => {
                    let label_id = *next_id;
                    *next_id += 1;
                    rows.push(PlanRow {
                        id: label_id,
                        parent: id,
                        detail: label.clone(),
                    });
                    child.node.push_rows(rows, next_id, label_id);
                }
                None => child.node.push_rows(rows, next_id, id),
            }
        }
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One row of the flattened plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanRow {
    pub id: i32,
    pub parent: i32,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Collects one node's description from [`RecordCursorFactory::to_plan`].
#[derive(Debug, Default)]
pub struct PlanSink {
    node: PlanNode,
}

impl PlanSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_type(&mut self, node_type: impl Into<String>) -> &mut Self {
        self.node.node_type = node_type.into();
        self
    }

    pub fn attr(&mut self, name: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        self.node.attrs.push(PlanAttr {
            name: name.into(),
            value: value.to_string(),
        });
        self
    }

    /// Describe `factory` as an unlabeled child.
    pub fn child(&mut self, factory: &dyn RecordCursorFactory) -> &mut Self {
        self.node.children.push(PlanChild {
            label: None,
            node: explain(factory),
        });
        self
    }

    /// Describe `factory` as a child under `label`.
    pub fn child_labeled(
        &mut self,
        label: impl Into<String>,
        factory: &dyn RecordCursorFactory,
    ) -> &mut Self {
        self.node.children.push(PlanChild {
            label: Some(label.into()),
            node: explain(factory),
        });
        self
    }

    #[must_use]
    pub fn finish(self) -> PlanNode {
        self.node
    }
}

/// Plan tree of `factory` and everything under it.
#[must_use]
pub fn explain(factory: &dyn RecordCursorFactory) -> PlanNode {
    let mut sink = PlanSink::new();
    factory.to_plan(&mut sink);
    sink.finish()
}

// ---------------------------------------------------------------------------
// Join condition
// ---------------------------------------------------------------------------

/// Equality condition of a join, kept for EXPLAIN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinContext {
    pub master_alias: String,
    pub slave_alias: String,
    /// `(master column, slave column)` pairs.
    pub keys: Vec<(String, String)>,
}

impl JoinContext {
    pub fn new(master_alias: impl Into<String>, slave_alias: impl Into<String>) -> Self {
        Self {
            master_alias: master_alias.into(),
            slave_alias: slave_alias.into(),
            keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_key(mut self, master_column: impl Into<String>, slave_column: impl Into<String>) -> Self {
        self.keys.push((master_column.into(), slave_column.into()));
        self
    }
}

impl fmt::Display for JoinContext {
    /// `slave.col=master.col`, joined with ` and `.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (master, slave)) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{}.{slave}={}.{master}", self.slave_alias, self.master_alias)?;
        }
        Ok(())
    }
}
