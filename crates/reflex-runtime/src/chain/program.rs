//! The compiled, immutable form of a trigger body.

use super::statement::{Condition, Effect, SectionKind, Statement};
use std::fmt;
use std::sync::Arc;

/// Index of a node inside one [`Chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the arena index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) enum Node {
    Effect {
        action: Arc<dyn Effect>,
        next: Option<NodeId>,
        parent: Option<NodeId>,
    },
    Gated {
        condition: Arc<dyn Condition>,
        action: NodeId,
        next: Option<NodeId>,
        parent: Option<NodeId>,
    },
    /// Target of a gate. Has no `next`; the gate pushes the resume point.
    Action {
        action: Arc<dyn Effect>,
        parent: Option<NodeId>,
    },
    Section {
        kind: SectionKind,
        body: Option<NodeId>,
        next: Option<NodeId>,
        parent: Option<NodeId>,
    },
}

impl Node {
    pub(crate) fn parent(&self) -> Option<NodeId> {
        match self {
            Self::Effect { parent, .. }
            | Self::Gated { parent, .. }
            | Self::Action { parent, .. }
            | Self::Section { parent, .. } => *parent,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Effect { .. } => "effect",
            Self::Gated { .. } => "gate",
            Self::Action { .. } => "gated action",
            Self::Section {
                kind: SectionKind::Loop(_),
                ..
            } => "loop",
            Self::Section {
                kind: SectionKind::Conditional(_),
                ..
            } => "conditional",
        }
    }

    fn is_loop(&self) -> bool {
        matches!(
            self,
            Self::Section {
                kind: SectionKind::Loop(_),
                ..
            }
        )
    }

    fn set_next(&mut self, id: NodeId) {
        match self {
            Self::Effect { next, .. } | Self::Gated { next, .. } | Self::Section { next, .. } => {
                *next = Some(id);
            }
            Self::Action { .. } => {}
        }
    }
}

/// An immutable statement graph shared by every invocation of a trigger.
///
/// Nodes live in an arena and link to each other by [`NodeId`]: `next`
/// within a body, `parent` back to the enclosing section. Nothing is
/// mutated at run time, so one chain serves concurrent invocations.
///
/// ```text
/// [0 effect] ─next─► [1 loop] ─next─► (end)
///                      │body
///                      ▼
///                    [2 effect]  (parent = 1)
/// ```
pub struct Chain {
    nodes: Vec<Node>,
    entry: Option<NodeId>,
}

impl Chain {
    /// Compiles statements into a chain.
    #[must_use]
    pub fn compile(statements: Vec<Statement>) -> Self {
        let mut nodes = Vec::new();
        let entry = lay_out(&mut nodes, statements, None);
        Self { nodes, entry }
    }

    /// A chain that does nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            entry: None,
        }
    }

    /// The first node, or `None` for an empty chain.
    #[must_use]
    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    /// Number of nodes, counting gated actions separately.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the chain has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The enclosing section of `id`, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(Node::parent)
    }

    /// The nearest loop section at or above `id`.
    #[must_use]
    pub fn enclosing_loop(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.nodes.get(current.0)?;
            if node.is_loop() {
                return Some(current);
            }
            cursor = node.parent();
        }
        None
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<_> = self.nodes.iter().map(Node::kind_name).collect();
        f.debug_struct("Chain")
            .field("entry", &self.entry)
            .field("nodes", &kinds)
            .finish()
    }
}

/// Appends `statements` to the arena as one linked body; returns its head.
fn lay_out(
    nodes: &mut Vec<Node>,
    statements: Vec<Statement>,
    parent: Option<NodeId>,
) -> Option<NodeId> {
    let mut heads = Vec::with_capacity(statements.len());

    for statement in statements {
        let id = NodeId(nodes.len());
        match statement {
            Statement::Effect(action) => nodes.push(Node::Effect {
                action,
                next: None,
                parent,
            }),
            Statement::Gated { condition, action } => {
                nodes.push(Node::Gated {
                    condition,
                    action: NodeId(id.0 + 1),
                    next: None,
                    parent,
                });
                nodes.push(Node::Action { action, parent });
            }
            Statement::Section { kind, body } => {
                nodes.push(Node::Section {
                    kind,
                    body: None,
                    next: None,
                    parent,
                });
                let head = lay_out(nodes, body, Some(id));
                if let Node::Section { body, .. } = &mut nodes[id.0] {
                    *body = head;
                }
            }
        }
        heads.push(id);
    }

    for pair in heads.windows(2) {
        nodes[pair[0].0].set_next(pair[1]);
    }
    heads.first().copied()
}
