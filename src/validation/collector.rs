//! Hierarchical validation results
//!
//! Every node owns its messages and its children. Parallel validation builds
//! detached nodes and hands them to the parent with [`adopt`], so there is no
//! shared mutable state between workers.
//!
//! [`adopt`]: ValidationResultCollector::adopt

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Severity of a message or of a whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One node of the result tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResultCollector {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    info: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warning: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    error: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<ValidationResultCollector>,
}

impl ValidationResultCollector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_info(&mut self, message: impl Into<String>) -> &mut Self {
        self.info.push(message.into());
        self
    }

    pub fn add_warning(&mut self, message: impl Into<String>) -> &mut Self {
        self.warning.push(message.into());
        self
    }

    pub fn add_error(&mut self, message: impl Into<String>) -> &mut Self {
        self.error.push(message.into());
        self
    }

    pub fn info(&self) -> &[String] {
        &self.info
    }

    pub fn warnings(&self) -> &[String] {
        &self.warning
    }

    pub fn errors(&self) -> &[String] {
        &self.error
    }

    pub fn children(&self) -> &[ValidationResultCollector] {
        &self.children
    }

    /// Child with the given name, created on first use.
    pub fn child(&mut self, name: &str) -> &mut Self {
        let index = match self.children.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.children.push(Self::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    /// Look up a direct child by name.
    pub fn find_child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Attach a detached node. A node whose name already exists is merged
    /// into the existing child.
    pub fn adopt(&mut self, node: Self) {
        match self.children.iter_mut().find(|c| c.name == node.name) {
            Some(existing) => existing.merge(node),
            None => self.children.push(node),
        }
    }

    fn merge(&mut self, other: Self) {
        self.info.extend(other.info);
        self.warning.extend(other.warning);
        self.error.extend(other.error);
        for child in other.children {
            self.adopt(child);
        }
    }

    /// Whether this node or any descendant recorded an error.
    pub fn has_errors(&self) -> bool {
        !self.error.is_empty() || self.children.iter().any(Self::has_errors)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warning.is_empty() || self.children.iter().any(Self::has_warnings)
    }

    /// Total errors in this subtree.
    pub fn error_count(&self) -> usize {
        self.error.len() + self.children.iter().map(Self::error_count).sum::<usize>()
    }

    pub fn warning_count(&self) -> usize {
        self.warning.len() + self.children.iter().map(Self::warning_count).sum::<usize>()
    }

    /// Highest severity recorded anywhere in the subtree.
    pub fn severity(&self) -> Severity {
        if self.has_errors() {
            Severity::Error
        } else if self.has_warnings() {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    /// Passing means no error anywhere in the tree.
    pub fn is_passing(&self) -> bool {
        !self.has_errors()
    }

    /// Indented, human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = writeln!(out, "{}{}", indent, self.name);
        for message in &self.error {
            let _ = writeln!(out, "{}  ERROR   {}", indent, message);
        }
        for message in &self.warning {
            let _ = writeln!(out, "{}  WARNING {}", indent, message);
        }
        for message in &self.info {
            let _ = writeln!(out, "{}  INFO    {}", indent, message);
        }
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}
