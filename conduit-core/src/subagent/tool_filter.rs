//! Tool inheritance for child sessions (SPEC_FULL.md §4.6). A child's tool
//! registry is the parent's, filtered by this policy — interactive tools
//! can be excluded from subagents by construction, independent of whatever
//! tools the parent happens to have registered.

use std::collections::HashSet;

/// Tools that can never be handed to a subagent regardless of policy:
/// spawning further subagents recursively is a depth-enforcement bypass.
pub const ALWAYS_BLOCKED_TOOLS: &[&str] = &["spawn_subagent", "task_output"];

#[derive(Debug, Clone)]
pub enum ToolAccess {
    InheritAll,
    Explicit(HashSet<String>),
}

#[derive(Debug, Clone)]
pub struct ToolFilter {
    access: ToolAccess,
    disallowed: HashSet<String>,
}

impl ToolFilter {
    pub fn inherit_all() -> Self {
        Self {
            access: ToolAccess::InheritAll,
            disallowed: HashSet::new(),
        }
    }

    pub fn explicit(tools: impl IntoIterator<Item = String>) -> Self {
        Self {
            access: ToolAccess::Explicit(tools.into_iter().collect()),
            disallowed: HashSet::new(),
        }
    }

    pub fn with_disallowed(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.disallowed.extend(tools);
        self
    }

    pub fn is_allowed(&self, tool_name: &str) -> bool {
        if ALWAYS_BLOCKED_TOOLS.contains(&tool_name) {
            return false;
        }
        if self.disallowed.contains(tool_name) {
            return false;
        }
        match &self.access {
            ToolAccess::InheritAll => true,
            ToolAccess::Explicit(set) => set.contains(tool_name),
        }
    }

    pub fn filter_tools<'a>(&self, tools: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
        tools.filter(|t| self.is_allowed(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_blocked_tools_are_rejected_even_with_inherit_all() {
        let filter = ToolFilter::inherit_all();
        assert!(!filter.is_allowed("spawn_subagent"));
    }

    #[test]
    fn explicit_access_only_allows_the_listed_tools() {
        let filter = ToolFilter::explicit(["read_file".to_string()]);
        assert!(filter.is_allowed("read_file"));
        assert!(!filter.is_allowed("write_file"));
    }

    #[test]
    fn disallowed_overrides_inherit_all() {
        let filter = ToolFilter::inherit_all().with_disallowed(["write_file".to_string()]);
        assert!(filter.is_allowed("read_file"));
        assert!(!filter.is_allowed("write_file"));
    }
}
