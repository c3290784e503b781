//! Per-invocation recursion context.

use crate::ids::{RecursionId, SessionId};

/// Context of one active reasoning invocation.
///
/// Built by the recursion controller, lives for the duration of one level,
/// and is discarded when the level returns. Depth is 0-indexed: the root
/// invocation runs at depth 0.
#[derive(Debug, Clone)]
pub struct LevelContext {
    pub depth: u32,
    pub max_depth: u32,
    pub model_id: String,
    pub sub_model_ids: Vec<String>,
    pub parent_recursion_id: Option<RecursionId>,
    pub recursion_id: RecursionId,
    pub session_id: Option<SessionId>,
    pub iteration: u32,
    pub hard_iteration_cap: u32,
}

impl LevelContext {
    /// Root-level context for a fresh request.
    pub fn root(
        model_id: impl Into<String>,
        sub_model_ids: Vec<String>,
        max_depth: u32,
        hard_iteration_cap: u32,
    ) -> Self {
        LevelContext {
            depth: 0,
            max_depth,
            model_id: model_id.into(),
            sub_model_ids,
            parent_recursion_id: None,
            recursion_id: RecursionId::generate(),
            session_id: None,
            iteration: 0,
            hard_iteration_cap,
        }
    }

    /// Context for a child invocation one level deeper. The child gets a
    /// fresh recursion id and records this level as its parent; the model
    /// is picked by depth from the sub-model list.
    pub fn child(&self) -> Self {
        let depth = self.depth + 1;
        LevelContext {
            depth,
            max_depth: self.max_depth,
            model_id: self.model_for_depth(depth),
            sub_model_ids: self.sub_model_ids.clone(),
            parent_recursion_id: Some(self.recursion_id.clone()),
            recursion_id: RecursionId::generate(),
            session_id: None,
            iteration: 0,
            hard_iteration_cap: self.hard_iteration_cap,
        }
    }

    /// Depth-indexed model selection. Depth 0 keeps the root model; depth
    /// k ≥ 1 uses `sub_model_ids[k - 1]`, clamped to the last entry when
    /// the list is shorter than the recursion is deep. An empty sub-model
    /// list falls back to the root model at every depth.
    pub fn model_for_depth(&self, depth: u32) -> String {
        if depth == 0 || self.sub_model_ids.is_empty() {
            return self.model_id.clone();
        }
        let index = (depth as usize - 1).min(self.sub_model_ids.len() - 1);
        self.sub_model_ids[index].clone()
    }

    /// Whether this level may offer the sub-reasoner tool. False exactly
    /// when one more level would reach `max_depth`.
    pub fn may_recurse(&self) -> bool {
        self.depth + 1 < self.max_depth
    }
}
