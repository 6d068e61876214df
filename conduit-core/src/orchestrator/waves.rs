//! Partitions one assistant message's tool-use blocks into execution waves
//! (SPEC_FULL.md §4.5). Tools in the same serialization group never share a
//! wave; everything else runs in the first wave that has room.

use std::collections::HashMap;

use crate::tool::ExecutionMode;

#[derive(Debug, Clone)]
pub struct PendingToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub execution_mode: ExecutionMode,
}

pub fn build_waves(calls: Vec<PendingToolCall>) -> Vec<Vec<PendingToolCall>> {
    let mut waves: Vec<Vec<PendingToolCall>> = Vec::new();
    let mut group_last_wave: HashMap<u32, usize> = HashMap::new();

    for call in calls {
        let wave_index = match call.execution_mode {
            ExecutionMode::Parallel if waves.is_empty() => 0,
            ExecutionMode::Parallel => waves.len() - 1,
            ExecutionMode::Serialized(group) => match group_last_wave.get(&group) {
                Some(&last) => last + 1,
                None => 0,
            },
        };

        if wave_index == waves.len() {
            waves.push(Vec::new());
        }
        if let ExecutionMode::Serialized(group) = call.execution_mode {
            group_last_wave.insert(group, wave_index);
        }
        waves[wave_index].push(call);
    }

    waves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, mode: ExecutionMode) -> PendingToolCall {
        PendingToolCall {
            tool_call_id: id.to_string(),
            tool_name: "t".to_string(),
            arguments: serde_json::json!({}),
            execution_mode: mode,
        }
    }

    #[test]
    fn parallel_calls_all_land_in_one_wave() {
        let waves = build_waves(vec![
            call("a", ExecutionMode::Parallel),
            call("b", ExecutionMode::Parallel),
            call("c", ExecutionMode::Parallel),
        ]);
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].len(), 3);
    }

    #[test]
    fn same_group_calls_spread_across_successive_waves() {
        let waves = build_waves(vec![
            call("a", ExecutionMode::Serialized(1)),
            call("b", ExecutionMode::Serialized(1)),
            call("c", ExecutionMode::Serialized(1)),
        ]);
        assert_eq!(waves.len(), 3);
        for wave in &waves {
            assert_eq!(wave.len(), 1);
        }
    }

    #[test]
    fn distinct_groups_can_share_a_wave() {
        let waves = build_waves(vec![
            call("a", ExecutionMode::Serialized(1)),
            call("b", ExecutionMode::Serialized(2)),
        ]);
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].len(), 2);
    }

    #[test]
    fn mixing_parallel_and_serialized_keeps_the_group_constraint() {
        let waves = build_waves(vec![
            call("a", ExecutionMode::Serialized(1)),
            call("b", ExecutionMode::Parallel),
            call("c", ExecutionMode::Serialized(1)),
        ]);
        assert_eq!(waves.len(), 2);
        assert!(waves[0].iter().any(|c| c.tool_call_id == "a"));
        assert!(waves[1].iter().any(|c| c.tool_call_id == "c"));
    }
}
