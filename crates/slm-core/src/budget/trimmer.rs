//! History trimming with budget enforcement.
//!
//! Selects the turns to submit for a generation call:
//! 1. A leading system turn is always kept and paid for first
//! 2. Remaining turns are taken from the most recent end until the budget is full
//! 3. Older turns are dropped as a contiguous prefix, order is never changed
//!
//! When even the most recent turn cannot fit, the result is that turn alone
//! and `overflow` is set so the caller can warn the user.

use crate::conversation::{Role, Turn};

/// Turns selected for a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimResult {
    /// Selected turns in their original order
    pub turns: Vec<Turn>,
    /// Sum of the selected turns' token estimates
    pub total_tokens: u32,
    /// Number of input turns left out
    pub dropped: usize,
    /// The most recent turn alone exceeds the budget
    pub overflow: bool,
}

impl TrimResult {
    fn empty() -> Self {
        Self {
            turns: Vec::new(),
            total_tokens: 0,
            dropped: 0,
            overflow: false,
        }
    }

    /// Whether the untrimmed history fit the budget as-is.
    pub fn fit_without_trimming(&self) -> bool {
        self.dropped == 0 && !self.overflow
    }
}

/// Trim `turns` to fit `budget` tokens.
///
/// Deterministic and infallible: the same turns and budget always produce the
/// same selection.
pub fn trim(turns: &[Turn], budget: u32) -> TrimResult {
    let Some(latest) = turns.last() else {
        return TrimResult::empty();
    };

    let (system, history) = match turns.split_first() {
        Some((head, rest)) if head.role == Role::System => (Some(head), rest),
        _ => (None, turns),
    };
    let system_tokens = system.map_or(0, |turn| turn.token_count);

    let Some(remaining) = budget.checked_sub(system_tokens) else {
        return overflow(turns, latest, budget);
    };

    if history.is_empty() {
        // Only the system turn, and it fits
        return TrimResult {
            turns: turns.to_vec(),
            total_tokens: system_tokens,
            dropped: 0,
            overflow: false,
        };
    }

    if latest.token_count > remaining {
        return overflow(turns, latest, budget);
    }

    let mut used: u32 = 0;
    let mut start = history.len();
    for (index, turn) in history.iter().enumerate().rev() {
        let next = used.saturating_add(turn.token_count);
        if next > remaining {
            break;
        }
        used = next;
        start = index;
    }

    let mut selected = Vec::with_capacity(history.len() - start + 1);
    if let Some(system) = system {
        selected.push(system.clone());
    }
    selected.extend_from_slice(&history[start..]);

    if start > 0 {
        tracing::debug!(
            "Trimmed {} of {} turns to fit budget of {} tokens",
            start,
            turns.len(),
            budget
        );
    }

    TrimResult {
        turns: selected,
        total_tokens: system_tokens.saturating_add(used),
        dropped: start,
        overflow: false,
    }
}

fn overflow(turns: &[Turn], latest: &Turn, budget: u32) -> TrimResult {
    tracing::warn!(
        "Most recent turn ({tokens} tokens) does not fit budget ({budget} tokens), sending it alone",
        tokens = latest.token_count,
        budget = budget
    );
    TrimResult {
        turns: vec![latest.clone()],
        total_tokens: latest.token_count,
        dropped: turns.len() - 1,
        overflow: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn_with_tokens(role: Role, content: &str, tokens: u32) -> Turn {
        Turn {
            token_count: tokens,
            ..Turn::new(role, content)
        }
    }

    fn alternating(count: usize, tokens: u32) -> Vec<Turn> {
        (0..count)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                turn_with_tokens(role, &format!("turn {}", i), tokens)
            })
            .collect()
    }

    fn contents(result: &TrimResult) -> Vec<&str> {
        result.turns.iter().map(|turn| turn.content.as_str()).collect()
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let result = trim(&[], 100);
        assert!(result.turns.is_empty());
        assert!(!result.overflow);
        assert!(result.fit_without_trimming());
    }

    #[test]
    fn returns_all_turns_when_within_budget() {
        let turns = alternating(4, 10);
        let result = trim(&turns, 40);

        assert_eq!(result.turns, turns);
        assert_eq!(result.total_tokens, 40);
        assert!(result.fit_without_trimming());
    }

    #[test]
    fn ten_turns_of_fifty_with_budget_120_keep_last_two() {
        let turns = alternating(10, 50);
        let result = trim(&turns, 120);

        assert_eq!(contents(&result), vec!["turn 8", "turn 9"]);
        assert_eq!(result.total_tokens, 100);
        assert_eq!(result.dropped, 8);
        assert!(!result.overflow);
        assert!(!result.fit_without_trimming());
    }

    #[test]
    fn always_includes_leading_system_turn() {
        let mut turns = vec![turn_with_tokens(Role::System, "system", 30)];
        turns.extend(alternating(6, 20));

        let result = trim(&turns, 75);

        // 75 - 30 = 45 left, which fits two 20-token turns
        assert_eq!(contents(&result), vec!["system", "turn 4", "turn 5"]);
        assert_eq!(result.total_tokens, 70);
        assert_eq!(result.dropped, 4);
    }

    #[test]
    fn system_only_history_is_kept() {
        let turns = vec![turn_with_tokens(Role::System, "system", 10)];
        let result = trim(&turns, 10);
        assert_eq!(result.turns, turns);
        assert!(!result.overflow);
    }

    #[test]
    fn oversized_latest_turn_is_returned_alone() {
        let mut turns = alternating(3, 5);
        turns.push(turn_with_tokens(Role::User, "huge", 500));

        let result = trim(&turns, 100);

        assert_eq!(contents(&result), vec!["huge"]);
        assert!(result.overflow);
        assert_eq!(result.dropped, 3);
        assert_eq!(result.total_tokens, 500);
    }

    #[test]
    fn latest_turn_that_only_fits_without_system_overflows() {
        let turns = vec![
            turn_with_tokens(Role::System, "system", 60),
            turn_with_tokens(Role::User, "question", 50),
        ];

        let result = trim(&turns, 100);

        assert_eq!(contents(&result), vec!["question"]);
        assert!(result.overflow);
    }

    #[test]
    fn oversized_system_turn_overflows_to_latest() {
        let turns = vec![
            turn_with_tokens(Role::System, "system", 200),
            turn_with_tokens(Role::User, "question", 5),
        ];

        let result = trim(&turns, 100);

        assert_eq!(contents(&result), vec!["question"]);
        assert!(result.overflow);
    }

    #[test]
    fn oversized_lone_system_turn_is_returned_with_overflow() {
        let turns = vec![turn_with_tokens(Role::System, "system", 200)];
        let result = trim(&turns, 100);
        assert_eq!(contents(&result), vec!["system"]);
        assert!(result.overflow);
        assert_eq!(result.dropped, 0);
    }

    #[test]
    fn zero_budget_never_returns_empty() {
        let turns = alternating(3, 1);
        let result = trim(&turns, 0);
        assert_eq!(contents(&result), vec!["turn 2"]);
        assert!(result.overflow);
    }

    #[test]
    fn stops_at_first_turn_that_does_not_fit() {
        // Never skips an old large turn to pick up an even older small one
        let turns = vec![
            turn_with_tokens(Role::User, "old small", 1),
            turn_with_tokens(Role::Assistant, "middle large", 90),
            turn_with_tokens(Role::User, "recent", 20),
        ];

        let result = trim(&turns, 50);

        assert_eq!(contents(&result), vec!["recent"]);
        assert_eq!(result.dropped, 2);
    }

    #[test]
    fn system_turn_not_at_head_is_treated_as_history() {
        let turns = vec![
            turn_with_tokens(Role::User, "first", 10),
            turn_with_tokens(Role::System, "odd", 10),
            turn_with_tokens(Role::User, "last", 10),
        ];
        let result = trim(&turns, 20);
        assert_eq!(contents(&result), vec!["odd", "last"]);
    }

    #[test]
    fn result_respects_budget_or_is_single_latest_turn() {
        let mut turns = vec![turn_with_tokens(Role::System, "system", 7)];
        for (i, tokens) in [3u32, 40, 12, 9, 25, 1, 18, 33, 6].iter().enumerate() {
            turns.push(turn_with_tokens(Role::User, &format!("t{}", i), *tokens));
        }

        for budget in 0..=200 {
            let result = trim(&turns, budget);
            let sum: u32 = result.turns.iter().map(|turn| turn.token_count).sum();
            assert_eq!(sum, result.total_tokens);

            if result.overflow {
                assert_eq!(result.turns.len(), 1);
                assert_eq!(result.turns[0].id, turns.last().unwrap().id);
            } else {
                assert!(sum <= budget, "budget {} exceeded: {}", budget, sum);
                assert_eq!(result.turns.last().unwrap().id, turns.last().unwrap().id);
            }

            // Output is a subsequence of the input in the same order
            let positions: Vec<usize> = result
                .turns
                .iter()
                .map(|selected| turns.iter().position(|t| t.id == selected.id).unwrap())
                .collect();
            assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

            // Deterministic
            assert_eq!(trim(&turns, budget), result);
        }
    }
}
