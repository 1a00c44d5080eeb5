//! ABOUTME: Token estimation and asymmetric prompt truncation to fit a context window
//! ABOUTME: System prompt gets 30% of available characters, user prompt 70%

use tracing::{info, warn};

/// Rough estimation: 1 token is about 4 characters.
const CHARS_PER_TOKEN: usize = 4;

const SYSTEM_MARKER: &str = "\n\n[System prompt truncated to fit context...]";
const USER_MARKER: &str = "\n\n[User prompt truncated to fit context...]";

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Result of a [`fit`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitResult {
    pub system: String,
    pub user: String,
    pub truncated: bool,
}

/// Truncate prompts so the estimated total fits within
/// `max_context_tokens - reserved_completion_tokens`.
///
/// When truncation is needed the system prompt is allotted 30% of the
/// available characters and the user prompt the remaining 70%; a prompt
/// within its own budget is left untouched. Truncated prompts are cut from
/// the end and tagged with a marker, marker included in the budget so the
/// result never exceeds the window.
pub fn fit(
    system: &str,
    user: &str,
    max_context_tokens: usize,
    reserved_completion_tokens: usize,
) -> FitResult {
    let available_tokens = max_context_tokens.saturating_sub(reserved_completion_tokens);
    let available_chars = available_tokens * CHARS_PER_TOKEN;

    let system_chars = system.chars().count();
    let user_chars = user.chars().count();
    let total_chars = system_chars + user_chars;

    if total_chars <= available_chars {
        return FitResult {
            system: system.to_string(),
            user: user.to_string(),
            truncated: false,
        };
    }

    let system_budget = available_chars * 3 / 10;
    let user_budget = available_chars - system_budget;

    let truncated_system = truncate_with_marker(system, system_chars, system_budget, SYSTEM_MARKER);
    let truncated_user = truncate_with_marker(user, user_chars, user_budget, USER_MARKER);

    if truncated_system.chars().count() < system_chars {
        warn!(
            from = system_chars,
            to = truncated_system.chars().count(),
            "system prompt truncated to fit context"
        );
    }
    if truncated_user.chars().count() < user_chars {
        warn!(
            from = user_chars,
            to = truncated_user.chars().count(),
            "user prompt truncated to fit context"
        );
    }
    info!(
        from_chars = total_chars,
        to_chars = truncated_system.chars().count() + truncated_user.chars().count(),
        est_tokens =
            estimate_tokens(&truncated_system) + estimate_tokens(&truncated_user),
        "prompt truncation applied"
    );

    FitResult {
        system: truncated_system,
        user: truncated_user,
        truncated: true,
    }
}

fn truncate_with_marker(text: &str, text_chars: usize, budget: usize, marker: &str) -> String {
    if text_chars <= budget {
        return text.to_string();
    }
    let keep = budget.saturating_sub(marker.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(marker);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_prompts_within_window_are_unchanged() {
        let result = fit("system", "user", 4096, 1024);
        assert!(!result.truncated);
        assert_eq!(result.system, "system");
        assert_eq!(result.user, "user");
    }

    #[test]
    fn test_truncated_total_fits_budget() {
        let system = "s".repeat(10_000);
        let user = "u".repeat(20_000);
        let result = fit(&system, &user, 2048, 1024);
        assert!(result.truncated);

        let total = estimate_tokens(&result.system) + estimate_tokens(&result.user);
        assert!(total <= 2048 - 1024, "estimated {total} tokens over budget");
        assert!(result.system.ends_with("[System prompt truncated to fit context...]"));
        assert!(result.user.ends_with("[User prompt truncated to fit context...]"));
    }

    #[test]
    fn test_system_share_is_at_least_thirty_percent() {
        let system = "s".repeat(50_000);
        let user = "u".repeat(50_000);
        let result = fit(&system, &user, 4096, 1024);
        assert!(result.truncated);

        let available_chars = (4096 - 1024) * 4;
        let system_len = result.system.chars().count();
        // Marker inclusion keeps the truncated prompt within its 30% share.
        assert!(system_len <= available_chars * 3 / 10);
        assert!(system_len >= available_chars * 3 / 10 - 50);
        assert!(system_len <= 50_000);
    }

    #[test]
    fn test_short_system_prompt_survives_intact() {
        let system = "You are a developer.";
        let user = "u".repeat(100_000);
        let result = fit(system, &user, 2048, 1024);
        assert!(result.truncated);
        assert_eq!(result.system, system);
        assert!(result.user.chars().count() < 100_000);
    }
}
