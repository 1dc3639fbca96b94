//! Nudge text generation.
//!
//! The dispatcher only needs "give me text for this subject"; where the
//! text comes from is behind [`ContentSource`]. [`TemplateContent`] is the
//! built-in deterministic implementation.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::hierarchy::{GoalDigest, Tone};
use crate::scheduler::actions::ActionKind;
use crate::store::Subject;

/// Goals listed in one message before the rest are summarised.
const MAX_LISTED_GOALS: usize = 8;

/// Everything a content source may use for one nudge.
#[derive(Debug, Clone)]
pub struct NudgeContext {
    pub kind: ActionKind,
    pub subject: Subject,
    /// Subject-local date of the tick.
    pub local_date: NaiveDate,
    /// Pending goals, never empty.
    pub goals: Vec<GoalDigest>,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn compose(&self, ctx: &NudgeContext) -> Result<String>;
}

/// Fixed, tone-aware templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateContent;

impl TemplateContent {
    #[must_use]
    pub fn render(ctx: &NudgeContext) -> String {
        let tone = ctx.goals.first().map(|g| g.tone).unwrap_or_default();
        let name = ctx.subject.display_name.trim();
        let name = if name.is_empty() { "there" } else { name };

        let mut out = String::new();
        let _ = writeln!(out, "{}", greeting(ctx.kind, tone, name));
        out.push('\n');

        for goal in ctx.goals.iter().take(MAX_LISTED_GOALS) {
            match ctx.kind {
                ActionKind::WeeklyCheckin => {
                    let _ = write!(
                        out,
                        "• {}: {}/{} steps done ({}%)",
                        goal.title,
                        goal.microtasks_done,
                        goal.microtasks_total,
                        percent(goal.microtasks_done, goal.microtasks_total)
                    );
                }
                _ => {
                    let _ = write!(out, "• {}", goal.title);
                    if let Some(focus) = &goal.focus_title {
                        let _ = write!(out, ": next up \"{focus}\"");
                    }
                }
            }
            if let Some(due) = goal.due_date {
                let _ = write!(out, "{}", due_suffix(due, ctx.local_date));
            }
            out.push('\n');
        }
        if ctx.goals.len() > MAX_LISTED_GOALS {
            let _ = writeln!(out, "…and {} more", ctx.goals.len() - MAX_LISTED_GOALS);
        }

        out.push('\n');
        out.push_str(closing(tone));
        out
    }
}

#[async_trait]
impl ContentSource for TemplateContent {
    async fn compose(&self, ctx: &NudgeContext) -> Result<String> {
        Ok(Self::render(ctx))
    }
}

fn greeting(kind: ActionKind, tone: Tone, name: &str) -> String {
    match (kind, tone) {
        (ActionKind::WeeklyCheckin, Tone::Strict) => format!("{name}, weekly review. Here is where you stand:"),
        (ActionKind::WeeklyCheckin, Tone::Motivational) => {
            format!("Another week of progress, {name}! Look how far you've come:")
        }
        (ActionKind::WeeklyCheckin, Tone::Friendly) => format!("Hi {name}, here's your weekly check-in:"),
        (_, Tone::Strict) => format!("{name}, today's targets:"),
        (_, Tone::Motivational) => format!("You've got this, {name}! Keep the momentum going:"),
        (_, Tone::Friendly) => format!("Good morning, {name}! Here's what's next:"),
    }
}

fn closing(tone: Tone) -> &'static str {
    match tone {
        Tone::Strict => "No excuses. Get it done.",
        Tone::Motivational => "One small step at a time adds up. Go!",
        Tone::Friendly => "Have a great day!",
    }
}

fn percent(done: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    done.saturating_mul(100) / total
}

fn due_suffix(due: NaiveDate, today: NaiveDate) -> String {
    let days = (due - today).num_days();
    match days {
        d if d < 0 => format!(" (overdue by {} day{})", -d, if d == -1 { "" } else { "s" }),
        0 => " (due today)".to_owned(),
        1 => " (due tomorrow)".to_owned(),
        d => format!(" (due in {d} days)"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn digest(title: &str, tone: Tone, focus: Option<&str>) -> GoalDigest {
        GoalDigest {
            goal_id: format!("goal-{title}"),
            title: title.to_owned(),
            tone,
            due_date: None,
            focus_title: focus.map(str::to_owned),
            microtasks_done: 1,
            microtasks_total: 4,
        }
    }

    fn ctx(kind: ActionKind, goals: Vec<GoalDigest>) -> NudgeContext {
        NudgeContext {
            kind,
            subject: Subject::new("u1", "Ana"),
            local_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            goals,
        }
    }

    #[tokio::test]
    async fn daily_lists_focus_titles() {
        let text = TemplateContent
            .compose(&ctx(
                ActionKind::DailyReminder,
                vec![digest("Run a marathon", Tone::Friendly, Some("Run 3k"))],
            ))
            .await
            .unwrap();
        assert!(text.starts_with("Good morning, Ana!"));
        assert!(text.contains("• Run a marathon: next up \"Run 3k\""));
        assert!(text.ends_with("Have a great day!"));
    }

    #[test]
    fn weekly_reports_progress_in_first_goal_tone() {
        let text = TemplateContent::render(&ctx(
            ActionKind::WeeklyCheckin,
            vec![digest("Learn piano", Tone::Strict, None), digest("Read", Tone::Friendly, None)],
        ));
        assert!(text.starts_with("Ana, weekly review."));
        assert!(text.contains("• Learn piano: 1/4 steps done (25%)"));
        assert!(text.contains("No excuses."));
    }

    #[test]
    fn due_dates_are_relative_to_local_date() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(due_suffix(today, today), " (due today)");
        assert_eq!(due_suffix(today.succ_opt().unwrap(), today), " (due tomorrow)");
        assert_eq!(
            due_suffix(NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(), today),
            " (due in 5 days)"
        );
        assert_eq!(
            due_suffix(NaiveDate::from_ymd_opt(2026, 1, 14).unwrap(), today),
            " (overdue by 1 day)"
        );
    }

    #[test]
    fn long_lists_are_truncated() {
        let goals = (0..MAX_LISTED_GOALS + 3)
            .map(|i| digest(&format!("g{i}"), Tone::Friendly, None))
            .collect();
        let text = TemplateContent::render(&ctx(ActionKind::DailyReminder, goals));
        assert!(text.contains("…and 3 more"));
        assert!(!text.contains(&format!("g{}", MAX_LISTED_GOALS)));
    }
}
