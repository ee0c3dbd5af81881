//! Message texts posted for a giveaway.

use crate::entities::{Eligibility, GiveawayEvent, UserId};
use itertools::Itertools;
use time::OffsetDateTime;

pub const ENTRY_EMOJI: &str = "🎉";
pub const NO_ENTRANTS_MESSAGE: &str = "No one entered the giveaway!";
pub const NO_REROLL_ENTRANTS_MESSAGE: &str = "No valid entries found for the giveaway.";

pub fn mention(user: UserId) -> String {
    format!("<@{user}>")
}

fn mentions(users: &[UserId]) -> String {
    users.iter().map(|u| mention(*u)).join(", ")
}

/// Discord renders `<t:unix:style>` in each reader's own timezone.
fn timestamp(at: OffsetDateTime, style: char) -> String {
    format!("<t:{}:{style}>", at.unix_timestamp())
}

fn header(prize: &str) -> String {
    format!("🎉 **GIVEAWAY** 🎉\n**{prize}**")
}

/// Body of a freshly posted giveaway.
pub fn announcement(
    prize: &str,
    winner_count: u32,
    deadline: OffsetDateTime,
    host: UserId,
    eligibility: &Eligibility,
) -> String {
    let mut text = format!(
        "{}\n\nReact with {ENTRY_EMOJI} to enter!\nEnds: {} ({})\nWinners: {winner_count}\nHosted by: {}",
        header(prize),
        timestamp(deadline, 'R'),
        timestamp(deadline, 'F'),
        mention(host),
    );
    if let Some(role) = eligibility.required_role() {
        text.push_str(&format!("\nRequired role: <@&{role}>"));
    }
    text
}

/// Body of the announcement once winners are drawn.
pub fn ended_announcement(event: &GiveawayEvent) -> String {
    let outcome = if event.winners.is_empty() {
        "Giveaway ended! No valid entries.".to_string()
    } else {
        format!("Giveaway ended! Winner(s): {}", mentions(&event.winners))
    };
    format!(
        "{}\n\n{outcome}\nEnded: {}\nHosted by: {}",
        header(&event.prize),
        timestamp(event.completed_at.unwrap_or(event.deadline), 'F'),
        mention(event.creator_id),
    )
}

pub fn cancelled_announcement(event: &GiveawayEvent) -> String {
    format!(
        "{}\n\nThis giveaway was cancelled.\nHosted by: {}",
        header(&event.prize),
        mention(event.creator_id),
    )
}

pub fn winners_message(prize: &str, winners: &[UserId]) -> String {
    format!("🎉 Congratulations {}! You won **{prize}**!", mentions(winners))
}

pub fn reroll_message(prize: &str, winners: &[UserId]) -> String {
    format!(
        "Congratulations {}! You won the reroll for **{prize}**!",
        mentions(winners)
    )
}
