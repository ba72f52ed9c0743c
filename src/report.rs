use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    ActivityType, AdminStats, DashboardStats, FollowUpEntry, FollowUpView, Outcome, Performer,
    ReportTotals, Role, Share, UserProfile,
};

const TOP_PERFORMERS: usize = 10;

/// Percentage of `count` in `total`, rounded half up.
pub fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((count * 200 + total) / (total * 2)) as u32
}

/// Shares of each label, largest first; labels with equal counts keep
/// alphabetical order.
pub fn breakdown<I, L>(counts: I) -> Vec<Share>
where
    I: IntoIterator<Item = (L, usize)>,
    L: Into<String>,
{
    let counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(label, count)| (label.into(), count))
        .collect();
    let total: usize = counts.iter().map(|(_, count)| count).sum();

    let mut shares: Vec<Share> = counts
        .into_iter()
        .map(|(label, count)| Share {
            percentage: percentage(count, total),
            label,
            count,
        })
        .collect();

    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    shares
}

pub fn activity_mix(counts: &[(ActivityType, usize)]) -> Vec<Share> {
    breakdown(counts.iter().map(|(kind, count)| (kind.label(), *count)))
}

pub fn outcome_mix(counts: &[(Outcome, usize)]) -> Vec<Share> {
    breakdown(counts.iter().map(|(outcome, count)| (outcome.label(), *count)))
}

/// Users ranked by logged activity count. Activity from users without a
/// profile is dropped.
pub fn top_performers(counts: &[(Uuid, usize)], profiles: &[UserProfile]) -> Vec<Performer> {
    let counts: HashMap<Uuid, usize> = counts.iter().copied().collect();

    let mut performers: Vec<Performer> = profiles
        .iter()
        .filter_map(|profile| {
            counts.get(&profile.id).map(|count| Performer {
                user_id: profile.id,
                user_name: profile.full_name.clone(),
                activity_count: *count,
            })
        })
        .collect();

    performers.sort_by(|a, b| {
        b.activity_count
            .cmp(&a.activity_count)
            .then_with(|| a.user_name.cmp(&b.user_name))
    });
    performers.truncate(TOP_PERFORMERS);
    performers
}

pub fn admin_stats(profiles: &[UserProfile]) -> AdminStats {
    AdminStats {
        total: profiles.len(),
        admins: profiles.iter().filter(|p| p.role == Role::Admin).count(),
        marketing: profiles.iter().filter(|p| p.role == Role::Marketing).count(),
    }
}

pub fn describe_entry(entry: &FollowUpEntry) -> String {
    let mut line = format!("{} on {}", entry.company_name, entry.next_contact_date);
    if let Some(city) = &entry.city {
        let _ = write!(line, " ({city})");
    }
    if let Some(contact) = &entry.contact_name {
        let _ = write!(line, ", contact {contact}");
        if let Some(mobile) = &entry.contact_mobile {
            let _ = write!(line, " {mobile}");
        }
    }
    let _ = write!(line, " [last: {} {}]", entry.activity_type.label(), entry.activity_date);
    line
}

fn write_entries(output: &mut String, title: &str, entries: &[FollowUpEntry]) {
    let _ = writeln!(output, "### {} ({})", title, entries.len());
    if entries.is_empty() {
        let _ = writeln!(output, "None.");
    } else {
        for entry in entries {
            let _ = writeln!(output, "- {}", describe_entry(entry));
        }
    }
    let _ = writeln!(output);
}

fn write_shares(output: &mut String, shares: &[Share], empty: &str) {
    if shares.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }
    for share in shares {
        let _ = writeln!(
            output,
            "- {}: {} ({}%)",
            share.label, share.count, share.percentage
        );
    }
}

pub struct ReportInput<'a> {
    pub today: NaiveDate,
    pub window_end: NaiveDate,
    pub dashboard: &'a DashboardStats,
    pub follow_ups: &'a FollowUpView,
    pub totals: &'a ReportTotals,
    pub activity_mix: &'a [Share],
    pub outcomes: &'a [Share],
    pub performers: &'a [Performer],
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# CRM Activity Report");
    let _ = writeln!(
        output,
        "Generated for {} (follow-ups through {})",
        input.today, input.window_end
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Dashboard");
    let _ = writeln!(output, "- Active customers: {}", input.dashboard.customer_count);
    let _ = writeln!(output, "- Activities logged: {}", input.dashboard.activity_count);
    let _ = writeln!(output, "- Contacts: {}", input.dashboard.contact_count);
    let _ = writeln!(output, "- Overdue follow-ups: {}", input.dashboard.overdue_count);
    let _ = writeln!(output, "- Due today: {}", input.dashboard.today_count);
    let _ = writeln!(output);

    let _ = writeln!(output, "## Follow-ups");
    let view = input.follow_ups;
    let _ = writeln!(
        output,
        "{} customer{} need{} attention.",
        view.total,
        if view.total == 1 { "" } else { "s" },
        if view.total == 1 { "s" } else { "" }
    );
    let _ = writeln!(output);
    write_entries(&mut output, "Overdue", &view.overdue);
    write_entries(&mut output, "Due today", &view.due_today);
    write_entries(&mut output, "Upcoming", &view.upcoming);

    let _ = writeln!(output, "## Totals");
    let _ = writeln!(output, "- Total activities: {}", input.totals.total_activities);
    let _ = writeln!(output, "- Activities in the last 30 days: {}", input.totals.recent_activities);
    let _ = writeln!(output, "- Active customers: {}", input.totals.active_customers);
    let _ = writeln!(output, "- Activities with a follow-up date: {}", input.totals.follow_ups_count);
    let _ = writeln!(output);

    let _ = writeln!(output, "## Activity Mix");
    write_shares(&mut output, input.activity_mix, "No activities recorded.");
    let _ = writeln!(output);

    let _ = writeln!(output, "## Outcomes");
    write_shares(&mut output, input.outcomes, "No outcomes recorded.");
    let _ = writeln!(output);

    let _ = writeln!(output, "## Top Performers");
    if input.performers.is_empty() {
        let _ = writeln!(output, "No activity logged by known users.");
    } else {
        for (rank, performer) in input.performers.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({} activities)",
                rank + 1,
                performer.user_name,
                performer.activity_count
            );
        }
    }

    output
}
