use std::collections::HashMap;

use chrono::{Duration, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Activity, FollowUpCounts, FollowUpDate, FollowUpEntry, FollowUpView};

pub const DEFAULT_WINDOW_DAYS: i64 = 7;
/// Ten years; longer horizons are rejected by config and the CLI.
pub const MAX_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Overdue,
    DueToday,
    Upcoming,
}

impl Bucket {
    /// Calendar-date comparison only; `NaiveDate` carries no time of day.
    pub fn classify(date: NaiveDate, today: NaiveDate) -> Self {
        match date.cmp(&today) {
            std::cmp::Ordering::Less => Bucket::Overdue,
            std::cmp::Ordering::Equal => Bucket::DueToday,
            std::cmp::Ordering::Greater => Bucket::Upcoming,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Bucket::Overdue => "Overdue",
            Bucket::DueToday => "Due today",
            Bucket::Upcoming => "Upcoming",
        }
    }
}

/// The fetch-side horizon: everything up to `today + days`, with no lower
/// bound so arbitrarily old overdue dates are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpWindow {
    pub today: NaiveDate,
    pub days: i64,
}

impl FollowUpWindow {
    pub fn new(today: NaiveDate, days: i64) -> Self {
        Self {
            today,
            days: days.clamp(0, MAX_WINDOW_DAYS),
        }
    }

    pub fn end(&self) -> NaiveDate {
        self.today
            .checked_add_signed(Duration::days(self.days))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn admits(&self, date: NaiveDate) -> bool {
        date <= self.end()
    }

    pub fn filter<T: Pending + Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .filter(|item| self.admits(item.next_contact_date()))
            .cloned()
            .collect()
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A row that can stand as a customer's pending follow-up.
pub trait Pending {
    fn customer_id(&self) -> Uuid;
    fn next_contact_date(&self) -> NaiveDate;
    fn source_activity_id(&self) -> Uuid;

    /// Earlier date wins; on equal dates the lowest activity id wins.
    fn priority(&self) -> (NaiveDate, Uuid) {
        (self.next_contact_date(), self.source_activity_id())
    }
}

impl Pending for FollowUpEntry {
    fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    fn next_contact_date(&self) -> NaiveDate {
        self.next_contact_date
    }

    fn source_activity_id(&self) -> Uuid {
        self.source_activity_id
    }
}

impl Pending for FollowUpDate {
    fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    fn next_contact_date(&self) -> NaiveDate {
        self.next_contact_date
    }

    fn source_activity_id(&self) -> Uuid {
        self.source_activity_id
    }
}

/// Keep one row per customer: the one with the earliest next contact date.
/// The result is ordered by `(next_contact_date, source_activity_id)` and does
/// not depend on the order of `items`.
pub fn nearest_per_customer<T: Pending + Clone>(items: &[T]) -> Vec<T> {
    let mut nearest: HashMap<Uuid, &T> = HashMap::new();

    for item in items {
        nearest
            .entry(item.customer_id())
            .and_modify(|current| {
                if item.priority() < current.priority() {
                    *current = item;
                }
            })
            .or_insert(item);
    }

    let mut winners: Vec<T> = nearest.into_values().cloned().collect();
    winners.sort_by_key(|item| item.priority());
    winners
}

pub fn aggregate(candidates: &[FollowUpEntry], today: NaiveDate) -> FollowUpView {
    let mut view = FollowUpView::default();

    for entry in nearest_per_customer(candidates) {
        match Bucket::classify(entry.next_contact_date, today) {
            Bucket::Overdue => view.overdue.push(entry),
            Bucket::DueToday => view.due_today.push(entry),
            Bucket::Upcoming => view.upcoming.push(entry),
        }
    }

    view.total = view.overdue.len() + view.due_today.len() + view.upcoming.len();
    debug!(
        candidates = candidates.len(),
        overdue = view.overdue.len(),
        due_today = view.due_today.len(),
        upcoming = view.upcoming.len(),
        "aggregated follow-ups"
    );
    view
}

/// Dashboard counts over the date-only projection. Uses the same per-customer
/// selection as [`aggregate`], so the counts always equal the bucket lengths
/// for the same snapshot and `today`.
pub fn dashboard_counts(dates: &[FollowUpDate], today: NaiveDate) -> FollowUpCounts {
    let mut counts = FollowUpCounts::default();

    for date in nearest_per_customer(dates) {
        match Bucket::classify(date.next_contact_date, today) {
            Bucket::Overdue => counts.overdue += 1,
            Bucket::DueToday => counts.today += 1,
            Bucket::Upcoming => {}
        }
    }

    counts
}

pub fn pending_dates(activities: &[Activity]) -> Vec<FollowUpDate> {
    activities
        .iter()
        .filter_map(|activity| {
            activity.next_contact_date.map(|next_contact_date| FollowUpDate {
                customer_id: activity.customer_id,
                source_activity_id: activity.id,
                next_contact_date,
            })
        })
        .collect()
}

/// The customer detail page's pending follow-up, chosen by the same rule and
/// window as the follow-ups list.
pub fn customer_follow_up(
    customer_id: Uuid,
    activities: &[Activity],
    window: FollowUpWindow,
) -> Option<(FollowUpDate, Bucket)> {
    let dates: Vec<FollowUpDate> = pending_dates(activities)
        .into_iter()
        .filter(|date| date.customer_id == customer_id)
        .collect();

    nearest_per_customer(&window.filter(&dates))
        .into_iter()
        .next()
        .map(|date| (date, Bucket::classify(date.next_contact_date, window.today)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityType;
    use chrono::{DateTime, FixedOffset, TimeZone};
    use proptest::prelude::*;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn entry(customer: u128, activity: u128, next_contact_date: NaiveDate) -> FollowUpEntry {
        FollowUpEntry {
            customer_id: Uuid::from_u128(customer),
            next_contact_date,
            source_activity_id: Uuid::from_u128(activity),
            activity_type: ActivityType::Call,
            activity_date: next_contact_date - Duration::days(3),
            notes: None,
            company_name: format!("Customer {customer}"),
            city: None,
            phone: None,
            contact_name: None,
            contact_mobile: None,
        }
    }

    fn as_date(entry: &FollowUpEntry) -> FollowUpDate {
        FollowUpDate {
            customer_id: entry.customer_id,
            source_activity_id: entry.source_activity_id,
            next_contact_date: entry.next_contact_date,
        }
    }

    fn activity(customer: u128, id: u128, next_contact_date: Option<NaiveDate>) -> Activity {
        Activity {
            id: Uuid::from_u128(id),
            customer_id: Uuid::from_u128(customer),
            user_id: None,
            activity_type: ActivityType::Visit,
            activity_date: day("2025-01-01"),
            contact_person: None,
            notes: None,
            outcome: None,
            next_contact_date,
            is_imported: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn earliest_follow_up_wins_and_is_overdue() {
        let candidates = vec![entry(1, 10, day("2025-01-10")), entry(1, 11, day("2025-01-15"))];

        let view = aggregate(&candidates, day("2025-01-12"));

        assert_eq!(view.total, 1);
        assert_eq!(view.overdue.len(), 1);
        assert_eq!(view.overdue[0].next_contact_date, day("2025-01-10"));
        assert!(view.due_today.is_empty());
        assert!(view.upcoming.is_empty());
    }

    #[test]
    fn follow_up_dated_today_is_due_today() {
        let today = day("2025-03-04");
        let view = aggregate(&[entry(2, 20, today)], today);

        assert_eq!(view.due_today.len(), 1);
        assert_eq!(view.total, 1);
    }

    #[test]
    fn empty_input_yields_empty_view() {
        let view = aggregate(&[], day("2025-03-04"));
        assert_eq!(view, FollowUpView::default());
        assert_eq!(view.total, 0);
    }

    #[test]
    fn follow_up_beyond_window_never_reaches_the_view() {
        let today = day("2025-03-04");
        let window = FollowUpWindow::new(today, DEFAULT_WINDOW_DAYS);
        let snapshot = vec![entry(3, 30, today + Duration::days(10)), entry(4, 40, today + Duration::days(7))];

        let view = aggregate(&window.filter(&snapshot), today);

        assert_eq!(view.total, 1);
        assert_eq!(view.upcoming[0].customer_id, Uuid::from_u128(4));
    }

    #[test]
    fn aggregator_is_unbounded_above() {
        let today = day("2025-03-04");
        let view = aggregate(&[entry(5, 50, today + Duration::days(90))], today);
        assert_eq!(view.upcoming.len(), 1);
    }

    #[test]
    fn window_has_no_lower_bound() {
        let window = FollowUpWindow::new(day("2025-03-04"), 7);
        assert!(window.admits(day("1999-12-31")));
        assert!(window.admits(day("2025-03-11")));
        assert!(!window.admits(day("2025-03-12")));
    }

    #[test]
    fn oversized_window_is_clamped() {
        let window = FollowUpWindow::new(day("2025-01-12"), 200_000_000);
        assert_eq!(window.days, MAX_WINDOW_DAYS);
        assert_eq!(window.end(), day("2025-01-12") + Duration::days(MAX_WINDOW_DAYS));
        assert!(window.admits(day("2034-12-31")));
    }

    #[test]
    fn window_end_saturates_at_calendar_limit() {
        let window = FollowUpWindow::new(NaiveDate::MAX - Duration::days(1), MAX_WINDOW_DAYS);
        assert_eq!(window.end(), NaiveDate::MAX);
        assert!(window.admits(NaiveDate::MAX));
    }

    #[test]
    fn earlier_open_follow_up_hides_later_one() {
        let today = day("2025-03-04");
        let candidates = vec![
            entry(6, 61, today + Duration::days(1)),
            entry(6, 62, today + Duration::days(3)),
        ];

        let view = aggregate(&candidates, today);

        assert_eq!(view.upcoming.len(), 1);
        assert_eq!(view.upcoming[0].source_activity_id, Uuid::from_u128(61));
    }

    #[test]
    fn equal_dates_pick_lowest_activity_id() {
        let date = day("2025-03-04");
        let forward = vec![entry(7, 72, date), entry(7, 71, date)];
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();

        let a = aggregate(&forward, date);
        let b = aggregate(&reversed, date);

        assert_eq!(a.due_today[0].source_activity_id, Uuid::from_u128(71));
        assert_eq!(a, b);
    }

    #[test]
    fn buckets_are_sorted_ascending() {
        let today = day("2025-03-04");
        let candidates = vec![
            entry(1, 1, today + Duration::days(5)),
            entry(2, 2, today + Duration::days(1)),
            entry(3, 3, today - Duration::days(1)),
            entry(4, 4, today - Duration::days(30)),
        ];

        let view = aggregate(&candidates, today);

        let upcoming: Vec<_> = view.upcoming.iter().map(|e| e.next_contact_date).collect();
        let overdue: Vec<_> = view.overdue.iter().map(|e| e.next_contact_date).collect();
        assert_eq!(upcoming, vec![today + Duration::days(1), today + Duration::days(5)]);
        assert_eq!(overdue, vec![today - Duration::days(30), today - Duration::days(1)]);
    }

    #[test]
    fn capture_time_zone_does_not_change_bucket() {
        let east: DateTime<FixedOffset> = FixedOffset::east_opt(14 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 4, 0, 5, 0)
            .unwrap();
        let west: DateTime<FixedOffset> = FixedOffset::west_opt(12 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 4, 23, 55, 0)
            .unwrap();
        let today = day("2025-03-04");

        for captured in [east, west] {
            let view = aggregate(&[entry(8, 80, captured.date_naive())], today);
            assert_eq!(view.due_today.len(), 1);
        }
    }

    #[test]
    fn customer_detail_matches_follow_up_list() {
        let today = day("2025-03-04");
        let window = FollowUpWindow::new(today, 7);
        let activities = vec![
            activity(9, 91, Some(today + Duration::days(2))),
            activity(9, 92, None),
            activity(9, 93, Some(today - Duration::days(4))),
            activity(10, 94, Some(today - Duration::days(9))),
        ];

        let (date, bucket) = customer_follow_up(Uuid::from_u128(9), &activities, window).unwrap();

        assert_eq!(date.source_activity_id, Uuid::from_u128(93));
        assert_eq!(bucket, Bucket::Overdue);
    }

    #[test]
    fn customer_without_window_follow_ups_has_none() {
        let today = day("2025-03-04");
        let activities = vec![
            activity(11, 111, None),
            activity(11, 112, Some(today + Duration::days(8))),
        ];

        let window = FollowUpWindow::new(today, 7);
        assert!(customer_follow_up(Uuid::from_u128(11), &activities, window).is_none());
    }

    fn arb_entries() -> impl Strategy<Value = Vec<FollowUpEntry>> {
        prop::collection::vec((0u128..6, -20i64..20), 0..40).prop_map(|rows| {
            let base = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
            rows.into_iter()
                .enumerate()
                .map(|(idx, (customer, offset))| {
                    entry(customer, idx as u128 + 1000, base + Duration::days(offset))
                })
                .collect()
        })
    }

    fn arb_today() -> impl Strategy<Value = NaiveDate> {
        (-25i64..25).prop_map(|offset| NaiveDate::from_ymd_opt(2025, 6, 15).unwrap() + Duration::days(offset))
    }

    fn bucket_of(view: &FollowUpView, customer: Uuid) -> Option<Bucket> {
        if view.overdue.iter().any(|e| e.customer_id == customer) {
            Some(Bucket::Overdue)
        } else if view.due_today.iter().any(|e| e.customer_id == customer) {
            Some(Bucket::DueToday)
        } else if view.upcoming.iter().any(|e| e.customer_id == customer) {
            Some(Bucket::Upcoming)
        } else {
            None
        }
    }

    proptest! {
        #[test]
        fn one_entry_per_customer_at_its_minimum(candidates in arb_entries(), today in arb_today()) {
            let view = aggregate(&candidates, today);
            let all: Vec<&FollowUpEntry> = view.overdue.iter().chain(&view.due_today).chain(&view.upcoming).collect();

            let mut customers: Vec<Uuid> = candidates.iter().map(|c| c.customer_id).collect();
            customers.sort();
            customers.dedup();
            prop_assert_eq!(all.len(), customers.len());
            prop_assert_eq!(view.total, all.len());

            for customer in customers {
                let min = candidates.iter().filter(|c| c.customer_id == customer).map(|c| c.next_contact_date).min();
                let chosen: Vec<_> = all.iter().filter(|e| e.customer_id == customer).collect();
                prop_assert_eq!(chosen.len(), 1);
                prop_assert_eq!(Some(chosen[0].next_contact_date), min);
            }
        }

        #[test]
        fn buckets_match_classification(candidates in arb_entries(), today in arb_today()) {
            let view = aggregate(&candidates, today);
            prop_assert!(view.overdue.iter().all(|e| e.next_contact_date < today));
            prop_assert!(view.due_today.iter().all(|e| e.next_contact_date == today));
            prop_assert!(view.upcoming.iter().all(|e| e.next_contact_date > today));
        }

        #[test]
        fn output_is_independent_of_input_order(candidates in arb_entries(), today in arb_today()) {
            let reversed: Vec<_> = candidates.iter().rev().cloned().collect();
            prop_assert_eq!(aggregate(&candidates, today), aggregate(&candidates, today));
            prop_assert_eq!(aggregate(&candidates, today), aggregate(&reversed, today));
        }

        #[test]
        fn advancing_today_never_moves_entries_backward(candidates in arb_entries(), today in arb_today()) {
            let before = aggregate(&candidates, today);
            let after = aggregate(&candidates, today + Duration::days(1));

            for customer in candidates.iter().map(|c| c.customer_id) {
                let (Some(was), Some(now)) = (bucket_of(&before, customer), bucket_of(&after, customer)) else {
                    continue;
                };
                prop_assert!(now <= was, "{:?} moved from {:?} to {:?}", customer, was, now);
                prop_assert!(!(was == Bucket::Upcoming && now == Bucket::Overdue));
            }
        }

        #[test]
        fn dashboard_counts_agree_with_view(candidates in arb_entries(), today in arb_today()) {
            let view = aggregate(&candidates, today);
            let dates: Vec<FollowUpDate> = candidates.iter().map(as_date).collect();
            let counts = dashboard_counts(&dates, today);

            prop_assert_eq!(counts.overdue, view.overdue.len());
            prop_assert_eq!(counts.today, view.due_today.len());
        }
    }
}
