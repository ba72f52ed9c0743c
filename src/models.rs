use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CrmError;

macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => ($value:literal, $label:literal)),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = CrmError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(CrmError::validation($field, format!("unknown value {other:?}"))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(CustomerStatus, "status", {
    Active => ("active", "Active"),
    Inactive => ("inactive", "Inactive"),
    Dormant => ("dormant", "Dormant"),
});

string_enum!(ActivityType, "activity_type", {
    Call => ("call", "Phone Call"),
    Visit => ("visit", "Visit"),
    Meeting => ("meeting", "Meeting"),
    Email => ("email", "Email"),
    Whatsapp => ("whatsapp", "WhatsApp"),
    Quotation => ("quotation", "Quotation"),
    Service => ("service", "Service"),
    Complaint => ("complaint", "Complaint"),
    FollowUp => ("follow-up", "Follow Up"),
});

string_enum!(Outcome, "outcome", {
    HasNeed => ("has_need", "Has Need"),
    NoNeed => ("no_need", "No Need"),
    FollowUp => ("follow_up", "Follow Up"),
    ServiceRequest => ("service_request", "Service Request"),
    QuotationSent => ("quotation_sent", "Quotation Sent"),
    OrderPlaced => ("order_placed", "Order Placed"),
    NoResponse => ("no_response", "No Response"),
});

string_enum!(Role, "role", {
    Admin => ("admin", "Admin"),
    Marketing => ("marketing", "Marketing"),
});

impl Default for CustomerStatus {
    fn default() -> Self {
        CustomerStatus::Active
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: Uuid,
    pub company_name: String,
    pub industry_type: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub machine_type: Option<String>,
    pub status: CustomerStatus,
    pub last_contact_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub name: String,
    pub role: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub user_id: Option<Uuid>,
    pub activity_type: ActivityType,
    pub activity_date: NaiveDate,
    pub contact_person: Option<String>,
    pub notes: Option<String>,
    pub outcome: Option<Outcome>,
    pub next_contact_date: Option<NaiveDate>,
    pub is_imported: bool,
    pub created_at: DateTime<Utc>,
}

/// An activity joined with the name of the company it was logged against.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityListing {
    pub activity: Activity,
    pub company_name: String,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One pending follow-up, denormalized with the customer and contact fields
/// the working list displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowUpEntry {
    pub customer_id: Uuid,
    pub next_contact_date: NaiveDate,
    pub source_activity_id: Uuid,
    pub activity_type: ActivityType,
    pub activity_date: NaiveDate,
    pub notes: Option<String>,
    pub company_name: String,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub contact_name: Option<String>,
    pub contact_mobile: Option<String>,
}

/// The date-only projection the dashboard counter works from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpDate {
    pub customer_id: Uuid,
    pub source_activity_id: Uuid,
    pub next_contact_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FollowUpView {
    pub overdue: Vec<FollowUpEntry>,
    #[serde(rename = "dueToday")]
    pub due_today: Vec<FollowUpEntry>,
    pub upcoming: Vec<FollowUpEntry>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FollowUpCounts {
    pub overdue: usize,
    pub today: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub customer_count: i64,
    pub activity_count: i64,
    pub contact_count: i64,
    pub overdue_count: usize,
    pub today_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub active_customers: i64,
    pub activities: i64,
    pub contacts: i64,
}

impl DashboardStats {
    pub fn assemble(counts: RecordCounts, follow_ups: FollowUpCounts) -> Self {
        Self {
            customer_count: counts.active_customers,
            activity_count: counts.activities,
            contact_count: counts.contacts,
            overdue_count: follow_ups.overdue,
            today_count: follow_ups.today,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetail {
    pub customer: Customer,
    pub contacts: Vec<Contact>,
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.page_size <= 0 {
            return 0;
        }
        (self.count + self.page_size - 1) / self.page_size
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdminStats {
    pub total: usize,
    pub admins: usize,
    pub marketing: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportTotals {
    pub total_activities: i64,
    pub recent_activities: i64,
    pub active_customers: i64,
    pub follow_ups_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Share {
    pub label: String,
    pub count: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Performer {
    pub user_id: Uuid,
    pub user_name: String,
    pub activity_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_types_use_hyphenated_follow_up() {
        assert_eq!(ActivityType::FollowUp.as_str(), "follow-up");
        assert_eq!("follow-up".parse::<ActivityType>().unwrap(), ActivityType::FollowUp);
        assert_eq!(Outcome::FollowUp.as_str(), "follow_up");
        assert!("follow-up".parse::<Outcome>().is_err());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = "owner".parse::<Role>().unwrap_err();
        assert!(matches!(err, CrmError::Validation { field: "role", .. }));
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<()> = Page {
            data: Vec::new(),
            count: 41,
            page: 1,
            page_size: 20,
        };
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn view_serializes_due_today_in_camel_case() {
        let json = serde_json::to_value(FollowUpView::default()).unwrap();
        assert!(json.get("dueToday").is_some());
        assert_eq!(json["total"], 0);
    }
}
