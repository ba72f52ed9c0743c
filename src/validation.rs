//! Input validation for customer, contact, activity and user writes.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{CrmError, CrmResult};
use crate::models::{ActivityType, CustomerStatus, Outcome, Role};

pub const CUSTOMER_PAGE_SIZE: i64 = 20;
pub const ACTIVITY_PAGE_SIZE: i64 = 50;

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));
static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9\-+() ]*$").expect("valid regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(field: &'static str, value: &str) -> CrmResult<NaiveDate> {
    let value = value.trim();
    if !ISO_DATE.is_match(value) {
        return Err(CrmError::validation(field, "Invalid date format"));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| CrmError::validation(field, format!("{value} is not a calendar date")))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(field: &'static str, value: &str, max_len: usize) -> CrmResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CrmError::validation(field, "is required"));
    }
    if value.chars().count() > max_len {
        return Err(CrmError::validation(field, format!("must be at most {max_len} characters")));
    }
    Ok(value.to_string())
}

fn check_email(value: &Option<String>) -> CrmResult<()> {
    match value {
        Some(email) if !EMAIL.is_match(email) => Err(CrmError::validation("email", "Invalid email")),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerInput {
    pub company_name: String,
    pub industry_type: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub machine_type: Option<String>,
    #[serde(default)]
    pub status: CustomerStatus,
    pub notes: Option<String>,
}

impl CustomerInput {
    pub fn validate(self) -> CrmResult<Self> {
        let input = Self {
            company_name: required("company_name", &self.company_name, 255)?,
            industry_type: optional(self.industry_type),
            city: optional(self.city),
            district: optional(self.district),
            address: optional(self.address),
            phone: optional(self.phone),
            email: optional(self.email),
            machine_type: optional(self.machine_type),
            status: self.status,
            notes: optional(self.notes),
        };

        if let Some(phone) = &input.phone {
            if !PHONE.is_match(phone) {
                return Err(CrmError::validation("phone", "Invalid phone format"));
            }
        }
        check_email(&input.email)?;
        Ok(input)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub role: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

impl ContactInput {
    pub fn validate(self) -> CrmResult<Self> {
        let input = Self {
            name: required("name", &self.name, 255)?,
            role: optional(self.role),
            mobile: optional(self.mobile),
            email: optional(self.email),
            is_primary: self.is_primary,
        };
        check_email(&input.email)?;
        Ok(input)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityInput {
    pub customer_id: Uuid,
    pub activity_type: ActivityType,
    pub activity_date: String,
    pub contact_person: Option<String>,
    pub notes: Option<String>,
    pub outcome: Option<Outcome>,
    /// An empty string means no follow-up is scheduled.
    pub next_contact_date: Option<String>,
}

/// An activity write that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub customer_id: Uuid,
    pub activity_type: ActivityType,
    pub activity_date: NaiveDate,
    pub contact_person: Option<String>,
    pub notes: Option<String>,
    pub outcome: Option<Outcome>,
    pub next_contact_date: Option<NaiveDate>,
}

impl ActivityInput {
    pub fn validate(self) -> CrmResult<NewActivity> {
        let activity_date = parse_date("activity_date", &self.activity_date)?;
        let next_contact_date = optional(self.next_contact_date)
            .map(|value| parse_date("next_contact_date", &value))
            .transpose()?;

        Ok(NewActivity {
            customer_id: self.customer_id,
            activity_type: self.activity_type,
            activity_date,
            contact_person: optional(self.contact_person),
            notes: optional(self.notes),
            outcome: self.outcome,
            next_contact_date,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserInput {
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
}

impl UpdateUserInput {
    pub fn validate(self) -> CrmResult<Self> {
        Ok(Self {
            full_name: required("full_name", &self.full_name, 255)?,
            role: self.role,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilters {
    pub search: Option<String>,
    pub city: Option<String>,
    pub industry: Option<String>,
    pub page: Option<i64>,
}

impl CustomerFilters {
    pub fn validate(self) -> CrmResult<Self> {
        let page = self.page.unwrap_or(1);
        page_offset(page, CUSTOMER_PAGE_SIZE)?;
        Ok(Self {
            search: optional(self.search),
            city: optional(self.city),
            industry: optional(self.industry),
            page: Some(page),
        })
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> CrmResult<i64> {
        page_offset(self.page(), CUSTOMER_PAGE_SIZE)
    }
}

/// Row offset of a 1-based page. Pages past the addressable range are a
/// validation error rather than an overflow.
pub fn page_offset(page: i64, page_size: i64) -> CrmResult<i64> {
    if page < 1 {
        return Err(CrmError::validation("page", "must be a positive integer"));
    }
    (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| CrmError::validation("page", "is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity_input(date: &str, next: Option<&str>) -> ActivityInput {
        ActivityInput {
            customer_id: Uuid::from_u128(1),
            activity_type: ActivityType::Call,
            activity_date: date.to_string(),
            contact_person: Some("  ".to_string()),
            notes: Some("Discussed spare parts".to_string()),
            outcome: Some(Outcome::HasNeed),
            next_contact_date: next.map(str::to_string),
        }
    }

    #[test]
    fn empty_next_contact_date_means_none() {
        let activity = activity_input("2025-01-10", Some("")).validate().unwrap();
        assert_eq!(activity.next_contact_date, None);
        assert_eq!(activity.contact_person, None);
    }

    #[test]
    fn next_contact_date_is_parsed() {
        let activity = activity_input("2025-01-10", Some("2025-01-17")).validate().unwrap();
        assert_eq!(activity.next_contact_date, NaiveDate::from_ymd_opt(2025, 1, 17));
    }

    #[test]
    fn rejects_non_iso_and_impossible_dates() {
        assert!(activity_input("10/01/2025", None).validate().is_err());
        assert!(activity_input("2025-1-10", None).validate().is_err());
        assert!(activity_input("2025-02-30", None).validate().is_err());
        assert!(activity_input("2025-01-10", Some("2025-13-01")).validate().is_err());
    }

    #[test]
    fn customer_requires_company_name() {
        let err = CustomerInput::default().validate().unwrap_err();
        assert!(matches!(err, CrmError::Validation { field: "company_name", .. }));
    }

    #[test]
    fn customer_phone_and_email_are_checked() {
        let base = CustomerInput {
            company_name: "PT Maju".to_string(),
            ..Default::default()
        };

        let ok = CustomerInput {
            phone: Some("+62 (21) 555-0101".to_string()),
            email: Some(String::new()),
            ..base.clone()
        }
        .validate()
        .unwrap();
        assert_eq!(ok.email, None);
        assert_eq!(ok.status, CustomerStatus::Active);

        let bad_phone = CustomerInput {
            phone: Some("call me".to_string()),
            ..base.clone()
        };
        assert!(matches!(
            bad_phone.validate(),
            Err(CrmError::Validation { field: "phone", .. })
        ));

        let bad_email = CustomerInput {
            email: Some("nobody".to_string()),
            ..base
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn contact_name_is_trimmed_and_required() {
        let contact = ContactInput {
            name: "  Budi  ".to_string(),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(contact.name, "Budi");
        assert!(ContactInput::default().validate().is_err());
    }

    #[test]
    fn filters_compute_offsets() {
        let filters = CustomerFilters {
            page: Some(3),
            search: Some(" ".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(filters.offset().unwrap(), 40);
        assert_eq!(filters.search, None);

        let bad = CustomerFilters {
            page: Some(0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn page_far_past_the_end_is_rejected() {
        let huge = CustomerFilters {
            page: Some(i64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(CrmError::Validation { field: "page", .. })
        ));
        assert!(page_offset(i64::MAX, ACTIVITY_PAGE_SIZE).is_err());
        assert_eq!(page_offset(2, ACTIVITY_PAGE_SIZE).unwrap(), 50);
    }
}
