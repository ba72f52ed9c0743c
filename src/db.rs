use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{self, Actor};
use crate::error::{CrmError, CrmResult};
use crate::followups::FollowUpWindow;
use crate::models::{
    Activity, ActivityListing, ActivityType, Contact, Customer, CustomerDetail,
    FollowUpDate, FollowUpEntry, Outcome, Page, RecordCounts, ReportTotals, Role, UserProfile,
};
use crate::validation::{
    page_offset, parse_date, ActivityInput, ContactInput, CustomerFilters, CustomerInput,
    NewActivity, UpdateUserInput, ACTIVITY_PAGE_SIZE, CUSTOMER_PAGE_SIZE,
};

const ACTIVITY_COLUMNS: &str = "a.id, a.customer_id, a.user_id, a.activity_type, a.activity_date, \
     a.contact_person, a.notes, a.outcome, a.next_contact_date, a.is_imported, a.created_at";

const RECENT_ACTIVITY_DAYS: i64 = 30;

pub async fn init_db(pool: &PgPool) -> CrmResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("schema migrations applied");
    Ok(())
}

fn customer_from_row(row: &PgRow) -> CrmResult<Customer> {
    let status: String = row.try_get("status")?;
    Ok(Customer {
        id: row.try_get("id")?,
        company_name: row.try_get("company_name")?,
        industry_type: row.try_get("industry_type")?,
        city: row.try_get("city")?,
        district: row.try_get("district")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        machine_type: row.try_get("machine_type")?,
        status: status.parse()?,
        last_contact_date: row.try_get("last_contact_date")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn contact_from_row(row: &PgRow) -> CrmResult<Contact> {
    Ok(Contact {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        mobile: row.try_get("mobile")?,
        email: row.try_get("email")?,
        is_primary: row.try_get("is_primary")?,
        created_at: row.try_get("created_at")?,
    })
}

fn activity_from_row(row: &PgRow) -> CrmResult<Activity> {
    let activity_type: String = row.try_get("activity_type")?;
    let outcome: Option<String> = row.try_get("outcome")?;
    Ok(Activity {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        user_id: row.try_get("user_id")?,
        activity_type: activity_type.parse()?,
        activity_date: row.try_get("activity_date")?,
        contact_person: row.try_get("contact_person")?,
        notes: row.try_get("notes")?,
        outcome: outcome.map(|value| value.parse()).transpose()?,
        next_contact_date: row.try_get("next_contact_date")?,
        is_imported: row.try_get("is_imported")?,
        created_at: row.try_get("created_at")?,
    })
}

fn listing_from_row(row: &PgRow) -> CrmResult<ActivityListing> {
    Ok(ActivityListing {
        activity: activity_from_row(row)?,
        company_name: row.try_get("company_name")?,
        city: row.try_get("city")?,
    })
}

fn profile_from_row(row: &PgRow) -> CrmResult<UserProfile> {
    let role: String = row.try_get("role")?;
    Ok(UserProfile {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        role: role.parse()?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// Follow-ups

/// Every activity with a next contact date up to the end of `window`, joined
/// with the customer and its primary contact, ascending by date.
pub async fn fetch_follow_up_candidates(
    pool: &PgPool,
    window: FollowUpWindow,
) -> CrmResult<Vec<FollowUpEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id AS activity_id, a.customer_id, a.activity_type, a.activity_date,
               a.notes, a.next_contact_date,
               c.company_name, c.city, c.phone,
               ct.name AS contact_name, ct.mobile AS contact_mobile
        FROM crm.activities a
        JOIN crm.customers c ON c.id = a.customer_id
        LEFT JOIN LATERAL (
            SELECT name, mobile FROM crm.contacts
            WHERE customer_id = a.customer_id
            ORDER BY is_primary DESC, created_at ASC
            LIMIT 1
        ) ct ON TRUE
        WHERE a.next_contact_date IS NOT NULL
          AND a.next_contact_date <= $1
        ORDER BY a.next_contact_date ASC, a.id ASC
        "#,
    )
    .bind(window.end())
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let activity_type: String = row.try_get("activity_type")?;
        entries.push(FollowUpEntry {
            customer_id: row.try_get("customer_id")?,
            next_contact_date: row.try_get("next_contact_date")?,
            source_activity_id: row.try_get("activity_id")?,
            activity_type: activity_type.parse()?,
            activity_date: row.try_get("activity_date")?,
            notes: row.try_get("notes")?,
            company_name: row.try_get("company_name")?,
            city: row.try_get("city")?,
            phone: row.try_get("phone")?,
            contact_name: row.try_get("contact_name")?,
            contact_mobile: row.try_get("contact_mobile")?,
        });
    }

    debug!(rows = entries.len(), until = %window.end(), "fetched follow-up candidates");
    Ok(entries)
}

/// The dashboard's date-only projection over the same window.
pub async fn fetch_follow_up_dates(
    pool: &PgPool,
    window: FollowUpWindow,
) -> CrmResult<Vec<FollowUpDate>> {
    let rows = sqlx::query(
        r#"
        SELECT id, customer_id, next_contact_date
        FROM crm.activities
        WHERE next_contact_date IS NOT NULL
          AND next_contact_date <= $1
        "#,
    )
    .bind(window.end())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> CrmResult<FollowUpDate> {
            Ok(FollowUpDate {
                customer_id: row.try_get("customer_id")?,
                source_activity_id: row.try_get("id")?,
                next_contact_date: row.try_get("next_contact_date")?,
            })
        })
        .collect()
}

pub async fn record_counts(pool: &PgPool) -> CrmResult<RecordCounts> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM crm.customers WHERE status = 'active') AS active_customers,
            (SELECT COUNT(*) FROM crm.activities) AS activities,
            (SELECT COUNT(*) FROM crm.contacts) AS contacts
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(RecordCounts {
        active_customers: row.try_get("active_customers")?,
        activities: row.try_get("activities")?,
        contacts: row.try_get("contacts")?,
    })
}

pub async fn recent_activities(pool: &PgPool, limit: i64) -> CrmResult<Vec<ActivityListing>> {
    let query = format!(
        "SELECT {ACTIVITY_COLUMNS}, c.company_name, c.city \
         FROM crm.activities a JOIN crm.customers c ON c.id = a.customer_id \
         ORDER BY a.activity_date DESC, a.created_at DESC LIMIT $1"
    );
    let rows = sqlx::query(&query).bind(limit.max(0)).fetch_all(pool).await?;
    rows.iter().map(listing_from_row).collect()
}

// Customers

pub async fn list_customers(pool: &PgPool, filters: &CustomerFilters) -> CrmResult<Page<Customer>> {
    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &CustomerFilters) {
        builder.push(" WHERE TRUE");
        if let Some(search) = &filters.search {
            let pattern = format!("%{search}%");
            builder
                .push(" AND (company_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR address ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(city) = &filters.city {
            builder.push(" AND city = ").push_bind(city.clone());
        }
        if let Some(industry) = &filters.industry {
            builder.push(" AND industry_type = ").push_bind(industry.clone());
        }
    }

    let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM crm.customers");
    push_filters(&mut count_query, filters);
    let count: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM crm.customers");
    push_filters(&mut query, filters);
    query
        .push(" ORDER BY company_name ASC LIMIT ")
        .push_bind(CUSTOMER_PAGE_SIZE)
        .push(" OFFSET ")
        .push_bind(filters.offset()?);
    let rows = query.build().fetch_all(pool).await?;

    Ok(Page {
        data: rows.iter().map(customer_from_row).collect::<CrmResult<_>>()?,
        count,
        page: filters.page(),
        page_size: CUSTOMER_PAGE_SIZE,
    })
}

pub async fn get_customer(pool: &PgPool, id: Uuid) -> CrmResult<CustomerDetail> {
    let customer = sqlx::query("SELECT * FROM crm.customers WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CrmError::not_found("customer", id))?;

    let contacts = sqlx::query(
        "SELECT * FROM crm.contacts WHERE customer_id = $1 ORDER BY is_primary DESC, created_at ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let query = format!(
        "SELECT {ACTIVITY_COLUMNS} FROM crm.activities a WHERE a.customer_id = $1 \
         ORDER BY a.activity_date DESC, a.created_at DESC"
    );
    let activities = sqlx::query(&query).bind(id).fetch_all(pool).await?;

    Ok(CustomerDetail {
        customer: customer_from_row(&customer)?,
        contacts: contacts.iter().map(contact_from_row).collect::<CrmResult<_>>()?,
        activities: activities.iter().map(activity_from_row).collect::<CrmResult<_>>()?,
    })
}

async fn distinct_column(pool: &PgPool, column: &str) -> CrmResult<Vec<String>> {
    let query = format!(
        "SELECT DISTINCT {column} AS value FROM crm.customers \
         WHERE {column} IS NOT NULL AND {column} <> '' ORDER BY value"
    );
    let values = sqlx::query_scalar(&query).fetch_all(pool).await?;
    Ok(values)
}

pub async fn list_cities(pool: &PgPool) -> CrmResult<Vec<String>> {
    distinct_column(pool, "city").await
}

pub async fn list_industries(pool: &PgPool) -> CrmResult<Vec<String>> {
    distinct_column(pool, "industry_type").await
}

async fn insert_contacts(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    customer_id: Uuid,
    contacts: &[ContactInput],
) -> CrmResult<()> {
    for contact in contacts {
        sqlx::query(
            r#"
            INSERT INTO crm.contacts (id, customer_id, name, role, mobile, email, is_primary)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(&contact.name)
        .bind(&contact.role)
        .bind(&contact.mobile)
        .bind(&contact.email)
        .bind(contact.is_primary)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn validate_customer(
    customer: CustomerInput,
    contacts: Vec<ContactInput>,
) -> CrmResult<(CustomerInput, Vec<ContactInput>)> {
    let customer = customer.validate()?;
    let contacts = contacts
        .into_iter()
        .map(ContactInput::validate)
        .collect::<CrmResult<Vec<_>>>()?;
    Ok((customer, contacts))
}

/// Create a customer with its contacts and log the initial visit.
pub async fn create_customer(
    pool: &PgPool,
    actor: &Actor,
    customer: CustomerInput,
    contacts: Vec<ContactInput>,
    today: NaiveDate,
) -> CrmResult<Uuid> {
    actor.require(auth::can_log_activity, "add customers")?;
    let (customer, contacts) = validate_customer(customer, contacts)?;
    let id = Uuid::new_v4();

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO crm.customers
        (id, company_name, industry_type, city, district, address, phone, email,
         machine_type, status, last_contact_date, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(id)
    .bind(&customer.company_name)
    .bind(&customer.industry_type)
    .bind(&customer.city)
    .bind(&customer.district)
    .bind(&customer.address)
    .bind(&customer.phone)
    .bind(&customer.email)
    .bind(&customer.machine_type)
    .bind(customer.status.as_str())
    .bind(today)
    .bind(&customer.notes)
    .execute(&mut *tx)
    .await?;

    insert_contacts(&mut tx, id, &contacts).await?;

    sqlx::query(
        r#"
        INSERT INTO crm.activities (id, customer_id, user_id, activity_type, activity_date, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(id)
    .bind(actor.user_id)
    .bind(ActivityType::Visit.as_str())
    .bind(today)
    .bind("Initial contact - customer added to system")
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(customer_id = %id, contacts = contacts.len(), "customer created");
    Ok(id)
}

/// Update a customer and replace its contacts wholesale.
pub async fn update_customer(
    pool: &PgPool,
    actor: &Actor,
    id: Uuid,
    customer: CustomerInput,
    contacts: Vec<ContactInput>,
) -> CrmResult<()> {
    actor.require(auth::can_edit_customer, "edit customers")?;
    let (customer, contacts) = validate_customer(customer, contacts)?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE crm.customers
        SET company_name = $2, industry_type = $3, city = $4, district = $5, address = $6,
            phone = $7, email = $8, machine_type = $9, status = $10, notes = $11,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&customer.company_name)
    .bind(&customer.industry_type)
    .bind(&customer.city)
    .bind(&customer.district)
    .bind(&customer.address)
    .bind(&customer.phone)
    .bind(&customer.email)
    .bind(&customer.machine_type)
    .bind(customer.status.as_str())
    .bind(&customer.notes)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CrmError::not_found("customer", id));
    }

    sqlx::query("DELETE FROM crm.contacts WHERE customer_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    insert_contacts(&mut tx, id, &contacts).await?;

    tx.commit().await?;
    info!(customer_id = %id, "customer updated");
    Ok(())
}

pub async fn delete_customer(pool: &PgPool, actor: &Actor, id: Uuid) -> CrmResult<()> {
    actor.require(auth::can_edit_customer, "delete customers")?;
    let result = sqlx::query("DELETE FROM crm.customers WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CrmError::not_found("customer", id));
    }
    info!(customer_id = %id, "customer deleted");
    Ok(())
}

// Activities

pub async fn list_activities(pool: &PgPool, page: i64) -> CrmResult<Page<ActivityListing>> {
    let page = page.max(1);
    let offset = page_offset(page, ACTIVITY_PAGE_SIZE)?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crm.activities")
        .fetch_one(pool)
        .await?;

    let query = format!(
        "SELECT {ACTIVITY_COLUMNS}, c.company_name, c.city \
         FROM crm.activities a JOIN crm.customers c ON c.id = a.customer_id \
         ORDER BY a.activity_date DESC, a.created_at DESC LIMIT $1 OFFSET $2"
    );
    let rows = sqlx::query(&query)
        .bind(ACTIVITY_PAGE_SIZE)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(Page {
        data: rows.iter().map(listing_from_row).collect::<CrmResult<_>>()?,
        count,
        page,
        page_size: ACTIVITY_PAGE_SIZE,
    })
}

pub async fn get_activity(pool: &PgPool, id: Uuid) -> CrmResult<ActivityListing> {
    let query = format!(
        "SELECT {ACTIVITY_COLUMNS}, c.company_name, c.city \
         FROM crm.activities a JOIN crm.customers c ON c.id = a.customer_id WHERE a.id = $1"
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CrmError::not_found("activity", id))?;
    listing_from_row(&row)
}

async fn touch_last_contact(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    activity: &NewActivity,
) -> CrmResult<()> {
    sqlx::query("UPDATE crm.customers SET last_contact_date = $2, updated_at = now() WHERE id = $1")
        .bind(activity.customer_id)
        .bind(activity.activity_date)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Record an activity for the acting user and stamp the customer's last
/// contact date.
pub async fn create_activity(pool: &PgPool, actor: &Actor, input: ActivityInput) -> CrmResult<Uuid> {
    actor.require(auth::can_log_activity, "log activities")?;
    let activity = input.validate()?;
    let id = Uuid::new_v4();

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        INSERT INTO crm.activities
        (id, customer_id, user_id, activity_type, activity_date, contact_person, notes,
         outcome, next_contact_date)
        SELECT $1, c.id, $3, $4, $5, $6, $7, $8, $9
        FROM crm.customers c WHERE c.id = $2
        "#,
    )
    .bind(id)
    .bind(activity.customer_id)
    .bind(actor.user_id)
    .bind(activity.activity_type.as_str())
    .bind(activity.activity_date)
    .bind(&activity.contact_person)
    .bind(&activity.notes)
    .bind(activity.outcome.map(Outcome::as_str))
    .bind(activity.next_contact_date)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CrmError::not_found("customer", activity.customer_id));
    }

    touch_last_contact(&mut tx, &activity).await?;
    tx.commit().await?;

    info!(
        activity_id = %id,
        customer_id = %activity.customer_id,
        follow_up = ?activity.next_contact_date,
        "activity logged"
    );
    Ok(id)
}

pub async fn update_activity(
    pool: &PgPool,
    actor: &Actor,
    id: Uuid,
    input: ActivityInput,
) -> CrmResult<()> {
    actor.require(auth::can_log_activity, "edit activities")?;
    let activity = input.validate()?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE crm.activities
        SET customer_id = $2, activity_type = $3, activity_date = $4, contact_person = $5,
            notes = $6, outcome = $7, next_contact_date = $8
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(activity.customer_id)
    .bind(activity.activity_type.as_str())
    .bind(activity.activity_date)
    .bind(&activity.contact_person)
    .bind(&activity.notes)
    .bind(activity.outcome.map(Outcome::as_str))
    .bind(activity.next_contact_date)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CrmError::not_found("activity", id));
    }

    touch_last_contact(&mut tx, &activity).await?;
    tx.commit().await?;
    info!(activity_id = %id, "activity updated");
    Ok(())
}

pub async fn delete_activity(pool: &PgPool, actor: &Actor, id: Uuid) -> CrmResult<()> {
    actor.require(auth::can_delete_activity, "delete activities")?;
    let result = sqlx::query("DELETE FROM crm.activities WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CrmError::not_found("activity", id));
    }
    info!(activity_id = %id, "activity deleted");
    Ok(())
}

#[derive(serde::Deserialize)]
struct CsvRow {
    company_name: String,
    city: Option<String>,
    activity_type: ActivityType,
    activity_date: String,
    notes: Option<String>,
    outcome: Option<Outcome>,
    next_contact_date: Option<String>,
    source_key: Option<String>,
}

#[derive(Debug, PartialEq)]
struct ImportRow {
    company_name: String,
    city: Option<String>,
    activity_type: ActivityType,
    activity_date: NaiveDate,
    notes: Option<String>,
    outcome: Option<Outcome>,
    next_contact_date: Option<NaiveDate>,
    source_key: String,
}

/// Parse and validate every row before anything is written, so a bad row
/// late in the file rejects the whole import.
fn read_import_rows<R: std::io::Read>(reader: R) -> CrmResult<Vec<ImportRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let company_name = row.company_name.trim();
        if company_name.is_empty() {
            return Err(CrmError::validation("company_name", "is required"));
        }
        let next_contact_date = row
            .next_contact_date
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(|value| parse_date("next_contact_date", value))
            .transpose()?;

        rows.push(ImportRow {
            company_name: company_name.to_string(),
            city: row.city.filter(|city| !city.trim().is_empty()),
            activity_type: row.activity_type,
            activity_date: parse_date("activity_date", &row.activity_date)?,
            notes: row.notes,
            outcome: row.outcome,
            next_contact_date,
            source_key: row
                .source_key
                .filter(|key| !key.trim().is_empty())
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4())),
        });
    }

    Ok(rows)
}

/// Import historical activities from CSV in one transaction. Customers are
/// matched by company name and created when missing; rows already imported
/// under the same `source_key` are skipped without touching customers.
pub async fn import_csv(pool: &PgPool, actor: &Actor, csv_path: &std::path::Path) -> CrmResult<usize> {
    actor.require(auth::can_log_activity, "import activities")?;
    let rows = read_import_rows(std::fs::File::open(csv_path)?)?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for row in rows {
        let already_imported: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM crm.activities WHERE source_key = $1)")
                .bind(&row.source_key)
                .fetch_one(&mut *tx)
                .await?;
        if already_imported {
            debug!(source_key = %row.source_key, "import row skipped");
            continue;
        }

        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM crm.customers WHERE company_name = $1 LIMIT 1")
                .bind(&row.company_name)
                .fetch_optional(&mut *tx)
                .await?;

        let customer_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                sqlx::query("INSERT INTO crm.customers (id, company_name, city) VALUES ($1, $2, $3)")
                    .bind(id)
                    .bind(&row.company_name)
                    .bind(&row.city)
                    .execute(&mut *tx)
                    .await?;
                id
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO crm.activities
            (id, customer_id, user_id, activity_type, activity_date, notes, outcome,
             next_contact_date, is_imported, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(actor.user_id)
        .bind(row.activity_type.as_str())
        .bind(row.activity_date)
        .bind(&row.notes)
        .bind(row.outcome.map(Outcome::as_str))
        .bind(row.next_contact_date)
        .bind(&row.source_key)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tx.commit().await?;
    info!(inserted, path = %csv_path.display(), "activities imported");
    Ok(inserted)
}

// Users

pub async fn list_users(pool: &PgPool) -> CrmResult<Vec<UserProfile>> {
    let rows = sqlx::query("SELECT * FROM crm.user_profiles ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(profile_from_row).collect()
}

pub async fn get_user(pool: &PgPool, id: Uuid) -> CrmResult<UserProfile> {
    let row = sqlx::query("SELECT * FROM crm.user_profiles WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CrmError::not_found("user", id))?;
    profile_from_row(&row)
}

pub async fn load_actor(pool: &PgPool, user_id: Uuid) -> CrmResult<Actor> {
    let profile = get_user(pool, user_id).await?;
    let actor = Actor::from(&profile);
    actor.require_active()?;
    Ok(actor)
}

pub async fn update_user(
    pool: &PgPool,
    actor: &Actor,
    user_id: Uuid,
    input: UpdateUserInput,
) -> CrmResult<()> {
    actor.require_admin()?;
    auth::ensure_not_self(actor, user_id, "edit")?;
    let input = input.validate()?;

    let result = sqlx::query(
        r#"
        UPDATE crm.user_profiles
        SET full_name = $2, role = $3, is_active = $4, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(&input.full_name)
    .bind(input.role.as_str())
    .bind(input.is_active)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CrmError::not_found("user", user_id));
    }
    info!(user_id = %user_id, role = %input.role, "user updated");
    Ok(())
}

pub async fn delete_user(pool: &PgPool, actor: &Actor, user_id: Uuid) -> CrmResult<()> {
    actor.require_admin()?;
    auth::ensure_not_self(actor, user_id, "delete")?;

    let result = sqlx::query("DELETE FROM crm.user_profiles WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CrmError::not_found("user", user_id));
    }
    info!(user_id = %user_id, "user deleted");
    Ok(())
}

// Reports

pub async fn report_totals(pool: &PgPool, today: NaiveDate) -> CrmResult<ReportTotals> {
    let since = today - Duration::days(RECENT_ACTIVITY_DAYS);
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM crm.activities) AS total_activities,
            (SELECT COUNT(*) FROM crm.activities WHERE activity_date >= $1) AS recent_activities,
            (SELECT COUNT(*) FROM crm.customers WHERE status = 'active') AS active_customers,
            (SELECT COUNT(*) FROM crm.activities WHERE next_contact_date IS NOT NULL) AS follow_ups_count
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(ReportTotals {
        total_activities: row.try_get("total_activities")?,
        recent_activities: row.try_get("recent_activities")?,
        active_customers: row.try_get("active_customers")?,
        follow_ups_count: row.try_get("follow_ups_count")?,
    })
}

pub async fn activity_type_counts(pool: &PgPool) -> CrmResult<Vec<(ActivityType, usize)>> {
    let rows = sqlx::query(
        "SELECT activity_type, COUNT(*) AS count FROM crm.activities GROUP BY activity_type",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> CrmResult<(ActivityType, usize)> {
            let value: String = row.try_get("activity_type")?;
            let count: i64 = row.try_get("count")?;
            Ok((value.parse()?, count as usize))
        })
        .collect()
}

pub async fn outcome_counts(pool: &PgPool) -> CrmResult<Vec<(Outcome, usize)>> {
    let rows = sqlx::query(
        "SELECT outcome, COUNT(*) AS count FROM crm.activities \
         WHERE outcome IS NOT NULL GROUP BY outcome",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> CrmResult<(Outcome, usize)> {
            let value: String = row.try_get("outcome")?;
            let count: i64 = row.try_get("count")?;
            Ok((value.parse()?, count as usize))
        })
        .collect()
}

pub async fn activity_counts_by_user(pool: &PgPool) -> CrmResult<Vec<(Uuid, usize)>> {
    let rows = sqlx::query(
        "SELECT user_id, COUNT(*) AS count FROM crm.activities \
         WHERE user_id IS NOT NULL GROUP BY user_id",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> CrmResult<(Uuid, usize)> {
            let user_id: Uuid = row.try_get("user_id")?;
            let count: i64 = row.try_get("count")?;
            Ok((user_id, count as usize))
        })
        .collect()
}

// Seed data

pub async fn seed(pool: &PgPool, today: NaiveDate) -> CrmResult<()> {
    let users = vec![
        (
            Uuid::parse_str("6f1c2a8e-4d3b-4b7e-9a51-0c2f5e7d8a10").map_err(seed_uuid)?,
            "Rina Wijaya",
            "rina.wijaya@example.com",
            Role::Admin,
        ),
        (
            Uuid::parse_str("a3d9e4b2-7c16-4f0a-8e25-91b6c3d4e5f7").map_err(seed_uuid)?,
            "Dimas Pratama",
            "dimas.pratama@example.com",
            Role::Marketing,
        ),
    ];

    for (id, name, email, role) in &users {
        sqlx::query(
            r#"
            INSERT INTO crm.user_profiles (id, full_name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, role = EXCLUDED.role
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role.as_str())
        .execute(pool)
        .await?;
    }

    let customers = vec![
        (
            Uuid::parse_str("0b7e1f52-3a64-4c8d-b2f1-5e9a7c6d4b30").map_err(seed_uuid)?,
            "PT Sinar Plastik",
            "Plastics",
            "Surabaya",
            "Hendra",
            "0812-3456-7890",
        ),
        (
            Uuid::parse_str("5c2d8e91-6b47-4a3f-9d10-2e8f7a6b5c41").map_err(seed_uuid)?,
            "CV Maju Bersama",
            "Packaging",
            "Sidoarjo",
            "Lestari",
            "0813-2222-1010",
        ),
        (
            Uuid::parse_str("e8a41c37-2f95-4d6b-a0c3-7b1e9d8f6a52").map_err(seed_uuid)?,
            "UD Karya Logam",
            "Metalwork",
            "Gresik",
            "Agus",
            "0857-4444-3131",
        ),
    ];

    for (id, company, industry, city, contact, mobile) in &customers {
        sqlx::query(
            r#"
            INSERT INTO crm.customers (id, company_name, industry_type, city, phone)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET company_name = EXCLUDED.company_name, city = EXCLUDED.city
            "#,
        )
        .bind(id)
        .bind(company)
        .bind(industry)
        .bind(city)
        .bind(mobile)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO crm.contacts (id, customer_id, name, mobile, is_primary)
            SELECT $1, $2, $3, $4, TRUE
            WHERE NOT EXISTS (SELECT 1 FROM crm.contacts WHERE customer_id = $2)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(contact)
        .bind(mobile)
        .execute(pool)
        .await?;
    }

    let marketing = users[1].0;
    let activities = vec![
        ("seed-001", customers[0].0, ActivityType::Visit, -12, Some(Outcome::HasNeed), Some(-2), "Asked for a quote on a second extruder"),
        ("seed-002", customers[0].0, ActivityType::Call, -3, Some(Outcome::FollowUp), Some(4), "Waiting on budget approval"),
        ("seed-003", customers[1].0, ActivityType::Quotation, -5, Some(Outcome::QuotationSent), Some(0), "Quotation sent for sealing machine"),
        ("seed-004", customers[2].0, ActivityType::Service, -1, Some(Outcome::ServiceRequest), Some(3), "Scheduled maintenance visit"),
        ("seed-005", customers[2].0, ActivityType::Whatsapp, -20, Some(Outcome::NoResponse), None, "No reply to catalogue"),
    ];

    for (source_key, customer_id, activity_type, day_offset, outcome, follow_up, note) in activities {
        let activity_date = today + Duration::days(day_offset);
        sqlx::query(
            r#"
            INSERT INTO crm.activities
            (id, customer_id, user_id, activity_type, activity_date, notes, outcome,
             next_contact_date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(marketing)
        .bind(activity_type.as_str())
        .bind(activity_date)
        .bind(note)
        .bind(outcome.map(Outcome::as_str))
        .bind(follow_up.map(|days| today + Duration::days(days)))
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    info!(users = users.len(), customers = customers.len(), "seed data inserted");
    Ok(())
}

fn seed_uuid(err: uuid::Error) -> CrmError {
    CrmError::validation("id", err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "company_name,city,activity_type,activity_date,notes,outcome,next_contact_date,source_key\n";

    #[test]
    fn import_rows_are_parsed_and_trimmed() {
        let data = format!(
            "{HEADER}  PT Sinar Plastik ,Surabaya,call,2025-01-08,Asked for pricing,follow_up,2025-01-15,legacy-17\n\
             CV Maju Bersama,,visit,2025-01-09,,,,\n"
        );

        let rows = read_import_rows(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].company_name, "PT Sinar Plastik");
        assert_eq!(rows[0].outcome, Some(Outcome::FollowUp));
        assert_eq!(rows[0].next_contact_date, NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(rows[0].source_key, "legacy-17");
        assert_eq!(rows[1].city, None);
        assert_eq!(rows[1].next_contact_date, None);
        assert!(rows[1].source_key.starts_with("import-"));
    }

    #[test]
    fn bad_row_anywhere_rejects_the_whole_file() {
        let data = format!(
            "{HEADER}PT Sinar Plastik,Surabaya,call,2025-01-08,,,,a\n\
             CV Maju Bersama,Malang,visit,08/01/2025,,,,b\n"
        );

        let err = read_import_rows(data.as_bytes()).unwrap_err();
        assert!(matches!(err, CrmError::Validation { field: "activity_date", .. }));
    }

    #[test]
    fn blank_company_is_rejected() {
        let data = format!("{HEADER}  ,Surabaya,email,2025-01-08,,,,c\n");
        assert!(matches!(
            read_import_rows(data.as_bytes()),
            Err(CrmError::Validation { field: "company_name", .. })
        ));
    }
}
