use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crm_follow_ups::config::Config;
use crm_follow_ups::db;
use crm_follow_ups::followups::{self, Bucket, FollowUpWindow};
use crm_follow_ups::memo::RequestScope;
use crm_follow_ups::models::{ActivityType, CustomerStatus, FollowUpView, Outcome, Role};
use crm_follow_ups::report::{self, ReportInput};
use crm_follow_ups::validation::{
    ActivityInput, ContactInput, CustomerFilters, CustomerInput, UpdateUserInput,
};

#[derive(Parser)]
#[command(name = "crm")]
#[command(about = "Customer, activity and follow-up tracker", long_about = None)]
struct Cli {
    /// Reference date for follow-up classification (defaults to today, UTC)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
    /// Override the follow-up look-ahead window in days
    #[arg(long, global = true)]
    window_days: Option<i64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo users, customers and activities
    Seed,
    /// Import activities from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        as_user: Uuid,
    },
    /// List customers needing follow-up, bucketed by urgency
    FollowUps {
        #[arg(long)]
        json: bool,
    },
    /// Show dashboard counts
    Dashboard,
    /// List customers
    Customers {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        /// Also list the known cities and industries
        #[arg(long)]
        facets: bool,
    },
    /// Add a customer with an optional primary contact
    AddCustomer {
        #[arg(long)]
        as_user: Uuid,
        #[arg(long)]
        company_name: String,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        contact_name: Option<String>,
        #[arg(long)]
        contact_mobile: Option<String>,
    },
    /// Delete a customer with its contacts and activities (admin only)
    DeleteCustomer {
        #[arg(long)]
        as_user: Uuid,
        id: Uuid,
    },
    /// Change a customer's status, keeping its details and contacts
    SetStatus {
        #[arg(long)]
        as_user: Uuid,
        id: Uuid,
        #[arg(long)]
        status: CustomerStatus,
    },
    /// Show one customer with contacts, activities and its next follow-up
    Customer { id: Uuid },
    /// List logged activities, newest first
    Activities {
        #[arg(long, default_value_t = 1)]
        page: i64,
    },
    /// Log an activity against a customer
    LogActivity {
        #[arg(long)]
        as_user: Uuid,
        #[arg(long)]
        customer: Uuid,
        #[arg(long = "type")]
        activity_type: ActivityType,
        /// Activity date (YYYY-MM-DD), defaults to --today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        contact_person: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        outcome: Option<Outcome>,
        /// Next contact date (YYYY-MM-DD)
        #[arg(long)]
        next_contact: Option<String>,
    },
    /// Move or clear an activity's next contact date
    Reschedule {
        #[arg(long)]
        as_user: Uuid,
        id: Uuid,
        /// New next contact date (YYYY-MM-DD); omit to clear the follow-up
        #[arg(long)]
        next_contact: Option<String>,
    },
    /// Delete an activity (admin only)
    DeleteActivity {
        #[arg(long)]
        as_user: Uuid,
        id: Uuid,
    },
    /// List users with role counts
    Users,
    /// Change a user's name, role or active flag (admin only)
    UpdateUser {
        #[arg(long)]
        as_user: Uuid,
        id: Uuid,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        active: bool,
    },
    /// Delete a user profile (admin only)
    DeleteUser {
        #[arg(long)]
        as_user: Uuid,
        id: Uuid,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_view(view: &FollowUpView) {
    println!(
        "{} customer{} need{} attention.",
        view.total,
        if view.total == 1 { "" } else { "s" },
        if view.total == 1 { "s" } else { "" }
    );
    for (bucket, entries) in [
        (Bucket::Overdue, &view.overdue),
        (Bucket::DueToday, &view.due_today),
        (Bucket::Upcoming, &view.upcoming),
    ] {
        println!("{} ({}):", bucket.label(), entries.len());
        for entry in entries {
            println!("- {}", report::describe_entry(entry));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(days) = cli.window_days {
        anyhow::ensure!(
            (0..=followups::MAX_WINDOW_DAYS).contains(&days),
            "--window-days must be between 0 and {}",
            followups::MAX_WINDOW_DAYS
        );
        config.follow_up_window_days = days;
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let today = cli.today.unwrap_or_else(followups::today);
    let window = FollowUpWindow::new(today, config.follow_up_window_days);
    let mut scope = RequestScope::new(&pool, window);
    info!(%today, window_end = %window.end(), "request started");

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, today).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv, as_user } => {
            let actor = db::load_actor(&pool, as_user).await?;
            let inserted = db::import_csv(&pool, &actor, &csv).await?;
            println!("Inserted {inserted} activities from {}.", csv.display());
        }
        Commands::FollowUps { json } => {
            let view = scope.follow_ups().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_view(&view);
            }
        }
        Commands::Dashboard => {
            let stats = scope.dashboard().await?;
            if stats.overdue_count > 0 {
                println!("You have {} overdue follow-up(s).", stats.overdue_count);
            }
            println!("Active customers: {}", stats.customer_count);
            println!("Activities: {}", stats.activity_count);
            println!("Contacts: {}", stats.contact_count);
            println!("Due today: {}", stats.today_count);

            println!("Recent activity:");
            for listing in db::recent_activities(&pool, 5).await? {
                println!(
                    "- {} {} at {}",
                    listing.activity.activity_date,
                    listing.activity.activity_type.label(),
                    listing.company_name
                );
            }
        }
        Commands::Customers {
            search,
            city,
            industry,
            page,
            facets,
        } => {
            let filters = CustomerFilters {
                search,
                city,
                industry,
                page: Some(page),
            }
            .validate()?;
            if facets {
                println!("Cities: {}", db::list_cities(&pool).await?.join(", "));
                println!("Industries: {}", db::list_industries(&pool).await?.join(", "));
            }
            let customers = db::list_customers(&pool, &filters).await?;
            if customers.data.is_empty() {
                println!("No customers match these filters.");
                return Ok(());
            }
            println!(
                "Page {} of {} ({} customers):",
                customers.page,
                customers.total_pages(),
                customers.count
            );
            for customer in &customers.data {
                println!(
                    "- {} [{}] {} {}",
                    customer.company_name,
                    customer.status.label(),
                    customer.city.as_deref().unwrap_or("-"),
                    customer.id
                );
            }
        }
        Commands::AddCustomer {
            as_user,
            company_name,
            industry,
            city,
            phone,
            email,
            contact_name,
            contact_mobile,
        } => {
            let actor = db::load_actor(&pool, as_user).await?;
            let customer = CustomerInput {
                company_name,
                industry_type: industry,
                city,
                phone,
                email,
                ..Default::default()
            };
            let contacts = contact_name
                .map(|name| ContactInput {
                    name,
                    mobile: contact_mobile,
                    is_primary: true,
                    ..Default::default()
                })
                .into_iter()
                .collect();
            let id = db::create_customer(&pool, &actor, customer, contacts, today).await?;
            println!("Added customer {id}.");
        }
        Commands::DeleteCustomer { as_user, id } => {
            let actor = db::load_actor(&pool, as_user).await?;
            db::delete_customer(&pool, &actor, id).await?;
            println!("Deleted customer {id}.");
        }
        Commands::SetStatus { as_user, id, status } => {
            let actor = db::load_actor(&pool, as_user).await?;
            let detail = scope.customer(id).await?;
            let current = &detail.customer;
            let customer = CustomerInput {
                company_name: current.company_name.clone(),
                industry_type: current.industry_type.clone(),
                city: current.city.clone(),
                district: current.district.clone(),
                address: current.address.clone(),
                phone: current.phone.clone(),
                email: current.email.clone(),
                machine_type: current.machine_type.clone(),
                status,
                notes: current.notes.clone(),
            };
            let contacts = detail
                .contacts
                .iter()
                .map(|contact| ContactInput {
                    name: contact.name.clone(),
                    role: contact.role.clone(),
                    mobile: contact.mobile.clone(),
                    email: contact.email.clone(),
                    is_primary: contact.is_primary,
                })
                .collect();
            db::update_customer(&pool, &actor, id, customer, contacts).await?;
            println!("{} is now {}.", current.company_name, status.label());
        }
        Commands::Customer { id } => {
            let detail = scope.customer(id).await?;
            let customer = &detail.customer;
            println!("{} ({})", customer.company_name, customer.status.label());
            if let Some(last) = customer.last_contact_date {
                println!("Last contact: {last}");
            }
            match scope.customer_follow_up(id).await? {
                Some((date, bucket)) => {
                    println!("Next follow-up: {} ({})", date.next_contact_date, bucket.label())
                }
                None => println!("No follow-up scheduled in the window."),
            }
            println!("Contacts:");
            for contact in &detail.contacts {
                println!(
                    "- {}{} {}",
                    contact.name,
                    if contact.is_primary { " (primary)" } else { "" },
                    contact.mobile.as_deref().unwrap_or("")
                );
            }
            println!("Activities:");
            for activity in &detail.activities {
                print!("- {} {}", activity.activity_date, activity.activity_type.label());
                if let Some(next) = activity.next_contact_date {
                    print!(" (follow-up {next})");
                }
                println!(": {}", activity.notes.as_deref().unwrap_or(""));
            }
        }
        Commands::Activities { page } => {
            let activities = db::list_activities(&pool, page).await?;
            println!(
                "Page {} of {} ({} activities):",
                activities.page,
                activities.total_pages(),
                activities.count
            );
            for listing in &activities.data {
                println!(
                    "- {} {} at {}{}",
                    listing.activity.activity_date,
                    listing.activity.activity_type.label(),
                    listing.company_name,
                    listing
                        .activity
                        .outcome
                        .map(|outcome| format!(" -> {}", outcome.label()))
                        .unwrap_or_default()
                );
            }
        }
        Commands::LogActivity {
            as_user,
            customer,
            activity_type,
            date,
            contact_person,
            notes,
            outcome,
            next_contact,
        } => {
            let actor = db::load_actor(&pool, as_user).await?;
            let input = ActivityInput {
                customer_id: customer,
                activity_type,
                activity_date: date.unwrap_or_else(|| today.to_string()),
                contact_person,
                notes,
                outcome,
                next_contact_date: next_contact,
            };
            let id = db::create_activity(&pool, &actor, input).await?;
            println!("Logged activity {id}.");
        }
        Commands::Reschedule {
            as_user,
            id,
            next_contact,
        } => {
            let actor = db::load_actor(&pool, as_user).await?;
            let current = db::get_activity(&pool, id).await?.activity;
            let input = ActivityInput {
                customer_id: current.customer_id,
                activity_type: current.activity_type,
                activity_date: current.activity_date.to_string(),
                contact_person: current.contact_person,
                notes: current.notes,
                outcome: current.outcome,
                next_contact_date: next_contact,
            };
            db::update_activity(&pool, &actor, id, input).await?;
            println!("Rescheduled activity {id}.");
        }
        Commands::DeleteActivity { as_user, id } => {
            let actor = db::load_actor(&pool, as_user).await?;
            db::delete_activity(&pool, &actor, id).await?;
            println!("Deleted activity {id}.");
        }
        Commands::Users => {
            let users = db::list_users(&pool).await?;
            let stats = report::admin_stats(&users);
            println!(
                "{} users ({} admin, {} marketing):",
                stats.total, stats.admins, stats.marketing
            );
            for user in &users {
                println!(
                    "- {} <{}> {}{}",
                    user.full_name,
                    user.email.as_deref().unwrap_or("N/A"),
                    user.role.label(),
                    if user.is_active { "" } else { " (inactive)" }
                );
            }
        }
        Commands::UpdateUser {
            as_user,
            id,
            full_name,
            role,
            active,
        } => {
            let actor = db::load_actor(&pool, as_user).await?;
            let input = UpdateUserInput {
                full_name,
                role,
                is_active: active,
            };
            db::update_user(&pool, &actor, id, input).await?;
            println!("Updated user {id}.");
        }
        Commands::DeleteUser { as_user, id } => {
            let actor = db::load_actor(&pool, as_user).await?;
            let user = db::get_user(&pool, id).await?;
            db::delete_user(&pool, &actor, id).await?;
            println!("Deleted user {}.", user.full_name);
        }
        Commands::Report { out } => {
            let dashboard = scope.dashboard().await?;
            let follow_ups = scope.follow_ups().await?;
            let totals = db::report_totals(&pool, today).await?;
            let activity_mix = report::activity_mix(&db::activity_type_counts(&pool).await?);
            let outcomes = report::outcome_mix(&db::outcome_counts(&pool).await?);
            let performers = report::top_performers(
                &db::activity_counts_by_user(&pool).await?,
                &db::list_users(&pool).await?,
            );

            let output = report::build_report(&ReportInput {
                today,
                window_end: window.end(),
                dashboard: &dashboard,
                follow_ups: &follow_ups,
                totals: &totals,
                activity_mix: &activity_mix,
                outcomes: &outcomes,
                performers: &performers,
            });
            std::fs::write(&out, output)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
