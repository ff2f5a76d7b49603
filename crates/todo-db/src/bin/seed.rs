//! # Seed Data Generator
//!
//! Populates a local store with sample todos for development.
//!
//! ## Usage
//! ```bash
//! # Generate 50 todos (default)
//! cargo run -p todo-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p todo-db --bin seed -- --count 500
//!
//! # Specify database path and owner
//! cargo run -p todo-db --bin seed -- --db ./data/todos.db --user alice
//!
//! # Also queue every todo as an unconfirmed create
//! cargo run -p todo-db --bin seed -- --pending
//! ```
//!
//! Set `RUST_LOG=todo_db=debug` to see each query.

use chrono::{Duration, Utc};
use std::env;
use todo_core::{NewTodo, PendingOperation, PersistedState, Priority, Todo, GUEST_USER_ID};
use todo_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Task templates grouped by tag
const TEMPLATES: &[(&str, &[&str])] = &[
    (
        "errands",
        &[
            "Buy milk",
            "Pick up dry cleaning",
            "Return library books",
            "Renew passport",
            "Post the parcel",
            "Refill prescription",
        ],
    ),
    (
        "work",
        &[
            "Write quarterly report",
            "Review pull requests",
            "Prepare sprint demo",
            "Update roadmap",
            "Reply to client email",
            "Book team offsite",
        ],
    ),
    (
        "home",
        &[
            "Fix leaking tap",
            "Clean the gutters",
            "Water the plants",
            "Replace smoke alarm battery",
            "Sort recycling",
            "Call the plumber",
        ],
    ),
    (
        "health",
        &[
            "Book dentist appointment",
            "Go for a run",
            "Meal prep for the week",
            "Schedule eye exam",
        ],
    ),
];

const PRIORITIES: &[Priority] = &[Priority::Low, Priority::Medium, Priority::Medium, Priority::High];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("todo_db=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 50;
    let mut db_path = String::from("./todos_dev.db");
    let mut user_id = String::from(GUEST_USER_ID);
    let mut queue_pending = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--user" | "-u" => {
                if i + 1 < args.len() {
                    user_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--pending" | "-p" => queue_pending = true,
            "--help" | "-h" => {
                println!("Todo Sync Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of todos to generate (default: 50)");
                println!("  -d, --db <PATH>    Database file path (default: ./todos_dev.db)");
                println!("  -u, --user <ID>    Owner of the generated todos (default: guest)");
                println!("  -p, --pending      Queue every todo as an unconfirmed create");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(db = %db_path, count, user = %user_id, "Seeding local store");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.state().load().await?.todos.len();
    if existing > 0 {
        warn!(existing, "Database already has todos, skipping seed");
        println!("Delete {} to regenerate.", db_path);
        return Ok(());
    }

    let start = std::time::Instant::now();
    let todos: Vec<Todo> = (0..count).map(|seed| generate_todo(seed, &user_id)).collect();

    let pending_operations = if queue_pending {
        todos
            .iter()
            .map(|todo| PendingOperation::create(todo, todo.created_at))
            .collect()
    } else {
        Vec::new()
    };

    let state = PersistedState {
        last_sync_at: if queue_pending { None } else { Some(Utc::now()) },
        todos,
        pending_operations,
        ..Default::default()
    };
    db.state().save(&state).await?;

    let loaded = db.state().load().await?;
    let stats = todo_core::TodoState::from_persisted(loaded).stats();

    println!();
    println!("✓ Generated {} todos in {:?}", stats.total, start.elapsed());
    println!(
        "  {} completed, {} high priority, {} overdue, {} queued",
        stats.completed, stats.high_priority, stats.overdue, stats.pending_operations
    );

    db.close().await;
    Ok(())
}

/// Generates one todo deterministically from `seed`.
fn generate_todo(seed: usize, user_id: &str) -> Todo {
    let now = Utc::now();
    let (tag, titles) = TEMPLATES[seed % TEMPLATES.len()];
    let title = titles[(seed / TEMPLATES.len()) % titles.len()];
    let round = seed / (TEMPLATES.len() * 4);

    let title = if round == 0 {
        title.to_string()
    } else {
        format!("{} #{}", title, round + 1)
    };

    let mut input = NewTodo::new(title)
        .with_priority(PRIORITIES[seed % PRIORITIES.len()])
        .with_tags([tag]);

    // Every third todo has a due date, some of them already past
    if seed % 3 == 0 {
        let offset_days = (seed % 11) as i64 - 3;
        input = input.with_due_date(now + Duration::days(offset_days));
    }
    if seed % 5 == 0 {
        input = input.with_description(format!("Generated sample #{}", seed));
    }

    let created_at = now - Duration::minutes(count_back(seed) as i64);
    let mut todo = input.into_todo(Uuid::new_v4().to_string(), user_id.to_string(), created_at);
    todo.completed = seed % 4 == 1;
    todo
}

fn count_back(seed: usize) -> usize {
    (seed * 37) % (60 * 24 * 14)
}
