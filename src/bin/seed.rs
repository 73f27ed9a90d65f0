use std::env;

use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unioneyes::app::{config::Config, db::MaintenancePool, hierarchy};
use unioneyes::seeds::{self, RunOptions};

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unioneyes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| fail(format!("Failed to load config: {e}")));

    let pool = MaintenancePool::connect(&config)
        .await
        .unwrap_or_else(|e| fail(format!("Failed to connect to database: {e}")));
    pool.migrate()
        .await
        .unwrap_or_else(|e| fail(format!("Failed to run database migrations: {e}")));

    let args: Vec<String> = env::args().collect();
    let flag_value = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    if args.iter().any(|a| a == "--verify") {
        let mut conn = pool
            .pool()
            .acquire()
            .await
            .unwrap_or_else(|e| fail(format!("Failed to acquire connection: {e}")));
        let broken = hierarchy::verify_hierarchy(&mut conn)
            .await
            .unwrap_or_else(|e| fail(format!("Hierarchy scan failed: {e}")));
        if broken.is_empty() {
            eprintln!("Hierarchy consistent");
            return;
        }
        for id in &broken {
            eprintln!("Inconsistent organization {id}");
        }
        std::process::exit(2);
    }

    if let Some(email) = flag_value("--issue-session") {
        let session_id = seeds::issue_session(pool.pool(), &email, config.session_ttl_days)
            .await
            .unwrap_or_else(|e| fail(format!("Could not issue session for {email}: {e}")));
        println!("{session_id}");
        return;
    }

    let options = RunOptions {
        force_all: args.iter().any(|a| a == "--force-all"),
        force_version: flag_value("--force").and_then(|s| s.parse::<i64>().ok()),
    };
    match seeds::run_seeds(pool.pool(), options).await {
        Ok(applied) if applied.is_empty() => eprintln!("Nothing to seed"),
        Ok(applied) => {
            for description in applied {
                eprintln!("Done {description}");
            }
        }
        Err(e) => fail(format!("Seeding failed: {e}")),
    }
}
