use std::{env, sync::Arc};

use anyhow::{bail, Result};

use doctrail::{
    auth::password::hash_password,
    config::{AppConfig, StoreBackend},
    db,
    models::{NewDepartment, NewUser, UserRole},
    store::{DataStore, PgStore},
};

const STANDARD_DEPARTMENTS: [(&str, &str); 5] = [
    ("Administration", "ADM"),
    ("Education", "EDU"),
    ("Sports", "SPO"),
    ("Health", "HEA"),
    ("Finance", "FIN"),
];

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("bootstrap") => bootstrap().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\nUsage: maintenance bootstrap");
            std::process::exit(1);
        }
        None => {
            eprintln!("Usage: maintenance bootstrap");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Seeds the standard departments and the initial admin account. Safe to run
/// repeatedly; rows that already exist are left alone.
async fn bootstrap() -> Result<()> {
    let config = AppConfig::from_env()?;
    if config.store_backend == StoreBackend::Memory {
        bail!("bootstrap needs the postgres backend; the memory store does not outlive the process");
    }

    let pool = db::init_pool_with_size(config.require_database_url()?, 1)?;
    let store = PgStore::new(pool);
    store.run_migrations()?;
    let store: Arc<dyn DataStore> = Arc::new(store);

    let existing = store.departments().await?;
    let mut admin_department_id = existing.iter().find(|d| d.code == "ADM").map(|d| d.id);

    for (name, code) in STANDARD_DEPARTMENTS {
        if existing.iter().any(|d| d.code == code) {
            println!("Department {code} already present.");
            continue;
        }
        let department = store
            .insert_department(NewDepartment {
                name: name.to_string(),
                code: code.to_string(),
            })
            .await?;
        println!(
            "Created department {} ({}).",
            department.name, department.code
        );
        if department.code == "ADM" {
            admin_department_id = Some(department.id);
        }
    }

    let admin_email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@townhall.gov".to_string());
    let admin_password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string());

    if store.user_by_email(&admin_email).await?.is_some() {
        println!("Admin account {admin_email} already present.");
        return Ok(());
    }

    let Some(department_id) = admin_department_id else {
        bail!("no ADM department to attach the admin account to");
    };

    let admin = store
        .insert_user(NewUser {
            email: admin_email,
            full_name: "System Administrator".to_string(),
            password_hash: hash_password(&admin_password)?,
            role: UserRole::Admin,
            department_id,
            active: true,
        })
        .await?;
    println!("Created admin account {}.", admin.email);

    Ok(())
}
