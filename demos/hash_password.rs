use std::env;
use std::process;

use doctrail::auth::password::hash_password;

/// Prints an argon2 hash for the given password, ready to paste into a
/// `users.password_hash` column when seeding accounts by hand.
fn main() {
    let Some(password) = env::args().nth(1) else {
        eprintln!("Usage: cargo run --example hash_password -- <password>");
        process::exit(1);
    };
    match hash_password(&password) {
        Ok(hash) => println!("{hash}"),
        Err(err) => {
            eprintln!("failed to hash password: {err}");
            process::exit(1);
        }
    }
}
