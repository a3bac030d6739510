// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identifier, credential, and resource-name generation.
//!
//! Container and volume names are always derived from a fresh
//! [`collision_resistant_id`], so a name is never reused across provisioning
//! attempts even when an earlier attempt failed half-way.

use std::sync::atomic::{AtomicU32, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Number of random bytes behind a generated database password.
pub const PASSWORD_BYTES: usize = 16;

/// Number of random characters in a generated database username (after the prefix).
pub const USERNAME_LENGTH: usize = 9;

/// Prefix for generated usernames; engines reject role names starting with a digit.
pub const USERNAME_PREFIX: &str = "u";

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Generate a collision-resistant, lowercase alphanumeric token.
///
/// Layout: `c`, the current time in milliseconds (base36), a 4-character
/// process-local counter block, and 8 random base36 characters.
pub fn collision_resistant_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let count = u64::from(COUNTER.fetch_add(1, Ordering::Relaxed)) % 36u64.pow(4);

    let mut id = String::with_capacity(25);
    id.push('c');
    id.push_str(&to_base36(millis));
    id.push_str(&format!("{:0>4}", to_base36(count)));

    let mut rng = rand::thread_rng();
    for _ in 0..8 {
        id.push(BASE36[rng.gen_range(0..36)] as char);
    }
    id
}

/// Generate a random database username: the prefix followed by lowercase
/// alphanumeric characters drawn from the OS random source.
pub fn generate_username(prefix: &str, length: usize) -> String {
    let mut rng = OsRng;
    let mut username = String::with_capacity(prefix.len() + length);
    username.push_str(prefix);
    for _ in 0..length {
        username.push(BASE36[rng.gen_range(0..36)] as char);
    }
    username.to_lowercase()
}

/// Generate a random password: standard base64 of `bytes` random bytes.
///
/// The output is not filtered, so it may contain `+`, `/` and `=`. Anyone
/// embedding it in a connection URL must percent-encode it.
pub fn generate_password(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    STANDARD.encode(buf)
}

/// Split a human-provided name into lowercase words.
///
/// Word boundaries are any non-alphanumeric character, a lowercase-to-uppercase
/// transition (`orderItems`), and the end of an acronym (`HTTPServer`).
fn split_words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }

        current.extend(c.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `Orders DB` -> `orders_db`
pub fn to_snake_case(input: &str) -> String {
    split_words(input).join("_")
}

/// `Hello World` -> `hello-world`
pub fn to_kebab_case(input: &str) -> String {
    split_words(input).join("-")
}

/// `orders_db` -> `ORDERS_DB`
pub fn to_screaming_snake_case(input: &str) -> String {
    to_snake_case(input).to_uppercase()
}

/// Network name for a project: `net_{snake(name)}`.
pub fn network_name(project_name: &str) -> String {
    format!("net_{}", to_snake_case(project_name))
}

/// Fresh container name for a database.
pub fn database_container_name() -> String {
    format!("db_{}", collision_resistant_id())
}

/// Fresh container name for a single function invocation.
pub fn function_container_name() -> String {
    format!("func_{}", collision_resistant_id())
}

/// Volume name backing a database container.
pub fn volume_name(container_name: &str) -> String {
    format!("vol_{}", container_name)
}
