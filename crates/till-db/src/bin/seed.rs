//! # Seed Data Generator
//!
//! Populates a development database with stores, stock, loyalty members
//! and vouchers so the settlement endpoint can be exercised by hand.
//!
//! ## Usage
//! ```bash
//! cargo run -p till-db --bin seed
//! cargo run -p till-db --bin seed -- --customers 200 --db ./data/till.db
//! ```
//!
//! ## Generated Data
//! - 3 locations with different tax rates
//! - Every catalog product stocked at every location
//! - Members with a spread of points, spend and visits
//! - One voucher of each variant per member, plus a few bearer vouchers

use chrono::{Duration, Utc};
use std::env;
use till_core::voucher::ProductBenefit;
use till_core::{Customer, CustomerTier, Location, Money, Voucher, VoucherKind, VoucherStatus};
use till_db::repository::settings::LOYALTY_SYNC_ENDPOINT;
use till_db::{Database, DbConfig};
use uuid::Uuid;

/// (id, name, code, tax rate bps)
const LOCATIONS: &[(&str, &str, &str, i64)] = &[
    ("loc-downtown", "Downtown", "DT01", 800),
    ("loc-harbour", "Harbour Front", "HB02", 825),
    ("loc-airport", "Airport Kiosk", "AP03", 0),
];

/// (product id, stock, reorder level)
const CATALOG: &[(&str, i64, i64)] = &[
    ("sku-coffee-beans", 120, 20),
    ("sku-espresso-cups", 40, 10),
    ("sku-oat-milk", 60, 15),
    ("sku-croissant", 25, 10),
    ("sku-gift-box", 8, 10),
    ("sku-travel-mug", 3, 5),
];

const FIRST_NAMES: &[&str] = &["Ana", "Bilal", "Chen", "Dara", "Emeka", "Farah", "Goran", "Hana"];
const LAST_NAMES: &[&str] = &["Okafor", "Silva", "Nakamura", "Haddad", "Kowalski", "Reyes"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut customers: usize = 50;
    let mut db_path = String::from("./till_dev.db");
    let mut endpoint: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--customers" | "-c" => {
                if i + 1 < args.len() {
                    customers = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--endpoint" | "-e" => {
                if i + 1 < args.len() {
                    endpoint = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Till Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --customers <N>    Loyalty members to create (default: 50)");
                println!("  -d, --db <PATH>        Database file path (default: ./till_dev.db)");
                println!("  -e, --endpoint <URL>   Store as the loyalty sync endpoint setting");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Till Seed Data Generator");
    println!("========================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", customers);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    if db.locations().get_by_id(LOCATIONS[0].0).await?.is_some() {
        println!("⚠ Database is already seeded; delete the file to regenerate.");
        return Ok(());
    }

    for (id, name, code, tax_rate_bps) in LOCATIONS {
        db.locations()
            .insert(&Location {
                id: id.to_string(),
                store_name: name.to_string(),
                store_code: code.to_string(),
                tax_rate_bps: *tax_rate_bps,
                is_active: true,
            })
            .await?;

        for (product_id, stock, reorder_level) in CATALOG {
            db.inventory()
                .set_stock(id, product_id, *stock, *reorder_level)
                .await?;
        }
    }
    println!("✓ {} locations, {} products each", LOCATIONS.len(), CATALOG.len());

    let start = std::time::Instant::now();
    let mut vouchers = 0;

    for n in 0..customers {
        let member = generate_customer(n);
        db.customers().insert(&member).await?;

        for voucher in generate_vouchers(&member.id, n) {
            db.vouchers().insert(&voucher).await?;
            vouchers += 1;
        }
    }

    for n in 0..3 {
        let mut bearer = generate_vouchers("", n).remove(0);
        bearer.customer_id = None;
        db.vouchers().insert(&bearer).await?;
        vouchers += 1;
    }

    println!(
        "✓ {} customers and {} vouchers in {:?}",
        customers,
        vouchers,
        start.elapsed()
    );

    if let Some(url) = endpoint {
        db.settings().set(LOYALTY_SYNC_ENDPOINT, &url).await?;
        println!("✓ Loyalty sync endpoint set to {}", url);
    }

    let low = db.inventory().low_stock(LOCATIONS[0].0).await?;
    println!("  Low stock at {}: {} products", LOCATIONS[0].1, low.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates a member with deterministic but varied balances.
fn generate_customer(seed: usize) -> Customer {
    let now = Utc::now();
    let first = FIRST_NAMES[seed % FIRST_NAMES.len()];
    let last = LAST_NAMES[(seed / FIRST_NAMES.len()) % LAST_NAMES.len()];

    let visit_count = (seed % 40) as i64;
    let total_spent_cents = visit_count * (1_500 + (seed as i64 * 373) % 6_000);
    let points = total_spent_cents / 100 / 2;

    Customer {
        id: Uuid::new_v4().to_string(),
        loyalty_number: format!("LN{:08}", 10_000 + seed),
        name: format!("{first} {last}"),
        email: Some(format!("{}.{}{}@example.com", first, last, seed).to_lowercase()),
        points,
        total_spent_cents,
        visit_count,
        customer_tier: CustomerTier::Bronze,
        tier_score: 0,
        tier_override: None,
        created_at: now,
        updated_at: now,
    }
}

/// One voucher of each variant, owned by `customer_id`.
fn generate_vouchers(customer_id: &str, seed: usize) -> Vec<Voucher> {
    let owner = (!customer_id.is_empty()).then(|| customer_id.to_string());
    let expires = (Utc::now() + Duration::days(30 + (seed % 60) as i64)).date_naive();
    let (product_id, _, _) = CATALOG[seed % CATALOG.len()];
    let face = 500 + (seed as i64 % 4) * 500;

    let voucher = |name: String, kind: VoucherKind| Voucher {
        id: Uuid::new_v4().to_string(),
        customer_id: owner.clone(),
        name,
        status: VoucherStatus::Issued,
        is_active: true,
        expiration_date: Some(expires),
        kind,
    };

    vec![
        voucher(
            format!("{} gift card", Money::from_cents(face)),
            VoucherKind::Value {
                face_value: Money::from_cents(face),
                remaining_value: Money::from_cents(face),
            },
        ),
        voucher(
            "10% off your basket".to_string(),
            VoucherKind::Discount { bps: 1_000 },
        ),
        voucher(
            format!("25% off {product_id}"),
            VoucherKind::ProductSpecific {
                product_id: product_id.to_string(),
                benefit: ProductBenefit::Percent { bps: 2_500 },
            },
        ),
    ]
}
