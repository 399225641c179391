//! # Seed Data Provisioner
//!
//! Provisions a fresh database with a working starting point: the
//! administrator account, an operator role, and a small demo plant
//! (catalog, assets, a bill of material, a production order, and a
//! maintenance request).
//!
//! Everything goes through the service layer as the system actor, so
//! the seeded rows carry proper audit history.
//!
//! ## Usage
//! ```bash
//! # Seed the default database file
//! cargo run -p forge-services --bin seed
//!
//! # Specify database path and admin password
//! cargo run -p forge-services --bin seed -- --db ./data/forge.db --admin-password s3cret-pass
//! ```

use std::env;

use tracing_subscriber::EnvFilter;

use forge_core::{MaintenancePriority, Metadata, ADMIN_ROLE_ID};
use forge_db::{Database, DbConfig, Filter};
use forge_services::{
    permission, Actor, AppServices, AssetInput, AuthConfig, BillOfMaterialInput, BomItemInput,
    LocationInput, MaintenanceActivityInput, MaintenanceRequestInput, NewUser, ProductInput,
    ProductionLineInput, ProductionOrderInput, RoleInput, UnitOfMeasureInput,
};

/// Permissions granted to the seeded operator role: day-to-day work,
/// no deletions, no security administration.
const OPERATOR_PERMISSIONS: &[&str] = &[
    permission::CATALOG_CREATE,
    permission::CATALOG_UPDATE,
    permission::ASSETS_CREATE,
    permission::ASSETS_UPDATE,
    permission::MANUFACTURING_CREATE,
    permission::MANUFACTURING_UPDATE,
    permission::MAINTENANCE_CREATE,
    permission::MAINTENANCE_UPDATE,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./forge_dev.db");
    let mut admin_password = String::from("change-me-now");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--admin-password" | "-p" => {
                if i + 1 < args.len() {
                    admin_password = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Forge Plant Seed Data Provisioner");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>              Database file path (default: ./forge_dev.db)");
                println!("  -p, --admin-password <PASS>  Initial admin password (default: change-me-now)");
                println!("  -h, --help                   Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Forge Plant Seed Data Provisioner");
    println!("====================================");
    println!("Database: {}", db_path);
    println!();

    let auth_config = AuthConfig::load();
    auth_config.validate()?;

    // Connect to database
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check for an existing installation
    let existing = db.users().count(db.pool(), &Filter::new()).await?;
    if existing > 0 {
        println!("⚠ Database already has {} users", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to reprovision.");
        return Ok(());
    }

    let services = AppServices::new(db, auth_config);
    let system = Actor::system();
    let start = std::time::Instant::now();

    // ===== Security =====
    println!();
    println!("Provisioning accounts...");

    let admin = services
        .users
        .create_user(
            &system,
            NewUser {
                username: "admin".to_string(),
                display_name: "Administrator".to_string(),
                email: None,
                password: admin_password,
                metadata: Metadata::new(),
            },
        )
        .await?;
    services
        .users
        .assign_role(&system, &admin.id, ADMIN_ROLE_ID)
        .await?;
    println!("  ✓ Administrator account (username: admin)");

    let operator = services
        .roles
        .create_role(
            &system,
            RoleInput {
                role_code: "role-operator".to_string(),
                name: "Operator".to_string(),
                description: Some("Day-to-day plant operation".to_string()),
                metadata: Metadata::new(),
            },
        )
        .await?;
    for key in OPERATOR_PERMISSIONS {
        services
            .roles
            .grant_permission(&system, &operator.id, key)
            .await?;
    }
    println!(
        "  ✓ Operator role with {} permissions",
        OPERATOR_PERMISSIONS.len()
    );

    // ===== Catalog =====
    println!();
    println!("Provisioning catalog...");

    let piece = services
        .units_of_measure
        .create_unit_of_measure(
            &system,
            UnitOfMeasureInput {
                uom_code: "pc".to_string(),
                name: "Piece".to_string(),
                symbol: "pc".to_string(),
                metadata: Metadata::new(),
            },
        )
        .await?;
    services
        .units_of_measure
        .create_unit_of_measure(
            &system,
            UnitOfMeasureInput {
                uom_code: "kg".to_string(),
                name: "Kilogram".to_string(),
                symbol: "kg".to_string(),
                metadata: Metadata::new(),
            },
        )
        .await?;

    let plant = services
        .locations
        .create_location(
            &system,
            LocationInput {
                location_code: "plant".to_string(),
                name: "Main Plant".to_string(),
                parent_id: None,
                description: None,
                metadata: Metadata::new(),
            },
        )
        .await?;
    let hall = services
        .locations
        .create_location(
            &system,
            LocationInput {
                location_code: "hall-a".to_string(),
                name: "Hall A".to_string(),
                parent_id: Some(plant.id.clone()),
                description: Some("Assembly hall".to_string()),
                metadata: Metadata::new(),
            },
        )
        .await?;

    let chair = services
        .products
        .create_product(
            &system,
            ProductInput {
                product_code: "chair".to_string(),
                name: "Workshop Chair".to_string(),
                description: None,
                uom_id: piece.id.clone(),
                metadata: Metadata::new(),
            },
        )
        .await?;
    let leg = services
        .products
        .create_product(
            &system,
            ProductInput {
                product_code: "chair-leg".to_string(),
                name: "Chair Leg".to_string(),
                description: None,
                uom_id: piece.id.clone(),
                metadata: Metadata::new(),
            },
        )
        .await?;
    let seat = services
        .products
        .create_product(
            &system,
            ProductInput {
                product_code: "chair-seat".to_string(),
                name: "Chair Seat".to_string(),
                description: None,
                uom_id: piece.id.clone(),
                metadata: Metadata::new(),
            },
        )
        .await?;
    println!("  ✓ 2 units, 2 locations, 3 products");

    // ===== Assets =====
    println!();
    println!("Provisioning assets...");

    services
        .assets
        .create_asset(
            &system,
            AssetInput {
                asset_code: "press-01".to_string(),
                name: "Hydraulic Press 01".to_string(),
                serial_number: Some("HP-2019-4471".to_string()),
                asset_type: Some("press".to_string()),
                location_id: Some(hall.id.clone()),
                metadata: Metadata::new(),
            },
        )
        .await?;
    let forklift = services
        .assets
        .create_asset(
            &system,
            AssetInput {
                asset_code: "forklift-02".to_string(),
                name: "Forklift 02".to_string(),
                serial_number: Some("FL-2021-0208".to_string()),
                asset_type: Some("vehicle".to_string()),
                location_id: Some(plant.id.clone()),
                metadata: Metadata::new(),
            },
        )
        .await?;
    println!("  ✓ 2 assets");

    // ===== Manufacturing =====
    println!();
    println!("Provisioning manufacturing...");

    let bom = services
        .bills_of_material
        .create_bom(
            &system,
            BillOfMaterialInput {
                bom_code: "chair-v1".to_string(),
                name: "Workshop Chair v1".to_string(),
                product_id: chair.id.clone(),
                metadata: Metadata::new(),
            },
        )
        .await?;
    services
        .bills_of_material
        .add_item(
            &system,
            &bom.id,
            BomItemInput {
                product_id: leg.id.clone(),
                quantity: 4.0,
                uom_id: piece.id.clone(),
                position: None,
                note: None,
            },
        )
        .await?;
    services
        .bills_of_material
        .add_item(
            &system,
            &bom.id,
            BomItemInput {
                product_id: seat.id.clone(),
                quantity: 1.0,
                uom_id: piece.id.clone(),
                position: None,
                note: None,
            },
        )
        .await?;

    let line = services
        .production_lines
        .create_production_line(
            &system,
            ProductionLineInput {
                line_code: "line-1".to_string(),
                name: "Assembly Line 1".to_string(),
                location_id: Some(hall.id.clone()),
                hourly_capacity: 12.0,
                capabilities: vec!["assembly".to_string()],
                metadata: Metadata::new(),
            },
        )
        .await?;
    services
        .production_orders
        .create_production_order(
            &system,
            ProductionOrderInput {
                order_number: "po-0001".to_string(),
                product_id: chair.id.clone(),
                bom_id: bom.id.clone(),
                line_id: line.id.clone(),
                quantity_planned: 50.0,
                planned_start: None,
                planned_end: None,
                metadata: Metadata::new(),
            },
        )
        .await?;
    println!("  ✓ 1 bill of material (2 items), 1 line, 1 order");

    // ===== Maintenance =====
    println!();
    println!("Provisioning maintenance...");

    let request = services
        .maintenance
        .create_request(
            &system,
            MaintenanceRequestInput {
                request_code: "mr-0001".to_string(),
                asset_id: forklift.id.clone(),
                title: "Annual inspection".to_string(),
                description: Some("Statutory yearly check".to_string()),
                priority: MaintenancePriority::Low,
                scheduled_for: None,
                metadata: Metadata::new(),
            },
        )
        .await?;
    services
        .maintenance
        .add_activity(
            &system,
            &request.id,
            MaintenanceActivityInput {
                description: "Booked external inspector".to_string(),
                performed_by: Some(admin.id.clone()),
                performed_at: None,
                hours_spent: 0.5,
                note: None,
            },
        )
        .await?;
    println!("  ✓ 1 maintenance request (1 activity)");

    let elapsed = start.elapsed();
    let audit_rows = services
        .db
        .audit_logs()
        .count(services.db.pool(), &Filter::new())
        .await?;

    println!();
    println!("✓ Seed complete in {:?}", elapsed);
    println!("  Audit trail: {} rows", audit_rows);
    println!();
    println!("Log in with username 'admin' and the password you provided.");

    Ok(())
}
