//! Demo server: declares a small company/contact/service schema and serves
//! it. Expects the tables to exist already; see the SQL at the bottom.

use restable::{app, AppState, Column, HasMany, ManyToMany, Registry, Relation, Resource};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("restable=debug".parse()?))
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/restable".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let companies = Relation::build("companies")
        .column(Column::integer("id"))
        .column(Column::text("name").required().max_length(120))
        .column(Column::text("city"))
        .primary_key(["id"])
        .unique(["name"])
        .finish()?;

    let contacts = Relation::build("contacts")
        .column(Column::integer("id"))
        .foreign_key(Column::integer("company_id").required(), &companies, "id")
        .column(Column::text("key").required())
        .column(Column::text("value").required())
        .primary_key(["id"])
        .unique(["company_id", "key"])
        .finish()?;

    let services = Relation::build("services")
        .column(Column::integer("id"))
        .column(Column::text("name").required())
        .primary_key(["id"])
        .unique(["name"])
        .finish()?;

    let subscriptions = Relation::build("subscriptions")
        .column(Column::integer("id"))
        .foreign_key(Column::integer("company_id").required(), &companies, "id")
        .foreign_key(Column::integer("service_id").required(), &services, "id")
        .column(Column::boolean("is_active").not_null())
        .primary_key(["id"])
        .unique(["company_id", "service_id"])
        .finish()?;

    let mut registry = Registry::new();
    registry.register(
        Resource::build(companies.clone())
            .has_many(HasMany::new("contacts", contacts.clone())?.as_map("key", "value")?)?
            .many_to_many(
                ManyToMany::new("services", services.clone(), subscriptions.clone())?
                    .include_through("is_active")?,
            )?
            .finish()?,
    )?;
    registry.register(
        Resource::build(contacts)
            .default_limit(50)
            .finish()?,
    )?;
    registry.register(Resource::build(services).finish()?)?;
    registry.register(Resource::build(subscriptions).finish()?)?;

    let state = AppState::new(pool, registry);
    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

// Schema for a local database:
//
//   CREATE TABLE companies (
//       id bigserial PRIMARY KEY,
//       name text NOT NULL UNIQUE,
//       city text
//   );
//   CREATE TABLE contacts (
//       id bigserial PRIMARY KEY,
//       company_id bigint NOT NULL REFERENCES companies (id),
//       key text NOT NULL,
//       value text NOT NULL,
//       UNIQUE (company_id, key)
//   );
//   CREATE TABLE services (
//       id bigserial PRIMARY KEY,
//       name text NOT NULL UNIQUE
//   );
//   CREATE TABLE subscriptions (
//       id bigserial PRIMARY KEY,
//       company_id bigint NOT NULL REFERENCES companies (id),
//       service_id bigint NOT NULL REFERENCES services (id),
//       is_active boolean NOT NULL DEFAULT true,
//       UNIQUE (company_id, service_id)
//   );
